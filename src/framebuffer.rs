//! The pixel buffer handed to a [`TerminalSink`](crate::canvas::TerminalSink).

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::scale::FrameGeometry;

/// One 24-bit color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
  pub r: u8,
  pub g: u8,
  pub b: u8,
}

impl Rgb {
  pub const BLACK: Rgb = Rgb::new(0, 0, 0);

  pub const fn new(r: u8, g: u8, b: u8) -> Self {
    Self { r, g, b }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseColorError(String);

impl fmt::Display for ParseColorError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "unrecognized color '{}'", self.0)
  }
}

impl std::error::Error for ParseColorError {}

impl FromStr for Rgb {
  type Err = ParseColorError;

  /// Accepts `#rrggbb`, `rrggbb`, `rgb(r, g, b)` and a few color names.
  ///
  /// ```rust
  /// use termframe::framebuffer::Rgb;
  ///
  /// assert_eq!("#ff8000".parse(), Ok(Rgb::new(255, 128, 0)));
  /// assert_eq!("rgb(1, 2, 3)".parse(), Ok(Rgb::new(1, 2, 3)));
  /// assert_eq!("white".parse(), Ok(Rgb::new(255, 255, 255)));
  /// ```
  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    let err = || ParseColorError(s.to_string());
    let value = s.trim().to_ascii_lowercase();

    let named = match value.as_str() {
      "black" => Some(Rgb::new(0, 0, 0)),
      "white" => Some(Rgb::new(255, 255, 255)),
      "red" => Some(Rgb::new(255, 0, 0)),
      "green" => Some(Rgb::new(0, 128, 0)),
      "blue" => Some(Rgb::new(0, 0, 255)),
      "gray" | "grey" => Some(Rgb::new(128, 128, 128)),
      "yellow" => Some(Rgb::new(255, 255, 0)),
      "cyan" => Some(Rgb::new(0, 255, 255)),
      "magenta" => Some(Rgb::new(255, 0, 255)),
      _ => None,
    };
    if let Some(color) = named {
      return Ok(color);
    }

    if let Some(args) = value
      .strip_prefix("rgb(")
      .and_then(|rest| rest.strip_suffix(')'))
    {
      let parts = args
        .split(',')
        .map(|part| part.trim().parse::<u8>())
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|_| err())?;
      return match parts.as_slice() {
        [r, g, b] => Ok(Rgb::new(*r, *g, *b)),
        _ => Err(err()),
      };
    }

    let hex = value.strip_prefix('#').unwrap_or(&value);
    if hex.len() != 6 || !hex.is_ascii() {
      return Err(err());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
    Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
  }
}

/// An owned, fixed-size grid of [`Rgb`] pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
  width: u32,
  height: u32,
  pixels: Vec<Rgb>,
}

impl Framebuffer {
  /// A black buffer of the given size.
  pub fn new(geometry: FrameGeometry) -> Self {
    Self {
      width: geometry.width,
      height: geometry.height,
      pixels: vec![Rgb::BLACK; geometry.area()],
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn geometry(&self) -> FrameGeometry {
    FrameGeometry::new(self.width, self.height)
  }

  /// Out-of-range writes are ignored.
  pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgb) {
    if x < self.width && y < self.height {
      let index = self.index(x, y);
      self.pixels[index] = color;
    }
  }

  /// Panics if `(x, y)` lies outside the buffer.
  pub fn pixel(&self, x: u32, y: u32) -> Rgb {
    assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of range");
    self.pixels[self.index(x, y)]
  }

  pub fn row(&self, y: u32) -> &[Rgb] {
    let start = y as usize * self.width as usize;
    &self.pixels[start..start + self.width as usize]
  }

  pub fn fill(&mut self, color: Rgb) {
    self.pixels.fill(color);
  }

  /// Overwrite the whole buffer with a packed RGB24 frame of the same size.
  pub fn copy_from_rgb24(&mut self, rgb24: &[u8]) -> Result<()> {
    if rgb24.len() != self.pixels.len() * 3 {
      return Err(Error::msg(format!(
        "frame has {} bytes, expected {} for {}x{} rgb24",
        rgb24.len(),
        self.pixels.len() * 3,
        self.width,
        self.height
      )));
    }
    for (pixel, rgb) in self.pixels.iter_mut().zip(rgb24.chunks_exact(3)) {
      *pixel = Rgb::new(rgb[0], rgb[1], rgb[2]);
    }
    Ok(())
  }

  fn index(&self, x: u32, y: u32) -> usize {
    y as usize * self.width as usize + x as usize
  }
}
