//! Rendering framebuffers as 24-bit ANSI half-block characters.

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::framebuffer::{Framebuffer, Rgb};

const LOWER_HALF_BLOCK: &str = "\u{2584}";
const UPPER_HALF_BLOCK: &str = "\u{2580}";

/// The only two operations the playback loops need from a terminal.
pub trait TerminalSink {
  /// Draw the buffer at the cursor position, shifted right by `indent` cells.
  fn render(&mut self, framebuffer: &Framebuffer, indent: u32) -> io::Result<()>;

  /// Move the cursor up over a previously rendered frame of `pixels` height,
  /// so the next [`render`](TerminalSink::render) overwrites it in place.
  fn jump_up_pixels(&mut self, pixels: u32) -> io::Result<()>;
}

/// Number of text rows a frame of `pixels` height occupies.
pub fn rows_for_pixels(pixels: u32) -> u32 {
  pixels.div_ceil(2)
}

/// A [`TerminalSink`] that packs two pixel rows into one text row.
///
/// By default the lower half block is drawn with the bottom pixel as
/// foreground and the top pixel as background; some fonts render the upper
/// half block more cleanly, which `use_upper_block` switches to.
pub struct TerminalCanvas<W: Write> {
  out: W,
  use_upper_block: bool,
  buffer: String,
}

impl<W: Write> TerminalCanvas<W> {
  pub fn new(out: W, use_upper_block: bool) -> Self {
    Self {
      out,
      use_upper_block,
      buffer: String::new(),
    }
  }

  pub fn cursor_off(&mut self) -> io::Result<()> {
    self.out.write_all(b"\x1B[?25l")?;
    self.out.flush()
  }

  pub fn cursor_on(&mut self) -> io::Result<()> {
    self.out.write_all(b"\x1B[?25h")?;
    self.out.flush()
  }

  pub fn clear_screen(&mut self) -> io::Result<()> {
    self.out.write_all(b"\x1B[2J\x1B[H")?;
    self.out.flush()
  }

  /// Escape hatch to access the inner writer.
  pub fn as_inner_mut(&mut self) -> &mut W {
    &mut self.out
  }

  pub fn into_inner(self) -> W {
    self.out
  }

  fn encode(&mut self, framebuffer: &Framebuffer, indent: u32) {
    let buffer = &mut self.buffer;
    buffer.clear();

    let mut y = 0;
    while y < framebuffer.height() {
      if indent > 0 {
        let _ = write!(buffer, "\x1B[{indent}C");
      }

      let top = framebuffer.row(y);
      let bottom = (y + 1 < framebuffer.height()).then(|| framebuffer.row(y + 1));
      let mut current: Option<(Rgb, Option<Rgb>)> = None;

      for (x, &upper) in top.iter().enumerate() {
        let lower = bottom.map(|row| row[x]);
        if current != Some((upper, lower)) {
          match (lower, self.use_upper_block) {
            (Some(lower), false) => push_colors(buffer, lower, Some(upper)),
            (Some(lower), true) => push_colors(buffer, upper, Some(lower)),
            // Odd height: only the top half of the last text row is used.
            (None, _) => push_colors(buffer, upper, None),
          }
          current = Some((upper, lower));
        }
        let glyph = match (lower, self.use_upper_block) {
          (Some(_), false) => LOWER_HALF_BLOCK,
          _ => UPPER_HALF_BLOCK,
        };
        buffer.push_str(glyph);
      }
      buffer.push_str("\x1B[0m\n");
      y += 2;
    }
  }
}

fn push_colors(buffer: &mut String, foreground: Rgb, background: Option<Rgb>) {
  let Rgb { r, g, b } = foreground;
  match background {
    Some(bg) => {
      let _ = write!(
        buffer,
        "\x1B[38;2;{r};{g};{b};48;2;{};{};{}m",
        bg.r, bg.g, bg.b
      );
    }
    None => {
      let _ = write!(buffer, "\x1B[0;38;2;{r};{g};{b}m");
    }
  }
}

impl<W: Write> TerminalSink for TerminalCanvas<W> {
  fn render(&mut self, framebuffer: &Framebuffer, indent: u32) -> io::Result<()> {
    self.encode(framebuffer, indent);
    self.out.write_all(self.buffer.as_bytes())?;
    self.out.flush()
  }

  fn jump_up_pixels(&mut self, pixels: u32) -> io::Result<()> {
    let rows = rows_for_pixels(pixels);
    if rows > 0 {
      write!(self.out, "\x1B[{rows}A")?;
    }
    Ok(())
  }
}
