//! Still images and animations that decode eagerly into memory.
//!
//! An [`ImageLoader`] holds every frame already fitted, composited and
//! converted, so display is only pacing and rendering.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::{
  codecs::{gif::GifDecoder, webp::WebPDecoder},
  imageops::{self, FilterType},
  AnimationDecoder, Frames, ImageFormat, ImageReader, RgbaImage,
};

use crate::{
  budget::{PlaybackBudget, PlaybackOutcome, Progress, StopReason},
  canvas::TerminalSink,
  error::{Error, Result},
  framebuffer::{Framebuffer, Rgb},
  scale::{center_indent, fit, FrameGeometry, ScaleOptions},
  time::{Duration, Instant},
};

/// Delay used for animation frames that declare none.
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

/// Everything that shapes how an image is turned into a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayOptions {
  pub scale: ScaleOptions,
  /// Resample with a smoothing filter instead of nearest neighbour.
  pub antialias: bool,
  /// Crop away borders of the top-left pixel's color.
  pub auto_trim: bool,
  /// Pixels removed from every border before trimming.
  pub crop_border: u32,
  /// Color transparent pixels are blended onto. Black when unset.
  pub background: Option<Rgb>,
  /// Second color of a checkerboard behind transparent pixels.
  pub pattern: Option<Rgb>,
}

impl Default for DisplayOptions {
  fn default() -> Self {
    Self {
      scale: ScaleOptions::default(),
      antialias: true,
      auto_trim: false,
      crop_border: 0,
      background: None,
      pattern: None,
    }
  }
}

struct StillFrame {
  framebuffer: Framebuffer,
  delay: Duration,
}

/// A decoded image or animation, ready to be shown.
pub struct ImageLoader {
  frames: Vec<StillFrame>,
  indent: u32,
  bound: FrameGeometry,
  center_horizontally: bool,
}

impl ImageLoader {
  /// Decode `path` and fit every frame into the bounding box.
  ///
  /// Fails for anything the `image` crate can't decode, which lets the caller
  /// fall back to video decoding.
  pub fn load_and_scale<P: AsRef<Path>>(
    path: P,
    bound_width: u32,
    bound_height: u32,
    options: &DisplayOptions,
  ) -> Result<Self> {
    let path = path.as_ref();
    let decoded = decode_frames(path)?;
    let first = decoded
      .first()
      .ok_or_else(|| Error::msg(format!("{}: no frames", path.display())))?;

    // Trim is decided on the first frame so all frames keep one geometry.
    let (x, y, width, height) = if options.auto_trim {
      trim_rect(&first.0, options.crop_border)
    } else {
      let (width, height) = first.0.dimensions();
      (0, 0, width, height)
    };
    let fitted = fit(width, height, bound_width, bound_height, &options.scale)?;
    let filter = if options.antialias {
      FilterType::Triangle
    } else {
      FilterType::Nearest
    };
    log::debug!(
      "{}: {} frame(s) {width}x{height} -> {}x{}",
      path.display(),
      decoded.len(),
      fitted.geometry.width,
      fitted.geometry.height
    );

    let frames = decoded
      .into_iter()
      .map(|(image, delay)| {
        let cropped = imageops::crop_imm(&image, x, y, width, height).to_image();
        let resized = imageops::resize(
          &cropped,
          fitted.geometry.width,
          fitted.geometry.height,
          filter,
        );
        StillFrame {
          framebuffer: composite(&resized, options.background, options.pattern),
          delay,
        }
      })
      .collect();

    Ok(Self {
      frames,
      indent: fitted.indent,
      bound: FrameGeometry::new(bound_width, bound_height),
      center_horizontally: options.scale.center_horizontally,
    })
  }

  pub fn is_animation(&self) -> bool {
    self.frames.len() > 1
  }

  pub fn frame_count(&self) -> usize {
    self.frames.len()
  }

  /// Geometry of the fitted frames.
  pub fn geometry(&self) -> FrameGeometry {
    self.frames
      .first()
      .map_or(FrameGeometry::new(0, 0), |frame| frame.framebuffer.geometry())
  }

  /// Show the image once, or cycle the animation until the budget runs out.
  ///
  /// A still image returns right after rendering with
  /// [`StopReason::EndOfStream`]; pausing before the next image is up to the
  /// caller.
  pub fn display(
    &self,
    budget: &PlaybackBudget,
    sink: &mut dyn TerminalSink,
  ) -> Result<PlaybackOutcome> {
    let mut progress = Progress::default();

    if !self.is_animation() {
      if let Some(stop) = budget.check_now(&progress) {
        return Ok(PlaybackOutcome::new(stop, progress));
      }
      if let Some(frame) = self.frames.first() {
        sink.render(&frame.framebuffer, self.indent)?;
        progress.frames_shown = 1;
      }
      progress.loops_completed = 1;
      return Ok(PlaybackOutcome::new(StopReason::EndOfStream, progress));
    }

    let mut end_next_frame = Instant::now();
    let mut is_first = true;
    loop {
      for frame in &self.frames {
        if let Some(stop) = budget.check_now(&progress) {
          return Ok(PlaybackOutcome::new(stop, progress));
        }
        end_next_frame += frame.delay;

        if !is_first {
          sink.jump_up_pixels(frame.framebuffer.height())?;
        }
        sink.render(&frame.framebuffer, self.indent)?;
        is_first = false;
        progress.frames_shown += 1;

        end_next_frame.wait_until();
      }
      progress.loops_completed += 1;
    }
  }

  /// Pan a viewport over the first frame by `(dx, dy)` pixels every `tick`.
  ///
  /// The viewport is the image clipped to the bounding box. It wraps around
  /// the image edges; a loop completes each time it returns to the origin.
  pub fn scroll(
    &self,
    budget: &PlaybackBudget,
    dx: i32,
    dy: i32,
    tick: Duration,
    sink: &mut dyn TerminalSink,
  ) -> Result<PlaybackOutcome> {
    let image = &self
      .frames
      .first()
      .ok_or("nothing to scroll")?
      .framebuffer;
    let view = FrameGeometry::new(
      image.width().min(self.bound.width),
      image.height().min(self.bound.height),
    );
    let indent = if self.center_horizontally {
      center_indent(view.width, self.bound.width)
    } else {
      0
    };
    let mut viewport = Framebuffer::new(view);

    let (image_width, image_height) = (i64::from(image.width()), i64::from(image.height()));
    let (mut x_origin, mut y_origin) = (0i64, 0i64);
    let mut progress = Progress::default();
    let mut end_next_frame = Instant::now();
    let mut is_first = true;

    loop {
      if let Some(stop) = budget.check_now(&progress) {
        return Ok(PlaybackOutcome::new(stop, progress));
      }
      end_next_frame += tick;

      for y in 0..view.height {
        let source_y = (y_origin + i64::from(y)) % image_height;
        for x in 0..view.width {
          let source_x = (x_origin + i64::from(x)) % image_width;
          viewport.set_pixel(x, y, image.pixel(source_x as u32, source_y as u32));
        }
      }

      if !is_first {
        sink.jump_up_pixels(view.height)?;
      }
      sink.render(&viewport, indent)?;
      is_first = false;
      progress.frames_shown += 1;

      x_origin = (x_origin + i64::from(dx)).rem_euclid(image_width);
      y_origin = (y_origin + i64::from(dy)).rem_euclid(image_height);
      if x_origin == 0 && y_origin == 0 {
        progress.loops_completed += 1;
      }

      end_next_frame.wait_until();
    }
  }
}

/// Decode every frame of `path` with its display delay.
fn decode_frames(path: &Path) -> Result<Vec<(RgbaImage, Duration)>> {
  let reader = ImageReader::open(path)?.with_guessed_format()?;
  match reader.format() {
    Some(ImageFormat::Gif) => {
      let decoder = GifDecoder::new(BufReader::new(File::open(path)?))?;
      collect_animation(decoder.into_frames())
    }
    Some(ImageFormat::WebP) => {
      let decoder = WebPDecoder::new(BufReader::new(File::open(path)?))?;
      if decoder.has_animation() {
        collect_animation(decoder.into_frames())
      } else {
        Ok(vec![(reader.decode()?.to_rgba8(), Duration::ZERO)])
      }
    }
    // APNG is shown as its default image.
    Some(_) => Ok(vec![(reader.decode()?.to_rgba8(), Duration::ZERO)]),
    None => Err(Error::msg(format!(
      "{}: not a recognized image format",
      path.display()
    ))),
  }
}

fn collect_animation(frames: Frames<'_>) -> Result<Vec<(RgbaImage, Duration)>> {
  frames
    .map(|frame| -> Result<(RgbaImage, Duration)> {
      let frame = frame?;
      let (numer, denom) = frame.delay().numer_denom_ms();
      let delay = if numer == 0 || denom == 0 {
        DEFAULT_FRAME_DELAY
      } else {
        Duration::from_micros((f64::from(numer) * 1000.0 / f64::from(denom)).round() as i64)
      };
      Ok((frame.into_buffer(), delay))
    })
    .collect()
}

/// The `(x, y, width, height)` left after removing `border` pixels on every
/// side and then every outer row and column matching the top-left pixel.
fn trim_rect(image: &RgbaImage, border: u32) -> (u32, u32, u32, u32) {
  let (width, height) = image.dimensions();
  if border.saturating_mul(2) >= width || border.saturating_mul(2) >= height {
    return (0, 0, width, height);
  }
  let (x_start, y_start, x_end, y_end) = (border, border, width - border, height - border);

  let corner = *image.get_pixel(x_start, y_start);
  let row_is_border = |y: u32| (x_start..x_end).all(|x| *image.get_pixel(x, y) == corner);
  let column_is_border = |x: u32| (y_start..y_end).all(|y| *image.get_pixel(x, y) == corner);

  let mut top = y_start;
  while top < y_end && row_is_border(top) {
    top += 1;
  }
  if top == y_end {
    // Uniform: nothing to trim beyond the border.
    return (x_start, y_start, x_end - x_start, y_end - y_start);
  }
  let mut bottom = y_end;
  while row_is_border(bottom - 1) {
    bottom -= 1;
  }
  let mut left = x_start;
  while column_is_border(left) {
    left += 1;
  }
  let mut right = x_end;
  while column_is_border(right - 1) {
    right -= 1;
  }

  (left, top, right - left, bottom - top)
}

/// Blend an RGBA image onto the background (or checkerboard) color.
fn composite(image: &RgbaImage, background: Option<Rgb>, pattern: Option<Rgb>) -> Framebuffer {
  let background = background.unwrap_or(Rgb::BLACK);
  let mut framebuffer = Framebuffer::new(FrameGeometry::new(image.width(), image.height()));

  for (x, y, pixel) in image.enumerate_pixels() {
    let [r, g, b, alpha] = pixel.0;
    let behind = match pattern {
      Some(pattern) if (x / 4 + y / 2) % 2 == 1 => pattern,
      _ => background,
    };
    let blend = |fg: u8, bg: u8| -> u8 {
      let alpha = u32::from(alpha);
      ((u32::from(fg) * alpha + u32::from(bg) * (255 - alpha) + 127) / 255) as u8
    };
    framebuffer.set_pixel(
      x,
      y,
      Rgb::new(blend(r, behind.r), blend(g, behind.g), blend(b, behind.b)),
    );
  }
  framebuffer
}
