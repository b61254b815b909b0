//! Fitting a source frame into the display region.

use crate::error::InvalidGeometry;

/// Knobs that decide how a source is fitted into the bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScaleOptions {
  /// Allow enlarging sources that are smaller than the bounding box.
  pub upscale: bool,
  /// Always fill the full bound width, letting the height overflow.
  pub fill_width: bool,
  /// Always fill the full bound height, letting the width overflow.
  /// Only meaningful while scrolling horizontally.
  pub fill_height: bool,
  /// Report a left indentation that centers the fitted frame.
  pub center_horizontally: bool,
}

impl ScaleOptions {
  /// The options video is fitted with: a frame never fills the height.
  pub fn for_video(&self) -> Self {
    Self {
      fill_height: false,
      ..*self
    }
  }
}

/// Width and height of a frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
  pub width: u32,
  pub height: u32,
}

impl FrameGeometry {
  pub const fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  /// Number of pixels in a frame of this size.
  pub fn area(&self) -> usize {
    self.width as usize * self.height as usize
  }
}

/// Result of [`fit`]: the target geometry plus the indentation the sink
/// should apply when centering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fit {
  pub geometry: FrameGeometry,
  pub indent: u32,
}

/// Compute the display geometry of a `source_width`×`source_height` frame
/// inside a `bound_width`×`bound_height` box.
///
/// Without fill flags the aspect ratio is preserved and whichever axis limits
/// first wins. A fill flag pins that axis to the bound and scales the other
/// proportionally; with both flags the larger factor wins. Sources are never
/// enlarged unless `upscale` is set.
///
/// ```rust
/// use termframe::scale::{fit, ScaleOptions};
///
/// let fitted = fit(1920, 1080, 80, 40, &ScaleOptions::default()).unwrap();
/// assert_eq!((fitted.geometry.width, fitted.geometry.height), (71, 40));
///
/// let small = fit(10, 10, 100, 100, &ScaleOptions::default()).unwrap();
/// assert_eq!((small.geometry.width, small.geometry.height), (10, 10));
/// ```
pub fn fit(
  source_width: u32,
  source_height: u32,
  bound_width: u32,
  bound_height: u32,
  options: &ScaleOptions,
) -> Result<Fit, InvalidGeometry> {
  if source_width == 0 || source_height == 0 {
    return Err(InvalidGeometry {
      width: source_width,
      height: source_height,
    });
  }

  let width_fraction = bound_width as f64 / source_width as f64;
  let height_fraction = bound_height as f64 / source_height as f64;

  let mut factor = match (options.fill_width, options.fill_height) {
    (true, true) => width_fraction.max(height_fraction),
    (true, false) => width_fraction,
    (false, true) => height_fraction,
    (false, false) => width_fraction.min(height_fraction),
  };
  if factor > 1.0 && !options.upscale {
    factor = 1.0;
  }

  let width = scaled(source_width, factor);
  let height = scaled(source_height, factor);

  let indent = if options.center_horizontally && width < bound_width {
    (bound_width - width) / 2
  } else {
    0
  };

  Ok(Fit {
    geometry: FrameGeometry { width, height },
    indent,
  })
}

/// Left indentation that centers a `width` wide frame inside `bound_width`.
pub fn center_indent(width: u32, bound_width: u32) -> u32 {
  bound_width.saturating_sub(width) / 2
}

/// An ffmpeg `scale` filter that resizes every frame to what [`fit`] computes
/// for it inside `bound_width`×`bound_height`.
///
/// The expressions repeat the arithmetic of [`fit`] on ffmpeg's own `iw` and
/// `ih`, so the size ffmpeg announces for its output is a fixed point of
/// [`fit`] for the same bound and options.
///
/// ```rust
/// use termframe::scale::{scale_filter, ScaleOptions};
///
/// assert_eq!(
///   scale_filter(80, 40, &ScaleOptions::default()),
///   "scale=w='max(1,round(iw*min(1,min(80/iw,40/ih))))':h='max(1,round(ih*min(1,min(80/iw,40/ih))))':flags=bilinear"
/// );
/// ```
pub fn scale_filter(bound_width: u32, bound_height: u32, options: &ScaleOptions) -> String {
  let width_fraction = format!("{bound_width}/iw");
  let height_fraction = format!("{bound_height}/ih");
  let factor = match (options.fill_width, options.fill_height) {
    (true, true) => format!("max({width_fraction},{height_fraction})"),
    (true, false) => width_fraction,
    (false, true) => height_fraction,
    (false, false) => format!("min({width_fraction},{height_fraction})"),
  };
  let factor = if options.upscale {
    factor
  } else {
    format!("min(1,{factor})")
  };
  format!("scale=w='max(1,round(iw*{factor}))':h='max(1,round(ih*{factor}))':flags=bilinear")
}

fn scaled(dimension: u32, factor: f64) -> u32 {
  let value = (dimension as f64 * factor).round();
  if value < 1.0 {
    1
  } else if value > u32::MAX as f64 {
    u32::MAX
  } else {
    value as u32
  }
}
