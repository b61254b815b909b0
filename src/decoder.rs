//! The capability a video playback session consumes.

use crate::error::OpenError;
use crate::scale::FrameGeometry;
use crate::time::Duration;

/// Frame rate assumed when a stream doesn't announce one.
pub const DEFAULT_FRAME_RATE: f64 = 25.0;

/// What a decoder knows about the selected video stream before playback.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
  pub width: u32,
  pub height: u32,
  /// Frames per second; non-positive when unknown.
  pub frame_rate: f64,
  /// Pixel format of the frames the decoder hands out, e.g. `rgb24`.
  pub pix_fmt: String,
}

impl StreamInfo {
  pub fn geometry(&self) -> FrameGeometry {
    FrameGeometry::new(self.width, self.height)
  }

  /// Display time of one frame.
  pub fn frame_duration(&self) -> Duration {
    let fps = if self.frame_rate.is_finite() && self.frame_rate > 0.0 {
      self.frame_rate
    } else {
      DEFAULT_FRAME_RATE
    };
    Duration::from_nanos((1e9 / fps).round() as i64)
  }
}

/// One decoded frame in the decoder's pixel format.
#[derive(Debug, Clone)]
pub struct RawFrame {
  pub width: u32,
  pub height: u32,
  pub data: Vec<u8>,
}

/// The result of submitting one encoded unit to the decoder.
#[derive(Debug, Clone)]
pub enum DecodeUnit {
  /// A complete frame of the selected stream.
  Frame(RawFrame),
  /// A unit of the selected stream that produced no frame yet.
  Incomplete,
  /// A unit of the selected stream that failed to decode.
  Corrupt(String),
  /// Anything not belonging to the selected stream.
  Foreign,
}

/// A lazily decoded, possibly unbounded sequence of frames.
///
/// Restarting requires opening a new decoder.
pub trait VideoDecoder {
  fn probe(&self) -> &StreamInfo;

  /// Deliver every following frame as packed `rgb24` at `geometry`.
  ///
  /// The colour conversion and resampling belong to the decoder; the playback
  /// session only copies finished frames.
  fn set_output_geometry(&mut self, geometry: FrameGeometry) -> Result<(), OpenError>;

  /// The next unit, or `None` once the stream is exhausted.
  fn next_unit(&mut self) -> Option<DecodeUnit>;

  /// Hand a consumed frame back so its buffer can hold a later one.
  fn recycle(&mut self, _frame: RawFrame) {}

  /// Release every resource held by the decoder. Must be idempotent.
  fn close(&mut self);
}
