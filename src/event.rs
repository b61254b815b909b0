//! Typed events produced while an ffmpeg decoder process runs.

#[derive(Debug, Clone, PartialEq)]
pub enum FfmpegEvent {
  ParsedVersion(FfmpegVersion),
  ParsedStreamMapping(String),
  ParsedInput(FfmpegInput),
  ParsedOutput(FfmpegOutput),
  ParsedInputStream(Stream),
  ParsedOutputStream(Stream),
  ParsedDuration(FfmpegDuration),
  Log(LogLevel, String),
  LogEOF,
  /// An error that didn't originate from the ffmpeg logs
  Error(String),
  Progress(FfmpegProgress),
  OutputFrame(OutputVideoFrame),
  /// The frame reader reached the end of ffmpeg's stdout.
  Done,
}

/// The log level prefix ffmpeg writes with `-loglevel level+info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
  Info,
  Warning,
  Error,
  Fatal,
  Unknown,
}

impl LogLevel {
  pub fn is_error(&self) -> bool {
    matches!(self, LogLevel::Error | LogLevel::Fatal)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegInput {
  pub index: u32,
  /// Duration in seconds, when the container announces one.
  pub duration: Option<f64>,
  pub raw_log_message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegDuration {
  pub input_index: u32,
  pub duration: f64,
  pub raw_log_message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegOutput {
  pub to: String,
  pub index: u32,
  pub raw_log_message: String,
}

impl FfmpegOutput {
  /// Detects one of several identifiers which indicate output to stdout
  pub fn is_stdout(&self) -> bool {
    ["pipe", "pipe:", "pipe:1"].contains(&self.to.as_str())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
  /// Codec or container format, e.g. `h264` or `rawvideo`.
  pub format: String,
  /// Language tag in parentheses after the index, or empty.
  pub language: String,
  /// The index of the input or output that this stream belongs to
  pub parent_index: u32,
  /// Index of the stream inside its input or output.
  pub stream_index: u32,
  /// The stderr line that this stream was parsed from
  pub raw_log_message: String,
  pub type_specific_data: StreamTypeSpecificData,
}

impl Stream {
  pub fn is_video(&self) -> bool {
    matches!(self.type_specific_data, StreamTypeSpecificData::Video(_))
  }

  pub fn video_data(&self) -> Option<&VideoStream> {
    match &self.type_specific_data {
      StreamTypeSpecificData::Video(video) => Some(video),
      StreamTypeSpecificData::Other => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamTypeSpecificData {
  Video(VideoStream),
  /// Audio, subtitles, data: nothing the player needs to look into.
  Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoStream {
  /// Corresponds to stream `-pix_fmt` parameter, e.g. `rgb24`
  pub pix_fmt: String,
  /// Width in pixels
  pub width: u32,
  /// Height in pixels
  pub height: u32,
  /// Announced frames per second
  pub fps: Option<f32>,
  /// ffmpeg's guess of the real frame rate, used when `fps` is missing
  pub tbr: Option<f32>,
}

impl VideoStream {
  /// Best known frame rate, or 0 when the stream doesn't say.
  pub fn frame_rate(&self) -> f64 {
    let valid = |rate: &f32| rate.is_finite() && *rate > 0.0;
    self
      .fps
      .filter(valid)
      .or(self.tbr.filter(valid))
      .map_or(0.0, f64::from)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegVersion {
  pub version: String,
  pub raw_log_message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegProgress {
  /// index of the current output frame
  pub frame: u32,

  /// frames per second
  pub fps: f32,

  /// The raw time string in a format like `00:03:29.04`
  pub time: String,

  /// Processing speed as a ratio of the input duration
  ///
  /// - 1x is realtime
  /// - 2x means 2 seconds of input are processed in 1 second of wall clock time
  pub speed: f32,

  /// The line that this progress was parsed from
  pub raw_log_message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputVideoFrame {
  pub width: u32,
  pub height: u32,
  pub pix_fmt: String,
  pub output_index: u32,
  pub data: Vec<u8>,
  /// Zero-based index of this frame in the output stream.
  pub frame_num: u32,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn video(fps: Option<f32>, tbr: Option<f32>) -> VideoStream {
    VideoStream {
      pix_fmt: "rgb24".to_string(),
      width: 1,
      height: 1,
      fps,
      tbr,
    }
  }

  #[test]
  fn test_frame_rate_prefers_fps() {
    assert_eq!(video(Some(24.0), Some(30.0)).frame_rate(), 24.0);
    assert_eq!(video(None, Some(30.0)).frame_rate(), 30.0);
    assert_eq!(video(None, None).frame_rate(), 0.0);
  }

  #[test]
  fn test_is_stdout() {
    let output = FfmpegOutput {
      to: "pipe:".to_string(),
      index: 0,
      raw_log_message: String::new(),
    };
    assert!(output.is_stdout());
  }
}
