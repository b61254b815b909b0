//! Parsing of the ffmpeg log written to stderr.
//!
//! Only the parts the player needs are recognised: the version banner,
//! input/output sections with their streams, stream mappings, durations,
//! progress lines and the level prefix of everything else.

use std::{
  io::{BufRead, BufReader, ErrorKind, Read},
  str::from_utf8,
};

use crate::event::{
  FfmpegDuration, FfmpegEvent, FfmpegInput, FfmpegOutput, FfmpegProgress, FfmpegVersion,
  LogLevel, Stream, StreamTypeSpecificData, VideoStream,
};

#[derive(Debug, Clone, PartialEq)]
enum LogSection {
  Input(u32),
  Output(u32),
  StreamMapping,
  Other,
}

pub struct FfmpegLogParser<R: Read> {
  reader: BufReader<R>,
  cur_section: LogSection,
}

impl<R: Read> FfmpegLogParser<R> {
  pub fn new(inner: R) -> Self {
    Self {
      reader: BufReader::new(inner),
      cur_section: LogSection::Other,
    }
  }

  /// Consume one line from the inner reader and turn it into an event.
  ///
  /// Lines end in `\n`, `\r\n`, or a bare `\r` (progress updates which
  /// overwrite the previous line).
  pub fn parse_next_event(&mut self) -> anyhow::Result<FfmpegEvent> {
    let mut buf = Vec::<u8>::new();
    let bytes_read = read_line_any(&mut self.reader, &mut buf)?;
    if bytes_read == 0 {
      return Ok(FfmpegEvent::LogEOF);
    }

    let line = from_utf8(buf.as_slice())?.trim();
    let raw_log_message = line.to_string();

    if let Some(index) = try_parse_input(line) {
      self.cur_section = LogSection::Input(index);
      return Ok(FfmpegEvent::ParsedInput(FfmpegInput {
        index,
        duration: None,
        raw_log_message,
      }));
    }
    if let Some(output) = try_parse_output(line) {
      self.cur_section = LogSection::Output(output.index);
      return Ok(FfmpegEvent::ParsedOutput(output));
    }
    if line.contains("Stream mapping:") {
      self.cur_section = LogSection::StreamMapping;
    }

    if let Some(version) = try_parse_version(line) {
      return Ok(FfmpegEvent::ParsedVersion(FfmpegVersion {
        version,
        raw_log_message,
      }));
    }
    if let Some(duration) = try_parse_duration(line) {
      if let LogSection::Input(input_index) = self.cur_section {
        return Ok(FfmpegEvent::ParsedDuration(FfmpegDuration {
          input_index,
          duration,
          raw_log_message,
        }));
      }
    }
    if self.cur_section == LogSection::StreamMapping && line.contains("Stream #") {
      return Ok(FfmpegEvent::ParsedStreamMapping(raw_log_message));
    }
    if let Some(stream) = try_parse_stream(line) {
      return match self.cur_section {
        LogSection::Input(_) => Ok(FfmpegEvent::ParsedInputStream(stream)),
        LogSection::Output(_) => Ok(FfmpegEvent::ParsedOutputStream(stream)),
        LogSection::Other | LogSection::StreamMapping => {
          anyhow::bail!("Unexpected stream specification: {line}")
        }
      };
    }
    if let Some(progress) = try_parse_progress(line) {
      self.cur_section = LogSection::Other;
      return Ok(FfmpegEvent::Progress(progress));
    }

    Ok(FfmpegEvent::Log(parse_level(line), raw_log_message))
  }
}

/// Reads one line terminated by `\r` or `\n` into `buf`, skipping leading
/// terminators left over from the previous line. Returns 0 at end of input.
fn read_line_any<R: BufRead + ?Sized>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize> {
  let is_delim = |b: &u8| *b == b'\r' || *b == b'\n';
  let mut read = 0;
  loop {
    let (done, used) = {
      let available = match reader.fill_buf() {
        Ok(available) => available,
        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
        Err(e) => return Err(e),
      };
      if available.is_empty() {
        return Ok(read);
      }

      let skip = if buf.is_empty() {
        available.iter().take_while(|b| is_delim(b)).count()
      } else {
        0
      };
      match available[skip..].iter().position(is_delim) {
        Some(i) => {
          buf.extend_from_slice(&available[skip..skip + i]);
          (true, skip + i + 1)
        }
        None => {
          buf.extend_from_slice(&available[skip..]);
          (false, available.len())
        }
      }
    };
    reader.consume(used);
    // Skipped terminators don't count as content on their own.
    read += if buf.is_empty() { 0 } else { used };
    if done && !buf.is_empty() {
      return Ok(read);
    }
  }
}

/// Split on commas that are not nested inside parentheses.
fn split_top_level_commas(string: &str) -> Vec<&str> {
  let mut parts = Vec::new();
  let mut depth = 0usize;
  let mut start = 0;
  for (i, c) in string.char_indices() {
    match c {
      '(' => depth += 1,
      ')' => depth = depth.saturating_sub(1),
      ',' if depth == 0 => {
        parts.push(&string[start..i]);
        start = i + 1;
      }
      _ => {}
    }
  }
  if start < string.len() {
    parts.push(&string[start..]);
  }
  parts
}

fn strip_info(string: &str) -> &str {
  string.strip_prefix("[info]").unwrap_or(string).trim()
}

fn parse_level(line: &str) -> LogLevel {
  if line.contains("[info]") {
    LogLevel::Info
  } else if line.contains("[warning]") {
    LogLevel::Warning
  } else if line.contains("[error]") {
    LogLevel::Error
  } else if line.contains("[fatal]") {
    LogLevel::Fatal
  } else {
    LogLevel::Unknown
  }
}

/// Parses the ffmpeg version from the first line of its banner.
///
/// ```rust
/// use termframe::log_parser::try_parse_version;
///
/// let line = "[info] ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023 the FFmpeg developers\n";
/// assert_eq!(try_parse_version(line).unwrap(), "6.1.1-3ubuntu5");
/// ```
pub fn try_parse_version(string: &str) -> Option<String> {
  strip_info(string)
    .strip_prefix("ffmpeg version ")?
    .split_whitespace()
    .next()
    .map(|s| s.to_string())
}

/// Parses the index out of an input section header.
///
/// ```rust
/// use termframe::log_parser::try_parse_input;
///
/// let line = "[info] Input #0, matroska,webm, from 'clip.mkv':\n";
/// assert_eq!(try_parse_input(line), Some(0));
/// ```
pub fn try_parse_input(string: &str) -> Option<u32> {
  strip_info(string)
    .strip_prefix("Input #")?
    .split(',')
    .next()?
    .trim()
    .parse::<u32>()
    .ok()
}

/// Parses the duration line of an input section, in seconds.
///
/// ```rust
/// use termframe::log_parser::try_parse_duration;
///
/// let line = "[info]   Duration: 00:00:05.00, start: 0.000000, bitrate: 16 kb/s\n";
/// assert_eq!(try_parse_duration(line), Some(5.0));
///
/// let unknown = "[info]   Duration: N/A, start: 0.000000, bitrate: N/A\n";
/// assert_eq!(try_parse_duration(unknown), None);
/// ```
pub fn try_parse_duration(string: &str) -> Option<f64> {
  let value = strip_info(string)
    .strip_prefix("Duration:")?
    .trim()
    .split(',')
    .next()?;
  value
    .parse::<crate::time::Duration>()
    .ok()
    .map(|d| d.as_seconds())
}

/// Parses an output section header.
///
/// ```rust
/// use termframe::log_parser::try_parse_output;
///
/// let output = try_parse_output("[info] Output #0, rawvideo, to 'pipe:':\n").unwrap();
/// assert_eq!(output.index, 0);
/// assert_eq!(output.to, "pipe:");
/// assert!(output.is_stdout());
/// ```
pub fn try_parse_output(string: &str) -> Option<FfmpegOutput> {
  let raw_log_message = string.to_string();
  let rest = strip_info(string).strip_prefix("Output #")?;

  let index = rest.split(',').next()?.trim().parse::<u32>().ok()?;
  let to = rest.split(" to '").nth(1)?.split('\'').next()?.to_string();

  Some(FfmpegOutput {
    index,
    to,
    raw_log_message,
  })
}

/// Parses a stream line inside an input or output section.
///
/// ```rust
/// use termframe::log_parser::try_parse_stream;
///
/// let line = "[info]   Stream #0:0(eng): Video: h264 (High), yuv420p(tv, bt709, progressive), 1920x1080 [SAR 1:1 DAR 16:9], 23.98 fps, 23.98 tbr, 1k tbn (default)\n";
/// let stream = try_parse_stream(line).unwrap();
/// assert_eq!(stream.format, "h264");
/// assert_eq!(stream.language, "eng");
/// assert_eq!((stream.parent_index, stream.stream_index), (0, 0));
/// let video = stream.video_data().unwrap();
/// assert_eq!(video.pix_fmt, "yuv420p");
/// assert_eq!((video.width, video.height), (1920, 1080));
/// assert_eq!(video.fps, Some(23.98));
///
/// let audio = try_parse_stream("[info]   Stream #0:1(eng): Audio: opus, 48000 Hz, stereo, fltp\n").unwrap();
/// assert!(!audio.is_video());
/// ```
pub fn try_parse_stream(string: &str) -> Option<Stream> {
  let raw_log_message = string.to_string();
  let rest = strip_info(string).strip_prefix("Stream #")?;

  let parts = split_top_level_commas(rest);
  let mut colon_iter = parts.first()?.split(':');

  let parent_index = colon_iter.next()?.trim().parse::<u32>().ok()?;

  // Indices may look like `2[0x3](eng)`: drop the bracketed id, keep the language.
  let indices = colon_iter
    .next()?
    .split(['[', ']'])
    .step_by(2)
    .collect::<String>();
  let mut parenthesis_iter = indices.split('(');
  let stream_index = parenthesis_iter.next()?.trim().parse::<u32>().ok()?;
  let language = parenthesis_iter
    .next()
    .map_or(String::new(), |lang| lang.trim_end_matches(')').to_string());

  let stream_type = colon_iter.next()?.trim();
  let format = colon_iter
    .next()?
    .trim()
    .split([' ', '('])
    .next()?
    .to_string();

  let type_specific_data = match stream_type {
    "Video" => try_parse_video_stream(&parts[1..])?,
    _ => StreamTypeSpecificData::Other,
  };

  Some(Stream {
    format,
    language,
    parent_index,
    stream_index,
    raw_log_message,
    type_specific_data,
  })
}

fn try_parse_video_stream(parts: &[&str]) -> Option<StreamTypeSpecificData> {
  let mut parts = parts.iter().map(|part| part.trim());

  let pix_fmt = parts.next()?.split([' ', '(']).next()?.to_string();

  let dims = parts.next()?.split_whitespace().next()?;
  let (width, height) = dims.split_once('x')?;
  let width = width.parse::<u32>().ok()?;
  let height = height.parse::<u32>().ok()?;

  // Everything else is optional and may appear in any order.
  let mut fps = None;
  let mut tbr = None;
  for part in parts {
    let mut words = part.split_whitespace();
    let (Some(value), Some(unit)) = (words.next(), words.next()) else {
      continue;
    };
    match unit {
      "fps" => fps = parse_rate(value),
      "tbr" => tbr = parse_rate(value),
      _ => {}
    }
  }

  Some(StreamTypeSpecificData::Video(VideoStream {
    pix_fmt,
    width,
    height,
    fps,
    tbr,
  }))
}

/// ffmpeg abbreviates large rates, e.g. `1k` or `90k`.
fn parse_rate(value: &str) -> Option<f32> {
  match value.strip_suffix('k') {
    Some(thousands) => thousands.parse::<f32>().ok().map(|v| v * 1000.0),
    None => value.parse::<f32>().ok(),
  }
}

/// Parses a progress line.
///
/// ```rust
/// use termframe::log_parser::try_parse_progress;
///
/// let line = "[info] frame= 1996 fps=1984 q=-1.0 Lsize=     372kB time=00:01:19.72 bitrate=  38.2kbits/s speed=79.2x\n";
/// let progress = try_parse_progress(line).unwrap();
/// assert_eq!(progress.frame, 1996);
/// assert_eq!(progress.fps, 1984.0);
/// assert_eq!(progress.time, "00:01:19.72");
/// assert_eq!(progress.speed, 79.2);
/// ```
pub fn try_parse_progress(string: &str) -> Option<FfmpegProgress> {
  let raw_log_message = string.to_string();
  let string = strip_info(string);

  let field = |name: &str| -> Option<&str> { string.split(name).nth(1)?.split_whitespace().next() };

  let frame = field("frame=")?.parse::<u32>().ok()?;
  let fps = field("fps=")?.parse::<f32>().ok()?;
  let time = field("time=")?.to_string();
  // `speed=N/A` on the first update, and sometimes a space after the `=`.
  let speed = string
    .split("speed=")
    .nth(1)
    .and_then(|rest| rest.trim().trim_end_matches('x').parse::<f32>().ok())
    .unwrap_or(0.0);

  Some(FfmpegProgress {
    frame,
    fps,
    time,
    speed,
    raw_log_message,
  })
}
