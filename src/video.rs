//! Paced video playback.
//!
//! A [`PlaybackSession`] owns a [`VideoDecoder`] for its whole lifetime and
//! drives the decode, scale and render loop against a [`PlaybackBudget`].
//! [`FfmpegDecoder`] is the decoder used for real files: an ffmpeg child
//! process emitting `rgb24` frames on stdout.

use crate::{
  budget::{PlaybackBudget, PlaybackOutcome, Progress, StopReason},
  canvas::TerminalSink,
  child::FfmpegChild,
  command::FfmpegCommand,
  decoder::{DecodeUnit, RawFrame, StreamInfo, VideoDecoder},
  error::{Error, OpenError, Result},
  event::{FfmpegEvent, VideoStream},
  iter::FfmpegIterator,
  metadata::FfmpegMetadata,
  framebuffer::Framebuffer,
  scale::{fit, Fit, FrameGeometry, ScaleOptions},
  time::{Duration, Instant},
};

/// Log fragments that identify why ffmpeg refused to decode a source.
const NO_STREAM_ERRORS: [&str; 2] = ["matches no streams", "does not contain any stream"];
const CODEC_ERRORS: [&str; 3] = ["Decoder (codec", "Unsupported codec", "unknown codec"];

/// A [`VideoDecoder`] backed by an ffmpeg child process.
///
/// ffmpeg does the colour conversion and the resizing: the stream it
/// announces, and therefore [`probe`](VideoDecoder::probe), already has the
/// size its scale filter computed for the bounding box.
pub struct FfmpegDecoder {
  child: Option<FfmpegChild>,
  iter: Option<FfmpegIterator>,
  info: StreamInfo,
}

impl FfmpegDecoder {
  /// Start decoding the first video stream of `source`, a path, URL or `-`
  /// for standard input, with frames fitted into the bounding box.
  pub fn open(
    source: &str,
    bound_width: u32,
    bound_height: u32,
    options: &ScaleOptions,
  ) -> std::result::Result<Self, OpenError> {
    let mut command = FfmpegCommand::new();
    command
      .nostdin()
      .input(source)
      .first_video_stream()
      .fit_to(bound_width, bound_height, &options.for_video())
      .rawvideo();
    Self::spawn(&mut command)
  }

  /// Spawn a prepared command and wait for ffmpeg to announce its output
  /// stream. The command must write `rgb24` rawvideo to stdout.
  pub fn spawn(command: &mut FfmpegCommand) -> std::result::Result<Self, OpenError> {
    let mut child = command
      .spawn()
      .map_err(|e| OpenError::Unreadable(format!("cannot run ffmpeg: {e}")))?;
    let iter = child.iter();

    // From here on, dropping `decoder` reaps the child.
    let mut decoder = Self {
      child: Some(child),
      iter: None,
      info: StreamInfo {
        width: 0,
        height: 0,
        frame_rate: 0.0,
        pix_fmt: String::new(),
      },
    };

    let mut iter = iter.map_err(|e| OpenError::Unreadable(e.to_string()))?;
    let metadata = iter.collect_metadata();
    decoder.iter = Some(iter);

    let metadata = metadata.map_err(|e| classify_failure(&e.to_string()))?;
    decoder.info = stream_info(&metadata)?;
    log::debug!(
      "ffmpeg stream: {}x{} {} at {:.3} fps",
      decoder.info.width,
      decoder.info.height,
      decoder.info.pix_fmt,
      decoder.info.frame_rate
    );
    Ok(decoder)
  }
}

/// Map the errors ffmpeg logged before giving up to an [`OpenError`].
fn classify_failure(message: &str) -> OpenError {
  if NO_STREAM_ERRORS.iter().any(|e| message.contains(e)) {
    OpenError::NoVideoStream(message.to_string())
  } else if CODEC_ERRORS.iter().any(|e| message.contains(e)) {
    OpenError::UnsupportedCodec(message.to_string())
  } else {
    // "No such file or directory", "Invalid data found when processing
    // input", "Permission denied" and anything unrecognised.
    OpenError::Unreadable(message.to_string())
  }
}

fn stream_info(metadata: &FfmpegMetadata) -> std::result::Result<StreamInfo, OpenError> {
  let (_, video) = metadata
    .video_output()
    .ok_or_else(|| OpenError::NoVideoStream("ffmpeg announced no video output".to_string()))?;

  if video.pix_fmt != "rgb24" {
    return Err(OpenError::ScaleContextFailure(format!(
      "ffmpeg negotiated {} instead of rgb24",
      video.pix_fmt
    )));
  }
  if video.width == 0 || video.height == 0 {
    return Err(OpenError::ScaleContextFailure(format!(
      "ffmpeg announced a {}x{} frame",
      video.width, video.height
    )));
  }

  // The rawvideo muxer usually repeats the input rate; fall back to the
  // input stream when it doesn't.
  let frame_rate = match video.frame_rate() {
    rate if rate > 0.0 => rate,
    _ => metadata.video_input().map_or(0.0, VideoStream::frame_rate),
  };

  Ok(StreamInfo {
    width: video.width,
    height: video.height,
    frame_rate,
    pix_fmt: video.pix_fmt.clone(),
  })
}

impl VideoDecoder for FfmpegDecoder {
  fn probe(&self) -> &StreamInfo {
    &self.info
  }

  /// The size was fixed by the command line; this only checks that the
  /// session agrees with it.
  fn set_output_geometry(&mut self, geometry: FrameGeometry) -> std::result::Result<(), OpenError> {
    if geometry != self.info.geometry() {
      return Err(OpenError::ScaleContextFailure(format!(
        "ffmpeg writes {}x{} frames, playback needs {}x{}",
        self.info.width, self.info.height, geometry.width, geometry.height
      )));
    }
    Ok(())
  }

  fn next_unit(&mut self) -> Option<DecodeUnit> {
    let event = self.iter.as_mut()?.next();
    let unit = match event {
      Some(FfmpegEvent::OutputFrame(frame)) => DecodeUnit::Frame(RawFrame {
        width: frame.width,
        height: frame.height,
        data: frame.data,
      }),
      // Concealed decode errors are only reported; the frame still follows.
      Some(FfmpegEvent::Log(level, msg)) if level.is_error() => {
        log::warn!("ffmpeg: {msg}");
        DecodeUnit::Foreign
      }
      Some(FfmpegEvent::Error(msg)) => {
        log::warn!("{msg}");
        DecodeUnit::Corrupt(msg)
      }
      Some(FfmpegEvent::Log(_, msg)) => {
        log::trace!("ffmpeg: {msg}");
        DecodeUnit::Foreign
      }
      Some(FfmpegEvent::Done) | None => {
        // Stop listening; the stderr reader exits on its next send.
        self.iter = None;
        return None;
      }
      Some(_) => DecodeUnit::Foreign,
    };
    Some(unit)
  }

  fn recycle(&mut self, frame: RawFrame) {
    if let Some(iter) = &self.iter {
      iter.recycle_frame(frame.data);
    }
  }

  fn close(&mut self) {
    if let Some(mut child) = self.child.take() {
      if let Err(e) = child.kill() {
        log::debug!("failed to kill ffmpeg: {e}");
      }
      // Unblock both reader threads before reaping.
      self.iter = None;
      match child.wait() {
        Ok(status) => log::debug!("ffmpeg exited with {status}"),
        Err(e) => log::debug!("failed to wait for ffmpeg: {e}"),
      }
    }
    self.iter = None;
  }
}

impl Drop for FfmpegDecoder {
  fn drop(&mut self) {
    self.close();
  }
}

/// Lifecycle of a [`PlaybackSession`].
///
/// A session that failed to open never becomes observable, so there is no
/// state before `Opened`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Opened,
  Playing,
  Closed,
}

/// Plays one video source into a [`TerminalSink`].
///
/// The target geometry and framebuffer are computed once in
/// [`open`](Self::open) and reused for every frame. The decoder is closed
/// exactly once, by [`close`](Self::close), at the end of [`play`](Self::play)
/// or on drop, whichever comes first.
pub struct PlaybackSession<D: VideoDecoder> {
  decoder: D,
  state: SessionState,
  frame_duration: Duration,
  fit: Fit,
  framebuffer: Framebuffer,
}

/// The session used for files and streams.
pub type VideoLoader = PlaybackSession<FfmpegDecoder>;

impl VideoLoader {
  /// Open `source` with ffmpeg and fit its frames into the bounding box.
  pub fn load_and_scale(
    source: &str,
    bound_width: u32,
    bound_height: u32,
    options: &ScaleOptions,
  ) -> std::result::Result<Self, OpenError> {
    let decoder = FfmpegDecoder::open(source, bound_width, bound_height, options)?;
    Self::open(decoder, bound_width, bound_height, options)
  }
}

impl<D: VideoDecoder> PlaybackSession<D> {
  /// Take ownership of an opened decoder and prepare everything playback
  /// needs. On failure the decoder has already been closed.
  ///
  /// Video never fills the height: `fill_height` is ignored.
  pub fn open(
    decoder: D,
    bound_width: u32,
    bound_height: u32,
    options: &ScaleOptions,
  ) -> std::result::Result<Self, OpenError> {
    let mut session = Self {
      decoder,
      state: SessionState::Opened,
      frame_duration: Duration::ZERO,
      fit: Fit {
        geometry: FrameGeometry::new(1, 1),
        indent: 0,
      },
      framebuffer: Framebuffer::new(FrameGeometry::new(1, 1)),
    };
    // Dropping `session` on error closes the decoder.
    session.prepare(bound_width, bound_height, options)?;
    Ok(session)
  }

  fn prepare(
    &mut self,
    bound_width: u32,
    bound_height: u32,
    options: &ScaleOptions,
  ) -> std::result::Result<(), OpenError> {
    let info = self.decoder.probe().clone();
    if info.pix_fmt != "rgb24" {
      return Err(OpenError::ScaleContextFailure(format!(
        "no conversion from {} to rgb24",
        info.pix_fmt
      )));
    }

    let fit = fit(
      info.width,
      info.height,
      bound_width,
      bound_height,
      &options.for_video(),
    )?;
    self.decoder.set_output_geometry(fit.geometry)?;

    log::debug!(
      "video {}x{} -> {}x{} (indent {}), frame every {:#}",
      info.width,
      info.height,
      fit.geometry.width,
      fit.geometry.height,
      fit.indent,
      info.frame_duration()
    );

    self.frame_duration = info.frame_duration();
    self.framebuffer = Framebuffer::new(fit.geometry);
    self.fit = fit;
    Ok(())
  }

  pub fn state(&self) -> SessionState {
    self.state
  }

  /// Geometry every frame is rendered at.
  pub fn geometry(&self) -> FrameGeometry {
    self.fit.geometry
  }

  pub fn indent(&self) -> u32 {
    self.fit.indent
  }

  pub fn frame_duration(&self) -> Duration {
    self.frame_duration
  }

  pub fn decoder(&self) -> &D {
    &self.decoder
  }

  /// Play until the budget or the stream runs out, then close the session.
  ///
  /// A session plays once; calling this again is an error.
  pub fn play(
    &mut self,
    budget: &PlaybackBudget,
    sink: &mut dyn TerminalSink,
  ) -> Result<PlaybackOutcome> {
    if self.state != SessionState::Opened {
      return Err(Error::msg(format!(
        "cannot play a session in state {:?}",
        self.state
      )));
    }
    self.state = SessionState::Playing;
    let outcome = self.run(budget, sink);
    self.close();
    outcome
  }

  fn run(&mut self, budget: &PlaybackBudget, sink: &mut dyn TerminalSink) -> Result<PlaybackOutcome> {
    let geometry = self.fit.geometry;
    let mut progress = Progress::default();
    let mut end_next_frame = Instant::now();
    let mut is_first = true;

    loop {
      if let Some(stop) = budget.check_now(&progress) {
        return Ok(PlaybackOutcome::new(stop, progress));
      }

      let unit = match self.decoder.next_unit() {
        None => {
          progress.loops_completed += 1;
          return Ok(PlaybackOutcome::new(StopReason::EndOfStream, progress));
        }
        Some(DecodeUnit::Foreign) => continue,
        Some(unit) => unit,
      };

      // Scheduled before decoding, so decode time doesn't delay the next frame.
      end_next_frame += self.frame_duration;

      match unit {
        DecodeUnit::Frame(frame) => {
          if frame.width != geometry.width || frame.height != geometry.height {
            log::warn!(
              "dropping {}x{} frame, stream was opened at {}x{}",
              frame.width,
              frame.height,
              geometry.width,
              geometry.height
            );
          } else {
            self.framebuffer.copy_from_rgb24(&frame.data)?;
            self.decoder.recycle(frame);
            if !is_first {
              sink.jump_up_pixels(self.framebuffer.height())?;
            }
            sink.render(&self.framebuffer, self.fit.indent)?;
            is_first = false;
            progress.frames_shown += 1;
          }
        }
        DecodeUnit::Corrupt(reason) => log::debug!("skipping undecodable unit: {reason}"),
        DecodeUnit::Incomplete | DecodeUnit::Foreign => {}
      }

      end_next_frame.wait_until();
    }
  }

  /// Release the decoder. Safe to call any number of times.
  pub fn close(&mut self) {
    if self.state == SessionState::Closed {
      return;
    }
    self.state = SessionState::Closed;
    self.decoder.close();
  }
}

impl<D: VideoDecoder> Drop for PlaybackSession<D> {
  fn drop(&mut self) {
    self.close();
  }
}
