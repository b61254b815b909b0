use std::{
  io::{BufReader, ErrorKind, Read},
  process::{ChildStderr, ChildStdout},
  sync::mpsc::{channel, sync_channel, Receiver, Sender, SyncSender},
  thread::JoinHandle,
};

use anyhow::Context;

use crate::{
  child::FfmpegChild,
  event::{FfmpegEvent, LogLevel, OutputVideoFrame, VideoStream},
  log_parser::FfmpegLogParser,
  metadata::FfmpegMetadata,
};

/// An iterator over events from an ffmpeg process, including parsed metadata,
/// log messages, and raw video frames.
///
/// Log lines and frames arrive on one rendezvous channel, so neither reader
/// thread runs ahead of the consumer. Frame buffers handed back through
/// [`recycle_frame`](FfmpegIterator::recycle_frame) are refilled by the
/// stdout reader instead of allocating new ones.
pub struct FfmpegIterator {
  rx: Receiver<FfmpegEvent>,
  tx: Option<SyncSender<FfmpegEvent>>,
  stdout: Option<ChildStdout>,
  recycle_tx: Sender<Vec<u8>>,
  recycle_rx: Option<Receiver<Vec<u8>>>,
  metadata: FfmpegMetadata,
}

impl FfmpegIterator {
  pub fn new(child: &mut FfmpegChild) -> anyhow::Result<Self> {
    let stderr = child.take_stderr().context("No stderr channel\n - Did you call `take_stderr` elsewhere?\n - Did you forget to call `.stderr(Stdio::piped)` on the `ChildProcess`?")?;
    let (tx, rx) = sync_channel::<FfmpegEvent>(0);
    spawn_stderr_thread(stderr, tx.clone());
    let stdout = child.take_stdout();
    let (recycle_tx, recycle_rx) = channel();

    Ok(Self {
      rx,
      tx: Some(tx),
      stdout,
      recycle_tx,
      recycle_rx: Some(recycle_rx),
      metadata: FfmpegMetadata::new(),
    })
  }

  /// Called after all metadata has been obtained to spawn the thread that will
  /// read frames. The metadata determines the frame size.
  fn start_stdout(&mut self) -> anyhow::Result<()> {
    // The channel must close even when no reader gets started.
    let tx = self.tx.take().context("missing channel tx")?;

    let video = match self.metadata.video_output() {
      Some((stream, video)) if stream.format == "rawvideo" => video.clone(),
      Some((stream, _)) => anyhow::bail!("Output stream is {}, not rawvideo", stream.format),
      None => anyhow::bail!("No video output stream on stdout"),
    };

    if let (Some(stdout), Some(recycled)) = (self.stdout.take(), self.recycle_rx.take()) {
      spawn_stdout_thread(stdout, tx, video, recycled);
    }

    Ok(())
  }

  /// Advance the iterator until all metadata has been collected, returning it.
  ///
  /// When ffmpeg gives up before that point, the error carries the error
  /// lines it logged.
  pub fn collect_metadata(&mut self) -> anyhow::Result<FfmpegMetadata> {
    let mut errors: Vec<String> = Vec::new();

    while !self.metadata.is_completed() {
      match self.next() {
        Some(FfmpegEvent::Error(e)) => errors.push(e),
        Some(FfmpegEvent::Log(level, e)) if level.is_error() => errors.push(e),
        Some(_) => {}
        None => anyhow::bail!(
          "Iterator ran out before metadata was gathered. The following errors occurred: {}",
          errors.join("\n")
        ),
      }
    }

    Ok(self.metadata.clone())
  }

  pub fn metadata(&self) -> &FfmpegMetadata {
    &self.metadata
  }

  /// Give the buffer of a consumed frame back to the stdout reader.
  pub fn recycle_frame(&self, data: Vec<u8>) {
    // The reader may have finished already; the buffer is then just dropped.
    self.recycle_tx.send(data).ok();
  }

  //// Iterator filters

  /// Filter out all events except for output frames (`FfmpegEvent::OutputFrame`).
  pub fn filter_frames(self) -> impl Iterator<Item = OutputVideoFrame> {
    self.filter_map(|event| match event {
      FfmpegEvent::OutputFrame(o) => Some(o),
      _ => None,
    })
  }
}

impl Iterator for FfmpegIterator {
  type Item = FfmpegEvent;

  fn next(&mut self) -> Option<Self::Item> {
    let item = self.rx.recv().ok();

    if let Some(FfmpegEvent::LogEOF) = item {
      self.tx.take(); // drop the tx so that the receiver can close
    }

    if !self.metadata.is_completed() {
      match self.metadata.handle_event(&item) {
        Err(e) => return Some(FfmpegEvent::Error(e.to_string())),
        Ok(()) if self.metadata.is_completed() => {
          if let Err(e) = self.start_stdout() {
            return Some(FfmpegEvent::Error(e.to_string()));
          }
        }
        _ => {}
      }
    }

    item
  }
}

/// Size in bytes of one packed frame, for the pixel formats the reader
/// understands.
pub fn get_bytes_per_frame(video: &VideoStream) -> Option<usize> {
  let bytes_per_pixel = match video.pix_fmt.as_str() {
    "gray" | "pal8" | "rgb8" | "bgr8" => 1,
    "gray16le" | "gray16be" | "rgb565le" | "rgb565be" | "ya8" => 2,
    "rgb24" | "bgr24" => 3,
    "rgba" | "bgra" | "argb" | "abgr" | "rgb0" | "bgr0" | "0rgb" | "0bgr" => 4,
    "rgb48le" | "rgb48be" | "bgr48le" | "bgr48be" => 6,
    "rgba64le" | "rgba64be" => 8,
    _ => return None,
  };
  Some(video.width as usize * video.height as usize * bytes_per_pixel)
}

/// Spawn a thread to read raw output frames from ffmpeg's stdout.
///
/// Each frame is read into a buffer taken from `recycled` when one is
/// available, and into a fresh allocation otherwise.
pub fn spawn_stdout_thread<R: Read + Send + 'static>(
  stdout: R,
  tx: SyncSender<FfmpegEvent>,
  video: VideoStream,
  recycled: Receiver<Vec<u8>>,
) -> JoinHandle<()> {
  std::thread::spawn(move || {
    let frame_size = match get_bytes_per_frame(&video) {
      Some(size) if size > 0 => size,
      _ => {
        let msg = format!("Unsupported pixel format {} for {}x{}", video.pix_fmt, video.width, video.height);
        tx.send(FfmpegEvent::Error(msg)).ok();
        return;
      }
    };

    let mut reader = BufReader::new(stdout);
    let mut frame_num = 0;
    loop {
      let mut data = recycled.try_recv().unwrap_or_default();
      data.resize(frame_size, 0);
      match reader.read_exact(&mut data) {
        Ok(()) => {
          let frame = OutputVideoFrame {
            width: video.width,
            height: video.height,
            pix_fmt: video.pix_fmt.clone(),
            output_index: 0,
            data,
            frame_num,
          };
          // The receiver is gone: nobody wants more frames.
          if tx.send(FfmpegEvent::OutputFrame(frame)).is_err() {
            return;
          }
          frame_num += 1;
        }
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
        Err(e) => {
          tx.send(FfmpegEvent::Error(e.to_string())).ok();
          break;
        }
      }
    }
    tx.send(FfmpegEvent::Done).ok();
  })
}

/// Spawn a thread which reads and parses lines from ffmpeg's stderr channel.
/// The cadence is controlled by the synchronous `tx` channel, which blocks
/// until a receiver is ready to receive the next event.
pub fn spawn_stderr_thread(stderr: ChildStderr, tx: SyncSender<FfmpegEvent>) -> JoinHandle<()> {
  std::thread::spawn(move || {
    let mut parser = FfmpegLogParser::new(stderr);
    loop {
      let sent = match parser.parse_next_event() {
        Ok(FfmpegEvent::LogEOF) => {
          tx.send(FfmpegEvent::LogEOF).ok();
          break;
        }
        Ok(event) => tx.send(event),
        Err(e) if e.downcast_ref::<std::io::Error>().is_some() => {
          tx.send(FfmpegEvent::Error(e.to_string())).ok();
          tx.send(FfmpegEvent::LogEOF).ok();
          break;
        }
        // A single unparseable line, e.g. invalid UTF-8: keep reading.
        Err(e) => tx.send(FfmpegEvent::Log(LogLevel::Unknown, e.to_string())),
      };
      if sent.is_err() {
        break;
      }
    }
  })
}
