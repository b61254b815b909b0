use std::{
  io,
  process::{Child, ChildStderr, ChildStdout, ExitStatus},
};

use crate::iter::FfmpegIterator;

/// A wrapper around [`std::process::Child`] containing a spawned FFmpeg command.
/// Provides interfaces for reading parsed metadata, warnings and errors, and
/// piped output frames.
pub struct FfmpegChild {
  inner: Child,
}

impl FfmpegChild {
  /// Creates an iterator over events emitted by ffmpeg. Functions similarly to
  /// `Lines` from [`std::io::BufReader`], but providing a variety of parsed
  /// events:
  /// - Log messages
  /// - Parsed metadata
  /// - Progress updates
  /// - Errors and warnings
  /// - Raw output frames
  pub fn iter(&mut self) -> anyhow::Result<FfmpegIterator> {
    FfmpegIterator::new(self)
  }

  /// Escape hatch to manually control the process' stdout channel.
  /// Calling this method takes ownership of the stdout channel, so
  /// the iterator will no longer include output frames in the stream of events.
  pub fn take_stdout(&mut self) -> Option<ChildStdout> {
    self.inner.stdout.take()
  }

  /// Escape hatch to manually control the process' stderr channel.
  /// This method is mutually exclusive with `events_rx`, which relies on
  /// the stderr channel to parse events.
  pub fn take_stderr(&mut self) -> Option<ChildStderr> {
    self.inner.stderr.take()
  }

  /// Forcibly terminate the inner child process.
  ///
  /// Killing a process that already exited is not an error.
  pub fn kill(&mut self) -> io::Result<()> {
    match self.inner.kill() {
      Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
      result => result,
    }
  }

  /// Waits for the inner child process to finish execution.
  ///
  /// Identical to `wait` in [`std::process::Child`].
  pub fn wait(&mut self) -> io::Result<ExitStatus> {
    self.inner.wait()
  }

  pub(crate) fn from_inner(inner: Child) -> Self {
    Self { inner }
  }
}
