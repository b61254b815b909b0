//! Stop conditions shared by every playback loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::time::{Duration, Instant};

/// A cooperative cancellation flag.
///
/// Clones share the same flag. Playback loops only ever read it, once per
/// frame, so cancellation latency is bounded by one frame period.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  /// Request every loop observing this token to stop.
  ///
  /// Only performs an atomic store, so it may be called from a signal handler.
  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// Counters a playback loop owns and reports back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
  pub frames_shown: u64,
  pub loops_completed: u64,
}

/// Why a playback loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
  /// The cancel token was set.
  Interrupted,
  /// The time budget ran out.
  Deadline,
  /// `max_frames` frames were shown.
  FrameLimit,
  /// `max_loops` passes were completed.
  LoopLimit,
  /// The source had nothing more to show.
  EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackOutcome {
  pub stop: StopReason,
  pub frames_shown: u64,
  pub loops_completed: u64,
}

impl PlaybackOutcome {
  pub fn new(stop: StopReason, progress: Progress) -> Self {
    Self {
      stop,
      frames_shown: progress.frames_shown,
      loops_completed: progress.loops_completed,
    }
  }
}

/// The limits of one playback invocation: an absolute end time, optional
/// frame and loop caps, and the cancel token.
///
/// Whichever limit is reached first stops the loop.
#[derive(Debug, Clone)]
pub struct PlaybackBudget {
  end_time: Instant,
  max_frames: Option<u64>,
  max_loops: Option<u64>,
  cancel: CancelToken,
}

impl PlaybackBudget {
  /// A budget ending `duration` from now.
  pub fn new(duration: Duration, cancel: CancelToken) -> Self {
    Self {
      end_time: Instant::now() + duration,
      max_frames: None,
      max_loops: None,
      cancel,
    }
  }

  /// A budget bounded only by the cancel token.
  pub fn unlimited(cancel: CancelToken) -> Self {
    Self::new(Duration::infinite_future(), cancel)
  }

  pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
    self.max_frames = max_frames;
    self
  }

  pub fn with_max_loops(mut self, max_loops: Option<u64>) -> Self {
    self.max_loops = max_loops;
    self
  }

  pub fn end_time(&self) -> Instant {
    self.end_time
  }

  pub fn max_frames(&self) -> Option<u64> {
    self.max_frames
  }

  pub fn max_loops(&self) -> Option<u64> {
    self.max_loops
  }

  pub fn cancel_token(&self) -> &CancelToken {
    &self.cancel
  }

  /// Returns the reason to stop, if any condition holds at `now`.
  pub fn check(&self, now: Instant, progress: &Progress) -> Option<StopReason> {
    if self.cancel.is_cancelled() {
      Some(StopReason::Interrupted)
    } else if now >= self.end_time {
      Some(StopReason::Deadline)
    } else if self
      .max_frames
      .is_some_and(|max| progress.frames_shown >= max)
    {
      Some(StopReason::FrameLimit)
    } else if self
      .max_loops
      .is_some_and(|max| progress.loops_completed >= max)
    {
      Some(StopReason::LoopLimit)
    } else {
      None
    }
  }

  /// [`check`](Self::check) against the current time.
  pub fn check_now(&self, progress: &Progress) -> Option<StopReason> {
    self.check(Instant::now(), progress)
  }
}
