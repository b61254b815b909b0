//! Monotonic clock primitives used to pace frame output.
//!
//! [`Duration`] is a signed nanosecond count, so a deadline can be moved into
//! the past. [`Instant`] is a point on the monotonic clock and can only be
//! obtained from [`Instant::now`] or by adding a [`Duration`] to another
//! instant; it is immune to wall-clock adjustments.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::str::FromStr;

const NANOS_PER_SEC: i64 = 1_000_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_MICRO: i64 = 1_000;

/// A signed span of time with nanosecond resolution.
///
/// # Conversions
///
/// Parsing from a string follows the forms accepted on the command line:
/// - plain seconds: `"5"`, `"2.5"`
/// - suffixed: `"400ms"`, `"3000us"`, `"1.5s"`
/// - clock notation: `"1:30"`, `"01:01:01.123"`
///
/// # Examples
///
/// ```rust
/// use termframe::time::Duration;
///
/// let second: Duration = "00:00:01".parse().unwrap();
/// let hundred_milliseconds: Duration = "100ms".parse().unwrap();
///
/// assert_eq!(second.as_millis(), 1000);
/// assert_eq!(hundred_milliseconds, Duration::from_millis(100));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Duration(i64);

impl Duration {
  pub const ZERO: Duration = Duration(0);

  #[must_use]
  #[inline]
  pub const fn from_millis(millis: i64) -> Self {
    Self(millis.saturating_mul(NANOS_PER_MILLI))
  }

  #[must_use]
  #[inline]
  pub const fn from_micros(micros: i64) -> Self {
    Self(micros.saturating_mul(NANOS_PER_MICRO))
  }

  #[must_use]
  #[inline]
  pub const fn from_nanos(nanos: i64) -> Self {
    Self(nanos)
  }

  #[must_use]
  #[inline]
  pub fn from_seconds(seconds: f64) -> Self {
    Self((seconds * NANOS_PER_SEC as f64).round() as i64)
  }

  /// A span no playback will ever reach (about 31 years).
  ///
  /// Kept far away from `i64::MAX` so that adding it to any [`Instant`]
  /// stays well-defined.
  #[must_use]
  #[inline]
  pub const fn infinite_future() -> Self {
    Self(1_000_000_000 * NANOS_PER_SEC)
  }

  #[must_use]
  #[inline]
  pub const fn as_nanos(&self) -> i64 {
    self.0
  }

  #[must_use]
  #[inline]
  pub const fn as_millis(&self) -> i64 {
    self.0 / NANOS_PER_MILLI
  }

  #[must_use]
  #[inline]
  pub fn as_seconds(&self) -> f64 {
    self.0 as f64 / NANOS_PER_SEC as f64
  }

  #[must_use]
  #[inline]
  pub const fn is_negative(&self) -> bool {
    self.0 < 0
  }

  /// Convert into a `std` duration; negative spans become zero.
  #[must_use]
  pub fn as_std(&self) -> std::time::Duration {
    std::time::Duration::from_nanos(self.0.max(0) as u64)
  }

  #[must_use]
  pub fn from_std(duration: std::time::Duration) -> Self {
    Self(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX))
  }

  fn parse(str: &str) -> Option<Self> {
    let str = str.trim();

    let (is_negative, str) = match str.strip_prefix('-') {
      Some(rest) => (true, rest),
      None => (false, str),
    };

    let seconds = if let Some(value) = str.strip_suffix("us") {
      value.trim().parse::<f64>().ok()? / 1_000_000.0
    } else if let Some(value) = str.strip_suffix("ms") {
      value.trim().parse::<f64>().ok()? / 1_000.0
    } else if let Some(value) = str.strip_suffix('s') {
      value.trim().parse::<f64>().ok()?
    } else if str.contains(':') {
      let mut seconds = 0.0;
      let mut smh = str.split(':').rev();
      if let Some(sec) = smh.next() {
        seconds += sec.parse::<f64>().ok()?;
      }
      if let Some(min) = smh.next() {
        seconds += min.parse::<f64>().ok()? * 60.0;
      }
      if let Some(hrs) = smh.next() {
        seconds += hrs.parse::<f64>().ok()? * 60.0 * 60.0;
      }
      if smh.next().is_some() {
        return None;
      }
      seconds
    } else {
      str.parse::<f64>().ok()?
    };

    if !seconds.is_finite() {
      return None;
    }

    let duration = Self::from_seconds(seconds);
    Some(if is_negative { -duration } else { duration })
  }
}

impl fmt::Display for Duration {
  /// `HH:MM:SS.mmm` by default; the alternate form (`{:#}`) prints milliseconds.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if f.alternate() {
      return write!(f, "{}ms", self.as_millis());
    }

    let sign = if self.is_negative() { "-" } else { "" };
    let abs_millis = self.0.unsigned_abs() / NANOS_PER_MILLI as u64;
    let hours = abs_millis / 3_600_000;
    let minutes = (abs_millis / 60_000) % 60;
    let secs = (abs_millis / 1_000) % 60;
    let millis = abs_millis % 1_000;
    write!(f, "{sign}{hours:02}:{minutes:02}:{secs:02}.{millis:03}")
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDurationError(String);

impl fmt::Display for ParseDurationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "invalid time value '{}'", self.0)
  }
}

impl std::error::Error for ParseDurationError {}

impl FromStr for Duration {
  type Err = ParseDurationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Duration::parse(s).ok_or_else(|| ParseDurationError(s.to_string()))
  }
}

impl TryFrom<&str> for Duration {
  type Error = ParseDurationError;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl Add for Duration {
  type Output = Self;

  fn add(self, rhs: Self) -> Self::Output {
    Duration(self.0.saturating_add(rhs.0))
  }
}

impl Sub for Duration {
  type Output = Self;

  fn sub(self, rhs: Self) -> Self::Output {
    Duration(self.0.saturating_sub(rhs.0))
  }
}

impl Neg for Duration {
  type Output = Self;

  fn neg(self) -> Self::Output {
    Duration(self.0.saturating_neg())
  }
}

/// A timestamp on the monotonic clock.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Instant {
  nanos: i64,
}

impl Instant {
  /// Read the monotonic clock.
  pub fn now() -> Self {
    Self {
      nanos: monotonic_nanos(),
    }
  }

  /// Move this instant by `duration`, which may be negative.
  pub fn advance(&mut self, duration: Duration) {
    self.nanos = self.nanos.saturating_add(duration.0);
  }

  /// Time left until this instant; negative once it has passed.
  pub fn remaining(&self) -> Duration {
    *self - Instant::now()
  }

  /// Block the calling thread until the monotonic clock reaches this instant.
  ///
  /// Returns immediately for instants in the past.
  pub fn wait_until(&self) {
    if Instant::now() >= *self {
      return;
    }
    sleep_until(self.nanos);
  }
}

impl Add<Duration> for Instant {
  type Output = Instant;

  fn add(mut self, rhs: Duration) -> Self::Output {
    self.advance(rhs);
    self
  }
}

impl AddAssign<Duration> for Instant {
  fn add_assign(&mut self, rhs: Duration) {
    self.advance(rhs);
  }
}

impl Sub for Instant {
  type Output = Duration;

  fn sub(self, rhs: Instant) -> Self::Output {
    Duration(self.nanos.saturating_sub(rhs.nanos))
  }
}

#[cfg(unix)]
fn monotonic_nanos() -> i64 {
  use nix::time::{clock_gettime, ClockId};

  match clock_gettime(ClockId::CLOCK_MONOTONIC) {
    Ok(ts) => (ts.tv_sec() as i64)
      .saturating_mul(NANOS_PER_SEC)
      .saturating_add(ts.tv_nsec() as i64),
    Err(_) => fallback_nanos(),
  }
}

#[cfg(not(unix))]
fn monotonic_nanos() -> i64 {
  fallback_nanos()
}

/// Nanoseconds since the first call, measured with `std`'s monotonic clock.
fn fallback_nanos() -> i64 {
  use std::sync::OnceLock;
  static EPOCH: OnceLock<std::time::Instant> = OnceLock::new();
  let epoch = EPOCH.get_or_init(std::time::Instant::now);
  i64::try_from(epoch.elapsed().as_nanos()).unwrap_or(i64::MAX)
}

/// Absolute-deadline sleep, so that repeated waits never accumulate drift.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn sleep_until(deadline_nanos: i64) {
  use nix::errno::Errno;
  use nix::sys::time::TimeSpec;
  use nix::time::{clock_nanosleep, ClockId, ClockNanosleepFlags};

  let request = TimeSpec::new(
    (deadline_nanos / NANOS_PER_SEC) as _,
    (deadline_nanos % NANOS_PER_SEC) as _,
  );
  loop {
    match clock_nanosleep(
      ClockId::CLOCK_MONOTONIC,
      ClockNanosleepFlags::TIMER_ABSTIME,
      &request,
    ) {
      Ok(_) => return,
      // A signal woke us up; the deadline is absolute, so just go back to sleep.
      Err(Errno::EINTR) => continue,
      Err(e) => {
        log::debug!("clock_nanosleep failed ({e}), falling back to relative sleep");
        sleep_remaining(deadline_nanos);
        return;
      }
    }
  }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn sleep_until(deadline_nanos: i64) {
  sleep_remaining(deadline_nanos);
}

fn sleep_remaining(deadline_nanos: i64) {
  let remaining = deadline_nanos.saturating_sub(monotonic_nanos());
  if remaining > 0 {
    std::thread::sleep(std::time::Duration::from_nanos(remaining as u64));
  }
}
