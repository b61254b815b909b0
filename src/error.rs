use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::io;
use std::result::Result as StdResult;
use std::str::Utf8Error;

/// Shorthand alias for `Result<T, Error>` using the `termframe` error type.
pub type Result<T> = StdResult<T, Error>;

/// A generic error type for the `termframe` crate.
#[derive(Debug)]
pub struct Error {
  pub message: String,
  pub source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl Display for Error {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.message)
  }
}

impl StdError for Error {
  fn source(&self) -> Option<&(dyn StdError + 'static)> {
    self
      .source
      .as_deref()
      .map(|e| e as &(dyn StdError + 'static))
  }
}

impl Error {
  /// Wrap any standard Error into a library Error.
  pub fn from_std<E>(e: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    Error {
      message: e.to_string(),
      source: Some(Box::new(e)),
    }
  }

  /// Wrap any Display into a library Error.
  pub fn from_display<E>(e: E) -> Self
  where
    E: Display,
  {
    Error {
      message: e.to_string(),
      source: None,
    }
  }

  /// Create an error message from a string.
  pub fn msg<S: AsRef<str>>(message: S) -> Self {
    Error {
      message: message.as_ref().to_string(),
      source: None,
    }
  }
}

impl From<io::Error> for Error {
  fn from(e: io::Error) -> Self {
    Error::from_std(e)
  }
}

impl From<Utf8Error> for Error {
  fn from(e: Utf8Error) -> Self {
    Error::from_std(e)
  }
}

impl From<image::ImageError> for Error {
  fn from(e: image::ImageError) -> Self {
    Error::from_std(e)
  }
}

impl From<OpenError> for Error {
  fn from(e: OpenError) -> Self {
    Error::from_std(e)
  }
}

impl From<InvalidGeometry> for Error {
  fn from(e: InvalidGeometry) -> Self {
    Error::from_std(e)
  }
}

impl From<&str> for Error {
  fn from(e: &str) -> Self {
    Error::from_display(e)
  }
}

impl From<String> for Error {
  fn from(e: String) -> Self {
    Error::from_display(e)
  }
}

/// A source frame with a zero dimension was handed to `fit`.
///
/// This always points at a decoder bug upstream, so it is reported instead of
/// being clamped to something displayable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidGeometry {
  pub width: u32,
  pub height: u32,
}

impl Display for InvalidGeometry {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "invalid source geometry {}x{}: both dimensions must be at least 1",
      self.width, self.height
    )
  }
}

impl StdError for InvalidGeometry {}

/// Reasons a video source could not be turned into a playback session.
///
/// These are per-source failures: the caller is expected to report them and
/// move on to the next source.
#[derive(Debug)]
pub enum OpenError {
  /// The source could not be opened or read at all.
  Unreadable(String),
  /// The container holds no decodable video stream.
  NoVideoStream(String),
  /// No decoder exists for the stream's codec.
  UnsupportedCodec(String),
  /// The RGB conversion context could not be built for the negotiated format.
  ScaleContextFailure(String),
  /// The decoder reported a frame size that can't be fitted.
  InvalidGeometry(InvalidGeometry),
}

impl Display for OpenError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      OpenError::Unreadable(msg) => write!(f, "source unreadable: {msg}"),
      OpenError::NoVideoStream(msg) => write!(f, "no video stream: {msg}"),
      OpenError::UnsupportedCodec(msg) => write!(f, "unsupported codec: {msg}"),
      OpenError::ScaleContextFailure(msg) => write!(f, "cannot build scale context: {msg}"),
      OpenError::InvalidGeometry(e) => e.fmt(f),
    }
  }
}

impl StdError for OpenError {
  fn source(&self) -> Option<&(dyn StdError + 'static)> {
    match self {
      OpenError::InvalidGeometry(e) => Some(e),
      _ => None,
    }
  }
}

impl From<InvalidGeometry> for OpenError {
  fn from(e: InvalidGeometry) -> Self {
    OpenError::InvalidGeometry(e)
  }
}
