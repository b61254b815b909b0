use std::{
  ffi::OsStr,
  fmt, io,
  process::{Command, CommandArgs, Stdio},
};

use crate::{
  child::FfmpegChild,
  paths::ffmpeg_path,
  scale::{scale_filter, ScaleOptions},
};

/// A wrapper around [`std::process::Command`] with the argument presets a
/// frame-decoding ffmpeg process needs.
///
/// The `rustdoc` on each method includes relevant information from the FFmpeg
/// documentation: <https://ffmpeg.org/ffmpeg.html>.
pub struct FfmpegCommand {
  inner: Command,
}

impl FfmpegCommand {
  //// Generic option aliases
  //// https://ffmpeg.org/ffmpeg.html#Generic-options

  /// Alias for `-nostdin` argument.
  ///
  /// Disable interaction on standard input. Without it ffmpeg reads key
  /// presses from the terminal the frames are drawn on.
  pub fn nostdin(&mut self) -> &mut Self {
    self.arg("-nostdin");
    self
  }

  //// Main option aliases
  //// https://ffmpeg.org/ffmpeg.html#Main-options

  /// Alias for `-i` argument, the input file path or URL.
  ///
  /// The value `-` reads from the standard input of this process, which is
  /// then handed down to ffmpeg.
  pub fn input<S: AsRef<str>>(&mut self, path_or_url: S) -> &mut Self {
    let path_or_url = path_or_url.as_ref();
    if path_or_url == "-" {
      self.inner.stdin(Stdio::inherit());
    }
    self.arg("-i");
    self.arg(path_or_url);
    self
  }

  /// Alias for `-f` argument, the format name.
  ///
  /// Before an input it forces the demuxer (e.g. `lavfi`), before an output
  /// the muxer.
  pub fn format<S: AsRef<str>>(&mut self, format: S) -> &mut Self {
    self.arg("-f");
    self.arg(format.as_ref());
    self
  }

  /// Alias for `-map` argument.
  ///
  /// Select which input streams go to the output, e.g. `0:v:0` for the first
  /// video stream of the first input.
  pub fn map<S: AsRef<str>>(&mut self, map_string: S) -> &mut Self {
    self.arg("-map");
    self.arg(map_string.as_ref());
    self
  }

  /// Alias for `-an` argument: drop all audio streams.
  pub fn no_audio(&mut self) -> &mut Self {
    self.arg("-an");
    self
  }

  /// Alias for `-sn` argument: drop all subtitle streams.
  pub fn no_subtitles(&mut self) -> &mut Self {
    self.arg("-sn");
    self
  }

  /// Alias for `-pix_fmt` argument.
  pub fn pix_fmt<S: AsRef<str>>(&mut self, format: S) -> &mut Self {
    self.arg("-pix_fmt");
    self.arg(format.as_ref());
    self
  }

  /// Alias for `-vf` argument, the video filtergraph of the next output.
  pub fn video_filter<S: AsRef<str>>(&mut self, filtergraph: S) -> &mut Self {
    self.arg("-vf");
    self.arg(filtergraph.as_ref());
    self
  }

  //// Preset argument sets for common use cases.

  /// Generate a procedural test video with the `testsrc` filter.
  pub fn testsrc<S: AsRef<str>>(&mut self, options: S) -> &mut Self {
    self.format("lavfi");
    self.arg("-i");
    self.arg(format!("testsrc={}", options.as_ref()));
    self
  }

  /// Preset for decoding only the first video stream of the first input.
  pub fn first_video_stream(&mut self) -> &mut Self {
    self.map("0:v:0").no_audio().no_subtitles()
  }

  /// Preset for letting ffmpeg resize frames to fit the bounding box, the
  /// same way [`fit`](crate::scale::fit) would.
  pub fn fit_to(&mut self, bound_width: u32, bound_height: u32, options: &ScaleOptions) -> &mut Self {
    self.video_filter(scale_filter(bound_width, bound_height, options))
  }

  /// Preset for emitting raw decoded video frames on stdout.
  /// Equivalent to `-f rawvideo -pix_fmt rgb24 -`.
  pub fn rawvideo(&mut self) -> &mut Self {
    self.format("rawvideo").pix_fmt("rgb24").pipe_stdout()
  }

  /// Configure the ffmpeg command to produce output on stdout.
  ///
  /// Synchronizes two changes:
  /// 1. Pass `-` to the ffmpeg command ("output on stdout")
  /// 2. Set the `stdout` field of the inner `Command` to `Stdio::piped()`
  pub fn pipe_stdout(&mut self) -> &mut Self {
    self.arg("-");
    self.inner.stdout(Stdio::piped());
    self
  }

  /// Automatically applied in the constructor of `FfmpegCommand`.
  ///
  /// Equivalent to `ffmpeg -loglevel level+info`. The `level` flag prefixes
  /// every message with its log level in square brackets, which is how the log
  /// parser tells errors from warnings.
  fn set_expected_loglevel(&mut self) -> &mut Self {
    self.args(["-loglevel", "level+info"]);
    self
  }

  //// `std::process::Command` passthrough methods

  /// Adds an argument to pass to the program.
  ///
  /// Identical to `arg` in [`std::process::Command`].
  pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
    self.inner.arg(arg.as_ref());
    self
  }

  /// Adds multiple arguments to pass to the program.
  ///
  /// Identical to `args` in [`std::process::Command`].
  pub fn args<I, S>(&mut self, args: I) -> &mut Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    for arg in args {
      self.arg(arg.as_ref());
    }
    self
  }

  /// Returns an iterator of the arguments that will be passed to the program.
  ///
  /// Identical to `get_args` in [`std::process::Command`].
  pub fn get_args(&self) -> CommandArgs<'_> {
    self.inner.get_args()
  }

  /// Spawn the ffmpeg command as a child process, wrapping it in a
  /// `FfmpegChild` interface.
  ///
  /// Identical to `spawn` in [`std::process::Command`].
  pub fn spawn(&mut self) -> io::Result<FfmpegChild> {
    log::debug!("spawning {:?}", self.inner);
    self.inner.spawn().map(FfmpegChild::from_inner)
  }

  //// Constructors

  /// An ffmpeg command using the binary found by [`ffmpeg_path`].
  pub fn new() -> Self {
    Self::new_with_exe(ffmpeg_path())
  }

  pub fn new_with_exe<S: AsRef<OsStr>>(exe: S) -> Self {
    let mut inner = Command::new(&exe);
    inner.stdin(Stdio::null());
    inner.stderr(Stdio::piped());
    inner.stdout(Stdio::piped());

    let mut ffmpeg_command = Self { inner };
    ffmpeg_command.set_expected_loglevel();
    ffmpeg_command
  }
}

impl Default for FfmpegCommand {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for FfmpegCommand {
  /// Format the program and arguments of a Command for display. Any
  /// non-utf8 data is lossily converted using the utf8 replacement
  /// character.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.inner.fmt(f)
  }
}
