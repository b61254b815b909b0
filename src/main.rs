use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::Context;
use clap::{ArgAction, Parser};

use termframe::{
  budget::{CancelToken, PlaybackBudget, Progress},
  canvas::{TerminalCanvas, TerminalSink},
  framebuffer::Rgb,
  logging,
  scale::{FrameGeometry, ScaleOptions},
  still::{DisplayOptions, ImageLoader},
  time::{Duration, Instant},
  version::ffmpeg_version,
  video::VideoLoader,
};

#[derive(Debug, Parser)]
#[command(
  name = "termframe",
  about = "Show images, animations and videos in a 24-bit color terminal",
  disable_version_flag = true,
  after_help = "If both -c and -t are given, whatever comes first stops.\n\
                If both -w and -t are given for some animation/scroll, -t takes precedence."
)]
struct Cli {
  /// Output pixel geometry <width>x<height>. Default from terminal size.
  #[arg(short = 'g', value_parser = parse_geometry)]
  geometry: Option<FrameGeometry>,

  /// If multiple images are given: wait time between them.
  #[arg(short = 'w')]
  wait: Option<Duration>,

  /// Switch off antialiasing.
  #[arg(short = 'a')]
  no_antialias: bool,

  /// Trim: auto-crop away all same-color pixels around the image, after
  /// removing an optional pre-crop border (-T<pixels> or -T=<pixels>).
  #[arg(short = 'T', num_args = 0..=1, require_equals = true, default_missing_value = "0")]
  trim: Option<u32>,

  /// Scale to fit the terminal width (default: fit width and height).
  #[arg(short = 'W')]
  fit_width: bool,

  /// Toggle upscale: enlarge images smaller than the terminal.
  #[arg(short = 'U')]
  upscale: bool,

  /// This is a video, don't attempt image decoding first (useful for stdin).
  #[arg(short = 'V')]
  video_only: bool,

  /// Background color for transparent images.
  #[arg(short = 'b')]
  background: Option<Rgb>,

  /// Checkerboard pattern color for transparent images.
  #[arg(short = 'B')]
  pattern: Option<Rgb>,

  /// Center the image horizontally.
  #[arg(short = 'C')]
  center: bool,

  /// Print the filename before showing each image.
  #[arg(short = 'F')]
  show_filename: bool,

  /// Don't hide the cursor while showing images.
  #[arg(short = 'E')]
  keep_cursor: bool,

  /// Print version and exit.
  #[arg(short = 'v')]
  version: bool,

  /// Scroll, optionally with a tick delay in milliseconds (-s<ms> or -s=<ms>).
  #[arg(short = 's', num_args = 0..=1, require_equals = true, default_missing_value = "50")]
  scroll: Option<u32>,

  /// Scroll delta per tick, <dx>[:<dy>].
  #[arg(short = 'd', default_value = "1:0")]
  delta: ScrollDelta,

  /// Stop animations, scrolls and videos after this time.
  #[arg(short = 't')]
  time: Option<Duration>,

  /// Number of runs through a full animation or scroll cycle.
  #[arg(short = 'c')]
  loops: Option<u64>,

  /// Maximum number of frames to render.
  #[arg(short = 'f')]
  frames: Option<u64>,

  /// Log more; repeat for more detail. RUST_LOG overrides.
  #[arg(long, action = ArgAction::Count)]
  verbose: u8,

  /// Images or videos to show; `-` reads a video from stdin.
  #[arg(required_unless_present = "version")]
  files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScrollDelta {
  dx: i32,
  dy: i32,
}

impl FromStr for ScrollDelta {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || format!("'{s}': expected <dx> or <dx>:<dy>, e.g. 1 or 1:-1");
    let (dx, dy) = s.split_once(':').unwrap_or((s, "0"));
    Ok(Self {
      dx: dx.trim().parse().map_err(|_| invalid())?,
      dy: dy.trim().parse().map_err(|_| invalid())?,
    })
  }
}

/// Short flags with an optional value, which clap only takes after `=`.
const OPTIONAL_VALUE_FLAGS: [char; 2] = ['T', 's'];

/// Rewrite the attached forms `-T5` and `-s100` to `-T=5` and `-s=100`.
///
/// A value after a space is never taken, so `-T file.png` keeps the file.
fn attach_optional_values<I>(args: I) -> Vec<OsString>
where
  I: IntoIterator<Item = OsString>,
{
  let mut after_separator = false;
  args
    .into_iter()
    .map(|arg| {
      if after_separator {
        return arg;
      }
      if arg == "--" {
        after_separator = true;
        return arg;
      }
      let attached = arg.to_str().and_then(|s| {
        let mut chars = s.strip_prefix('-')?.chars();
        let flag = chars.next()?;
        let value = chars.as_str();
        let is_number = !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit());
        (OPTIONAL_VALUE_FLAGS.contains(&flag) && is_number)
          .then(|| OsString::from(format!("-{flag}={value}")))
      });
      attached.unwrap_or(arg)
    })
    .collect()
}

fn parse_geometry(s: &str) -> Result<FrameGeometry, String> {
  let invalid = || format!("invalid size spec '{s}', expected <width>x<height>");
  let (width, height) = s.split_once('x').ok_or_else(invalid)?;
  let width: u32 = width.trim().parse().map_err(|_| invalid())?;
  let height: u32 = height.trim().parse().map_err(|_| invalid())?;
  if width < 1 || height < 1 {
    return Err(format!("{width}x{height} is a rather unusual size"));
  }
  Ok(FrameGeometry::new(width, height))
}

/// Pixel geometry of the terminal: one pixel per column, two per row, minus
/// the row the prompt returns to.
fn terminal_geometry() -> anyhow::Result<FrameGeometry> {
  let (columns, rows) = crossterm::terminal::size()
    .context("Failed to read size from terminal; please supply -g<width>x<height> directly")?;
  let height = 2 * u32::from(rows).saturating_sub(1);
  anyhow::ensure!(
    columns > 0 && height > 0,
    "{columns}x{height} is a rather unusual size; please supply -g<width>x<height>"
  );
  Ok(FrameGeometry::new(u32::from(columns), height))
}

fn env_flag(name: &str) -> bool {
  std::env::var(name)
    .ok()
    .and_then(|value| value.trim().parse::<i64>().ok())
    .is_some_and(|value| value != 0)
}

#[cfg(unix)]
mod signals {
  use std::sync::OnceLock;

  use anyhow::Context;
  use nix::libc::c_int;
  use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
  use termframe::budget::CancelToken;

  static CANCEL: OnceLock<CancelToken> = OnceLock::new();

  extern "C" fn on_interrupt(_: c_int) {
    if let Some(token) = CANCEL.get() {
      token.cancel();
    }
  }

  /// Make SIGINT and SIGTERM cancel `token`.
  pub fn install(token: &CancelToken) -> anyhow::Result<()> {
    CANCEL.get_or_init(|| token.clone());
    let action = SigAction::new(
      SigHandler::Handler(on_interrupt),
      SaFlags::SA_RESTART,
      SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
      // SAFETY: the handler only performs an atomic store.
      unsafe { sigaction(signal, &action) }
        .with_context(|| format!("Failed to install {signal:?} handler"))?;
    }
    Ok(())
  }
}

#[cfg(not(unix))]
mod signals {
  use termframe::budget::CancelToken;

  pub fn install(_token: &CancelToken) -> anyhow::Result<()> {
    log::debug!("no signal handlers on this platform");
    Ok(())
  }
}

/// Everything derived from the command line that stays fixed across files.
struct Settings {
  geometry: FrameGeometry,
  display: DisplayOptions,
  scroll: Option<(Duration, ScrollDelta)>,
  wait: Option<Duration>,
  time: Option<Duration>,
  loops: Option<u64>,
  frames: Option<u64>,
  video_only: bool,
}

impl Settings {
  fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
    let geometry = match cli.geometry {
      Some(geometry) => geometry,
      None => terminal_geometry()?,
    };

    let mut scroll = cli
      .scroll
      .map(|millis| (Duration::from_millis(i64::from(millis)), cli.delta));
    if scroll.is_some() && cli.delta.dx == 0 && cli.delta.dy == 0 {
      log::warn!("Scrolling chosen, but dx:dy = 0:0. Just showing image, no scroll.");
      scroll = None;
    }
    let (scroll_x, scroll_y) = scroll.map_or((false, false), |(_, delta)| (delta.dx != 0, delta.dy != 0));

    // Scrolling in one direction leaves the other one to fill completely.
    let scale = ScaleOptions {
      upscale: cli.upscale,
      fill_width: cli.fit_width || scroll_y,
      fill_height: scroll_x,
      center_horizontally: cli.center,
    };

    Ok(Self {
      geometry,
      display: DisplayOptions {
        scale,
        antialias: !cli.no_antialias,
        auto_trim: cli.trim.is_some(),
        crop_border: cli.trim.unwrap_or(0),
        background: cli.background,
        pattern: cli.pattern,
      },
      scroll,
      wait: cli.wait,
      time: cli.time,
      loops: cli.loops,
      frames: cli.frames,
      video_only: cli.video_only,
    })
  }

  fn budget(&self, cancel: &CancelToken) -> PlaybackBudget {
    match self.time {
      Some(time) => PlaybackBudget::new(time, cancel.clone()),
      None => PlaybackBudget::unlimited(cancel.clone()),
    }
    .with_max_frames(self.frames)
    .with_max_loops(self.loops)
  }
}

/// Sleep for `duration` unless cancelled first.
fn pause(duration: Duration, cancel: &CancelToken) {
  let budget = PlaybackBudget::new(duration, cancel.clone());
  let slice = Duration::from_millis(50);
  while budget.check_now(&Progress::default()).is_none() {
    let next = Instant::now() + slice;
    if next < budget.end_time() {
      next.wait_until();
    } else {
      budget.end_time().wait_until();
    }
  }
}

/// Show one file; `Ok(false)` when no loader could make sense of it.
fn show(
  file: &str,
  settings: &Settings,
  cancel: &CancelToken,
  sink: &mut dyn TerminalSink,
) -> anyhow::Result<bool> {
  let FrameGeometry { width, height } = settings.geometry;
  let budget = settings.budget(cancel);

  if !settings.video_only {
    match ImageLoader::load_and_scale(file, width, height, &settings.display) {
      Ok(image) => {
        let outcome = match settings.scroll {
          Some((tick, delta)) => image.scroll(&budget, delta.dx, delta.dy, tick, sink)?,
          None => image.display(&budget, sink)?,
        };
        log::debug!("{file}: {outcome:?}");
        if !image.is_animation() {
          if let Some(wait) = settings.wait {
            pause(wait, cancel);
          }
        }
        return Ok(true);
      }
      Err(e) => log::debug!("{file}: not an image: {e}"),
    }
  }

  match VideoLoader::load_and_scale(file, width, height, &settings.display.scale) {
    Ok(mut session) => {
      let outcome = session
        .play(&budget, sink)
        .with_context(|| format!("{file}: playback failed"))?;
      log::debug!("{file}: {outcome:?}");
      Ok(true)
    }
    Err(e) => {
      log::info!("{file}: {e}");
      Ok(false)
    }
  }
}

fn print_version() {
  println!("termframe {}", env!("CARGO_PKG_VERSION"));
  println!("Image decoding: image crate (bmp, gif, jpeg, png, webp)");
  match ffmpeg_version() {
    Ok(version) => println!("Video decoding: ffmpeg {version}"),
    Err(e) => println!("Video decoding: ffmpeg not available ({e})"),
  }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
  if cli.version {
    print_version();
    return Ok(ExitCode::SUCCESS);
  }

  let settings = Settings::from_cli(&cli)?;
  let cancel = CancelToken::new();
  signals::install(&cancel)?;

  let use_upper_block = env_flag("TERMFRAME_USE_UPPER_BLOCK");
  let mut canvas = TerminalCanvas::new(io::stdout().lock(), use_upper_block);
  if !cli.keep_cursor {
    canvas.cursor_off()?;
  }

  let mut exit_code = ExitCode::SUCCESS;
  for file in &cli.files {
    if cancel.is_cancelled() {
      break;
    }
    if cli.show_filename {
      writeln!(canvas.as_inner_mut(), "{file}")?;
    }

    match show(file, &settings, &cancel, &mut canvas) {
      Ok(true) => continue,
      Ok(false) => {}
      Err(e) => log::error!("{e:#}"),
    }

    eprintln!("{file}: couldn't load");
    exit_code = ExitCode::FAILURE;
    if file == "-" || file == "/dev/stdin" {
      eprintln!("If this is a video on stdin, use '-V' to skip image probing");
    }
  }

  if !cli.keep_cursor {
    canvas.cursor_on()?;
  }
  if cancel.is_cancelled() {
    // Make Ctrl-C appear on a new line.
    writeln!(canvas.as_inner_mut())?;
  }
  Ok(exit_code)
}

fn main() -> ExitCode {
  let cli = Cli::parse_from(attach_optional_values(std::env::args_os()));
  logging::init(cli.verbose);

  match run(cli) {
    Ok(code) => code,
    Err(e) => {
      eprintln!("termframe: {e:#}");
      ExitCode::FAILURE
    }
  }
}
