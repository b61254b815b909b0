use std::cell::Cell;
use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::rc::Rc;

use image::{codecs::gif::GifEncoder, Delay, Frame, Rgba, RgbaImage};

use crate::{
  budget::{CancelToken, PlaybackBudget, StopReason},
  canvas::{TerminalCanvas, TerminalSink},
  command::FfmpegCommand,
  decoder::{DecodeUnit, RawFrame, StreamInfo, VideoDecoder},
  error::OpenError,
  framebuffer::{Framebuffer, Rgb},
  scale::{FrameGeometry, ScaleOptions},
  still::{DisplayOptions, ImageLoader},
  time::{Duration, Instant},
  version::ffmpeg_is_installed,
  video::{FfmpegDecoder, PlaybackSession, SessionState},
};

/// A decoder replaying a scripted list of units. Frames come out at whatever
/// size the session asked for.
struct ScriptedDecoder {
  info: StreamInfo,
  output: FrameGeometry,
  units: VecDeque<DecodeUnit>,
  latency: Duration,
  closes: Rc<Cell<u32>>,
}

impl ScriptedDecoder {
  fn new(width: u32, height: u32, frame_rate: f64) -> Self {
    Self {
      info: StreamInfo {
        width,
        height,
        frame_rate,
        pix_fmt: "rgb24".to_string(),
      },
      output: FrameGeometry::new(width, height),
      units: VecDeque::new(),
      latency: Duration::ZERO,
      closes: Rc::new(Cell::new(0)),
    }
  }

  fn frame(&self) -> DecodeUnit {
    DecodeUnit::Frame(RawFrame {
      width: self.output.width,
      height: self.output.height,
      data: vec![128; self.output.area() * 3],
    })
  }

  fn with_frames(mut self, count: usize) -> Self {
    for _ in 0..count {
      let frame = self.frame();
      self.units.push_back(frame);
    }
    self
  }

  fn with_unit(mut self, unit: DecodeUnit) -> Self {
    self.units.push_back(unit);
    self
  }

  fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }
}

impl VideoDecoder for ScriptedDecoder {
  fn probe(&self) -> &StreamInfo {
    &self.info
  }

  fn set_output_geometry(&mut self, geometry: FrameGeometry) -> Result<(), OpenError> {
    self.output = geometry;
    Ok(())
  }

  fn next_unit(&mut self) -> Option<DecodeUnit> {
    if self.latency > Duration::ZERO {
      std::thread::sleep(self.latency.as_std());
    }
    match self.units.pop_front()? {
      DecodeUnit::Frame(_) => Some(self.frame()),
      unit => Some(unit),
    }
  }

  fn close(&mut self) {
    self.closes.set(self.closes.get() + 1);
  }
}

/// A sink remembering everything it was asked to do.
#[derive(Default)]
struct RecordingSink {
  renders: Vec<(Instant, Framebuffer, u32)>,
  jumps: Vec<u32>,
  cancel_after: Option<(usize, CancelToken)>,
}

impl RecordingSink {
  fn cancelling_after(renders: usize, token: &CancelToken) -> Self {
    Self {
      cancel_after: Some((renders, token.clone())),
      ..Self::default()
    }
  }
}

impl TerminalSink for RecordingSink {
  fn render(&mut self, framebuffer: &Framebuffer, indent: u32) -> io::Result<()> {
    self
      .renders
      .push((Instant::now(), framebuffer.clone(), indent));
    if let Some((after, token)) = &self.cancel_after {
      if self.renders.len() == *after {
        token.cancel();
      }
    }
    Ok(())
  }

  fn jump_up_pixels(&mut self, pixels: u32) -> io::Result<()> {
    self.jumps.push(pixels);
    Ok(())
  }
}

fn open_session(decoder: ScriptedDecoder) -> PlaybackSession<ScriptedDecoder> {
  PlaybackSession::open(decoder, 16, 16, &ScaleOptions::default()).unwrap()
}

#[test]
fn test_frame_limit_renders_exactly() {
  let mut session = open_session(ScriptedDecoder::new(8, 8, 1000.0).with_frames(50));
  let budget = PlaybackBudget::unlimited(CancelToken::new()).with_max_frames(Some(5));
  let mut sink = RecordingSink::default();

  let outcome = session.play(&budget, &mut sink).unwrap();

  assert_eq!(outcome.stop, StopReason::FrameLimit);
  assert_eq!(outcome.frames_shown, 5);
  assert_eq!(sink.renders.len(), 5);
}

#[test]
fn test_first_frame_does_not_jump_up() {
  let mut session = open_session(ScriptedDecoder::new(8, 6, 1000.0).with_frames(3));
  let mut sink = RecordingSink::default();

  session
    .play(&PlaybackBudget::unlimited(CancelToken::new()), &mut sink)
    .unwrap();

  assert_eq!(sink.renders.len(), 3);
  assert_eq!(sink.jumps, [6, 6]);
}

#[test]
fn test_deadline_is_not_early() {
  let mut session = open_session(ScriptedDecoder::new(4, 4, 100.0).with_frames(1000));
  let start = Instant::now();
  let budget = PlaybackBudget::new(Duration::from_millis(100), CancelToken::new());
  let mut sink = RecordingSink::default();

  let outcome = session.play(&budget, &mut sink).unwrap();
  let elapsed = Instant::now() - start;

  assert_eq!(outcome.stop, StopReason::Deadline);
  assert!(elapsed >= Duration::from_millis(100), "stopped after {elapsed:#}");
  assert!(elapsed < Duration::from_millis(250), "stopped after {elapsed:#}");
  assert!(outcome.frames_shown >= 9 && outcome.frames_shown <= 11);
}

#[test]
fn test_interrupt_stops_within_a_frame() {
  let token = CancelToken::new();
  let mut session = open_session(ScriptedDecoder::new(4, 4, 100.0).with_frames(100));
  let budget = PlaybackBudget::unlimited(token.clone());
  let mut sink = RecordingSink::cancelling_after(2, &token);

  let outcome = session.play(&budget, &mut sink).unwrap();

  assert_eq!(outcome.stop, StopReason::Interrupted);
  assert_eq!(outcome.frames_shown, 2);
  assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_decode_latency_does_not_accumulate() {
  let mut session = open_session(
    ScriptedDecoder::new(4, 4, 100.0)
      .with_frames(20)
      .with_latency(Duration::from_millis(5)),
  );
  let start = Instant::now();
  let mut sink = RecordingSink::default();

  let outcome = session
    .play(&PlaybackBudget::unlimited(CancelToken::new()), &mut sink)
    .unwrap();
  let elapsed = Instant::now() - start;

  assert_eq!(outcome.frames_shown, 20);
  // 20 x (10ms + 5ms) if the latency added up.
  assert!(elapsed >= Duration::from_millis(200), "took {elapsed:#}");
  assert!(elapsed < Duration::from_millis(280), "took {elapsed:#}");

  let times: Vec<Instant> = sink.renders.iter().map(|(at, _, _)| *at).collect();
  for pair in times.windows(2) {
    let gap = pair[1] - pair[0];
    assert!(
      gap >= Duration::from_millis(4) && gap < Duration::from_millis(25),
      "gap {gap:#}"
    );
  }
  // Frame k is shown k periods after the first one, not later.
  for (k, at) in times.iter().enumerate() {
    let offset = (*at - times[0]) - Duration::from_millis(10 * k as i64);
    assert!(
      offset > Duration::from_millis(-3) && offset < Duration::from_millis(15),
      "frame {k} is off by {offset:#}"
    );
  }
}

#[test]
fn test_decoder_delivers_fitted_frames() {
  let mut session = open_session(ScriptedDecoder::new(32, 24, 1000.0).with_frames(2));
  assert_eq!(session.decoder().output, FrameGeometry::new(16, 12));

  let mut sink = RecordingSink::default();
  session
    .play(&PlaybackBudget::unlimited(CancelToken::new()), &mut sink)
    .unwrap();

  assert_eq!(sink.renders.len(), 2);
  assert_eq!(sink.renders[1].1.geometry(), FrameGeometry::new(16, 12));
  assert_eq!(sink.renders[1].1.pixel(15, 11), Rgb::new(128, 128, 128));
}

#[test]
fn test_foreign_units_take_no_time() {
  let mut decoder = ScriptedDecoder::new(4, 4, 100.0);
  for _ in 0..5 {
    for _ in 0..20 {
      decoder = decoder.with_unit(DecodeUnit::Foreign);
    }
    decoder = decoder.with_frames(1);
  }
  let mut session = open_session(decoder);
  let start = Instant::now();
  let mut sink = RecordingSink::default();

  let outcome = session
    .play(&PlaybackBudget::unlimited(CancelToken::new()), &mut sink)
    .unwrap();
  let elapsed = Instant::now() - start;

  assert_eq!(outcome.stop, StopReason::EndOfStream);
  assert_eq!(outcome.frames_shown, 5);
  assert!(elapsed < Duration::from_millis(100), "took {elapsed:#}");
}

#[test]
fn test_corrupt_unit_keeps_schedule() {
  let decoder = ScriptedDecoder::new(4, 4, 50.0)
    .with_frames(1)
    .with_unit(DecodeUnit::Corrupt("bad slice".to_string()))
    .with_unit(DecodeUnit::Incomplete);
  let decoder = decoder.with_frames(1);
  let mut session = open_session(decoder);
  let start = Instant::now();
  let mut sink = RecordingSink::default();

  let outcome = session
    .play(&PlaybackBudget::unlimited(CancelToken::new()), &mut sink)
    .unwrap();

  assert_eq!(outcome.stop, StopReason::EndOfStream);
  assert_eq!(outcome.frames_shown, 2);
  assert!(Instant::now() - start >= Duration::from_millis(80));
  // The second frame was scheduled three slots after the first.
  let gap = sink.renders[1].0 - sink.renders[0].0;
  assert!(gap >= Duration::from_millis(55), "gap {gap:#}");
}

#[test]
fn test_end_of_stream_counts_one_loop() {
  let decoder = ScriptedDecoder::new(4, 4, 1000.0).with_frames(3);
  let closes = decoder.closes.clone();
  let mut session = open_session(decoder);

  let outcome = session
    .play(
      &PlaybackBudget::unlimited(CancelToken::new()),
      &mut RecordingSink::default(),
    )
    .unwrap();

  assert_eq!(outcome.stop, StopReason::EndOfStream);
  assert_eq!(outcome.loops_completed, 1);
  assert_eq!(closes.get(), 1);
  drop(session);
  assert_eq!(closes.get(), 1);
}

#[test]
fn test_close_is_idempotent() {
  let decoder = ScriptedDecoder::new(4, 4, 25.0).with_frames(3);
  let closes = decoder.closes.clone();
  let mut session = open_session(decoder);
  assert_eq!(session.state(), SessionState::Opened);

  session.close();
  session.close();
  assert_eq!(session.state(), SessionState::Closed);
  assert_eq!(closes.get(), 1);

  let replay = session.play(
    &PlaybackBudget::unlimited(CancelToken::new()),
    &mut RecordingSink::default(),
  );
  assert!(replay.is_err());
  drop(session);
  assert_eq!(closes.get(), 1);
}

#[test]
fn test_failed_open_closes_decoder_once() {
  let mut decoder = ScriptedDecoder::new(4, 4, 25.0);
  decoder.info.pix_fmt = "yuv420p".to_string();
  let closes = decoder.closes.clone();

  let result = PlaybackSession::open(decoder, 16, 16, &ScaleOptions::default());

  assert!(matches!(result, Err(OpenError::ScaleContextFailure(_))));
  assert_eq!(closes.get(), 1);
}

#[test]
fn test_zero_sized_stream_is_invalid_geometry() {
  let decoder = ScriptedDecoder::new(0, 4, 25.0);
  let closes = decoder.closes.clone();

  let result = PlaybackSession::open(decoder, 16, 16, &ScaleOptions::default());

  assert!(matches!(result, Err(OpenError::InvalidGeometry(_))));
  assert_eq!(closes.get(), 1);
}

#[test]
fn test_video_never_fills_height() {
  let options = ScaleOptions {
    fill_height: true,
    center_horizontally: true,
    ..ScaleOptions::default()
  };
  let session =
    PlaybackSession::open(ScriptedDecoder::new(40, 20, 25.0), 40, 40, &options).unwrap();
  assert_eq!(session.geometry(), FrameGeometry::new(40, 20));
  assert_eq!(session.indent(), 0);
  assert_eq!(session.frame_duration(), Duration::from_millis(40));

  let session =
    PlaybackSession::open(ScriptedDecoder::new(20, 20, 25.0), 40, 40, &options).unwrap();
  assert_eq!(session.geometry(), FrameGeometry::new(20, 20));
  assert_eq!(session.indent(), 10);
}

#[test]
fn test_session_renders_through_canvas() {
  let mut session = open_session(ScriptedDecoder::new(4, 4, 1000.0).with_frames(2));
  let mut canvas = TerminalCanvas::new(Vec::new(), false);

  session
    .play(&PlaybackBudget::unlimited(CancelToken::new()), &mut canvas)
    .unwrap();

  let out = String::from_utf8(canvas.into_inner()).unwrap();
  assert_eq!(out.matches("\x1B[2A").count(), 1);
  assert_eq!(out.matches('\n').count(), 4);
}

//// Still images

fn write_png(dir: &tempfile::TempDir, name: &str, image: &RgbaImage) -> std::path::PathBuf {
  let path = dir.path().join(name);
  image.save(&path).unwrap();
  path
}

fn write_gif(dir: &tempfile::TempDir, colors: &[[u8; 4]], delay_ms: u32) -> std::path::PathBuf {
  let path = dir.path().join("anim.gif");
  {
    let mut encoder = GifEncoder::new(File::create(&path).unwrap());
    let frames = colors.iter().map(|color| {
      Frame::from_parts(
        RgbaImage::from_pixel(4, 4, Rgba(*color)),
        0,
        0,
        Delay::from_numer_denom_ms(delay_ms, 1),
      )
    });
    encoder.encode_frames(frames).unwrap();
  }
  path
}

#[test]
fn test_still_image_shows_once() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_png(&dir, "still.png", &RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255])));
  let image = ImageLoader::load_and_scale(&path, 8, 8, &DisplayOptions::default()).unwrap();
  assert!(!image.is_animation());
  assert_eq!(image.geometry(), FrameGeometry::new(4, 4));

  let mut sink = RecordingSink::default();
  let outcome = image
    .display(&PlaybackBudget::unlimited(CancelToken::new()), &mut sink)
    .unwrap();

  assert_eq!(outcome.stop, StopReason::EndOfStream);
  assert_eq!(outcome.frames_shown, 1);
  assert!(sink.jumps.is_empty());
  assert_eq!(sink.renders[0].1.pixel(0, 0), Rgb::new(255, 0, 0));
}

#[test]
fn test_transparent_image_uses_background() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_png(&dir, "clear.png", &RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 0])));
  let options = DisplayOptions {
    background: Some(Rgb::new(0, 0, 255)),
    ..DisplayOptions::default()
  };
  let image = ImageLoader::load_and_scale(&path, 8, 8, &options).unwrap();
  let mut sink = RecordingSink::default();
  image
    .display(&PlaybackBudget::unlimited(CancelToken::new()), &mut sink)
    .unwrap();
  assert_eq!(sink.renders[0].1.pixel(1, 1), Rgb::new(0, 0, 255));
}

#[test]
fn test_not_an_image_fails_to_load() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("notes.txt");
  std::fs::write(&path, "definitely not pixels").unwrap();
  assert!(ImageLoader::load_and_scale(&path, 8, 8, &DisplayOptions::default()).is_err());
  assert!(ImageLoader::load_and_scale(dir.path().join("missing.png"), 8, 8, &DisplayOptions::default()).is_err());
}

#[test]
fn test_animation_loop_budget() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_gif(&dir, &[[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]], 20);
  let image = ImageLoader::load_and_scale(&path, 8, 8, &DisplayOptions::default()).unwrap();
  assert!(image.is_animation());
  assert_eq!(image.frame_count(), 3);

  let start = Instant::now();
  let budget = PlaybackBudget::unlimited(CancelToken::new()).with_max_loops(Some(2));
  let mut sink = RecordingSink::default();
  let outcome = image.display(&budget, &mut sink).unwrap();

  assert_eq!(outcome.stop, StopReason::LoopLimit);
  assert_eq!(outcome.frames_shown, 6);
  assert_eq!(outcome.loops_completed, 2);
  assert_eq!(sink.jumps.len(), 5);
  assert!(Instant::now() - start >= Duration::from_millis(120));
  // GIF palettes may shift colors slightly.
  let second = sink.renders[1].1.pixel(0, 0);
  assert!(second.g > 200 && second.r < 50 && second.b < 50, "{second:?}");
}

#[test]
fn test_animation_interrupt() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_gif(&dir, &[[255, 0, 0, 255], [0, 255, 0, 255]], 10);
  let image = ImageLoader::load_and_scale(&path, 8, 8, &DisplayOptions::default()).unwrap();

  let token = CancelToken::new();
  let mut sink = RecordingSink::cancelling_after(3, &token);
  let outcome = image
    .display(&PlaybackBudget::unlimited(token.clone()), &mut sink)
    .unwrap();

  assert_eq!(outcome.stop, StopReason::Interrupted);
  assert_eq!(outcome.frames_shown, 3);
  assert_eq!(outcome.loops_completed, 1);
}

#[test]
fn test_scroll_wraps_and_counts_loops() {
  let dir = tempfile::tempdir().unwrap();
  let mut stripes = RgbaImage::new(8, 2);
  for (x, _, pixel) in stripes.enumerate_pixels_mut() {
    *pixel = Rgba([x as u8 * 30, 0, 0, 255]);
  }
  let path = write_png(&dir, "stripes.png", &stripes);
  let options = DisplayOptions {
    scale: ScaleOptions {
      fill_height: true,
      ..ScaleOptions::default()
    },
    antialias: false,
    ..DisplayOptions::default()
  };
  let image = ImageLoader::load_and_scale(&path, 4, 2, &options).unwrap();
  assert_eq!(image.geometry(), FrameGeometry::new(8, 2));

  let budget = PlaybackBudget::unlimited(CancelToken::new()).with_max_loops(Some(1));
  let mut sink = RecordingSink::default();
  let outcome = image
    .scroll(&budget, 2, 0, Duration::from_millis(1), &mut sink)
    .unwrap();

  assert_eq!(outcome.stop, StopReason::LoopLimit);
  assert_eq!(outcome.frames_shown, 4);
  let viewport = &sink.renders[1].1;
  assert_eq!(viewport.geometry(), FrameGeometry::new(4, 2));
  assert_eq!(viewport.pixel(0, 0), Rgb::new(60, 0, 0));
  // The last tick wraps around the right edge.
  assert_eq!(sink.renders[3].1.pixel(3, 1), Rgb::new(30, 0, 0));
  assert_eq!(sink.jumps, [2, 2, 2]);
}

#[test]
fn test_scroll_negative_delta_moves_left() {
  let dir = tempfile::tempdir().unwrap();
  let mut stripes = RgbaImage::new(8, 2);
  for (x, _, pixel) in stripes.enumerate_pixels_mut() {
    *pixel = Rgba([x as u8 * 30, 0, 0, 255]);
  }
  let path = write_png(&dir, "stripes.png", &stripes);
  let options = DisplayOptions {
    scale: ScaleOptions {
      fill_height: true,
      ..ScaleOptions::default()
    },
    antialias: false,
    ..DisplayOptions::default()
  };
  let image = ImageLoader::load_and_scale(&path, 4, 2, &options).unwrap();

  let budget = PlaybackBudget::unlimited(CancelToken::new()).with_max_loops(Some(1));
  let mut sink = RecordingSink::default();
  let outcome = image
    .scroll(&budget, -2, 0, Duration::from_millis(1), &mut sink)
    .unwrap();

  assert_eq!(outcome.stop, StopReason::LoopLimit);
  assert_eq!(outcome.frames_shown, 4);
  // The origin wraps from 0 to the right end first.
  let viewport = &sink.renders[1].1;
  assert_eq!(viewport.pixel(0, 0), Rgb::new(180, 0, 0));
  assert_eq!(viewport.pixel(1, 0), Rgb::new(210, 0, 0));
  assert_eq!(viewport.pixel(2, 0), Rgb::new(0, 0, 0));
  assert_eq!(viewport.pixel(3, 1), Rgb::new(30, 0, 0));
  assert_eq!(sink.renders[3].1.pixel(0, 0), Rgb::new(60, 0, 0));
}

/// A 4x16 image made of 8 bands, two rows each, colored 0, 30, 60, ...
fn write_bands(dir: &tempfile::TempDir) -> std::path::PathBuf {
  let mut bands = RgbaImage::new(4, 16);
  for (_, y, pixel) in bands.enumerate_pixels_mut() {
    *pixel = Rgba([0, (y / 2) as u8 * 30, 0, 255]);
  }
  write_png(dir, "bands.png", &bands)
}

#[test]
fn test_vertical_scroll_fills_width() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_bands(&dir);
  let options = DisplayOptions {
    scale: ScaleOptions {
      fill_width: true,
      ..ScaleOptions::default()
    },
    antialias: false,
    ..DisplayOptions::default()
  };
  let image = ImageLoader::load_and_scale(&path, 2, 4, &options).unwrap();
  // Without fill_width the image would shrink to 1x4 and leave nothing to scroll.
  assert_eq!(image.geometry(), FrameGeometry::new(2, 8));

  let budget = PlaybackBudget::unlimited(CancelToken::new()).with_max_loops(Some(1));
  let mut sink = RecordingSink::default();
  let outcome = image
    .scroll(&budget, 0, 3, Duration::from_millis(1), &mut sink)
    .unwrap();

  assert_eq!(outcome.stop, StopReason::LoopLimit);
  assert_eq!(outcome.frames_shown, 8);
  assert_eq!(outcome.loops_completed, 1);
  let viewport = &sink.renders[1].1;
  assert_eq!(viewport.geometry(), FrameGeometry::new(2, 4));
  assert_eq!(viewport.pixel(0, 0), Rgb::new(0, 90, 0));
  assert_eq!(viewport.pixel(1, 3), Rgb::new(0, 180, 0));
  // Origin 6: rows 6, 7, then wrapping to 0 and 1.
  let wrapped = &sink.renders[2].1;
  assert_eq!(wrapped.pixel(0, 1), Rgb::new(0, 210, 0));
  assert_eq!(wrapped.pixel(0, 2), Rgb::new(0, 0, 0));
  assert_eq!(wrapped.pixel(0, 3), Rgb::new(0, 30, 0));
  assert_eq!(sink.jumps, [4; 7]);
}

#[test]
fn test_scroll_centers_narrow_viewport() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_bands(&dir);
  let options = DisplayOptions {
    scale: ScaleOptions {
      fill_width: true,
      center_horizontally: true,
      ..ScaleOptions::default()
    },
    antialias: false,
    ..DisplayOptions::default()
  };
  // Not upscaled, so the image stays narrower than the bound.
  let image = ImageLoader::load_and_scale(&path, 10, 4, &options).unwrap();
  assert_eq!(image.geometry(), FrameGeometry::new(4, 16));

  let budget = PlaybackBudget::unlimited(CancelToken::new()).with_max_frames(Some(3));
  let mut sink = RecordingSink::default();
  image
    .scroll(&budget, 0, 1, Duration::from_millis(1), &mut sink)
    .unwrap();

  assert_eq!(sink.renders.len(), 3);
  for (_, viewport, indent) in &sink.renders {
    assert_eq!(viewport.geometry(), FrameGeometry::new(4, 4));
    assert_eq!(*indent, 3);
  }
}

//// ffmpeg

#[test]
fn test_output() {
  if !ffmpeg_is_installed() {
    eprintln!("ffmpeg not installed, skipping");
    return;
  }
  let frame_count = FfmpegCommand::new()
    .testsrc("duration=5:rate=1")
    .rawvideo()
    .spawn()
    .unwrap()
    .iter()
    .unwrap()
    .filter_frames()
    .count();

  assert_eq!(frame_count, 5);
}

#[test]
fn test_ffmpeg_session_plays_testsrc() {
  if !ffmpeg_is_installed() {
    eprintln!("ffmpeg not installed, skipping");
    return;
  }
  let mut command = FfmpegCommand::new();
  command
    .nostdin()
    .testsrc("duration=1:rate=50:size=32x24")
    .first_video_stream()
    .fit_to(16, 16, &ScaleOptions::default())
    .rawvideo();
  let decoder = FfmpegDecoder::spawn(&mut command).unwrap();
  // ffmpeg already scaled the 32x24 source.
  assert_eq!(decoder.probe().geometry(), FrameGeometry::new(16, 12));
  assert_eq!(decoder.probe().frame_rate, 50.0);

  let mut session = PlaybackSession::open(decoder, 16, 16, &ScaleOptions::default()).unwrap();
  assert_eq!(session.geometry(), FrameGeometry::new(16, 12));

  let mut sink = RecordingSink::default();
  let outcome = session
    .play(&PlaybackBudget::unlimited(CancelToken::new()), &mut sink)
    .unwrap();

  assert_eq!(outcome.stop, StopReason::EndOfStream);
  assert_eq!(outcome.frames_shown, 50);
}

#[test]
fn test_ffmpeg_frame_budget_kills_child() {
  if !ffmpeg_is_installed() {
    eprintln!("ffmpeg not installed, skipping");
    return;
  }
  let mut command = FfmpegCommand::new();
  command
    .nostdin()
    .testsrc("rate=100:size=16x16")
    .first_video_stream()
    .rawvideo();
  let decoder = FfmpegDecoder::spawn(&mut command).unwrap();
  let mut session = PlaybackSession::open(decoder, 16, 16, &ScaleOptions::default()).unwrap();

  let budget = PlaybackBudget::unlimited(CancelToken::new()).with_max_frames(Some(3));
  let outcome = session
    .play(&budget, &mut RecordingSink::default())
    .unwrap();

  assert_eq!(outcome.stop, StopReason::FrameLimit);
  assert_eq!(outcome.frames_shown, 3);
  assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_ffmpeg_missing_file_is_unreadable() {
  if !ffmpeg_is_installed() {
    eprintln!("ffmpeg not installed, skipping");
    return;
  }
  let result = FfmpegDecoder::open(
    "/nonexistent/termframe/clip.mp4",
    16,
    16,
    &ScaleOptions::default(),
  );
  assert!(matches!(result, Err(OpenError::Unreadable(_))));
}

/// Stands in for ffmpeg: announces a 2x2 rgb24 stream at 10 fps, then writes
/// five red frames, each followed by two error lines about a damaged
/// macroblock that got concealed.
#[cfg(unix)]
const FAKE_FFMPEG: &str = r#"#!/bin/sh
cat >&2 <<'LOG'
[info] Input #0, h264, from 'damaged.h264':
[info]   Duration: N/A, bitrate: N/A
[info]   Stream #0:0: Video: h264 (High), yuv420p(progressive), 2x2, 10 fps, 10 tbr, 1200k tbn
[info] Stream mapping:
[info]   Stream #0:0 -> #0:0 (h264 (native) -> rawvideo (native))
[info] Output #0, rawvideo, to 'pipe:':
[info]   Stream #0:0: Video: rawvideo (RGB[24] / 0x18424752), rgb24(progressive), 2x2, q=2-31, 960 kb/s, 10 fps, 10 tbn
LOG
for i in 1 2 3 4 5; do
  printf '\377\000\000\377\000\000\377\000\000\377\000\000'
  echo "[error] error while decoding MB 0 0, bytestream -7" >&2
  echo "[error] concealing 1 DC, 1 AC, 1 MV errors in P frame" >&2
done
"#;

#[cfg(unix)]
fn spawn_fake_ffmpeg(script: &std::path::Path) -> FfmpegDecoder {
  // A test thread forking while the script was being written keeps it busy
  // for a moment.
  for _ in 0..10 {
    let mut command = FfmpegCommand::new_with_exe(script);
    command.nostdin().input("damaged.h264").rawvideo();
    match FfmpegDecoder::spawn(&mut command) {
      Err(OpenError::Unreadable(msg)) if msg.contains("Text file busy") => {
        std::thread::sleep(std::time::Duration::from_millis(20));
      }
      result => return result.unwrap(),
    }
  }
  panic!("{} stayed busy", script.display());
}

#[cfg(unix)]
#[test]
fn test_ffmpeg_error_lines_take_no_frame_slot() {
  use std::os::unix::fs::PermissionsExt;

  let dir = tempfile::tempdir().unwrap();
  let script = dir.path().join("ffmpeg");
  std::fs::write(&script, FAKE_FFMPEG).unwrap();
  std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

  let decoder = spawn_fake_ffmpeg(&script);
  assert_eq!(decoder.probe().geometry(), FrameGeometry::new(2, 2));
  let mut session = PlaybackSession::open(decoder, 16, 16, &ScaleOptions::default()).unwrap();

  let start = Instant::now();
  let mut sink = RecordingSink::default();
  let outcome = session
    .play(&PlaybackBudget::unlimited(CancelToken::new()), &mut sink)
    .unwrap();
  let elapsed = Instant::now() - start;

  assert_eq!(outcome.stop, StopReason::EndOfStream);
  assert_eq!(outcome.frames_shown, 5);
  assert_eq!(sink.renders[4].1.pixel(1, 1), Rgb::new(255, 0, 0));
  // Five slots of 100ms; ten error lines taking a slot each would triple it.
  assert!(elapsed >= Duration::from_millis(450), "took {elapsed:#}");
  assert!(elapsed < Duration::from_millis(800), "took {elapsed:#}");
}
