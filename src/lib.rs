//! Show images, animations and videos in a 24-bit color terminal.
//!
//! Frames are fitted into a pixel bounding box, drawn as half-block
//! characters (two pixels per text cell) and paced against absolute
//! deadlines on a monotonic clock, so playback speed doesn't drift with
//! decode latency. Videos are decoded by an `ffmpeg` child process; still
//! images and GIF/WebP animations by the `image` crate.
//!
//! ## Example
//!
//! ```rust,no_run
//! use termframe::{
//!   budget::{CancelToken, PlaybackBudget},
//!   canvas::TerminalCanvas,
//!   error::Result,
//!   scale::ScaleOptions,
//!   time::Duration,
//!   video::VideoLoader,
//! };
//!
//! fn main() -> Result<()> {
//!   let mut session = VideoLoader::load_and_scale("clip.mp4", 80, 48, &ScaleOptions::default())?;
//!   let budget = PlaybackBudget::new(Duration::from_millis(5000), CancelToken::new())
//!     .with_max_frames(Some(100));
//!   let mut canvas = TerminalCanvas::new(std::io::stdout(), false);
//!   let outcome = session.play(&budget, &mut canvas)?; // <- paced, in-place animation
//!   eprintln!("{} frames, stopped by {:?}", outcome.frames_shown, outcome.stop);
//!   Ok(())
//! }
//! ```
//!

#[cfg(test)]
mod test;

pub mod budget;
pub mod canvas;
pub mod child;
pub mod command;
pub mod decoder;
pub mod error;
pub mod event;
pub mod framebuffer;
pub mod iter;
pub mod log_parser;
pub mod logging;
pub mod metadata;
pub mod paths;
pub mod scale;
pub mod still;
pub mod time;
pub mod version;
pub mod video;
