use crate::error::Result;
use std::{
  env::current_exe,
  path::{Path, PathBuf},
};

/// Returns the path of the ffmpeg executable to run.
///
/// An `ffmpeg` binary next to the running executable wins; otherwise the
/// plain name is returned and resolved through `PATH` at spawn time.
pub fn ffmpeg_path() -> PathBuf {
  let default = Path::new("ffmpeg").to_path_buf();
  match sidecar_path() {
    Ok(sidecar_path) if sidecar_path.exists() => sidecar_path,
    _ => default,
  }
}

/// The (expected) path to an ffmpeg binary adjacent to the Rust binary.
pub fn sidecar_path() -> Result<PathBuf> {
  let mut path = current_exe()?
    .parent()
    .ok_or("Can't get parent of current_exe")?
    .join("ffmpeg");
  if cfg!(windows) {
    path.set_extension("exe");
  }
  Ok(path)
}
