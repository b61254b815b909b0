use crate::error::Result;
use crate::event::{FfmpegEvent, FfmpegInput, FfmpegOutput, Stream, VideoStream};

/// Everything ffmpeg announces about its inputs and outputs before the first
/// frame is written.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FfmpegMetadata {
  expected_output_streams: usize,
  pub outputs: Vec<FfmpegOutput>,
  pub output_streams: Vec<Stream>,
  pub inputs: Vec<FfmpegInput>,
  pub input_streams: Vec<Stream>,

  /// Whether all metadata from the parent process has been gathered into this struct
  completed: bool,
}

impl FfmpegMetadata {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_completed(&self) -> bool {
    self.completed
  }

  /// Duration of the first input in seconds, if the container announced one.
  pub fn duration(&self) -> Option<f64> {
    self.inputs.first()?.duration
  }

  /// The first video stream written to stdout, i.e. the one frames are read from.
  pub fn video_output(&self) -> Option<(&Stream, &VideoStream)> {
    self.output_streams.iter().find_map(|stream| {
      let to_stdout = self
        .outputs
        .iter()
        .any(|output| output.index == stream.parent_index && output.is_stdout());
      match stream.video_data() {
        Some(video) if to_stdout => Some((stream, video)),
        _ => None,
      }
    })
  }

  /// The first video stream of any input.
  pub fn video_input(&self) -> Option<&VideoStream> {
    self.input_streams.iter().find_map(Stream::video_data)
  }

  pub fn handle_event(&mut self, item: &Option<FfmpegEvent>) -> Result<()> {
    if self.is_completed() {
      return Err("Metadata is already completed".into());
    }

    match item {
      // Every stream mapping corresponds to one output stream
      // We count these to know when we've received all the output streams
      Some(FfmpegEvent::ParsedStreamMapping(_)) => self.expected_output_streams += 1,
      Some(FfmpegEvent::ParsedInput(input)) => self.inputs.push(input.clone()),
      Some(FfmpegEvent::ParsedOutput(output)) => self.outputs.push(output.clone()),
      Some(FfmpegEvent::ParsedDuration(duration)) => {
        let input = self
          .inputs
          .iter_mut()
          .find(|input| input.index == duration.input_index)
          .ok_or("Duration reported for an unknown input")?;
        input.duration = Some(duration.duration);
      }
      Some(FfmpegEvent::ParsedOutputStream(stream)) => self.output_streams.push(stream.clone()),
      Some(FfmpegEvent::ParsedInputStream(stream)) => self.input_streams.push(stream.clone()),
      _ => (),
    }

    if self.expected_output_streams > 0 && self.output_streams.len() == self.expected_output_streams
    {
      self.completed = true;
    }

    Ok(())
  }
}
