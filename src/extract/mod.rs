//! Media extraction for Glimt.
//!
//! Turns a resolved video into the raw material of the evidence index: frames
//! sampled at a fixed interval and time-aligned caption spans. Both go through
//! external tools (ffmpeg, yt-dlp) driven with `tokio::process`.

mod captions;
mod frames;

pub use captions::{
    caption_file_path, extract_captions_or_empty, fetch_captions, parse_vtt, read_caption_file,
    write_caption_file, CaptionSpan,
};
pub use frames::{clear_frames, extract_frames, frame_dirs, prune_frame_dirs, Frame, FrameSet};

use crate::error::{GlimtError, Result};
use crate::video_source::spawn_error;
use std::ffi::OsStr;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Run an external tool to completion, failing on a non-zero exit status.
pub(crate) async fn run_tool<I, S>(program: &str, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("Running {:?}", command.as_std());

    let output = command
        .output()
        .await
        .map_err(|e| spawn_error(program, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GlimtError::ToolFailed(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }

    Ok(output)
}
