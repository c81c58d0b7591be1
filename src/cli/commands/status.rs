//! Status command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::extract::{caption_file_path, read_caption_file};
use crate::session::Session;
use anyhow::Result;

/// Number of spans in the caption cache for `video_id`, if one was written.
fn cached_caption_count(settings: &Settings, video_id: &str) -> crate::error::Result<Option<usize>> {
    let path = caption_file_path(&settings.captions_dir(), video_id);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(read_caption_file(&path)?.len()))
}

/// Show the video the persisted session holds.
pub fn run_status(settings: &Settings) -> Result<()> {
    let session = Session::restore(settings)?;

    match session.video() {
        Some(video) => {
            Output::header("Current video");
            Output::video_info(video);
            Output::kv("Indexed at", &video.indexed_at.format("%Y-%m-%d %H:%M UTC").to_string());
            Output::kv("Index", &settings.evidence_db_path().display().to_string());
            match cached_caption_count(settings, &video.video_id) {
                Ok(Some(count)) => Output::kv("Cached captions", &format!("{} spans", count)),
                Ok(None) => Output::kv("Cached captions", "none"),
                Err(e) => Output::warning(&format!("Could not read caption cache: {}", e)),
            }
        }
        None => {
            Output::info("No video processed yet.");
            Output::info("Process one with: glimt process <youtube-url-or-file>");
        }
    }

    Ok(())
}
