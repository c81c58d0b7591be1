//! Process command implementation.

use super::failed;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{Orchestrator, ProgressFn};
use anyhow::Result;
use indicatif::ProgressBar;
use std::sync::Arc;

/// Route orchestrator progress to a percentage bar.
pub(super) fn progress_reporter(pb: ProgressBar) -> ProgressFn {
    Arc::new(move |message: &str, percent: u8| {
        pb.set_position(u64::from(percent));
        pb.set_message(message.to_string());
    })
}

/// Run the process command.
pub async fn run_process(input: &str, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Process) {
        Output::error(&format!("{}", e));
        Output::info("Run 'glimt doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let pb = Output::percent_bar("Starting...");
    let orchestrator = Orchestrator::new(settings)?.with_progress(progress_reporter(pb.clone()));

    let result = orchestrator.process_video(input).await;
    pb.finish_and_clear();

    let result = result.map_err(|e| failed("Processing failed", e))?;
    let retired = orchestrator
        .retire_stale_frames(&result)
        .map_err(|e| failed("Could not remove old frames", e))?;
    if retired > 0 {
        Output::info(&format!("Removed {} frames from earlier builds", retired));
    }

    Output::success("Video processed successfully!");
    Output::kv("Title", &result.metadata.title);
    if let Some(author) = &result.metadata.author {
        Output::kv("Author", author);
    }
    Output::kv("Duration", &result.metadata.format_duration());
    Output::kv("Frames indexed", &result.video.frame_count.to_string());
    Output::kv("Caption spans", &result.captions_found.to_string());
    Output::kv("Passages indexed", &result.video.text_count.to_string());

    if result.captions_found == 0 {
        Output::warning("No captions found; answers will rely on frames only.");
    }

    println!();
    Output::info("Ask questions with: glimt ask \"...\" (or glimt chat)");

    Ok(())
}
