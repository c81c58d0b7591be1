//! Cleanup command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::session::Session;
use anyhow::Result;

/// Remove frames, caption files and the index.
pub fn run_cleanup(settings: Settings) -> Result<()> {
    preflight::check(Operation::Cleanup)?;

    let mut session = Session::restore(&settings)?;
    let orchestrator = Orchestrator::new(settings)?;

    let report = orchestrator.cleanup(&mut session)?;

    Output::success("Cleanup completed");
    Output::kv("Frames removed", &report.frames_removed.to_string());
    Output::kv("Caption files removed", &report.caption_files_removed.to_string());
    Output::kv("Index removed", if report.store_removed { "yes" } else { "no" });

    Ok(())
}
