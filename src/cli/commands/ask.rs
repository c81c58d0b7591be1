//! Ask command implementation.

use super::{failed, resolve_k};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::session::Session;
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    query: &str,
    text_k: Option<usize>,
    image_k: Option<usize>,
    settings: Settings,
) -> Result<()> {
    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Ask) {
        Output::error(&format!("{}", e));
        Output::info("Run 'glimt doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let (text_k, image_k) = resolve_k(&settings, text_k, image_k)?;
    let max_display_frames = settings.display.max_display_frames;

    let session = Session::restore(&settings)?;
    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner("Searching video...");
    let outcome = orchestrator.ask_with(&session, query, text_k, image_k).await;
    spinner.finish_and_clear();

    match outcome {
        Ok(outcome) => {
            println!("\n{}\n", outcome.answer.text);
            Output::frames_used(&outcome.retrieval.images, max_display_frames);
            Ok(())
        }
        Err(e) => Err(failed("Failed to generate answer", e)),
    }
}
