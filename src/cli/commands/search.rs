//! Search command implementation.

use super::{failed, resolve_k};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::session::Session;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(
    query: &str,
    text_k: Option<usize>,
    image_k: Option<usize>,
    json: bool,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Search) {
        Output::error(&format!("{}", e));
        Output::info("Run 'glimt doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let (text_k, image_k) = resolve_k(&settings, text_k, image_k)?;

    let session = Session::restore(&settings)?;
    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner("Searching...");
    let results = orchestrator.search(&session, query, text_k, image_k).await;
    spinner.finish_and_clear();

    match results {
        Ok(result) if json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Ok(result) => {
            Output::success(&format!(
                "Found {} frames and {} caption passages",
                result.images.len(),
                result.texts.len()
            ));
            Output::retrieval(&result);
        }
        Err(e) => return Err(failed("Search failed", e)),
    }

    Ok(())
}
