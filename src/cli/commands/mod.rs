//! CLI command implementations.

mod ask;
mod chat;
mod cleanup;
mod config;
mod doctor;
mod process;
mod search;
mod serve;
mod status;

pub use ask::run_ask;
pub use chat::run_chat;
pub use cleanup::run_cleanup;
pub use config::run_config;
pub use doctor::run_doctor;
pub use process::run_process;
pub use search::run_search;
pub use serve::run_serve;
pub use status::run_status;

use crate::cli::Output;
use crate::config::{validate_k, Settings};
use crate::error::GlimtError;

/// Apply command-line K overrides over the configured values.
fn resolve_k(
    settings: &Settings,
    text_k: Option<usize>,
    image_k: Option<usize>,
) -> crate::error::Result<(usize, usize)> {
    let text_k = validate_k("text_k", text_k.unwrap_or(settings.retrieval.text_k))?;
    let image_k = validate_k("image_k", image_k.unwrap_or(settings.retrieval.image_k))?;
    Ok((text_k, image_k))
}

/// Print a command failure. Errors the user can fix get a hint instead of
/// an error banner.
fn failed(context: &str, e: GlimtError) -> anyhow::Error {
    if e.is_user_correctable() {
        Output::warning(&e.to_string());
        if matches!(e, GlimtError::NotReady) {
            Output::info("Process a video first: glimt process <youtube-url-or-file>");
        }
    } else {
        Output::error(&format!("{}: {}", context, e));
        if e.is_retryable() {
            Output::info("The search backend failed; try again in a moment.");
        }
    }
    e.into()
}
