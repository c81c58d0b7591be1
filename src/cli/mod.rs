//! CLI module for Glimt.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Glimt - ask questions about a video
///
/// Samples frames and captions from a YouTube video or local file, indexes
/// them, and answers questions from what was seen and said.
/// The name "Glimt" is Norwegian for "glimpse."
#[derive(Parser, Debug)]
#[command(name = "glimt")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check system requirements and configuration
    Doctor,

    /// Process a video: extract frames and captions and build the index
    Process {
        /// YouTube URL/ID, or local video file path
        input: String,
    },

    /// Ask a question about the processed video
    Ask {
        /// The question to ask
        query: String,

        /// Caption passages to retrieve (1-10)
        #[arg(long)]
        text_k: Option<usize>,

        /// Frames to retrieve (1-10)
        #[arg(long)]
        image_k: Option<usize>,
    },

    /// Show the frames and caption passages retrieved for a query
    Search {
        /// Search query
        query: String,

        /// Caption passages to retrieve (1-10)
        #[arg(long)]
        text_k: Option<usize>,

        /// Frames to retrieve (1-10)
        #[arg(long)]
        image_k: Option<usize>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive question session
    Chat,

    /// Show the currently processed video
    Status,

    /// Remove frames, captions and the index
    Cleanup,

    /// Start HTTP API server for integration with other systems
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
