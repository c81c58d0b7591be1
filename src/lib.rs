//! Glimt - Multimodal Question Answering over Video
//!
//! A local-first CLI tool that samples frames and captions from a video,
//! indexes both, and answers questions from the evidence most similar to
//! each question.
//!
//! The name "Glimt" comes from the Norwegian word for "glimpse."
//!
//! # Overview
//!
//! Glimt allows you to:
//! - Process YouTube videos and local video files into a multimodal index
//! - Retrieve the frames and caption passages most relevant to a question
//! - Get answers from a vision model grounded in that evidence
//! - Serve the same operations over HTTP
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `video_source` - Video source abstraction (YouTube, local files)
//! - `extract` - Frame sampling and caption extraction
//! - `embedding` - Text and image embedding generation
//! - `index` - Building evidence records from frames and captions
//! - `evidence` - Evidence types and the frozen evidence store
//! - `retriever` - Per-modality top-K retrieval
//! - `synthesis` - Answer synthesis from retrieved evidence
//! - `session` - Session state for the current video
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use glimt::config::Settings;
//! use glimt::orchestrator::Orchestrator;
//! use glimt::session::Session;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let result = orchestrator.process_video("dQw4w9WgXcQ").await?;
//!     let mut session = Session::new();
//!     session.transition(result.session_event());
//!
//!     let outcome = orchestrator.ask(&session, "What is the singer wearing?").await?;
//!     println!("{}", outcome.answer.text);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod evidence;
pub mod extract;
pub mod index;
pub mod openai;
pub mod orchestrator;
pub mod retriever;
pub mod session;
pub mod synthesis;
pub mod video_source;

pub use error::{GlimtError, Result};
