//! Configuration module for Glimt.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, SynthesisPrompts};
pub use settings::{
    validate_k, CaptionSettings, DisplaySettings, EmbeddingSettings, FrameSettings,
    GeneralSettings, ImageEmbeddingSettings, PromptSettings, RetrievalSettings, Settings,
    SynthesisSettings, K_RANGE,
};
