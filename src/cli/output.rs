//! CLI output formatting utilities.

use crate::evidence::IndexedVideo;
use crate::retriever::RetrievalResult;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print the indexed video.
    pub fn video_info(video: &IndexedVideo) {
        let duration = video
            .duration_seconds
            .map(format_duration)
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "  {} {} ({}, {} frames, {} passages, {})",
            style("*").cyan(),
            style(&video.title).bold(),
            style(&video.video_id).dim(),
            video.frame_count,
            video.text_count,
            duration
        );
        println!("    {}", style(&video.source_url).dim());
    }

    /// Print retrieved frames and passages.
    pub fn retrieval(result: &RetrievalResult) {
        if result.is_empty() {
            Self::warning("Nothing relevant was retrieved.");
            return;
        }

        if !result.images.is_empty() {
            Self::header("Frames");
            for path in &result.images {
                Self::list_item(&path.display().to_string());
            }
        }

        if !result.texts.is_empty() {
            Self::header("Caption passages");
            for (i, text) in result.texts.iter().enumerate() {
                println!("\n{} {}", style(format!("[{}]", i + 1)).green(), content_preview(text, 200));
            }
        }
    }

    /// Print the frames an answer was drawn from, up to `max`.
    pub fn frames_used(images: &[PathBuf], max: usize) {
        if images.is_empty() || max == 0 {
            return;
        }
        println!("\n{}", style("Frames used:").dim());
        for path in images.iter().take(max) {
            println!("  {} {}", style("*").cyan(), style(path.display()).dim());
        }
        if images.len() > max {
            println!("  {}", style(format!("... and {} more", images.len() - max)).dim());
        }
    }

    /// Create a progress bar counting to 100.
    pub fn percent_bar(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(100);
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        {
            pb.set_style(bar_style.progress_chars("#>-"));
        }
        pb.set_message(msg.to_string());
        pb
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Format duration in seconds to a human-readable string.
fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Truncate content with ellipsis.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let truncated: String = content.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
