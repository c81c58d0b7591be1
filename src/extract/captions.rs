//! Caption extraction.
//!
//! YouTube subtitles are downloaded as WebVTT with yt-dlp (manual tracks
//! preferred over automatic ones). Local files use their first embedded
//! subtitle stream. Either way the result is a list of time-aligned spans.

use super::run_tool;
use crate::error::{GlimtError, Result};
use crate::video_source::{SourceType, VideoMetadata};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, instrument, warn};

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid regex"));

static CACHE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<s>\s*([0-9.]+)\s*\|\s*([0-9.]+)\s*\|\s?(.*?)\s*</s>$").expect("Invalid regex")
});

/// A caption cue on the video timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSpan {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Caption text.
    pub text: String,
}

/// Fetch the captions of `video`. Returns an empty list when the video has
/// no captions.
#[instrument(skip(video, work_dir), fields(video_id = %video.id))]
pub async fn fetch_captions(
    video: &VideoMetadata,
    work_dir: &Path,
    languages: &[String],
) -> Result<Vec<CaptionSpan>> {
    std::fs::create_dir_all(work_dir)?;
    let scratch = tempfile::tempdir_in(work_dir)?;

    let spans = match video.source_type {
        SourceType::YouTube => download_youtube_subtitles(video, scratch.path(), languages).await?,
        SourceType::Local => extract_embedded_subtitles(video, scratch.path()).await?,
    };

    info!("Extracted {} caption spans", spans.len());
    Ok(spans)
}

/// Like [`fetch_captions`], but any failure yields zero spans.
pub async fn extract_captions_or_empty(
    video: &VideoMetadata,
    work_dir: &Path,
    languages: &[String],
) -> Vec<CaptionSpan> {
    match fetch_captions(video, work_dir, languages).await {
        Ok(spans) => spans,
        Err(e) => {
            warn!("Caption extraction failed for {}, continuing without captions: {}", video.id, e);
            Vec::new()
        }
    }
}

async fn download_youtube_subtitles(
    video: &VideoMetadata,
    dir: &Path,
    languages: &[String],
) -> Result<Vec<CaptionSpan>> {
    let template = dir.join("%(id)s.%(ext)s");
    let langs = if languages.is_empty() {
        "en".to_string()
    } else {
        languages.join(",")
    };

    run_tool(
        "yt-dlp",
        [
            "--skip-download",
            "--write-subs",
            "--write-auto-subs",
            "--sub-langs",
            &langs,
            "--sub-format",
            "vtt/best",
            "--no-playlist",
            "--no-warnings",
            "--quiet",
            "--output",
            &template.to_string_lossy(),
            &video.source_url,
        ],
    )
    .await?;

    let Some(path) = pick_subtitle_file(dir, languages)? else {
        info!("No captions available for {}", video.id);
        return Ok(Vec::new());
    };

    debug!("Parsing subtitles from {:?}", path);
    let content = std::fs::read_to_string(&path)?;
    Ok(parse_vtt(&content))
}

/// Choose the downloaded `.vtt` file matching the earliest preferred language.
fn pick_subtitle_file(dir: &Path, languages: &[String]) -> Result<Option<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("vtt"))
        .collect();
    files.sort();

    for lang in languages {
        let suffix = format!(".{}.vtt", lang);
        if let Some(found) = files
            .iter()
            .find(|p| p.to_string_lossy().ends_with(&suffix))
        {
            return Ok(Some(found.clone()));
        }
    }

    Ok(files.into_iter().next())
}

async fn extract_embedded_subtitles(video: &VideoMetadata, dir: &Path) -> Result<Vec<CaptionSpan>> {
    let output = dir.join("embedded.vtt");

    let result = run_tool(
        "ffmpeg",
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            &video.stream_url,
            "-map",
            "0:s:0",
            "-f",
            "webvtt",
            "-y",
            &output.to_string_lossy(),
        ],
    )
    .await;

    match result {
        Ok(_) => Ok(parse_vtt(&std::fs::read_to_string(&output)?)),
        Err(GlimtError::ToolFailed(msg)) if msg.contains("matches no streams") => {
            info!("{} has no subtitle stream", video.id);
            Ok(Vec::new())
        }
        Err(e) => Err(GlimtError::Extraction(format!("Subtitle extraction failed: {}", e))),
    }
}

/// Parse a WebVTT document into caption spans.
///
/// Inline markup is stripped, and the repeated lines that rolling
/// auto-generated captions carry from one cue into the next are dropped.
pub fn parse_vtt(content: &str) -> Vec<CaptionSpan> {
    let content = content.replace("\r\n", "\n");
    let mut spans: Vec<CaptionSpan> = Vec::new();
    let mut previous_lines: Vec<String> = Vec::new();

    for block in content.split("\n\n") {
        let mut lines = block.lines().skip_while(|line| !line.contains("-->"));

        let Some(timing) = lines.next() else {
            continue;
        };
        let Some((start, end)) = parse_cue_timing(timing) else {
            continue;
        };

        let cue_lines: Vec<String> = lines
            .map(clean_caption_text)
            .filter(|line| !line.is_empty())
            .collect();

        let fresh: Vec<&str> = cue_lines
            .iter()
            .filter(|line| !previous_lines.contains(line))
            .map(String::as_str)
            .collect();

        if !cue_lines.is_empty() {
            previous_lines = cue_lines.clone();
        }

        if fresh.is_empty() {
            continue;
        }

        let text = fresh.join(" ");
        if spans.last().is_some_and(|last| last.text == text) {
            continue;
        }

        spans.push(CaptionSpan { start, end, text });
    }

    spans
}

/// Parse `00:00:01.000 --> 00:00:04.000 align:start` into seconds.
fn parse_cue_timing(line: &str) -> Option<(f64, f64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?;
    Some((parse_vtt_timestamp(start.trim())?, parse_vtt_timestamp(end)?))
}

/// Parse `HH:MM:SS.mmm` or `MM:SS.mmm`.
fn parse_vtt_timestamp(value: &str) -> Option<f64> {
    let mut seconds = 0.0;
    for part in value.split(':') {
        let part: f64 = part.replace(',', ".").parse().ok()?;
        seconds = seconds * 60.0 + part;
    }
    Some(seconds)
}

fn clean_caption_text(line: &str) -> String {
    let stripped = TAG_RE.replace_all(line, "");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Location of the caption cache for a video.
pub fn caption_file_path(dir: &Path, video_id: &str) -> PathBuf {
    dir.join(format!("captions_{}.txt", video_id))
}

/// Write spans as `<s> start | end | text </s>` lines.
pub fn write_caption_file(path: &Path, spans: &[CaptionSpan]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = spans
        .iter()
        .map(|s| {
            format!(
                "<s> {:.2} | {:.2} | {} </s>",
                s.start,
                s.end,
                s.text.replace('\n', " ").trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    std::fs::write(path, content)?;
    Ok(())
}

/// Read a caption cache file. Lines that do not parse are skipped.
pub fn read_caption_file(path: &Path) -> Result<Vec<CaptionSpan>> {
    let content = std::fs::read_to_string(path)?;
    let mut spans = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed = CACHE_LINE_RE.captures(line).and_then(|caps| {
            Some(CaptionSpan {
                start: caps[1].parse().ok()?,
                end: caps[2].parse().ok()?,
                text: caps[3].to_string(),
            })
        });

        match parsed {
            Some(span) => spans.push(span),
            None => warn!("Skipping malformed caption line {} in {:?}", line_no + 1, path),
        }
    }

    Ok(spans)
}
