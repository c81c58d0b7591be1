//! Caption windowing.
//!
//! Groups consecutive caption spans into passages covering a bounded stretch
//! of the video.

use crate::evidence::valid_span;
use crate::extract::CaptionSpan;
use tracing::warn;

/// Drop spans with an invalid time range or no text.
pub fn sanitize_spans(spans: &[CaptionSpan]) -> Vec<CaptionSpan> {
    spans
        .iter()
        .enumerate()
        .filter_map(|(i, span)| {
            let text = span.text.trim();
            if !valid_span(span.start, span.end) {
                warn!(
                    "Skipping caption {} with invalid span {:.2}-{:.2}",
                    i, span.start, span.end
                );
                return None;
            }
            if text.is_empty() {
                return None;
            }
            Some(CaptionSpan {
                start: span.start,
                end: span.end,
                text: text.to_string(),
            })
        })
        .collect()
}

/// Merge consecutive spans into passages no longer than `window_seconds`.
///
/// A window of zero keeps every span as its own passage. A single span longer
/// than the window still forms a passage on its own.
pub fn window_captions(spans: &[CaptionSpan], window_seconds: f64) -> Vec<CaptionSpan> {
    let spans = sanitize_spans(spans);
    if window_seconds <= 0.0 {
        return spans;
    }

    let mut windows: Vec<CaptionSpan> = Vec::new();
    let mut current: Option<CaptionSpan> = None;

    for span in spans {
        current = match current.take() {
            Some(mut window) if span.end - window.start <= window_seconds => {
                window.end = window.end.max(span.end);
                window.text.push(' ');
                window.text.push_str(&span.text);
                Some(window)
            }
            Some(window) => {
                windows.push(window);
                Some(span)
            }
            None => Some(span),
        };
    }

    windows.extend(current);
    windows
}
