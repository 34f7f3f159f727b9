//! Thinking-segment helpers for assistant content.
//!
//! Assistant replies may embed a chain-of-thought segment wrapped in
//! `<think>` … `</think>`. Both helpers are pure functions of the raw string.

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

/// Trimmed inner text of the first complete segment, if any.
///
/// A segment with only whitespace inside yields `None`.
pub fn extract_thinking(raw: &str) -> Option<String> {
    let (start, end) = first_segment(raw)?;
    let inner = raw[start + THINK_OPEN.len()..end - THINK_CLOSE.len()].trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_owned())
    }
}

/// Content with every complete segment removed, trimmed.
pub fn display_content(raw: &str) -> String {
    let mut content = raw.to_owned();
    while let Some((start, end)) = first_segment(&content) {
        content.replace_range(start..end, "");
    }
    content.trim().to_owned()
}

fn first_segment(raw: &str) -> Option<(usize, usize)> {
    let start = raw.find(THINK_OPEN)?;
    let inner = start + THINK_OPEN.len();
    let close = raw[inner..].find(THINK_CLOSE)? + inner;
    Some((start, close + THINK_CLOSE.len()))
}
