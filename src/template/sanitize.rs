//! Value sanitization and expanded-path normalization
//!
//! Expanded variables must never introduce separators or reserved
//! characters into the destination path, and empty variables must not
//! leave `-`/`_` debris between segments.

use crate::config::PathCasing;

/// Characters that may not appear inside a path segment
const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Apply the configured casing to an expanded value
pub fn apply_casing(value: &str, casing: PathCasing) -> String {
    match casing {
        PathCasing::Original => value.to_string(),
        PathCasing::Lower => value.to_lowercase(),
        PathCasing::Upper => value.to_uppercase(),
        PathCasing::Title => title_case(value),
    }
}

fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for c in value.chars() {
        if c.is_alphanumeric() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Strip reserved and control characters, collapse whitespace runs, trim
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;
    for c in value.chars() {
        if RESERVED.contains(&c) || c.is_control() {
            continue;
        }
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }
    out
}

/// Clean up the fully expanded path.
///
/// Empty variables leave behind doubled separators and orphaned joiner
/// characters; this pass removes them:
/// - runs of path separators collapse to one
/// - segments consisting solely of `-`/`_` are dropped
/// - leading `-`/`_` runs after a separator are stripped
pub fn normalize_expanded(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    let mut last_was_separator = false;
    for c in path.chars() {
        if c == '/' || c == '\\' {
            if !last_was_separator {
                collapsed.push('/');
            }
            last_was_separator = true;
        } else {
            collapsed.push(c);
            last_was_separator = false;
        }
    }

    let mut segments: Vec<String> = Vec::new();
    for (i, segment) in collapsed.split('/').enumerate() {
        if i == 0 {
            // Keep an empty first segment: it encodes the leading separator
            segments.push(segment.to_string());
            continue;
        }
        let trimmed = segment.trim_start_matches(['-', '_']);
        if trimmed.is_empty() {
            continue;
        }
        segments.push(trimmed.to_string());
    }

    segments.join("/")
}
