//! Sentence-aware sliding-window text chunker.
//!
//! Splits normalized text into [`Chunk`]s of at most `max_chars` characters.
//! A window that does not reach the end of the text is cut after the last
//! sentence or paragraph break it contains, as long as that break lies past
//! 30% of the window; otherwise it is cut hard at the window boundary. Each
//! next window starts `overlap` characters before the previous cut.
//!
//! All positions are counted in `char`s, never bytes.

use crate::models::Chunk;

/// Break points, searched right-to-left; the rightmost match of any wins.
const BREAK_PATTERNS: [&str; 4] = [". ", "? ", "! ", "\n\n"];

/// A break point must lie past this fraction of `max_chars` to be used.
const MIN_BREAK_FRACTION: f64 = 0.3;

/// Normalize line endings, collapse 3+ newlines to 2, and trim.
pub fn normalize(raw: &str) -> String {
    let mut text = raw.replace("\r\n", "\n");
    while text.contains("\n\n\n") {
        text = text.replace("\n\n\n", "\n\n");
    }
    text.trim().to_string()
}

/// Split text into overlapping chunks with contiguous indices starting at 0.
///
/// Empty or whitespace-only input yields no chunks. The cursor always moves
/// forward: when `overlap` would pull the next window back to (or before) the
/// current start, the next window starts at the current cut instead.
pub fn chunk_text(raw: &str, max_chars: usize, overlap: usize) -> Vec<Chunk> {
    let text = normalize(raw);
    if text.is_empty() {
        return Vec::new();
    }

    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = (start + max_chars).min(len);
        if end < len {
            end = find_safe_break(&chars, start, end, max_chars);
        }

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(Chunk {
                index: chunks.len(),
                text: trimmed.to_string(),
            });
        }

        if end == len {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

/// Returns the cut position for the window `chars[start..end]`.
fn find_safe_break(chars: &[char], start: usize, end: usize, max_chars: usize) -> usize {
    let window: String = chars[start..end].iter().collect();
    let rightmost = BREAK_PATTERNS
        .iter()
        .filter_map(|pattern| window.rfind(pattern))
        .max();

    let Some(byte_idx) = rightmost else {
        return end;
    };

    let idx = window[..byte_idx].chars().count();
    let threshold = (max_chars as f64 * MIN_BREAK_FRACTION) as usize;
    if idx > threshold {
        // Keep the terminator, push the following whitespace into the next chunk.
        start + idx + 1
    } else {
        end
    }
}
