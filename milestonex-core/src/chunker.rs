//! SRS text chunking
//!
//! Splits raw SRS text into sentence/line segments and packs them into
//! chunks no longer than a configured number of characters. Chunking is
//! total and deterministic.

use crate::models::Chunk;

/// Segments at or below this many characters carry no meaning
pub const DEFAULT_MIN_SEGMENT_LEN: usize = 5;

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];
const BULLET_CHARS: [char; 6] = ['-', '*', '•', '·', '▪', '–'];

/// Splits text into retained sentence/line segments, with the default minimum length
pub fn segments(text: &str) -> Vec<String> {
    segments_with(text, DEFAULT_MIN_SEGMENT_LEN)
}

/// Splits text at line breaks and sentence terminators followed by
/// whitespace. Bullet markers are stripped; segments that are too short or
/// carry no letters (numbering, bullets, page numbers) are dropped.
pub fn segments_with(text: &str, min_len: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' || c == '\r' {
            push_segment(&mut out, &current, min_len);
            current.clear();
            continue;
        }
        current.push(c);
        if SENTENCE_TERMINATORS.contains(&c) {
            let at_boundary = chars.peek().map_or(true, |next| next.is_whitespace());
            if at_boundary {
                push_segment(&mut out, &current, min_len);
                current.clear();
            }
        }
    }
    push_segment(&mut out, &current, min_len);
    out
}

fn push_segment(out: &mut Vec<String>, raw: &str, min_len: usize) {
    let cleaned = strip_bullet(raw.trim());
    if is_meaningful(cleaned, min_len) {
        out.push(cleaned.to_string());
    }
}

/// Removes leading bullet markers and "1)"-style numbering
fn strip_bullet(s: &str) -> &str {
    let s = s.trim_start_matches(|c: char| BULLET_CHARS.contains(&c) || c.is_whitespace());
    let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &s[digits..];
        if let Some(after) = rest.strip_prefix(')') {
            if after.starts_with(char::is_whitespace) {
                return after.trim_start();
            }
        }
    }
    s
}

fn is_meaningful(segment: &str, min_len: usize) -> bool {
    let content = segment.trim_end_matches(|c: char| SENTENCE_TERMINATORS.contains(&c));
    content.chars().count() > min_len && content.chars().any(char::is_alphabetic)
}

/// Chunks text with the default minimum segment length
pub fn chunk(text: &str, size: usize) -> Vec<Chunk> {
    chunk_with(text, size, DEFAULT_MIN_SEGMENT_LEN)
}

/// Packs segments into chunks of at most `size` characters. Segments are
/// joined with a single space; a segment longer than `size` is split at the
/// last whitespace that fits, or hard-cut when there is none.
pub fn chunk_with(text: &str, size: usize, min_len: usize) -> Vec<Chunk> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for segment in segments_with(text, min_len) {
        for piece in split_long(&segment, size) {
            let piece_len = piece.chars().count();
            if current_len == 0 {
                current = piece;
                current_len = piece_len;
            } else if current_len + 1 + piece_len <= size {
                current.push(' ');
                current.push_str(&piece);
                current_len += 1 + piece_len;
            } else {
                chunks.push(Chunk {
                    index: chunks.len(),
                    text: std::mem::take(&mut current),
                });
                current = piece;
                current_len = piece_len;
            }
        }
    }

    if current_len > 0 {
        chunks.push(Chunk {
            index: chunks.len(),
            text: current,
        });
    }

    chunks
}

fn split_long(segment: &str, size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest: Vec<char> = segment.chars().collect();

    while rest.len() > size {
        let window = &rest[..size];
        let cut = window
            .iter()
            .rposition(|c| c.is_whitespace())
            .filter(|&pos| pos > 0)
            .unwrap_or(size);
        let piece: String = rest[..cut].iter().collect();
        let piece = piece.trim().to_string();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        rest = rest[cut..]
            .iter()
            .copied()
            .skip_while(|c| c.is_whitespace())
            .collect();
    }

    let tail: String = rest.into_iter().collect();
    let tail = tail.trim().to_string();
    if !tail.is_empty() {
        pieces.push(tail);
    }
    pieces
}

/// Truncates to at most `max_chars` characters on a char boundary
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_pos, _)) => s[..byte_pos].trim_end().to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRS: &str = "User can login and upload files. Admin can manage users and generate reports.";

    #[test]
    fn test_segments_split_on_sentences() {
        let segs = segments(SRS);
        assert_eq!(
            segs,
            vec![
                "User can login and upload files.",
                "Admin can manage users and generate reports."
            ]
        );
    }

    #[test]
    fn test_segments_drop_numbering_and_bullets() {
        let text = "1.\n2. The system shall store data.\n- Users may reset passwords\n*\n42\nOK.\n3) Reports are exported nightly";
        let segs = segments(text);
        assert_eq!(
            segs,
            vec![
                "The system shall store data.",
                "Users may reset passwords",
                "Reports are exported nightly"
            ]
        );
    }

    #[test]
    fn test_decimal_points_do_not_split() {
        let segs = segments("Support API v2.1 for clients.");
        assert_eq!(segs, vec!["Support API v2.1 for clients."]);
    }

    #[test]
    fn test_chunk_respects_bound_and_is_deterministic() {
        let text = format!("{}\n", SRS).repeat(20);
        let a = chunk(&text, 200);
        let b = chunk(&text, 200);
        assert_eq!(a, b);
        assert!(a.len() > 1);
        for (i, c) in a.iter().enumerate() {
            assert_eq!(c.index, i);
            assert!(c.text.chars().count() <= 200);
        }
    }

    #[test]
    fn test_long_sentence_is_split_at_whitespace() {
        let text = "word ".repeat(100);
        let chunks = chunk(&text, 32);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 32);
            assert!(!c.text.starts_with(' '));
            assert!(!c.text.ends_with(' '));
        }
    }

    #[test]
    fn test_unbroken_text_is_hard_cut() {
        let text = "x".repeat(50);
        let chunks = chunk(&text, 20);
        let lens: Vec<usize> = chunks.iter().map(|c| c.text.len()).collect();
        assert_eq!(lens, vec![20, 20, 10]);
    }

    #[test]
    fn test_empty_and_zero_size_are_total() {
        assert!(chunk("", 200).is_empty());
        assert!(chunk("   \n\n 1. \n", 200).is_empty());
        let chunks = chunk("Admin manages users.", 0);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 1));
    }

    #[test]
    fn test_truncate_chars_is_utf8_safe() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 120), "short");
    }
}
