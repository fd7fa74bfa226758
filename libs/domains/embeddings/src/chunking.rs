//! Recursive character text splitting.
//!
//! Text is split on the coarsest separator it contains. Pieces that still
//! exceed the chunk size are split again on the next separator, and small
//! neighbouring pieces are merged back up to the chunk size with the
//! requested overlap. Lengths are counted in characters.

use std::collections::VecDeque;

use crate::error::{ProviderError, ProviderResult};
use crate::models::Chunking;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits `text` into chunks according to `opts`
pub fn split_text(text: &str, opts: &Chunking) -> ProviderResult<Vec<String>> {
    if opts.size == 0 {
        return Err(ProviderError::Validation(
            "chunk size must be positive".to_string(),
        ));
    }
    if opts.overlap > opts.size {
        return Err(ProviderError::Validation(format!(
            "chunk overlap {} is larger than chunk size {}",
            opts.overlap, opts.size
        )));
    }

    Ok(split_recursive(text, &SEPARATORS, opts))
}

fn split_recursive(text: &str, separators: &[&str], opts: &Chunking) -> Vec<String> {
    let (idx, separator) = separators
        .iter()
        .enumerate()
        .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
        .map(|(idx, sep)| (idx, *sep))
        .unwrap_or((separators.len(), ""));
    let remaining = separators.get(idx + 1..).unwrap_or_default();

    // Kept separators already live inside the pieces.
    let merge_separator = if opts.sep { "" } else { separator };

    let mut chunks = Vec::new();
    let mut small = Vec::new();
    for piece in split_on(text, separator, opts.sep) {
        if char_len(&piece) < opts.size {
            small.push(piece);
            continue;
        }

        if !small.is_empty() {
            chunks.extend(merge(&small, merge_separator, opts));
            small.clear();
        }

        if remaining.is_empty() {
            push_chunk(&mut chunks, piece, opts);
        } else {
            chunks.extend(split_recursive(&piece, remaining, opts));
        }
    }

    if !small.is_empty() {
        chunks.extend(merge(&small, merge_separator, opts));
    }

    chunks
}

/// Splits on `separator`, dropping empty pieces. With `keep` set, each
/// separator stays at the start of the piece that follows it.
fn split_on(text: &str, separator: &str, keep: bool) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    if !keep {
        return text
            .split(separator)
            .filter(|piece| !piece.is_empty())
            .map(String::from)
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(text[start..idx].to_string());
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(text[start..].to_string());
    }
    pieces
}

fn merge(splits: &[String], separator: &str, opts: &Chunking) -> Vec<String> {
    let separator_len = char_len(separator);
    let joiner = |current: &VecDeque<&str>| {
        if current.is_empty() {
            0
        } else {
            separator_len
        }
    };

    let mut chunks = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0;

    for split in splits {
        let len = char_len(split);

        if !current.is_empty() && total + len + joiner(&current) > opts.size {
            push_joined(&mut chunks, &current, separator, opts);

            // Keep at most `overlap` characters as the start of the next chunk.
            while total > opts.overlap
                || (total > 0 && total + len + joiner(&current) > opts.size)
            {
                let Some(first) = current.pop_front() else {
                    break;
                };
                total -= char_len(first) + joiner(&current);
            }
        }

        total += len + joiner(&current);
        current.push_back(split.as_str());
    }

    push_joined(&mut chunks, &current, separator, opts);
    chunks
}

fn push_joined(
    chunks: &mut Vec<String>,
    current: &VecDeque<&str>,
    separator: &str,
    opts: &Chunking,
) {
    let joined = current.iter().copied().collect::<Vec<_>>().join(separator);
    push_chunk(chunks, joined, opts);
}

fn push_chunk(chunks: &mut Vec<String>, chunk: String, opts: &Chunking) {
    let chunk = if opts.trim {
        chunk.trim().to_string()
    } else {
        chunk
    };
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn opts(size: usize, overlap: usize) -> Chunking {
        Chunking {
            size,
            overlap,
            trim: true,
            sep: false,
        }
    }

    #[test]
    fn test_merges_words_up_to_size() {
        let chunks = split_text("aaaa bbbb cccc", &opts(9, 0)).unwrap();
        assert_eq!(chunks, vec!["aaaa bbbb", "cccc"]);
    }

    #[test]
    fn test_overlap_repeats_trailing_words() {
        let chunks = split_text("aaaa bbbb cccc", &opts(9, 4)).unwrap();
        assert_eq!(chunks, vec!["aaaa bbbb", "bbbb cccc"]);
    }

    #[test]
    fn test_paragraphs_split_first() {
        let chunks = split_text("one\n\ntwo", &opts(5, 0)).unwrap();
        assert_eq!(chunks, vec!["one", "two"]);
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let chunks = split_text("abcdefghij", &opts(4, 0)).unwrap();
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_kept_separator_leads_next_chunk() {
        let keep = Chunking {
            size: 5,
            overlap: 0,
            trim: false,
            sep: true,
        };
        let chunks = split_text("aaaa bbbb", &keep).unwrap();
        assert_eq!(chunks, vec!["aaaa", " bbbb"]);

        let trimmed = Chunking { trim: true, ..keep };
        let chunks = split_text("aaaa bbbb", &trimmed).unwrap();
        assert_eq!(chunks, vec!["aaaa", "bbbb"]);
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = split_text("  hello world  ", &opts(100, 10)).unwrap();
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn test_invalid_options() {
        let err = split_text("text", &opts(0, 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        let err = split_text("text", &opts(4, 5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
}
