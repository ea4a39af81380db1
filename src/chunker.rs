//! Splits response text into bounded-length segments for the local
//! synthesis fallback. Long utterances make espeak-ng unreliable, so text is
//! segmented on sentence boundaries and greedily packed under a length cap.
//!
//! The remote streaming tiers never need this; only the final fallback does.

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum characters per chunk.
pub const MAX_CHUNK_LEN: usize = 200;

/// A sentence is anything up to and including a run of terminal punctuation,
/// or a trailing fragment without one.
static SENTENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?]*[.!?]+|[^.!?]+").expect("sentence regex"));

/// Chunk `text` with the default length cap.
pub fn chunks(text: &str) -> Chunks<'_> {
    Chunks::new(text, MAX_CHUNK_LEN)
}

/// Lazy iterator over chunks of `text`, each at most `max_len` characters.
///
/// Text that already fits under the cap comes back as one chunk, trimmed
/// but otherwise verbatim; packing only rewrites whitespace when the input
/// actually has to be split. Deterministic: iterating the same input twice
/// yields the same sequence. Empty or whitespace-only input yields nothing,
/// which callers treat as "nothing to speak" rather than an error.
pub struct Chunks<'a> {
    /// Set when the trimmed input fits under the cap; yielded as-is.
    whole: Option<String>,
    sentences: regex::Matches<'static, 'a>,
    max_len: usize,
    /// Clause pieces from an oversize sentence, each already under the cap.
    pending: std::collections::VecDeque<String>,
    /// The chunk currently being packed.
    current: String,
    done: bool,
}

impl<'a> Chunks<'a> {
    pub fn new(text: &'a str, max_len: usize) -> Self {
        assert!(max_len > 0, "chunk length cap must be positive");
        let trimmed = text.trim();
        let whole =
            (!trimmed.is_empty() && trimmed.len() <= max_len).then(|| trimmed.to_string());
        Self {
            whole,
            sentences: SENTENCE_RE.find_iter(text),
            max_len,
            pending: std::collections::VecDeque::new(),
            current: String::new(),
            done: false,
        }
    }

    /// Try to pack `piece` into the current chunk. Returns the finished chunk
    /// when the piece does not fit, keeping the piece for the next chunk.
    fn offer(&mut self, piece: String) -> Option<String> {
        if self.current.is_empty() {
            self.current = piece;
            None
        } else if self.current.len() + 1 + piece.len() <= self.max_len {
            self.current.push(' ');
            self.current.push_str(&piece);
            None
        } else {
            Some(std::mem::replace(&mut self.current, piece))
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        if let Some(text) = self.whole.take() {
            self.done = true;
            return Some(text);
        }
        loop {
            if let Some(piece) = self.pending.pop_front() {
                if let Some(chunk) = self.offer(piece) {
                    return Some(chunk);
                }
                continue;
            }

            match self.sentences.next() {
                Some(m) => {
                    let sentence = m.as_str().trim();
                    if sentence.is_empty() {
                        continue;
                    }
                    if sentence.len() <= self.max_len {
                        if let Some(chunk) = self.offer(sentence.to_string()) {
                            return Some(chunk);
                        }
                    } else {
                        self.pending.extend(split_oversize(sentence, self.max_len));
                    }
                }
                None => {
                    self.done = true;
                    if self.current.is_empty() {
                        return None;
                    }
                    return Some(std::mem::take(&mut self.current));
                }
            }
        }
    }
}

/// Break one oversize sentence into pieces no longer than `max_len`:
/// first on comma boundaries, then hard-split for any comma-free clause that
/// still exceeds the cap.
fn split_oversize(sentence: &str, max_len: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    for clause in split_inclusive_on(sentence, ',') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        if clause.len() <= max_len {
            pieces.push(clause.to_string());
        } else {
            pieces.extend(hard_split(clause, max_len));
        }
    }
    pieces
}

/// Split on `sep`, keeping the separator at the end of each piece.
fn split_inclusive_on(text: &str, sep: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        if ch == sep {
            let end = idx + ch.len_utf8();
            pieces.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Last resort: cut at the length boundary, respecting char boundaries.
fn hard_split(clause: &str, max_len: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    for ch in clause.chars() {
        if piece.len() + ch.len_utf8() > max_len {
            pieces.push(std::mem::take(&mut piece));
        }
        piece.push(ch);
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}
