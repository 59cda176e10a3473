//! Text chunker.
//!
//! Splits text into an ordered batch of bounded-size units without ever
//! cutting through a boundary-delimited segment:
//! - `Boundary::Sentence`: `.`, `!` or `?` followed by spaces or tabs
//! - `Boundary::Word`: any whitespace
//!
//! Segments are packed greedily, joined by a single space. A segment that is
//! longer than the limit on its own becomes an oversized unit rather than
//! being truncated.

use crate::error::{PlainvoiceError, Result};
use crate::pipeline::unit::OrderedBatch;
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    // SAFETY: hardcoded pattern, always valid
    Regex::new(r"[.!?][ \t]+").expect("hardcoded sentence boundary pattern")
});

/// Where the chunker is allowed to cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// After sentence-ending punctuation followed by horizontal whitespace.
    Sentence,
    /// Between whitespace-delimited words.
    Word,
}

/// Splits text into units of at most `max_unit_size` characters.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    boundary: Boundary,
    max_unit_size: usize,
}

impl Chunker {
    /// Creates a chunker.
    ///
    /// # Errors
    /// Returns `ConfigInvalidValue` when `max_unit_size` is zero.
    pub fn new(boundary: Boundary, max_unit_size: usize) -> Result<Self> {
        if max_unit_size == 0 {
            return Err(PlainvoiceError::invalid_value(
                "max_unit_size",
                "must be greater than zero",
            ));
        }
        Ok(Self {
            boundary,
            max_unit_size,
        })
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    pub fn max_unit_size(&self) -> usize {
        self.max_unit_size
    }

    /// Splits `text` into an ordered batch. Empty or blank input yields an
    /// empty batch.
    pub fn split(&self, text: &str) -> OrderedBatch {
        let units = match self.boundary {
            Boundary::Sentence => pack(sentences(text), self.max_unit_size),
            Boundary::Word => pack(text.split_whitespace(), self.max_unit_size),
        };
        OrderedBatch::from_payloads(units)
    }
}

/// Splits text after sentence-ending punctuation, dropping the separator.
fn sentences(text: &str) -> impl Iterator<Item = &str> {
    let mut start = 0;
    let mut matches = SENTENCE_END.find_iter(text);
    std::iter::from_fn(move || {
        if start > text.len() {
            return None;
        }
        match matches.next() {
            Some(m) => {
                // Keep the punctuation mark, drop the whitespace after it.
                let segment = &text[start..m.start() + 1];
                start = m.end();
                Some(segment)
            }
            None => {
                let segment = &text[start..];
                start = text.len() + 1;
                Some(segment)
            }
        }
    })
}

/// Greedily packs segments into units.
///
/// A segment joins the current unit while
/// `current + segment + 1 (separator) <= max`; otherwise the current unit is
/// closed and the segment starts the next one.
fn pack<'a>(segments: impl Iterator<Item = &'a str>, max_unit_size: usize) -> Vec<String> {
    let mut units = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for segment in segments {
        if segment.trim().is_empty() {
            continue;
        }
        let segment_len = segment.chars().count();

        if current_len + segment_len + 1 <= max_unit_size {
            current.push_str(segment);
            current.push(' ');
            current_len += segment_len + 1;
        } else {
            flush(&mut units, &current);
            current.clear();
            current.push_str(segment);
            current.push(' ');
            current_len = segment_len + 1;
        }
    }
    flush(&mut units, &current);

    units
}

fn flush(units: &mut Vec<String>, current: &str) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        units.push(trimmed.to_string());
    }
}
