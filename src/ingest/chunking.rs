//! Overlapping fixed-size chunking of extracted document text.
//!
//! Chunk boundaries come from `semchunk-rs`, which prefers paragraph, line, sentence, and word
//! breaks before cutting inside a word. Size is measured in characters. Pieces are cut to
//! `chunk_size - overlap` so the borrowed tail of the previous piece always fits in front of the
//! next one; only the borrowed tail is ever shortened, never the piece itself.

use semchunk_rs::Chunker;
use std::borrow::Cow;
use std::sync::Arc;

use super::types::{ChunkingError, DocumentChunk, SourceDocument};

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Split every document into chunks, numbering them in one flat sequence.
///
/// Documents are processed in the given order; within a document chunks keep text order.
/// Whitespace-only documents contribute nothing. Chunks never span two documents.
pub fn split_documents(
    documents: &[SourceDocument],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<DocumentChunk>, ChunkingError> {
    let mut chunks = Vec::new();
    for document in documents {
        for text in chunk_text(&document.text, chunk_size, chunk_overlap)? {
            chunks.push(DocumentChunk {
                text,
                source: document.source.clone(),
                page: document.page,
                sequence_index: chunks.len(),
            });
        }
    }
    Ok(chunks)
}

/// Chunk one text into segments of at most `chunk_size` characters.
///
/// `overlap` is clamped to `chunk_size - 1`. Returns an empty vector for blank input.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let overlap = overlap.min(chunk_size - 1);
    let counter = character_counter();
    let pieces = base_pieces(text, chunk_size - overlap, &counter);
    Ok(join_with_overlap(&pieces, chunk_size, overlap, &counter))
}

fn character_counter() -> LengthCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

/// Non-overlapping pieces of `text`, each within `budget` and trimmed of edge whitespace.
fn base_pieces(text: &str, budget: usize, counter: &LengthCounter) -> Vec<String> {
    let measure = counter.clone();
    let chunker = Chunker::new(budget, Box::new(move |segment: &str| measure.as_ref()(segment)));
    chunker
        .chunk(&break_long_words(text, budget))
        .iter()
        .flat_map(|chunk| split_within(chunk, budget, counter))
        .collect()
}

/// Insert a space inside any word longer than `budget` characters.
///
/// semchunk falls back to a byte-indexed character split for separator-free words, which is not
/// safe on multi-byte text; no word reaching it keeps that path unused.
fn break_long_words(text: &str, budget: usize) -> Cow<'_, str> {
    if text
        .split_whitespace()
        .all(|word| word.chars().count() <= budget)
    {
        return Cow::Borrowed(text);
    }

    let mut broken = String::with_capacity(text.len() + text.len() / budget);
    let mut run = 0;
    for ch in text.chars() {
        if ch.is_whitespace() {
            run = 0;
        } else {
            if run == budget {
                broken.push(' ');
                run = 0;
            }
            run += 1;
        }
        broken.push(ch);
    }
    Cow::Owned(broken)
}

/// Cut `chunk` into pieces within `budget`, preferring the last whitespace before the limit.
fn split_within(chunk: &str, budget: usize, counter: &LengthCounter) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = chunk.trim();
    while counter.as_ref()(rest) > budget {
        let limit = longest_prefix_within(rest, budget, counter);
        let cut = rest[..limit]
            .rfind(char::is_whitespace)
            .filter(|&index| index > 0)
            .unwrap_or(limit);
        pieces.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Byte length of the longest prefix within `limit`; always at least one character.
fn longest_prefix_within(text: &str, limit: usize, counter: &LengthCounter) -> usize {
    let mut end = 0;
    for (index, ch) in text.char_indices() {
        let next = index + ch.len_utf8();
        if end > 0 && counter.as_ref()(&text[..next]) > limit {
            break;
        }
        end = next;
    }
    end
}

/// Prefix every piece after the first with the tail of its predecessor.
fn join_with_overlap(
    pieces: &[String],
    chunk_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> Vec<String> {
    let mut chunks = Vec::with_capacity(pieces.len());
    let mut previous: Option<&str> = None;
    for piece in pieces {
        let chunk = match previous {
            Some(prev) if overlap > 0 => {
                with_borrowed_tail(prev, piece, chunk_size, overlap, counter)
            }
            _ => piece.clone(),
        };
        chunks.push(chunk);
        previous = Some(piece);
    }
    chunks
}

fn with_borrowed_tail(
    previous: &str,
    current: &str,
    chunk_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> String {
    // One character of the room goes to the joining space.
    let room = chunk_size.saturating_sub(counter.as_ref()(current)).min(overlap);
    let tail = tail_within(previous, room.saturating_sub(1), counter);
    if tail.is_empty() {
        current.to_string()
    } else {
        format!("{tail} {current}")
    }
}

/// Longest suffix of `text` within `limit`, with leading whitespace removed.
fn tail_within<'a>(text: &'a str, limit: usize, counter: &LengthCounter) -> &'a str {
    let mut start = text.len();
    for (index, _) in text.char_indices().rev() {
        if counter.as_ref()(&text[index..]) > limit {
            break;
        }
        start = index;
    }
    text[start..].trim_start()
}
