//! Recursive-boundary text chunker with exact overlap.
//!
//! Splits extracted document text into [`Chunk`]s of at most `chunk_size`
//! characters (Unicode scalar values, not bytes). Consecutive chunks share
//! exactly `overlap` characters: the tail of chunk *i* is the head of chunk
//! *i + 1*.
//!
//! Cut points prefer natural boundaries, in priority order:
//!
//! | Priority | Boundary |
//! |----------|----------|
//! | 1 | paragraph break (`\n\n`) |
//! | 2 | line break (`\n`) |
//! | 3 | sentence end (`. `, `! `, `? `) |
//! | 4 | any whitespace |
//! | 5 | hard cut at `chunk_size` |
//!
//! Within a window `[start, start + chunk_size]` the cut goes right after
//! the *last* boundary of the highest priority that lies strictly beyond
//! `start + overlap`, which guarantees progress. Chunks are never trimmed;
//! trimming would break the overlap.

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::models::Chunk;

const PARAGRAPH: &[&str] = &["\n\n"];
const LINE: &[&str] = &["\n"];
const SENTENCE: &[&str] = &[". ", "! ", "? "];

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkParams {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("chunk_size must be > 0");
        }
        if overlap >= chunk_size {
            anyhow::bail!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

/// Split `text` into overlapping chunks. Empty text yields no chunks.
///
/// Deterministic: the same text and parameters always produce the same
/// chunks, hashes included.
pub fn chunk_text(document: &str, text: &str, params: &ChunkParams) -> Vec<Chunk> {
    // bounds[i] is the byte offset of char i; bounds[n] == text.len().
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < n {
        if n - start <= params.chunk_size {
            chunks.push(make_chunk(document, chunks.len(), start, &text[bounds[start]..]));
            break;
        }

        let limit = start + params.chunk_size;
        let cut = find_cut(text, &bounds, start, start + params.overlap, limit).unwrap_or(limit);
        chunks.push(make_chunk(
            document,
            chunks.len(),
            start,
            &text[bounds[start]..bounds[cut]],
        ));
        start = cut - params.overlap;
    }

    chunks
}

/// Char index right after the best boundary with `floor < cut <= limit`.
fn find_cut(text: &str, bounds: &[usize], start: usize, floor: usize, limit: usize) -> Option<usize> {
    let base = bounds[start];
    let window = &text[base..bounds[limit]];

    let to_char = |byte_end: usize| -> usize {
        // Every boundary pattern ends on a char boundary.
        bounds.partition_point(|&b| b < base + byte_end)
    };
    let accept = |cut: usize| cut > floor && cut <= limit;

    for group in [PARAGRAPH, LINE, SENTENCE] {
        let best = group
            .iter()
            .filter_map(|pat| {
                window
                    .rmatch_indices(pat)
                    .next()
                    .map(|(i, m)| to_char(i + m.len()))
            })
            .filter(|&cut| accept(cut))
            .max();
        if best.is_some() {
            return best;
        }
    }

    window
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| to_char(i + c.len_utf8()))
        .filter(|&cut| accept(cut))
}

fn make_chunk(document: &str, index: usize, char_offset: usize, text: &str) -> Chunk {
    Chunk {
        document: document.to_string(),
        chunk_index: index,
        char_offset,
        text: text.to_string(),
        hash: hash_text(text),
    }
}

/// Hex SHA-256 of a chunk's text.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(size: usize, overlap: usize) -> ChunkParams {
        ChunkParams::new(size, overlap).unwrap()
    }

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    fn assert_overlap(chunks: &[Chunk], overlap: usize) {
        for pair in chunks.windows(2) {
            let tail: String = {
                let chars: Vec<char> = pair[0].text.chars().collect();
                chars[chars.len() - overlap..].iter().collect()
            };
            let head: String = pair[1].text.chars().take(overlap).collect();
            assert_eq!(tail, head, "overlap mismatch between chunks {} and {}", pair[0].chunk_index, pair[1].chunk_index);
        }
    }

    fn sample_text() -> String {
        let mut text = String::new();
        for p in 0..12 {
            for s in 0..6 {
                text.push_str(&format!(
                    "Paragraph {} sentence {} talks about retrieval and embeddings. ",
                    p, s
                ));
            }
            text.push_str("\n\n");
        }
        text
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("doc1", "", &params(100, 10)).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", &params(100, 10));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].char_offset, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_chunk_length_and_overlap_hold() {
        let text = sample_text();
        for (size, overlap) in [(1000, 200), (300, 50), (120, 0), (80, 79), (64, 16)] {
            let chunks = chunk_text("doc1", &text, &params(size, overlap));
            assert!(chunks.len() > 1, "size {} should split", size);
            for (i, c) in chunks.iter().enumerate() {
                assert_eq!(c.chunk_index, i);
                assert!(char_len(&c.text) <= size, "chunk {} too long", i);
            }
            assert_overlap(&chunks, overlap);
        }
    }

    #[test]
    fn test_chunks_cover_text() {
        let text = sample_text();
        let p = params(250, 40);
        let chunks = chunk_text("doc1", &text, &p);
        let mut rebuilt: String = chunks[0].text.clone();
        for c in &chunks[1..] {
            rebuilt.extend(c.text.chars().skip(p.overlap()));
        }
        assert_eq!(rebuilt, text);
        let all: Vec<char> = text.chars().collect();
        for c in &chunks {
            let expected: String = all[c.char_offset..c.char_offset + char_len(&c.text)]
                .iter()
                .collect();
            assert_eq!(expected, c.text);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = format!("{}\n\n{}", "a".repeat(40), "b ".repeat(40));
        let chunks = chunk_text("doc1", &text, &params(60, 5));
        assert!(chunks[0].text.ends_with("\n\n"), "got {:?}", chunks[0].text);
    }

    #[test]
    fn test_prefers_sentence_over_whitespace() {
        let text = "One short sentence. Another sentence follows here and goes on for a while";
        let chunks = chunk_text("doc1", text, &params(40, 0));
        assert_eq!(chunks[0].text, "One short sentence. ");
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let text = "x".repeat(250);
        let chunks = chunk_text("doc1", &text, &params(100, 20));
        assert_eq!(char_len(&chunks[0].text), 100);
        assert_eq!(chunks[1].char_offset, 80);
        assert_overlap(&chunks, 20);
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let text = "héllo wörld ünïcode ".repeat(30);
        let chunks = chunk_text("doc1", &text, &params(50, 10));
        for c in &chunks {
            assert!(char_len(&c.text) <= 50);
        }
        assert_overlap(&chunks, 10);
    }

    #[test]
    fn test_deterministic() {
        let text = sample_text();
        let c1 = chunk_text("doc1", &text, &params(200, 30));
        let c2 = chunk_text("doc1", &text, &params(200, 30));
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(ChunkParams::new(0, 0).is_err());
        assert!(ChunkParams::new(10, 10).is_err());
        assert!(ChunkParams::new(10, 9).is_ok());
    }
}
