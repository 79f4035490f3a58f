//! Boundary-aware text chunking for embedding and retrieval.
//!
//! Chunks are computed against whitespace-normalized text, not the original
//! layout: every whitespace run collapses to a single space before any window
//! is taken, so boundary positions are stable across re-ingestion.

/// A contiguous segment of normalized document text, order-indexed within its
/// parent document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Restartable chunking iterator. Two iterators built from the same input
/// yield identical sequences; there is no hidden state beyond the cursor.
pub struct Chunker {
    chars: Vec<char>,
    chunk_size: usize,
    overlap: usize,
    start: usize,
    index: usize,
}

impl Chunker {
    pub fn new(text: &str, chunk_size: usize, overlap: usize) -> Self {
        debug_assert!(
            overlap < chunk_size,
            "overlap must be smaller than chunk_size"
        );
        let normalized = normalize_whitespace(text);
        Chunker {
            chars: normalized.chars().collect(),
            chunk_size,
            overlap,
            start: 0,
            index: 0,
        }
    }
}

impl Iterator for Chunker {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let len = self.chars.len();

        loop {
            if self.start >= len {
                return None;
            }

            let mut end = len.min(self.start + self.chunk_size);

            // When the window's right edge falls strictly inside the text,
            // pull it back to the last sentence/word boundary after `start`.
            // A window with no boundary at all is hard-cut at chunk_size.
            if self.start + self.chunk_size < len {
                let window = &self.chars[self.start..end];
                if let Some(offset) = window
                    .iter()
                    .rposition(|c| *c == '.' || *c == '\n' || *c == ' ')
                {
                    if offset > 0 {
                        end = self.start + offset + 1;
                    }
                }
            }

            let text: String = self.chars[self.start..end].iter().collect();

            // Overlap applies only while text remains past this window.
            self.start = if end < len {
                // The boundary pull can shrink a window below the overlap for
                // adversarial whitespace-free runs; force forward progress.
                if end.saturating_sub(self.overlap) > self.start {
                    end - self.overlap
                } else {
                    end
                }
            } else {
                end
            };

            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }

            let chunk = Chunk {
                index: self.index,
                text: trimmed.to_string(),
            };
            self.index += 1;
            return Some(chunk);
        }
    }
}

/// Splits `text` into overlapping, boundary-aware chunks. Empty input (after
/// normalization) yields an empty Vec, not a single empty chunk.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    Chunker::new(text, chunk_size, overlap).collect()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_text("", 1000, 200).is_empty());
        assert!(chunk_text("   \n\t  ", 1000, 200).is_empty());
    }

    #[test]
    fn test_short_input_is_a_single_normalized_chunk() {
        let chunks = chunk_text("hello   world\n\nsecond  line", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "hello world second line");
    }

    #[test]
    fn test_input_exactly_at_chunk_size_stays_whole() {
        let text = "a".repeat(100);
        let chunks = chunk_text(&text, 100, 20);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text.len(), 100);
    }

    #[test]
    fn test_chunks_never_end_mid_word_when_boundaries_exist() {
        let sentence = "The ledger balances at year end. ";
        let text = sentence.repeat(30);
        let chunks = chunk_text(&text, 100, 20);
        let vocabulary = ["The", "ledger", "balances", "at", "year", "end."];

        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            let last_word = chunk
                .text
                .split_whitespace()
                .last()
                .expect("chunks are non-empty");
            assert!(
                vocabulary.contains(&last_word),
                "chunk {} ends mid-word: {last_word:?}",
                chunk.index
            );
        }
    }

    #[test]
    fn test_hard_cut_when_no_boundary_in_window() {
        let text = "x".repeat(2500);
        let chunks = chunk_text(&text, 1000, 200);

        assert_eq!(chunks[0].text.len(), 1000);
        assert_eq!(chunks[1].text.len(), 1000);
        // 2500 chars with start advancing by 800 per window: 0..1000,
        // 800..1800, 1600..2500.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].text.len(), 900);
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let word = "audit ";
        let text = word.repeat(400); // 2400 normalized chars minus trailing trim
        let chunks = chunk_text(&text, 1000, 200);

        assert!(chunks.len() >= 2);
        // The head of each following chunk must re-appear near the tail of
        // the previous one.
        for pair in chunks.windows(2) {
            let head: String = pair[1].text.chars().take(50).collect();
            assert!(
                pair[0].text.contains(head.trim()),
                "expected overlap between chunk {} and {}",
                pair[0].index,
                pair[1].index
            );
        }
    }

    #[test]
    fn test_chunks_tile_the_normalized_source_in_order() {
        // Distinct sentences so each chunk occurs exactly once in the source.
        let text: String = (0..60)
            .map(|i| format!("Clause {i} of the audit manual addresses item {i}. "))
            .collect();
        let normalized = normalize_whitespace(&text);
        let chunks = chunk_text(&text, 500, 100);

        assert!(chunks.len() > 2);
        assert!(normalized.starts_with(&chunks[0].text));
        assert!(normalized.ends_with(&chunks[chunks.len() - 1].text));

        // Each chunk starts inside its predecessor's span (the overlap) and
        // together they cover the source without gaps.
        let mut covered_to = chunks[0].text.len();
        for pair in chunks.windows(2) {
            let next = &pair[1];
            let start = normalized
                .find(&next.text)
                .expect("chunk must appear in the normalized source");
            assert!(start <= covered_to, "gap before chunk {}", next.index);
            assert!(start + next.text.len() > covered_to);
            covered_to = start + next.text.len();
        }
        assert_eq!(covered_to, normalized.len());
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = "Cash flow statements track liquidity. ".repeat(80);
        let first = chunk_text(&text, 300, 60);
        let second = chunk_text(&text, 300, 60);
        assert_eq!(first, second);
    }

    #[test]
    fn test_indexes_are_sequential() {
        let text = "balance sheet ".repeat(300);
        let chunks = chunk_text(&text, 200, 40);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn test_three_page_document_shape() {
        // 26 sentences of exactly 100 characters: 2600 normalized characters
        // whose sentence boundaries land on the window edges. At size 1000 /
        // overlap 200 this must yield exactly three chunks with the second
        // starting 200 characters before the first chunk's end.
        let text: String = (0..26)
            .map(|i| format!("{i:02}{}.", "a".repeat(97)))
            .collect();
        assert_eq!(text.len(), 2600);

        let chunks = chunk_text(&text, 1000, 200);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.text.len() == 1000));
        assert_eq!(&chunks[1].text[..200], &chunks[0].text[800..]);
        assert_eq!(&chunks[2].text[..200], &chunks[1].text[800..]);
    }
}
