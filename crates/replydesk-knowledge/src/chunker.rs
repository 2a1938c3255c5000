//! Word-window chunking for document text.

use crate::error::{KnowledgeError, Result};

/// Default chunk length in words.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default number of words shared by consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Splits text into overlapping windows of whitespace-delimited words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl Chunker {
    /// Fails unless `overlap < size`, which keeps the stride at one word or more.
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 || overlap >= size {
            return Err(KnowledgeError::InvalidChunking { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Words the window advances between chunks.
    pub fn stride(&self) -> usize {
        self.size - self.overlap
    }

    /// Chunk `text`. The last chunk may be shorter than `size`; empty input
    /// gives no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        (0..words.len())
            .step_by(self.stride())
            .map(|start| {
                let end = (start + self.size).min(words.len());
                words[start..end].join(" ")
            })
            .collect()
    }
}

/// Convenience wrapper over [`Chunker::new`] + [`Chunker::chunk`].
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(Chunker::new(size, overlap)?.chunk(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_empty_input_has_no_chunks() {
        assert!(Chunker::default().chunk("").is_empty());
        assert!(Chunker::default().chunk("  \n\t ").is_empty());
    }

    #[test]
    fn test_thousand_words_advance_by_stride() {
        let chunks = chunk(&words(1000), 500, 50).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].starts_with("w0 "));
        assert!(chunks[1].starts_with("w450 "));
        assert!(chunks[2].starts_with("w900 "));
        assert_eq!(chunks[0].split_whitespace().count(), 500);
        assert_eq!(chunks[2].split_whitespace().count(), 100);
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = Chunker::default().chunk("Reset  the\nSFTP password");
        assert_eq!(chunks, vec!["Reset the SFTP password".to_string()]);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(matches!(
            Chunker::new(50, 50),
            Err(KnowledgeError::InvalidChunking { size: 50, overlap: 50 })
        ));
        assert!(Chunker::new(10, 20).is_err());
        assert!(Chunker::new(0, 0).is_err());
        assert_eq!(Chunker::new(10, 9).unwrap().stride(), 1);
    }

    proptest! {
        #[test]
        fn prop_unique_spans_reconstruct_words(
            n in 0usize..400,
            size in 1usize..60,
            overlap_seed in 0usize..60,
        ) {
            let overlap = overlap_seed % size;
            let text = words(n);
            let chunks = chunk(&text, size, overlap).unwrap();

            let mut rebuilt: Vec<String> = Vec::new();
            for (i, c) in chunks.iter().enumerate() {
                let skip = if i == 0 { 0 } else { overlap };
                rebuilt.extend(c.split_whitespace().skip(skip).map(str::to_string));
            }
            let original: Vec<String> = text.split_whitespace().map(str::to_string).collect();
            prop_assert_eq!(rebuilt, original);

            for c in &chunks {
                prop_assert!(c.split_whitespace().count() <= size);
            }
        }
    }
}
