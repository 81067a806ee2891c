/// Text chunk produced by the chunker.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Raw text of the chunk
    pub text: String,
    /// Source label (file path or URL)
    pub source: String,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }
}

/// Simple chunker with word-level overlap.
#[derive(Debug, Clone)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Default for Chunker {
    /// 250-word windows without overlap.
    fn default() -> Self {
        Self::new(250, 0)
    }
}

impl Chunker {
    /// Create a new chunker.
    pub fn new(size: usize, overlap: usize) -> Self {
        Self {
            size: size.max(1),
            overlap: overlap.min(size.saturating_sub(1)),
        }
    }

    /// Split text into overlapping chunks.
    pub fn chunk(&self, text: &str, source: impl Into<String>) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let step = self.size.saturating_sub(self.overlap).max(1);
        let mut chunks = Vec::new();
        let mut idx = 0;
        let source = source.into();

        while idx < words.len() {
            let end = (idx + self.size).min(words.len());
            let chunk_text = words[idx..end].join(" ");
            chunks.push(Chunk::new(chunk_text, source.clone()));

            if end == words.len() {
                break;
            }
            idx += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunker_respects_overlap() {
        let chunker = Chunker::new(4, 1);
        let text = "one two three four five six seven";
        let chunks = chunker.chunk(text, "test");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "one two three four");
        assert_eq!(chunks[1].text, "four five six seven");
    }

    #[test]
    fn chunker_whitespace_only_returns_empty() {
        let chunker = Chunker::new(4, 1);
        assert!(chunker.chunk("   \t\n  ", "test").is_empty());
    }

    #[test]
    fn chunker_single_word() {
        let chunks = Chunker::new(4, 1).chunk("hello", "test");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], Chunk::new("hello", "test"));
    }

    #[test]
    fn chunker_clamps_overlap_to_make_progress() {
        let chunker = Chunker::new(2, 5);
        let chunks = chunker.chunk("a b c d", "src");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].text, "c d");
    }

    #[test]
    fn default_chunker_uses_250_word_windows() {
        let text = vec!["w"; 600].join(" ");
        let chunks = Chunker::default().chunk(&text, "doc");
        let sizes: Vec<usize> = chunks.iter().map(|c| c.text.split_whitespace().count()).collect();
        assert_eq!(sizes, vec![250, 250, 100]);
        assert!(chunks.iter().all(|c| c.source == "doc"));
    }
}
