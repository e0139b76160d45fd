use crate::error::ChunkingError;

/// One window of a larger text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 0-based position of this window
    pub index: usize,
    /// Number of windows produced for the whole text
    pub total: usize,
    /// First character (inclusive)
    pub start: usize,
    /// Last character (exclusive)
    pub end: usize,
    pub content: String,
}

/// Sliding-window chunker measured in Unicode scalar values
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    size: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if size == 0 {
            return Err(ChunkingError::InvalidChunkSize(
                "chunk size must be greater than 0".to_string(),
            ));
        }
        if overlap >= size {
            return Err(ChunkingError::InvalidChunkSize(format!(
                "overlap ({}) must be less than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Number of windows a text of `len` characters splits into
    pub fn window_count(&self, len: usize) -> usize {
        if len <= self.size {
            return 1;
        }
        let step = self.size - self.overlap;
        (len - self.overlap).div_ceil(step)
    }

    /// Split text into windows; a text no longer than one window yields exactly one chunk
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        // Byte offset of every character boundary, including the end of the text
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = boundaries.len() - 1;

        let step = self.size - self.overlap;
        let mut spans = Vec::with_capacity(self.window_count(len));
        let mut start = 0;

        loop {
            let end = (start + self.size).min(len);
            spans.push((start, end));

            if end >= len {
                break;
            }

            start += step;
        }

        let total = spans.len();
        spans
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| TextChunk {
                index,
                total,
                start,
                end,
                content: text[boundaries[start]..boundaries[end]].to_string(),
            })
            .collect()
    }
}
