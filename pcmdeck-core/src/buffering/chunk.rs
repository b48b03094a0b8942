//! One half of the double buffer.

/// A fixed-capacity byte buffer plus its fill/consume cursors.
///
/// Allocated once when the synchronizer is built and mutated in place for
/// the lifetime of playback. The backing storage is never reallocated.
#[derive(Debug)]
pub struct AudioChunk {
    data: Box<[u8]>,
    /// Bytes actually filled by the producer.
    size: usize,
    /// Bytes already consumed by the drain side.
    pos: usize,
}

impl AudioChunk {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            size: 0,
            pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes still waiting to be drained.
    pub fn remaining(&self) -> usize {
        self.size - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.size
    }

    /// Overwrite the chunk with `src`, truncated to capacity.
    ///
    /// Resets `pos` to 0 and returns the number of bytes stored.
    pub fn fill(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.data.len());
        self.data[..n].copy_from_slice(&src[..n]);
        self.size = n;
        self.pos = 0;
        n
    }

    /// The next `len` unconsumed bytes (fewer if the chunk has less left).
    pub fn pending(&self, len: usize) -> &[u8] {
        let end = self.pos + len.min(self.remaining());
        &self.data[self.pos..end]
    }

    /// Mark `n` bytes as consumed. Never moves `pos` past `size`.
    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.size);
    }
}
