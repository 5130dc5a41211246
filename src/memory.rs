//! Memory contract for the playback reader
//!
//! The reader fetches fixed-width words from a byte-addressable memory
//! region. Reads past the end of the backing store return zero bytes: the
//! reader legitimately runs one word ahead of the decoder and keeps
//! fetching until the end marker has propagated, so the contract must
//! tolerate overshoot the way an open bus does.

use crate::{EngineError, Result};

/// Word-granular read access to the playback buffer.
pub trait MemoryBus {
    /// Bytes per bus word.
    fn word_size(&self) -> usize;

    /// Read word `index` into `dest` (`dest.len() == word_size()`).
    ///
    /// Bytes beyond the end of the backing store read as zero.
    fn read_word(&self, index: u64, dest: &mut [u8]);
}

/// Byte-buffer backed [`MemoryBus`] used by tests and demos.
#[derive(Debug)]
pub struct BufferMemory {
    bytes: Vec<u8>,
    word_size: usize,
}

impl BufferMemory {
    pub fn new(bytes: Vec<u8>, word_size: usize) -> Result<Self> {
        if word_size == 0 {
            return Err(EngineError::ZeroWordSize);
        }
        Ok(Self { bytes, word_size })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl MemoryBus for BufferMemory {
    fn word_size(&self) -> usize {
        self.word_size
    }

    fn read_word(&self, index: u64, dest: &mut [u8]) {
        debug_assert_eq!(dest.len(), self.word_size);

        let start = (index as usize).saturating_mul(self.word_size);
        if start >= self.bytes.len() {
            dest.fill(0);
            return;
        }

        let available = (self.bytes.len() - start).min(dest.len());
        dest[..available].copy_from_slice(&self.bytes[start..start + available]);
        dest[available..].fill(0);
    }
}
