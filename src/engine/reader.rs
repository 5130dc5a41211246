//! Memory stream reader
//!
//! Fetches one bus word per call from a [`MemoryBus`], starting at the
//! configured base address on the rising edge of `enabled`. The first
//! fetch after `enabled` goes low is tagged end-of-packet and the reader
//! then idles; that tagged word is what resynchronizes the slicer's flush
//! protocol downstream.
//!
//! Back-pressure is external: the engine only calls [`MemoryReader::fetch`]
//! when the slicer can accept a word, so there is never more than one word
//! in flight.

use crate::memory::MemoryBus;
use tracing::{debug, trace};

/// One raw word as fetched from memory, with its end-of-packet tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemWord {
    pub bytes: Vec<u8>,
    pub end_of_packet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReaderState {
    Idle,
    Running,
}

/// Sequential word fetcher with an internal address cursor.
#[derive(Debug)]
pub struct MemoryReader {
    base_address: u64,
    cursor: u64,
    state: ReaderState,
    prev_enabled: bool,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self {
            base_address: 0,
            cursor: 0,
            state: ReaderState::Idle,
            prev_enabled: false,
        }
    }

    /// Set the byte address playback starts from. Takes effect on the next
    /// rising edge of `enabled`; addresses are aligned down to the bus
    /// word size.
    pub fn set_base_address(&mut self, address: u64) {
        self.base_address = address;
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Fetch the next word, or `None` while idle.
    ///
    /// A rising edge of `enabled` resets the cursor to the base address; a
    /// low `enabled` makes the next fetched word the end-of-packet word.
    pub fn fetch(&mut self, mem: &dyn MemoryBus, enabled: bool) -> Option<MemWord> {
        let rising = enabled && !self.prev_enabled;
        self.prev_enabled = enabled;

        if rising {
            self.cursor = self.base_address / mem.word_size() as u64;
            self.state = ReaderState::Running;
            debug!(base_address = self.base_address, "reader armed");
        }

        match self.state {
            ReaderState::Idle => None,
            ReaderState::Running => {
                let mut bytes = vec![0u8; mem.word_size()];
                mem.read_word(self.cursor, &mut bytes);
                self.cursor += 1;

                let end_of_packet = !enabled;
                if end_of_packet {
                    self.state = ReaderState::Idle;
                    debug!("reader sent end-of-packet word, going idle");
                } else {
                    trace!(cursor = self.cursor, "fetched word");
                }

                Some(MemWord {
                    bytes,
                    end_of_packet,
                })
            }
        }
    }
}

impl Default for MemoryReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::BufferMemory;

    #[test]
    fn test_idle_until_enabled() {
        let memory = BufferMemory::new(vec![1, 2, 3, 4], 2).unwrap();
        let mut reader = MemoryReader::new();

        assert_eq!(reader.fetch(&memory, false), None);
    }

    #[test]
    fn test_sequential_words_from_base_address() {
        let memory = BufferMemory::new(vec![1, 2, 3, 4, 5, 6], 2).unwrap();
        let mut reader = MemoryReader::new();
        reader.set_base_address(2);

        let first = reader.fetch(&memory, true).unwrap();
        let second = reader.fetch(&memory, true).unwrap();

        assert_eq!(first.bytes, vec![3, 4]);
        assert!(!first.end_of_packet);
        assert_eq!(second.bytes, vec![5, 6]);
    }

    #[test]
    fn test_disable_emits_one_tagged_word_then_idles() {
        let memory = BufferMemory::new(vec![1, 2, 3, 4], 2).unwrap();
        let mut reader = MemoryReader::new();

        reader.fetch(&memory, true).unwrap();
        let last = reader.fetch(&memory, false).unwrap();

        assert!(last.end_of_packet);
        assert_eq!(reader.fetch(&memory, false), None);
    }

    #[test]
    fn test_rearm_resets_cursor() {
        let memory = BufferMemory::new(vec![1, 2, 3, 4], 2).unwrap();
        let mut reader = MemoryReader::new();

        reader.fetch(&memory, true).unwrap();
        reader.fetch(&memory, false).unwrap(); // end-of-packet

        let restarted = reader.fetch(&memory, true).unwrap();
        assert_eq!(restarted.bytes, vec![1, 2]);
    }

    #[test]
    fn test_base_address_aligned_down_to_word() {
        let memory = BufferMemory::new(vec![1, 2, 3, 4, 5, 6, 7, 8], 4).unwrap();
        let mut reader = MemoryReader::new();
        reader.set_base_address(5);

        let word = reader.fetch(&memory, true).unwrap();
        assert_eq!(word.bytes, vec![5, 6, 7, 8]);
    }
}
