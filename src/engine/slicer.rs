//! Byte slicer / re-assembler
//!
//! Decouples the incoming bus word width from the logical record width:
//! words of `in_size` bytes accumulate in a byte buffer until a full
//! `out_size` window is available, which the consumer may then advance by
//! any number of bytes — exactly `record.length` bytes per record. The
//! two widths need not divide one another.
//!
//! The flush protocol discards all buffered state and keeps draining
//! incoming words until one tagged end-of-packet arrives, then latches
//! flush-done. This is how the pipeline resynchronizes after the stream
//! ends or is cancelled mid-record.

use crate::engine::reader::MemWord;
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlicerState {
    /// Accepting words until a full output window is buffered.
    Fetch,
    /// Presenting an output window; consumption may be partial.
    Output,
    /// Discarding everything until an end-of-packet word arrives.
    Flush,
}

/// Variable-stride byte re-assembler between the reader and the decoder.
#[derive(Debug)]
pub struct RawSlicer {
    out_size: usize,
    buf: Vec<u8>,
    state: SlicerState,
    flush_done: bool,
}

impl RawSlicer {
    /// `in_size` is the bus word size, `out_size` the window size to
    /// present downstream. Worst-case buffer occupancy is
    /// `out_size - 1 + in_size` bytes.
    pub fn new(in_size: usize, out_size: usize) -> Self {
        Self {
            out_size,
            buf: Vec::with_capacity(out_size - 1 + in_size),
            state: SlicerState::Fetch,
            flush_done: false,
        }
    }

    /// Whether a word can be pushed this step.
    pub fn can_accept(&self) -> bool {
        matches!(self.state, SlicerState::Fetch | SlicerState::Flush)
    }

    /// Push one word from the reader.
    pub fn push(&mut self, word: MemWord) {
        match self.state {
            SlicerState::Fetch => {
                self.buf.extend_from_slice(&word.bytes);
                trace!(level = self.buf.len(), "buffered word");
                if self.buf.len() >= self.out_size {
                    self.state = SlicerState::Output;
                }
            }
            SlicerState::Flush => {
                if word.end_of_packet {
                    self.buf.clear();
                    self.flush_done = true;
                    self.state = SlicerState::Fetch;
                    debug!("flush complete");
                }
            }
            SlicerState::Output => {
                debug_assert!(false, "push while presenting output");
            }
        }
    }

    /// The current output window, if one is being presented.
    pub fn window(&self) -> Option<&[u8]> {
        match self.state {
            SlicerState::Output => Some(&self.buf[..self.out_size]),
            _ => None,
        }
    }

    /// Advance the window by `consumed` bytes. The consumer decides the
    /// stride; once the level drops below a full window the slicer goes
    /// back to fetching.
    pub fn consume(&mut self, consumed: usize) {
        debug_assert_eq!(self.state, SlicerState::Output);
        debug_assert!(consumed <= self.out_size);

        self.buf.drain(..consumed);
        trace!(consumed, level = self.buf.len(), "window advanced");
        if self.buf.len() < self.out_size {
            self.state = SlicerState::Fetch;
        }
    }

    /// Discard all buffered bytes and drain incoming words until one
    /// arrives tagged end-of-packet. Preempts either the fetch or the
    /// output state.
    pub fn flush(&mut self) {
        debug!(discarded = self.buf.len(), "flush requested");
        self.buf.clear();
        self.flush_done = false;
        self.state = SlicerState::Flush;
    }

    /// Whether the last requested flush has completed.
    pub fn flush_done(&self) -> bool {
        self.flush_done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(bytes: &[u8]) -> MemWord {
        MemWord {
            bytes: bytes.to_vec(),
            end_of_packet: false,
        }
    }

    fn eop_word(len: usize) -> MemWord {
        MemWord {
            bytes: vec![0; len],
            end_of_packet: true,
        }
    }

    #[test]
    fn test_no_window_until_full() {
        let mut slicer = RawSlicer::new(2, 5);
        slicer.push(word(&[1, 2]));
        slicer.push(word(&[3, 4]));
        assert_eq!(slicer.window(), None);
        assert!(slicer.can_accept());

        slicer.push(word(&[5, 6]));
        assert_eq!(slicer.window(), Some(&[1, 2, 3, 4, 5][..]));
        assert!(!slicer.can_accept());
    }

    #[test]
    fn test_variable_stride_consumption() {
        let mut slicer = RawSlicer::new(3, 4);
        slicer.push(word(&[1, 2, 3]));
        slicer.push(word(&[4, 5, 6]));

        assert_eq!(slicer.window(), Some(&[1, 2, 3, 4][..]));
        slicer.consume(2);

        // 4 bytes left: still a full window, shifted by two
        assert_eq!(slicer.window(), Some(&[3, 4, 5, 6][..]));
        slicer.consume(3);

        // below threshold: back to fetching
        assert_eq!(slicer.window(), None);
        assert!(slicer.can_accept());
    }

    #[test]
    fn test_flush_discards_until_end_of_packet() {
        let mut slicer = RawSlicer::new(2, 3);
        slicer.push(word(&[1, 2]));

        slicer.flush();
        assert!(!slicer.flush_done());
        assert!(slicer.can_accept());

        slicer.push(word(&[9, 9]));
        assert!(!slicer.flush_done());

        slicer.push(eop_word(2));
        assert!(slicer.flush_done());
        assert_eq!(slicer.window(), None);
    }

    #[test]
    fn test_flush_preempts_output() {
        let mut slicer = RawSlicer::new(3, 3);
        slicer.push(word(&[1, 2, 3]));
        assert!(slicer.window().is_some());

        slicer.flush();
        assert_eq!(slicer.window(), None);

        slicer.push(eop_word(3));
        assert!(slicer.flush_done());

        // refills normally after the flush
        slicer.push(word(&[7, 8, 9]));
        assert_eq!(slicer.window(), Some(&[7, 8, 9][..]));
    }
}
