//! Record decoder
//!
//! Interprets slicer windows as records and drives the variable-stride
//! contract: after the downstream stage accepts a record, the slicer is
//! advanced by exactly `record.length` bytes, never a fixed stride.
//!
//! A zero length byte is the end-of-stream marker; it is never forwarded
//! as a record. The staged shutdown (end marker → flush → one synthesized
//! end-of-packet transfer) exists because the downstream stages are
//! one-record-deep pipelines that must be told explicitly that the stream
//! legitimately ended, as opposed to having no data yet.

use crate::engine::offset::TimeOffset;
use crate::engine::slicer::RawSlicer;
use crate::record::{Record, Transfer};
use crate::Result;
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecoderState {
    /// Normal decode: emit records, advance the slicer by their length.
    Flowing,
    /// End marker seen; hold until a flush is requested.
    EndMarkerFound,
    /// Flush forwarded to the slicer; waiting for flush-done.
    WaitFlush,
    /// Emit one end-of-packet transfer so downstream can drain.
    SendEop,
}

#[derive(Debug)]
pub struct RecordDecoder {
    state: DecoderState,
    flush_requested: bool,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Flowing,
            flush_requested: false,
        }
    }

    /// Request the staged shutdown. Honored from the flowing state as
    /// well, so cancelling mid-stream cannot strand the pipeline waiting
    /// for an end marker that never comes.
    pub fn request_flush(&mut self) {
        self.flush_requested = true;
    }

    /// Whether the decoder is holding at the end-of-stream marker.
    pub fn end_marker_found(&self) -> bool {
        self.state == DecoderState::EndMarkerFound
    }

    /// Advance the decoder one step against its slicer and downstream
    /// stage.
    pub fn step(&mut self, slicer: &mut RawSlicer, downstream: &mut TimeOffset) -> Result<()> {
        match self.state {
            DecoderState::Flowing => {
                if self.flush_requested {
                    self.flush_requested = false;
                    slicer.flush();
                    self.state = DecoderState::WaitFlush;
                    return Ok(());
                }

                let Some(window) = slicer.window() else {
                    return Ok(());
                };
                if window[0] == 0 {
                    debug!("end marker found");
                    self.state = DecoderState::EndMarkerFound;
                    return Ok(());
                }

                let record = Record::decode(window)?;
                if !downstream.can_accept() {
                    // hold the window until downstream is ready
                    return Ok(());
                }

                let stride = record.length as usize;
                trace!(%record, stride, "record decoded");
                downstream.accept(Transfer::Record(record));
                slicer.consume(stride);
            }
            DecoderState::EndMarkerFound => {
                if self.flush_requested {
                    self.flush_requested = false;
                    slicer.flush();
                    self.state = DecoderState::WaitFlush;
                }
            }
            DecoderState::WaitFlush => {
                if slicer.flush_done() {
                    self.state = DecoderState::SendEop;
                }
            }
            DecoderState::SendEop => {
                if downstream.can_accept() {
                    downstream.accept(Transfer::End);
                    self.state = DecoderState::Flowing;
                    debug!("end-of-packet sent downstream");
                }
            }
        }
        Ok(())
    }
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new()
    }
}
