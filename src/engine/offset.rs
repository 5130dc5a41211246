//! Timestamp adjuster
//!
//! A one-slot register stage: every record passing through has the
//! configured signed offset added to its timestamp, with exactly one
//! pump-step of latency and no reordering. The offset compensates static
//! pipeline latency so the issued timestamp matches what the downstream
//! timing mechanism expects. End-of-packet transfers pass through
//! untouched.

use crate::record::Transfer;
use tracing::trace;

#[derive(Debug)]
pub struct TimeOffset {
    offset: i64,
    slot: Option<Transfer>,
}

impl TimeOffset {
    pub fn new() -> Self {
        Self {
            offset: 0,
            slot: None,
        }
    }

    /// Set the signed offset applied to every record timestamp. Takes
    /// effect for the next accepted record.
    pub fn set_offset(&mut self, offset: i64) {
        self.offset = offset;
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Whether the stage can latch a transfer this step.
    pub fn can_accept(&self) -> bool {
        self.slot.is_none()
    }

    /// Latch one transfer, adjusting its timestamp on the way in.
    pub fn accept(&mut self, transfer: Transfer) {
        debug_assert!(self.slot.is_none());

        let adjusted = match transfer {
            Transfer::Record(mut record) => {
                record.timestamp = record.timestamp.wrapping_add_signed(self.offset);
                trace!(timestamp = record.timestamp, "record re-timed");
                Transfer::Record(record)
            }
            Transfer::End => Transfer::End,
        };
        self.slot = Some(adjusted);
    }

    /// Hand the latched transfer downstream, if any.
    pub fn take(&mut self) -> Option<Transfer> {
        self.slot.take()
    }
}

impl Default for TimeOffset {
    fn default() -> Self {
        Self::new()
    }
}
