//! Command bus contract: arbitration, timed writes and fault status
//!
//! The bus is a shared resource arbitrated through a request/grant pair.
//! A timed write is answered by a 5-bit status sample: bit 0 is a wait
//! condition (not a fault), bits 1..=4 report the four fault kinds. Each
//! fault kind has a dedicated acknowledge/reset command.

use std::collections::VecDeque;
use std::fmt;

/// One timed write command as issued to the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteCommand {
    pub channel: u32,
    pub timestamp: u64,
    pub address: u16,
    pub data: Vec<u8>,
}

/// The four hardware fault conditions, in priority order.
///
/// When a status sample carries several fault bits, only the
/// highest-priority one is acted upon: underflow > sequence error >
/// collision > busy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// The bus could not accept the command before its deadline.
    Underflow,
    /// The command timestamp broke monotonic ordering on its channel.
    SequenceError,
    /// Two commands contended for the same channel at conflicting times.
    Collision,
    /// The channel output stage was not ready for a new command.
    Busy,
}

impl FaultKind {
    /// All kinds, highest priority first.
    pub const ALL: [FaultKind; 4] = [
        FaultKind::Underflow,
        FaultKind::SequenceError,
        FaultKind::Collision,
        FaultKind::Busy,
    ];

    /// Position of this kind's bit in the status word (bit 0 is wait).
    pub fn status_bit(self) -> u8 {
        match self {
            FaultKind::Underflow => 1,
            FaultKind::SequenceError => 2,
            FaultKind::Collision => 3,
            FaultKind::Busy => 4,
        }
    }

    pub(crate) fn index(self) -> usize {
        self.status_bit() as usize - 1
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FaultKind::Underflow => "underflow",
            FaultKind::SequenceError => "sequence error",
            FaultKind::Collision => "collision",
            FaultKind::Busy => "busy",
        };
        write!(f, "{}", name)
    }
}

/// A 5-bit status sample returned after a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BusStatus(pub u8);

impl BusStatus {
    pub const CLEAR: BusStatus = BusStatus(0);

    /// Bit 0: the bus needs more time. Not a fault; the dispatcher keeps
    /// sampling.
    pub fn wait(self) -> bool {
        self.0 & 1 != 0
    }

    /// The fault bits of the sample, wait masked out.
    pub fn fault_bits(self) -> u8 {
        self.0 & 0b1_1110
    }

    /// The highest-priority fault present in this sample, if any.
    pub fn highest_fault(self) -> Option<FaultKind> {
        FaultKind::ALL
            .into_iter()
            .find(|kind| self.0 & (1 << kind.status_bit()) != 0)
    }
}

/// The shared multi-channel command bus driven by the dispatcher.
///
/// Granting is advisory arbitration: the dispatcher reports it to the
/// caller but does not gate writes on it. Downstream hardware is
/// responsible for correctness under contention.
pub trait CommandBus {
    /// Assert or release the arbitration request line.
    fn set_request(&mut self, request: bool);

    /// Whether the arbiter currently grants the bus to this engine.
    fn granted(&self) -> bool;

    /// Issue one timed write command.
    fn write(&mut self, command: WriteCommand);

    /// Sample the status of the write in flight.
    fn status(&mut self) -> BusStatus;

    /// Issue the acknowledge/reset command for one fault kind.
    fn reset_fault(&mut self, kind: FaultKind);
}

/// A scriptable [`CommandBus`] that records everything it is told.
///
/// Writes and fault resets are captured in order; status samples are
/// popped from a scripted queue and default to all-clear when the queue
/// is empty. The arbiter grants whenever a request is asserted.
#[derive(Debug, Default)]
pub struct CaptureBus {
    writes: Vec<WriteCommand>,
    resets: Vec<FaultKind>,
    statuses: VecDeque<BusStatus>,
    request: bool,
}

impl CaptureBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the status sample returned for an upcoming `status()` call.
    pub fn push_status(&mut self, status: BusStatus) {
        self.statuses.push_back(status);
    }

    /// All write commands issued so far, in order.
    pub fn writes(&self) -> &[WriteCommand] {
        &self.writes
    }

    /// All fault reset commands issued so far, in order.
    pub fn fault_resets(&self) -> &[FaultKind] {
        &self.resets
    }
}

impl CommandBus for CaptureBus {
    fn set_request(&mut self, request: bool) {
        self.request = request;
    }

    fn granted(&self) -> bool {
        self.request
    }

    fn write(&mut self, command: WriteCommand) {
        self.writes.push(command);
    }

    fn status(&mut self) -> BusStatus {
        self.statuses.pop_front().unwrap_or(BusStatus::CLEAR)
    }

    fn reset_fault(&mut self, kind: FaultKind) {
        self.resets.push(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_bit_is_not_a_fault() {
        let status = BusStatus(0b00001);
        assert!(status.wait());
        assert_eq!(status.fault_bits(), 0);
        assert_eq!(status.highest_fault(), None);
    }

    #[test]
    fn test_highest_fault_priority() {
        // Underflow (bit 1) and collision (bit 3) set together
        let status = BusStatus(0b01010);
        assert_eq!(status.highest_fault(), Some(FaultKind::Underflow));

        let status = BusStatus(0b11000);
        assert_eq!(status.highest_fault(), Some(FaultKind::Collision));

        let status = BusStatus(0b10000);
        assert_eq!(status.highest_fault(), Some(FaultKind::Busy));
    }

    #[test]
    fn test_capture_bus_scripted_statuses() {
        let mut bus = CaptureBus::new();
        bus.push_status(BusStatus(0b00010));

        assert_eq!(bus.status(), BusStatus(0b00010));
        assert_eq!(bus.status(), BusStatus::CLEAR);
    }

    #[test]
    fn test_capture_bus_grants_on_request() {
        let mut bus = CaptureBus::new();
        assert!(!bus.granted());
        bus.set_request(true);
        assert!(bus.granted());
    }
}
