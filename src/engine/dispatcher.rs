//! Command dispatcher / arbiter client
//!
//! Issues each record as a timed write on the shared command bus, samples
//! the 5-bit status result and latches faults. A latched fault is sticky:
//! its flag stays set until the caller clears it, and while any fault is
//! latched all incoming records are discarded without being issued. The
//! pipeline keeps draining instead of stalling — a mistimed command
//! cannot be fixed retroactively, so reporting and moving on beats
//! head-of-line blocking.
//!
//! Faults are never retried and never raised as errors through the
//! pipeline; they are status the operator reads and acknowledges.

use crate::bus::{CommandBus, FaultKind, WriteCommand};
use crate::record::{Record, Transfer};
use tracing::{debug, trace, warn};

/// Context captured at the moment a fault is detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaultContext {
    pub channel: u32,
    pub timestamp: u64,
    pub address: u16,
}

/// Sticky per-kind fault flags plus one shared context record.
///
/// First occurrence wins: the context belongs to the first fault latched
/// since the latch was last clean, and later faults of any kind cannot
/// overwrite it until the flags are cleared.
#[derive(Debug, Default)]
struct FaultLatch {
    flags: [bool; 4],
    context: Option<FaultContext>,
}

impl FaultLatch {
    fn any(&self) -> bool {
        self.flags.iter().any(|&f| f)
    }

    fn is_latched(&self, kind: FaultKind) -> bool {
        self.flags[kind.index()]
    }

    fn latch(&mut self, kind: FaultKind, context: FaultContext) {
        if !self.any() {
            self.context = Some(context);
        }
        self.flags[kind.index()] = true;
    }

    fn clear(&mut self, kind: FaultKind) {
        self.flags[kind.index()] = false;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DispatchState {
    /// Waiting for a record; discarding while faults are latched.
    Idle,
    /// Issue the timed write for the held record.
    Write,
    /// Sample the bus status for the write in flight.
    CheckState,
    /// Latch fault context, issue the per-kind reset, discard the record.
    FaultReset(FaultKind),
}

/// One-command-deep bus client between the time offset stage and the bus.
#[derive(Debug)]
pub struct Dispatcher {
    state: DispatchState,
    held: Option<Record>,
    faults: FaultLatch,
    bus_request: bool,
    request_applied: Option<bool>,
    granted: bool,
    end_consumed: bool,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            state: DispatchState::Idle,
            held: None,
            faults: FaultLatch::default(),
            bus_request: false,
            request_applied: None,
            granted: false,
            end_consumed: false,
        }
    }

    /// Whether a transfer can be accepted this step.
    pub fn can_accept(&self) -> bool {
        self.state == DispatchState::Idle && self.held.is_none()
    }

    /// Accept one transfer from upstream.
    ///
    /// End-of-packet transfers are consumed silently; records are held for
    /// dispatch, or discarded immediately while any fault is latched.
    pub fn accept(&mut self, transfer: Transfer) {
        debug_assert!(self.can_accept());

        match transfer {
            Transfer::End => {
                trace!("end-of-packet transfer consumed");
                self.end_consumed = true;
            }
            Transfer::Record(record) => {
                if self.faults.any() {
                    debug!(channel = record.channel, "record discarded, faults pending");
                } else {
                    self.held = Some(record);
                }
            }
        }
    }

    /// Advance the dispatch state machine one step against the bus.
    pub fn step(&mut self, bus: &mut dyn CommandBus) {
        if self.request_applied != Some(self.bus_request) {
            bus.set_request(self.bus_request);
            self.request_applied = Some(self.bus_request);
        }
        self.granted = bus.granted();

        match self.state {
            DispatchState::Idle => {
                if self.held.is_some() {
                    self.state = DispatchState::Write;
                }
            }
            DispatchState::Write => {
                let Some(record) = &self.held else {
                    self.state = DispatchState::Idle;
                    return;
                };
                trace!(%record, "issuing timed write");
                bus.write(WriteCommand {
                    channel: record.channel,
                    timestamp: record.timestamp,
                    address: record.address,
                    data: record.data.clone(),
                });
                self.state = DispatchState::CheckState;
            }
            DispatchState::CheckState => {
                let status = bus.status();
                if let Some(kind) = status.highest_fault() {
                    self.state = DispatchState::FaultReset(kind);
                } else if !status.wait() {
                    self.held = None;
                    self.state = DispatchState::Idle;
                }
                // wait bit set: hold here and sample again next step
            }
            DispatchState::FaultReset(kind) => {
                if let Some(record) = self.held.take() {
                    warn!(
                        fault = %kind,
                        channel = record.channel,
                        timestamp = record.timestamp,
                        address = record.address,
                        "fault latched, record discarded"
                    );
                    self.faults.latch(
                        kind,
                        FaultContext {
                            channel: record.channel,
                            timestamp: record.timestamp,
                            address: record.address,
                        },
                    );
                }
                bus.reset_fault(kind);
                self.state = DispatchState::Idle;
            }
        }
    }

    /// Whether a command is outstanding or being retired.
    pub fn busy(&self) -> bool {
        self.state != DispatchState::Idle
    }

    /// Assert or release the arbitration request forwarded to the bus.
    pub fn set_bus_request(&mut self, request: bool) {
        self.bus_request = request;
    }

    /// Grant state sampled from the bus on the last step.
    pub fn bus_granted(&self) -> bool {
        self.granted
    }

    /// Whether the given fault kind is currently latched.
    pub fn fault(&self, kind: FaultKind) -> bool {
        self.faults.is_latched(kind)
    }

    /// Whether any fault kind is currently latched.
    pub fn any_fault(&self) -> bool {
        self.faults.any()
    }

    /// Context of the first latched fault. Persists after the flags are
    /// cleared, until the next fault overwrites it.
    pub fn fault_context(&self) -> Option<&FaultContext> {
        self.faults.context.as_ref()
    }

    /// Acknowledge one fault kind, re-enabling capture and dispatch for
    /// that class.
    pub fn clear_fault(&mut self, kind: FaultKind) {
        debug!(fault = %kind, "fault acknowledged");
        self.faults.clear(kind);
    }

    /// True once an end-of-packet transfer has been consumed since the
    /// last call. Read by the controller during shutdown.
    pub(crate) fn take_end_event(&mut self) -> bool {
        std::mem::take(&mut self.end_consumed)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusStatus, CaptureBus};

    fn record(channel: u32, timestamp: u64) -> Record {
        Record::new(channel, timestamp, 0, vec![0xAB]).unwrap()
    }

    fn run_one(dispatcher: &mut Dispatcher, bus: &mut CaptureBus, transfer: Transfer) {
        assert!(dispatcher.can_accept());
        dispatcher.accept(transfer);
        for _ in 0..8 {
            dispatcher.step(bus);
            if !dispatcher.busy() && dispatcher.can_accept() {
                break;
            }
        }
    }

    #[test]
    fn test_clean_write_consumes_record() {
        let mut bus = CaptureBus::new();
        let mut dispatcher = Dispatcher::new();

        run_one(&mut dispatcher, &mut bus, Transfer::Record(record(5, 1000)));

        assert_eq!(bus.writes().len(), 1);
        assert_eq!(bus.writes()[0].channel, 5);
        assert_eq!(bus.writes()[0].timestamp, 1000);
        assert!(!dispatcher.busy());
        assert!(!dispatcher.any_fault());
    }

    #[test]
    fn test_wait_bit_stalls_without_fault() {
        let mut bus = CaptureBus::new();
        bus.push_status(BusStatus(0b00001));
        bus.push_status(BusStatus(0b00001));

        let mut dispatcher = Dispatcher::new();
        dispatcher.accept(Transfer::Record(record(1, 1)));
        dispatcher.step(&mut bus); // Idle -> Write
        dispatcher.step(&mut bus); // write issued
        dispatcher.step(&mut bus); // wait
        dispatcher.step(&mut bus); // wait
        assert!(dispatcher.busy());

        dispatcher.step(&mut bus); // all clear
        assert!(!dispatcher.busy());
        assert!(!dispatcher.any_fault());
        assert_eq!(bus.writes().len(), 1);
    }

    #[test]
    fn test_fault_priority_underflow_over_collision() {
        let mut bus = CaptureBus::new();
        bus.push_status(BusStatus(0b01010)); // underflow + collision

        let mut dispatcher = Dispatcher::new();
        run_one(&mut dispatcher, &mut bus, Transfer::Record(record(9, 500)));

        assert!(dispatcher.fault(FaultKind::Underflow));
        assert!(!dispatcher.fault(FaultKind::Collision));
        assert_eq!(bus.fault_resets(), &[FaultKind::Underflow]);
    }

    #[test]
    fn test_fault_captures_context_and_sticks() {
        let mut bus = CaptureBus::new();
        bus.push_status(BusStatus(0b00100)); // sequence error

        let mut dispatcher = Dispatcher::new();
        run_one(&mut dispatcher, &mut bus, Transfer::Record(record(7, 123)));

        let context = *dispatcher.fault_context().unwrap();
        assert_eq!(context.channel, 7);
        assert_eq!(context.timestamp, 123);

        // 100 further records: all discarded, no writes, context unchanged
        for n in 0..100 {
            run_one(&mut dispatcher, &mut bus, Transfer::Record(record(n, 999)));
        }
        assert_eq!(bus.writes().len(), 1);
        assert_eq!(*dispatcher.fault_context().unwrap(), context);
        assert!(dispatcher.fault(FaultKind::SequenceError));

        // acknowledged: dispatch resumes
        dispatcher.clear_fault(FaultKind::SequenceError);
        run_one(&mut dispatcher, &mut bus, Transfer::Record(record(2, 2000)));
        assert_eq!(bus.writes().len(), 2);
    }

    #[test]
    fn test_end_transfer_discarded_and_reported() {
        let mut bus = CaptureBus::new();
        let mut dispatcher = Dispatcher::new();

        dispatcher.accept(Transfer::End);
        assert!(dispatcher.take_end_event());
        assert!(!dispatcher.take_end_event());
        assert!(bus.writes().is_empty());
        assert!(!dispatcher.busy());
    }

    #[test]
    fn test_arbitration_forwarded() {
        let mut bus = CaptureBus::new();
        let mut dispatcher = Dispatcher::new();

        dispatcher.set_bus_request(true);
        dispatcher.step(&mut bus);
        assert!(dispatcher.bus_granted());

        dispatcher.set_bus_request(false);
        dispatcher.step(&mut bus);
        assert!(!dispatcher.bus_granted());
    }
}
