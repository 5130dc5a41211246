//! Top-level playback engine
//!
//! Owns the five pipeline stages and sequences arm → stream → end-marker →
//! flush → drain → idle. The pump in [`Engine::step`] advances each stage
//! at most once and moves items between neighbors only when the
//! downstream side can accept, which is the entire concurrency model:
//! no threads, no callbacks, a stage that cannot advance simply holds its
//! output.
//!
//! Deasserting `enabled` is the only cancellation mechanism and is not
//! immediate: it triggers the drain sequence, so the engine reports idle
//! only once every in-flight byte has either been dispatched or discarded
//! through the flush protocol. The controller observes the disable before
//! the reader can emit its end-of-packet word, which is what makes
//! mid-stream cancellation race-free.

use crate::bus::{CommandBus, FaultKind};
use crate::engine::decoder::RecordDecoder;
use crate::engine::dispatcher::{Dispatcher, FaultContext};
use crate::engine::offset::TimeOffset;
use crate::engine::reader::MemoryReader;
use crate::engine::slicer::RawSlicer;
use crate::memory::MemoryBus;
use crate::record::MAX_RECORD_LEN;
use crate::{EngineError, Result};
use tracing::debug;

/// Supervisory states of the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// Waiting to be armed.
    Idle,
    /// Pipeline streaming normally.
    Flowing,
    /// Draining: waiting for the dispatcher to consume the end-of-packet
    /// transfer.
    WaitEop,
    /// Draining: waiting for the dispatcher to retire its last command.
    WaitDispatch,
}

/// The complete playback pipeline behind a single control surface.
#[derive(Debug)]
pub struct Engine {
    word_size: usize,
    state: EngineState,
    enabled: bool,
    reader: MemoryReader,
    slicer: RawSlicer,
    decoder: RecordDecoder,
    offset: TimeOffset,
    dispatcher: Dispatcher,
}

impl Engine {
    /// Create an engine for a memory bus of `word_size` bytes per word.
    pub fn new(word_size: usize) -> Result<Self> {
        if word_size == 0 {
            return Err(EngineError::ZeroWordSize);
        }
        Ok(Self {
            word_size,
            state: EngineState::Idle,
            enabled: false,
            reader: MemoryReader::new(),
            slicer: RawSlicer::new(word_size, MAX_RECORD_LEN),
            decoder: RecordDecoder::new(),
            offset: TimeOffset::new(),
            dispatcher: Dispatcher::new(),
        })
    }

    /// Advance the whole pipeline by one step.
    pub fn step(&mut self, mem: &dyn MemoryBus, bus: &mut dyn CommandBus) -> Result<()> {
        if mem.word_size() != self.word_size {
            return Err(EngineError::WordSizeMismatch {
                expected: self.word_size,
                actual: mem.word_size(),
            });
        }

        // Supervisory transitions first, so a disable is seen before the
        // reader can emit the end-of-packet word it implies.
        match self.state {
            EngineState::Idle => {
                if self.enabled {
                    debug!("engine armed");
                    self.state = EngineState::Flowing;
                }
            }
            EngineState::Flowing => {
                if self.enabled && self.decoder.end_marker_found() {
                    // Auto-disarm on normal completion; the caller sees
                    // enabled drop and may rearm once idle.
                    debug!("end of stream, disarming");
                    self.enabled = false;
                }
                if !self.enabled {
                    self.decoder.request_flush();
                    self.state = EngineState::WaitEop;
                    debug!("draining");
                }
            }
            EngineState::WaitEop | EngineState::WaitDispatch => {}
        }

        // Pump the stages, downstream to upstream.
        self.dispatcher.step(bus);
        if self.dispatcher.can_accept() {
            if let Some(transfer) = self.offset.take() {
                self.dispatcher.accept(transfer);
            }
        }
        self.decoder.step(&mut self.slicer, &mut self.offset)?;

        // The reader ignores a re-enable while the drain is in progress.
        let reader_enabled = self.enabled && matches!(self.state, EngineState::Flowing);
        if self.slicer.can_accept() {
            if let Some(word) = self.reader.fetch(mem, reader_enabled) {
                self.slicer.push(word);
            }
        }

        // Drain milestones.
        match self.state {
            EngineState::WaitEop => {
                if self.dispatcher.take_end_event() {
                    self.state = EngineState::WaitDispatch;
                }
            }
            EngineState::WaitDispatch => {
                if !self.dispatcher.busy() {
                    debug!("engine idle");
                    self.state = EngineState::Idle;
                }
            }
            EngineState::Idle | EngineState::Flowing => {}
        }

        Ok(())
    }

    /// Step until the engine reaches idle, or fail after `max_steps`.
    pub fn run(
        &mut self,
        mem: &dyn MemoryBus,
        bus: &mut dyn CommandBus,
        max_steps: usize,
    ) -> Result<usize> {
        for step in 1..=max_steps {
            self.step(mem, bus)?;
            if self.state == EngineState::Idle && !self.enabled {
                return Ok(step);
            }
        }
        Err(EngineError::StepBudget(max_steps))
    }

    /// Arm or cancel playback. Cancellation drains before going idle.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the engine or an outstanding bus command is still active.
    pub fn busy(&self) -> bool {
        self.state != EngineState::Idle || self.dispatcher.busy()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Byte address playback starts from; effective on the next arm.
    pub fn set_base_address(&mut self, address: u64) {
        self.reader.set_base_address(address);
    }

    pub fn base_address(&self) -> u64 {
        self.reader.base_address()
    }

    /// Signed offset added to every record timestamp.
    pub fn set_time_offset(&mut self, offset: i64) {
        self.offset.set_offset(offset);
    }

    pub fn time_offset(&self) -> i64 {
        self.offset.offset()
    }

    /// Assert or release the bus arbitration request.
    pub fn set_bus_request(&mut self, request: bool) {
        self.dispatcher.set_bus_request(request);
    }

    /// Grant state sampled from the bus on the last step.
    pub fn bus_granted(&self) -> bool {
        self.dispatcher.bus_granted()
    }

    /// Whether the given fault kind is latched.
    pub fn fault(&self, kind: FaultKind) -> bool {
        self.dispatcher.fault(kind)
    }

    /// Whether any fault kind is latched.
    pub fn any_fault(&self) -> bool {
        self.dispatcher.any_fault()
    }

    /// Context captured for the first latched fault.
    pub fn fault_context(&self) -> Option<&FaultContext> {
        self.dispatcher.fault_context()
    }

    /// Acknowledge one fault kind.
    pub fn clear_fault(&mut self, kind: FaultKind) {
        self.dispatcher.clear_fault(kind);
    }
}
