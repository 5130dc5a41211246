//! Playback engine for pre-recorded, time-stamped instrument command streams
//!
//! This library models the output half of a real-time I/O command pipeline:
//! a byte buffer holding variable-length timed records is streamed out of
//! memory, re-assembled into records, re-timed by a configurable offset and
//! dispatched in order to a shared multi-channel command bus.
//!
//! # Architecture
//!
//! - **MemoryReader**: fetches fixed-width words from a [`MemoryBus`],
//!   starting at a configurable base address
//! - **RawSlicer**: re-assembles bus words into record-sized byte windows
//!   with variable-stride consumption
//! - **RecordDecoder**: turns byte windows into [`Record`]s and detects the
//!   zero-length end-of-stream marker
//! - **TimeOffset**: one-slot pipeline stage applying a signed timestamp
//!   offset
//! - **Dispatcher**: issues timed writes to a [`CommandBus`] and latches the
//!   four bus fault kinds with captured context
//! - **Engine**: supervisory state machine pumping the stages and
//!   sequencing arm, stream, flush and drain
//!
//! Every stage is a small synchronous state machine; there are no threads.
//! [`Engine::step`] advances the whole pipeline by one step, moving data
//! only where the downstream stage can accept it.
//!
//! # Example
//!
//! ```
//! use rtio_dma::{BufferMemory, CaptureBus, Engine, TraceBuilder};
//!
//! let mut trace = TraceBuilder::new();
//! trace.append(5, 1000, 0, &[0xAB])?;
//! let memory = BufferMemory::new(trace.finish(), 8)?;
//!
//! let mut bus = CaptureBus::new();
//! let mut engine = Engine::new(8)?;
//! engine.set_enabled(true);
//! engine.run(&memory, &mut bus, 10_000)?;
//!
//! assert_eq!(bus.writes().len(), 1);
//! assert_eq!(bus.writes()[0].channel, 5);
//! # Ok::<(), rtio_dma::EngineError>(())
//! ```

use thiserror::Error;

pub mod bus;
pub mod engine;
pub mod memory;
pub mod record;

// Re-export the bus contract and fault types
pub use bus::{BusStatus, CaptureBus, CommandBus, FaultKind, WriteCommand};

// Re-export the memory contract
pub use memory::{BufferMemory, MemoryBus};

// Re-export record types and the trace encoder
pub use record::{Record, TraceBuilder, Transfer, HEADER_LEN, MAX_DATA_LEN, MAX_RECORD_LEN};

// Re-export pipeline stages and the top-level engine
pub use engine::{
    Dispatcher, Engine, EngineState, FaultContext, MemoryReader, RawSlicer, RecordDecoder,
    TimeOffset,
};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("record length {0} is shorter than the 14-byte record header")]
    RecordTooShort(u8),

    #[error("record length {0} exceeds the maximum record size of 78 bytes")]
    RecordTooLong(u8),

    #[error("payload of {0} bytes exceeds the 64-byte data field")]
    PayloadTooLong(usize),

    #[error("bus word size must be at least one byte")]
    ZeroWordSize,

    #[error("memory bus word size {actual} does not match the engine word size {expected}")]
    WordSizeMismatch { expected: usize, actual: usize },

    #[error("engine did not reach idle within {0} steps")]
    StepBudget(usize),
}

pub type Result<T> = std::result::Result<T, EngineError>;
