//! Pipeline stages and the top-level playback engine
//!
//! Data flows reader → slicer → decoder → time offset → dispatcher; the
//! [`Engine`] owns all five stages and pumps them one step at a time under
//! a strict back-pressure discipline.

pub mod controller;
pub mod decoder;
pub mod dispatcher;
pub mod offset;
pub mod reader;
pub mod slicer;

pub use controller::{Engine, EngineState};
pub use decoder::RecordDecoder;
pub use dispatcher::{Dispatcher, FaultContext};
pub use offset::TimeOffset;
pub use reader::{MemWord, MemoryReader};
pub use slicer::RawSlicer;
