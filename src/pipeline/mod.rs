pub mod buffers;
pub mod capture_loop;
pub mod orchestrator;
pub mod pacer;
pub mod signal;
pub mod stats;
pub mod watchdog;

pub use capture_loop::{CaptureLoop, CycleOutcome};
pub use orchestrator::Orchestrator;
pub use signal::PipelineSignal;
pub use watchdog::{MemoryProbe, SystemMemory};
