//! Session orchestration.
//!
//! Covers the session registry, loop and completion detection over the
//! message bus, the monitor loop and the top-level control surface.

pub mod channel_reader;
pub mod completion_detector;
pub mod loop_breaker;
pub mod loop_detector;
pub mod monitor;
pub mod registry;
pub mod session_manager;

pub use monitor::{CycleReport, SessionMonitor};
pub use registry::SessionRegistry;
pub use session_manager::Orchestrator;
