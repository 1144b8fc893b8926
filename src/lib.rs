#![forbid(unsafe_code)]

//! `chat-orchestrator`: coordinates long-running agent chat sessions.
//!
//! Sessions live in a [`orchestrator::SessionRegistry`]. Prompts reach the
//! external chat application through an ordered
//! [`injection::InjectionPipeline`], and a polling
//! [`orchestrator::SessionMonitor`] watches the message bus for loops,
//! completion and inactivity.

pub mod artifacts;
pub mod bus;
pub mod config;
pub mod errors;
pub mod injection;
pub mod models;
pub mod orchestrator;
pub mod persistence;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
