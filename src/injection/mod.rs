//! Prompt delivery into the external chat application.
//!
//! A [`DeliveryStrategy`] is one way of getting a payload into the chat.
//! The [`pipeline::InjectionPipeline`] walks an ordered list of them and
//! stops at the first that reports success.

pub mod command;
pub mod pipeline;
pub mod platform;
pub mod strategies;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::Result;

pub use pipeline::{InjectionOutcome, InjectionPipeline};
pub use platform::Platform;

/// Boxed future returned by [`DeliveryStrategy::deliver`].
pub type StrategyFuture<'a> = Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

/// Tag identifying what a strategy does, independent of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Linux/WSL clipboard plus simulated paste.
    ClipboardLinux,
    /// Windows clipboard plus simulated paste.
    ClipboardWindows,
    /// Payload written to a file for manual pickup.
    FileFallback,
    /// Direct keystroke typing.
    DirectInput,
    /// Any other mechanism.
    Custom,
}

impl Display for StrategyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ClipboardLinux => "clipboard_linux",
            Self::ClipboardWindows => "clipboard_windows",
            Self::FileFallback => "file_fallback",
            Self::DirectInput => "direct_input",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// One mechanism for delivering a payload.
///
/// `deliver` returns `Ok(true)` when the payload reached the chat,
/// `Ok(false)` when the mechanism is unavailable or did not work, and
/// `Err` for unexpected failures. The pipeline treats `Err` as `false`.
pub trait DeliveryStrategy: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// What kind of mechanism this is.
    fn kind(&self) -> StrategyKind;

    /// Attempt delivery of `payload`.
    ///
    /// # Errors
    ///
    /// Returns an error for unexpected failures; expected unavailability
    /// is reported as `Ok(false)`.
    fn deliver<'a>(&'a self, payload: &'a str) -> StrategyFuture<'a>;
}
