//! Host platform detection for picking delivery mechanisms.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use super::StrategyKind;

/// Coarse operating-system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    /// Linux, macOS and other POSIX hosts (WSL included).
    Unix,
    /// Native Windows.
    Windows,
    /// Anything else.
    Other,
}

/// Snapshot of the capabilities the delivery strategies care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Platform {
    /// Operating-system family.
    pub os: OsFamily,
    /// Running inside Windows Subsystem for Linux.
    pub wsl: bool,
    /// A Wayland compositor is available.
    pub wayland: bool,
}

impl Platform {
    /// Inspect the current process environment.
    #[must_use]
    pub fn detect() -> Self {
        let os = if cfg!(windows) {
            OsFamily::Windows
        } else if cfg!(unix) {
            OsFamily::Unix
        } else {
            OsFamily::Other
        };
        let wsl = os == OsFamily::Unix
            && fs::read_to_string("/proc/version").is_ok_and(|text| is_wsl_kernel(&text));
        let wayland = env::var_os("WAYLAND_DISPLAY").is_some_and(|v| !v.is_empty());

        let platform = Self { os, wsl, wayland };
        debug!(?platform, "platform detected");
        platform
    }

    /// Clipboard strategy native to this platform, if any.
    #[must_use]
    pub fn clipboard_kind(&self) -> Option<StrategyKind> {
        match self.os {
            OsFamily::Unix => Some(StrategyKind::ClipboardLinux),
            OsFamily::Windows => Some(StrategyKind::ClipboardWindows),
            OsFamily::Other => None,
        }
    }
}

/// Whether a `/proc/version` string identifies a WSL kernel.
#[must_use]
pub fn is_wsl_kernel(proc_version: &str) -> bool {
    let lower = proc_version.to_lowercase();
    lower.contains("microsoft") || lower.contains("wsl")
}

/// Locate `program` on `PATH`.
#[must_use]
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Resolve a Windows interop binary from `PATH` or its well-known WSL mount.
#[must_use]
pub fn windows_binary(program: &str, fallback: &str) -> Option<PathBuf> {
    find_in_path(program).or_else(|| {
        let path = Path::new(fallback);
        path.exists().then(|| path.to_path_buf())
    })
}
