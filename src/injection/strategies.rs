//! Built-in delivery strategies.
//!
//! Each strategy copies the payload somewhere the target application can
//! reach it and, where GUI automation is allowed, drives the keystrokes
//! that focus the chat input, paste and submit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::command::{run_tool, tool_succeeds};
use super::platform::{windows_binary, OsFamily, Platform};
use super::{DeliveryStrategy, StrategyFuture, StrategyKind};
use crate::config::GlobalConfig;
use crate::{AppError, Result};

const CLIP_EXE_FALLBACK: &str = "/mnt/c/Windows/System32/clip.exe";
const POWERSHELL_FALLBACK: &str = "/mnt/c/Windows/System32/WindowsPowerShell/v1.0/powershell.exe";

const COPY_TIMEOUT: Duration = Duration::from_secs(10);
const KEY_TIMEOUT: Duration = Duration::from_secs(2);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(5);
const SENDKEYS_TIMEOUT: Duration = Duration::from_secs(8);
const KEY_PAUSE: Duration = Duration::from_millis(300);

/// Capabilities and tuning shared by the built-in strategies.
#[derive(Debug, Clone)]
pub struct StrategyEnv {
    /// Detected host platform.
    pub platform: Platform,
    /// Whether keystrokes may be sent to the target application.
    pub gui_automation: bool,
    /// Chords that focus the chat input before pasting.
    pub chat_hotkeys: Vec<String>,
    /// Title used to locate the target window.
    pub window_title: String,
    /// Directory for prompt files written by the file fallback.
    pub prompt_dir: PathBuf,
}

impl StrategyEnv {
    /// Derive strategy settings from configuration and a detected platform.
    #[must_use]
    pub fn from_config(config: &GlobalConfig, platform: Platform) -> Self {
        Self {
            platform,
            gui_automation: config.automation.enable_gui_automation,
            chat_hotkeys: config.injection.chat_hotkeys.clone(),
            window_title: config.injection.window_title.clone(),
            prompt_dir: std::env::temp_dir(),
        }
    }
}

/// The default fallback chain, in delivery order.
#[must_use]
pub fn default_strategies(env: &Arc<StrategyEnv>) -> Vec<Arc<dyn DeliveryStrategy>> {
    vec![
        Arc::new(ClipboardLinux::new(Arc::clone(env))),
        Arc::new(ClipboardWindows::new(Arc::clone(env))),
        Arc::new(FileFallback::new(Arc::clone(env))),
        Arc::new(DirectInput),
    ]
}

/// Translate `ctrl+l` style chords into `wtype` arguments.
#[must_use]
pub fn wtype_args(chord: &str) -> Vec<String> {
    let parts: Vec<&str> = chord.split('+').map(str::trim).collect();
    let Some((key, modifiers)) = parts.split_last() else {
        return Vec::new();
    };
    let mut args = Vec::new();
    for modifier in modifiers {
        args.push("-M".to_owned());
        args.push((*modifier).to_owned());
    }
    args.push("-k".to_owned());
    args.push(wtype_key(key));
    for modifier in modifiers.iter().rev() {
        args.push("-m".to_owned());
        args.push((*modifier).to_owned());
    }
    args
}

fn wtype_key(key: &str) -> String {
    match key.to_lowercase().as_str() {
        "enter" | "return" => "Return".to_owned(),
        other => other.to_owned(),
    }
}

/// Translate `ctrl+l` style chords into `SendKeys` notation (`^l`).
#[must_use]
pub fn sendkeys_chord(chord: &str) -> String {
    let mut out = String::new();
    let parts: Vec<&str> = chord.split('+').map(str::trim).collect();
    let Some((key, modifiers)) = parts.split_last() else {
        return out;
    };
    for modifier in modifiers {
        match modifier.to_lowercase().as_str() {
            "ctrl" | "control" => out.push('^'),
            "shift" => out.push('+'),
            "alt" => out.push('%'),
            _ => {}
        }
    }
    match key.to_lowercase().as_str() {
        "enter" | "return" => out.push_str("{ENTER}"),
        other => out.push_str(other),
    }
    out
}

/// PowerShell script that focuses `window_title` and pastes with `SendKeys`.
#[must_use]
pub fn sendkeys_script(window_title: &str, hotkeys: &[String]) -> String {
    let title = window_title.replace('\'', "''");
    let mut script = String::from(
        "$ErrorActionPreference = 'Stop'\n\
         $wshell = New-Object -ComObject wscript.shell\n\
         Start-Sleep -Milliseconds 300\n",
    );
    script.push_str(&format!("$null = $wshell.AppActivate('{title}')\n"));
    script.push_str("Start-Sleep -Milliseconds 300\n");
    for chord in hotkeys {
        script.push_str(&format!(
            "$wshell.SendKeys('{}')\nStart-Sleep -Milliseconds 200\n",
            sendkeys_chord(chord)
        ));
    }
    script.push_str("$wshell.SendKeys('^v')\nStart-Sleep -Milliseconds 200\n");
    script.push_str("$wshell.SendKeys('{ENTER}')\n");
    script
}

async fn paste_via_sendkeys(env: &StrategyEnv) -> bool {
    let Some(powershell) = windows_binary("powershell.exe", POWERSHELL_FALLBACK) else {
        debug!("powershell not available for paste simulation");
        return false;
    };
    let script = sendkeys_script(&env.window_title, &env.chat_hotkeys);
    let ok = tool_succeeds(
        &powershell,
        &["-NoProfile", "-Command", script.as_str()],
        None,
        SENDKEYS_TIMEOUT,
    )
    .await;
    if ok {
        info!("sent paste and enter via powershell sendkeys");
    }
    ok
}

async fn copy_to_wsl_clipboard(payload: &str) -> bool {
    let Some(clip) = windows_binary("clip.exe", CLIP_EXE_FALLBACK) else {
        debug!("clip.exe not found from wsl");
        return false;
    };
    tool_succeeds(&clip, &[], Some(payload), COPY_TIMEOUT).await
}

async fn press(chord: &str) {
    tool_succeeds("xdotool", &["key", chord], None, KEY_TIMEOUT).await;
    tokio::time::sleep(KEY_PAUSE).await;
}

/// Find the first window whose name matches `title`.
async fn find_window(title: &str) -> Option<String> {
    let output = run_tool("xdotool", &["search", "--name", title], None, SEARCH_TIMEOUT)
        .await
        .ok()?;
    output
        .stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_owned)
}

async fn paste_via_xdotool(env: &StrategyEnv, focus_command: &str) -> bool {
    let Some(window_id) = find_window(&env.window_title).await else {
        debug!(title = %env.window_title, "no target window found with xdotool");
        return false;
    };
    debug!(window_id, "found target window");

    tool_succeeds("xdotool", &[focus_command, window_id.as_str()], None, KEY_TIMEOUT).await;
    tokio::time::sleep(KEY_PAUSE).await;
    for chord in &env.chat_hotkeys {
        press(chord).await;
    }
    press("ctrl+v").await;
    press("Return").await;

    info!("xdotool paste completed");
    true
}

async fn paste_via_wtype(env: &StrategyEnv) -> bool {
    let chords = env
        .chat_hotkeys
        .iter()
        .map(String::as_str)
        .chain(["ctrl+v", "enter"]);
    for chord in chords {
        let args = wtype_args(chord);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        if !tool_succeeds("wtype", &args, None, KEY_TIMEOUT).await {
            debug!(chord, "wtype key press failed");
            return false;
        }
        tokio::time::sleep(KEY_PAUSE).await;
    }
    info!("wtype paste completed");
    true
}

/// Clipboard copy plus simulated paste on Linux and WSL hosts.
pub struct ClipboardLinux {
    env: Arc<StrategyEnv>,
}

impl ClipboardLinux {
    /// Create the strategy.
    #[must_use]
    pub fn new(env: Arc<StrategyEnv>) -> Self {
        Self { env }
    }

    async fn simulate_paste(&self) -> bool {
        if !self.env.gui_automation {
            info!("gui automation disabled; manual paste required");
            return true;
        }
        if self.env.platform.wayland && paste_via_wtype(&self.env).await {
            return true;
        }
        paste_via_xdotool(&self.env, "windowactivate").await
    }

    async fn run(&self, payload: &str) -> bool {
        if self.env.platform.os != OsFamily::Unix {
            return false;
        }

        if self.env.platform.wsl {
            if !copy_to_wsl_clipboard(payload).await {
                return false;
            }
            if !self.env.gui_automation {
                info!("gui automation disabled; manual paste required");
                return true;
            }
            return paste_via_sendkeys(&self.env).await;
        }

        let mut tools: Vec<(&str, &[&str])> = Vec::new();
        if self.env.platform.wayland {
            tools.push(("wl-copy", &[]));
        }
        tools.push(("xclip", &["-selection", "clipboard"]));
        tools.push(("xsel", &["--clipboard", "--input"]));

        for (program, args) in tools {
            if tool_succeeds(program, args, Some(payload), COPY_TIMEOUT).await {
                debug!(tool = program, "payload copied to clipboard");
                return self.simulate_paste().await;
            }
        }
        false
    }
}

impl DeliveryStrategy for ClipboardLinux {
    fn name(&self) -> &str {
        "clipboard_linux"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::ClipboardLinux
    }

    fn deliver<'a>(&'a self, payload: &'a str) -> StrategyFuture<'a> {
        Box::pin(async move { Ok(self.run(payload).await) })
    }
}

/// Clipboard copy plus `SendKeys` paste on native Windows.
pub struct ClipboardWindows {
    env: Arc<StrategyEnv>,
}

impl ClipboardWindows {
    /// Create the strategy.
    #[must_use]
    pub fn new(env: Arc<StrategyEnv>) -> Self {
        Self { env }
    }
}

impl DeliveryStrategy for ClipboardWindows {
    fn name(&self) -> &str {
        "clipboard_windows"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::ClipboardWindows
    }

    fn deliver<'a>(&'a self, payload: &'a str) -> StrategyFuture<'a> {
        Box::pin(async move {
            if self.env.platform.os != OsFamily::Windows {
                return Ok(false);
            }
            if !tool_succeeds("clip", &[], Some(payload), COPY_TIMEOUT).await {
                return Ok(false);
            }
            info!("windows clipboard set via clip");
            if !self.env.gui_automation {
                return Ok(true);
            }
            Ok(paste_via_sendkeys(&self.env).await)
        })
    }
}

/// Saves the payload to a file, then tries any automation that might
/// still paste it.
///
/// Reports success only when some automation went through; otherwise the
/// saved file is left for the operator.
pub struct FileFallback {
    env: Arc<StrategyEnv>,
}

impl FileFallback {
    /// Create the strategy.
    #[must_use]
    pub fn new(env: Arc<StrategyEnv>) -> Self {
        Self { env }
    }

    async fn save(&self, payload: &str) -> Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix("chat_prompt_")
            .suffix(".txt")
            .tempfile_in(&self.env.prompt_dir)?;
        let (file, path) = file
            .keep()
            .map_err(|err| AppError::Injection(format!("failed to keep prompt file: {err}")))?;

        let mut file = tokio::fs::File::from_std(file);
        file.write_all(payload.as_bytes()).await?;
        file.flush().await?;
        Ok(path)
    }

    async fn native_linux_automation(&self, payload: &str) -> bool {
        if self.env.platform.os != OsFamily::Unix || !self.env.gui_automation {
            return false;
        }
        if !tool_succeeds(
            "xclip",
            &["-selection", "clipboard"],
            Some(payload),
            COPY_TIMEOUT,
        )
        .await
        {
            return false;
        }
        paste_via_xdotool(&self.env, "windowfocus").await
    }

    async fn wsl_clipboard_automation(&self, payload: &str) -> bool {
        if !self.env.platform.wsl || !copy_to_wsl_clipboard(payload).await {
            return false;
        }
        info!("prompt copied to windows clipboard");
        if self.env.gui_automation && paste_via_sendkeys(&self.env).await {
            info!("wsl clipboard automation pasted via sendkeys");
        } else {
            info!("wsl clipboard set; manual paste may be required");
        }
        true
    }

    async fn notify(title: &str, message: &str) {
        if !tool_succeeds("notify-send", &[title, message], None, KEY_TIMEOUT).await {
            debug!("desktop notification unavailable");
        }
    }
}

impl DeliveryStrategy for FileFallback {
    fn name(&self) -> &str {
        "file_fallback"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::FileFallback
    }

    fn deliver<'a>(&'a self, payload: &'a str) -> StrategyFuture<'a> {
        Box::pin(async move {
            let path = self.save(payload).await?;
            info!(path = %path.display(), "prompt saved to file");

            if self.native_linux_automation(payload).await {
                info!("native linux automation succeeded");
                return Ok(true);
            }
            if self.wsl_clipboard_automation(payload).await {
                return Ok(true);
            }

            warn!(
                path = %path.display(),
                "automation unavailable: open a new chat in the target application, \
                 paste the prompt from the saved file and press enter"
            );
            Self::notify(
                "Agent setup",
                "New agent prompt ready. Paste it into a new chat.",
            )
            .await;
            Ok(false)
        })
    }
}

/// Placeholder for direct keystroke typing; never succeeds.
pub struct DirectInput;

impl DeliveryStrategy for DirectInput {
    fn name(&self) -> &str {
        "direct_input"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectInput
    }

    fn deliver<'a>(&'a self, _payload: &'a str) -> StrategyFuture<'a> {
        Box::pin(async {
            debug!("direct input delivery is not available");
            Ok(false)
        })
    }
}
