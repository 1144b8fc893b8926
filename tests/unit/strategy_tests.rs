use std::sync::Arc;

use serial_test::serial;

use chat_orchestrator::config::GlobalConfig;
use chat_orchestrator::injection::command::{run_tool, tool_succeeds};
use chat_orchestrator::injection::platform::{find_in_path, is_wsl_kernel, OsFamily};
use chat_orchestrator::injection::strategies::{
    default_strategies, sendkeys_chord, sendkeys_script, wtype_args, ClipboardLinux, DirectInput,
    StrategyEnv,
};
use chat_orchestrator::injection::{DeliveryStrategy, Platform, StrategyKind};

fn other_platform() -> Platform {
    Platform {
        os: OsFamily::Other,
        wsl: false,
        wayland: false,
    }
}

#[test]
fn default_chain_order() {
    let env = Arc::new(StrategyEnv::from_config(
        &GlobalConfig::default(),
        other_platform(),
    ));
    let strategies = default_strategies(&env);

    let names: Vec<&str> = strategies.iter().map(|s| s.name()).collect();
    assert_eq!(
        names,
        vec!["clipboard_linux", "clipboard_windows", "file_fallback", "direct_input"]
    );
    let kinds: Vec<StrategyKind> = strategies.iter().map(|s| s.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            StrategyKind::ClipboardLinux,
            StrategyKind::ClipboardWindows,
            StrategyKind::FileFallback,
            StrategyKind::DirectInput,
        ]
    );
}

#[test]
fn env_follows_config() {
    let config = GlobalConfig::from_toml_str(
        "[automation]\nenable_gui_automation = false\n[injection]\nwindow_title = \"Editor\"\n",
    )
    .expect("config");
    let env = StrategyEnv::from_config(&config, other_platform());

    assert!(!env.gui_automation);
    assert_eq!(env.window_title, "Editor");
    assert_eq!(env.chat_hotkeys, vec!["ctrl+l".to_owned(), "ctrl+k".to_owned()]);
}

#[test]
fn clipboard_kind_per_platform() {
    let mut platform = other_platform();
    assert_eq!(platform.clipboard_kind(), None);
    platform.os = OsFamily::Unix;
    assert_eq!(platform.clipboard_kind(), Some(StrategyKind::ClipboardLinux));
    platform.os = OsFamily::Windows;
    assert_eq!(platform.clipboard_kind(), Some(StrategyKind::ClipboardWindows));
}

#[test]
fn wsl_kernel_detection() {
    assert!(is_wsl_kernel(
        "Linux version 5.15.90.1-microsoft-standard-WSL2 (gcc 11.2)"
    ));
    assert!(!is_wsl_kernel("Linux version 6.8.0-45-generic (buildd@lcy02)"));
}

#[test]
fn wtype_chords() {
    assert_eq!(wtype_args("ctrl+l"), vec!["-M", "ctrl", "-k", "l", "-m", "ctrl"]);
    assert_eq!(wtype_args("enter"), vec!["-k", "Return"]);
    assert_eq!(
        wtype_args("ctrl+shift+p"),
        vec!["-M", "ctrl", "-M", "shift", "-k", "p", "-m", "shift", "-m", "ctrl"]
    );
}

#[test]
fn sendkeys_chords() {
    assert_eq!(sendkeys_chord("ctrl+l"), "^l");
    assert_eq!(sendkeys_chord("ctrl+shift+p"), "^+p");
    assert_eq!(sendkeys_chord("alt+enter"), "%{ENTER}");
}

#[test]
fn sendkeys_script_focuses_then_pastes() {
    let script = sendkeys_script("Bob's Editor", &["ctrl+l".to_owned()]);

    let focus = script.find("AppActivate('Bob''s Editor')").expect("focus");
    let hotkey = script.find("SendKeys('^l')").expect("hotkey");
    let paste = script.find("SendKeys('^v')").expect("paste");
    let enter = script.find("SendKeys('{ENTER}')").expect("enter");
    assert!(focus < hotkey && hotkey < paste && paste < enter);
}

#[tokio::test]
async fn direct_input_never_delivers() {
    assert!(!DirectInput.deliver("anything").await.expect("no error"));
}

#[tokio::test]
async fn clipboard_strategies_decline_foreign_platforms() {
    let env = Arc::new(StrategyEnv::from_config(
        &GlobalConfig::default(),
        other_platform(),
    ));
    let strategies = default_strategies(&env);

    for strategy in strategies.iter().filter(|s| {
        matches!(
            s.kind(),
            StrategyKind::ClipboardLinux | StrategyKind::ClipboardWindows
        )
    }) {
        assert!(!strategy.deliver("payload").await.expect("no error"));
    }
}

#[tokio::test]
#[serial]
async fn file_fallback_saves_prompt_without_automation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut env = StrategyEnv::from_config(&GlobalConfig::default(), other_platform());
    env.prompt_dir = dir.path().to_path_buf();
    env.gui_automation = false;
    let strategies = default_strategies(&Arc::new(env));
    let fallback = strategies
        .iter()
        .find(|s| s.kind() == StrategyKind::FileFallback)
        .expect("file fallback present");

    let delivered = fallback.deliver("saved prompt").await.expect("no error");

    assert!(!delivered, "no automation means the operator must paste");
    let saved: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .map(|e| e.expect("entry").path())
        .collect();
    assert_eq!(saved.len(), 1);
    let name = saved[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("chat_prompt_") && name.ends_with(".txt"));
    assert_eq!(std::fs::read_to_string(&saved[0]).unwrap(), "saved prompt");
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn run_tool_captures_stdout_and_stdin() {
    let output = run_tool("cat", &[], Some("piped text"), std::time::Duration::from_secs(5))
        .await
        .expect("cat runs");
    assert!(output.success);
    assert_eq!(output.stdout, "piped text");
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn run_tool_enforces_timeout() {
    let err = run_tool("sleep", &["5"], None, std::time::Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
#[serial]
async fn missing_tool_is_not_success() {
    assert!(
        !tool_succeeds(
            "definitely-not-a-real-tool-xyz",
            &[],
            None,
            std::time::Duration::from_secs(1)
        )
        .await
    );
}

#[cfg(unix)]
#[test]
#[serial]
#[allow(unsafe_code)]
fn find_in_path_respects_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let tool = dir.path().join("fake-tool");
    std::fs::write(&tool, "#!/bin/sh\n").expect("write tool");

    let original = std::env::var_os("PATH");
    unsafe {
        std::env::set_var("PATH", dir.path());
    }
    let found = find_in_path("fake-tool");
    let missing = find_in_path("other-tool");
    unsafe {
        match original {
            Some(path) => std::env::set_var("PATH", path),
            None => std::env::remove_var("PATH"),
        }
    }

    assert_eq!(found, Some(tool));
    assert!(missing.is_none());
}

/// Puts `dir` at the front of `PATH` until dropped.
#[cfg(unix)]
struct PathPrefix {
    original: Option<std::ffi::OsString>,
}

#[cfg(unix)]
impl PathPrefix {
    #[allow(unsafe_code)]
    fn new(dir: &std::path::Path) -> Self {
        let original = std::env::var_os("PATH");
        let mut paths = vec![dir.to_path_buf()];
        if let Some(current) = &original {
            paths.extend(std::env::split_paths(current));
        }
        let joined = std::env::join_paths(paths).expect("join paths");
        unsafe {
            std::env::set_var("PATH", joined);
        }
        Self { original }
    }
}

#[cfg(unix)]
impl Drop for PathPrefix {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        unsafe {
            match self.original.take() {
                Some(path) => std::env::set_var("PATH", path),
                None => std::env::remove_var("PATH"),
            }
        }
    }
}

#[cfg(unix)]
fn fake_tool(dir: &std::path::Path, name: &str, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write tool");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
}

/// Fake Windows interop tools: `clip.exe` records its stdin and
/// `powershell.exe` leaves a marker when it runs.
#[cfg(unix)]
fn wsl_interop(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let copied = dir.join("clipboard.txt");
    let keystrokes = dir.join("sendkeys.marker");
    fake_tool(dir, "clip.exe", &format!("cat > '{}'", copied.display()));
    fake_tool(dir, "powershell.exe", &format!(": > '{}'", keystrokes.display()));
    (copied, keystrokes)
}

#[cfg(unix)]
fn wsl_env(gui_automation: bool) -> Arc<StrategyEnv> {
    let platform = Platform {
        os: OsFamily::Unix,
        wsl: true,
        wayland: false,
    };
    let mut env = StrategyEnv::from_config(&GlobalConfig::default(), platform);
    env.gui_automation = gui_automation;
    Arc::new(env)
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn wsl_clipboard_without_gui_automation_only_copies() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (copied, keystrokes) = wsl_interop(dir.path());
    let _path = PathPrefix::new(dir.path());

    let strategy = ClipboardLinux::new(wsl_env(false));
    let delivered = strategy.deliver("payload").await.expect("no error");

    assert!(delivered, "a successful copy counts as delivery");
    assert_eq!(std::fs::read_to_string(&copied).expect("copied"), "payload");
    assert!(!keystrokes.exists(), "no keystrokes with gui automation off");
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn wsl_clipboard_with_gui_automation_pastes_via_sendkeys() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (copied, keystrokes) = wsl_interop(dir.path());
    let _path = PathPrefix::new(dir.path());

    let strategy = ClipboardLinux::new(wsl_env(true));
    let delivered = strategy.deliver("payload").await.expect("no error");

    assert!(delivered);
    assert_eq!(std::fs::read_to_string(&copied).expect("copied"), "payload");
    assert!(keystrokes.exists());
}
