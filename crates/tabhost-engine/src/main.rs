//! tabhost headless runner.
//!
//! Attaches the embedding engine to an existing host window, embeds or
//! launches the requested guests, and runs the control loop until Ctrl-C.
//! On Ctrl-C every guest is closed or released according to the configured
//! close behavior.
//!
//! # Usage
//!
//! ```text
//! tabhost [OPTIONS]
//!
//! Options:
//!   --config <PATH>            Config file [env: TABHOST_CONFIG]
//!   --log-level <FILTER>       Log filter, e.g. `debug` [env: TABHOST_LOG]
//!   --reconcile-only           Clean up guests left by a crash, then exit
//!   --init-config              Write the effective config file, then exit
//!   --host-window <HWND>       Host frame window (hex `0x...` or decimal)
//!   --content-window <HWND>    Child window guests are embedded into
//!   --embed <HWND>             Window to capture at startup (repeatable)
//!   --launch <PROGRAM>         Program to start and capture (repeatable)
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config (TOML) and initialise tracing
//!  └─ reconcile zombies from the previous run
//!  └─ start services
//!       ├─ WinEventHookRegistrar (hook thread → control queue)
//!       ├─ slot watcher          (Tokio task → SlotChanged)
//!       ├─ Ctrl-C handler        (Tokio task → Shutdown)
//!       └─ HostEngine::run       (the control task)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tabhost_core::WindowHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tabhost_engine::infrastructure::storage::config::{
    config_dir, config_file_path, load_config_from, save_config_to, EngineConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Embeds windows of other programs into a host window.
#[derive(Debug, Parser)]
#[command(
    name = "tabhost",
    about = "Foreign-window embedding engine for Windows",
    version
)]
struct Cli {
    /// Path to the config file.
    ///
    /// Defaults to the platform config directory.  The tracked-process ledger
    /// is kept next to it.
    #[arg(long, env = "TABHOST_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is not set.  Overrides the config file.
    #[arg(long, env = "TABHOST_LOG")]
    log_level: Option<String>,

    /// Reconcile processes left behind by a crashed run, then exit.
    #[arg(long)]
    reconcile_only: bool,

    /// Write the effective configuration to the config file, then exit.
    #[arg(long)]
    init_config: bool,

    /// Handle of the host's top-level window.
    #[arg(long, value_parser = parse_handle)]
    host_window: Option<WindowHandle>,

    /// Handle of the window guests are embedded into.  Defaults to the host.
    #[arg(long, value_parser = parse_handle)]
    content_window: Option<WindowHandle>,

    /// Window to capture once the engine is running.
    #[arg(long = "embed", value_parser = parse_handle)]
    embed: Vec<WindowHandle>,

    /// Program to launch and capture once the engine is running.
    #[arg(long = "launch")]
    launch: Vec<PathBuf>,
}

/// Parses a window handle written as `0x1a2b` or `6699`.
fn parse_handle(text: &str) -> Result<WindowHandle, String> {
    let text = text.trim();
    let parsed = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    match parsed {
        Ok(0) => Err("window handle must not be zero".to_string()),
        Ok(value) => Ok(WindowHandle(value)),
        Err(e) => Err(format!("invalid window handle {text:?}: {e}")),
    }
}

/// Where the config came from, and its directory.
struct LoadedConfig {
    config: EngineConfig,
    path: Option<PathBuf>,
    dir: Option<PathBuf>,
    error: Option<String>,
}

fn load(cli: &Cli) -> LoadedConfig {
    let path = match &cli.config {
        Some(path) => Ok(path.clone()),
        None => config_file_path(),
    };
    match path {
        Ok(path) => {
            let dir = path
                .parent()
                .map(PathBuf::from)
                .or_else(|| config_dir().ok());
            match load_config_from(&path) {
                Ok(config) => LoadedConfig {
                    config,
                    path: Some(path),
                    dir,
                    error: None,
                },
                Err(e) => LoadedConfig {
                    config: EngineConfig::default(),
                    path: Some(path),
                    dir,
                    error: Some(e.to_string()),
                },
            }
        }
        Err(e) => LoadedConfig {
            config: EngineConfig::default(),
            path: None,
            dir: None,
            error: Some(e.to_string()),
        },
    }
}

/// `RUST_LOG` wins, then the CLI, then the config file, then `info`.
fn env_filter(cli_level: Option<&str>, config_level: &str) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(cli_level.unwrap_or(config_level))
            .unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loaded = load(&cli);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(
            cli.log_level.as_deref(),
            &loaded.config.engine.log_level,
        ))
        .init();

    if let Some(e) = &loaded.error {
        warn!("using default configuration: {e}");
    }

    if cli.init_config {
        let path = loaded
            .path
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no config path available; pass --config"))?;
        save_config_to(&path, &loaded.config)?;
        info!("wrote configuration to {}", path.display());
        return Ok(());
    }

    info!("tabhost starting");
    run(cli, loaded).await
}

#[cfg(not(target_os = "windows"))]
async fn run(_cli: Cli, _loaded: LoadedConfig) -> anyhow::Result<()> {
    anyhow::bail!("tabhost embeds Win32 windows and only runs on Windows")
}

#[cfg(target_os = "windows")]
async fn run(cli: Cli, loaded: LoadedConfig) -> anyhow::Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Context;
    use tabhost_engine::application::engine::{
        control_channel, ControlMessage, EngineDeps, EngineSettings, HostEngine,
    };
    use tabhost_engine::application::host::{HostContainer, StaticPolicy};
    use tabhost_engine::application::track_processes::ProcessLifecycleTracker;
    use tabhost_engine::infrastructure::hooks::windows::WinEventHookRegistrar;
    use tabhost_engine::infrastructure::host_window::NativeHostContainer;
    use tabhost_engine::infrastructure::native::windows::{ShellTaskbar, Win32WindowSystem};
    use tabhost_engine::infrastructure::native::WindowSystem;
    use tabhost_engine::infrastructure::process::windows::Win32ProcessInspector;
    use tabhost_engine::infrastructure::storage::tracker_file::JsonTrackerStore;

    const SLOT_POLL_INTERVAL: Duration = Duration::from_millis(100);

    let config = loaded.config;
    let dir = loaded
        .dir
        .context("no directory for the tracked-process ledger; pass --config")?;
    let settings = EngineSettings::from(&config);

    let windows: Arc<dyn WindowSystem> = Arc::new(Win32WindowSystem::new());
    let processes = Arc::new(Win32ProcessInspector::new());
    let store = Arc::new(JsonTrackerStore::new(config.tracker_path(&dir)));

    if cli.reconcile_only {
        let tracker = ProcessLifecycleTracker::new(
            store,
            processes,
            windows,
            settings.start_time_tolerance,
        );
        let report = tracker
            .reconcile_zombies()
            .context("reconciling tracked processes")?;
        info!(
            "reconciled {} records: killed {:?}, pid reuse {:?}, left running {:?}",
            report.total(),
            report.killed,
            report.skipped_pid_reuse,
            report.left_running
        );
        return Ok(());
    }

    let host_window = cli
        .host_window
        .context("--host-window is required unless --reconcile-only is given")?;
    if !windows.is_window(host_window) {
        anyhow::bail!("host window {host_window} does not exist");
    }
    let content_window = cli.content_window.unwrap_or(host_window);

    let (handle, inbox) = control_channel();
    let registrar = Arc::new(
        WinEventHookRegistrar::start(handle.hook_sink()).context("starting the hook thread")?,
    );
    let host = Arc::new(NativeHostContainer::new(
        windows.clone(),
        host_window,
        content_window,
    ));
    let policy = Arc::new(StaticPolicy::new(
        config.policy.hide_guests_from_taskbar,
        config.policy.close_behavior,
    ));
    let deps = EngineDeps {
        windows,
        taskbar: Arc::new(ShellTaskbar::new()),
        hooks: registrar,
        processes,
        store,
        host: host.clone(),
        policy,
    };
    let engine = HostEngine::new(deps, settings, handle.clone(), inbox);
    if let Err(e) = engine.reconcile_zombies() {
        warn!("zombie reconciliation failed: {e}");
    }

    for window in cli.embed {
        handle.post(ControlMessage::Embed(window));
    }
    for program in cli.launch {
        handle.post(ControlMessage::Launch {
            program,
            args: Vec::new(),
        });
    }

    // ── Slot watcher ──────────────────────────────────────────────────────────
    let watcher = handle.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SLOT_POLL_INTERVAL);
        let mut last = host.slot_rect();
        loop {
            ticker.tick().await;
            let current = host.slot_rect();
            if current != last {
                last = current;
                if !watcher.post(ControlMessage::SlotChanged) {
                    break;
                }
            }
        }
    });

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let stopper = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            stopper.post(ControlMessage::Shutdown);
        }
    });

    info!("tabhost ready on host window {host_window}.  Press Ctrl-C to exit.");
    let summary = engine.run().await;
    info!(
        "tabhost stopped: {} embedded, {} released, {} closed",
        summary.embedded, summary.released, summary.closed
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handle_accepts_hex_and_decimal() {
        assert_eq!(parse_handle("0x1A2B"), Ok(WindowHandle(0x1A2B)));
        assert_eq!(parse_handle("0X10"), Ok(WindowHandle(0x10)));
        assert_eq!(parse_handle("6699"), Ok(WindowHandle(6699)));
    }

    #[test]
    fn test_parse_handle_rejects_zero_and_garbage() {
        assert!(parse_handle("0").is_err());
        assert!(parse_handle("0xZZ").is_err());
        assert!(parse_handle("").is_err());
    }

    #[test]
    fn test_cli_collects_repeated_embeds() {
        // Arrange / Act
        let cli = Cli::parse_from([
            "tabhost",
            "--host-window",
            "0x10",
            "--embed",
            "0x200",
            "--embed",
            "768",
            "--launch",
            "notepad.exe",
        ]);

        // Assert
        assert_eq!(cli.host_window, Some(WindowHandle(0x10)));
        assert_eq!(cli.content_window, None);
        assert_eq!(cli.embed, vec![WindowHandle(0x200), WindowHandle(768)]);
        assert_eq!(cli.launch, vec![PathBuf::from("notepad.exe")]);
        assert!(!cli.reconcile_only);
    }

    #[test]
    fn test_cli_rejects_invalid_host_window() {
        let result = Cli::try_parse_from(["tabhost", "--host-window", "window"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_config_path_sets_ledger_directory() {
        let cli = Cli::parse_from(["tabhost", "--config", "/tmp/tabhost-test/config.toml"]);

        let loaded = load(&cli);

        assert_eq!(loaded.dir, Some(PathBuf::from("/tmp/tabhost-test")));
        assert!(loaded.error.is_none());
    }
}
