//! ewwm-vr-shell - VR workspace switcher and gaze selector
//!
//! Part of the EXWM-VR project: runs the workspace cross-fade and
//! dwell-to-click gaze pointer over a simulated scene, controlled from
//! Emacs over IPC.

mod backend;
mod config;
pub mod ipc;
mod settings;
mod sexp;
mod state;
pub mod vr;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use crate::config::ShellConfig;
use crate::settings::{MemoryStore, SettingsStore, SexpFileStore};
use crate::vr::fade::Easing;
use crate::vr::workspace_switcher::WorkspaceKind;

fn parse_easing(s: &str) -> Result<Easing, String> {
    Easing::from_str(s)
        .ok_or_else(|| format!("unknown easing {s:?} (linear, ease-in, ease-out, ease-in-out)"))
}

/// `KIND=MS`, e.g. `work=300`.
fn parse_transition(s: &str) -> Result<(WorkspaceKind, u64), String> {
    let (kind, ms) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KIND=MS, got {s:?}"))?;
    let kind = WorkspaceKind::from_str(kind).ok_or_else(|| format!("unknown workspace {kind:?}"))?;
    let ms = ms.parse().map_err(|e| format!("bad milliseconds {ms:?}: {e}"))?;
    Ok((kind, ms))
}

#[derive(Parser, Debug)]
#[command(name = "ewwm-vr-shell", about = "EXWM-VR workspace and gaze-select shell")]
struct Cli {
    /// Frame tick rate in Hz
    #[arg(long, default_value_t = 60)]
    frame_rate: u32,

    /// IPC socket path (default: $XDG_RUNTIME_DIR/ewwm-vr-shell.sock)
    #[arg(long)]
    ipc_socket: Option<PathBuf>,

    /// Log all IPC messages to stderr
    #[arg(long)]
    ipc_trace: bool,

    /// Settings file (default: $XDG_STATE_HOME/ewwm/vr-shell.el)
    #[arg(long)]
    settings_file: Option<PathBuf>,

    /// Do not restore or save the active workspace
    #[arg(long)]
    no_persist: bool,

    /// Duration of each overlay fade, in milliseconds
    #[arg(long, default_value_t = 500)]
    fade_ms: u64,

    /// Overlay easing for every workspace (linear, ease-in, ease-out, ease-in-out)
    #[arg(long, default_value = "linear", value_parser = parse_easing)]
    easing: Easing,

    /// Per-workspace transition duration override, KIND=MS (repeatable)
    #[arg(long = "transition", value_parser = parse_transition)]
    transitions: Vec<(WorkspaceKind, u64)>,

    /// Gaze dwell before a click, in milliseconds
    #[arg(long, default_value_t = 2000)]
    dwell_ms: u64,

    /// Minimum time between gaze clicks, in milliseconds
    #[arg(long, default_value_t = 500)]
    cooldown_ms: u64,

    /// Maximum gaze ray length in metres
    #[arg(long, default_value_t = 10.0)]
    gaze_distance: f32,

    /// Exit after N seconds (testing)
    #[arg(long)]
    exit_after: Option<u64>,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

impl Cli {
    fn shell_config(&self) -> ShellConfig {
        let mut config = ShellConfig {
            frame_rate_hz: self.frame_rate,
            settings_path: self.settings_file.clone(),
            ..ShellConfig::default()
        };
        config.workspaces.persist = !self.no_persist;
        config.workspaces.fade_duration_s = self.fade_ms as f64 / 1000.0;
        for entry in &mut config.workspaces.workspaces {
            entry.easing = self.easing;
            if let Some((_, ms)) = self.transitions.iter().rev().find(|(k, _)| *k == entry.kind) {
                entry.transition_duration_s = Some(*ms as f64 / 1000.0);
            }
        }
        config.gaze.dwell_threshold_s = self.dwell_ms as f64 / 1000.0;
        config.gaze.click_cooldown_s = self.cooldown_ms as f64 / 1000.0;
        config.gaze.gaze_distance = self.gaze_distance;
        config
    }
}

fn open_store(config: &ShellConfig) -> Box<dyn SettingsStore> {
    if !config.persist() {
        info!("persistence disabled, using in-memory settings");
        return Box::new(MemoryStore::new());
    }
    let path = config
        .settings_path
        .clone()
        .unwrap_or_else(SexpFileStore::default_path);
    Box::new(SexpFileStore::open(path))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("ewwm-vr-shell {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ewwm_vr_shell=info".into()),
        )
        .init();

    info!("ewwm-vr-shell v{} starting", env!("CARGO_PKG_VERSION"));

    let config = cli.shell_config();
    let store = open_store(&config);

    backend::headless::run(
        &config,
        store,
        backend::IpcConfig {
            socket_path: cli.ipc_socket.clone(),
            trace: cli.ipc_trace,
        },
        backend::headless::HeadlessConfig {
            exit_after: cli.exit_after.map(Duration::from_secs),
            ..Default::default()
        },
    )
}
