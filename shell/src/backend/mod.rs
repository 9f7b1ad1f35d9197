//! Host backends. Only the headless loop over a simulated scene ships.

pub mod headless;
pub mod sim_scene;

use std::path::PathBuf;

/// IPC configuration passed from CLI to the backend.
#[derive(Debug, Clone, Default)]
pub struct IpcConfig {
    /// Custom socket path (default: `$XDG_RUNTIME_DIR/ewwm-vr-shell.sock`).
    pub socket_path: Option<PathBuf>,
    /// Log every IPC message.
    pub trace: bool,
}
