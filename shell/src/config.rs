//! Shell configuration assembled from the command line.

use std::path::PathBuf;

use crate::vr::gaze_select::GazeSelectConfig;
use crate::vr::workspace_switcher::WorkspaceSwitcherConfig;

/// Everything the host needs to build and drive both components.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Frame tick rate in Hz.
    pub frame_rate_hz: u32,
    pub workspaces: WorkspaceSwitcherConfig,
    pub gaze: GazeSelectConfig,
    /// Settings file; `None` means the XDG state default.
    pub settings_path: Option<PathBuf>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60,
            workspaces: WorkspaceSwitcherConfig::default(),
            gaze: GazeSelectConfig::default(),
            settings_path: None,
        }
    }
}

impl ShellConfig {
    /// Tick interval derived from the frame rate. Zero is treated as 1 Hz.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.frame_rate_hz.max(1) as f64)
    }

    /// Whether workspace changes are written to the settings file.
    pub fn persist(&self) -> bool {
        self.workspaces.persist
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = ShellConfig::default();
        assert_eq!(c.frame_rate_hz, 60);
        assert!(c.persist());
        assert_eq!(c.gaze.dwell_threshold_s, 2.0);
        assert_eq!(c.workspaces.fade_duration_s, 0.5);
    }

    #[test]
    fn test_frame_interval() {
        let mut c = ShellConfig::default();
        c.frame_rate_hz = 50;
        assert_eq!(c.frame_interval().as_millis(), 20);
        c.frame_rate_hz = 0;
        assert_eq!(c.frame_interval().as_secs(), 1);
    }
}
