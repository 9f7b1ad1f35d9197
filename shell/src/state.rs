//! Shell state: the central struct owning both components.
//!
//! A single `ShellState` is the calloop loop data; the frame timer,
//! IPC listener and dispatch handlers all receive it as `&mut`.

use std::time::Instant;

use tracing::{debug, info};

use crate::backend::sim_scene::{SharedScene, SimScene, EYE_HEIGHT};
use crate::config::ShellConfig;
use crate::ipc::IpcServer;
use crate::settings::SettingsStore;
use crate::vr::frame_timing::FrameTiming;
use crate::vr::gaze_select::GazeSelector;
use crate::vr::scene::{Pose, Vec3};
use crate::vr::workspace_switcher::WorkspaceController;
use crate::vr::FrameDriven;

/// Starting head pose: eye height, looking down -Z.
pub fn default_pose() -> Pose {
    Pose::new(Vec3::new(0.0, EYE_HEIGHT, 0.0), Vec3::FORWARD)
}

pub struct ShellState {
    pub scene: SharedScene,
    pub workspaces: WorkspaceController<SharedScene, Box<dyn SettingsStore>>,
    pub gaze: GazeSelector<SharedScene, SharedScene>,
    pub ipc_server: IpcServer,
    pub frame_timing: FrameTiming,
    pub running: bool,
    pub started: bool,
    pub frame_count: u64,
    last_tick: Option<Instant>,
}

impl ShellState {
    pub fn new(config: &ShellConfig, store: Box<dyn SettingsStore>) -> Self {
        let scene = SharedScene::new(SimScene::with_default_prefabs());
        let workspaces =
            WorkspaceController::new(scene.clone(), store, config.workspaces.clone());
        let mut gaze = GazeSelector::new(scene.clone(), scene.clone(), config.gaze.clone());
        gaze.set_pose(default_pose());

        Self {
            scene,
            workspaces,
            gaze,
            ipc_server: IpcServer::new(IpcServer::default_socket_path()),
            frame_timing: FrameTiming::for_rate(config.frame_rate_hz),
            running: true,
            started: false,
            frame_count: 0,
            last_tick: None,
        }
    }

    /// Run both components' start hooks. Idempotent.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.workspaces.on_start();
        self.gaze.on_start();
        self.started = true;
        info!(
            workspace = self.workspaces.current_workspace().as_str(),
            "shell started"
        );
    }

    /// Advance both components by `dt_s` seconds.
    pub fn tick(&mut self, dt_s: f64) {
        self.workspaces.on_frame(dt_s);
        self.gaze.on_frame(dt_s);
        self.frame_count += 1;
    }

    /// Advance by the wall time since the previous call and record timing.
    pub fn tick_now(&mut self) {
        let now = Instant::now();
        let interval_s = self
            .last_tick
            .map(|last| now.duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        self.tick(interval_s);

        let update_ms = now.elapsed().as_secs_f64() * 1000.0;
        if self.frame_count > 1 {
            self.frame_timing.record_frame(interval_s * 1000.0, update_ms);
        }
    }

    /// Drain pending component notifications as IPC event s-expressions.
    pub fn drain_events(&mut self) -> Vec<String> {
        let mut out: Vec<String> = self
            .workspaces
            .take_events()
            .iter()
            .map(|e| e.to_sexp())
            .collect();
        out.extend(self.gaze.take_events().iter().map(|e| e.to_sexp()));
        if !out.is_empty() {
            debug!(count = out.len(), "component events drained");
        }
        out
    }
}
