//! Workspace switcher: cross-fades between pre-instantiated workspace
//! scenes (Home / Work / Entertainment), one visible at a time.
//!
//! A transition runs as a phase machine advanced once per frame:
//! fade-out, switch, fade-in (with UI panels fading over half the
//! duration), persist. Only one transition may be in flight.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::fade::{Easing, FadeTimer};
use super::scene::{NodeId, SceneGraph};
use super::FrameDriven;
use crate::settings::SettingsStore;
use crate::sexp::bool_sexp;

/// Settings key for the persisted workspace id.
pub const ACTIVE_WORKSPACE_KEY: &str = "active-workspace";

// ── Workspace kind ──────────────────────────────────────────

/// The fixed set of workspaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WorkspaceKind {
    #[default]
    Home,
    Work,
    Entertainment,
}

impl WorkspaceKind {
    pub const ALL: [Self; 3] = [Self::Home, Self::Work, Self::Entertainment];

    /// Persisted integer id.
    pub fn id(&self) -> i64 {
        match self {
            Self::Home => 0,
            Self::Work => 1,
            Self::Entertainment => 2,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(Self::Home),
            1 => Some(Self::Work),
            2 => Some(Self::Entertainment),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Work => "work",
            Self::Entertainment => "entertainment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "home" => Some(Self::Home),
            "work" => Some(Self::Work),
            "entertainment" => Some(Self::Entertainment),
            _ => None,
        }
    }

    /// Next kind, wrapping around.
    pub fn next(&self) -> Self {
        let n = Self::ALL.len() as i64;
        Self::ALL[((self.id() + 1) % n) as usize]
    }

    /// Previous kind, wrapping around.
    pub fn previous(&self) -> Self {
        let n = Self::ALL.len() as i64;
        Self::ALL[((self.id() + n - 1) % n) as usize]
    }
}

// ── Config ──────────────────────────────────────────────────

/// Static per-workspace configuration.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    pub kind: WorkspaceKind,
    /// Prefab the host instantiates. `None` leaves the workspace empty.
    pub prefab: Option<String>,
    /// Overrides the controller fade duration for transitions into this
    /// workspace.
    pub transition_duration_s: Option<f64>,
    pub easing: Easing,
}

impl WorkspaceConfig {
    pub fn new(kind: WorkspaceKind, prefab: &str) -> Self {
        Self {
            kind,
            prefab: Some(prefab.to_string()),
            transition_duration_s: None,
            easing: Easing::default(),
        }
    }
}

/// Workspace switcher configuration.
#[derive(Debug, Clone)]
pub struct WorkspaceSwitcherConfig {
    /// One entry per kind; later duplicates replace earlier ones.
    pub workspaces: Vec<WorkspaceConfig>,
    /// Seconds for each overlay fade (out, then in).
    pub fade_duration_s: f64,
    /// Persist the active workspace after each transition and restore
    /// it at start.
    pub persist: bool,
}

impl Default for WorkspaceSwitcherConfig {
    fn default() -> Self {
        Self {
            workspaces: WorkspaceKind::ALL
                .iter()
                .map(|kind| WorkspaceConfig::new(*kind, kind.as_str()))
                .collect(),
            fade_duration_s: 0.5,
            persist: true,
        }
    }
}

// ── Transition phase ────────────────────────────────────────

/// Which overlay fade a progress value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    Out,
    In,
}

impl FadeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Out => "fade-out",
            Self::In => "fade-in",
        }
    }
}

/// Transition state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionPhase {
    Idle,
    FadingOut {
        target: WorkspaceKind,
        timer: FadeTimer,
    },
    Switching {
        target: WorkspaceKind,
    },
    FadingIn {
        target: WorkspaceKind,
        timer: FadeTimer,
        panels: FadeTimer,
    },
    Persisting {
        target: WorkspaceKind,
    },
}

impl TransitionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FadingOut { .. } => "fading-out",
            Self::Switching { .. } => "switching",
            Self::FadingIn { .. } => "fading-in",
            Self::Persisting { .. } => "persisting",
        }
    }

    pub fn target(&self) -> Option<WorkspaceKind> {
        match self {
            Self::Idle => None,
            Self::FadingOut { target, .. }
            | Self::Switching { target }
            | Self::FadingIn { target, .. }
            | Self::Persisting { target } => Some(*target),
        }
    }
}

// ── Events ──────────────────────────────────────────────────

/// Notifications emitted by the switcher.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkspaceEvent {
    /// A transition towards `target` has begun.
    Changing { target: WorkspaceKind },
    /// Fade progress in [0, 1], non-decreasing within a direction.
    Progress { direction: FadeDirection, value: f32 },
    /// The transition finished and `target` is active.
    Changed { target: WorkspaceKind },
}

impl WorkspaceEvent {
    pub fn to_sexp(&self) -> String {
        match self {
            Self::Changing { target } => format!(
                "(:type :event :event :workspace-changing :workspace :{})",
                target.as_str()
            ),
            Self::Progress { direction, value } => format!(
                "(:type :event :event :workspace-progress :phase :{} :value {:.3})",
                direction.as_str(),
                value
            ),
            Self::Changed { target } => format!(
                "(:type :event :event :workspace-changed :workspace :{})",
                target.as_str()
            ),
        }
    }
}

// ── Controller ──────────────────────────────────────────────

/// Owns the workspace instances and runs transitions between them.
pub struct WorkspaceController<S: SceneGraph, K: SettingsStore> {
    scene: S,
    store: K,
    config: WorkspaceSwitcherConfig,
    configs: HashMap<WorkspaceKind, WorkspaceConfig>,
    instances: HashMap<WorkspaceKind, NodeId>,
    overlay: Option<NodeId>,
    active: WorkspaceKind,
    phase: TransitionPhase,
    started: bool,
    events: Vec<WorkspaceEvent>,
}

impl<S: SceneGraph, K: SettingsStore> WorkspaceController<S, K> {
    pub fn new(scene: S, store: K, config: WorkspaceSwitcherConfig) -> Self {
        let mut configs = HashMap::new();
        for entry in &config.workspaces {
            configs.insert(entry.kind, entry.clone());
        }
        Self {
            scene,
            store,
            config,
            configs,
            instances: HashMap::new(),
            overlay: None,
            active: WorkspaceKind::Home,
            phase: TransitionPhase::Idle,
            started: false,
            events: Vec::new(),
        }
    }

    pub fn current_workspace(&self) -> WorkspaceKind {
        self.active
    }

    pub fn is_transitioning(&self) -> bool {
        self.phase != TransitionPhase::Idle
    }

    pub fn phase(&self) -> &TransitionPhase {
        &self.phase
    }

    pub fn instance(&self, kind: WorkspaceKind) -> Option<NodeId> {
        self.instances.get(&kind).copied()
    }

    #[cfg(test)]
    pub fn scene(&self) -> &S {
        &self.scene
    }

    #[cfg(test)]
    pub fn store(&self) -> &K {
        &self.store
    }

    /// Drain pending notifications.
    pub fn take_events(&mut self) -> Vec<WorkspaceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn set_fade_duration(&mut self, fade_duration_s: f64) {
        self.config.fade_duration_s = fade_duration_s;
        info!("Workspace fade duration set to {:.0}ms", fade_duration_s * 1000.0);
    }

    /// Change the easing and/or duration override used for transitions
    /// into `kind`. `Some(None)` clears the override.
    pub fn configure_workspace(
        &mut self,
        kind: WorkspaceKind,
        easing: Option<Easing>,
        transition_duration_s: Option<Option<f64>>,
    ) {
        let entry = self.configs.entry(kind).or_insert_with(|| WorkspaceConfig {
            kind,
            prefab: None,
            transition_duration_s: None,
            easing: Easing::default(),
        });
        if let Some(easing) = easing {
            entry.easing = easing;
        }
        if let Some(duration) = transition_duration_s {
            entry.transition_duration_s = duration;
        }
        info!(
            workspace = kind.as_str(),
            easing = entry.easing.as_str(),
            transition_s = ?entry.transition_duration_s,
            "Workspace transition configured"
        );
    }

    /// Begin a transition to `target`. Ignored when `target` is already
    /// active, a transition is in flight, or the controller has not
    /// started. Returns whether a transition began.
    pub fn show_workspace(&mut self, target: WorkspaceKind) -> bool {
        if !self.started {
            warn!(target = target.as_str(), "workspace switch before start, ignoring");
            return false;
        }
        if target == self.active || self.is_transitioning() {
            debug!(
                target = target.as_str(),
                phase = self.phase.as_str(),
                "workspace switch ignored"
            );
            return false;
        }

        info!("Workspace transition: {} -> {}", self.active.as_str(), target.as_str());
        self.events.push(WorkspaceEvent::Changing { target });
        self.phase = TransitionPhase::FadingOut {
            target,
            timer: FadeTimer::new(self.fade_duration_for(target)),
        };
        // Zero-time step: emits the initial progress, and runs a
        // zero-duration transition to completion.
        self.advance(0.0);
        true
    }

    pub fn next_workspace(&mut self) -> bool {
        self.show_workspace(self.active.next())
    }

    pub fn previous_workspace(&mut self) -> bool {
        self.show_workspace(self.active.previous())
    }

    fn fade_duration_for(&self, kind: WorkspaceKind) -> f64 {
        self.configs
            .get(&kind)
            .and_then(|c| c.transition_duration_s)
            .unwrap_or(self.config.fade_duration_s)
    }

    fn easing_for(&self, kind: WorkspaceKind) -> Easing {
        self.configs.get(&kind).map(|c| c.easing).unwrap_or_default()
    }

    fn set_overlay_alpha(&mut self, alpha: f32) {
        if let Some(overlay) = self.overlay {
            self.scene.set_overlay_alpha(overlay, alpha);
        }
    }

    fn set_panels_alpha(&mut self, kind: WorkspaceKind, alpha: f32) {
        if let Some(root) = self.instance(kind) {
            for panel in self.scene.ui_panels(root) {
                self.scene.set_panel_alpha(panel, alpha);
            }
        }
    }

    /// Hide the current instance, show the target, start its enter
    /// animation and reset its panels to transparent.
    fn swap_instances(&mut self, target: WorkspaceKind) {
        if let Some(current) = self.instance(self.active) {
            self.scene.set_active(current, false);
        }
        if let Some(next) = self.instance(target) {
            self.scene.set_active(next, true);
            if !self.scene.play_enter_animation(next) {
                debug!(workspace = target.as_str(), "no enter animation");
            }
        } else {
            debug!(workspace = target.as_str(), "no instance to activate");
        }
        self.set_panels_alpha(target, 0.0);
    }

    fn persist(&mut self, kind: WorkspaceKind) {
        if !self.config.persist {
            return;
        }
        if let Err(e) = self.store.set_int(ACTIVE_WORKSPACE_KEY, kind.id()) {
            warn!("failed to persist active workspace: {:#}", e);
        }
    }

    /// Step the transition by `dt_s`. Time is consumed by the first
    /// timed phase this frame; untimed phases and finished fades fall
    /// through to the next phase within the same call.
    fn advance(&mut self, dt_s: f64) {
        let mut dt_s = dt_s;
        loop {
            let phase = std::mem::replace(&mut self.phase, TransitionPhase::Idle);
            self.phase = match phase {
                TransitionPhase::Idle => return,

                TransitionPhase::FadingOut { target, mut timer } => {
                    timer.advance(dt_s);
                    dt_s = 0.0;
                    let alpha = self.easing_for(target).apply(timer.progress());
                    self.set_overlay_alpha(alpha);
                    self.events.push(WorkspaceEvent::Progress {
                        direction: FadeDirection::Out,
                        value: alpha,
                    });
                    if !timer.is_finished() {
                        self.phase = TransitionPhase::FadingOut { target, timer };
                        return;
                    }
                    TransitionPhase::Switching { target }
                }

                TransitionPhase::Switching { target } => {
                    self.swap_instances(target);
                    let duration_s = self.fade_duration_for(target);
                    TransitionPhase::FadingIn {
                        target,
                        timer: FadeTimer::new(duration_s),
                        panels: FadeTimer::new(duration_s / 2.0),
                    }
                }

                TransitionPhase::FadingIn {
                    target,
                    mut timer,
                    mut panels,
                } => {
                    timer.advance(dt_s);
                    panels.advance(dt_s);
                    dt_s = 0.0;
                    let revealed = self.easing_for(target).apply(timer.progress());
                    self.set_overlay_alpha(1.0 - revealed);
                    self.set_panels_alpha(target, panels.progress());
                    self.events.push(WorkspaceEvent::Progress {
                        direction: FadeDirection::In,
                        value: revealed,
                    });
                    if !(timer.is_finished() && panels.is_finished()) {
                        self.phase = TransitionPhase::FadingIn {
                            target,
                            timer,
                            panels,
                        };
                        return;
                    }
                    TransitionPhase::Persisting { target }
                }

                TransitionPhase::Persisting { target } => {
                    self.active = target;
                    self.persist(target);
                    info!("Workspace active: {}", target.as_str());
                    self.events.push(WorkspaceEvent::Changed { target });
                    TransitionPhase::Idle
                }
            };
        }
    }

    /// Log and return a snapshot of the switcher state.
    pub fn debug_dump(&self) -> String {
        let dump = self.status_sexp();
        info!("Workspace switcher state: {}", dump);
        dump
    }

    pub fn status_sexp(&self) -> String {
        let mut instances = String::from("(");
        for kind in WorkspaceKind::ALL {
            let (node, visible) = match self.instance(kind) {
                Some(node) => (node.to_string(), self.scene.is_active(node)),
                None => ("nil".to_string(), false),
            };
            let transition_ms = self
                .configs
                .get(&kind)
                .and_then(|c| c.transition_duration_s)
                .map(|s| format!("{:.0}", s * 1000.0))
                .unwrap_or_else(|| "nil".to_string());
            instances.push_str(&format!(
                "(:workspace :{} :node {} :visible {} :easing :{} :transition-ms {})",
                kind.as_str(),
                node,
                bool_sexp(visible),
                self.easing_for(kind).as_str(),
                transition_ms
            ));
        }
        instances.push(')');
        let target = self
            .phase
            .target()
            .map(|t| format!(":{}", t.as_str()))
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:active :{} :in-transition {} :phase :{} :target {} :overlay {} :persist {} :fade-ms {:.0} :instances {})",
            self.active.as_str(),
            bool_sexp(self.is_transitioning()),
            self.phase.as_str(),
            target,
            bool_sexp(self.overlay.is_some()),
            bool_sexp(self.config.persist),
            self.config.fade_duration_s * 1000.0,
            instances,
        )
    }
}

impl<S: SceneGraph, K: SettingsStore> FrameDriven for WorkspaceController<S, K> {
    fn on_start(&mut self) {
        if self.started {
            return;
        }

        for kind in WorkspaceKind::ALL {
            let Some(prefab) = self.configs.get(&kind).and_then(|c| c.prefab.clone()) else {
                debug!(workspace = kind.as_str(), "no prefab configured, skipping");
                continue;
            };
            match self.scene.instantiate_hidden(&prefab) {
                Some(node) => {
                    self.scene.set_active(node, false);
                    self.instances.insert(kind, node);
                }
                None => debug!(workspace = kind.as_str(), prefab = %prefab, "prefab unavailable, skipping"),
            }
        }

        self.overlay = self.scene.create_overlay();
        match self.overlay {
            Some(_) => self.set_overlay_alpha(0.0),
            None => warn!("no fade overlay available; transitions will cut"),
        }

        self.active = if self.config.persist {
            self.store
                .get_int(ACTIVE_WORKSPACE_KEY)
                .and_then(WorkspaceKind::from_id)
                .unwrap_or_default()
        } else {
            WorkspaceKind::default()
        };

        if let Some(node) = self.instance(self.active) {
            self.scene.set_active(node, true);
        }
        self.set_panels_alpha(self.active, 1.0);
        self.started = true;

        info!(
            "Workspace switcher started: {} instance(s), active {}",
            self.instances.len(),
            self.active.as_str()
        );
    }

    fn on_frame(&mut self, dt_s: f64) {
        self.advance(dt_s);
    }
}

// ── Tests ───────────────────────────────────────────────────
