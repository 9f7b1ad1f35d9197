//! Gaze selection: dwell-to-click pointer.
//!
//! Each frame the selector casts a ray from the head pose, accumulates
//! dwell time on whatever it hits, and clicks the object once the dwell
//! threshold is reached and the click cooldown has passed. Losing the
//! target decays dwell at twice real time instead of dropping it, which
//! smooths over single-frame ray misses.

use tracing::{debug, info, warn};

use super::scene::{Color, NodeId, PointerDelivery, Pose, SpatialQuery};
use super::FrameDriven;
use crate::sexp::bool_sexp;

/// Dwell decay rate while no target is hit, relative to real time.
const DWELL_DECAY_RATE: f64 = 2.0;

/// Cursor growth at full dwell progress (fraction of base scale).
const CURSOR_GROWTH: f32 = 0.5;

// ── Config ──────────────────────────────────────────────────

/// Gaze selector tuning.
#[derive(Debug, Clone)]
pub struct GazeSelectConfig {
    /// Maximum ray length in metres.
    pub gaze_distance: f32,
    /// Layer bits the ray may hit.
    pub layer_mask: u32,
    /// Seconds of steady gaze before a click.
    pub dwell_threshold_s: f64,
    /// Minimum seconds between two clicks.
    pub click_cooldown_s: f64,
    pub inactive_color: Color,
    pub active_color: Color,
    pub cursor_base_scale: f32,
}

impl Default for GazeSelectConfig {
    fn default() -> Self {
        Self {
            gaze_distance: 10.0,
            layer_mask: u32::MAX,
            dwell_threshold_s: 2.0,
            click_cooldown_s: 0.5,
            inactive_color: Color::WHITE,
            active_color: Color::GREEN,
            cursor_base_scale: 1.0,
        }
    }
}

// ── Cursor ──────────────────────────────────────────────────

/// Visual state the host applies to the gaze cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorFeedback {
    pub visible: bool,
    pub color: Color,
    pub scale: f32,
}

impl CursorFeedback {
    fn hidden(config: &GazeSelectConfig) -> Self {
        Self {
            visible: false,
            color: config.inactive_color,
            scale: config.cursor_base_scale,
        }
    }
}

// ── Click route ─────────────────────────────────────────────

/// How a click reached its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickRoute {
    /// UI pointer-click handler accepted it.
    Ui,
    /// Direct gaze-click notification to the object.
    Fallback,
}

impl ClickRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ui => "ui",
            Self::Fallback => "fallback",
        }
    }
}

// ── Events ──────────────────────────────────────────────────

/// Events emitted by the gaze selector.
#[derive(Debug, Clone, PartialEq)]
pub enum GazeEvent {
    TargetAcquired { node: NodeId },
    TargetLost { node: NodeId },
    Clicked { node: NodeId, route: ClickRoute },
}

impl GazeEvent {
    pub fn to_sexp(&self) -> String {
        match self {
            Self::TargetAcquired { node } => {
                format!("(:type :event :event :gaze-target-acquired :node {})", node)
            }
            Self::TargetLost { node } => {
                format!("(:type :event :event :gaze-target-lost :node {})", node)
            }
            Self::Clicked { node, route } => format!(
                "(:type :event :event :gaze-click :node {} :route :{})",
                node,
                route.as_str()
            ),
        }
    }
}

// ── Analytics ───────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct GazeAnalytics {
    pub ui_clicks: u64,
    pub fallback_clicks: u64,
    pub target_switches: u64,
    /// Frames where dwell was past threshold but the cooldown held.
    pub cooldown_blocks: u64,
}

impl GazeAnalytics {
    pub fn clicks(&self) -> u64 {
        self.ui_clicks + self.fallback_clicks
    }

    pub fn status_sexp(&self) -> String {
        format!(
            "(:clicks {} :ui-clicks {} :fallback-clicks {} :target-switches {} :cooldown-blocks {})",
            self.clicks(),
            self.ui_clicks,
            self.fallback_clicks,
            self.target_switches,
            self.cooldown_blocks,
        )
    }
}

// ── Selector ────────────────────────────────────────────────

/// Dwell-to-click gaze pointer.
pub struct GazeSelector<Q: SpatialQuery, D: PointerDelivery> {
    query: Q,
    delivery: D,
    pub config: GazeSelectConfig,
    pose: Option<Pose>,
    target: Option<NodeId>,
    dwell_s: f64,
    now_s: f64,
    last_click_s: Option<f64>,
    cursor: CursorFeedback,
    pub analytics: GazeAnalytics,
    events: Vec<GazeEvent>,
}

impl<Q: SpatialQuery, D: PointerDelivery> GazeSelector<Q, D> {
    pub fn new(query: Q, delivery: D, config: GazeSelectConfig) -> Self {
        let cursor = CursorFeedback::hidden(&config);
        Self {
            query,
            delivery,
            config,
            pose: None,
            target: None,
            dwell_s: 0.0,
            now_s: 0.0,
            last_click_s: None,
            cursor,
            analytics: GazeAnalytics::default(),
            events: Vec::new(),
        }
    }

    /// Update the gaze origin. Called by the host before each frame.
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = Some(pose);
    }

    #[cfg(test)]
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    #[cfg(test)]
    pub fn dwell_s(&self) -> f64 {
        self.dwell_s
    }

    #[cfg(test)]
    pub fn cursor(&self) -> CursorFeedback {
        self.cursor
    }

    #[cfg(test)]
    pub fn delivery(&self) -> &D {
        &self.delivery
    }

    /// Dwell progress towards a click, clamped to [0, 1].
    pub fn progress(&self) -> f32 {
        if self.config.dwell_threshold_s <= 0.0 {
            return 1.0;
        }
        (self.dwell_s / self.config.dwell_threshold_s).clamp(0.0, 1.0) as f32
    }

    pub fn take_events(&mut self) -> Vec<GazeEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn set_dwell_threshold(&mut self, threshold_s: f64) {
        self.config.dwell_threshold_s = threshold_s;
        info!("Gaze dwell threshold set to {:.0}ms", threshold_s * 1000.0);
    }

    pub fn set_click_cooldown(&mut self, cooldown_s: f64) {
        self.config.click_cooldown_s = cooldown_s;
        info!("Gaze click cooldown set to {:.0}ms", cooldown_s * 1000.0);
    }

    pub fn set_gaze_distance(&mut self, distance: f32) {
        self.config.gaze_distance = distance;
        info!("Gaze distance set to {:.1}m", distance);
    }

    pub fn set_layer_mask(&mut self, mask: u32) {
        self.config.layer_mask = mask;
        info!("Gaze layer mask set to {:#x}", mask);
    }

    fn cooldown_elapsed(&self) -> bool {
        match self.last_click_s {
            Some(last) => self.now_s - last >= self.config.click_cooldown_s,
            None => true,
        }
    }

    fn cast(&self) -> Option<NodeId> {
        let pose = self.pose?;
        self.query
            .raycast(&pose.ray(), self.config.gaze_distance, self.config.layer_mask)
            .map(|hit| hit.node)
    }

    /// UI pointer path first, then the direct gaze-click fallback.
    fn click(&mut self, node: NodeId) {
        let route = if self.delivery.ui_pointer_click(node) {
            self.analytics.ui_clicks += 1;
            ClickRoute::Ui
        } else {
            self.delivery.gaze_click(node);
            self.analytics.fallback_clicks += 1;
            ClickRoute::Fallback
        };
        info!(node, route = route.as_str(), dwell_s = self.dwell_s, "Gaze click");
        self.last_click_s = Some(self.now_s);
        self.dwell_s = 0.0;
        self.events.push(GazeEvent::Clicked { node, route });
    }

    fn update_cursor(&mut self) {
        self.cursor = if self.target.is_none() {
            CursorFeedback::hidden(&self.config)
        } else {
            let progress = self.progress();
            CursorFeedback {
                visible: true,
                color: self
                    .config
                    .inactive_color
                    .lerp(self.config.active_color, progress),
                scale: self.config.cursor_base_scale * (1.0 + CURSOR_GROWTH * progress),
            }
        };
    }

    pub fn config_sexp(&self) -> String {
        format!(
            "(:distance {:.1} :layer-mask {} :dwell-threshold-ms {:.0} :cooldown-ms {:.0} :inactive-color {} :active-color {} :base-scale {:.2})",
            self.config.gaze_distance,
            self.config.layer_mask,
            self.config.dwell_threshold_s * 1000.0,
            self.config.click_cooldown_s * 1000.0,
            self.config.inactive_color.to_sexp(),
            self.config.active_color.to_sexp(),
            self.config.cursor_base_scale,
        )
    }

    pub fn status_sexp(&self) -> String {
        let target = self
            .target
            .map(|id| id.to_string())
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:target {} :dwell-ms {:.0} :progress {:.2} :cooldown {} :cursor-visible {} :cursor-scale {:.2} :pose {} :analytics {})",
            target,
            self.dwell_s * 1000.0,
            self.progress(),
            bool_sexp(!self.cooldown_elapsed()),
            bool_sexp(self.cursor.visible),
            self.cursor.scale,
            bool_sexp(self.pose.is_some()),
            self.analytics.status_sexp(),
        )
    }
}

impl<Q: SpatialQuery, D: PointerDelivery> FrameDriven for GazeSelector<Q, D> {
    fn on_start(&mut self) {
        if self.pose.is_none() {
            warn!("gaze selector has no pose source; ray casts skipped until one is set");
        }
        self.update_cursor();
        info!(
            "Gaze selector started (dwell {:.0}ms, cooldown {:.0}ms, distance {:.1}m)",
            self.config.dwell_threshold_s * 1000.0,
            self.config.click_cooldown_s * 1000.0,
            self.config.gaze_distance
        );
    }

    fn on_frame(&mut self, dt_s: f64) {
        let dt_s = dt_s.max(0.0);
        self.now_s += dt_s;

        match self.cast() {
            Some(node) => {
                if self.target != Some(node) {
                    debug!(node, previous = ?self.target, "gaze target acquired");
                    self.target = Some(node);
                    self.dwell_s = 0.0;
                    self.analytics.target_switches += 1;
                    self.events.push(GazeEvent::TargetAcquired { node });
                }
                self.dwell_s += dt_s;

                if self.dwell_s >= self.config.dwell_threshold_s {
                    if self.cooldown_elapsed() {
                        self.click(node);
                    } else {
                        self.analytics.cooldown_blocks += 1;
                    }
                }
            }
            None => {
                if let Some(node) = self.target.take() {
                    debug!(node, "gaze target lost");
                    self.events.push(GazeEvent::TargetLost { node });
                }
                self.dwell_s = (self.dwell_s - dt_s * DWELL_DECAY_RATE).max(0.0);
            }
        }

        self.update_cursor();
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vr::scene::{Ray, RayHit, Vec3};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Ray query returning whatever node the test points at.
    #[derive(Clone, Default)]
    struct FakeQuery {
        hit: Rc<Cell<Option<NodeId>>>,
        last_mask: Rc<Cell<u32>>,
    }

    impl SpatialQuery for FakeQuery {
        fn raycast(&self, ray: &Ray, _max_distance: f32, layer_mask: u32) -> Option<RayHit> {
            self.last_mask.set(layer_mask);
            self.hit.get().map(|node| RayHit {
                node,
                distance: 2.0,
                point: ray.at(2.0),
            })
        }
    }

    #[derive(Default)]
    struct FakeDelivery {
        ui_nodes: Vec<NodeId>,
        ui_clicks: RefCell<Vec<NodeId>>,
        gaze_clicks: Vec<NodeId>,
    }

    impl PointerDelivery for FakeDelivery {
        fn ui_pointer_click(&mut self, node: NodeId) -> bool {
            if self.ui_nodes.contains(&node) {
                self.ui_clicks.borrow_mut().push(node);
                true
            } else {
                false
            }
        }

        fn gaze_click(&mut self, node: NodeId) {
            self.gaze_clicks.push(node);
        }
    }

    // dt values are powers of two so dwell sums stay exact.
    const DT: f64 = 0.125;

    fn selector(threshold_s: f64, cooldown_s: f64) -> (GazeSelector<FakeQuery, FakeDelivery>, FakeQuery) {
        let query = FakeQuery::default();
        let config = GazeSelectConfig {
            dwell_threshold_s: threshold_s,
            click_cooldown_s: cooldown_s,
            ..Default::default()
        };
        let mut sel = GazeSelector::new(query.clone(), FakeDelivery::default(), config);
        sel.set_pose(Pose::new(Vec3::ZERO, Vec3::FORWARD));
        sel.on_start();
        (sel, query)
    }

    fn run(sel: &mut GazeSelector<FakeQuery, FakeDelivery>, frames: usize) -> Vec<GazeEvent> {
        let mut events = Vec::new();
        for _ in 0..frames {
            sel.on_frame(DT);
            events.extend(sel.take_events());
        }
        events
    }

    fn clicks(events: &[GazeEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, GazeEvent::Clicked { .. }))
            .count()
    }

    #[test]
    fn test_dwell_triggers_single_click() {
        let (mut sel, query) = selector(1.0, 0.5);
        query.hit.set(Some(7));

        let events = run(&mut sel, 7);
        assert_eq!(clicks(&events), 0, "no click before threshold");
        assert_eq!(sel.dwell_s(), 0.875);

        let events = run(&mut sel, 1);
        assert_eq!(
            events,
            vec![GazeEvent::Clicked { node: 7, route: ClickRoute::Fallback }]
        );
        assert_eq!(sel.dwell_s(), 0.0, "dwell resets after click");
        assert_eq!(sel.delivery().gaze_clicks, vec![7]);
    }

    #[test]
    fn test_cooldown_blocks_second_click() {
        // Cooldown longer than the threshold: dwell refills before the
        // cooldown expires.
        let (mut sel, query) = selector(0.5, 2.0);
        query.hit.set(Some(3));

        // 1.5s: first click at 0.5s, dwell back above threshold by 1.0s.
        let events = run(&mut sel, 12);
        assert_eq!(clicks(&events), 1);
        assert!(sel.dwell_s() >= 0.5);
        assert!(sel.analytics.cooldown_blocks > 0);
        assert_eq!(sel.progress(), 1.0, "progress clamped while blocked");

        // Cooldown ends at 2.5s; second click fires then.
        let events = run(&mut sel, 8);
        assert_eq!(clicks(&events), 1);
        assert_eq!(sel.analytics.clicks(), 2);
    }

    #[test]
    fn test_cooldown_is_per_component() {
        let (mut sel, query) = selector(0.25, 1.0);
        query.hit.set(Some(1));
        let events = run(&mut sel, 2);
        assert_eq!(clicks(&events), 1);

        // A fresh target still waits out the shared cooldown.
        query.hit.set(Some(2));
        let events = run(&mut sel, 4);
        assert_eq!(clicks(&events), 0);
        let events = run(&mut sel, 4);
        assert_eq!(clicks(&events), 1);
    }

    #[test]
    fn test_retarget_resets_dwell() {
        let (mut sel, query) = selector(1.0, 0.5);
        query.hit.set(Some(1));
        run(&mut sel, 6);
        assert_eq!(sel.dwell_s(), 0.75);

        query.hit.set(Some(2));
        let events = run(&mut sel, 1);
        assert_eq!(events, vec![GazeEvent::TargetAcquired { node: 2 }]);
        assert_eq!(sel.target(), Some(2));
        assert_eq!(sel.dwell_s(), DT, "new target starts from zero");
        assert_eq!(sel.analytics.target_switches, 2);
    }

    #[test]
    fn test_gaze_loss_decays_dwell() {
        let (mut sel, query) = selector(2.0, 0.5);
        query.hit.set(Some(4));
        run(&mut sel, 4);
        assert_eq!(sel.dwell_s(), 0.5);

        query.hit.set(None);
        let events = run(&mut sel, 1);
        assert_eq!(events, vec![GazeEvent::TargetLost { node: 4 }]);
        assert_eq!(sel.target(), None);
        assert_eq!(sel.dwell_s(), 0.25, "decays at twice real time");

        // 0.5 / 2 = 0.25s of no target reaches zero.
        run(&mut sel, 1);
        assert_eq!(sel.dwell_s(), 0.0);
        run(&mut sel, 3);
        assert_eq!(sel.dwell_s(), 0.0, "floored at zero");
    }

    #[test]
    fn test_ui_route_preferred() {
        let query = FakeQuery::default();
        let delivery = FakeDelivery {
            ui_nodes: vec![9],
            ..Default::default()
        };
        let config = GazeSelectConfig {
            dwell_threshold_s: 0.25,
            ..Default::default()
        };
        let mut sel = GazeSelector::new(query.clone(), delivery, config);
        sel.set_pose(Pose::new(Vec3::ZERO, Vec3::FORWARD));
        sel.on_start();
        query.hit.set(Some(9));

        let events = run(&mut sel, 2);
        assert_eq!(events.last(), Some(&GazeEvent::Clicked { node: 9, route: ClickRoute::Ui }));
        assert_eq!(*sel.delivery().ui_clicks.borrow(), vec![9]);
        assert!(sel.delivery().gaze_clicks.is_empty());
        assert_eq!(sel.analytics.ui_clicks, 1);
    }

    #[test]
    fn test_cursor_feedback() {
        let (mut sel, query) = selector(1.0, 0.5);
        assert!(!sel.cursor().visible);

        query.hit.set(Some(5));
        run(&mut sel, 4);
        let cursor = sel.cursor();
        assert!(cursor.visible);
        assert!((cursor.scale - 1.25).abs() < 1e-6);
        assert!((cursor.color.r - 0.5).abs() < 1e-6);
        assert_eq!(cursor.color.g, 1.0);

        query.hit.set(None);
        run(&mut sel, 1);
        assert!(!sel.cursor().visible);
        assert_eq!(sel.cursor().scale, 1.0);
    }

    #[test]
    fn test_no_pose_behaves_as_miss() {
        let query = FakeQuery::default();
        query.hit.set(Some(1));
        let mut sel = GazeSelector::new(query, FakeDelivery::default(), GazeSelectConfig::default());
        sel.on_start();
        let events = run(&mut sel, 10);
        assert!(events.is_empty());
        assert_eq!(sel.target(), None);
    }

    #[test]
    fn test_layer_mask_forwarded() {
        let (mut sel, query) = selector(1.0, 0.5);
        sel.set_layer_mask(0b100);
        run(&mut sel, 1);
        assert_eq!(query.last_mask.get(), 0b100);
    }

    #[test]
    fn test_zero_threshold_clicks_on_first_hit() {
        let (mut sel, query) = selector(0.0, 10.0);
        query.hit.set(Some(2));
        let events = run(&mut sel, 1);
        assert_eq!(clicks(&events), 1);
        assert_eq!(sel.progress(), 1.0);
    }

    #[test]
    fn test_status_sexp_parseable() {
        let (mut sel, query) = selector(1.0, 0.5);
        query.hit.set(Some(11));
        run(&mut sel, 2);
        let v = lexpr::from_str(&sel.status_sexp()).unwrap();
        assert_eq!(crate::sexp::get_int(&v, "target"), Some(11));
        assert_eq!(crate::sexp::get_keyword(&v, "cursor-visible"), Some("t".to_string()));
        assert!(lexpr::from_str(&sel.config_sexp()).is_ok());
    }
}
