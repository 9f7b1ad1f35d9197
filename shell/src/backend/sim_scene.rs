//! Simulated scene for the headless backend.
//!
//! Holds a flat node table with parent links, box colliders on a layer,
//! and a small prefab catalogue: each workspace prefab is a root with
//! two UI panels and one gaze-clickable box in front of the viewer.
//! Implements every host port so both components can run without a
//! renderer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, info};

use crate::vr::scene::{
    NodeId, PointerDelivery, Ray, RayHit, SceneGraph, SpatialQuery, Vec3,
};

/// Layer assigned to gaze targets in prefabs.
pub const INTERACTABLE_LAYER: u32 = 8;

/// Default head pose height (metres).
pub const EYE_HEIGHT: f32 = 1.6;

/// Axis-aligned box collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn around(center: Vec3, half: Vec3) -> Self {
        Self {
            min: center.sub(half),
            max: center.add(half),
        }
    }

    /// Slab test. Returns entry distance along `ray`, or `None`.
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        let origin = [ray.origin.x, ray.origin.y, ray.origin.z];
        let dir = [ray.direction.x, ray.direction.y, ray.direction.z];
        let min = [self.min.x, self.min.y, self.min.z];
        let max = [self.max.x, self.max.y, self.max.z];

        let mut t_near = f32::NEG_INFINITY;
        let mut t_far = f32::INFINITY;
        for axis in 0..3 {
            if dir[axis].abs() < f32::EPSILON {
                if origin[axis] < min[axis] || origin[axis] > max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir[axis];
            let mut t0 = (min[axis] - origin[axis]) * inv;
            let mut t1 = (max[axis] - origin[axis]) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_near = t_near.max(t0);
            t_far = t_far.min(t1);
            if t_near > t_far {
                return None;
            }
        }
        if t_far < 0.0 {
            return None;
        }
        Some(t_near.max(0.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    WorkspaceRoot,
    Panel,
    Target,
    Overlay,
}

#[derive(Debug, Clone)]
pub struct SimNode {
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub active: bool,
    pub alpha: f32,
    pub collider: Option<Aabb>,
    pub layer: u32,
    /// Registered for UI pointer-click.
    pub ui_clickable: bool,
    pub has_enter_animation: bool,
    pub clicks: u64,
}

impl SimNode {
    fn new(name: &str, kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            parent,
            active: true,
            alpha: 1.0,
            collider: None,
            layer: 0,
            ui_clickable: false,
            has_enter_animation: false,
            clicks: 0,
        }
    }
}

/// Prefab description: where the clickable box sits and how it reacts.
#[derive(Debug, Clone)]
pub struct Prefab {
    pub target_center: Vec3,
    pub ui_clickable: bool,
    pub enter_animation: bool,
}

/// In-memory scene graph.
#[derive(Debug, Default)]
pub struct SimScene {
    pub nodes: HashMap<NodeId, SimNode>,
    prefabs: HashMap<String, Prefab>,
    next_id: NodeId,
    pub animations_played: u64,
}

impl SimScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scene with the stock `home`, `work` and `entertainment` prefabs.
    pub fn with_default_prefabs() -> Self {
        let mut scene = Self::new();
        let ahead = Vec3::new(0.0, EYE_HEIGHT, -3.0);
        scene.register_prefab(
            "home",
            Prefab {
                target_center: ahead,
                ui_clickable: false,
                enter_animation: true,
            },
        );
        scene.register_prefab(
            "work",
            Prefab {
                target_center: ahead,
                ui_clickable: true,
                enter_animation: true,
            },
        );
        scene.register_prefab(
            "entertainment",
            Prefab {
                target_center: Vec3::new(0.5, EYE_HEIGHT, -4.0),
                ui_clickable: false,
                enter_animation: false,
            },
        );
        scene
    }

    pub fn register_prefab(&mut self, name: &str, prefab: Prefab) {
        self.prefabs.insert(name.to_string(), prefab);
    }

    fn add_node(&mut self, node: SimNode) -> NodeId {
        self.next_id += 1;
        self.nodes.insert(self.next_id, node);
        self.next_id
    }

    /// A node is visible when it and every ancestor are active.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            match self.nodes.get(&cur) {
                Some(node) if node.active => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    pub fn children(&self, parent: NodeId) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == Some(parent))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn clicks_on(&self, id: NodeId) -> u64 {
        self.nodes.get(&id).map(|n| n.clicks).unwrap_or(0)
    }
}

impl SceneGraph for SimScene {
    fn instantiate_hidden(&mut self, prefab: &str) -> Option<NodeId> {
        let layout = self.prefabs.get(prefab)?.clone();

        let mut root = SimNode::new(prefab, NodeKind::WorkspaceRoot, None);
        root.active = false;
        root.has_enter_animation = layout.enter_animation;
        let root_id = self.add_node(root);

        for i in 0..2 {
            let name = format!("{}/panel-{}", prefab, i);
            self.add_node(SimNode::new(&name, NodeKind::Panel, Some(root_id)));
        }

        let mut target = SimNode::new(&format!("{}/target", prefab), NodeKind::Target, Some(root_id));
        target.collider = Some(Aabb::around(layout.target_center, Vec3::new(0.5, 0.5, 0.1)));
        target.layer = INTERACTABLE_LAYER;
        target.ui_clickable = layout.ui_clickable;
        self.add_node(target);

        debug!(prefab, root = root_id, "prefab instantiated");
        Some(root_id)
    }

    fn set_active(&mut self, node: NodeId, active: bool) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.active = active;
        }
    }

    fn is_active(&self, node: NodeId) -> bool {
        self.nodes.get(&node).map(|n| n.active).unwrap_or(false)
    }

    fn play_enter_animation(&mut self, node: NodeId) -> bool {
        match self.nodes.get(&node) {
            Some(n) if n.has_enter_animation => {
                self.animations_played += 1;
                debug!(node, name = %n.name, "enter animation");
                true
            }
            _ => false,
        }
    }

    fn ui_panels(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .into_iter()
            .filter(|id| self.nodes[id].kind == NodeKind::Panel)
            .collect()
    }

    fn set_panel_alpha(&mut self, panel: NodeId, alpha: f32) {
        if let Some(n) = self.nodes.get_mut(&panel) {
            n.alpha = alpha;
        }
    }

    fn create_overlay(&mut self) -> Option<NodeId> {
        let mut overlay = SimNode::new("fade-overlay", NodeKind::Overlay, None);
        overlay.alpha = 0.0;
        Some(self.add_node(overlay))
    }

    fn set_overlay_alpha(&mut self, overlay: NodeId, alpha: f32) {
        if let Some(n) = self.nodes.get_mut(&overlay) {
            n.alpha = alpha;
        }
    }
}

impl SpatialQuery for SimScene {
    fn raycast(&self, ray: &Ray, max_distance: f32, layer_mask: u32) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        for (id, node) in &self.nodes {
            let Some(collider) = node.collider else {
                continue;
            };
            if layer_mask & (1u32 << node.layer.min(31)) == 0 || !self.is_visible(*id) {
                continue;
            }
            let Some(distance) = collider.intersect(ray) else {
                continue;
            };
            if distance > max_distance {
                continue;
            }
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(RayHit {
                    node: *id,
                    distance,
                    point: ray.at(distance),
                });
            }
        }
        best
    }
}

impl PointerDelivery for SimScene {
    fn ui_pointer_click(&mut self, node: NodeId) -> bool {
        match self.nodes.get_mut(&node) {
            Some(n) if n.ui_clickable => {
                n.clicks += 1;
                info!(node, name = %n.name, "UI pointer click");
                true
            }
            _ => false,
        }
    }

    fn gaze_click(&mut self, node: NodeId) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.clicks += 1;
            info!(node, name = %n.name, "gaze click delivered");
        }
    }
}

// ── Shared handle ───────────────────────────────────────────

/// Single-threaded shared handle so both components can own a port onto
/// the same scene.
#[derive(Debug, Clone, Default)]
pub struct SharedScene(Rc<RefCell<SimScene>>);

impl SharedScene {
    pub fn new(scene: SimScene) -> Self {
        Self(Rc::new(RefCell::new(scene)))
    }

    pub fn borrow(&self) -> std::cell::Ref<'_, SimScene> {
        self.0.borrow()
    }
}

impl SceneGraph for SharedScene {
    fn instantiate_hidden(&mut self, prefab: &str) -> Option<NodeId> {
        self.0.borrow_mut().instantiate_hidden(prefab)
    }

    fn set_active(&mut self, node: NodeId, active: bool) {
        self.0.borrow_mut().set_active(node, active)
    }

    fn is_active(&self, node: NodeId) -> bool {
        self.0.borrow().is_active(node)
    }

    fn play_enter_animation(&mut self, node: NodeId) -> bool {
        self.0.borrow_mut().play_enter_animation(node)
    }

    fn ui_panels(&self, node: NodeId) -> Vec<NodeId> {
        self.0.borrow().ui_panels(node)
    }

    fn set_panel_alpha(&mut self, panel: NodeId, alpha: f32) {
        self.0.borrow_mut().set_panel_alpha(panel, alpha)
    }

    fn create_overlay(&mut self) -> Option<NodeId> {
        self.0.borrow_mut().create_overlay()
    }

    fn set_overlay_alpha(&mut self, overlay: NodeId, alpha: f32) {
        self.0.borrow_mut().set_overlay_alpha(overlay, alpha)
    }
}

impl SpatialQuery for SharedScene {
    fn raycast(&self, ray: &Ray, max_distance: f32, layer_mask: u32) -> Option<RayHit> {
        self.0.borrow().raycast(ray, max_distance, layer_mask)
    }
}

impl PointerDelivery for SharedScene {
    fn ui_pointer_click(&mut self, node: NodeId) -> bool {
        self.0.borrow_mut().ui_pointer_click(node)
    }

    fn gaze_click(&mut self, node: NodeId) {
        self.0.borrow_mut().gaze_click(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward_ray() -> Ray {
        Ray::new(Vec3::new(0.0, EYE_HEIGHT, 0.0), Vec3::FORWARD)
    }

    #[test]
    fn test_aabb_hit_and_miss() {
        let b = Aabb::around(Vec3::new(0.0, 0.0, -3.0), Vec3::new(0.5, 0.5, 0.5));
        let hit = b.intersect(&Ray::new(Vec3::ZERO, Vec3::FORWARD)).unwrap();
        assert!((hit - 2.5).abs() < 1e-5);
        assert_eq!(b.intersect(&Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0))), None);
        assert_eq!(b.intersect(&Ray::new(Vec3::new(2.0, 0.0, 0.0), Vec3::FORWARD)), None);
    }

    #[test]
    fn test_unknown_prefab_declined() {
        let mut scene = SimScene::with_default_prefabs();
        assert_eq!(scene.instantiate_hidden("casino"), None);
    }

    #[test]
    fn test_prefab_layout() {
        let mut scene = SimScene::with_default_prefabs();
        let root = scene.instantiate_hidden("work").unwrap();
        assert!(!scene.is_active(root));
        assert_eq!(scene.ui_panels(root).len(), 2);
        assert_eq!(scene.children(root).len(), 3);
    }

    #[test]
    fn test_raycast_respects_visibility() {
        let mut scene = SimScene::with_default_prefabs();
        let root = scene.instantiate_hidden("home").unwrap();
        assert_eq!(scene.raycast(&forward_ray(), 10.0, u32::MAX), None);

        scene.set_active(root, true);
        let hit = scene.raycast(&forward_ray(), 10.0, u32::MAX).unwrap();
        assert_eq!(scene.nodes[&hit.node].kind, NodeKind::Target);
        assert!((hit.distance - 2.9).abs() < 1e-4);
    }

    #[test]
    fn test_raycast_distance_and_mask() {
        let mut scene = SimScene::with_default_prefabs();
        let root = scene.instantiate_hidden("home").unwrap();
        scene.set_active(root, true);
        assert_eq!(scene.raycast(&forward_ray(), 1.0, u32::MAX), None);
        assert_eq!(scene.raycast(&forward_ray(), 10.0, 1), None);
        assert!(scene
            .raycast(&forward_ray(), 10.0, 1 << INTERACTABLE_LAYER)
            .is_some());
    }

    #[test]
    fn test_pointer_delivery_routes() {
        let mut scene = SimScene::with_default_prefabs();
        let work = scene.instantiate_hidden("work").unwrap();
        let home = scene.instantiate_hidden("home").unwrap();
        let work_target = *scene.children(work).last().unwrap();
        let home_target = *scene.children(home).last().unwrap();

        assert!(scene.ui_pointer_click(work_target));
        assert!(!scene.ui_pointer_click(home_target));
        scene.gaze_click(home_target);
        assert_eq!(scene.clicks_on(work_target), 1);
        assert_eq!(scene.clicks_on(home_target), 1);
    }

    #[test]
    fn test_shared_scene_sees_same_state() {
        let shared = SharedScene::new(SimScene::with_default_prefabs());
        let mut a = shared.clone();
        let root = a.instantiate_hidden("home").unwrap();
        a.set_active(root, true);
        assert!(shared.is_active(root));
        assert!(shared.borrow().is_visible(root));
    }

    #[test]
    fn test_enter_animation_counts_only_animated_prefabs() {
        let mut scene = SimScene::with_default_prefabs();
        let home = scene.instantiate_hidden("home").unwrap();
        let fun = scene.instantiate_hidden("entertainment").unwrap();

        assert!(scene.play_enter_animation(home));
        assert!(!scene.play_enter_animation(fun));
        assert!(!scene.play_enter_animation(9999));
        assert_eq!(scene.animations_played, 1);
    }
}
