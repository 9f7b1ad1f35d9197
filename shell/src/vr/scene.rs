//! Scene primitives and the host ports the VR components consume.
//!
//! Rendering, physics and UI event dispatch belong to the host. The
//! components only see these traits: `SceneGraph` for workspace roots,
//! panels and the fade overlay, `SpatialQuery` for gaze ray casts, and
//! `PointerDelivery` for click delivery.

// ── Math ────────────────────────────────────────────────────

/// 3D vector in scene space (metres).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const FORWARD: Self = Self::new(0.0, 0.0, -1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a zero vector.
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if len <= f32::EPSILON || !len.is_finite() {
            return None;
        }
        Some(self.scale(1.0 / len))
    }

    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

/// Ray with a normalized direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Build a ray, normalizing `direction`. A zero direction falls back
    /// to `Vec3::FORWARD`.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalized().unwrap_or(Vec3::FORWARD),
        }
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin.add(self.direction.scale(distance))
    }
}

/// Position plus look direction of the gaze origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub forward: Vec3,
}

impl Pose {
    pub fn new(position: Vec3, forward: Vec3) -> Self {
        Self { position, forward }
    }

    pub fn ray(&self) -> Ray {
        Ray::new(self.position, self.forward)
    }
}

/// Linear RGBA color, components in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self::rgba(1.0, 1.0, 1.0, 1.0);
    pub const GREEN: Self = Self::rgba(0.0, 1.0, 0.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Component-wise linear interpolation. `t` is not clamped.
    pub fn lerp(self, to: Self, t: f32) -> Self {
        Self {
            r: self.r + (to.r - self.r) * t,
            g: self.g + (to.g - self.g) * t,
            b: self.b + (to.b - self.b) * t,
            a: self.a + (to.a - self.a) * t,
        }
    }

    pub fn to_sexp(&self) -> String {
        format!(
            "(:r {:.2} :g {:.2} :b {:.2} :a {:.2})",
            self.r, self.g, self.b, self.a
        )
    }
}

// ── Host ports ──────────────────────────────────────────────

/// Opaque node id handed out by the host scene.
pub type NodeId = u64;

/// Scene-graph operations needed by the workspace switcher.
pub trait SceneGraph {
    /// Instantiate `prefab` as a hidden child of the workspace root.
    /// Returns `None` when the host has no such prefab.
    fn instantiate_hidden(&mut self, prefab: &str) -> Option<NodeId>;

    /// Show or hide a node and its children.
    fn set_active(&mut self, node: NodeId, active: bool);

    fn is_active(&self, node: NodeId) -> bool;

    /// Start the node's enter animation. Returns false if it has none.
    fn play_enter_animation(&mut self, node: NodeId) -> bool;

    /// UI panels below `node` that fade in after a switch.
    fn ui_panels(&self, node: NodeId) -> Vec<NodeId>;

    fn set_panel_alpha(&mut self, panel: NodeId, alpha: f32);

    /// Create the full-screen fade overlay. `None` if unsupported.
    fn create_overlay(&mut self) -> Option<NodeId>;

    fn set_overlay_alpha(&mut self, overlay: NodeId, alpha: f32);
}

/// Nearest intersection returned by a gaze ray cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub node: NodeId,
    pub distance: f32,
    pub point: Vec3,
}

/// Physics ray query.
pub trait SpatialQuery {
    /// Nearest visible node hit by `ray` within `max_distance` whose
    /// layer bit is set in `layer_mask`.
    fn raycast(&self, ray: &Ray, max_distance: f32, layer_mask: u32) -> Option<RayHit>;
}

/// Click delivery for gaze-triggered activation.
pub trait PointerDelivery {
    /// Deliver through the UI pointer-click path. Returns false when the
    /// node is not a UI element with a click handler.
    fn ui_pointer_click(&mut self, node: NodeId) -> bool;

    /// Fallback: notify the node directly with a gaze-click message.
    fn gaze_click(&mut self, node: NodeId);
}
