//! VR shell components: workspace switcher and gaze selector.
//!
//! Provides:
//! - `scene`: math primitives and the host ports (scene graph, ray
//!   query, pointer delivery)
//! - `fade`: fade timers and easing curves
//! - `workspace_switcher`: cross-fading workspace controller
//! - `gaze_select`: dwell-to-click gaze pointer
//! - `frame_timing`: rolling frame statistics for the host loop

pub mod fade;
pub mod frame_timing;
pub mod gaze_select;
pub mod scene;
pub mod workspace_switcher;

/// Lifecycle hooks a host loop drives once at start and once per frame.
pub trait FrameDriven {
    fn on_start(&mut self);

    /// Advance by `dt_s` seconds of frame time.
    fn on_frame(&mut self, dt_s: f64);
}
