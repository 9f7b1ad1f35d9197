//! Fade timing and easing curves for workspace transitions.

/// Normalized progress of `elapsed_s` through `duration_s`, clamped to
/// [0, 1]. A zero or negative duration is already complete.
pub fn normalized_progress(elapsed_s: f64, duration_s: f64) -> f32 {
    if duration_s <= 0.0 || !duration_s.is_finite() {
        return 1.0;
    }
    (elapsed_s / duration_s).clamp(0.0, 1.0) as f32
}

/// Frame-driven timer for one fade phase.
#[derive(Debug, Clone, PartialEq)]
pub struct FadeTimer {
    elapsed_s: f64,
    duration_s: f64,
}

impl FadeTimer {
    pub fn new(duration_s: f64) -> Self {
        Self {
            elapsed_s: 0.0,
            duration_s,
        }
    }

    /// Advance by one frame. Negative deltas are ignored.
    pub fn advance(&mut self, dt_s: f64) {
        if dt_s > 0.0 {
            self.elapsed_s += dt_s;
        }
    }

    pub fn progress(&self) -> f32 {
        normalized_progress(self.elapsed_s, self.duration_s)
    }

    pub fn is_finished(&self) -> bool {
        self.progress() >= 1.0
    }
}

// ── Easing ──────────────────────────────────────────────────

/// Easing curve applied to overlay alpha. Every curve is monotone with
/// f(0) = 0 and f(1) = 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl Easing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::EaseIn => "ease-in",
            Self::EaseOut => "ease-out",
            Self::EaseInOut => "ease-in-out",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "linear" => Some(Self::Linear),
            "ease-in" => Some(Self::EaseIn),
            "ease-out" => Some(Self::EaseOut),
            "ease-in-out" => Some(Self::EaseInOut),
            _ => None,
        }
    }

    /// Evaluate the curve. Input is clamped to [0, 1].
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => t * (2.0 - t),
            // smoothstep
            Self::EaseInOut => t * t * (3.0 - 2.0 * t),
        }
    }
}
