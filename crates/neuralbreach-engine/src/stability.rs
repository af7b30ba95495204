//! Per-block error budget with a sticky safe mode

use neuralbreach_core::MAX_STABILITY;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityTracker {
    stability: u8,
    in_safe_mode: bool,
}

impl Default for StabilityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StabilityTracker {
    pub fn new() -> Self {
        Self {
            stability: MAX_STABILITY,
            in_safe_mode: false,
        }
    }

    pub fn stability(&self) -> u8 {
        self.stability
    }

    pub fn in_safe_mode(&self) -> bool {
        self.in_safe_mode
    }

    /// Stability after `delta`, without applying it.
    pub fn preview(&self, delta: i32) -> u8 {
        clamp_stability(self.stability, delta)
    }

    /// Apply `delta`. Returns true if this update entered safe mode.
    pub fn apply(&mut self, delta: i32) -> bool {
        self.stability = self.preview(delta);
        if self.stability == 0 && !self.in_safe_mode {
            self.in_safe_mode = true;
            return true;
        }
        false
    }
}

pub fn clamp_stability(stability: u8, delta: i32) -> u8 {
    i32::from(stability)
        .saturating_add(delta)
        .clamp(0, i32::from(MAX_STABILITY)) as u8
}
