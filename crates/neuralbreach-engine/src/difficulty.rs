//! Between-block difficulty adaptation

use neuralbreach_core::NLevel;

/// Accuracy (percent) at or above which the next block is one level harder.
pub const PROMOTE_AT: f64 = 80.0;
/// Accuracy (percent) at or below which the next block is one level easier.
pub const DEMOTE_AT: f64 = 60.0;

pub fn next_level(accuracy_percent: f64, current: NLevel) -> NLevel {
    if accuracy_percent >= PROMOTE_AT {
        current.raised()
    } else if accuracy_percent <= DEMOTE_AT {
        current.lowered()
    } else {
        current
    }
}
