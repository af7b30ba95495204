//! Response scoring
//!
//! Each channel is judged on its own: pressing where there is no match is a
//! false alarm, not pressing where there is one is a miss. The stability penalty
//! is not a per-channel sum. Any false alarm costs 15, otherwise any miss costs
//! 10, so a trial that is wrong on both channels costs the same as one wrong on
//! a single channel.

use crate::stability::clamp_stability;
use neuralbreach_core::{Response, TrialResult};

pub const FALSE_ALARM_PENALTY: i32 = -15;
pub const MISS_PENALTY: i32 = -10;

pub fn evaluate(
    response: Response,
    has_position_match: bool,
    has_audio_match: bool,
    stability_before: u8,
    was_in_safe_mode: bool,
) -> TrialResult {
    let pressed_position = response.presses_position();
    let pressed_audio = response.presses_audio();

    let position_correct = pressed_position == has_position_match;
    let audio_correct = pressed_audio == has_audio_match;
    let trial_correct = position_correct && audio_correct;

    let position_false_alarm = pressed_position && !has_position_match;
    let audio_false_alarm = pressed_audio && !has_audio_match;
    let position_miss = !pressed_position && has_position_match;
    let audio_miss = !pressed_audio && has_audio_match;

    let stability_delta = if position_false_alarm || audio_false_alarm {
        FALSE_ALARM_PENALTY
    } else if position_miss || audio_miss {
        MISS_PENALTY
    } else {
        0
    };

    // The trial that empties stability earns nothing either.
    let enters_safe_mode = clamp_stability(stability_before, stability_delta) == 0;
    let shards_earned = u32::from(trial_correct && !was_in_safe_mode && !enters_safe_mode);

    TrialResult {
        position_correct,
        audio_correct,
        trial_correct,
        position_false_alarm,
        audio_false_alarm,
        position_miss,
        audio_miss,
        shards_earned,
        stability_delta,
    }
}
