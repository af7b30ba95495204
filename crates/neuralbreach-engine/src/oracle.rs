//! Ground truth for a trial: does a channel repeat the stimulus `n` steps back?

use neuralbreach_core::{NLevel, Stimulus};

pub fn has_position_match(sequence: &[Stimulus], index: usize, level: NLevel) -> bool {
    lagged(sequence, index, level).is_some_and(|(now, then)| now.position == then.position)
}

pub fn has_audio_match(sequence: &[Stimulus], index: usize, level: NLevel) -> bool {
    lagged(sequence, index, level).is_some_and(|(now, then)| now.letter == then.letter)
}

/// The stimulus at `index` with its lag predecessor, if both exist.
fn lagged(sequence: &[Stimulus], index: usize, level: NLevel) -> Option<(&Stimulus, &Stimulus)> {
    let earlier = index.checked_sub(level.lag())?;
    Some((sequence.get(index)?, sequence.get(earlier)?))
}
