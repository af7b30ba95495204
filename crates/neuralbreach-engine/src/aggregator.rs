//! Folding finished blocks into the session record

use crate::difficulty;
use chrono::{DateTime, Utc};
use neuralbreach_core::{Block, NLevel, Session};
use tracing::info;

/// `100 * correct / total`, or 0 for an empty block.
pub fn accuracy_percent(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (correct as f64 / total as f64) * 100.0
}

pub fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from).num_milliseconds().max(0) as u64
}

/// Record a finished block and return the level for the next one.
///
/// `peak_n_level` takes the next level into account right away, even though that
/// level has not been played yet.
pub fn fold_block(session: &mut Session, block: Block) -> NLevel {
    let next = difficulty::next_level(block.accuracy, block.n_level);

    session.total_shards += block.shards_earned;
    session.peak_n_level = session.peak_n_level.max(next);

    info!(
        session = %session.session_id,
        block = block.block_number,
        level = block.n_level.get(),
        accuracy = block.accuracy,
        shards = block.shards_earned,
        next_level = next.get(),
        "block recorded"
    );
    session.blocks.push(block);
    next
}

/// Close the session: end time, duration and mean block accuracy.
pub fn finalize(session: &mut Session, ended_at: DateTime<Utc>) {
    session.ended_at = Some(ended_at);
    session.duration_ms = elapsed_ms(session.started_at, ended_at);

    let total: f64 = session.blocks.iter().map(|b| b.accuracy).sum();
    session.average_accuracy = if session.blocks.is_empty() {
        0.0
    } else {
        total / session.blocks.len() as f64
    };

    info!(
        session = %session.session_id,
        blocks = session.blocks.len(),
        shards = session.total_shards,
        average_accuracy = session.average_accuracy,
        "session finalized"
    );
}
