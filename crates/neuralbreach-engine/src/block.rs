//! The block currently being played
//!
//! Trials are appended by index and never touched again. Anything handed out of
//! here is an owned copy, so a snapshot given to a UI layer never changes under it.

use crate::aggregator::{accuracy_percent, elapsed_ms};
use crate::evaluator;
use crate::oracle;
use crate::stability::StabilityTracker;
use chrono::{DateTime, Utc};
use neuralbreach_core::{Block, NLevel, Response, Stimulus, Trial};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct ActiveBlock {
    number: u32,
    level: NLevel,
    sequence: Arc<[Stimulus]>,
    trials: Vec<Trial>,
    tracker: StabilityTracker,
    shards: u32,
    started_at: DateTime<Utc>,
}

impl ActiveBlock {
    pub fn new(
        number: u32,
        level: NLevel,
        sequence: Vec<Stimulus>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            number,
            level,
            sequence: sequence.into(),
            trials: Vec::with_capacity(neuralbreach_core::TRIALS_PER_BLOCK),
            tracker: StabilityTracker::new(),
            shards: 0,
            started_at,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn stimulus(&self, index: usize) -> Option<Stimulus> {
        self.sequence.get(index).copied()
    }

    /// Index of the next trial to be recorded.
    pub fn next_index(&self) -> usize {
        self.trials.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.trials.len() >= self.sequence.len()
    }

    pub fn stability(&self) -> u8 {
        self.tracker.stability()
    }

    pub fn in_safe_mode(&self) -> bool {
        self.tracker.in_safe_mode()
    }

    pub fn shards(&self) -> u32 {
        self.shards
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    /// Score `response` for the next trial and append it.
    ///
    /// Returns `None` once every stimulus already has a trial.
    pub fn record(
        &mut self,
        response: Response,
        reaction_time_ms: Option<u64>,
        at: DateTime<Utc>,
    ) -> Option<Trial> {
        let index = self.next_index();
        let stimulus = self.stimulus(index)?;

        let has_position_match = oracle::has_position_match(&self.sequence, index, self.level);
        let has_audio_match = oracle::has_audio_match(&self.sequence, index, self.level);

        let result = evaluator::evaluate(
            response,
            has_position_match,
            has_audio_match,
            self.tracker.stability(),
            self.tracker.in_safe_mode(),
        );
        self.tracker.apply(result.stability_delta);
        self.shards += result.shards_earned;

        let trial = Trial {
            index,
            stimulus,
            response,
            has_position_match,
            has_audio_match,
            result,
            reaction_time_ms,
            timestamp: at,
        };
        self.trials.push(trial.clone());
        Some(trial)
    }

    /// Owned view of the block as it stands at `at`.
    pub fn snapshot(&self, at: DateTime<Utc>) -> Block {
        Block {
            block_number: self.number,
            n_level: self.level,
            trials: self.trials.clone(),
            accuracy: self.accuracy(),
            shards_earned: self.shards,
            final_stability: self.tracker.stability(),
            hit_safe_mode: self.tracker.in_safe_mode(),
            duration_ms: elapsed_ms(self.started_at, at),
        }
    }

    /// Freeze the block into its final record.
    pub fn finish(self, ended_at: DateTime<Utc>) -> Block {
        let accuracy = self.accuracy();
        Block {
            block_number: self.number,
            n_level: self.level,
            accuracy,
            shards_earned: self.shards,
            final_stability: self.tracker.stability(),
            hit_safe_mode: self.tracker.in_safe_mode(),
            duration_ms: elapsed_ms(self.started_at, ended_at),
            trials: self.trials,
        }
    }

    fn accuracy(&self) -> f64 {
        let correct = self.trials.iter().filter(|t| t.result.trial_correct).count();
        accuracy_percent(correct, self.trials.len())
    }
}
