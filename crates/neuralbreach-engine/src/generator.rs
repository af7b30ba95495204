//! Stimulus sequence generation
//!
//! A block's 20 stimuli are built up front, before any timer is armed. The first
//! `n` stimuli have no lag-`n` predecessor and are drawn freely. Every later index
//! flips an independent coin per channel: on a hit the channel copies the value
//! from `n` steps back, otherwise it draws from the remaining values so that no
//! unplanned match can appear.

use neuralbreach_core::{GridPosition, Letter, NLevel, Result, Stimulus, TRIALS_PER_BLOCK};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use tracing::debug;

/// Chance that a channel is forced to repeat its lag value.
pub const MATCH_PROBABILITY: f64 = 0.25;

pub struct StimulusGenerator {
    rng: Box<dyn RngCore + Send>,
}

impl Default for StimulusGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl StimulusGenerator {
    pub fn new(rng: impl RngCore + Send + 'static) -> Self {
        Self { rng: Box::new(rng) }
    }

    /// Deterministic generator for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Build the stimulus sequence for one block.
    ///
    /// Fails with `InvalidLevel` before drawing anything if `level` is outside 1..=5.
    pub fn generate_block(&mut self, level: u8, block_number: u32) -> Result<Vec<Stimulus>> {
        let level = NLevel::new(level)?;
        let lag = level.lag();

        let mut sequence: Vec<Stimulus> = Vec::with_capacity(TRIALS_PER_BLOCK);
        for _ in 0..lag {
            sequence.push(Stimulus::new(
                pick(&mut self.rng, &GridPosition::ALL),
                pick(&mut self.rng, &Letter::ALL),
            ));
        }

        for i in lag..TRIALS_PER_BLOCK {
            let previous = sequence[i - lag];
            let match_position = self.rng.gen_bool(MATCH_PROBABILITY);
            let match_letter = self.rng.gen_bool(MATCH_PROBABILITY);

            let position = if match_position {
                previous.position
            } else {
                pick_except(&mut self.rng, &GridPosition::ALL, previous.position)
            };
            let letter = if match_letter {
                previous.letter
            } else {
                pick_except(&mut self.rng, &Letter::ALL, previous.letter)
            };
            sequence.push(Stimulus::new(position, letter));
        }

        debug!(block = block_number, level = level.get(), "generated stimulus sequence");
        Ok(sequence)
    }
}

fn pick<T: Copy>(rng: &mut Box<dyn RngCore + Send>, values: &[T]) -> T {
    // Channel value sets are non-empty constants.
    values[rng.gen_range(0..values.len())]
}

fn pick_except<T: Copy + PartialEq>(
    rng: &mut Box<dyn RngCore + Send>,
    values: &[T],
    except: T,
) -> T {
    let remaining: Vec<T> = values.iter().copied().filter(|v| *v != except).collect();
    match remaining.choose(rng.as_mut()) {
        Some(v) => *v,
        None => except,
    }
}
