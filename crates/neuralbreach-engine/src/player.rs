//! Simulated players for headless sessions

use crate::oracle;
use neuralbreach_core::{Block, NLevel, Response, Stimulus};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// What a player sees when a stimulus appears.
#[derive(Debug, Clone, Copy)]
pub struct Presented {
    pub block: u32,
    pub trial: usize,
    pub level: NLevel,
    pub stimulus: Stimulus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerMove {
    /// Answer after `after` (measured from the stimulus).
    Respond { response: Response, after: Duration },
    /// Let the window run out.
    Pass,
    /// Leave the session immediately.
    Quit,
}

pub trait Player: Send {
    fn on_stimulus(&mut self, presented: &Presented) -> PlayerMove;

    /// Asked at every block end; `true` plays another block.
    fn continue_after(&mut self, block: &Block, next_level: NLevel) -> bool;
}

/// Answers correctly with probability `skill`, otherwise guesses.
///
/// `skill` is clamped into 0..=1; a non-finite skill plays as 0.
pub struct SkilledPlayer {
    skill: f64,
    reaction: Duration,
    blocks_to_play: u32,
    rng: StdRng,
    seen: Vec<Stimulus>,
}

impl SkilledPlayer {
    pub fn new(skill: f64, blocks_to_play: u32, seed: u64) -> Self {
        let skill = if skill.is_finite() {
            skill.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            skill,
            reaction: Duration::from_millis(600),
            blocks_to_play,
            rng: StdRng::seed_from_u64(seed),
            seen: Vec::new(),
        }
    }
}

impl Player for SkilledPlayer {
    fn on_stimulus(&mut self, presented: &Presented) -> PlayerMove {
        if presented.trial == 0 {
            self.seen.clear();
        }
        self.seen.push(presented.stimulus);

        let index = self.seen.len() - 1;
        let truth = Response::from_presses(
            oracle::has_position_match(&self.seen, index, presented.level),
            oracle::has_audio_match(&self.seen, index, presented.level),
        );
        let response = if self.rng.gen_bool(self.skill) {
            truth
        } else {
            Response::from_presses(self.rng.gen_bool(0.5), self.rng.gen_bool(0.5))
        };

        if response == Response::None {
            PlayerMove::Pass
        } else {
            let jitter = self.rng.gen_range(0..400);
            PlayerMove::Respond {
                response,
                after: self.reaction + Duration::from_millis(jitter),
            }
        }
    }

    fn continue_after(&mut self, block: &Block, _next_level: NLevel) -> bool {
        block.block_number < self.blocks_to_play
    }
}
