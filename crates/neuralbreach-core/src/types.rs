//! Core types for Neural Breach

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trials in every block.
pub const TRIALS_PER_BLOCK: usize = 20;

/// Stability at the start of every block; also the upper clamp.
pub const MAX_STABILITY: u8 = 100;

// ---------------------------------------------------------------------------
// N level
// ---------------------------------------------------------------------------

/// Lag (in trials) at which a repeat counts as a match. Always within 1..=5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct NLevel(u8);

impl NLevel {
    pub const MIN: NLevel = NLevel(1);
    pub const MAX: NLevel = NLevel(5);

    pub fn new(level: u8) -> Result<Self> {
        if (Self::MIN.0..=Self::MAX.0).contains(&level) {
            Ok(Self(level))
        } else {
            Err(Error::invalid_level(level))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn lag(self) -> usize {
        self.0 as usize
    }

    /// One step harder, saturating at `MAX`.
    pub fn raised(self) -> Self {
        Self(self.0.saturating_add(1).min(Self::MAX.0))
    }

    /// One step easier, saturating at `MIN`.
    pub fn lowered(self) -> Self {
        Self(self.0.saturating_sub(1).max(Self::MIN.0))
    }
}

impl TryFrom<u8> for NLevel {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self> {
        Self::new(level)
    }
}

impl From<NLevel> for u8 {
    fn from(level: NLevel) -> u8 {
        level.0
    }
}

impl std::fmt::Display for NLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Stimulus channels
// ---------------------------------------------------------------------------

/// Cell of the 3x3 grid, numbered row-major 0..=8.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct GridPosition(u8);

impl GridPosition {
    pub const ALL: [GridPosition; 9] = [
        GridPosition(0),
        GridPosition(1),
        GridPosition(2),
        GridPosition(3),
        GridPosition(4),
        GridPosition(5),
        GridPosition(6),
        GridPosition(7),
        GridPosition(8),
    ];

    pub fn new(cell: u8) -> Result<Self> {
        if cell <= 8 {
            Ok(Self(cell))
        } else {
            Err(Error::InvalidPosition(cell))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn row(self) -> u8 {
        self.0 / 3
    }

    pub fn column(self) -> u8 {
        self.0 % 3
    }
}

impl TryFrom<u8> for GridPosition {
    type Error = Error;

    fn try_from(cell: u8) -> Result<Self> {
        Self::new(cell)
    }
}

impl From<GridPosition> for u8 {
    fn from(position: GridPosition) -> u8 {
        position.0
    }
}

/// Spoken letter alphabet. Chosen to be acoustically distinct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Letter {
    C,
    H,
    K,
    L,
    Q,
    R,
    S,
    T,
}

impl Letter {
    pub const ALL: [Letter; 8] = [
        Letter::C,
        Letter::H,
        Letter::K,
        Letter::L,
        Letter::Q,
        Letter::R,
        Letter::S,
        Letter::T,
    ];

    pub fn as_char(self) -> char {
        match self {
            Letter::C => 'C',
            Letter::H => 'H',
            Letter::K => 'K',
            Letter::L => 'L',
            Letter::Q => 'Q',
            Letter::R => 'R',
            Letter::S => 'S',
            Letter::T => 'T',
        }
    }
}

impl TryFrom<char> for Letter {
    type Error = Error;

    fn try_from(c: char) -> Result<Self> {
        let upper = c.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|l| l.as_char() == upper)
            .ok_or(Error::InvalidLetter(c))
    }
}

impl std::fmt::Display for Letter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One trial's stimulus: a lit grid cell plus a spoken letter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stimulus {
    pub position: GridPosition,
    pub letter: Letter,
}

impl Stimulus {
    pub fn new(position: GridPosition, letter: Letter) -> Self {
        Self { position, letter }
    }
}

// ---------------------------------------------------------------------------
// Responses and results
// ---------------------------------------------------------------------------

/// What the player claimed for a trial.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Position,
    Audio,
    Both,
    #[default]
    None,
}

impl Response {
    pub fn from_presses(position: bool, audio: bool) -> Self {
        match (position, audio) {
            (true, true) => Self::Both,
            (true, false) => Self::Position,
            (false, true) => Self::Audio,
            (false, false) => Self::None,
        }
    }

    pub fn presses_position(self) -> bool {
        matches!(self, Self::Position | Self::Both)
    }

    pub fn presses_audio(self) -> bool {
        matches!(self, Self::Audio | Self::Both)
    }
}

/// Scoring of a single response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialResult {
    pub position_correct: bool,
    pub audio_correct: bool,
    pub trial_correct: bool,
    pub position_false_alarm: bool,
    pub audio_false_alarm: bool,
    pub position_miss: bool,
    pub audio_miss: bool,
    /// 0 or 1.
    pub shards_earned: u32,
    /// Never positive.
    pub stability_delta: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trial {
    pub index: usize,
    pub stimulus: Stimulus,
    pub response: Response,
    pub has_position_match: bool,
    pub has_audio_match: bool,
    pub result: TrialResult,
    /// `None` when the response window expired.
    pub reaction_time_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Blocks and sessions
// ---------------------------------------------------------------------------

/// A finished round of trials at one N level. Read-only once recorded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub block_number: u32,
    pub n_level: NLevel,
    pub trials: Vec<Trial>,
    /// Percent of fully correct trials, 0..=100.
    pub accuracy: f64,
    pub shards_earned: u32,
    pub final_stability: u8,
    pub hit_safe_mode: bool,
    pub duration_ms: u64,
}

impl Block {
    pub fn correct_trials(&self) -> usize {
        self.trials.iter().filter(|t| t.result.trial_correct).count()
    }
}

/// Session identifier (UUID v4 string).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The training record produced by one play session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    pub user_id: String,
    pub blocks: Vec<Block>,
    pub starting_n_level: NLevel,
    pub peak_n_level: NLevel,
    pub total_shards: u32,
    pub average_accuracy: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        starting_n_level: NLevel,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: SessionId::generate(),
            user_id: user_id.into(),
            blocks: Vec::new(),
            starting_n_level,
            peak_n_level: starting_n_level,
            total_shards: 0,
            average_accuracy: 0.0,
            started_at,
            ended_at: None,
            duration_ms: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Export the record as JSON.
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    /// Load a previously exported record. Levels outside 1..=5 are rejected.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ---------------------------------------------------------------------------
// Game phase
// ---------------------------------------------------------------------------

/// Scheduler phase, as exposed to UI layers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Idle,
    Ready,
    Playing,
    Waiting,
    BlockEnd,
    SessionEnd,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Ready => write!(f, "ready"),
            Self::Playing => write!(f, "playing"),
            Self::Waiting => write!(f, "waiting"),
            Self::BlockEnd => write!(f, "blockEnd"),
            Self::SessionEnd => write!(f, "sessionEnd"),
        }
    }
}
