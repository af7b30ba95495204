//! Neural Breach Engine - Dual n-back trial scheduling, scoring and adaptation

pub mod aggregator;
pub mod audio;
pub mod block;
pub mod clock;
pub mod config;
pub mod difficulty;
pub mod driver;
pub mod evaluator;
pub mod generator;
pub mod machine;
pub mod oracle;
pub mod player;
pub mod sim;
pub mod stability;

pub use audio::{AudioError, AudioResult, RetryingAudio, SilentAudio, StimulusAudio};
pub use block::ActiveBlock;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AudioConfig, EngineConfig, SessionConfig, TimingConfig};
pub use driver::{GameInput, GameLoop};
pub use generator::StimulusGenerator;
pub use machine::{Effect, GameEvent, GameMachine, Stage, Ticket};
pub use player::{Player, PlayerMove, Presented, SkilledPlayer};
pub use sim::VirtualDriver;
pub use stability::StabilityTracker;
