//! Trial scheduler state machine
//!
//! The machine is synchronous. Every transition takes the current time, updates
//! state and returns the effects a driver must carry out: arm a timer, play a
//! letter, cancel timers, publish an event. Drivers feed the outcome back through
//! `resume` with the `Ticket` they were given.
//!
//! Phase flow:
//!
//! ```text
//! idle -> ready -> (audio) -> playing -> waiting -> (audio) -> playing -> ... -> blockEnd
//! blockEnd -> ready      (continue)
//! blockEnd -> sessionEnd (quit, also allowed mid-block)
//! sessionEnd -> idle     (reset)
//! ```
//!
//! Only the ticket stored in `pending` is honoured, so a window that expires after
//! an early answer, or any callback queued before a quit, is dropped.

use crate::aggregator;
use crate::block::ActiveBlock;
use crate::config::{EngineConfig, TimingConfig};
use crate::generator::StimulusGenerator;
use chrono::{DateTime, Utc};
use neuralbreach_core::{Block, Letter, NLevel, Phase, Response, Result, Session, Stimulus, Trial};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Tickets and effects
// ---------------------------------------------------------------------------

/// Which suspension a ticket resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Block set up, first stimulus not yet shown.
    Settle,
    /// Stimulus audio is playing.
    Present,
    /// Response window is open.
    Respond,
    /// Feedback pause after an answer.
    Feedback,
}

/// Identifies one pending suspension. `epoch` changes on quit and reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub epoch: u64,
    pub block: u32,
    pub trial: usize,
    pub stage: Stage,
}

#[derive(Debug, Clone)]
pub enum Effect {
    /// Call `resume(ticket)` after `delay`.
    Schedule { ticket: Ticket, delay: Duration },
    /// Play `letter`, then call `resume(ticket)` whether or not playback worked.
    PlayStimulus { ticket: Ticket, letter: Letter },
    /// Drop a scheduled ticket.
    Cancel(Ticket),
    /// Drop everything scheduled.
    CancelAll,
    Emit(GameEvent),
}

/// Observable game events. Every payload is an owned snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GameEvent {
    PhaseChanged {
        phase: Phase,
    },
    BlockStarted {
        block: u32,
        level: NLevel,
    },
    StimulusPresented {
        block: u32,
        trial: usize,
        level: NLevel,
        stimulus: Stimulus,
    },
    TrialEvaluated {
        block: u32,
        trial: Trial,
        stability: u8,
        in_safe_mode: bool,
        shards: u32,
    },
    BlockEnded {
        block: Block,
        next_level: NLevel,
    },
    SessionEnded {
        session: Session,
    },
    Error {
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

pub struct GameMachine {
    timing: TimingConfig,
    starting_level: NLevel,
    generator: StimulusGenerator,
    phase: Phase,
    session: Option<Session>,
    block: Option<ActiveBlock>,
    /// Level of the current block, or of the next one while in `BlockEnd`.
    level: NLevel,
    epoch: u64,
    pending: Option<Ticket>,
    window_opened_at: Option<DateTime<Utc>>,
}

impl GameMachine {
    pub fn new(config: &EngineConfig, generator: StimulusGenerator) -> Result<Self> {
        config.validate()?;
        let starting_level = config.starting_level()?;
        Ok(Self {
            timing: config.timing.clone(),
            starting_level,
            generator,
            phase: Phase::Idle,
            session: None,
            block: None,
            level: starting_level,
            epoch: 0,
            pending: None,
            window_opened_at: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn level(&self) -> NLevel {
        self.level
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn pending(&self) -> Option<Ticket> {
        self.pending
    }

    pub fn stability(&self) -> Option<u8> {
        self.block.as_ref().map(|b| b.stability())
    }

    pub fn in_safe_mode(&self) -> bool {
        self.block.as_ref().is_some_and(|b| b.in_safe_mode())
    }

    /// Copy of the block in progress; later trials never show up in it.
    pub fn block_snapshot(&self, now: DateTime<Utc>) -> Option<Block> {
        self.block.as_ref().map(|b| b.snapshot(now))
    }

    // -----------------------------------------------------------------------
    // Player and UI inputs
    // -----------------------------------------------------------------------

    /// Open a session and set up its first block.
    pub fn start_session(
        &mut self,
        user_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Effect>> {
        if self.phase != Phase::Idle {
            debug!("start_session ignored in phase {}", self.phase);
            return Ok(Vec::new());
        }

        let session = Session::new(user_id, self.starting_level, now);
        info!(
            session = %session.session_id,
            user = %session.user_id,
            level = self.starting_level.get(),
            "session started"
        );
        self.session = Some(session);
        self.level = self.starting_level;
        self.start_block(now)
    }

    /// Play another block at the level chosen when the last one ended.
    pub fn continue_session(&mut self, now: DateTime<Utc>) -> Result<Vec<Effect>> {
        if self.phase != Phase::BlockEnd {
            debug!("continue ignored in phase {}", self.phase);
            return Ok(Vec::new());
        }
        self.start_block(now)
    }

    /// Player answer for the trial on screen. Ignored unless a window is open.
    pub fn respond(&mut self, response: Response, now: DateTime<Utc>) -> Vec<Effect> {
        let ticket = match self.pending {
            Some(t) if self.phase == Phase::Playing && t.stage == Stage::Respond => t,
            _ => {
                debug!("response {:?} ignored in phase {}", response, self.phase);
                return Vec::new();
            }
        };
        self.pending = None;

        let reaction_ms = self
            .window_opened_at
            .take()
            .map(|opened| aggregator::elapsed_ms(opened, now));

        let mut effects = vec![Effect::Cancel(ticket)];
        effects.extend(self.evaluate(response, reaction_ms, now));
        effects
    }

    /// End the session. A block in progress is dropped, not recorded.
    pub fn quit(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        if self.phase == Phase::SessionEnd {
            debug!("quit ignored: session already ended");
            return Vec::new();
        }
        let Some(mut session) = self.session.take() else {
            debug!("quit ignored: no session");
            return Vec::new();
        };

        self.invalidate();
        if let Some(block) = self.block.take() {
            info!(
                session = %session.session_id,
                block = block.number(),
                trials = block.next_index(),
                "discarding unfinished block"
            );
        }

        aggregator::finalize(&mut session, now);
        self.session = Some(session.clone());
        self.phase = Phase::SessionEnd;

        vec![
            Effect::CancelAll,
            Effect::Emit(GameEvent::SessionEnded { session }),
            Effect::Emit(GameEvent::PhaseChanged {
                phase: Phase::SessionEnd,
            }),
        ]
    }

    /// Forget everything and return to `Idle`.
    pub fn reset(&mut self) -> Vec<Effect> {
        self.invalidate();
        self.session = None;
        self.block = None;
        self.level = self.starting_level;
        self.phase = Phase::Idle;
        vec![
            Effect::CancelAll,
            Effect::Emit(GameEvent::PhaseChanged { phase: Phase::Idle }),
        ]
    }

    // -----------------------------------------------------------------------
    // Driver callbacks
    // -----------------------------------------------------------------------

    /// A scheduled delay elapsed or stimulus audio finished.
    pub fn resume(&mut self, ticket: Ticket, now: DateTime<Utc>) -> Vec<Effect> {
        if self.pending != Some(ticket) {
            debug!(?ticket, "stale ticket ignored");
            return Vec::new();
        }
        self.pending = None;

        match ticket.stage {
            Stage::Settle | Stage::Feedback => self.advance(now),
            Stage::Present => self.open_window(ticket, now),
            Stage::Respond => {
                self.window_opened_at = None;
                self.evaluate(Response::None, None, now)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn start_block(&mut self, now: DateTime<Utc>) -> Result<Vec<Effect>> {
        let Some(session) = self.session.as_ref() else {
            debug!("start_block ignored: no session");
            return Ok(Vec::new());
        };
        let number = session.blocks.len() as u32 + 1;

        // Generate first so a failure leaves the machine untouched.
        let sequence = self.generator.generate_block(self.level.get(), number)?;

        self.block = Some(ActiveBlock::new(number, self.level, sequence, now));
        self.phase = Phase::Ready;
        let ticket = self.arm(number, 0, Stage::Settle);
        info!(block = number, level = self.level.get(), "block started");

        Ok(vec![
            Effect::Emit(GameEvent::PhaseChanged {
                phase: Phase::Ready,
            }),
            Effect::Emit(GameEvent::BlockStarted {
                block: number,
                level: self.level,
            }),
            Effect::Schedule {
                ticket,
                delay: self.timing.settle(),
            },
        ])
    }

    /// After settle or feedback: next stimulus, or end of block.
    fn advance(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let Some(block) = self.block.as_ref() else {
            debug!("advance ignored: no active block");
            return Vec::new();
        };
        if block.is_exhausted() {
            return self.end_block(now);
        }

        let index = block.next_index();
        let number = block.number();
        let Some(stimulus) = block.stimulus(index) else {
            return self.end_block(now);
        };
        let ticket = self.arm(number, index, Stage::Present);
        vec![Effect::PlayStimulus {
            ticket,
            letter: stimulus.letter,
        }]
    }

    fn open_window(&mut self, presented: Ticket, now: DateTime<Utc>) -> Vec<Effect> {
        let Some(stimulus) = self.block.as_ref().and_then(|b| b.stimulus(presented.trial)) else {
            debug!("open_window ignored: no stimulus for trial {}", presented.trial);
            return Vec::new();
        };

        self.phase = Phase::Playing;
        self.window_opened_at = Some(now);
        let ticket = self.arm(presented.block, presented.trial, Stage::Respond);

        vec![
            Effect::Emit(GameEvent::PhaseChanged {
                phase: Phase::Playing,
            }),
            Effect::Emit(GameEvent::StimulusPresented {
                block: presented.block,
                trial: presented.trial,
                level: self.level,
                stimulus,
            }),
            Effect::Schedule {
                ticket,
                delay: self.timing.response_window(),
            },
        ]
    }

    fn evaluate(
        &mut self,
        response: Response,
        reaction_ms: Option<u64>,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        let Some(block) = self.block.as_mut() else {
            debug!("evaluate ignored: no active block");
            return Vec::new();
        };
        let Some(trial) = block.record(response, reaction_ms, now) else {
            debug!("evaluate ignored: block {} already has every trial", block.number());
            return Vec::new();
        };

        let number = block.number();
        let event = GameEvent::TrialEvaluated {
            block: number,
            stability: block.stability(),
            in_safe_mode: block.in_safe_mode(),
            shards: block.shards(),
            trial: trial.clone(),
        };
        debug!(
            block = number,
            trial = trial.index,
            response = ?response,
            correct = trial.result.trial_correct,
            stability = block.stability(),
            "trial evaluated"
        );

        self.phase = Phase::Waiting;
        let ticket = self.arm(number, trial.index, Stage::Feedback);
        vec![
            Effect::Emit(event),
            Effect::Emit(GameEvent::PhaseChanged {
                phase: Phase::Waiting,
            }),
            Effect::Schedule {
                ticket,
                delay: self.timing.feedback(),
            },
        ]
    }

    fn end_block(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let (Some(block), Some(session)) = (self.block.take(), self.session.as_mut()) else {
            debug!("end_block ignored: no active block or session");
            return Vec::new();
        };

        let block = block.finish(now);
        let next_level = aggregator::fold_block(session, block.clone());
        self.level = next_level;
        self.phase = Phase::BlockEnd;

        vec![
            Effect::Emit(GameEvent::BlockEnded { block, next_level }),
            Effect::Emit(GameEvent::PhaseChanged {
                phase: Phase::BlockEnd,
            }),
        ]
    }

    fn arm(&mut self, block: u32, trial: usize, stage: Stage) -> Ticket {
        let ticket = Ticket {
            epoch: self.epoch,
            block,
            trial,
            stage,
        };
        self.pending = Some(ticket);
        ticket
    }

    /// Make every ticket handed out so far stale.
    fn invalidate(&mut self) {
        self.epoch += 1;
        self.pending = None;
        self.window_opened_at = None;
    }
}
