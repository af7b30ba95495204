//! Virtual-time driver
//!
//! Interprets machine effects against a `ManualClock` and an ordered queue of
//! due wakes, so a whole session plays out instantly and the same seed always
//! yields the same record. Entries due at the same instant run in the order they
//! were queued.

use crate::clock::{Clock, ManualClock};
use crate::machine::{Effect, GameEvent, GameMachine, Ticket};
use crate::player::{Player, PlayerMove, Presented};
use chrono::{DateTime, Utc};
use neuralbreach_core::{Error, Phase, Response, Result, Session};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
enum Due {
    Wake(Ticket),
    Respond(Response),
    Quit,
}

pub struct VirtualDriver {
    machine: GameMachine,
    clock: ManualClock,
    start: DateTime<Utc>,
    /// Keyed by (due offset in ms, insertion order).
    queue: BTreeMap<(u64, u64), Due>,
    seq: u64,
    audio_latency: Duration,
    events: Vec<GameEvent>,
    /// Player's answer to the latest block end.
    keep_playing: Option<bool>,
}

impl VirtualDriver {
    pub fn new(machine: GameMachine, start: DateTime<Utc>) -> Self {
        Self {
            machine,
            clock: ManualClock::new(start),
            start,
            queue: BTreeMap::new(),
            seq: 0,
            audio_latency: Duration::ZERO,
            events: Vec::new(),
            keep_playing: None,
        }
    }

    /// Virtual time each stimulus letter takes to play.
    pub fn with_audio_latency(mut self, latency: Duration) -> Self {
        self.audio_latency = latency;
        self
    }

    pub fn machine(&self) -> &GameMachine {
        &self.machine
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Every event published so far, in order.
    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    /// Play one session from start to quit and return its record.
    pub fn run_session(&mut self, user_id: &str, player: &mut dyn Player) -> Result<Session> {
        let effects = self.machine.start_session(user_id, self.clock.now())?;
        self.carry_out(effects, player);

        loop {
            match self.machine.phase() {
                Phase::SessionEnd => break,
                Phase::Idle => return Err(Error::internal("session reset while running")),
                Phase::BlockEnd if self.queue.is_empty() => {
                    let effects = if self.keep_playing.take().unwrap_or(false) {
                        self.machine.continue_session(self.clock.now())?
                    } else {
                        self.machine.quit(self.clock.now())
                    };
                    self.carry_out(effects, player);
                }
                _ => {
                    let Some(((offset, _), due)) = self.queue.pop_first() else {
                        return Err(Error::internal(format!(
                            "no pending work in phase {}",
                            self.machine.phase()
                        )));
                    };
                    self.clock.set(self.start + offset_to_chrono(offset));
                    let now = self.clock.now();
                    let effects = match due {
                        Due::Wake(ticket) => self.machine.resume(ticket, now),
                        Due::Respond(response) => self.machine.respond(response, now),
                        Due::Quit => self.machine.quit(now),
                    };
                    self.carry_out(effects, player);
                }
            }
        }

        self.machine
            .session()
            .cloned()
            .ok_or_else(|| Error::internal("session missing after quit"))
    }

    fn carry_out(&mut self, effects: Vec<Effect>, player: &mut dyn Player) {
        for effect in effects {
            match effect {
                Effect::Schedule { ticket, delay } => self.enqueue(delay, Due::Wake(ticket)),
                Effect::PlayStimulus { ticket, .. } => {
                    self.enqueue(self.audio_latency, Due::Wake(ticket))
                }
                Effect::Cancel(ticket) => {
                    self.queue.retain(|_, due| !matches!(due, Due::Wake(t) if *t == ticket));
                }
                Effect::CancelAll => self.queue.clear(),
                Effect::Emit(event) => {
                    match &event {
                        GameEvent::StimulusPresented { block, trial, level, stimulus } => {
                            let presented = Presented {
                                block: *block,
                                trial: *trial,
                                level: *level,
                                stimulus: *stimulus,
                            };
                            match player.on_stimulus(&presented) {
                                PlayerMove::Respond { response, after } => {
                                    self.enqueue(after, Due::Respond(response))
                                }
                                PlayerMove::Pass => {}
                                PlayerMove::Quit => self.enqueue(Duration::ZERO, Due::Quit),
                            }
                        }
                        GameEvent::BlockEnded { block, next_level } => {
                            self.keep_playing = Some(player.continue_after(block, *next_level));
                        }
                        _ => {}
                    }
                    self.events.push(event);
                }
            }
        }
    }

    fn enqueue(&mut self, delay: Duration, due: Due) {
        let now_offset = (self.clock.now() - self.start).num_milliseconds().max(0) as u64;
        let at = now_offset + delay.as_millis() as u64;
        self.seq += 1;
        debug!(at, ?due, "virtual wake queued");
        self.queue.insert((at, self.seq), due);
    }
}

fn offset_to_chrono(offset_ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(offset_ms as i64)
}
