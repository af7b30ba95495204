//! Real-time game loop
//!
//! One queue, one consumer. Player commands and timer/audio completions all enter
//! through `input_tx`; the loop hands them to the `GameMachine` and carries out the
//! effects it returns. Timers and audio run as spawned tasks that post a `Wake`
//! back into the queue; each holds a `CancellationToken` so a quit or an early
//! answer can drop it before it fires.

use crate::audio::{self, StimulusAudio};
use crate::clock::Clock;
use crate::machine::{Effect, GameEvent, GameMachine, Ticket};
use neuralbreach_core::{Response, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything that can enter the game queue.
#[derive(Debug, Clone)]
pub enum GameInput {
    StartSession { user_id: String },
    Respond(Response),
    Continue,
    Quit,
    Reset,
    Shutdown,
    /// A timer elapsed or stimulus audio finished.
    Wake(Ticket),
}

pub struct GameLoop {
    /// Inbound queue, the only input.
    input_rx: mpsc::Receiver<GameInput>,
    /// Handle for timer and audio tasks to post wakes.
    input_tx: mpsc::Sender<GameInput>,
    /// Game events to UI layers.
    output_tx: broadcast::Sender<GameEvent>,
    machine: GameMachine,
    audio: Arc<dyn StimulusAudio>,
    clock: Arc<dyn Clock>,
    /// Cancellation for every timer or playback still in flight.
    in_flight: HashMap<Ticket, CancellationToken>,
}

impl GameLoop {
    /// Create a new game loop.
    ///
    /// Returns `(loop, input_tx, output_tx)`. Callers use `input_tx` to send
    /// commands and `output_tx.subscribe()` to follow the game.
    pub fn new(
        machine: GameMachine,
        audio: Arc<dyn StimulusAudio>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::Sender<GameInput>, broadcast::Sender<GameEvent>) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (output_tx, _) = broadcast::channel(1024);

        let game_loop = Self {
            input_rx,
            input_tx: input_tx.clone(),
            output_tx: output_tx.clone(),
            machine,
            audio,
            clock,
            in_flight: HashMap::new(),
        };

        (game_loop, input_tx, output_tx)
    }

    pub fn machine(&self) -> &GameMachine {
        &self.machine
    }

    /// Run until `Shutdown` or until every sender is dropped.
    pub async fn run(&mut self) {
        info!("GameLoop started");
        while let Some(input) = self.input_rx.recv().await {
            let now = self.clock.now();
            let effects = match input {
                GameInput::StartSession { user_id } => self.machine.start_session(user_id, now),
                GameInput::Continue => self.machine.continue_session(now),
                GameInput::Respond(response) => Ok(self.machine.respond(response, now)),
                GameInput::Quit => Ok(self.machine.quit(now)),
                GameInput::Reset => Ok(self.machine.reset()),
                GameInput::Wake(ticket) => {
                    self.in_flight.remove(&ticket);
                    Ok(self.machine.resume(ticket, now))
                }
                GameInput::Shutdown => {
                    info!("GameLoop: received Shutdown");
                    self.cancel_all();
                    break;
                }
            };
            self.apply(effects);
        }
        self.cancel_all();
        info!("GameLoop stopped");
    }

    fn apply(&mut self, effects: Result<Vec<Effect>>) {
        match effects {
            Ok(effects) => {
                for effect in effects {
                    self.carry_out(effect);
                }
            }
            Err(e) => {
                warn!("GameLoop: transition failed: {}", e);
                let _ = self.output_tx.send(GameEvent::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    fn carry_out(&mut self, effect: Effect) {
        match effect {
            Effect::Schedule { ticket, delay } => {
                let cancel = self.track(ticket);
                let input_tx = self.input_tx.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            let _ = input_tx.send(GameInput::Wake(ticket)).await;
                        }
                        _ = cancel.cancelled() => {
                            debug!(?ticket, "timer cancelled");
                        }
                    }
                });
            }
            Effect::PlayStimulus { ticket, letter } => {
                let cancel = self.track(ticket);
                let input_tx = self.input_tx.clone();
                let audio = self.audio.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = audio::present(audio.as_ref(), letter) => {
                            let _ = input_tx.send(GameInput::Wake(ticket)).await;
                        }
                        _ = cancel.cancelled() => {
                            debug!(?ticket, "stimulus playback cancelled");
                        }
                    }
                });
            }
            Effect::Cancel(ticket) => {
                if let Some(cancel) = self.in_flight.remove(&ticket) {
                    cancel.cancel();
                }
            }
            Effect::CancelAll => self.cancel_all(),
            Effect::Emit(event) => {
                let _ = self.output_tx.send(event);
            }
        }
    }

    fn track(&mut self, ticket: Ticket) -> CancellationToken {
        let cancel = CancellationToken::new();
        self.in_flight.insert(ticket, cancel.clone());
        cancel
    }

    fn cancel_all(&mut self) {
        for (_, cancel) in self.in_flight.drain() {
            cancel.cancel();
        }
    }
}
