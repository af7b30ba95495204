//! Letter playback collaborator
//!
//! The engine only needs "play this letter"; decoding, volume and output devices
//! live behind this trait. A failed playback never stops the game.

use neuralbreach_core::Letter;
use tracing::{debug, warn};

pub type AudioResult<T> = Result<T, AudioError>;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio unavailable: {0}")]
    Unavailable(String),

    #[error("playback failed for {letter}: {message}")]
    PlaybackFailed { letter: Letter, message: String },

    #[error("cancelled")]
    Cancelled,
}

impl AudioError {
    pub fn playback(letter: Letter, message: impl Into<String>) -> Self {
        Self::PlaybackFailed {
            letter,
            message: message.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait StimulusAudio: Send + Sync {
    fn name(&self) -> &str;

    /// Play `letter`, resolving once playback has started or failed.
    async fn play(&self, letter: Letter) -> AudioResult<()>;
}

/// Plays nothing. Used headless and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAudio;

#[async_trait::async_trait]
impl StimulusAudio for SilentAudio {
    fn name(&self) -> &str {
        "silent"
    }

    async fn play(&self, _letter: Letter) -> AudioResult<()> {
        Ok(())
    }
}

/// Retries a failed playback up to `max_retries` more times.
pub struct RetryingAudio<A> {
    inner: A,
    max_retries: u32,
}

impl<A: StimulusAudio> RetryingAudio<A> {
    pub fn new(inner: A, max_retries: u32) -> Self {
        Self { inner, max_retries }
    }
}

#[async_trait::async_trait]
impl<A: StimulusAudio> StimulusAudio for RetryingAudio<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn play(&self, letter: Letter) -> AudioResult<()> {
        let mut attempt = 0;
        loop {
            match self.inner.play(letter).await {
                Ok(()) => return Ok(()),
                Err(AudioError::Cancelled) => return Err(AudioError::Cancelled),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!("retry {}/{} for letter {}: {}", attempt, self.max_retries, letter, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Play a stimulus letter, logging instead of propagating failure.
/// Returns whether the letter was actually heard.
pub async fn present(audio: &dyn StimulusAudio, letter: Letter) -> bool {
    match audio.play(letter).await {
        Ok(()) => true,
        Err(e) => {
            warn!(backend = audio.name(), "stimulus audio failed, continuing: {}", e);
            false
        }
    }
}
