//! Error types for Neural Breach

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid n-level: {level} (expected {min}..={max})")]
    InvalidLevel { level: u8, min: u8, max: u8 },

    #[error("invalid grid position: {0} (expected 0..=8)")]
    InvalidPosition(u8),

    #[error("invalid letter: {0:?}")]
    InvalidLetter(char),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_level(level: u8) -> Self {
        Self::InvalidLevel {
            level,
            min: crate::types::NLevel::MIN.get(),
            max: crate::types::NLevel::MAX.get(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
