//! Error types for the voice interview loop

use thiserror::Error;
use viva_core::VivaError;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can surface from the session loop and its adapters
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Speech input error: {0}")]
    Input(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Interview has no questions")]
    NoQuestions,

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error(transparent)]
    Core(#[from] VivaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
