//! # Viva Voice - half-duplex interview session loop
//!
//! Runs one spoken interview: the AI asks, the candidate answers, the AI replies with
//! the next question, until the questions or the time run out. Microphone and speaker
//! are never active together.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Turn Coordinator                         │
//! │  ┌──────────────┐   final    ┌──────────────┐   reply         │
//! │  │ SpeechInput  │──────────▶ │  Interviewer │──────────┐      │
//! │  │ (mic / feed) │            │  (LLM call)  │          ▼      │
//! │  └──────────────┘            └──────────────┘  ┌──────────────┐│
//! │         ▲                                      │ SpeechOutput ││
//! │         └────────────── speech finished ───────│ (console/tts)││
//! │                                                └──────────────┘│
//! │  Countdown ─ expiry ─▶ forced closing      Snapshots ─▶ sled   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod coordinator;
pub mod error;
#[cfg(feature = "speaker")]
pub mod speaker;
pub mod speech_input;
pub mod speech_output;
pub mod timer;

pub use coordinator::{
    Collaborators, CompletionReason, SessionCommand, SessionConfig, SessionEvent, SessionHandle,
    SessionOutcome, SessionState, TurnCoordinator,
};
pub use error::{VoiceError, VoiceResult};
#[cfg(feature = "speaker")]
pub use speaker::{create_best_tts, OpenRouterTts, PlaceholderTts, SpeakerOutput, TtsBackend};
pub use speech_input::{
    ChannelSpeechInput, InputErrorKind, ScriptedSpeechInput, SpeechInput, SpeechInputEvent,
    SpeechInputFeed,
};
pub use speech_output::{reading_time, ConsoleSpeechOutput, SpeechOutput};
pub use timer::Countdown;
pub use viva_core::FeedbackStatus;
