//! viva-core: interview session model, resumable snapshot persistence, completion
//! records, and the LLM collaborators (interviewer, feedback, question generation).
//!
//! The voice loop lives in `viva-voice`; this crate holds everything it consumes.

mod collaborators;
mod config;
mod error;
mod feedback;
mod model;
mod openrouter_service;
mod persistence;
pub mod prompts;
mod record;
mod store;

pub use collaborators::{
    looks_like_closing, AnswerGenerator, AnswerReply, AnswerRequest, FeedbackGenerator,
    PlaceholderFeedback, PlaceholderInterviewer,
};
pub use config::VivaConfig;
pub use error::{VivaError, VivaResult};
pub use feedback::{parse_feedback, FeedbackRating, InterviewFeedback, STRENGTH_THRESHOLD};
pub use model::{
    format_transcript, now_epoch_millis, InterviewQuestion, InterviewSession, PersistedSnapshot,
    SessionProgress, Speaker, TurnRecord,
};
pub use openrouter_service::{
    create_best_feedback, create_best_interviewer, parse_questions, InterviewBrief,
    OpenRouterClient, OpenRouterFeedback, OpenRouterInterviewer, QuestionGenerator,
};
pub use persistence::{snapshot_key, DebouncedSink, SessionPersistence, SnapshotStore};
pub use record::{record_key, FeedbackStatus, InterviewRecord, InterviewRecordStore};
pub use store::{KvStore, MemoryStore, SledStore};
