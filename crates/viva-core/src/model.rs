//! Interview session data model: the session being run, the turns spoken so far,
//! the progress cursor, and the serialized snapshot used for resume-after-reload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One question put to the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewQuestion {
    pub question: String,
    /// Interview type the question belongs to (e.g. "Technical", "Behavioral").
    #[serde(default, alias = "type")]
    pub category: String,
}

impl InterviewQuestion {
    pub fn new(question: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            category: category.into(),
        }
    }
}

/// One candidate's attempt at one interview. Fixed for the life of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    pub interview_id: String,
    pub candidate_name: String,
    #[serde(default)]
    pub candidate_email: String,
    #[serde(default)]
    pub job_position: Option<String>,
    #[serde(default)]
    pub job_description: Option<String>,
    pub question_list: Vec<InterviewQuestion>,
    pub duration_seconds: u64,
}

impl InterviewSession {
    pub fn total_questions(&self) -> usize {
        self.question_list.len()
    }

    pub fn question(&self, index: usize) -> Option<&InterviewQuestion> {
        self.question_list.get(index)
    }

    pub fn duration_minutes(&self) -> u64 {
        self.duration_seconds / 60
    }
}

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    #[serde(rename = "AI")]
    Ai,
    Candidate,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Ai => "AI",
            Speaker::Candidate => "Candidate",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One utterance in the conversation. Turns are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub speaker: Speaker,
    pub text: String,
}

impl TurnRecord {
    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Ai,
            text: text.into(),
        }
    }

    pub fn candidate(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Candidate,
            text: text.into(),
        }
    }
}

/// Flatten turns into the `Speaker: text` transcript handed to feedback generation.
pub fn format_transcript(turns: &[TurnRecord]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.speaker, t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Mutable cursor over a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub current_question_index: usize,
    pub answered_indices: BTreeSet<usize>,
    pub remaining_seconds: u64,
    pub started_at_epoch_millis: i64,
}

impl SessionProgress {
    pub fn fresh(duration_seconds: u64, started_at_epoch_millis: i64) -> Self {
        Self {
            current_question_index: 0,
            answered_indices: BTreeSet::new(),
            remaining_seconds: duration_seconds,
            started_at_epoch_millis,
        }
    }

    /// Mark the current question answered and move on. The index never passes `total`.
    pub fn advance(&mut self, total: usize) {
        if self.current_question_index < total {
            self.answered_indices.insert(self.current_question_index);
            self.current_question_index += 1;
        }
    }

    pub fn is_exhausted(&self, total: usize) -> bool {
        self.current_question_index >= total
    }

    /// Remaining budget recomputed from the start timestamp (wall clock is authoritative after a reload).
    pub fn remaining_from_wall_clock(&self, duration_seconds: u64, now_epoch_millis: i64) -> u64 {
        let elapsed_ms = (now_epoch_millis - self.started_at_epoch_millis).max(0) as u64;
        duration_seconds.saturating_sub(elapsed_ms / 1000)
    }
}

/// Serialized session state kept for resume. Owned by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub turns: Vec<TurnRecord>,
    pub progress: SessionProgress,
    pub is_active: bool,
    /// Write timestamp (ms since epoch); set by the persistence layer on every write.
    #[serde(default)]
    pub saved_at_epoch_millis: i64,
}

impl PersistedSnapshot {
    pub fn new(turns: Vec<TurnRecord>, progress: SessionProgress, is_active: bool) -> Self {
        Self {
            turns,
            progress,
            is_active,
            saved_at_epoch_millis: 0,
        }
    }
}

pub fn now_epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_bounded_by_question_count() {
        let mut p = SessionProgress::fresh(600, 0);
        for _ in 0..5 {
            p.advance(3);
        }
        assert_eq!(p.current_question_index, 3);
        assert_eq!(p.answered_indices.len(), 3);
        assert!(p.is_exhausted(3));
    }

    #[test]
    fn remaining_time_recomputed_from_start() {
        let p = SessionProgress::fresh(600, 1_000);
        assert_eq!(p.remaining_from_wall_clock(600, 1_000 + 90_500), 510);
        assert_eq!(p.remaining_from_wall_clock(600, 1_000 + 3_600_000), 0);
        // clock skew backwards never adds time
        assert_eq!(p.remaining_from_wall_clock(600, 0), 600);
    }

    #[test]
    fn transcript_uses_speaker_labels() {
        let turns = vec![TurnRecord::ai("Hello"), TurnRecord::candidate("Hi there")];
        assert_eq!(format_transcript(&turns), "AI: Hello\nCandidate: Hi there");
    }

    #[test]
    fn question_accepts_type_alias() {
        let q: InterviewQuestion =
            serde_json::from_str(r#"{"question":"Why Rust?","type":"Technical"}"#).unwrap();
        assert_eq!(q.category, "Technical");
    }
}
