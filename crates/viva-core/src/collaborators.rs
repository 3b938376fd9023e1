//! Collaborator contracts consumed by the session loop: answer generation (one AI
//! turn per candidate utterance) and feedback generation (once, after completion).
//!
//! Placeholder implementations keep the loop usable with no gateway configured.

use crate::error::{VivaError, VivaResult};
use crate::feedback::InterviewFeedback;
use crate::model::{InterviewQuestion, TurnRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Phrases that, in a reply, read as the interviewer signing off.
const CLOSING_PHRASES: &[&str] = &[
    "thank you for your time",
    "concludes our interview",
    "interview is complete",
];

/// Heuristic sign-off detection on free-form AI text.
pub fn looks_like_closing(text: &str) -> bool {
    let lower = text.to_lowercase();
    CLOSING_PHRASES.iter().any(|p| lower.contains(p))
}

/// Everything the interviewer needs to produce the next AI turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub current_question: Option<String>,
    pub next_question: Option<String>,
    pub all_questions: Vec<InterviewQuestion>,
    pub recent_turns: Vec<TurnRecord>,
    pub candidate_utterance: String,
    /// 1-based number of the current question.
    pub question_number: usize,
    pub total_questions: usize,
    pub answered_count: usize,
    pub remaining_seconds: u64,
    #[serde(default)]
    pub job_position: Option<String>,
    #[serde(default)]
    pub job_description: Option<String>,
}

impl AnswerRequest {
    pub fn is_last_question(&self) -> bool {
        self.next_question.is_none()
    }
}

/// The AI's reply to one candidate utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerReply {
    pub text: String,
    /// Set when the interviewer knows this reply closes the interview.
    #[serde(default)]
    pub is_final_turn: bool,
}

impl AnswerReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final_turn: false,
        }
    }

    pub fn final_turn(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final_turn: true,
        }
    }
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, request: AnswerRequest) -> VivaResult<AnswerReply>;
}

#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate(&self, transcript: &str) -> VivaResult<InterviewFeedback>;
}

/// Offline interviewer: acknowledges the answer and reads the next question verbatim.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderInterviewer;

#[async_trait]
impl AnswerGenerator for PlaceholderInterviewer {
    async fn generate(&self, request: AnswerRequest) -> VivaResult<AnswerReply> {
        Ok(match request.next_question {
            Some(next) => AnswerReply::new(format!("Thank you for that answer. Next question: {}", next)),
            None => AnswerReply::final_turn(
                "Thank you for that answer. Thank you for your time, the interview is complete.",
            ),
        })
    }
}

/// Offline feedback: always unavailable, so the session reports feedback as pending.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderFeedback;

#[async_trait]
impl FeedbackGenerator for PlaceholderFeedback {
    async fn generate(&self, _transcript: &str) -> VivaResult<InterviewFeedback> {
        Err(VivaError::Unavailable(
            "no LLM gateway configured (set VIVA_LLM_API_KEY or OPENROUTER_API_KEY)".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(next: Option<&str>) -> AnswerRequest {
        AnswerRequest {
            current_question: Some("Q1".to_string()),
            next_question: next.map(String::from),
            all_questions: vec![],
            recent_turns: vec![],
            candidate_utterance: "answer".to_string(),
            question_number: 1,
            total_questions: 2,
            answered_count: 0,
            remaining_seconds: 60,
            job_position: None,
            job_description: None,
        }
    }

    #[test]
    fn closing_detection_is_case_insensitive() {
        assert!(looks_like_closing("Great. Thank You For Your Time!"));
        assert!(looks_like_closing("That concludes our interview today."));
        assert!(!looks_like_closing("Thanks! Next, tell me about a project."));
    }

    #[tokio::test]
    async fn placeholder_reads_next_question() {
        let reply = PlaceholderInterviewer.generate(request(Some("Q2"))).await.unwrap();
        assert!(reply.text.ends_with("Q2"));
        assert!(!reply.is_final_turn);
    }

    #[tokio::test]
    async fn placeholder_closes_after_last_question() {
        let reply = PlaceholderInterviewer.generate(request(None)).await.unwrap();
        assert!(reply.is_final_turn);
        assert!(looks_like_closing(&reply.text));
    }

    #[tokio::test]
    async fn placeholder_feedback_is_unavailable() {
        assert!(PlaceholderFeedback.generate("AI: hi").await.is_err());
    }
}
