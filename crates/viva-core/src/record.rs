//! Completion records: what is kept about an interview once its snapshot is cleared.
//!
//! One record per interview, keyed `interview_feedback_{id}`. Feedback that could not be
//! generated at completion stays `Pending` in the record and can be regenerated later.

use crate::collaborators::FeedbackGenerator;
use crate::error::{VivaError, VivaResult};
use crate::feedback::InterviewFeedback;
use crate::model::{format_transcript, now_epoch_millis, InterviewSession, TurnRecord};
use crate::store::KvStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "interview_feedback_";

pub fn record_key(interview_id: &str) -> String {
    format!("{}{}", KEY_PREFIX, interview_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "camelCase")]
pub enum FeedbackStatus {
    Ready(InterviewFeedback),
    /// Generation failed or is unavailable; can be retried from the transcript.
    Pending(String),
    /// Nothing to evaluate: the candidate never spoke.
    Skipped,
}

impl FeedbackStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, FeedbackStatus::Pending(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRecord {
    pub interview_id: String,
    pub user_name: String,
    pub user_email: String,
    pub conversation: Vec<TurnRecord>,
    pub feedback: FeedbackStatus,
    /// Only known once feedback is ready.
    pub recommended: Option<bool>,
    pub completed_at_epoch_millis: i64,
}

impl InterviewRecord {
    pub fn new(session: &InterviewSession, conversation: Vec<TurnRecord>, feedback: FeedbackStatus) -> Self {
        let mut record = Self {
            interview_id: session.interview_id.clone(),
            user_name: session.candidate_name.clone(),
            user_email: session.candidate_email.clone(),
            conversation,
            feedback: FeedbackStatus::Skipped,
            recommended: None,
            completed_at_epoch_millis: now_epoch_millis(),
        };
        record.set_feedback(feedback);
        record
    }

    pub fn set_feedback(&mut self, feedback: FeedbackStatus) {
        self.recommended = match &feedback {
            FeedbackStatus::Ready(f) => Some(f.is_recommended()),
            _ => None,
        };
        self.feedback = feedback;
    }

    pub fn transcript(&self) -> String {
        format_transcript(&self.conversation)
    }
}

/// Load/save of completion records, sharing the snapshot store's backend.
#[derive(Clone)]
pub struct InterviewRecordStore {
    store: Arc<dyn KvStore>,
}

impl InterviewRecordStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn save(&self, record: &InterviewRecord) -> VivaResult<()> {
        let bytes = serde_json::to_vec(record)?;
        self.store.set(&record_key(&record.interview_id), &bytes)?;
        debug!("Interview record saved for {}", record.interview_id);
        Ok(())
    }

    pub fn load(&self, interview_id: &str) -> VivaResult<Option<InterviewRecord>> {
        match self.store.get(&record_key(interview_id))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Retry pending feedback and store the result. Ready and skipped records are returned as-is.
    ///
    /// On failure the record stays pending with the new reason and the error is returned.
    pub async fn regenerate_feedback(
        &self,
        interview_id: &str,
        generator: &dyn FeedbackGenerator,
    ) -> VivaResult<InterviewRecord> {
        let mut record = self.load(interview_id)?.ok_or_else(|| {
            VivaError::InvalidRequest(format!("no completed interview {}", interview_id))
        })?;
        if !record.feedback.is_pending() {
            debug!("Feedback for {} is not pending, nothing to do", interview_id);
            return Ok(record);
        }

        match generator.generate(&record.transcript()).await {
            Ok(feedback) => {
                record.set_feedback(FeedbackStatus::Ready(feedback));
                self.save(&record)?;
                info!("Feedback generated for {}", interview_id);
                Ok(record)
            }
            Err(e) => {
                warn!("Feedback for {} still pending: {}", interview_id, e);
                record.set_feedback(FeedbackStatus::Pending(e.to_string()));
                self.save(&record)?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::PlaceholderFeedback;
    use crate::feedback::FeedbackRating;
    use crate::model::InterviewQuestion;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct FixedFeedback;

    #[async_trait]
    impl FeedbackGenerator for FixedFeedback {
        async fn generate(&self, transcript: &str) -> VivaResult<InterviewFeedback> {
            assert!(transcript.contains("Candidate: Borrowing"));
            Ok(InterviewFeedback {
                rating: FeedbackRating {
                    technical_skills: 8,
                    communication: 8,
                    problem_solving: 7,
                    experience: 6,
                },
                summary: "Solid".to_string(),
                recommendation: "Yes".to_string(),
                recommendation_msg: "Hire".to_string(),
            })
        }
    }

    fn session() -> InterviewSession {
        InterviewSession {
            interview_id: "iv-1".to_string(),
            candidate_name: "Ada".to_string(),
            candidate_email: "ada@example.com".to_string(),
            job_position: None,
            job_description: None,
            question_list: vec![InterviewQuestion::new("Q1?", "Technical")],
            duration_seconds: 60,
        }
    }

    fn pending_record() -> InterviewRecord {
        InterviewRecord::new(
            &session(),
            vec![TurnRecord::ai("Q1?"), TurnRecord::candidate("Borrowing lends access.")],
            FeedbackStatus::Pending("gateway down".to_string()),
        )
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let json = serde_json::to_value(pending_record()).unwrap();
        assert_eq!(json["userName"], "Ada");
        assert_eq!(json["userEmail"], "ada@example.com");
        assert_eq!(json["feedback"]["status"], "pending");
        assert!(json["recommended"].is_null());
    }

    #[tokio::test]
    async fn pending_feedback_is_regenerated_and_stored() {
        let records = InterviewRecordStore::new(Arc::new(MemoryStore::new()));
        records.save(&pending_record()).unwrap();

        let updated = records.regenerate_feedback("iv-1", &FixedFeedback).await.unwrap();
        assert!(matches!(updated.feedback, FeedbackStatus::Ready(_)));
        assert_eq!(updated.recommended, Some(true));
        assert_eq!(records.load("iv-1").unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn failed_regeneration_keeps_record_pending() {
        let records = InterviewRecordStore::new(Arc::new(MemoryStore::new()));
        records.save(&pending_record()).unwrap();

        assert!(records.regenerate_feedback("iv-1", &PlaceholderFeedback).await.is_err());
        let stored = records.load("iv-1").unwrap().unwrap();
        assert!(stored.feedback.is_pending());
        assert_eq!(stored.conversation.len(), 2);
    }

    #[tokio::test]
    async fn unknown_interview_is_rejected() {
        let records = InterviewRecordStore::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            records.regenerate_feedback("missing", &FixedFeedback).await,
            Err(VivaError::InvalidRequest(_))
        ));
    }
}
