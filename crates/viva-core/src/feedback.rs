//! Structured interview feedback and tolerant parsing of LLM JSON replies.

use crate::error::{VivaError, VivaResult};
use serde::{Deserialize, Serialize};

/// Scores at or above this count as strengths.
pub const STRENGTH_THRESHOLD: u8 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRating {
    #[serde(default)]
    pub technical_skills: u8,
    #[serde(default)]
    pub communication: u8,
    #[serde(default)]
    pub problem_solving: u8,
    #[serde(default)]
    pub experience: u8,
}

impl FeedbackRating {
    fn entries(&self) -> [(&'static str, u8); 4] {
        [
            ("Technical Skills", self.technical_skills),
            ("Communication", self.communication),
            ("Problem Solving", self.problem_solving),
            ("Experience", self.experience),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewFeedback {
    #[serde(default)]
    pub rating: FeedbackRating,
    #[serde(default, alias = "summery")]
    pub summary: String,
    #[serde(default, alias = "Recommendation")]
    pub recommendation: String,
    #[serde(default, alias = "RecommendationMsg")]
    pub recommendation_msg: String,
}

impl InterviewFeedback {
    pub fn average_rating(&self) -> f32 {
        let entries = self.rating.entries();
        entries.iter().map(|(_, v)| *v as f32).sum::<f32>() / entries.len() as f32
    }

    /// "Yes", "Recommended", "Hire" count; anything negated does not.
    pub fn is_recommended(&self) -> bool {
        let r = self.recommendation.trim().to_lowercase();
        if r.starts_with("no") || r.contains("not ") {
            return false;
        }
        r.starts_with("yes") || r.contains("recommend") || r.contains("hire")
    }

    pub fn strengths(&self) -> Vec<(&'static str, u8)> {
        self.rating
            .entries()
            .into_iter()
            .filter(|(_, v)| *v >= STRENGTH_THRESHOLD)
            .collect()
    }

    pub fn improvement_areas(&self) -> Vec<(&'static str, u8)> {
        self.rating
            .entries()
            .into_iter()
            .filter(|(_, v)| *v < STRENGTH_THRESHOLD)
            .collect()
    }
}

#[derive(Deserialize)]
struct FeedbackEnvelope {
    feedback: InterviewFeedback,
}

/// Strip code fences and stray sentence tokens some models emit around JSON.
pub fn clean_llm_text(raw: &str) -> String {
    raw.replace("｜begin▁of▁sentence｜>", "")
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Slice from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse feedback from a raw model reply; accepts a bare object or a `{"feedback": {...}}` envelope.
pub fn parse_feedback(raw: &str) -> VivaResult<InterviewFeedback> {
    let cleaned = clean_llm_text(raw);
    if cleaned.is_empty() {
        return Err(VivaError::EmptyResponse);
    }
    let json = extract_json_object(&cleaned)
        .ok_or_else(|| VivaError::Parse("no JSON object in feedback reply".to_string()))?;
    if let Ok(env) = serde_json::from_str::<FeedbackEnvelope>(json) {
        return Ok(env.feedback);
    }
    serde_json::from_str::<InterviewFeedback>(json).map_err(|e| VivaError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_envelope_with_legacy_keys() {
        let raw = r#"```json
{
  "feedback": {
    "rating": { "technicalSkills": 8, "communication": 6, "problemSolving": 7, "experience": 5 },
    "summery": "Solid fundamentals.",
    "Recommendation": "Yes",
    "RecommendationMsg": "Move to the next round."
  }
}
```"#;
        let fb = parse_feedback(raw).unwrap();
        assert_eq!(fb.rating.technical_skills, 8);
        assert_eq!(fb.summary, "Solid fundamentals.");
        assert!(fb.is_recommended());
        assert_eq!(fb.recommendation_msg, "Move to the next round.");
        assert!((fb.average_rating() - 6.5).abs() < f32::EPSILON);
    }

    #[test]
    fn parses_bare_object_with_surrounding_prose() {
        let raw = "Here you go: {\"rating\":{\"communication\":9},\"summary\":\"Clear\",\"recommendation\":\"Not recommended\"} hope it helps";
        let fb = parse_feedback(raw).unwrap();
        assert_eq!(fb.rating.communication, 9);
        assert!(!fb.is_recommended());
    }

    #[test]
    fn strengths_and_improvements_split_on_threshold() {
        let fb = InterviewFeedback {
            rating: FeedbackRating {
                technical_skills: 7,
                communication: 4,
                problem_solving: 9,
                experience: 6,
            },
            ..Default::default()
        };
        let strengths: Vec<_> = fb.strengths().into_iter().map(|(k, _)| k).collect();
        assert_eq!(strengths, vec!["Technical Skills", "Problem Solving"]);
        assert_eq!(fb.improvement_areas().len(), 2);
    }

    #[test]
    fn rejects_reply_without_json() {
        assert!(matches!(parse_feedback("no idea"), Err(VivaError::Parse(_))));
        assert!(matches!(parse_feedback("```"), Err(VivaError::EmptyResponse)));
    }
}
