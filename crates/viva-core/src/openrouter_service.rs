//! OpenRouter-backed interviewer, feedback and question generation.
//!
//! All three speak the OpenAI-compatible `/chat/completions` API through one
//! [`OpenRouterClient`]. API key: `VIVA_LLM_API_KEY` or `OPENROUTER_API_KEY` in `.env`,
//! or `llm_api_key` in the config file.

use crate::collaborators::{
    AnswerGenerator, AnswerReply, AnswerRequest, FeedbackGenerator,
    PlaceholderFeedback, PlaceholderInterviewer,
};
use crate::config::VivaConfig;
use crate::error::{VivaError, VivaResult};
use crate::feedback::{clean_llm_text, extract_json_object, parse_feedback, InterviewFeedback};
use crate::model::{InterviewQuestion, Speaker, TurnRecord};
use crate::prompts;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const REQUEST_TIMEOUT_SECS: u64 = 60;
const ANSWER_MAX_TOKENS: u32 = 200;
const ANSWER_TEMPERATURE: f32 = 0.7;

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    fn from_turn(turn: &TurnRecord) -> Self {
        let role = match turn.speaker {
            Speaker::Ai => "assistant",
            Speaker::Candidate => "user",
        };
        Self {
            role: role.to_string(),
            content: turn.text.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// Thin chat-completions client shared by the interviewer, feedback and question services.
#[derive(Clone)]
pub struct OpenRouterClient {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into().trim().to_string(),
            client,
        }
    }

    /// Returns `None` when no API key is configured.
    pub fn from_config(cfg: &VivaConfig) -> Option<Self> {
        let key = cfg.api_key()?;
        Some(Self::new(cfg.llm_api_url.clone(), key))
    }

    /// One completion: optional system prompt plus a user message. Returns the trimmed text.
    pub async fn chat(
        &self,
        model: &str,
        system: Option<&str>,
        user: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> VivaResult<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(s) = system {
            messages.push(ChatMessage::system(s));
        }
        messages.push(ChatMessage::user(user));
        self.complete(model, messages, temperature, max_tokens).await
    }

    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> VivaResult<String> {
        let body = ChatRequest {
            model: model.to_string(),
            messages,
            temperature,
            max_tokens,
        };

        let url = format!("{}/chat/completions", self.api_url);
        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "Viva-Interviewer")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(VivaError::LlmStatus { status, body });
        }

        let parsed: ChatResponse = res.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(VivaError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Live interviewer: one short spoken reply per candidate utterance.
pub struct OpenRouterInterviewer {
    client: OpenRouterClient,
    model: String,
}

impl OpenRouterInterviewer {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl AnswerGenerator for OpenRouterInterviewer {
    async fn generate(&self, request: AnswerRequest) -> VivaResult<AnswerReply> {
        let mut messages = Vec::with_capacity(request.recent_turns.len() + 2);
        messages.push(ChatMessage::system(prompts::interviewer_system_prompt(&request)));
        messages.extend(request.recent_turns.iter().map(ChatMessage::from_turn));
        messages.push(ChatMessage::user(request.candidate_utterance.clone()));
        let text = self
            .client
            .complete(
                &self.model,
                messages,
                Some(ANSWER_TEMPERATURE),
                Some(ANSWER_MAX_TOKENS),
            )
            .await?;
        Ok(AnswerReply {
            text,
            is_final_turn: request.is_last_question(),
        })
    }
}

/// Post-interview evaluation from the flattened transcript.
pub struct OpenRouterFeedback {
    client: OpenRouterClient,
    model: String,
}

impl OpenRouterFeedback {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl FeedbackGenerator for OpenRouterFeedback {
    async fn generate(&self, transcript: &str) -> VivaResult<InterviewFeedback> {
        if transcript.trim().is_empty() {
            return Err(VivaError::InvalidRequest("empty transcript".to_string()));
        }
        let user = prompts::feedback_user_prompt(transcript);
        let raw = self.client.chat(&self.model, None, &user, None, None).await?;
        parse_feedback(&raw)
    }
}

/// Inputs for generating an interview question set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewBrief {
    pub job_position: String,
    pub job_description: String,
    pub duration_minutes: u32,
    pub interview_types: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionsEnvelope {
    interview_questions: Vec<InterviewQuestion>,
}

/// Parse a question set from a raw model reply. Entries with an empty question are dropped.
pub fn parse_questions(raw: &str) -> VivaResult<Vec<InterviewQuestion>> {
    let cleaned = clean_llm_text(raw);
    let json = extract_json_object(&cleaned)
        .ok_or_else(|| VivaError::Parse("no JSON object in questions reply".to_string()))?;
    let env: QuestionsEnvelope =
        serde_json::from_str(json).map_err(|e| VivaError::Parse(e.to_string()))?;
    let questions: Vec<InterviewQuestion> = env
        .interview_questions
        .into_iter()
        .filter(|q| !q.question.trim().is_empty())
        .collect();
    if questions.is_empty() {
        return Err(VivaError::EmptyResponse);
    }
    Ok(questions)
}

/// Generates the question list an interview session is created with.
pub struct QuestionGenerator {
    client: OpenRouterClient,
    model: String,
}

impl QuestionGenerator {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub async fn generate(&self, brief: &InterviewBrief) -> VivaResult<Vec<InterviewQuestion>> {
        if brief.job_position.trim().is_empty() || brief.job_description.trim().is_empty() {
            return Err(VivaError::InvalidRequest(
                "job position and description are required".to_string(),
            ));
        }
        if brief.duration_minutes == 0 {
            return Err(VivaError::InvalidRequest("duration must be positive".to_string()));
        }
        let user = prompts::questions_user_prompt(brief);
        let raw = self.client.chat(&self.model, None, &user, None, None).await?;
        let questions = parse_questions(&raw)?;
        info!(
            "Generated {} questions for {}",
            questions.len(),
            brief.job_position
        );
        Ok(questions)
    }
}

/// OpenRouter interviewer when a key is configured, otherwise the offline placeholder.
pub fn create_best_interviewer(cfg: &VivaConfig) -> Arc<dyn AnswerGenerator> {
    match OpenRouterClient::from_config(cfg) {
        Some(client) => {
            info!("Interviewer: OpenRouter ({})", cfg.answer_model);
            Arc::new(OpenRouterInterviewer::new(client, cfg.answer_model.clone()))
        }
        None => {
            warn!("Interviewer: no API key, using placeholder interviewer");
            Arc::new(PlaceholderInterviewer)
        }
    }
}

/// OpenRouter feedback when a key is configured, otherwise the always-pending placeholder.
pub fn create_best_feedback(cfg: &VivaConfig) -> Arc<dyn FeedbackGenerator> {
    match OpenRouterClient::from_config(cfg) {
        Some(client) => {
            info!("Feedback: OpenRouter ({})", cfg.feedback_model);
            Arc::new(OpenRouterFeedback::new(client, cfg.feedback_model.clone()))
        }
        None => {
            warn!("Feedback: no API key, feedback will be reported as pending");
            Arc::new(PlaceholderFeedback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_question_envelope() {
        let raw = r#"```json
{"interviewQuestions":[
  {"question":"Explain borrowing.","type":"Technical"},
  {"question":"  ","type":"Behavioral"},
  {"question":"Tell me about a conflict.","type":"Behavioral"}
]}
```"#;
        let qs = parse_questions(raw).unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[1].category, "Behavioral");
    }

    #[test]
    fn empty_question_list_is_an_error() {
        assert!(matches!(
            parse_questions(r#"{"interviewQuestions":[]}"#),
            Err(VivaError::EmptyResponse)
        ));
    }

    #[test]
    fn turns_map_to_chat_roles() {
        assert_eq!(ChatMessage::from_turn(&TurnRecord::ai("hi")).role, "assistant");
        assert_eq!(ChatMessage::from_turn(&TurnRecord::candidate("hey")).role, "user");
    }

    #[test]
    fn client_strips_trailing_slash() {
        let c = OpenRouterClient::new("http://localhost:9/v1/", " key ");
        assert_eq!(c.api_url, "http://localhost:9/v1");
        assert_eq!(c.api_key, "key");
    }

    #[tokio::test]
    async fn question_generator_validates_brief() {
        let gen = QuestionGenerator::new(OpenRouterClient::new("http://127.0.0.1:9", "k"), "m");
        let brief = InterviewBrief {
            job_position: String::new(),
            job_description: "desc".to_string(),
            duration_minutes: 15,
            interview_types: vec!["Technical".to_string()],
        };
        assert!(matches!(
            gen.generate(&brief).await,
            Err(VivaError::InvalidRequest(_))
        ));
    }

    #[test]
    fn factory_falls_back_without_key() {
        let cfg = VivaConfig {
            llm_api_key: Some("   ".to_string()),
            ..VivaConfig::default()
        };
        assert!(OpenRouterClient::from_config(&cfg).is_none());
    }
}
