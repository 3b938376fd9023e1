//! Interview runtime configuration.
//!
//! Loaded from defaults, an optional TOML file and `VIVA__*` environment variables.
//! Change timing, persistence and model choices without code edits.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/viva";
const DEFAULT_LLM_API_URL: &str = "https://openrouter.ai/api/v1";

/// Interview configuration.
///
/// | Key | Default | Description |
/// |-----|---------|-------------|
/// | storage_path | ./data/viva_sessions | Sled directory for resumable snapshots. |
/// | staleness_window_secs | 7200 | Snapshots older than this are never resumed. |
/// | save_debounce_ms | 2000 | Coalescing window for snapshot writes. |
/// | context_turns | 6 | Recent turns sent with each answer request. |
/// | answer_timeout_secs | 20 | Client-side bound on one answer round-trip. |
/// | resume_listening_delay_ms | 500 | Gap between the end of AI speech and re-opening the mic. |
/// | answer_failure_limit | 3 | Consecutive failures on one question before the host is warned. |
/// | closing_phrase_detection | true | End the session when a reply reads like a sign-off. |
/// | speech_words_per_minute | 170 | Reading speed for the console speech output (0 = instant). |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VivaConfig {
    pub storage_path: String,
    pub staleness_window_secs: u64,
    pub save_debounce_ms: u64,
    pub context_turns: usize,
    pub answer_timeout_secs: u64,
    pub resume_listening_delay_ms: u64,
    pub answer_failure_limit: u32,
    pub closing_phrase_detection: bool,
    pub speech_words_per_minute: u32,
    /// OpenAI-compatible gateway base URL (no trailing slash needed).
    pub llm_api_url: String,
    pub answer_model: String,
    pub feedback_model: String,
    pub question_model: String,
    /// API key for the gateway. Prefer env `VIVA_LLM_API_KEY` / `OPENROUTER_API_KEY` over the file.
    #[serde(default)]
    pub llm_api_key: Option<String>,
}

impl Default for VivaConfig {
    fn default() -> Self {
        Self {
            storage_path: "./data/viva_sessions".to_string(),
            staleness_window_secs: 2 * 60 * 60,
            save_debounce_ms: 2000,
            context_turns: 6,
            answer_timeout_secs: 20,
            resume_listening_delay_ms: 500,
            answer_failure_limit: 3,
            closing_phrase_detection: true,
            speech_words_per_minute: 170,
            llm_api_url: DEFAULT_LLM_API_URL.to_string(),
            answer_model: "google/gemini-2.0-flash-001".to_string(),
            feedback_model: "openai/gpt-4o-mini".to_string(),
            question_model: "openai/gpt-4o-mini".to_string(),
            llm_api_key: None,
        }
    }
}

impl VivaConfig {
    /// Load config. Precedence: env `VIVA__*` > file (`VIVA_CONFIG` path or `config/viva.toml`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var("VIVA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load config with an explicit file path (the file is optional).
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let d = Self::default();
        let builder = config::Config::builder()
            .set_default("storage_path", d.storage_path)?
            .set_default("staleness_window_secs", d.staleness_window_secs)?
            .set_default("save_debounce_ms", d.save_debounce_ms)?
            .set_default("context_turns", d.context_turns as u64)?
            .set_default("answer_timeout_secs", d.answer_timeout_secs)?
            .set_default("resume_listening_delay_ms", d.resume_listening_delay_ms)?
            .set_default("answer_failure_limit", d.answer_failure_limit as u64)?
            .set_default("closing_phrase_detection", d.closing_phrase_detection)?
            .set_default("speech_words_per_minute", d.speech_words_per_minute as u64)?
            .set_default("llm_api_url", d.llm_api_url)?
            .set_default("answer_model", d.answer_model)?
            .set_default("feedback_model", d.feedback_model)?
            .set_default("question_model", d.question_model)?;

        // config::File accepts the path with or without the .toml extension.
        let builder = builder.add_source(config::File::from(path).required(false));

        let built = builder
            .add_source(config::Environment::with_prefix("VIVA").separator("__"))
            .build()?;

        let mut cfg: VivaConfig = built.try_deserialize()?;
        if cfg.llm_api_key.is_none() {
            cfg.llm_api_key = env_api_key();
        }
        Ok(cfg)
    }

    /// Resolved API key, or `None` when the gateway is not configured.
    pub fn api_key(&self) -> Option<String> {
        self.llm_api_key
            .clone()
            .or_else(env_api_key)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_window_secs)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_secs(self.answer_timeout_secs)
    }

    pub fn resume_listening_delay(&self) -> Duration {
        Duration::from_millis(self.resume_listening_delay_ms)
    }
}

fn env_api_key() -> Option<String> {
    env_opt_string("VIVA_LLM_API_KEY").or_else(|| env_opt_string("OPENROUTER_API_KEY"))
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_behaviour() {
        let cfg = VivaConfig::default();
        assert_eq!(cfg.staleness_window(), Duration::from_secs(7200));
        assert_eq!(cfg.save_debounce(), Duration::from_secs(2));
        assert_eq!(cfg.context_turns, 6);
        assert!(cfg.closing_phrase_detection);
    }

    #[test]
    fn load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viva.toml");
        std::fs::write(
            &path,
            "staleness_window_secs = 60\ncontext_turns = 4\nanswer_model = \"test/model\"\n",
        )
        .unwrap();

        let cfg = VivaConfig::load_from(&path).unwrap();
        assert_eq!(cfg.staleness_window_secs, 60);
        assert_eq!(cfg.context_turns, 4);
        assert_eq!(cfg.answer_model, "test/model");
        assert_eq!(cfg.save_debounce_ms, 2000);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = VivaConfig::load_from(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(cfg.resume_listening_delay_ms, 500);
    }
}
