//! **SpeakerOutput**: synthesized speech through the default audio device.
//!
//! Text goes through a [`TtsBackend`] (OpenAI-compatible `/audio/speech`, or the silent
//! placeholder) and plays on a `rodio::Sink`. The output stream is not `Send`, so it lives
//! on a dedicated playback thread; the sink handle is shared.

use crate::error::{VoiceError, VoiceResult};
use crate::speech_output::{reading_time, SpeechOutput, UtteranceSlot};
use async_trait::async_trait;
use rodio::{OutputStream, Sink, Source};
use std::io::Cursor;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use viva_core::VivaConfig;

const DEFAULT_TTS_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "nova";
const PLAYBACK_POLL: Duration = Duration::from_millis(50);

/// Turns text into audio bytes (WAV/MP3).
pub trait TtsBackend: Send + Sync {
    /// Return an empty vec to skip playback.
    fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>>;
}

/// Silent TTS: nothing plays; the utterance is held for its reading time instead.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

impl TtsBackend for PlaceholderTts {
    fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// OpenAI-compatible TTS (`TTS_API_URL`, `TTS_API_KEY`, `TTS_MODEL`, `TTS_VOICE`).
#[derive(Debug, Clone)]
pub struct OpenRouterTts {
    pub base_url: String,
    pub api_key: String,
    /// tts-1 (fast) or tts-1-hd.
    pub model: String,
    pub voice: String,
    /// Built on first use, on the blocking pool.
    client: OnceLock<reqwest::blocking::Client>,
}

impl OpenRouterTts {
    /// Falls back to the interview gateway key when no TTS key is set.
    pub fn from_env(cfg: &VivaConfig) -> VoiceResult<Self> {
        let base_url = std::env::var("TTS_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("TTS_API_KEY")
            .ok()
            .or_else(|| cfg.api_key())
            .ok_or_else(|| {
                VoiceError::Config(
                    "TTS requires TTS_API_KEY, VIVA_LLM_API_KEY, or OPENROUTER_API_KEY".to_string(),
                )
            })?;
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| DEFAULT_TTS_MODEL.to_string());
        let voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| DEFAULT_VOICE.to_string());
        Self::new(base_url, api_key, model, voice)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> VoiceResult<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(VoiceError::Config("empty TTS API key".to_string()));
        }
        Ok(Self {
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            voice: voice.into(),
            client: OnceLock::new(),
        })
    }

    fn client(&self) -> VoiceResult<&reqwest::blocking::Client> {
        if let Some(c) = self.client.get() {
            return Ok(c);
        }
        let built = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(self.client.get_or_init(|| built))
    }
}

impl TtsBackend for OpenRouterTts {
    fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
        });
        let res = self
            .client()?
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// OpenAI-compatible TTS when a key is available, otherwise the silent placeholder.
pub fn create_best_tts(cfg: &VivaConfig) -> Arc<dyn TtsBackend> {
    match OpenRouterTts::from_env(cfg) {
        Ok(tts) => {
            info!("TTS: OpenAI-compatible ({}, voice {})", tts.model, tts.voice);
            Arc::new(tts)
        }
        Err(e) => {
            warn!("TTS: {}; using placeholder", e);
            Arc::new(PlaceholderTts)
        }
    }
}

/// Speaks through the default output device.
pub struct SpeakerOutput {
    tts: Arc<dyn TtsBackend>,
    sink: Arc<Sink>,
    words_per_minute: u32,
    slot: UtteranceSlot,
    // Dropping the sender ends the playback thread and releases the device.
    _shutdown: std_mpsc::Sender<()>,
}

impl SpeakerOutput {
    pub fn new(tts: Arc<dyn TtsBackend>, words_per_minute: u32) -> VoiceResult<Self> {
        let (ready_tx, ready_rx) = std_mpsc::channel::<VoiceResult<Arc<Sink>>>();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("viva-speaker".to_string())
            .spawn(move || {
                let opened = OutputStream::try_default()
                    .map_err(|e| VoiceError::Playback(e.to_string()))
                    .and_then(|(stream, handle)| {
                        Sink::try_new(&handle)
                            .map(|sink| (stream, Arc::new(sink)))
                            .map_err(|e| VoiceError::Playback(e.to_string()))
                    });
                match opened {
                    Ok((_stream, sink)) => {
                        let _ = ready_tx.send(Ok(sink));
                        // Hold the stream until the output is dropped.
                        let _ = shutdown_rx.recv();
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })?;

        let sink = ready_rx
            .recv()
            .map_err(|e| VoiceError::Playback(format!("playback thread exited: {}", e)))??;
        info!("SpeakerOutput: sink ready for TTS playback");
        Ok(Self {
            tts,
            sink,
            words_per_minute,
            slot: UtteranceSlot::default(),
            _shutdown: shutdown_tx,
        })
    }

    fn play_bytes(&self, bytes: Vec<u8>) -> VoiceResult<()> {
        let source = rodio::Decoder::new(Cursor::new(bytes))
            .map_err(|e| VoiceError::Playback(format!("Decode failed: {}", e)))?;
        self.sink.append(source.convert_samples::<f32>());
        self.sink.play();
        Ok(())
    }
}

#[async_trait]
impl SpeechOutput for SpeakerOutput {
    async fn speak(&self, text: &str) {
        let generation = self.slot.begin();
        self.sink.stop();

        let tts = Arc::clone(&self.tts);
        let owned = text.to_string();
        let audio = match tokio::task::spawn_blocking(move || tts.synthesize(&owned)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!("TTS failed: {}", e);
                Vec::new()
            }
            Err(e) => {
                warn!("TTS task failed: {}", e);
                Vec::new()
            }
        };
        if !self.slot.is_current(generation) {
            debug!("SpeakerOutput: utterance cancelled during synthesis");
            return;
        }

        if audio.is_empty() {
            let cancelled = self.slot.cancelled();
            tokio::pin!(cancelled);
            tokio::select! {
                _ = tokio::time::sleep(reading_time(text, self.words_per_minute)) => {}
                _ = &mut cancelled => {}
            }
        } else if let Err(e) = self.play_bytes(audio) {
            warn!("Playback failed: {}", e);
        } else {
            while self.slot.is_current(generation) && !self.sink.empty() {
                tokio::time::sleep(PLAYBACK_POLL).await;
            }
        }
        self.slot.finish(generation);
    }

    fn cancel_current(&self) {
        self.slot.cancel();
        self.sink.stop();
        debug!("SpeakerOutput: stopped");
    }

    fn is_speaking(&self) -> bool {
        self.slot.is_speaking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_tts_returns_empty() {
        let out = PlaceholderTts.synthesize("hello").unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(
            OpenRouterTts::new("http://127.0.0.1:9", "  ", "tts-1", "nova"),
            Err(VoiceError::Config(_))
        ));
    }

    #[test]
    fn blank_text_skips_synthesis() {
        let tts = OpenRouterTts::new("http://127.0.0.1:9", "k", "tts-1", "nova").unwrap();
        assert!(tts.synthesize("   ").unwrap().is_empty());
    }
}
