//! Speech Output Adapter contract and the console adapter.
//!
//! `speak` resolves when the utterance finished, was cancelled, or failed; playback
//! errors are logged, never returned, so the session can move on.

use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Speak one utterance. A new call cancels any utterance still in flight.
    async fn speak(&self, text: &str);
    fn cancel_current(&self);
    fn is_speaking(&self) -> bool;
}

/// Time a reader needs for `text` at `words_per_minute`; zero means instant.
pub fn reading_time(text: &str, words_per_minute: u32) -> Duration {
    if words_per_minute == 0 {
        return Duration::ZERO;
    }
    let words = text.split_whitespace().count() as u64;
    Duration::from_millis(words * 60_000 / words_per_minute as u64)
}

/// Tracks the in-flight utterance so a newer `speak` or `cancel_current` can end it.
#[derive(Default)]
pub(crate) struct UtteranceSlot {
    generation: AtomicU64,
    speaking: AtomicBool,
    cancel: Notify,
}

impl UtteranceSlot {
    /// Cancel the previous utterance and claim the slot.
    pub(crate) fn begin(&self) -> u64 {
        self.cancel.notify_waiters();
        self.speaking.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub(crate) fn finish(&self, generation: u64) {
        if self.is_current(generation) {
            self.speaking.store(false, Ordering::SeqCst);
        }
    }

    pub(crate) fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.speaking.store(false, Ordering::SeqCst);
        self.cancel.notify_waiters();
    }

    pub(crate) fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    pub(crate) fn cancelled(&self) -> tokio::sync::futures::Notified<'_> {
        self.cancel.notified()
    }
}

/// Writes each utterance as an `AI: ...` line and holds for its reading time.
pub struct ConsoleSpeechOutput {
    words_per_minute: u32,
    writer: Mutex<Box<dyn Write + Send>>,
    slot: UtteranceSlot,
}

impl ConsoleSpeechOutput {
    pub fn new(words_per_minute: u32) -> Self {
        Self::with_writer(words_per_minute, Box::new(std::io::stdout()))
    }

    pub fn with_writer(words_per_minute: u32, writer: Box<dyn Write + Send>) -> Self {
        Self {
            words_per_minute,
            writer: Mutex::new(writer),
            slot: UtteranceSlot::default(),
        }
    }
}

#[async_trait]
impl SpeechOutput for ConsoleSpeechOutput {
    async fn speak(&self, text: &str) {
        let generation = self.slot.begin();
        let cancelled = self.slot.cancelled();
        tokio::pin!(cancelled);

        if let Ok(mut w) = self.writer.lock() {
            if let Err(e) = writeln!(w, "AI: {}", text).and_then(|_| w.flush()) {
                warn!("Console output failed: {}", e);
            }
        }

        let hold = reading_time(text, self.words_per_minute);
        if !hold.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(hold) => {}
                _ = &mut cancelled => debug!("Console output: utterance cancelled"),
            }
        }
        self.slot.finish(generation);
    }

    fn cancel_current(&self) {
        self.slot.cancel();
    }

    fn is_speaking(&self) -> bool {
        self.slot.is_speaking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reading_time_scales_with_words() {
        assert_eq!(reading_time("one two three", 0), Duration::ZERO);
        assert_eq!(reading_time("one two three", 60), Duration::from_secs(3));
        assert_eq!(reading_time("", 170), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn speak_holds_for_reading_time() {
        let out = ConsoleSpeechOutput::with_writer(60, Box::new(std::io::sink()));
        let start = tokio::time::Instant::now();
        out.speak("four words right here").await;
        assert_eq!(start.elapsed(), Duration::from_secs(4));
        assert!(!out.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_ends_utterance_early() {
        let out = Arc::new(ConsoleSpeechOutput::with_writer(60, Box::new(std::io::sink())));
        let speaker = Arc::clone(&out);
        let start = tokio::time::Instant::now();
        let task = tokio::spawn(async move { speaker.speak("a fairly long sentence to read out loud").await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(out.is_speaking());
        out.cancel_current();
        task.await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(8));
        assert!(!out.is_speaking());
    }
}
