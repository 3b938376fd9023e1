//! Speech Input Adapter contract and the adapters shipped with the crate.
//!
//! Recognition engines are host capabilities; the coordinator only sees `start`/`stop`
//! and a stream of [`SpeechInputEvent`]s.

use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Recognition error categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputErrorKind {
    NoSpeech,
    Aborted,
    Network,
    PermissionDenied,
    Other(String),
}

impl InputErrorKind {
    /// Only a denied microphone ends the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, InputErrorKind::PermissionDenied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechInputEvent {
    /// Partial hypothesis; display only.
    Interim(String),
    /// Committed utterance.
    Final(String),
    Error(InputErrorKind),
}

pub trait SpeechInput: Send {
    /// Open the microphone. A denied microphone is `Err(VoiceError::PermissionDenied)`.
    fn start(&mut self) -> VoiceResult<()>;
    /// Close the microphone. Idempotent.
    fn stop(&mut self);
    fn is_active(&self) -> bool;
    /// Event stream; can be taken once.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SpeechInputEvent>>;
}

/// Input fed by the host (typed console lines, an external recognizer).
pub struct ChannelSpeechInput {
    active: Arc<AtomicBool>,
    events_rx: Option<mpsc::UnboundedReceiver<SpeechInputEvent>>,
}

/// Producer side of a [`ChannelSpeechInput`].
#[derive(Clone)]
pub struct SpeechInputFeed {
    active: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<SpeechInputEvent>,
}

impl ChannelSpeechInput {
    pub fn new() -> (Self, SpeechInputFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(false));
        let input = Self {
            active: Arc::clone(&active),
            events_rx: Some(rx),
        };
        (input, SpeechInputFeed { active, tx })
    }
}

impl SpeechInput for ChannelSpeechInput {
    fn start(&mut self) -> VoiceResult<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SpeechInputEvent>> {
        self.events_rx.take()
    }
}

impl SpeechInputFeed {
    pub fn is_listening(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Push a committed utterance. Returns `false` when the microphone is off and the text was dropped.
    pub fn final_transcript(&self, text: impl Into<String>) -> bool {
        if !self.is_listening() {
            debug!("Speech input: microphone off, dropping final transcript");
            return false;
        }
        self.tx.send(SpeechInputEvent::Final(text.into())).is_ok()
    }

    pub fn interim(&self, text: impl Into<String>) -> bool {
        self.is_listening() && self.tx.send(SpeechInputEvent::Interim(text.into())).is_ok()
    }

    pub fn error(&self, kind: InputErrorKind) -> VoiceResult<()> {
        self.tx
            .send(SpeechInputEvent::Error(kind))
            .map_err(|e| VoiceError::ChannelSend(e.to_string()))
    }
}

/// Replays scripted answers: one final transcript each time listening starts.
pub struct ScriptedSpeechInput {
    script: VecDeque<String>,
    active: Arc<AtomicBool>,
    deny_permission: bool,
    tx: mpsc::UnboundedSender<SpeechInputEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<SpeechInputEvent>>,
}

impl ScriptedSpeechInput {
    pub fn new<I, S>(script: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            script: script.into_iter().map(Into::into).collect(),
            active: Arc::new(AtomicBool::new(false)),
            deny_permission: false,
            tx,
            events_rx: Some(rx),
        }
    }

    /// Every `start` fails as if the microphone were blocked.
    pub fn denying_permission(mut self) -> Self {
        self.deny_permission = true;
        self
    }

    /// Shared microphone flag, for half-duplex instrumentation.
    pub fn activity_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl SpeechInput for ScriptedSpeechInput {
    fn start(&mut self) -> VoiceResult<()> {
        if self.deny_permission {
            return Err(VoiceError::PermissionDenied("microphone blocked".to_string()));
        }
        if self.active.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(line) = self.script.pop_front() {
            if let Some(first) = line.split_whitespace().next() {
                let _ = self.tx.send(SpeechInputEvent::Interim(first.to_string()));
            }
            let _ = self.tx.send(SpeechInputEvent::Final(line));
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SpeechInputEvent>> {
        self.events_rx.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_is_idempotent() {
        let (mut input, _feed) = ChannelSpeechInput::new();
        input.stop();
        input.stop();
        assert!(!input.is_active());
        input.start().unwrap();
        input.stop();
        input.stop();
        assert!(!input.is_active());
    }

    #[test]
    fn feed_drops_finals_while_stopped() {
        let (mut input, feed) = ChannelSpeechInput::new();
        let mut rx = input.take_events().unwrap();
        assert!(input.take_events().is_none());

        assert!(!feed.final_transcript("too early"));
        input.start().unwrap();
        assert!(feed.final_transcript("hello"));
        assert_eq!(rx.try_recv().unwrap(), SpeechInputEvent::Final("hello".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn scripted_input_delivers_one_line_per_start() {
        let mut input = ScriptedSpeechInput::new(["first answer", "second"]);
        let mut rx = input.take_events().unwrap();

        input.start().unwrap();
        // already active: no second delivery
        input.start().unwrap();
        assert_eq!(rx.try_recv().unwrap(), SpeechInputEvent::Interim("first".to_string()));
        assert_eq!(
            rx.try_recv().unwrap(),
            SpeechInputEvent::Final("first answer".to_string())
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(input.remaining(), 1);

        input.stop();
        input.start().unwrap();
        assert_eq!(rx.try_recv().unwrap(), SpeechInputEvent::Interim("second".to_string()));
        assert_eq!(rx.try_recv().unwrap(), SpeechInputEvent::Final("second".to_string()));
    }

    #[test]
    fn permission_denied_is_the_only_fatal_kind() {
        assert!(InputErrorKind::PermissionDenied.is_fatal());
        assert!(!InputErrorKind::NoSpeech.is_fatal());
        assert!(!InputErrorKind::Other("x".into()).is_fatal());
        let mut input = ScriptedSpeechInput::new(Vec::<String>::new()).denying_permission();
        assert!(matches!(input.start(), Err(VoiceError::PermissionDenied(_))));
        assert!(!input.is_active());
    }
}
