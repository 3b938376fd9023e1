//! **Turn Coordinator**: the half-duplex interview session loop.
//!
//! One task owns all session state and reacts to one event at a time: speech input
//! events, speech output completion, the answer round-trip, host commands, the
//! countdown and its display tick. The microphone and the speaker are never active
//! together; every transition that opens one closes the other first.
//!
//! ```text
//! Idle ─start─▶ Speaking(opening) ─▶ Listening ─final─▶ Thinking ─reply─▶ Speaking ─▶ Listening | Completed
//!                      ▲                                                      │
//!                      └──────────── Paused (pause/resume from any active) ◀──┘
//! ```

use crate::error::{VoiceError, VoiceResult};
use crate::speech_input::{InputErrorKind, SpeechInput, SpeechInputEvent};
use crate::speech_output::SpeechOutput;
use crate::timer::Countdown;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use viva_core::{
    format_transcript, looks_like_closing, now_epoch_millis, AnswerGenerator, AnswerReply,
    AnswerRequest, FeedbackGenerator, FeedbackStatus, InterviewRecord, InterviewRecordStore,
    InterviewSession, PersistedSnapshot, SessionPersistence, SessionProgress, Speaker,
    SnapshotStore, TurnRecord, VivaConfig, VivaError, VivaResult,
};

const CLARIFICATION_TEXT: &str =
    "I apologize, but I'm having trouble processing. Could you please repeat that?";
const TIME_UP_TEXT: &str = "Your interview time is up. Thank you for your responses. We will now generate your feedback.";
const SUBMIT_TEXT: &str =
    "Thank you for participating in this interview. We will now generate your feedback.";
const WRAP_UP_TEXT: &str = "Let me wrap up your interview.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Listening,
    Thinking,
    Speaking,
    Paused,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Listening | SessionState::Thinking | SessionState::Speaking
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a session reached `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionReason {
    QuestionsExhausted,
    InterviewerClosed,
    TimeUp,
    Submitted,
}

/// Loop timing and policy knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub context_turns: usize,
    pub answer_timeout: Duration,
    /// Gap between the end of AI speech and re-opening the microphone.
    pub resume_listening_delay: Duration,
    /// Consecutive answer failures on one question before `AnswerServiceDegraded` is emitted.
    pub answer_failure_limit: u32,
    pub closing_phrase_detection: bool,
    pub save_debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&VivaConfig::default())
    }
}

impl From<&VivaConfig> for SessionConfig {
    fn from(cfg: &VivaConfig) -> Self {
        Self {
            context_turns: cfg.context_turns,
            answer_timeout: cfg.answer_timeout(),
            resume_listening_delay: cfg.resume_listening_delay(),
            answer_failure_limit: cfg.answer_failure_limit,
            closing_phrase_detection: cfg.closing_phrase_detection,
            save_debounce: cfg.save_debounce(),
        }
    }
}

/// External collaborators for one session.
#[derive(Clone)]
pub struct Collaborators {
    pub interviewer: Arc<dyn AnswerGenerator>,
    pub feedback: Arc<dyn FeedbackGenerator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Pause,
    Resume,
    Submit,
}

/// Cloneable control surface for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn pause(&self) -> VoiceResult<()> {
        self.send(SessionCommand::Pause)
    }

    pub fn resume(&self) -> VoiceResult<()> {
        self.send(SessionCommand::Resume)
    }

    /// End the interview early with the closing utterance.
    pub fn submit(&self) -> VoiceResult<()> {
        self.send(SessionCommand::Submit)
    }

    pub fn send(&self, command: SessionCommand) -> VoiceResult<()> {
        self.tx
            .send(command)
            .map_err(|e| VoiceError::ChannelSend(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    InterimTranscript(String),
    TurnRecorded {
        turn: TurnRecord,
        question_index: usize,
        answered: usize,
    },
    Tick {
        remaining_seconds: u64,
    },
    /// Restored from a saved snapshot.
    Resumed {
        turns: usize,
        question_index: usize,
        remaining_seconds: u64,
    },
    AnswerServiceDegraded {
        consecutive_failures: u32,
    },
    InputError(InputErrorKind),
    Completed {
        reason: CompletionReason,
        transcript: String,
    },
    Aborted {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub interview_id: String,
    pub reason: CompletionReason,
    pub transcript: String,
    pub turns: Vec<TurnRecord>,
    pub progress: SessionProgress,
    pub feedback: FeedbackStatus,
}

#[derive(Debug, Clone)]
struct Utterance {
    text: String,
    /// Forced closings end the session once spoken.
    forced: Option<CompletionReason>,
    final_turn: bool,
}

impl Utterance {
    fn turn(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            forced: None,
            final_turn: false,
        }
    }

    fn closing(text: impl Into<String>, reason: CompletionReason) -> Self {
        Self {
            text: text.into(),
            forced: Some(reason),
            final_turn: false,
        }
    }
}

type AnswerFuture = BoxFuture<'static, VivaResult<AnswerReply>>;
type SpeechFuture = BoxFuture<'static, ()>;

enum Event {
    Command(SessionCommand),
    CommandsClosed,
    Input(SpeechInputEvent),
    InputClosed,
    AnswerReady(VivaResult<AnswerReply>),
    SpeechFinished,
    ListenDelayElapsed,
    TimerExpired,
    Tick,
}

/// Drives one interview from opening to completion. Consumed by [`TurnCoordinator::run`].
pub struct TurnCoordinator {
    session: InterviewSession,
    config: SessionConfig,
    input: Box<dyn SpeechInput>,
    input_events: Option<mpsc::UnboundedReceiver<SpeechInputEvent>>,
    output: Arc<dyn SpeechOutput>,
    collaborators: Collaborators,
    persistence: SessionPersistence,
    records: InterviewRecordStore,

    command_tx: mpsc::UnboundedSender<SessionCommand>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    commands_open: bool,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,

    state: SessionState,
    turns: Vec<TurnRecord>,
    progress: SessionProgress,
    countdown: Countdown,

    pending_answer: Option<AnswerFuture>,
    in_flight_utterance: Option<String>,
    speaking: Option<SpeechFuture>,
    current_utterance: Option<Utterance>,
    /// Utterance interrupted or produced while paused, delivered on resume.
    queued_utterance: Option<Utterance>,
    listen_at: Option<Instant>,
    closing: bool,
    consecutive_failures: u32,
}

impl TurnCoordinator {
    pub fn new(
        session: InterviewSession,
        mut input: Box<dyn SpeechInput>,
        output: Arc<dyn SpeechOutput>,
        collaborators: Collaborators,
        snapshots: SnapshotStore,
        config: SessionConfig,
    ) -> VoiceResult<Self> {
        let input_events = input
            .take_events()
            .ok_or_else(|| VoiceError::Input("speech input events already taken".to_string()))?;
        let records = InterviewRecordStore::new(snapshots.store());
        let persistence =
            SessionPersistence::new(snapshots, session.interview_id.clone(), config.save_debounce);
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let progress = SessionProgress::fresh(session.duration_seconds, now_epoch_millis());
        let countdown = Countdown::new(session.duration_seconds);

        Ok(Self {
            session,
            config,
            input,
            input_events: Some(input_events),
            output,
            collaborators,
            persistence,
            records,
            command_tx,
            commands,
            commands_open: true,
            events_tx,
            events_rx: Some(events_rx),
            state: SessionState::Idle,
            turns: Vec::new(),
            progress,
            countdown,
            pending_answer: None,
            in_flight_utterance: None,
            speaking: None,
            current_utterance: None,
            queued_utterance: None,
            listen_at: None,
            closing: false,
            consecutive_failures: 0,
        })
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.command_tx.clone(),
        }
    }

    /// Session event stream; can be taken once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.take()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion.
    ///
    /// Returns `Err(VoiceError::PermissionDenied)` when the microphone is denied; the
    /// snapshot is kept so the interview can be resumed.
    pub async fn run(mut self) -> VoiceResult<SessionOutcome> {
        self.start()?;

        let mut ticker = tokio::time::interval_at(
            Instant::now() + Duration::from_secs(1),
            Duration::from_secs(1),
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            let event = tokio::select! {
                cmd = self.commands.recv(), if self.commands_open => match cmd {
                    Some(c) => Event::Command(c),
                    None => Event::CommandsClosed,
                },
                ev = recv_opt(&mut self.input_events) => match ev {
                    Some(e) => Event::Input(e),
                    None => Event::InputClosed,
                },
                reply = await_opt(&mut self.pending_answer) => Event::AnswerReady(reply),
                _ = await_opt(&mut self.speaking) => Event::SpeechFinished,
                _ = sleep_until_opt(self.listen_at) => Event::ListenDelayElapsed,
                _ = sleep_until_opt(self.countdown.deadline()) => Event::TimerExpired,
                _ = ticker.tick(), if self.countdown.is_running() => Event::Tick,
            };

            if let Some(reason) = self.handle_event(event)? {
                break reason;
            }
        };

        Ok(self.complete(reason).await)
    }

    fn start(&mut self) -> VoiceResult<()> {
        if self.session.question_list.is_empty() {
            return Err(VoiceError::NoQuestions);
        }
        let total = self.session.total_questions();

        let opening = match self.persistence.load().filter(|s| s.is_active) {
            Some(snapshot) => {
                self.turns = snapshot.turns;
                self.progress = snapshot.progress;
                self.progress.current_question_index =
                    self.progress.current_question_index.min(total);
                self.progress.remaining_seconds = self
                    .progress
                    .remaining_from_wall_clock(self.session.duration_seconds, now_epoch_millis());
                info!(
                    "Resuming interview {} at question {} with {}s left",
                    self.session.interview_id,
                    self.progress.current_question_index + 1,
                    self.progress.remaining_seconds
                );
                self.emit(SessionEvent::Resumed {
                    turns: self.turns.len(),
                    question_index: self.progress.current_question_index,
                    remaining_seconds: self.progress.remaining_seconds,
                });
                self.resume_greeting()
            }
            None => {
                self.progress = SessionProgress::fresh(self.session.duration_seconds, now_epoch_millis());
                self.turns.clear();
                info!("Starting interview {}", self.session.interview_id);
                Utterance::turn(self.opening_greeting())
            }
        };

        self.countdown = Countdown::new(self.progress.remaining_seconds);
        self.countdown.resume();
        self.closing = opening.forced.is_some();
        self.record(TurnRecord::ai(opening.text.clone()));
        self.begin_speaking(opening);
        Ok(())
    }

    fn opening_greeting(&self) -> String {
        let role = match &self.session.job_position {
            Some(p) if !p.trim().is_empty() => format!("the {} role", p.trim()),
            _ => "this role".to_string(),
        };
        let first = self
            .session
            .question(0)
            .map(|q| q.question.as_str())
            .unwrap_or_default();
        format!(
            "Hello {}! I'm your AI interviewer today for {}. We have {} questions and {} minutes. Let's begin! {}",
            self.session.candidate_name,
            role,
            self.session.total_questions(),
            self.session.duration_minutes(),
            first
        )
    }

    fn resume_greeting(&self) -> Utterance {
        let total = self.session.total_questions();
        if self.progress.is_exhausted(total) {
            return Utterance::closing(WRAP_UP_TEXT, CompletionReason::QuestionsExhausted);
        }
        if self.progress.remaining_seconds == 0 {
            return Utterance::closing(WRAP_UP_TEXT, CompletionReason::TimeUp);
        }
        let next = self
            .session
            .question(self.progress.current_question_index)
            .map(|q| q.question.as_str())
            .unwrap_or_default();
        Utterance::turn(format!(
            "Welcome back {}! Let's continue your interview. Here's your next question: {}",
            self.session.candidate_name, next
        ))
    }

    fn handle_event(&mut self, event: Event) -> VoiceResult<Option<CompletionReason>> {
        match event {
            Event::Command(SessionCommand::Pause) => self.pause(),
            Event::Command(SessionCommand::Resume) => self.resume()?,
            Event::Command(SessionCommand::Submit) => {
                if matches!(self.state, SessionState::Idle | SessionState::Completed | SessionState::Aborted)
                    || self.closing
                {
                    debug!("Submit ignored in {}", self.state);
                } else {
                    info!("Candidate submitted interview {}", self.session.interview_id);
                    self.force_close(SUBMIT_TEXT, CompletionReason::Submitted);
                }
            }
            Event::CommandsClosed => self.commands_open = false,
            Event::Input(ev) => self.on_input(ev)?,
            Event::InputClosed => {
                warn!("Speech input stream closed");
                self.input_events = None;
            }
            Event::AnswerReady(reply) => {
                self.pending_answer = None;
                self.on_answer(reply)?;
            }
            Event::SpeechFinished => {
                self.speaking = None;
                if let Some(utterance) = self.current_utterance.take() {
                    if let Some(reason) = self.completion_reason(&utterance) {
                        return Ok(Some(reason));
                    }
                }
                self.enter_listening()?;
            }
            Event::ListenDelayElapsed => {
                self.listen_at = None;
                if self.state == SessionState::Listening {
                    self.open_microphone()?;
                }
            }
            Event::TimerExpired => {
                if self.countdown.check_expired() {
                    self.progress.remaining_seconds = 0;
                    self.emit(SessionEvent::Tick { remaining_seconds: 0 });
                    if self.closing {
                        debug!("Time up while closing; letting the closing finish");
                    } else {
                        info!("Interview {} time is up", self.session.interview_id);
                        self.force_close(TIME_UP_TEXT, CompletionReason::TimeUp);
                    }
                }
            }
            Event::Tick => {
                let remaining_seconds = self.countdown.remaining_seconds();
                self.progress.remaining_seconds = remaining_seconds;
                self.emit(SessionEvent::Tick { remaining_seconds });
            }
        }
        Ok(None)
    }

    fn on_input(&mut self, event: SpeechInputEvent) -> VoiceResult<()> {
        match event {
            SpeechInputEvent::Interim(text) => {
                if self.state == SessionState::Listening {
                    self.emit(SessionEvent::InterimTranscript(text));
                }
            }
            SpeechInputEvent::Final(text) => {
                let text = text.trim();
                if self.state != SessionState::Listening {
                    debug!("Final transcript ignored in {}", self.state);
                } else if text.is_empty() {
                    debug!("Empty transcript ignored");
                } else {
                    self.begin_thinking(text.to_string());
                }
            }
            SpeechInputEvent::Error(kind) if kind.is_fatal() => {
                return Err(self.abort(format!("{:?}", kind)));
            }
            SpeechInputEvent::Error(kind) => {
                debug!("Transient speech input error: {:?}", kind);
                self.emit(SessionEvent::InputError(kind));
                if self.state == SessionState::Listening
                    && self.listen_at.is_none()
                    && !self.input.is_active()
                {
                    self.open_microphone()?;
                }
            }
        }
        Ok(())
    }

    fn begin_thinking(&mut self, utterance: String) {
        self.input.stop();
        self.set_state(SessionState::Thinking);

        let request = self.answer_request(&utterance);
        let interviewer = Arc::clone(&self.collaborators.interviewer);
        let timeout = self.config.answer_timeout;
        self.pending_answer = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, interviewer.generate(request)).await {
                Ok(reply) => reply,
                Err(_) => Err(VivaError::Timeout(timeout.as_secs())),
            }
        }));
        self.in_flight_utterance = Some(utterance);
    }

    fn answer_request(&self, utterance: &str) -> AnswerRequest {
        let index = self.progress.current_question_index;
        let total = self.session.total_questions();
        let skip = self.turns.len().saturating_sub(self.config.context_turns);
        AnswerRequest {
            current_question: self.session.question(index).map(|q| q.question.clone()),
            next_question: self.session.question(index + 1).map(|q| q.question.clone()),
            all_questions: self.session.question_list.clone(),
            recent_turns: self.turns[skip..].to_vec(),
            candidate_utterance: utterance.to_string(),
            question_number: (index + 1).min(total),
            total_questions: total,
            answered_count: self.progress.answered_indices.len(),
            remaining_seconds: self.countdown.remaining_seconds(),
            job_position: self.session.job_position.clone(),
            job_description: self.session.job_description.clone(),
        }
    }

    fn on_answer(&mut self, reply: VivaResult<AnswerReply>) -> VoiceResult<()> {
        let Some(candidate) = self.in_flight_utterance.take() else {
            return Ok(());
        };
        self.record(TurnRecord::candidate(candidate));

        let utterance = match reply {
            Ok(reply) => {
                self.consecutive_failures = 0;
                self.progress.advance(self.session.total_questions());
                self.record(TurnRecord::ai(reply.text.clone()));
                Utterance {
                    text: reply.text,
                    forced: None,
                    final_turn: reply.is_final_turn,
                }
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "Answer generation failed ({} in a row): {}",
                    self.consecutive_failures, e
                );
                if self.consecutive_failures >= self.config.answer_failure_limit {
                    self.emit(SessionEvent::AnswerServiceDegraded {
                        consecutive_failures: self.consecutive_failures,
                    });
                }
                self.record(TurnRecord::ai(CLARIFICATION_TEXT));
                Utterance::turn(CLARIFICATION_TEXT)
            }
        };

        if self.state == SessionState::Paused {
            debug!("Reply arrived while paused; queued for resume");
            self.queued_utterance = Some(utterance);
        } else {
            self.begin_speaking(utterance);
        }
        Ok(())
    }

    fn begin_speaking(&mut self, utterance: Utterance) {
        self.input.stop();
        self.listen_at = None;
        self.set_state(SessionState::Speaking);

        let output = Arc::clone(&self.output);
        let text = utterance.text.clone();
        self.speaking = Some(Box::pin(async move { output.speak(&text).await }));
        self.current_utterance = Some(utterance);
    }

    fn enter_listening(&mut self) -> VoiceResult<()> {
        if self.config.resume_listening_delay.is_zero() {
            self.open_microphone()?;
            self.set_state(SessionState::Listening);
        } else {
            self.set_state(SessionState::Listening);
            self.listen_at = Some(Instant::now() + self.config.resume_listening_delay);
        }
        Ok(())
    }

    fn open_microphone(&mut self) -> VoiceResult<()> {
        if self.speaking.is_some() {
            return Ok(());
        }
        match self.input.start() {
            Ok(()) => Ok(()),
            Err(VoiceError::PermissionDenied(reason)) => Err(self.abort(reason)),
            Err(e) => {
                warn!("Speech input failed to start: {}", e);
                self.emit(SessionEvent::InputError(InputErrorKind::Other(e.to_string())));
                Ok(())
            }
        }
    }

    fn completion_reason(&self, utterance: &Utterance) -> Option<CompletionReason> {
        if let Some(reason) = utterance.forced {
            return Some(reason);
        }
        if self.progress.is_exhausted(self.session.total_questions()) {
            return Some(CompletionReason::QuestionsExhausted);
        }
        if utterance.final_turn
            || (self.config.closing_phrase_detection && looks_like_closing(&utterance.text))
        {
            return Some(CompletionReason::InterviewerClosed);
        }
        if self.countdown.has_expired() {
            return Some(CompletionReason::TimeUp);
        }
        None
    }

    /// Pre-empt whatever is happening with a closing utterance.
    fn force_close(&mut self, text: &str, reason: CompletionReason) {
        self.closing = true;
        self.input.stop();
        self.listen_at = None;
        if self.speaking.take().is_some() {
            self.output.cancel_current();
        }
        self.current_utterance = None;
        self.queued_utterance = None;
        if self.pending_answer.take().is_some() {
            debug!("Abandoning in-flight answer request");
        }
        if let Some(candidate) = self.in_flight_utterance.take() {
            self.record(TurnRecord::candidate(candidate));
        }
        if reason == CompletionReason::Submitted {
            self.countdown.stop();
        }
        self.record(TurnRecord::ai(text));
        self.begin_speaking(Utterance::closing(text, reason));
    }

    fn pause(&mut self) {
        if !self.state.is_active() {
            debug!("Pause ignored in {}", self.state);
            return;
        }
        self.input.stop();
        self.listen_at = None;
        if self.speaking.take().is_some() {
            self.output.cancel_current();
            self.queued_utterance = self.current_utterance.take();
        }
        self.countdown.pause();
        self.progress.remaining_seconds = self.countdown.remaining_seconds();
        let snapshot = self.snapshot();
        self.persistence.save_immediate(snapshot);
        self.set_state(SessionState::Paused);
        info!(
            "Interview {} paused with {}s left",
            self.session.interview_id, self.progress.remaining_seconds
        );
    }

    fn resume(&mut self) -> VoiceResult<()> {
        if self.state != SessionState::Paused {
            debug!("Resume ignored in {}", self.state);
            return Ok(());
        }
        self.countdown.resume();
        if self.pending_answer.is_some() {
            self.set_state(SessionState::Thinking);
        } else if let Some(utterance) = self.queued_utterance.take() {
            self.begin_speaking(utterance);
        } else {
            self.open_microphone()?;
            self.set_state(SessionState::Listening);
        }
        Ok(())
    }

    /// Fatal input error: keep the snapshot for a later resume and stop everything.
    fn abort(&mut self, reason: String) -> VoiceError {
        error!(
            "Interview {} aborted, microphone unavailable: {}",
            self.session.interview_id, reason
        );
        self.input.stop();
        self.listen_at = None;
        if self.speaking.take().is_some() {
            self.output.cancel_current();
        }
        self.pending_answer = None;
        if let Some(candidate) = self.in_flight_utterance.take() {
            self.record(TurnRecord::candidate(candidate));
        }
        self.countdown.stop();
        self.progress.remaining_seconds = self.countdown.remaining_seconds();
        let snapshot = self.snapshot();
        self.persistence.save_immediate(snapshot);
        self.set_state(SessionState::Aborted);
        self.emit(SessionEvent::Aborted {
            reason: reason.clone(),
        });
        VoiceError::PermissionDenied(reason)
    }

    async fn complete(mut self, reason: CompletionReason) -> SessionOutcome {
        self.input.stop();
        self.output.cancel_current();
        self.countdown.stop();
        self.progress.remaining_seconds = self.countdown.remaining_seconds();
        self.set_state(SessionState::Completed);

        let candidate_spoke = self.turns.iter().any(|t| t.speaker == Speaker::Candidate);
        let initial = if candidate_spoke {
            FeedbackStatus::Pending("feedback not generated yet".to_string())
        } else {
            FeedbackStatus::Skipped
        };
        let mut record = InterviewRecord::new(&self.session, self.turns.clone(), initial);
        self.store_record(&record);
        self.persistence.clear();

        let transcript = format_transcript(&self.turns);
        info!(
            "Interview {} completed ({:?}): {} of {} questions answered",
            self.session.interview_id,
            reason,
            self.progress.answered_indices.len(),
            self.session.total_questions()
        );
        self.emit(SessionEvent::Completed {
            reason,
            transcript: transcript.clone(),
        });

        let feedback = if !candidate_spoke {
            FeedbackStatus::Skipped
        } else {
            let status = match self.collaborators.feedback.generate(&transcript).await {
                Ok(feedback) => FeedbackStatus::Ready(feedback),
                Err(e) => {
                    warn!("Feedback generation failed: {}", e);
                    FeedbackStatus::Pending(e.to_string())
                }
            };
            record.set_feedback(status.clone());
            self.store_record(&record);
            status
        };

        SessionOutcome {
            interview_id: self.session.interview_id.clone(),
            reason,
            transcript,
            turns: self.turns,
            progress: self.progress,
            feedback,
        }
    }

    fn store_record(&self, record: &InterviewRecord) {
        if let Err(e) = self.records.save(record) {
            warn!(
                "Failed to store interview record for {}: {}",
                self.session.interview_id, e
            );
        }
    }

    fn record(&mut self, turn: TurnRecord) {
        info!("{}: {}", turn.speaker, turn.text);
        self.turns.push(turn.clone());
        self.emit(SessionEvent::TurnRecorded {
            turn,
            question_index: self.progress.current_question_index,
            answered: self.progress.answered_indices.len(),
        });
        let snapshot = self.snapshot();
        self.persistence.save(snapshot);
    }

    fn snapshot(&mut self) -> PersistedSnapshot {
        self.progress.remaining_seconds = self.countdown.remaining_seconds();
        PersistedSnapshot::new(self.turns.clone(), self.progress.clone(), true)
    }

    fn set_state(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!("Session state {} -> {}", from, to);
        self.state = to;
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }
}

async fn await_opt<F>(fut: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match fut {
        Some(f) => f.await,
        None => std::future::pending().await,
    }
}

async fn recv_opt<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_live_states_are_active() {
        assert!(SessionState::Listening.is_active());
        assert!(SessionState::Thinking.is_active());
        assert!(SessionState::Speaking.is_active());
        assert!(!SessionState::Paused.is_active());
        assert!(!SessionState::Completed.is_active());
        assert!(!SessionState::Aborted.is_active());
    }

    #[test]
    fn session_config_follows_core_config() {
        let cfg = VivaConfig {
            context_turns: 4,
            resume_listening_delay_ms: 0,
            ..VivaConfig::default()
        };
        let sc = SessionConfig::from(&cfg);
        assert_eq!(sc.context_turns, 4);
        assert!(sc.resume_listening_delay.is_zero());
        assert_eq!(sc.save_debounce, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn handle_reports_closed_session() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SessionHandle { tx };
        drop(rx);
        assert!(matches!(handle.pause(), Err(VoiceError::ChannelSend(_))));
    }
}
