//! Viva console: run a voice interview from the terminal.
//!
//! Usage:
//!   viva-console interview --name "Ada" --questions questions.json [--id ID] [--email E] [--position P] [--minutes 15] [--speak]
//!   viva-console questions --position "Rust Engineer" --description "..." [--minutes 15] [--types Technical,Behavioral]
//!   viva-console feedback --id ID | --transcript transcript.txt
//!
//! Typed lines stand in for the recognizer's final transcripts. `/pause`, `/resume` and
//! `/submit` control the session; Ctrl-C pauses and exits so the interview can be resumed.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use viva_core::{
    create_best_feedback, create_best_interviewer, parse_questions, FeedbackGenerator,
    InterviewBrief, InterviewFeedback, InterviewQuestion, InterviewRecordStore, InterviewSession,
    OpenRouterClient, QuestionGenerator, SledStore, SnapshotStore, VivaConfig,
};
use viva_voice::{
    ChannelSpeechInput, Collaborators, ConsoleSpeechOutput, FeedbackStatus, SessionConfig,
    SessionEvent, SessionHandle, SessionState, SpeechInputFeed, SpeechOutput, TurnCoordinator,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const DEFAULT_MINUTES: u64 = 15;
/// How often the remaining time is printed.
const TICK_PRINT_EVERY_SECS: u64 = 30;

#[tokio::main]
async fn main() -> CliResult<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[viva-console] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let command = args.next();
    let flags = Flags::parse(args);
    let cfg = VivaConfig::load()?;

    match command.as_deref() {
        Some("interview") => run_interview(&cfg, &flags).await,
        Some("questions") => generate_questions(&cfg, &flags).await,
        Some("feedback") => generate_feedback(&cfg, &flags).await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
struct Flags {
    id: Option<String>,
    name: Option<String>,
    email: Option<String>,
    position: Option<String>,
    description: Option<String>,
    minutes: Option<u64>,
    types: Vec<String>,
    questions: Option<String>,
    transcript: Option<String>,
    speak: bool,
}

impl Flags {
    fn parse(mut args: impl Iterator<Item = String>) -> Self {
        let mut flags = Flags::default();
        while let Some(a) = args.next() {
            match a.as_str() {
                "--id" => flags.id = args.next(),
                "--name" => flags.name = args.next(),
                "--email" => flags.email = args.next(),
                "--position" => flags.position = args.next(),
                "--description" => flags.description = args.next(),
                "--minutes" => flags.minutes = args.next().and_then(|m| m.parse().ok()),
                "--types" => {
                    flags.types = args
                        .next()
                        .map(|t| {
                            t.split(',')
                                .map(|s| s.trim().to_string())
                                .filter(|s| !s.is_empty())
                                .collect()
                        })
                        .unwrap_or_default();
                }
                "--questions" => flags.questions = args.next(),
                "--transcript" => flags.transcript = args.next(),
                "--speak" => flags.speak = true,
                other => eprintln!("[viva-console] ignoring unknown argument {}", other),
            }
        }
        flags
    }
}

fn print_usage() {
    eprintln!("Viva: voice interview session loop");
    eprintln!("  interview --name N --questions FILE   Run (or resume) an interview");
    eprintln!("      [--id ID] [--email E] [--position P] [--minutes M] [--speak]");
    eprintln!("  questions --position P --description D  Generate a question set (JSON on stdout)");
    eprintln!("      [--minutes M] [--types Technical,Behavioral]");
    eprintln!("  feedback --id ID                      Retry pending feedback for a finished interview");
    eprintln!("  feedback --transcript FILE            Generate feedback for a transcript file");
    eprintln!();
    eprintln!("While interviewing: type an answer and press Enter; /pause, /resume, /submit.");
    eprintln!("Requires VIVA_LLM_API_KEY or OPENROUTER_API_KEY for a live interviewer (else placeholder).");
    eprintln!("Config: VIVA_CONFIG or config/viva.toml; VIVA__* env overrides.");
}

/// Accepts a bare JSON array of questions or the `{"interviewQuestions": [...]}` envelope.
fn load_questions(path: &str) -> CliResult<Vec<InterviewQuestion>> {
    let raw = std::fs::read_to_string(path)?;
    if let Ok(list) = serde_json::from_str::<Vec<InterviewQuestion>>(&raw) {
        return Ok(list
            .into_iter()
            .filter(|q| !q.question.trim().is_empty())
            .collect());
    }
    Ok(parse_questions(&raw)?)
}

fn default_interview_id(name: &str, email: &str) -> String {
    let basis = if email.trim().is_empty() { name } else { email };
    let slug: String = basis
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("interview-{}", slug)
}

async fn run_interview(cfg: &VivaConfig, flags: &Flags) -> CliResult<()> {
    let name = flags.name.clone().ok_or("interview requires --name")?;
    let questions_path = flags.questions.as_deref().ok_or("interview requires --questions FILE")?;
    let question_list = load_questions(questions_path)?;
    let email = flags.email.clone().unwrap_or_default();
    let interview_id = flags
        .id
        .clone()
        .unwrap_or_else(|| default_interview_id(&name, &email));

    let total_questions = question_list.len();
    let session = InterviewSession {
        interview_id: interview_id.clone(),
        candidate_name: name,
        candidate_email: email,
        job_position: flags.position.clone(),
        job_description: flags.description.clone(),
        question_list,
        duration_seconds: flags.minutes.unwrap_or(DEFAULT_MINUTES) * 60,
    };

    let store = SledStore::open_path(Path::new(&cfg.storage_path))?;
    let snapshots = SnapshotStore::new(Arc::new(store), cfg.staleness_window());
    let collaborators = Collaborators {
        interviewer: create_best_interviewer(cfg),
        feedback: create_best_feedback(cfg),
    };
    let output = speech_output(cfg, flags.speak)?;
    let (input, feed) = ChannelSpeechInput::new();

    let mut coordinator = TurnCoordinator::new(
        session,
        Box::new(input),
        output,
        collaborators,
        snapshots,
        SessionConfig::from(cfg),
    )?;
    let handle = coordinator.handle();
    let events = coordinator
        .take_events()
        .ok_or("session events already taken")?;

    let paused = Arc::new(Notify::new());
    tokio::spawn(print_events(events, Arc::clone(&paused)));
    tokio::spawn(read_typed_answers(feed, handle.clone()));

    info!("Interview {} starting", interview_id);
    let run = tokio::spawn(coordinator.run());
    tokio::pin!(run);

    let outcome = tokio::select! {
        joined = &mut run => joined??,
        _ = tokio::signal::ctrl_c() => {
            let _ = handle.pause();
            if tokio::time::timeout(Duration::from_secs(2), paused.notified()).await.is_err() {
                warn!("Session did not confirm the pause; the last few seconds may not be saved");
            }
            eprintln!("\nInterview paused and saved. Run the same command again to resume.");
            return Ok(());
        }
    };

    println!("\n--- transcript ---\n{}", outcome.transcript);
    println!(
        "\nAnswered {} of {} questions ({:?}).",
        outcome.progress.answered_indices.len(),
        total_questions,
        outcome.reason
    );
    match outcome.feedback {
        FeedbackStatus::Ready(feedback) => {
            print_feedback(&feedback)?;
        }
        FeedbackStatus::Pending(reason) => {
            println!(
                "Feedback pending ({}). Retry with `viva-console feedback --id {}`.",
                reason, outcome.interview_id
            );
        }
        FeedbackStatus::Skipped => println!("No answers were given; no feedback generated."),
    }
    Ok(())
}

#[cfg(feature = "speaker")]
fn speech_output(cfg: &VivaConfig, speak: bool) -> CliResult<Arc<dyn SpeechOutput>> {
    if speak {
        let tts = viva_voice::create_best_tts(cfg);
        return Ok(Arc::new(viva_voice::SpeakerOutput::new(tts, cfg.speech_words_per_minute)?));
    }
    Ok(Arc::new(ConsoleSpeechOutput::new(cfg.speech_words_per_minute)))
}

#[cfg(not(feature = "speaker"))]
fn speech_output(cfg: &VivaConfig, speak: bool) -> CliResult<Arc<dyn SpeechOutput>> {
    if speak {
        warn!("--speak needs the `speaker` feature; printing replies instead");
    }
    Ok(Arc::new(ConsoleSpeechOutput::new(cfg.speech_words_per_minute)))
}

async fn read_typed_answers(feed: SpeechInputFeed, handle: SessionHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("stdin read failed: {}", e);
                break;
            }
        };
        let sent = match line.trim() {
            "/pause" => handle.pause(),
            "/resume" => handle.resume(),
            "/submit" => handle.submit(),
            "" => Ok(()),
            text => {
                if !feed.final_transcript(text) {
                    eprintln!("(microphone is off; wait for the interviewer to finish)");
                }
                Ok(())
            }
        };
        if sent.is_err() {
            break;
        }
    }
}

async fn print_events(
    mut events: tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
    paused: Arc<Notify>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::StateChanged { to, .. } => {
                match to {
                    SessionState::Listening => eprintln!("[listening] type your answer"),
                    SessionState::Thinking => eprintln!("[thinking]"),
                    SessionState::Paused => {
                        eprintln!("[paused] /resume to continue");
                        paused.notify_one();
                    }
                    _ => {}
                }
            }
            SessionEvent::Tick { remaining_seconds } => {
                if remaining_seconds > 0 && remaining_seconds % TICK_PRINT_EVERY_SECS == 0 {
                    eprintln!("[{}:{:02} left]", remaining_seconds / 60, remaining_seconds % 60);
                }
            }
            SessionEvent::Resumed {
                question_index,
                remaining_seconds,
                ..
            } => eprintln!(
                "[resumed at question {} with {}:{:02} left]",
                question_index + 1,
                remaining_seconds / 60,
                remaining_seconds % 60
            ),
            SessionEvent::AnswerServiceDegraded {
                consecutive_failures,
            } => eprintln!(
                "[warning] the interviewer failed {} times in a row; /submit to finish now",
                consecutive_failures
            ),
            SessionEvent::InputError(kind) => eprintln!("[input] {:?}", kind),
            SessionEvent::Aborted { reason } => eprintln!("[aborted] {}", reason),
            SessionEvent::Completed { reason, .. } => eprintln!("[completed] {:?}", reason),
            SessionEvent::InterimTranscript(_) | SessionEvent::TurnRecorded { .. } => {}
        }
    }
}

async fn generate_questions(cfg: &VivaConfig, flags: &Flags) -> CliResult<()> {
    let client = OpenRouterClient::from_config(cfg)
        .ok_or("question generation requires VIVA_LLM_API_KEY or OPENROUTER_API_KEY")?;
    let brief = InterviewBrief {
        job_position: flags.position.clone().unwrap_or_default(),
        job_description: flags.description.clone().unwrap_or_default(),
        duration_minutes: flags.minutes.unwrap_or(DEFAULT_MINUTES) as u32,
        interview_types: if flags.types.is_empty() {
            vec!["Technical".to_string(), "Behavioral".to_string()]
        } else {
            flags.types.clone()
        },
    };
    let questions = QuestionGenerator::new(client, cfg.question_model.clone())
        .generate(&brief)
        .await?;
    println!("{}", serde_json::to_string_pretty(&questions)?);
    Ok(())
}

async fn generate_feedback(cfg: &VivaConfig, flags: &Flags) -> CliResult<()> {
    let generator = create_best_feedback(cfg);

    if let Some(id) = flags.id.as_deref() {
        let store = SledStore::open_path(Path::new(&cfg.storage_path))?;
        let records = InterviewRecordStore::new(Arc::new(store));
        let record = records.regenerate_feedback(id, generator.as_ref()).await?;
        return match record.feedback {
            FeedbackStatus::Ready(feedback) => print_feedback(&feedback),
            FeedbackStatus::Skipped => {
                println!("Interview {} had no answers; no feedback to generate.", id);
                Ok(())
            }
            FeedbackStatus::Pending(reason) => Err(reason.into()),
        };
    }

    let path = flags
        .transcript
        .as_deref()
        .ok_or("feedback requires --id ID or --transcript FILE")?;
    let transcript = std::fs::read_to_string(path)?;
    if transcript.trim().is_empty() {
        return Err("transcript is empty".into());
    }
    let feedback = generator.generate(&transcript).await?;
    print_feedback(&feedback)
}

fn print_feedback(feedback: &InterviewFeedback) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(feedback)?);
    println!(
        "Average rating {:.1}/10, recommended: {}",
        feedback.average_rating(),
        if feedback.is_recommended() { "yes" } else { "no" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse_known_arguments() {
        let args = [
            "--name", "Ada", "--minutes", "20", "--types", "Technical, Behavioral,", "--speak",
        ]
        .iter()
        .map(|s| s.to_string());
        let flags = Flags::parse(args);
        assert_eq!(flags.name.as_deref(), Some("Ada"));
        assert_eq!(flags.minutes, Some(20));
        assert_eq!(flags.types, vec!["Technical", "Behavioral"]);
        assert!(flags.speak);
    }

    #[test]
    fn interview_id_prefers_email() {
        assert_eq!(default_interview_id("Ada L", "ada@x.io"), "interview-ada-x-io");
        assert_eq!(default_interview_id("Ada L", ""), "interview-ada-l");
    }
}
