//! Prompt templates for the interviewer, feedback and question generation.

use crate::collaborators::AnswerRequest;
use crate::openrouter_service::InterviewBrief;

/// Feedback prompt; `{conversation}` is replaced with the flattened transcript.
pub const FEEDBACK_USER_TEMPLATE: &str = r#"{conversation}

Based on the interview conversation between the AI interviewer and the candidate above,
give feedback on the candidate's performance.

Rate the candidate from 0 to 10 on technical skills, communication, problem solving and experience.
Write a summary of the interview in 3 lines, a one word recommendation (Yes or No) on whether
the candidate should be hired, and a one line recommendation message.

Return ONLY JSON in this exact shape:
{
  "feedback": {
    "rating": {
      "technicalSkills": 5,
      "communication": 6,
      "problemSolving": 4,
      "experience": 7
    },
    "summary": "<three line summary>",
    "recommendation": "Yes",
    "recommendationMsg": "<one line message>"
  }
}"#;

/// Question generation prompt; placeholders are replaced from an [`InterviewBrief`].
pub const QUESTIONS_USER_TEMPLATE: &str = r#"You are an expert technical interviewer.
Based on the following inputs, generate a well-structured list of high-quality interview questions:

Job Title: {job_position}
Job Description: {job_description}
Interview Duration: {duration} minutes
Interview Type: {interview_types}

Your task:
- Analyze the job description to identify key responsibilities, required skills, and expected experience.
- Generate a list of interview questions that fits a {duration}-minute interview.
- Adjust the number and depth of questions to match the interview duration.
- Ensure the questions match the tone and structure of a real-life {interview_types} interview.

Return ONLY JSON in this shape:
{
  "interviewQuestions": [
    { "question": "", "type": "Technical" }
  ]
}"#;

/// Per-turn system prompt for the interviewer.
pub fn interviewer_system_prompt(req: &AnswerRequest) -> String {
    let all = req
        .all_questions
        .iter()
        .map(|q| q.question.as_str())
        .collect::<Vec<_>>()
        .join("\n- ");
    let description = match req.job_description.as_deref().map(str::trim) {
        Some(d) if !d.is_empty() => format!("Job Description: {}\n\n", d),
        _ => String::new(),
    };
    format!(
        "You are an AI interviewer conducting a job interview for the position of {position}.\n\n\
{description}\
Current Question (#{number}): {current}\n\
Next Question: {next}\n\
Total Questions: {total}\n\
Questions Answered: {answered}\n\
Remaining Time: {remaining}\n\n\
All Questions:\n- {all}\n\n\
Candidate's response: \"{utterance}\"\n\n\
Guidelines:\n\
- Provide brief feedback on the answer (1-2 sentences)\n\
- Then ask the next question naturally\n\
- If this was the last question, thank them and say the interview is complete\n\
- Keep responses concise for voice\n\
- Be encouraging but professional",
        position = req.job_position.as_deref().unwrap_or("the role"),
        description = description,
        number = req.question_number,
        current = req.current_question.as_deref().unwrap_or(""),
        next = req.next_question.as_deref().unwrap_or("This is the last question"),
        total = req.total_questions,
        answered = req.answered_count,
        remaining = format_clock(req.remaining_seconds),
        all = all,
        utterance = req.candidate_utterance,
    )
}

pub fn feedback_user_prompt(transcript: &str) -> String {
    FEEDBACK_USER_TEMPLATE.replace("{conversation}", transcript)
}

pub fn questions_user_prompt(brief: &InterviewBrief) -> String {
    QUESTIONS_USER_TEMPLATE
        .replace("{job_position}", &brief.job_position)
        .replace("{job_description}", &brief.job_description)
        .replace("{duration}", &brief.duration_minutes.to_string())
        .replace("{interview_types}", &brief.interview_types.join(", "))
}

/// `mm:ss`.
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InterviewQuestion, TurnRecord};

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(1805), "30:05");
    }

    #[test]
    fn system_prompt_carries_question_context() {
        let req = AnswerRequest {
            current_question: Some("What is ownership?".to_string()),
            next_question: None,
            all_questions: vec![InterviewQuestion::new("What is ownership?", "Technical")],
            recent_turns: vec![TurnRecord::ai("Hello")],
            candidate_utterance: "Each value has one owner".to_string(),
            question_number: 1,
            total_questions: 1,
            answered_count: 0,
            remaining_seconds: 125,
            job_position: Some("Rust Engineer".to_string()),
            job_description: Some("Build low-latency storage engines".to_string()),
        };
        let prompt = interviewer_system_prompt(&req);
        assert!(prompt.contains("position of Rust Engineer"));
        assert!(prompt.contains("This is the last question"));
        assert!(prompt.contains("Remaining Time: 02:05"));
        assert!(prompt.contains("- What is ownership?"));
        assert!(prompt.contains("Job Description: Build low-latency storage engines"));
    }

    #[test]
    fn system_prompt_omits_missing_description() {
        let req = AnswerRequest {
            current_question: Some("Q1".to_string()),
            next_question: Some("Q2".to_string()),
            all_questions: vec![],
            recent_turns: vec![],
            candidate_utterance: "answer".to_string(),
            question_number: 1,
            total_questions: 2,
            answered_count: 0,
            remaining_seconds: 60,
            job_position: None,
            job_description: Some("   ".to_string()),
        };
        let prompt = interviewer_system_prompt(&req);
        assert!(prompt.contains("position of the role"));
        assert!(!prompt.contains("Job Description"));
    }
}
