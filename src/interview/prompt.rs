// src/interview/prompt.rs
//! Prompt assembly for the candidate summary and the interview coach

use crate::core::pdf_text::CvText;
use crate::linkedin::LinkedinData;

use super::onboarding::OnboardingAnswers;

pub const SUMMARY_INSTRUCTION: &str =
    "Please provide a concise summary of the candidate based on the following information.";

/// Returned instead of calling the model when there is nothing to summarise
pub const NOTHING_TO_SUMMARIZE: &str =
    "No CV, LinkedIn data or onboarding answers provided to summarize.";

pub const OPENING_LINE: &str =
    "Okay, I understand. Let's warm up with something simple, but important: Tell me about yourself.";

const CV_FALLBACK: &str = "CV not provided or text extraction failed.";
const LINKEDIN_FALLBACK: &str = "LinkedIn data not provided or fetch error.";

/// Build the summary prompt from whatever sources are present.
///
/// `None` when no source contributes a block.
pub fn summary_prompt(
    cv: &CvText,
    linkedin: &LinkedinData,
    answers: &OnboardingAnswers,
) -> Option<String> {
    let mut blocks = Vec::new();

    if let Some(formatted) = answers.format_for_prompt() {
        blocks.push(format!("--- Onboarding Answers ---\n{}", formatted));
    }
    if let Some(text) = cv.text() {
        blocks.push(format!("--- CV Data ---\n{}", text));
    }
    if let Some(profile) = linkedin.prompt_block() {
        blocks.push(format!("--- LinkedIn Data ---\n{}", profile));
    }

    if blocks.is_empty() {
        return None;
    }

    Some(format!("{}\n\n{}", SUMMARY_INSTRUCTION, blocks.join("\n\n")))
}

/// Instructions and candidate context that prime the interview chat
pub fn coach_context(
    summary: &str,
    answers: &OnboardingAnswers,
    cv: &CvText,
    linkedin: &LinkedinData,
) -> String {
    format!(
        r#"You are an expert interview coach. Your goal is to help the candidate practice for their interviews.
Start the conversation by asking: "Tell me about yourself."
Then, continue the interview based on their responses and the context provided below.
Ask relevant behavioral questions, technical questions (if applicable based on their role), and situational questions.
Provide constructive feedback on their answers if they ask for it or if you see clear areas for improvement.
Keep your responses as an interviewer concise and focused on the interview flow.

Here is some context about the candidate:

--- Candidate Summary ---
{}

--- Candidate's Answers to Initial Questions ---
{}

--- Candidate's CV (if provided) ---
{}

--- Candidate's LinkedIn Data (if provided) ---
{}

Begin the interview now. Your first question should be: "Tell me about yourself.""#,
        summary,
        answers.display_text(),
        cv.text().unwrap_or(CV_FALLBACK),
        linkedin.prompt_block().as_deref().unwrap_or(LINKEDIN_FALLBACK),
    )
}
