// src/interview/onboarding.rs
//! The fixed onboarding questions and the wizard that walks through them

use serde::{Deserialize, Serialize};

pub const INTRO_TEXT: &str = "Hey, welcome \u{2014} I\u{2019}m really glad you\u{2019}re here.
Before we dive into practice, I want to understand a bit about you \u{2014} where you\u{2019}re coming from, what you\u{2019}re aiming for, and how I can be most helpful.
Just a few questions, and then we\u{2019}ll jump in.";

pub const QUESTION_COUNT: usize = 5;

pub const QUESTIONS: [&str; QUESTION_COUNT] = [
    "1. What\u{2019}s your current role, and how long have you been doing it?",
    "2. What\u{2019}s got you preparing for interviews right now? (e.g., job hunting, promotion, skill improvement)",
    "3. Where are you in your interview process? (e.g., early, in the loop, sharpening up)",
    "4. Any particular role or company you\u{2019}ve got your eye on? (e.g., PM at Google, Marketing lead at Series A startup)",
    "5. If we could fast-forward a few weeks \u{2014} what do you wish felt easier? (e.g., clearer answers, more confident, less rambling, managing nerves)",
];

pub const NO_ANSWERS_TEXT: &str = "User did not provide answers to initial questions.";

/// Free-text answers, one slot per question
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingAnswers {
    answers: [String; QUESTION_COUNT],
}

impl OnboardingAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the answer for question `index`; `false` when out of range
    pub fn set(&mut self, index: usize, answer: impl Into<String>) -> bool {
        match self.answers.get_mut(index) {
            Some(slot) => {
                *slot = answer.into();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.answers.get(index).map(String::as_str)
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| !a.trim().is_empty()).count()
    }

    /// Question/answer pairs, in question order, with the raw answer text
    pub fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        QUESTIONS.iter().copied().zip(self.answers.iter().map(String::as_str))
    }

    /// Answered questions as `Q:`/`A:` blocks; `None` when nothing was answered
    pub fn format_for_prompt(&self) -> Option<String> {
        let blocks: Vec<String> = self
            .pairs()
            .filter(|(_, answer)| !answer.trim().is_empty())
            .map(|(question, answer)| format!("Q: {}\nA: {}", question, answer.trim()))
            .collect();

        if blocks.is_empty() {
            None
        } else {
            Some(blocks.join("\n\n"))
        }
    }

    pub fn display_text(&self) -> String {
        self.format_for_prompt()
            .unwrap_or_else(|| NO_ANSWERS_TEXT.to_string())
    }
}

/// Linear Back/Next cursor over the questions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingWizard {
    position: usize,
}

impl OnboardingWizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> &'static str {
        QUESTIONS[self.position]
    }

    pub fn is_first(&self) -> bool {
        self.position == 0
    }

    pub fn is_last(&self) -> bool {
        self.position + 1 == QUESTION_COUNT
    }

    /// Advance one question; stays on the last one
    pub fn next(&mut self) -> usize {
        if !self.is_last() {
            self.position += 1;
        }
        self.position
    }

    /// Step back one question; stays on the first one
    pub fn back(&mut self) -> usize {
        self.position = self.position.saturating_sub(1);
        self.position
    }
}
