// src/interview/session.rs
//! Typed per-session state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::pdf_text::CvText;
use crate::linkedin::{LinkedinCredentials, LinkedinData};
use crate::utils::mask_secret;

use super::onboarding::{OnboardingAnswers, OnboardingWizard};
use super::transcript::{ChatTurn, Transcript};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "reason", rename_all = "snake_case")]
pub enum Stage {
    /// Gathering credentials, CV and answers
    #[default]
    Collecting,
    /// LinkedIn fetch and summary in flight
    Processing,
    Interviewing,
    /// Interview stopped by a model error; only a reset continues
    Halted(String),
}

#[derive(Clone, Default)]
pub struct Credentials {
    pub llm_api_key: String,
    pub linkedin: LinkedinCredentials,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("llm_api_key", &mask_secret(&self.llm_api_key))
            .field("linkedin", &self.linkedin)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub credentials: Credentials,
    pub linkedin_url: String,
    pub cv: CvText,
    pub linkedin: LinkedinData,
    pub answers: OnboardingAnswers,
    pub wizard: OnboardingWizard,
    pub summary: Option<String>,
    pub transcript: Transcript,
    pub stage: Stage,
    /// Bumped on every reset; chat turns started before it are discarded
    pub generation: u64,
    pub last_active: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            credentials: Credentials::default(),
            linkedin_url: String::new(),
            cv: CvText::default(),
            linkedin: LinkedinData::default(),
            answers: OnboardingAnswers::default(),
            wizard: OnboardingWizard::default(),
            summary: None,
            transcript: Transcript::default(),
            stage: Stage::default(),
            generation: 0,
            last_active: now,
        }
    }

    /// Start over; credentials and the profile URL are kept
    pub fn reset(&mut self) {
        self.cv = CvText::default();
        self.linkedin = LinkedinData::default();
        self.answers = OnboardingAnswers::default();
        self.wizard = OnboardingWizard::default();
        self.summary = None;
        self.transcript = Transcript::default();
        self.stage = Stage::Collecting;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_active < cutoff && self.stage != Stage::Processing
    }

    pub fn has_api_key(&self) -> bool {
        !self.credentials.llm_api_key.trim().is_empty()
    }

    /// URL, email and password are all present
    pub fn wants_linkedin(&self) -> bool {
        !self.linkedin_url.trim().is_empty() && self.credentials.linkedin.is_complete()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            created_at: self.created_at,
            stage: self.stage.clone(),
            llm_api_key: mask_secret(&self.credentials.llm_api_key),
            linkedin_email: self.credentials.linkedin.email.clone(),
            linkedin_password_set: !self.credentials.linkedin.password.is_empty(),
            linkedin_url: self.linkedin_url.clone(),
            cv: self.cv.clone(),
            linkedin: self.linkedin.clone(),
            answers: self.answers.clone(),
            wizard_position: self.wizard.position(),
            current_question: self.wizard.current().to_string(),
            summary: self.summary.clone(),
            transcript: self.transcript.turns().to_vec(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialisable snapshot of a session with secrets masked
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub stage: Stage,
    pub llm_api_key: String,
    pub linkedin_email: String,
    pub linkedin_password_set: bool,
    pub linkedin_url: String,
    pub cv: CvText,
    pub linkedin: LinkedinData,
    pub answers: OnboardingAnswers,
    pub wizard_position: usize,
    pub current_question: String,
    pub summary: Option<String>,
    pub transcript: Vec<ChatTurn>,
}
