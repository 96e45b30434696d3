// src/interview/mod.rs
pub mod onboarding;
pub mod prompt;
pub mod session;
pub mod store;
pub mod transcript;
pub mod workflow;

pub use onboarding::{OnboardingAnswers, OnboardingWizard, INTRO_TEXT, QUESTIONS};
pub use session::{Credentials, Session, SessionView, Stage};
pub use store::SessionStore;
pub use transcript::{ChatTurn, Role, Transcript};
pub use workflow::{
    CredentialsUpdate, InterviewService, ProcessOutcome, ReplyStream, WizardStep, WorkflowError,
};
