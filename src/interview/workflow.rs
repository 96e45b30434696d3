// src/interview/workflow.rs
//! The interview workflow shared by the HTTP API and the terminal mode:
//! collect inputs, summarise the candidate, then relay the mock interview.

use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{AppConfig, SessionSection};
use crate::core::llm_client::{GeminiClient, LanguageModel};
use crate::core::pdf_text::CvText;
use crate::linkedin::{scrape_profile, LinkedinClient, LinkedinData, ProfileSource};
use crate::utils::validate_file_extension;
use crate::{app_log, app_span};

use super::onboarding::{OnboardingAnswers, QUESTION_COUNT};
use super::prompt::{coach_context, summary_prompt, NOTHING_TO_SUMMARIZE, OPENING_LINE};
use super::session::{Session, SessionView, Stage};
use super::store::SessionStore;
use super::transcript::{ChatTurn, Role, Transcript};

/// Chat reply chunks; a failed turn ends with one `Err`
pub type ReplyStream = BoxStream<'static, Result<String, WorkflowError>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),
    #[error("Please enter your Gemini API key.")]
    MissingApiKey,
    #[error("Your information has already been processed. Reset to start over.")]
    AlreadyProcessed,
    #[error("Your information is already being processed.")]
    ProcessingInProgress,
    #[error("The interview has not started yet.")]
    InterviewNotStarted,
    #[error("Interview stopped due to an API error: {0}")]
    InterviewHalted(String),
    #[error("Question index {0} is out of range")]
    InvalidQuestion(usize),
    #[error("Message must not be empty")]
    EmptyMessage,
    #[error("{0}")]
    InvalidFormat(String),
    #[error("File size {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("{0}")]
    PdfExtraction(String),
    #[error("Summary Generation Failed: {0}")]
    Summary(String),
    #[error("{0}")]
    Chat(String),
}

impl WorkflowError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::MissingApiKey => "MISSING_API_KEY",
            Self::AlreadyProcessed => "ALREADY_PROCESSED",
            Self::ProcessingInProgress => "PROCESSING_IN_PROGRESS",
            Self::InterviewNotStarted => "INTERVIEW_NOT_STARTED",
            Self::InterviewHalted(_) => "INTERVIEW_HALTED",
            Self::InvalidQuestion(_) => "INVALID_QUESTION",
            Self::EmptyMessage => "BAD_REQUEST",
            Self::InvalidFormat(_) => "INVALID_FORMAT",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::PdfExtraction(_) => "PDF_EXTRACTION_ERROR",
            Self::Summary(_) => "SUMMARY_ERROR",
            Self::Chat(_) => "CHAT_ERROR",
        }
    }

    pub fn suggestions(&self) -> Vec<String> {
        let hints: &[&str] = match self {
            Self::SessionNotFound(_) => &["Create a new session with POST /api/sessions"],
            Self::MissingApiKey => &["Set your Gemini API key with PUT /api/sessions/<id>/credentials"],
            Self::AlreadyProcessed => &["Reset the session to start over"],
            Self::ProcessingInProgress => &["Wait for processing to finish"],
            Self::InterviewNotStarted => &["Process your information to begin the interview"],
            Self::InterviewHalted(_) => &[
                "Check your API key",
                "Reset the session and process your information again",
            ],
            Self::InvalidQuestion(_) => &["Use a question index between 0 and 4"],
            Self::EmptyMessage => &["Type an answer before sending"],
            Self::InvalidFormat(_) => &["Upload a PDF file (.pdf)"],
            Self::FileTooLarge { .. } => &["Compress your CV file", "Upload a smaller PDF"],
            Self::PdfExtraction(_) => &[
                "Ensure the CV has selectable text",
                "Check the file is not corrupted",
            ],
            Self::Summary(_) => &["Check your API key", "Try processing your information again"],
            Self::Chat(_) => &[
                "Check your API key",
                "Reset the session and process your information again",
            ],
        };
        hints.iter().map(|hint| hint.to_string()).collect()
    }
}

/// Partial credential update; absent fields keep their current value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsUpdate {
    pub llm_api_key: Option<String>,
    pub linkedin_email: Option<String>,
    pub linkedin_password: Option<String>,
    pub linkedin_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Next,
    Back,
}

impl WizardStep {
    pub fn parse(direction: &str) -> Option<Self> {
        match direction.trim().to_lowercase().as_str() {
            "next" => Some(Self::Next),
            "back" | "previous" => Some(Self::Back),
            _ => None,
        }
    }
}

/// Result of a successful `process` call
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub summary: String,
    pub linkedin: LinkedinData,
    pub opening_line: String,
}

#[derive(Clone)]
pub struct InterviewService {
    model: Arc<dyn LanguageModel>,
    profiles: Arc<dyn ProfileSource>,
    sessions: SessionStore,
    settings: SessionSection,
}

impl InterviewService {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        profiles: Arc<dyn ProfileSource>,
        settings: SessionSection,
    ) -> Self {
        Self {
            model,
            profiles,
            sessions: SessionStore::new(),
            settings,
        }
    }

    /// Gemini and LinkedIn clients built from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let model = GeminiClient::from_config(&config.llm)?;
        let profiles = LinkedinClient::new(
            config.linkedin.base_url.clone(),
            config.linkedin.timeout_seconds,
        );

        app_log!(
            info,
            "Interview service ready (model: {}, history window: {})",
            model.model(),
            config.session.history_window
        );

        Ok(Self::new(
            Arc::new(model),
            Arc::new(profiles),
            config.session.clone(),
        ))
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn settings(&self) -> &SessionSection {
        &self.settings
    }

    pub async fn create_session(&self) -> SessionView {
        let session = Session::new();
        let view = session.view();
        self.sessions.insert(session).await;
        app_log!(info, "Session {} created", view.id);
        view
    }

    pub async fn view(&self, id: Uuid) -> Result<SessionView, WorkflowError> {
        self.sessions
            .get(&id)
            .await
            .map(|session| session.view())
            .ok_or(WorkflowError::SessionNotFound(id))
    }

    pub async fn transcript(&self, id: Uuid) -> Result<Transcript, WorkflowError> {
        self.sessions
            .get(&id)
            .await
            .map(|session| session.transcript)
            .ok_or(WorkflowError::SessionNotFound(id))
    }

    pub async fn remove_session(&self, id: Uuid) -> Result<(), WorkflowError> {
        match self.sessions.remove(&id).await {
            Some(_) => {
                app_log!(info, "Session {} removed", id);
                Ok(())
            }
            None => Err(WorkflowError::SessionNotFound(id)),
        }
    }

    /// Discard sessions idle for longer than `idle_timeout_seconds`; 0 keeps them all
    pub async fn evict_idle_sessions(&self) -> usize {
        if self.settings.idle_timeout_seconds == 0 {
            return 0;
        }
        let idle_seconds = i64::try_from(self.settings.idle_timeout_seconds).unwrap_or(i64::MAX);
        let Some(cutoff) = chrono::Duration::try_seconds(idle_seconds)
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
        else {
            return 0;
        };

        let evicted = self.sessions.evict_idle(cutoff).await;
        for id in &evicted {
            app_log!(info, "Session {} evicted after {}s idle", id, idle_seconds);
        }
        evicted.len()
    }

    /// Evict idle sessions periodically. `None` when `idle_timeout_seconds` is 0.
    pub fn spawn_idle_sweep(&self) -> Option<JoinHandle<()>> {
        let timeout = self.settings.idle_timeout_seconds;
        if timeout == 0 {
            return None;
        }

        let service = self.clone();
        let period = Duration::from_secs(timeout.min(60));
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                service.evict_idle_sessions().await;
            }
        }))
    }

    async fn with_session<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session) -> Result<R, WorkflowError>,
    ) -> Result<R, WorkflowError> {
        self.sessions
            .update(&id, f)
            .await
            .unwrap_or(Err(WorkflowError::SessionNotFound(id)))
    }

    pub async fn set_credentials(
        &self,
        id: Uuid,
        update: CredentialsUpdate,
    ) -> Result<SessionView, WorkflowError> {
        self.with_session(id, |session| {
            if let Some(key) = update.llm_api_key {
                session.credentials.llm_api_key = key.trim().to_string();
            }
            if let Some(email) = update.linkedin_email {
                session.credentials.linkedin.email = email.trim().to_string();
            }
            if let Some(password) = update.linkedin_password {
                session.credentials.linkedin.password = password;
            }
            if let Some(url) = update.linkedin_url {
                session.linkedin_url = url.trim().to_string();
            }
            app_log!(
                info,
                "Session {} credentials updated (api key: {}, linkedin: {})",
                session.id,
                session.has_api_key(),
                session.wants_linkedin()
            );
            Ok(session.view())
        })
        .await
    }

    /// Validate and extract an uploaded CV. A new upload replaces the previous one.
    ///
    /// The extraction outcome is stored even when it failed.
    pub async fn upload_cv(
        &self,
        id: Uuid,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<CvText, WorkflowError> {
        self.require_collecting(id).await?;

        validate_file_extension(file_name, &["pdf"])
            .map_err(|e| WorkflowError::InvalidFormat(format!("Only PDF files are supported: {}", e)))?;

        let size = bytes.len() as u64;
        let limit = self.settings.max_upload_bytes;
        if size > limit {
            return Err(WorkflowError::FileTooLarge { size, limit });
        }

        let owned = bytes.to_vec();
        let cv = tokio::task::spawn_blocking(move || CvText::from_upload(&owned))
            .await
            .map_err(|e| WorkflowError::PdfExtraction(format!("Error reading PDF: {}", e)))?;
        let outcome = if cv.error().is_some() { "failed" } else { "extracted" };

        let stored = cv.clone();
        self.with_session(id, move |session| {
            ensure_collecting(&session.stage)?;
            app_log!(
                info,
                "Session {} CV upload '{}' ({} bytes) {}",
                session.id,
                file_name,
                size,
                outcome
            );
            session.cv = stored;
            Ok(())
        })
        .await?;

        match cv.error() {
            Some(message) => Err(WorkflowError::PdfExtraction(message.to_string())),
            None => Ok(cv),
        }
    }

    pub async fn set_answer(
        &self,
        id: Uuid,
        index: usize,
        answer: &str,
    ) -> Result<OnboardingAnswers, WorkflowError> {
        if index >= QUESTION_COUNT {
            return Err(WorkflowError::InvalidQuestion(index));
        }

        self.with_session(id, |session| {
            ensure_collecting(&session.stage)?;
            session.answers.set(index, answer);
            Ok(session.answers.clone())
        })
        .await
    }

    /// Move the wizard cursor; returns the new position
    pub async fn move_wizard(&self, id: Uuid, step: WizardStep) -> Result<usize, WorkflowError> {
        self.with_session(id, |session| {
            ensure_collecting(&session.stage)?;
            Ok(match step {
                WizardStep::Next => session.wizard.next(),
                WizardStep::Back => session.wizard.back(),
            })
        })
        .await
    }

    pub async fn reset(&self, id: Uuid) -> Result<SessionView, WorkflowError> {
        self.with_session(id, |session| {
            if session.stage == Stage::Processing {
                return Err(WorkflowError::ProcessingInProgress);
            }
            session.reset();
            app_log!(info, "Session {} reset", session.id);
            Ok(session.view())
        })
        .await
    }

    async fn require_collecting(&self, id: Uuid) -> Result<(), WorkflowError> {
        self.with_session(id, |session| ensure_collecting(&session.stage))
            .await
    }

    /// Fetch LinkedIn data, summarise the candidate and open the interview.
    pub async fn process(&self, id: Uuid) -> Result<ProcessOutcome, WorkflowError> {
        let span = app_span!("process", session_id = %id);
        self.process_inner(id).instrument(span).await
    }

    async fn process_inner(&self, id: Uuid) -> Result<ProcessOutcome, WorkflowError> {
        let inputs = self
            .with_session(id, |session| {
                if !session.has_api_key() {
                    return Err(WorkflowError::MissingApiKey);
                }
                ensure_collecting(&session.stage)?;
                session.stage = Stage::Processing;
                Ok(session.clone())
            })
            .await?;

        app_log!(info, "Processing session {}", id);

        let linkedin = if inputs.wants_linkedin() {
            app_log!(info, "Fetching LinkedIn data");
            scrape_profile(
                self.profiles.as_ref(),
                &inputs.credentials.linkedin,
                &inputs.linkedin_url,
            )
            .await
        } else {
            LinkedinData::NotProvided
        };

        let summary = match summary_prompt(&inputs.cv, &linkedin, &inputs.answers) {
            None => {
                app_log!(info, "Nothing to summarize; skipping the model call");
                Ok(NOTHING_TO_SUMMARIZE.to_string())
            }
            Some(prompt) => {
                app_log!(info, "Generating combined summary ({} chars)", prompt.len());
                self.model
                    .generate(&inputs.credentials.llm_api_key, &prompt)
                    .await
            }
        };

        let fetched = linkedin.clone();
        match summary {
            Ok(summary) => {
                let stored = summary.clone();
                self.with_session(id, move |session| {
                    session.linkedin = fetched;
                    session.summary = Some(stored);
                    session.transcript = Transcript::new();
                    session.transcript.push_assistant(OPENING_LINE);
                    session.stage = Stage::Interviewing;
                    Ok(())
                })
                .await?;

                app_log!(info, "Summary generated; interview started");
                Ok(ProcessOutcome {
                    summary,
                    linkedin,
                    opening_line: OPENING_LINE.to_string(),
                })
            }
            Err(e) => {
                let message = format!("{:#}", e);
                app_log!(error, "Summary generation failed: {}", message);
                self.with_session(id, move |session| {
                    session.linkedin = fetched;
                    session.stage = Stage::Collecting;
                    Ok(())
                })
                .await?;
                Err(WorkflowError::Summary(message))
            }
        }
    }

    /// Send one interview answer and wait for the full reply.
    pub async fn send_turn(&self, id: Uuid, message: &str) -> Result<String, WorkflowError> {
        let (api_key, history, generation) = self.begin_turn(id, message).await?;

        match self.model.chat(&api_key, &history, message).await {
            Ok(reply) => {
                record_reply(&self.sessions, id, generation, &reply).await;
                Ok(reply)
            }
            Err(e) => Err(WorkflowError::Chat(
                record_failure(&self.sessions, id, generation, e).await,
            )),
        }
    }

    /// Send one interview answer and stream the reply.
    ///
    /// The complete reply is written to the transcript once the stream ends.
    pub async fn stream_turn(&self, id: Uuid, message: &str) -> Result<ReplyStream, WorkflowError> {
        let (api_key, history, generation) = self.begin_turn(id, message).await?;

        let upstream = match self.model.chat_stream(&api_key, &history, message).await {
            Ok(upstream) => upstream,
            Err(e) => {
                return Err(WorkflowError::Chat(
                    record_failure(&self.sessions, id, generation, e).await,
                ));
            }
        };

        let store = self.sessions.clone();
        let state = (upstream, store, String::new(), false);
        let replies = stream::unfold(state, move |(mut upstream, store, mut reply, done)| async move {
            if done {
                return None;
            }
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    reply.push_str(&chunk);
                    Some((Ok(chunk), (upstream, store, reply, false)))
                }
                Some(Err(e)) => {
                    let message = record_failure(&store, id, generation, e).await;
                    Some((Err(WorkflowError::Chat(message)), (upstream, store, reply, true)))
                }
                None if reply.is_empty() => {
                    let e = anyhow::anyhow!("Gemini returned no text");
                    let message = record_failure(&store, id, generation, e).await;
                    Some((Err(WorkflowError::Chat(message)), (upstream, store, reply, true)))
                }
                None => {
                    record_reply(&store, id, generation, &reply).await;
                    None
                }
            }
        });

        Ok(replies.boxed())
    }

    /// Record the user turn and build the history to replay before it.
    /// Also returns the session generation the reply must be recorded against.
    async fn begin_turn(
        &self,
        id: Uuid,
        message: &str,
    ) -> Result<(String, Vec<ChatTurn>, u64), WorkflowError> {
        if message.trim().is_empty() {
            return Err(WorkflowError::EmptyMessage);
        }
        let window = self.settings.history_window;

        self.with_session(id, |session| {
            match &session.stage {
                Stage::Interviewing => {}
                Stage::Halted(reason) => return Err(WorkflowError::InterviewHalted(reason.clone())),
                _ => return Err(WorkflowError::InterviewNotStarted),
            }
            if !session.has_api_key() {
                return Err(WorkflowError::MissingApiKey);
            }

            let history = replay_history(session, window);
            session.transcript.push_user(message);
            app_log!(
                debug,
                "Session {} turn {} (replaying {} turns)",
                session.id,
                session.transcript.len(),
                history.len()
            );
            Ok((
                session.credentials.llm_api_key.clone(),
                history,
                session.generation,
            ))
        })
        .await
    }
}

fn ensure_collecting(stage: &Stage) -> Result<(), WorkflowError> {
    match stage {
        Stage::Collecting => Ok(()),
        Stage::Processing => Err(WorkflowError::ProcessingInProgress),
        Stage::Interviewing | Stage::Halted(_) => Err(WorkflowError::AlreadyProcessed),
    }
}

/// Coach context and opening line, then the most recent turns after the
/// opening line, at most `window` of them.
fn replay_history(session: &Session, window: usize) -> Vec<ChatTurn> {
    let context = coach_context(
        session.summary.as_deref().unwrap_or(NOTHING_TO_SUMMARIZE),
        &session.answers,
        &session.cv,
        &session.linkedin,
    );

    let mut history = vec![
        ChatTurn::new(Role::User, context),
        ChatTurn::new(Role::Assistant, OPENING_LINE),
    ];

    let after_opening = session.transcript.len().saturating_sub(1);
    history.extend_from_slice(session.transcript.window(window.min(after_opening)));
    history
}

/// The turn started in `generation` still belongs to this interview
fn turn_is_current(session: &Session, generation: u64) -> bool {
    if session.generation == generation && session.stage == Stage::Interviewing {
        return true;
    }
    app_log!(
        info,
        "Session {} moved on during a chat turn; discarding its outcome",
        session.id
    );
    false
}

async fn record_reply(store: &SessionStore, id: Uuid, generation: u64, reply: &str) {
    store
        .update(&id, |session| {
            if turn_is_current(session, generation) {
                session.transcript.push_assistant(reply);
            }
        })
        .await;
}

/// Append the error as an assistant turn and halt the interview
async fn record_failure(
    store: &SessionStore,
    id: Uuid,
    generation: u64,
    error: anyhow::Error,
) -> String {
    let message = format!("An error occurred with the Gemini API: {:#}", error);
    app_log!(error, "Session {} chat failed: {}", id, message);

    let halted = message.clone();
    store
        .update(&id, move |session| {
            if turn_is_current(session, generation) {
                session.transcript.push_assistant(halted.clone());
                session.stage = Stage::Halted(halted);
            }
        })
        .await;
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm_client::TextStream;
    use crate::core::pdf_text::tests::pdf_with_pages;
    use crate::linkedin::LinkedinCredentials;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct ScriptedModel {
        summary: Mutex<VecDeque<Result<String, String>>>,
        replies: Mutex<VecDeque<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
        histories: Mutex<Vec<Vec<ChatTurn>>>,
    }

    impl ScriptedModel {
        fn with_summary(summary: Result<&str, &str>) -> Self {
            let model = Self::default();
            model.push_summary(summary);
            model
        }

        fn push_summary(&self, summary: Result<&str, &str>) {
            self.summary
                .lock()
                .unwrap()
                .push_back(summary.map(str::to_string).map_err(str::to_string));
        }

        fn push_reply(&self, reply: Result<&str, &str>) {
            self.replies
                .lock()
                .unwrap()
                .push_back(reply.map(str::to_string).map_err(str::to_string));
        }

        fn next_reply(&self, history: &[ChatTurn]) -> Result<String> {
            self.histories.lock().unwrap().push(history.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("no scripted reply".to_string()))
                .map_err(|e| anyhow::anyhow!(e))
        }
    }

    #[rocket::async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, _api_key: &str, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.summary
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("no scripted summary".to_string()))
                .map_err(|e| anyhow::anyhow!(e))
        }

        async fn chat(&self, _api_key: &str, history: &[ChatTurn], _message: &str) -> Result<String> {
            self.next_reply(history)
        }

        async fn chat_stream(
            &self,
            _api_key: &str,
            history: &[ChatTurn],
            _message: &str,
        ) -> Result<TextStream> {
            let reply = self.next_reply(history)?;
            let words: Vec<Result<String>> = reply
                .split_inclusive(' ')
                .map(|word| Ok(word.to_string()))
                .collect();
            Ok(stream::iter(words).boxed())
        }
    }

    struct FakeProfiles(Result<Value, String>);

    #[rocket::async_trait]
    impl ProfileSource for FakeProfiles {
        async fn fetch_profile(
            &self,
            _credentials: &LinkedinCredentials,
            _profile_id: &str,
        ) -> Result<Value> {
            self.0.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    /// Holds every chat call until `gate` is released
    struct GatedModel {
        entered: Notify,
        gate: Notify,
        reply: Result<String, String>,
    }

    impl GatedModel {
        fn new(reply: Result<&str, &str>) -> Self {
            Self {
                entered: Notify::new(),
                gate: Notify::new(),
                reply: reply.map(str::to_string).map_err(str::to_string),
            }
        }
    }

    #[rocket::async_trait]
    impl LanguageModel for GatedModel {
        async fn generate(&self, _api_key: &str, _prompt: &str) -> Result<String> {
            anyhow::bail!("no summary expected")
        }

        async fn chat(&self, _api_key: &str, _history: &[ChatTurn], _message: &str) -> Result<String> {
            self.entered.notify_one();
            self.gate.notified().await;
            self.reply.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    /// Start a turn, reset while the model is still answering, then let it answer
    async fn reset_during_turn(
        reply: Result<&str, &str>,
        streamed: bool,
    ) -> (InterviewService, Uuid, Result<String, WorkflowError>) {
        let model = Arc::new(GatedModel::new(reply));
        let service = InterviewService::new(
            model.clone(),
            Arc::new(no_profiles()),
            SessionSection::default(),
        );
        let id = interviewing_session(&service).await;

        let turn = {
            let service = service.clone();
            tokio::spawn(async move {
                if streamed {
                    let chunks: Vec<Result<String, WorkflowError>> =
                        service.stream_turn(id, "hello").await?.collect().await;
                    chunks.into_iter().collect::<Result<String, WorkflowError>>()
                } else {
                    service.send_turn(id, "hello").await
                }
            })
        };

        model.entered.notified().await;
        service.reset(id).await.unwrap();
        model.gate.notify_one();

        let outcome = turn.await.unwrap();
        (service, id, outcome)
    }

    fn service(model: Arc<ScriptedModel>, profiles: FakeProfiles) -> InterviewService {
        InterviewService::new(model, Arc::new(profiles), SessionSection::default())
    }

    fn no_profiles() -> FakeProfiles {
        FakeProfiles(Err("not expected".to_string()))
    }

    async fn session_with_key(service: &InterviewService) -> Uuid {
        let id = service.create_session().await.id;
        service
            .set_credentials(
                id,
                CredentialsUpdate {
                    llm_api_key: Some(" test-key ".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        id
    }

    async fn interviewing_session(service: &InterviewService) -> Uuid {
        let id = session_with_key(service).await;
        service.process(id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_process_requires_api_key() {
        let service = service(Arc::new(ScriptedModel::default()), no_profiles());
        let id = service.create_session().await.id;

        assert_eq!(service.process(id).await.unwrap_err(), WorkflowError::MissingApiKey);
        assert_eq!(service.view(id).await.unwrap().stage, Stage::Collecting);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let service = service(Arc::new(ScriptedModel::default()), no_profiles());
        let id = Uuid::new_v4();
        assert_eq!(
            service.process(id).await.unwrap_err(),
            WorkflowError::SessionNotFound(id)
        );
        assert_eq!(
            service.process(id).await.unwrap_err().code(),
            "SESSION_NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn test_nothing_to_summarize_skips_model_and_starts_interview() {
        let model = Arc::new(ScriptedModel::default());
        let service = service(model.clone(), no_profiles());
        let id = session_with_key(&service).await;

        let outcome = service.process(id).await.unwrap();

        assert_eq!(outcome.summary, NOTHING_TO_SUMMARIZE);
        assert!(model.prompts.lock().unwrap().is_empty());

        let session = service.sessions().get(&id).await.unwrap();
        assert_eq!(session.stage, Stage::Interviewing);
        assert_eq!(session.transcript.len(), 1);
        assert_eq!(session.transcript.turns()[0].content, OPENING_LINE);
        assert_eq!(session.credentials.llm_api_key, "test-key");
    }

    #[tokio::test]
    async fn test_process_with_all_sources() {
        let model = Arc::new(ScriptedModel::with_summary(Ok("A seasoned PM.")));
        let profiles = FakeProfiles(Ok(json!({
            "headline": "Product Manager",
            "summary": "Ships things",
            "skills": [{"name": "Roadmaps"}],
        })));
        let service = service(model.clone(), profiles);
        let id = session_with_key(&service).await;

        service
            .set_credentials(
                id,
                CredentialsUpdate {
                    linkedin_email: Some("jane@example.com".to_string()),
                    linkedin_password: Some("pw".to_string()),
                    linkedin_url: Some("https://www.linkedin.com/in/jane-doe/".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service
            .upload_cv(id, "cv.pdf", &pdf_with_pages(&["Jane Doe"]))
            .await
            .unwrap();
        service.set_answer(id, 0, "PM, 3 years").await.unwrap();

        let outcome = service.process(id).await.unwrap();
        assert_eq!(outcome.summary, "A seasoned PM.");
        assert!(matches!(outcome.linkedin, LinkedinData::Fetched(_)));

        let prompts = model.prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("A: PM, 3 years"));
        assert!(prompts[0].contains("--- CV Data ---\nJane Doe"));
        assert!(prompts[0].contains("headline: Product Manager"));

        let view = service.view(id).await.unwrap();
        assert_eq!(view.summary.as_deref(), Some("A seasoned PM."));
        assert_eq!(
            service.process(id).await.unwrap_err(),
            WorkflowError::AlreadyProcessed
        );
    }

    #[tokio::test]
    async fn test_linkedin_failure_still_summarizes() {
        let model = Arc::new(ScriptedModel::with_summary(Ok("summary")));
        let profiles = FakeProfiles(Err("Incorrect Credentials or Login Issue: BAD".to_string()));
        let service = service(model.clone(), profiles);
        let id = session_with_key(&service).await;

        service
            .set_credentials(
                id,
                CredentialsUpdate {
                    linkedin_email: Some("jane@example.com".to_string()),
                    linkedin_password: Some("pw".to_string()),
                    linkedin_url: Some("https://www.linkedin.com/in/jane-doe".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service.set_answer(id, 1, "Job hunting").await.unwrap();

        let outcome = service.process(id).await.unwrap();
        assert!(outcome.linkedin.is_failed());
        assert!(!model.prompts.lock().unwrap()[0].contains("LinkedIn Data"));
    }

    #[tokio::test]
    async fn test_summary_failure_allows_reprocessing() {
        let model = Arc::new(ScriptedModel::with_summary(Err("quota exceeded")));
        let service = service(model.clone(), no_profiles());
        let id = session_with_key(&service).await;
        service.set_answer(id, 0, "PM").await.unwrap();

        let err = service.process(id).await.unwrap_err();
        assert_eq!(err.code(), "SUMMARY_ERROR");
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(service.view(id).await.unwrap().stage, Stage::Collecting);

        model.push_summary(Ok("second try"));
        assert_eq!(service.process(id).await.unwrap().summary, "second try");
    }

    #[tokio::test]
    async fn test_send_turn_requires_interview() {
        let service = service(Arc::new(ScriptedModel::default()), no_profiles());
        let id = session_with_key(&service).await;

        assert_eq!(
            service.send_turn(id, "hello").await.unwrap_err(),
            WorkflowError::InterviewNotStarted
        );
        assert!(service.transcript(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_turn_replays_priming_and_records_reply() {
        let model = Arc::new(ScriptedModel::default());
        let service = service(model.clone(), no_profiles());
        let id = interviewing_session(&service).await;

        model.push_reply(Ok("Why product management?"));
        let reply = service.send_turn(id, "I am a PM.").await.unwrap();
        assert_eq!(reply, "Why product management?");

        let first = model.histories.lock().unwrap()[0].clone();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].role, Role::User);
        assert!(first[0].content.contains("You are an expert interview coach."));
        assert_eq!(first[1].content, OPENING_LINE);

        let transcript = service.transcript(id).await.unwrap();
        let contents: Vec<_> = transcript.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec![OPENING_LINE, "I am a PM.", "Why product management?"]);
    }

    #[tokio::test]
    async fn test_history_window_bounds_replay() {
        let model = Arc::new(ScriptedModel::default());
        let settings = SessionSection {
            history_window: 2,
            ..Default::default()
        };
        let service = InterviewService::new(model.clone(), Arc::new(no_profiles()), settings);
        let id = interviewing_session(&service).await;

        for i in 0..3 {
            model.push_reply(Ok("next question"));
            service.send_turn(id, &format!("answer {}", i)).await.unwrap();
        }

        let last = model.histories.lock().unwrap().last().unwrap().clone();
        assert_eq!(last.len(), 4);
        assert_eq!(last[1].content, OPENING_LINE);
        assert_eq!(last[2].content, "answer 1");
        assert_eq!(last[3].content, "next question");
        assert_eq!(service.transcript(id).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_chat_failure_halts_interview() {
        let model = Arc::new(ScriptedModel::default());
        let service = service(model.clone(), no_profiles());
        let id = interviewing_session(&service).await;

        model.push_reply(Err("API key not valid"));
        let err = service.send_turn(id, "hello").await.unwrap_err();
        assert_eq!(err.code(), "CHAT_ERROR");
        assert!(err.to_string().starts_with("An error occurred with the Gemini API"));

        let session = service.sessions().get(&id).await.unwrap();
        assert!(matches!(session.stage, Stage::Halted(_)));
        assert_eq!(session.transcript.last().unwrap().role, Role::Assistant);
        assert!(session.transcript.last().unwrap().content.contains("API key not valid"));

        let again = service.send_turn(id, "hello?").await.unwrap_err();
        assert_eq!(again.code(), "INTERVIEW_HALTED");

        service.reset(id).await.unwrap();
        assert_eq!(service.view(id).await.unwrap().stage, Stage::Collecting);
    }

    #[tokio::test]
    async fn test_reply_arriving_after_reset_is_discarded() {
        let (service, id, outcome) = reset_during_turn(Ok("stale reply"), false).await;
        assert_eq!(outcome.unwrap(), "stale reply");

        let session = service.sessions().get(&id).await.unwrap();
        assert_eq!(session.stage, Stage::Collecting);
        assert!(session.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_failure_arriving_after_reset_does_not_halt() {
        let (service, id, outcome) = reset_during_turn(Err("quota"), false).await;
        assert_eq!(outcome.unwrap_err().code(), "CHAT_ERROR");

        let session = service.sessions().get(&id).await.unwrap();
        assert_eq!(session.stage, Stage::Collecting);
        assert!(session.transcript.is_empty());

        service.set_answer(id, 0, "PM").await.unwrap();
        assert_eq!(service.move_wizard(id, WizardStep::Next).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_streamed_reply_arriving_after_reset_is_discarded() {
        let (service, id, outcome) = reset_during_turn(Ok("stale reply"), true).await;
        assert_eq!(outcome.unwrap(), "stale reply");

        let session = service.sessions().get(&id).await.unwrap();
        assert_eq!(session.stage, Stage::Collecting);
        assert!(session.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_stream_turn_records_complete_reply() {
        let model = Arc::new(ScriptedModel::default());
        let service = service(model.clone(), no_profiles());
        let id = interviewing_session(&service).await;

        model.push_reply(Ok("Tell me about a conflict."));
        let chunks: Vec<String> = service
            .stream_turn(id, "Sure")
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), "Tell me about a conflict.");
        let transcript = service.transcript(id).await.unwrap();
        assert_eq!(transcript.last().unwrap().content, "Tell me about a conflict.");
        assert_eq!(transcript.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let service = service(Arc::new(ScriptedModel::default()), no_profiles());
        let id = interviewing_session(&service).await;
        assert_eq!(
            service.send_turn(id, "   ").await.unwrap_err(),
            WorkflowError::EmptyMessage
        );
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let service = service(Arc::new(ScriptedModel::default()), no_profiles());
        let id = session_with_key(&service).await;

        let err = service.upload_cv(id, "cv.docx", b"data").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_FORMAT");

        let limit = service.settings().max_upload_bytes as usize;
        let big = vec![0u8; limit + 1];
        let err = service.upload_cv(id, "cv.pdf", &big).await.unwrap_err();
        assert_eq!(err.code(), "FILE_TOO_LARGE");

        let err = service.upload_cv(id, "cv.pdf", b"not a pdf").await.unwrap_err();
        assert_eq!(err.code(), "PDF_EXTRACTION_ERROR");
        let view = service.view(id).await.unwrap();
        assert!(view.cv.error().unwrap().starts_with("Error reading PDF"));

        let cv = service
            .upload_cv(id, "CV.PDF", &pdf_with_pages(&["Replacement"]))
            .await
            .unwrap();
        assert_eq!(cv.text(), Some("Replacement"));
        assert_eq!(service.view(id).await.unwrap().cv, cv);
    }

    #[tokio::test]
    async fn test_upload_rejected_once_processed() {
        let service = service(Arc::new(ScriptedModel::default()), no_profiles());
        let id = interviewing_session(&service).await;

        let err = service
            .upload_cv(id, "cv.pdf", &pdf_with_pages(&["Late CV"]))
            .await
            .unwrap_err();

        assert_eq!(err, WorkflowError::AlreadyProcessed);
        assert_eq!(service.view(id).await.unwrap().cv, CvText::NotProvided);
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let settings = SessionSection {
            idle_timeout_seconds: 60,
            ..Default::default()
        };
        let service = InterviewService::new(
            Arc::new(ScriptedModel::default()),
            Arc::new(no_profiles()),
            settings,
        );
        let idle = service.create_session().await.id;
        let active = service.create_session().await.id;
        service
            .sessions()
            .update(&idle, |session| {
                session.last_active = Utc::now() - chrono::Duration::minutes(5);
            })
            .await;

        assert_eq!(service.evict_idle_sessions().await, 1);
        assert_eq!(
            service.view(idle).await.unwrap_err(),
            WorkflowError::SessionNotFound(idle)
        );
        assert!(service.view(active).await.is_ok());
    }

    #[tokio::test]
    async fn test_zero_idle_timeout_keeps_sessions() {
        let settings = SessionSection {
            idle_timeout_seconds: 0,
            ..Default::default()
        };
        let service = InterviewService::new(
            Arc::new(ScriptedModel::default()),
            Arc::new(no_profiles()),
            settings,
        );
        let id = service.create_session().await.id;
        service
            .sessions()
            .update(&id, |session| {
                session.last_active = Utc::now() - chrono::Duration::days(1);
            })
            .await;

        assert!(service.spawn_idle_sweep().is_none());
        assert_eq!(service.evict_idle_sessions().await, 0);
        assert!(service.view(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_inputs_locked_after_processing() {
        let service = service(Arc::new(ScriptedModel::default()), no_profiles());
        let id = interviewing_session(&service).await;

        assert_eq!(
            service.set_answer(id, 0, "late").await.unwrap_err(),
            WorkflowError::AlreadyProcessed
        );
        assert_eq!(
            service.move_wizard(id, WizardStep::Next).await.unwrap_err(),
            WorkflowError::AlreadyProcessed
        );
    }

    #[tokio::test]
    async fn test_answers_and_wizard() {
        let service = service(Arc::new(ScriptedModel::default()), no_profiles());
        let id = service.create_session().await.id;

        assert_eq!(
            service.set_answer(id, QUESTION_COUNT, "x").await.unwrap_err(),
            WorkflowError::InvalidQuestion(QUESTION_COUNT)
        );
        let answers = service.set_answer(id, 2, "early").await.unwrap();
        assert_eq!(answers.get(2), Some("early"));

        assert_eq!(service.move_wizard(id, WizardStep::Back).await.unwrap(), 0);
        assert_eq!(service.move_wizard(id, WizardStep::Next).await.unwrap(), 1);
        assert_eq!(WizardStep::parse("NEXT"), Some(WizardStep::Next));
        assert_eq!(WizardStep::parse("sideways"), None);
    }

    #[tokio::test]
    async fn test_reset_keeps_credentials() {
        let service = service(Arc::new(ScriptedModel::default()), no_profiles());
        let id = interviewing_session(&service).await;

        let view = service.reset(id).await.unwrap();
        assert_eq!(view.stage, Stage::Collecting);
        assert!(view.transcript.is_empty());
        assert!(view.summary.is_none());
        assert_eq!(view.llm_api_key, "****-key");

        assert!(service.process(id).await.is_ok());
    }
}
