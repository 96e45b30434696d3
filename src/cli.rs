// src/cli.rs
//! Command line entry: the HTTP server, an interactive terminal interview and
//! two small inspection commands.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use uuid::Uuid;

use crate::app_log;
use crate::config::AppConfig;
use crate::core::pdf_text::extract_cv_text;
use crate::interview::onboarding::{INTRO_TEXT, QUESTIONS};
use crate::interview::{CredentialsUpdate, InterviewService, WizardStep, WorkflowError};
use crate::linkedin::profile_id_from_url;
use crate::web::start_web_server;

#[derive(Parser)]
#[command(name = "interview-prep")]
#[command(about = "Practice job interviews against an LLM coach primed with your CV and LinkedIn profile")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP API (default)
    Serve,
    /// Run the onboarding wizard and mock interview in this terminal
    Interview(InterviewArgs),
    /// Print the profile slug of a LinkedIn URL
    ProfileId { url: String },
    /// Print the text extracted from a PDF CV
    ExtractCv { path: PathBuf },
}

#[derive(Args)]
pub struct InterviewArgs {
    /// Gemini API key; prompted for when absent
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// CV to include, as a PDF
    #[arg(long)]
    pub cv: Option<PathBuf>,

    #[arg(long)]
    pub linkedin_url: Option<String>,

    #[arg(long, env = "LINKEDIN_EMAIL")]
    pub linkedin_email: Option<String>,

    #[arg(long, env = "LINKEDIN_PASSWORD", hide_env_values = true)]
    pub linkedin_password: Option<String>,

    /// Wait for whole replies instead of streaming them
    #[arg(long)]
    pub no_stream: bool,
}

pub async fn handle_command(cli: Cli, config: AppConfig) -> Result<()> {
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => start_web_server(config).await,

        Command::ProfileId { url } => match profile_id_from_url(&url) {
            Some(profile_id) => {
                println!("{}", profile_id);
                Ok(())
            }
            None => anyhow::bail!("Invalid Profile URL: could not extract profile ID from '{}'", url),
        },

        Command::ExtractCv { path } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let text = extract_cv_text(&bytes)
                .with_context(|| format!("Error reading PDF {}", path.display()))?;
            println!("{}", text);
            Ok(())
        }

        Command::Interview(args) => {
            let service = InterviewService::from_config(&config)?;
            run_interview(&service, args).await
        }
    }
}

/// Line-based terminal input
struct Terminal<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin> Terminal<R> {
    fn new(input: R) -> Self {
        Self {
            lines: input.lines(),
        }
    }

    /// Print `label` and read one line; `None` at end of input
    async fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        print!("{}", label);
        std::io::stdout().flush()?;
        self.lines
            .next_line()
            .await
            .context("Failed to read from stdin")
    }
}

enum ChatExit {
    Quit,
    Reset,
}

async fn run_interview(service: &InterviewService, args: InterviewArgs) -> Result<()> {
    let mut terminal = Terminal::new(BufReader::new(tokio::io::stdin()));
    let id = service.create_session().await.id;

    let api_key = match args.api_key {
        Some(key) => key,
        None => terminal
            .prompt("Gemini API key: ")
            .await?
            .context("A Gemini API key is required")?,
    };

    service
        .set_credentials(
            id,
            CredentialsUpdate {
                llm_api_key: Some(api_key),
                linkedin_email: args.linkedin_email,
                linkedin_password: args.linkedin_password,
                linkedin_url: args.linkedin_url,
            },
        )
        .await?;

    loop {
        if let Some(path) = &args.cv {
            load_cv(service, id, path).await?;
        }

        println!("\n{}\n", INTRO_TEXT);
        println!("Commands: :back, :next (keep the current answer), :quit\n");
        if !run_wizard(service, id, &mut terminal).await? {
            return Ok(());
        }

        println!("\nProcessing your information...");
        let outcome = match service.process(id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                println!("{}", e);
                println!("Could not start the interview.");
                return Err(e.into());
            }
        };

        println!("LinkedIn: {}", outcome.linkedin.status_text());
        println!("\n--- Candidate Summary ---\n{}\n", outcome.summary);
        println!("Commands: :reset (start over), :quit\n");
        println!("Interviewer: {}\n", outcome.opening_line);

        match run_chat(service, id, &mut terminal, !args.no_stream).await? {
            ChatExit::Quit => return Ok(()),
            ChatExit::Reset => {
                service.reset(id).await?;
                println!("\nStarting over.");
            }
        }
    }
}

async fn load_cv(service: &InterviewService, id: Uuid, path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "cv.pdf".to_string());

    match service.upload_cv(id, &file_name, &bytes).await {
        Ok(cv) => {
            let characters = cv.text().map_or(0, |text| text.chars().count());
            println!("CV text extracted ({} characters).", characters);
        }
        Err(e) => {
            app_log!(warn, "CV not used: {}", e);
            println!("CV not used: {}", e);
        }
    }
    Ok(())
}

/// Walk the onboarding questions; `false` when the user quit
async fn run_wizard<R: AsyncBufRead + Unpin>(
    service: &InterviewService,
    id: Uuid,
    terminal: &mut Terminal<R>,
) -> Result<bool> {
    loop {
        let view = service.view(id).await?;
        let position = view.wizard_position;

        println!("{}", QUESTIONS[position]);
        if let Some(current) = view.answers.get(position).filter(|a| !a.trim().is_empty()) {
            println!("  (current answer: {})", current);
        }

        let Some(line) = terminal.prompt("> ").await? else {
            return Ok(true);
        };

        match line.trim() {
            ":quit" => return Ok(false),
            ":back" => {
                service.move_wizard(id, WizardStep::Back).await?;
                continue;
            }
            ":next" | "" => {}
            answer => {
                service.set_answer(id, position, answer).await?;
            }
        }

        if position + 1 == QUESTIONS.len() {
            return Ok(true);
        }
        service.move_wizard(id, WizardStep::Next).await?;
    }
}

async fn run_chat<R: AsyncBufRead + Unpin>(
    service: &InterviewService,
    id: Uuid,
    terminal: &mut Terminal<R>,
    stream: bool,
) -> Result<ChatExit> {
    loop {
        let Some(line) = terminal.prompt("You: ").await? else {
            return Ok(ChatExit::Quit);
        };

        match line.trim() {
            ":quit" => return Ok(ChatExit::Quit),
            ":reset" => return Ok(ChatExit::Reset),
            "" => continue,
            message => {
                let outcome = if stream {
                    stream_reply(service, id, message).await
                } else {
                    service
                        .send_turn(id, message)
                        .await
                        .map(|reply| println!("\nInterviewer: {}\n", reply))
                };

                if let Err(e) = outcome {
                    println!("\n{}", e);
                    if matches!(
                        e,
                        WorkflowError::Chat(_) | WorkflowError::InterviewHalted(_)
                    ) {
                        println!("Interview stopped. Type :reset to start over or :quit to leave.\n");
                    }
                }
            }
        }
    }
}

async fn stream_reply(service: &InterviewService, id: Uuid, message: &str) -> Result<(), WorkflowError> {
    let mut replies = service.stream_turn(id, message).await?;

    print!("\nInterviewer: ");
    let _ = std::io::stdout().flush();
    while let Some(chunk) = replies.next().await {
        print!("{}", chunk?);
        let _ = std::io::stdout().flush();
    }
    println!("\n");
    Ok(())
}
