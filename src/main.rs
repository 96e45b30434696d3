use anyhow::{Context, Result};
use clap::Parser;
use interview_prep::app_log;
use interview_prep::cli::{handle_command, Cli};
use interview_prep::config::{ConfigSource, LoggingSection};
use interview_prep::AppConfig;
use std::fs::OpenOptions;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_DIRECTIVES: &str = "interview_prep=info,rocket::server=off";

fn init_logging(logging: &LoggingSection) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVES));

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true) // Clear file on startup
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_current_span(false)
                    .with_span_list(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, source) = AppConfig::load()?;
    init_logging(&config.logging)?;

    app_log!(info, "Environment: {}", AppConfig::get_environment());
    match &source {
        ConfigSource::File(_) => app_log!(info, "Configuration {}", source),
        ConfigSource::Defaults(_) => app_log!(warn, "{}", source),
    }
    if let Some(path) = &config.logging.file {
        app_log!(info, "Writing JSON logs to {}", path.display());
    }

    handle_command(cli, config).await
}
