//! AI interview preparation: collects a candidate's CV, LinkedIn profile and
//! onboarding answers, asks an LLM for a candidate summary, then relays a mock
//! interview chat against the same model.

pub mod cli;
pub mod config;
pub mod core;
pub mod interview;
pub mod linkedin;
pub mod types;
pub mod utils;
pub mod web;

pub use config::AppConfig;
pub use interview::{InterviewService, Session, SessionStore};
pub use web::{build_rocket, start_web_server};

/// Log through `tracing` at the given level.
///
/// `app_log!(info, "Session {} created", id)`
#[macro_export]
macro_rules! app_log {
    ($level:ident, $($arg:tt)+) => {
        ::tracing::$level!($($arg)+)
    };
}

/// Open an info-level span with optional structured fields.
#[macro_export]
macro_rules! app_span {
    ($name:expr) => {
        ::tracing::info_span!($name)
    };
    ($name:expr, $($fields:tt)+) => {
        ::tracing::info_span!($name, $($fields)+)
    };
}
