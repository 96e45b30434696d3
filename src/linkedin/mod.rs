// src/linkedin/mod.rs
//! LinkedIn profile lookup: slug extraction from profile URLs, keyed field
//! selection over the externally defined profile record, and the session value
//! that records the outcome.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{info, warn};

use crate::utils::{is_blank, non_blank};

pub mod client;
pub mod types;

pub use client::LinkedinClient;

/// Placeholder for profile fields the record does not carry
pub const MISSING_FIELD: &str = "N/A";

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct LinkedinCredentials {
    pub email: String,
    pub password: String,
}

impl LinkedinCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !is_blank(&self.email) && !self.password.is_empty()
    }
}

impl fmt::Debug for LinkedinCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedinCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of raw profile records, keyed by profile slug.
#[rocket::async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(
        &self,
        credentials: &LinkedinCredentials,
        profile_id: &str,
    ) -> Result<Value>;
}

/// Extract the public profile slug from a LinkedIn URL.
///
/// `https://www.linkedin.com/in/jane-doe/?trk=x` gives `jane-doe`. URLs without
/// an `/in/` segment fall back to their last path segment, and a bare slug is
/// returned as is. `.` and `..` are never slugs.
pub fn profile_id_from_url(profile_url: &str) -> Option<String> {
    let trimmed = profile_url.trim();
    if trimmed.is_empty() {
        return None;
    }

    let without_query = trimmed.split(['?', '#']).next().unwrap_or_default();

    let (has_scheme, rest) = match without_query.find("://") {
        Some(pos) => (true, &without_query[pos + 3..]),
        None => (false, without_query),
    };

    if let Some(pos) = rest.find("/in/") {
        return first_segment(&rest[pos + 4..]);
    }
    if let Some(stripped) = rest.strip_prefix("in/") {
        return first_segment(stripped);
    }

    let mut segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    let drop_host =
        !segments.is_empty() && (has_scheme || (segments.len() > 1 && segments[0].contains('.')));
    if drop_host {
        segments.remove(0);
    }

    segments.last().and_then(|s| slug(s))
}

fn first_segment(path: &str) -> Option<String> {
    path.split('/').find(|s| !s.is_empty()).and_then(slug)
}

fn slug(segment: &str) -> Option<String> {
    match segment {
        "." | ".." => None,
        _ => Some(segment.to_string()),
    }
}

/// The profile fields the summary uses, selected by key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub headline: String,
    pub summary: String,
    pub skills: Vec<String>,
    pub certifications: Vec<String>,
}

impl ProfileFields {
    pub fn from_record(record: &Value) -> Self {
        Self {
            headline: text_field(record, "headline"),
            summary: text_field(record, "summary"),
            skills: list_field(record, "skills", skill_label),
            certifications: list_field(record, "certifications", certification_label),
        }
    }

    pub fn to_prompt_block(&self) -> String {
        format!(
            "headline: {}\nsummary: {}\nskills: {}\ncertifications: {}",
            self.headline,
            self.summary,
            join_or_missing(&self.skills),
            join_or_missing(&self.certifications),
        )
    }
}

fn text_field(record: &Value, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| MISSING_FIELD.to_string())
}

fn list_field(record: &Value, key: &str, label: fn(&Value) -> Option<String>) -> Vec<String> {
    record
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(label).collect())
        .unwrap_or_default()
}

fn skill_label(item: &Value) -> Option<String> {
    match item {
        Value::String(name) => Some(name.clone()),
        Value::Object(_) => Some(text_field(item, "name")),
        _ => None,
    }
}

fn certification_label(item: &Value) -> Option<String> {
    match item {
        Value::String(name) => Some(name.clone()),
        Value::Object(_) => {
            let name = text_field(item, "name");
            match non_blank(item.get("authority").and_then(Value::as_str)) {
                Some(authority) => Some(format!("{} ({})", name, authority)),
                None => Some(name),
            }
        }
        _ => None,
    }
}

fn join_or_missing(items: &[String]) -> String {
    if items.is_empty() {
        MISSING_FIELD.to_string()
    } else {
        items.join(", ")
    }
}

/// Outcome of the LinkedIn step, as held in the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum LinkedinData {
    #[default]
    NotProvided,
    Fetched(ProfileFields),
    Failed(String),
}

impl LinkedinData {
    /// Text to feed into prompts; only a fetched profile qualifies
    pub fn prompt_block(&self) -> Option<String> {
        match self {
            Self::Fetched(fields) => Some(fields.to_prompt_block()),
            _ => None,
        }
    }

    pub fn status_text(&self) -> String {
        match self {
            Self::NotProvided => "Not provided.".to_string(),
            Self::Fetched(_) => "Fetched.".to_string(),
            Self::Failed(message) => format!("Error fetching LinkedIn data: {}", message),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Look up the profile behind `profile_url` and select its fields.
///
/// Failures are folded into `LinkedinData::Failed` with a readable message.
pub async fn scrape_profile(
    source: &dyn ProfileSource,
    credentials: &LinkedinCredentials,
    profile_url: &str,
) -> LinkedinData {
    let Some(profile_id) = profile_id_from_url(profile_url) else {
        warn!("Could not extract a profile ID from URL: {}", profile_url);
        return LinkedinData::Failed(
            "Invalid Profile URL: could not extract profile ID from URL.".to_string(),
        );
    };

    info!("Fetching LinkedIn profile for ID: {}", profile_id);

    match source.fetch_profile(credentials, &profile_id).await {
        Ok(record) if record.is_object() => {
            info!("LinkedIn data fetched for {}", profile_id);
            LinkedinData::Fetched(ProfileFields::from_record(&record))
        }
        Ok(_) => {
            warn!("Profile record for {} is not a mapping", profile_id);
            LinkedinData::Failed(
                "Unexpected Profile Data Format: profile data is not a mapping.".to_string(),
            )
        }
        Err(e) => {
            warn!("LinkedIn fetch failed for {}: {:#}", profile_id, e);
            LinkedinData::Failed(format!("{:#}", e))
        }
    }
}
