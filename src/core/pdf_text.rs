// src/core/pdf_text.rs
//! CV text extraction from uploaded PDF bytes

use anyhow::{Context, Result};
use lopdf::Document;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Extract the text of every page, in page order, one newline between pages.
pub fn extract_cv_text(bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        anyhow::bail!("file is empty");
    }

    let document = Document::load_mem(bytes).context("not a valid PDF document")?;

    let pages = document.get_pages();
    let mut page_texts = Vec::with_capacity(pages.len());

    for page_number in pages.keys() {
        let text = document
            .extract_text(&[*page_number])
            .with_context(|| format!("failed to extract text from page {}", page_number))?;
        page_texts.push(text.trim_end().to_string());
    }

    info!("Extracted text from {} PDF page(s)", page_texts.len());
    Ok(page_texts.join("\n"))
}

/// CV text as held in the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum CvText {
    #[default]
    NotProvided,
    Extracted(String),
    Failed(String),
}

impl CvText {
    /// Extract an uploaded CV; failures become `Failed` with a readable message
    pub fn from_upload(bytes: &[u8]) -> Self {
        match extract_cv_text(bytes) {
            Ok(text) => Self::Extracted(text),
            Err(e) => {
                warn!("CV extraction failed: {:#}", e);
                Self::Failed(format!("Error reading PDF: {:#}", e))
            }
        }
    }

    /// Extracted text, when there is any worth sending to the model
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Extracted(text) if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message.as_str()),
            _ => None,
        }
    }
}
