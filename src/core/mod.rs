// src/core/mod.rs
//! External-service plumbing: the LLM client, PDF text extraction and SSE decoding

pub mod llm_client;
pub mod pdf_text;
pub mod sse;

pub use llm_client::{GeminiClient, LanguageModel, TextStream};
pub use pdf_text::{extract_cv_text, CvText};
pub use sse::SseDecoder;
