// src/core/llm_client.rs
//! Hosted LLM access: one-shot completions and chat turns, plain or streamed

use anyhow::{Context, Result};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use std::collections::VecDeque;
use std::time::Duration;

use crate::app_log;
use crate::config::LlmSection;
use crate::core::sse::SseDecoder;
use crate::interview::transcript::{ChatTurn, Role};
use crate::types::gemini::{ApiErrorResponse, Content, GenerateContentRequest, GenerateContentResponse};

const API_VERSION: &str = "v1beta";

/// Reply text arriving chunk by chunk
pub type TextStream = BoxStream<'static, Result<String>>;

/// A generative model reachable with a caller-supplied API key.
#[rocket::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Single prompt, single reply
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String>;

    /// Reply to `message` given the prior turns
    async fn chat(&self, api_key: &str, history: &[ChatTurn], message: &str) -> Result<String>;

    /// Streamed variant of [`LanguageModel::chat`]
    async fn chat_stream(
        &self,
        api_key: &str,
        history: &[ChatTurn],
        message: &str,
    ) -> Result<TextStream> {
        let reply = self.chat(api_key, history, message).await?;
        Ok(stream::once(async move { Ok(reply) }).boxed())
    }
}

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: String, model: String, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    pub fn from_config(config: &LlmSection) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            config.model.clone(),
            config.timeout_seconds,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/{}/models/{}:{}",
            self.base_url, API_VERSION, self.model, method
        )
    }

    async fn post(
        &self,
        api_key: &str,
        url: &str,
        request: &GenerateContentRequest,
    ) -> Result<reqwest::Response> {
        if api_key.trim().is_empty() {
            anyhow::bail!("Gemini API key not provided");
        }

        app_log!(trace, "Calling Gemini: {}", url);

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await
            .context("Failed to send request to Gemini")?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorResponse>(&error_text) {
            Ok(api_error) => api_error.error.message,
            Err(_) => error_text,
        };

        app_log!(error, "Gemini API error {}: {}", status, message);
        anyhow::bail!("Gemini API returned error {}: {}", status, message)
    }
}

#[rocket::async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content::text("user", prompt)],
        };

        let response: GenerateContentResponse = self
            .post(api_key, &self.endpoint("generateContent"), &request)
            .await?
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        reply_text(&response)
    }

    async fn chat(&self, api_key: &str, history: &[ChatTurn], message: &str) -> Result<String> {
        let request = chat_request(history, message);

        let response: GenerateContentResponse = self
            .post(api_key, &self.endpoint("generateContent"), &request)
            .await?
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        reply_text(&response)
    }

    async fn chat_stream(
        &self,
        api_key: &str,
        history: &[ChatTurn],
        message: &str,
    ) -> Result<TextStream> {
        let request = chat_request(history, message);
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));

        let response = self.post(api_key, &url, &request).await?;
        let bytes = response.bytes_stream().boxed();

        let state = (bytes, SseDecoder::new(), VecDeque::<Result<String>>::new(), false);
        let chunks = stream::unfold(state, |(mut bytes, mut decoder, mut pending, mut done)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (bytes, decoder, pending, done)));
                }
                if done {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        let payloads = decoder.push(&chunk);
                        pending.extend(payloads.iter().filter_map(|p| stream_chunk(p)));
                    }
                    Some(Err(e)) => {
                        let error = anyhow::Error::new(e).context("Gemini stream interrupted");
                        pending.push_back(Err(error));
                        done = true;
                    }
                    None => {
                        pending.extend(decoder.finish().as_deref().and_then(stream_chunk));
                        done = true;
                    }
                }
            }
        });

        Ok(chunks.boxed())
    }
}

fn chat_request(history: &[ChatTurn], message: &str) -> GenerateContentRequest {
    let mut contents: Vec<Content> = history
        .iter()
        .map(|turn| Content::text(gemini_role(turn.role), &turn.content))
        .collect();
    contents.push(Content::text("user", message));

    GenerateContentRequest { contents }
}

fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

fn reply_text(response: &GenerateContentResponse) -> Result<String> {
    if let Some(reason) = response.block_reason() {
        anyhow::bail!("Gemini blocked the prompt: {}", reason);
    }
    response
        .text()
        .filter(|text| !text.is_empty())
        .context("Gemini returned no text")
}

/// Decode one SSE payload; payloads without text yield nothing
fn stream_chunk(payload: &str) -> Option<Result<String>> {
    let response = match serde_json::from_str::<GenerateContentResponse>(payload) {
        Ok(response) => response,
        Err(e) => {
            let error = anyhow::Error::new(e).context("Failed to parse Gemini stream chunk");
            return Some(Err(error));
        }
    };

    if let Some(reason) = response.block_reason() {
        return Some(Err(anyhow::anyhow!("Gemini blocked the prompt: {}", reason)));
    }

    response.text().filter(|text| !text.is_empty()).map(Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turn(role: Role, content: &str) -> ChatTurn {
        ChatTurn {
            role,
            content: content.to_string(),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_endpoint() {
        let client = GeminiClient::new(
            "https://generativelanguage.googleapis.com/".to_string(),
            "gemini-1.5-flash-latest".to_string(),
            10,
        )
        .unwrap();
        assert_eq!(
            client.endpoint("generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash-latest:generateContent"
        );
    }

    #[test]
    fn test_chat_request_maps_roles() {
        let history = vec![turn(Role::User, "context"), turn(Role::Assistant, "Tell me about yourself.")];
        let request = chat_request(&history, "I am a PM.");

        let roles: Vec<_> = request.contents.iter().map(|c| c.role.clone().unwrap()).collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
        assert_eq!(
            request.contents[2].parts[0].text.as_deref(),
            Some("I am a PM.")
        );

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("systemInstruction").is_none());
        assert_eq!(json["contents"][1]["parts"][0]["text"], "Tell me about yourself.");
    }

    #[test]
    fn test_reply_text_concatenates_parts() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello "},{"text":"there"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(reply_text(&response).unwrap(), "Hello there");
    }

    #[test]
    fn test_reply_text_errors() {
        let blocked: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(reply_text(&blocked).unwrap_err().to_string().contains("SAFETY"));

        let empty: GenerateContentResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(reply_text(&empty).is_err());
    }

    #[test]
    fn test_stream_chunk() {
        assert_eq!(
            stream_chunk(r#"{"candidates":[{"content":{"parts":[{"text":"Hi"}]}}]}"#)
                .unwrap()
                .unwrap(),
            "Hi"
        );
        assert!(stream_chunk(r#"{"candidates":[{"finishReason":"STOP"}]}"#).is_none());
        assert!(stream_chunk("not json").unwrap().is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_network() {
        let client = GeminiClient::new("http://127.0.0.1:9".to_string(), "m".to_string(), 1).unwrap();
        let err = client.generate("  ", "prompt").await.unwrap_err();
        assert!(err.to_string().contains("API key not provided"));
    }

    struct Echo;

    #[rocket::async_trait]
    impl LanguageModel for Echo {
        async fn generate(&self, _api_key: &str, prompt: &str) -> Result<String> {
            Ok(prompt.to_string())
        }

        async fn chat(&self, _api_key: &str, history: &[ChatTurn], message: &str) -> Result<String> {
            Ok(format!("{}:{}", history.len(), message))
        }
    }

    #[tokio::test]
    async fn test_default_stream_yields_whole_reply() {
        let chunks: Vec<String> = Echo
            .chat_stream("k", &[], "hello")
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["0:hello"]);
    }
}
