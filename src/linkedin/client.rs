// src/linkedin/client.rs
use super::types::{Elements, LoginResponse};
use super::{LinkedinCredentials, ProfileSource};
use anyhow::{Context, Result};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, StatusCode, Url};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const AUTH_ENDPOINT: &str = "/uas/authenticate";
const PROFILES_ENDPOINT: &str = "/voyager/api/identity/profiles";

/// Credential-based client for LinkedIn's voyager profile API.
///
/// Each lookup logs in with a fresh cookie jar; nothing is cached between calls.
pub struct LinkedinClient {
    base_url: String,
    timeout: Duration,
}

impl LinkedinClient {
    pub fn new(base_url: String, timeout_seconds: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    fn http_client(&self, jar: Arc<Jar>) -> Result<Client> {
        Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(jar)
            .timeout(self.timeout)
            .build()
            .context("Failed to create HTTP client")
    }

    /// Log in and return the CSRF token voyager requests must carry
    async fn authenticate(
        &self,
        client: &Client,
        jar: &Jar,
        credentials: &LinkedinCredentials,
    ) -> Result<String> {
        let auth_url = format!("{}{}", self.base_url, AUTH_ENDPOINT);

        info!("Attempting to log in to LinkedIn");

        client
            .get(&auth_url)
            .header("X-Li-User-Agent", "LIAuthLibrary:3.2.4 com.linkedin.LinkedIn:8.8.1")
            .header("X-User-Language", "en")
            .send()
            .await
            .context("Failed to reach LinkedIn")?;

        let url = Url::parse(&auth_url).context("Invalid LinkedIn base URL")?;
        let jsessionid = jar
            .cookies(&url)
            .and_then(|header| header.to_str().ok().and_then(parse_jsessionid))
            .context("LinkedIn did not issue a session cookie")?;

        let response = client
            .post(&auth_url)
            .header("X-Li-User-Agent", "LIAuthLibrary:3.2.4 com.linkedin.LinkedIn:8.8.1")
            .header("X-User-Language", "en")
            .form(&[
                ("session_key", credentials.email.as_str()),
                ("session_password", credentials.password.as_str()),
                ("JSESSIONID", jsessionid.as_str()),
            ])
            .send()
            .await
            .context("Failed to send LinkedIn login request")?;

        if response.status() == StatusCode::UNAUTHORIZED {
            anyhow::bail!("Incorrect Credentials or Login Issue: unauthorized");
        }

        let login: LoginResponse = response
            .json()
            .await
            .context("Failed to parse LinkedIn login response")?;

        if login.login_result != "PASS" {
            error!("LinkedIn login refused: {}", login.login_result);
            anyhow::bail!(
                "Incorrect Credentials or Login Issue: {}",
                login.login_result
            );
        }

        info!("LinkedIn login successful");
        Ok(jsessionid)
    }

    /// `{base}/voyager/api/identity/profiles/{profile_id}/{resource}` with the
    /// slug encoded as a single path segment
    fn profile_url(&self, profile_id: &str, resource: &str, query: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, PROFILES_ENDPOINT))
            .context("Invalid LinkedIn base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("LinkedIn base URL cannot carry a path"))?
            .push(profile_id)
            .push(resource);
        url.set_query(query);
        Ok(url)
    }

    async fn get_voyager(&self, client: &Client, csrf_token: &str, url: Url) -> Result<Value> {
        let response = client
            .get(url.clone())
            .header("csrf-token", csrf_token)
            .header("X-RestLi-Protocol-Version", "2.0.0")
            .send()
            .await
            .with_context(|| format!("Failed to GET {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("LinkedIn returned error {}: {}", status, error_text);
        }

        response
            .json::<Value>()
            .await
            .context("Failed to parse LinkedIn response")
    }
}

#[rocket::async_trait]
impl ProfileSource for LinkedinClient {
    async fn fetch_profile(
        &self,
        credentials: &LinkedinCredentials,
        profile_id: &str,
    ) -> Result<Value> {
        let jar = Arc::new(Jar::default());
        let client = self.http_client(jar.clone())?;

        let csrf_token = self.authenticate(&client, &jar, credentials).await?;

        let view_url = self.profile_url(profile_id, "profileView", None)?;
        let view = self.get_voyager(&client, &csrf_token, view_url).await?;

        let skills_url = self.profile_url(profile_id, "skills", Some("count=100&start=0"))?;
        let skills = match self.get_voyager(&client, &csrf_token, skills_url).await {
            Ok(value) => serde_json::from_value::<Elements>(value).ok(),
            Err(e) => {
                warn!("Skills lookup failed for {}: {:#}", profile_id, e);
                None
            }
        };

        flatten_profile_view(&view, skills)
            .context("Profile does not exist or is private")
    }
}

/// Find the JSESSIONID value in a `Cookie` header, without its quotes
pub(crate) fn parse_jsessionid(cookie_header: &str) -> Option<String> {
    cookie_header
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix("JSESSIONID="))
        .map(|value| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// Reduce a profileView payload to a flat record keyed by field name.
///
/// Returns `None` when the payload carries no profile.
pub(crate) fn flatten_profile_view(view: &Value, skills: Option<Elements>) -> Option<Value> {
    let profile = view.get("profile")?.as_object()?;
    if profile.is_empty() {
        return None;
    }

    let mut record = Map::new();
    for key in ["headline", "summary", "firstName", "lastName", "industryName"] {
        if let Some(value) = profile.get(key) {
            record.insert(key.to_string(), value.clone());
        }
    }

    let certifications = nested_elements(view, "certificationView");
    record.insert("certifications".to_string(), Value::Array(certifications));

    let skills = match skills {
        Some(list) if !list.elements.is_empty() => list.elements,
        _ => nested_elements(view, "skillView"),
    };
    record.insert("skills".to_string(), Value::Array(skills));

    Some(Value::Object(record))
}

fn nested_elements(view: &Value, key: &str) -> Vec<Value> {
    view.get(key)
        .and_then(|v| v.get("elements"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
