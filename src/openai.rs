//! Shared HTTP and OpenAI client construction.

use crate::error::{ReelcastError, Result};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; reelcast)";

/// Build a reqwest client whose every request is bounded by `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ReelcastError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Create an OpenAI client with a per-request timeout.
pub fn create_client(timeout: Duration) -> Result<Client<OpenAIConfig>> {
    Ok(Client::with_config(OpenAIConfig::default()).with_http_client(http_client(timeout)?))
}

/// Read the OpenAI API key the same way async-openai does.
pub fn api_key() -> Result<String> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(ReelcastError::Config("OPENAI_API_KEY not set".to_string())),
    }
}

/// Pull the first JSON object or array out of an LLM reply.
///
/// Models often wrap JSON in prose or code fences.
pub fn extract_json(reply: &str) -> Option<&str> {
    let start = reply.find(['{', '['])?;
    let close = if reply[start..].starts_with('{') { '}' } else { ']' };
    let end = reply.rfind(close)?;
    (end > start).then(|| &reply[start..=end])
}
