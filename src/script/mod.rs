//! Script generation and persistence.

mod openai;

pub use openai::OpenAIScriptWriter;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid url regex"));
static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid slug regex"));
static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s_-]+").expect("valid slug regex"));

/// A researched narration script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedScript {
    pub query: String,
    pub text: String,
    /// Cited URLs in first-occurrence order, without duplicates.
    pub sources: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl GeneratedScript {
    /// Build a script from raw model output, extracting its sources.
    pub fn from_text(query: &str, text: &str) -> Self {
        let text = text.trim().to_string();
        Self {
            query: query.to_string(),
            sources: extract_source_urls(&text),
            text,
            generated_at: Utc::now(),
        }
    }

    /// Write `<slug>.txt` with the script and `<slug>.sources.json` next to it.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let slug = slug(&self.query);
        let text_path = dir.join(format!("{}.txt", slug));
        std::fs::write(&text_path, &self.text)?;

        let sources = serde_json::json!({
            "query": self.query,
            "generated_at": self.generated_at,
            "sources": self.sources,
        });
        std::fs::write(
            dir.join(format!("{}.sources.json", slug)),
            serde_json::to_string_pretty(&sources)?,
        )?;
        Ok(text_path)
    }
}

/// Produces a script for a query.
#[async_trait]
pub trait ScriptSource: Send + Sync {
    async fn generate(&self, query: &str) -> Result<GeneratedScript>;
}

/// Every `http(s)://` URL in `text`, deduplicated in first-occurrence order.
///
/// Trailing punctuation that commonly follows a URL in prose is dropped.
pub fn extract_source_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in URL_RE.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';', ':', ')', ']', '>', '"', '\'']);
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

/// File-name-safe form of a query, at most 60 characters.
pub fn slug(text: &str) -> String {
    let lowered = text.to_lowercase();
    let cleaned = NON_WORD_RE.replace_all(&lowered, "");
    let joined = SEPARATOR_RE.replace_all(&cleaned, "_");
    let trimmed: String = joined.trim_matches(|c: char| c == '_' || c == ' ').chars().take(60).collect();
    if trimmed.is_empty() {
        "script".to_string()
    } else {
        trimmed
    }
}
