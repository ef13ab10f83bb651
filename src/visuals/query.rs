//! Image search query derivation.
//!
//! A [`QueryGenerator`] asks a model for queries and may fail in any way.
//! [`QueryDeriver`] wraps it and always returns exactly `n` queries per
//! segment, padding with deterministic topic-derived fallbacks.

use crate::config::{Prompts, VisualSettings};
use crate::error::{ReelcastError, Result};
use crate::openai::{create_client, extract_json};
use crate::segmenter::Segment;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Paragraph text sent to the model is cut to this many characters.
const SCENE_TEXT_LIMIT: usize = 1000;
/// Per-segment text in batch requests is cut to this many characters.
const BATCH_TEXT_LIMIT: usize = 500;

const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "are", "as", "at", "be", "best", "biggest", "by", "could",
    "did", "do", "does", "for", "from", "has", "have", "how", "in", "include", "into", "is", "it",
    "its", "latest", "new", "news", "of", "on", "or", "out", "should", "that", "the", "their",
    "them", "these", "they", "this", "those", "time", "to", "top", "vs", "was", "were", "what",
    "when", "where", "which", "who", "why", "will", "with", "work", "would",
];

/// Source of model-generated search queries. Implementations may fail.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    /// Queries for one paragraph, in the order the model gave them.
    async fn scene_queries(&self, text: &str, n: usize, topic: &str) -> Result<Vec<String>>;

    /// Queries for several segments in one call, keyed by segment index.
    async fn batch_queries(
        &self,
        segments: &[Segment],
        n: usize,
        topic: &str,
    ) -> Result<HashMap<usize, Vec<String>>>;
}

/// Reduce a topic to one concrete word for fallback queries.
///
/// Stop words and pure numbers are dropped and the longest remaining word is
/// kept (the first one on ties). Falls back to the trimmed topic.
pub fn topic_keyword(topic: &str) -> String {
    let mut best: Option<&str> = None;
    for word in topic.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\'')) {
        let word = word.trim_matches(|c: char| c == '-' || c == '\'');
        if word.is_empty() || word.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if STOP_WORDS.contains(&word.to_lowercase().as_str()) {
            continue;
        }
        if best.map_or(true, |b| word.chars().count() > b.chars().count()) {
            best = Some(word);
        }
    }
    best.map(str::to_string).unwrap_or_else(|| topic.trim().to_string())
}

/// The deterministic query used for slot `position` (1-based).
pub fn fallback_query(keyword: &str, position: usize) -> String {
    format!("{} photo {}", keyword, position)
}

/// Total, order-preserving query derivation.
#[derive(Clone)]
pub struct QueryDeriver {
    generator: Arc<dyn QueryGenerator>,
}

impl QueryDeriver {
    pub fn new(generator: Arc<dyn QueryGenerator>) -> Self {
        Self { generator }
    }

    /// Exactly `n` queries for `text`. Never fails.
    #[instrument(skip(self, text), fields(n = n))]
    pub async fn derive(&self, text: &str, n: usize, topic: &str) -> Vec<String> {
        let derived = match self.generator.scene_queries(text, n, topic).await {
            Ok(queries) => queries,
            Err(e) => {
                warn!("Query derivation failed, using fallback: {}", e);
                Vec::new()
            }
        };
        normalize(derived, n, topic)
    }

    /// Exactly `n` queries for every segment, keyed by segment index.
    ///
    /// A failed call, or an index missing from the reply, falls back for
    /// that index only.
    #[instrument(skip(self, segments), fields(segments = segments.len(), n = n))]
    pub async fn derive_batch(
        &self,
        segments: &[Segment],
        n: usize,
        topic: &str,
    ) -> BTreeMap<usize, Vec<String>> {
        let mut reply = match self.generator.batch_queries(segments, n, topic).await {
            Ok(map) => map,
            Err(e) => {
                warn!("Batch query derivation failed, using fallback: {}", e);
                HashMap::new()
            }
        };

        segments
            .iter()
            .map(|segment| {
                let derived = reply.remove(&segment.index).unwrap_or_else(|| {
                    debug!("No queries for segment {}, using fallback", segment.index);
                    Vec::new()
                });
                (segment.index, normalize(derived, n, topic))
            })
            .collect()
    }
}

/// Trim, drop blanks, then pad or cut to exactly `n`.
fn normalize(queries: Vec<String>, n: usize, topic: &str) -> Vec<String> {
    let mut queries: Vec<String> = queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .take(n)
        .collect();

    if queries.len() < n {
        let keyword = topic_keyword(topic);
        for position in queries.len() + 1..=n {
            queries.push(fallback_query(&keyword, position));
        }
    }
    queries
}

/// Query generator backed by an OpenAI chat model.
pub struct OpenAIQueryGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    prompts: Prompts,
}

impl OpenAIQueryGenerator {
    pub fn with_config(settings: &VisualSettings, prompts: Prompts) -> Result<Self> {
        Ok(Self {
            client: create_client(Duration::from_secs(60))?,
            model: settings.query_model.clone(),
            prompts,
        })
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| ReelcastError::OpenAI(e.to_string()))?
            .into()];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.3)
            .build()
            .map_err(|e| ReelcastError::OpenAI(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ReelcastError::OpenAI(format!("Query generation failed: {}", e)))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| ReelcastError::OpenAI("Empty response from LLM".to_string()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryList {
    Many(Vec<serde_json::Value>),
    One(String),
}

impl QueryList {
    fn into_strings(self) -> Vec<String> {
        match self {
            QueryList::One(q) => vec![q],
            QueryList::Many(values) => values
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        }
    }
}

/// Parse a JSON array of queries out of a model reply.
pub(crate) fn parse_scene_reply(reply: &str) -> Result<Vec<String>> {
    let json = extract_json(reply)
        .ok_or_else(|| ReelcastError::InvalidInput("No JSON array in reply".to_string()))?;
    let list: Vec<serde_json::Value> = serde_json::from_str(json)?;
    Ok(QueryList::Many(list).into_strings())
}

/// Parse a JSON object of index -> queries out of a model reply.
///
/// Keys that are not segment indexes are ignored.
pub(crate) fn parse_batch_reply(reply: &str) -> Result<HashMap<usize, Vec<String>>> {
    let json = extract_json(reply)
        .ok_or_else(|| ReelcastError::InvalidInput("No JSON object in reply".to_string()))?;
    let map: HashMap<String, QueryList> = serde_json::from_str(json)?;
    Ok(map
        .into_iter()
        .filter_map(|(key, list)| key.trim().parse::<usize>().ok().map(|i| (i, list.into_strings())))
        .collect())
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[async_trait]
impl QueryGenerator for OpenAIQueryGenerator {
    async fn scene_queries(&self, text: &str, n: usize, topic: &str) -> Result<Vec<String>> {
        let mut vars = HashMap::new();
        vars.insert("text".to_string(), truncate_chars(text, SCENE_TEXT_LIMIT));
        vars.insert("n".to_string(), n.to_string());
        vars.insert("topic".to_string(), topic.to_string());

        let prompt = self.prompts.render_with_custom(&self.prompts.queries.scene, &vars);
        let reply = self.complete(prompt).await?;
        parse_scene_reply(&reply)
    }

    async fn batch_queries(
        &self,
        segments: &[Segment],
        n: usize,
        topic: &str,
    ) -> Result<HashMap<usize, Vec<String>>> {
        let listing: Vec<serde_json::Value> = segments
            .iter()
            .map(|s| {
                serde_json::json!({
                    "index": s.index,
                    "heading": s.heading,
                    "text": truncate_chars(&s.content, BATCH_TEXT_LIMIT),
                })
            })
            .collect();

        let mut vars = HashMap::new();
        vars.insert("segments".to_string(), serde_json::to_string_pretty(&listing)?);
        vars.insert("n".to_string(), n.to_string());
        vars.insert("topic".to_string(), topic.to_string());

        let prompt = self.prompts.render_with_custom(&self.prompts.queries.batch, &vars);
        let reply = self.complete(prompt).await?;
        parse_batch_reply(&reply)
    }
}
