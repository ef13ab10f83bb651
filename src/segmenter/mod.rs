//! Script segmentation.
//!
//! Splits a generated script on `###` headings into ordered narration
//! segments. Structural sections such as the source list are dropped here so
//! they never reach narration or image retrieval. A heading line needs at
//! least one character after the marker; a bare `###` stays in the body.

use crate::config::SegmenterSettings;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, info};

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{3}[ \t]*(.+)$").expect("valid heading regex"));

/// One narration unit of the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Zero-based position in the segmenter output.
    pub index: usize,
    /// Heading label, if any.
    pub heading: Option<String>,
    /// Text to be spoken. Never empty.
    pub content: String,
    /// Byte offset in the script where this segment starts.
    pub source_offset: usize,
}

/// Decides which headings are structural (organizational or citation) rather
/// than content-bearing.
#[derive(Debug, Clone)]
pub struct HeadingPolicy {
    structural_prefixes: Vec<String>,
}

impl HeadingPolicy {
    pub fn new<I, S>(structural_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            structural_prefixes: structural_prefixes
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive prefix match against the structural set.
    ///
    /// Markdown emphasis around the heading is ignored, so `**Sources:**`
    /// matches `sources`.
    pub fn is_structural(&self, heading: &str) -> bool {
        let normalized = heading
            .trim_start_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
            .to_lowercase();
        self.structural_prefixes
            .iter()
            .any(|prefix| normalized.starts_with(prefix.as_str()))
    }
}

/// How text before the first heading is labeled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadingLabel {
    Unlabeled,
    Label(String),
}

impl LeadingLabel {
    fn heading(&self) -> Option<String> {
        match self {
            LeadingLabel::Unlabeled => None,
            LeadingLabel::Label(label) => Some(label.clone()),
        }
    }
}

impl From<Option<String>> for LeadingLabel {
    fn from(label: Option<String>) -> Self {
        match label {
            Some(l) if !l.trim().is_empty() => LeadingLabel::Label(l.trim().to_string()),
            _ => LeadingLabel::Unlabeled,
        }
    }
}

/// Splits script text into segments.
#[derive(Debug, Clone)]
pub struct Segmenter {
    policy: HeadingPolicy,
    leading: LeadingLabel,
}

impl Segmenter {
    pub fn new(policy: HeadingPolicy, leading: LeadingLabel) -> Self {
        Self { policy, leading }
    }

    pub fn from_settings(settings: &SegmenterSettings) -> Self {
        Self::new(
            HeadingPolicy::new(&settings.structural_headings),
            settings.leading_label.clone().into(),
        )
    }

    /// Split a script into ordered, non-empty segments.
    pub fn segment(&self, script: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let headings: Vec<_> = HEADING_RE.captures_iter(script).collect();

        let lead_end = headings
            .first()
            .and_then(|c| c.get(0))
            .map_or(script.len(), |m| m.start());
        let lead = script[..lead_end].trim();
        if !lead.is_empty() {
            segments.push(Segment {
                index: 0,
                heading: self.leading.heading(),
                content: lead.to_string(),
                source_offset: 0,
            });
        }

        for (i, caps) in headings.iter().enumerate() {
            let (Some(whole), Some(title)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let body_end = headings
                .get(i + 1)
                .and_then(|c| c.get(0))
                .map_or(script.len(), |m| m.start());

            let heading = title.as_str().trim();
            let body = script[whole.end()..body_end].trim();

            // Exclusion wins over informative labeling.
            if self.policy.is_structural(heading) {
                info!("Skipping structural section '{}'", heading);
                continue;
            }
            if body.is_empty() {
                debug!("Skipping heading '{}' with empty body", heading);
                continue;
            }

            // A heading marker without a label still splits, but names nothing.
            let label = heading.trim_end_matches(['.', ':']).trim();
            let (heading, content) = if label.is_empty() {
                (None, body.to_string())
            } else {
                (Some(heading.to_string()), format!("{}. {}", label, body))
            };

            segments.push(Segment {
                index: segments.len(),
                heading,
                content,
                source_offset: whole.start(),
            });
        }

        info!("Parsed script into {} segment(s)", segments.len());
        segments
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::from_settings(&SegmenterSettings::default())
    }
}
