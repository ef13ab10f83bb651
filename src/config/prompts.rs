//! Prompt templates for Reelcast.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    pub script: ScriptPrompts,
    pub queries: QueryPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for researching and writing the narration script.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptPrompts {
    pub system: String,
    pub user: String,
}

impl Default for ScriptPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are an expert video creator who produces engaging, well-researched narrated videos.

Always search the web before writing. Gather current news, the latest statistics, recent events and ongoing discussions about the topic. Prefer information from the last 30 days where it exists."#
                .to_string(),

            user: r####"Create a compelling script of about {{target_words}} words about "{{query}}".

Natural flow:
- No formulaic "Introduction" or "Conclusion" sections
- Open with a hook: a surprising fact, a current event or a striking number
- Let topics flow into each other with conversational transitions
- End with a forward-looking insight or a thought-provoking question

Section headings:
- Use 4-6 descriptive headings written as "### Heading"
- Good: "### Tesla's Game-Changing Battery Breakthrough"
- Bad: "### Introduction", "### Overview", "### Conclusion"

Content:
- Weave in specific dates, numbers and recent examples
- Short paragraphs of 2-4 sentences for easy listening
- Address the viewer as "you" and keep a conversational tone

Each section should be 200-300 words.

End with "### Sources:" followed by the plain URLs you used, one per line, no formatting."####
                .to_string(),
        }
    }
}

/// Prompts for turning narration text into image search queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryPrompts {
    /// One paragraph in, `{{n}}` queries out as a JSON array.
    pub scene: String,
    /// Several segments in, a JSON object keyed by segment index out.
    pub batch: String,
}

impl Default for QueryPrompts {
    fn default() -> Self {
        Self {
            scene: r#"You write Google Images search queries for video backgrounds by analyzing a paragraph of narration.

First work out what the paragraph is specifically about and which visual elements would represent it.

Rules:
- Never use bare entity names; always add visual and temporal context
- Add a year or "recent" so the results are current
- Prefer action shots, crowds, events and people over logos, crests or emblems
- Keep each query to 3-5 words
- Every query must be specific to the paragraph, not generic

Example: instead of "Real Madrid 2024" write "Real Madrid trophy lift 2024".

The overall video topic is "{{topic}}".

Return exactly {{n}} queries as a JSON array of strings and nothing else.

Paragraph:
"{{text}}""#
                .to_string(),

            batch: r#"You write Google Images search queries for the segments of a narrated video about "{{topic}}".

For every segment produce exactly {{n}} queries of 3-5 words each. Prefer action shots, crowds, events and people over logos or emblems. Add a year or "recent" so results are current.

Return ONLY a JSON object mapping each segment index (as a string) to its array of queries, for example {"0": ["query one", "query two"]}.

Segments:
{{segments}}"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts, overriding defaults from `custom_dir` where files exist.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let script_path = custom_path.join("script.toml");
            if script_path.exists() {
                let content = std::fs::read_to_string(&script_path)?;
                prompts.script = toml::from_str(&content)?;
            }

            let queries_path = custom_path.join("queries.toml");
            if queries_path.exists() {
                let content = std::fs::read_to_string(&queries_path)?;
                prompts.queries = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render with both provided and config variables; provided ones win.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
