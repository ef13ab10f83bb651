//! Configuration settings for Reelcast.

use crate::error::{ReelcastError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Smallest and largest accepted images-per-segment values.
pub const IMAGES_PER_SEGMENT_RANGE: std::ops::RangeInclusive<usize> = 1..=5;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub script: ScriptSettings,
    pub segmenter: SegmenterSettings,
    pub narration: NarrationSettings,
    pub visuals: VisualSettings,
    pub render: RenderSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for downloaded assets.
    pub data_dir: String,
    /// Directory for intermediate audio.
    pub temp_dir: String,
    /// Directory where scripts and finished videos are written.
    pub output_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.reelcast".to_string(),
            temp_dir: "/tmp/reelcast".to_string(),
            output_dir: "output".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Script generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    /// Search-enabled chat model used to research and write the script.
    pub model: String,
    /// Approximate script length in words.
    pub target_words: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-search-preview".to_string(),
            target_words: 1200,
            timeout_secs: 300,
        }
    }
}

/// Script segmentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterSettings {
    /// Headings that start with any of these (case-insensitive) are dropped with their body.
    pub structural_headings: Vec<String>,
    /// Label for text before the first heading. None leaves it unlabeled.
    pub leading_label: Option<String>,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            structural_headings: ["sources", "references", "bibliography", "further reading", "credits"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            leading_label: Some("Opening".to_string()),
        }
    }
}

/// Text-to-speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationSettings {
    /// Speech model.
    pub model: String,
    /// Voice identifier (nova, ash, alloy, fable, ...).
    pub voice: String,
    /// Free-form delivery directive passed to the speech model.
    pub style: String,
    /// Cleaned text longer than this is synthesized in chunks.
    pub max_chars: usize,
    /// Upper bound for a single chunk.
    pub chunk_chars: usize,
    /// Pause between chunk requests in milliseconds.
    pub chunk_pause_ms: u64,
    /// Attempts per segment before the segment is dropped.
    pub attempts: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini-tts".to_string(),
            voice: "nova".to_string(),
            style: "Friendly, upbeat narration.".to_string(),
            max_chars: 4096,
            chunk_chars: 4000,
            chunk_pause_ms: 500,
            attempts: 2,
            timeout_secs: 120,
        }
    }
}

/// Image query derivation and retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualSettings {
    /// Images shown per segment (1-5).
    pub images_per_segment: usize,
    /// Chat model used to turn segment text into search queries.
    pub query_model: String,
    /// Derive every segment's queries in one model call instead of one per segment.
    pub batch_queries: bool,
    /// Minimum accepted image width in pixels.
    pub min_width: u32,
    /// Download attempts per image URL.
    pub max_attempts: u32,
    /// Delay between download attempts in milliseconds.
    pub retry_backoff_ms: u64,
    /// Timeout for a single search or download call in seconds.
    pub fetch_timeout_secs: u64,
    /// Hosts that are never downloaded from.
    pub blocklist: Vec<String>,
    /// Indexed topic queries tried after the direct and topic queries fail.
    pub fallback_budget: usize,
    /// Search result pages consulted per query.
    pub max_pages: u32,
    /// Segments whose images are fetched concurrently.
    pub max_concurrent_segments: usize,
    /// SerpAPI endpoint.
    pub search_endpoint: String,
    /// Environment variable holding the SerpAPI key.
    pub api_key_env: String,
}

impl Default for VisualSettings {
    fn default() -> Self {
        Self {
            images_per_segment: 2,
            query_model: "gpt-4o-mini".to_string(),
            batch_queries: false,
            min_width: 1000,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            fetch_timeout_secs: 20,
            blocklist: ["lookaside.instagram.com", "lookaside.fbsbx.com", "img.uefa.com"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fallback_budget: 2,
            max_pages: 5,
            max_concurrent_segments: 3,
            search_endpoint: "https://serpapi.com/search.json".to_string(),
            api_key_env: "SERP_API_KEY".to_string(),
        }
    }
}

impl VisualSettings {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Video assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Cross-fade between slices and between segments, in seconds.
    pub crossfade_seconds: f64,
    /// Colour of the placeholder shown for segments without images.
    pub placeholder_color: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub bitrate: String,
    pub preset: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            crossfade_seconds: 0.5,
            placeholder_color: "0x141414".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            bitrate: "6000k".to_string(),
            preset: "ultrafast".to_string(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let settings: Settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !IMAGES_PER_SEGMENT_RANGE.contains(&self.visuals.images_per_segment) {
            return Err(ReelcastError::Config(format!(
                "visuals.images_per_segment must be between {} and {}, got {}",
                IMAGES_PER_SEGMENT_RANGE.start(),
                IMAGES_PER_SEGMENT_RANGE.end(),
                self.visuals.images_per_segment
            )));
        }
        if self.narration.chunk_chars == 0 || self.narration.chunk_chars > self.narration.max_chars {
            return Err(ReelcastError::Config(
                "narration.chunk_chars must be non-zero and not exceed narration.max_chars".to_string(),
            ));
        }
        if self.visuals.max_attempts == 0 {
            return Err(ReelcastError::Config("visuals.max_attempts must be at least 1".to_string()));
        }
        if self.render.crossfade_seconds < 0.0 {
            return Err(ReelcastError::Config("render.crossfade_seconds must not be negative".to_string()));
        }
        Ok(())
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| ReelcastError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reelcast")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.output_dir)
    }

    /// Where verified images and their sidecars are stored.
    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir().join("assets")
    }
}
