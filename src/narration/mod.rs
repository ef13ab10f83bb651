//! Narration: turns segment text into one audio file per segment.
//!
//! Text is cleaned before synthesis. Cleaned text above the configured length
//! is synthesized in sentence-aligned chunks that are joined back together.

mod clean;
mod openai;

pub use clean::{clean_for_speech, split_into_chunks};
pub use openai::OpenAISpeech;

use crate::audio::AudioTools;
use crate::config::NarrationSettings;
use crate::error::{ReelcastError, Result};
use crate::segmenter::Segment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Trait for text-to-speech services.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` and write the audio to `dest`.
    async fn synthesize(&self, text: &str, dest: &Path) -> Result<()>;
}

/// A synthesized narration file owned by one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub duration_seconds: f64,
}

/// Orchestrates cleaning, chunking and synthesis for segments.
pub struct Narrator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    audio: Arc<dyn AudioTools>,
    audio_dir: PathBuf,
    max_chars: usize,
    chunk_chars: usize,
    chunk_pause: Duration,
    attempts: u32,
}

impl Narrator {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        audio: Arc<dyn AudioTools>,
        audio_dir: PathBuf,
        settings: &NarrationSettings,
    ) -> Self {
        Self {
            synthesizer,
            audio,
            audio_dir,
            max_chars: settings.max_chars,
            chunk_chars: settings.chunk_chars,
            chunk_pause: Duration::from_millis(settings.chunk_pause_ms),
            attempts: settings.attempts.max(1),
        }
    }

    /// Narrate one segment into `scene_{index}.mp3`.
    #[instrument(skip(self, segment), fields(index = segment.index))]
    pub async fn narrate(&self, segment: &Segment) -> Result<AudioArtifact> {
        let dest = self.audio_dir.join(format!("scene_{}.mp3", segment.index));
        self.text_to_audio(&segment.content, &dest).await
    }

    /// Clean `text`, synthesize it to `dest` and measure the result.
    pub async fn text_to_audio(&self, text: &str, dest: &Path) -> Result<AudioArtifact> {
        let cleaned = clean_for_speech(text);
        if cleaned.is_empty() {
            return Err(ReelcastError::Narration("Nothing left to speak after cleaning".to_string()));
        }

        tokio::fs::create_dir_all(&self.audio_dir).await?;

        let written = if cleaned.chars().count() > self.max_chars {
            self.chunk_and_combine(&cleaned, dest).await
        } else {
            self.synthesize_with_retry(&cleaned, dest).await
        };

        if let Err(e) = written {
            remove_quietly(dest);
            return Err(e);
        }

        match self.audio.duration(dest).await {
            Ok(duration) if duration > 0.0 => Ok(AudioArtifact {
                path: dest.to_path_buf(),
                duration_seconds: duration,
            }),
            Ok(_) => {
                remove_quietly(dest);
                Err(ReelcastError::Narration(format!("{} has no audible length", dest.display())))
            }
            Err(e) => {
                remove_quietly(dest);
                Err(e)
            }
        }
    }

    async fn synthesize_with_retry(&self, text: &str, dest: &Path) -> Result<()> {
        let mut last_error = None;
        for attempt in 1..=self.attempts {
            match self.synthesizer.synthesize(text, dest).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Speech attempt {}/{} failed: {}", attempt, self.attempts, e);
                    remove_quietly(dest);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ReelcastError::Narration("No synthesis attempted".to_string())))
    }

    /// Synthesize chunks separately and join them in order into `dest`.
    ///
    /// Chunk files are always removed, whether or not the join succeeds.
    async fn chunk_and_combine(&self, text: &str, dest: &Path) -> Result<()> {
        let chunks = split_into_chunks(text, self.chunk_chars);
        info!("Narrating {} chunks", chunks.len());

        let stem = dest
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("narration")
            .to_string();

        let mut parts = Vec::with_capacity(chunks.len());
        let mut result = Ok(());

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !self.chunk_pause.is_zero() {
                tokio::time::sleep(self.chunk_pause).await;
            }
            let part = self.audio_dir.join(format!("{}_chunk_{}.mp3", stem, i));
            debug!("Chunk {} has {} chars", i, chunk.chars().count());
            if let Err(e) = self.synthesize_with_retry(chunk, &part).await {
                result = Err(ReelcastError::Narration(format!("Chunk {} failed: {}", i, e)));
                break;
            }
            parts.push(part);
        }

        if result.is_ok() {
            result = self.audio.concat(&parts, dest).await;
        }

        for part in &parts {
            remove_quietly(part);
        }
        result
    }
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
