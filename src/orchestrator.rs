//! Pipeline orchestrator for Reelcast.
//!
//! Coordinates the whole run from script generation to the rendered video.

use crate::audio::{AudioTools, FfmpegAudio};
use crate::config::{Prompts, Settings};
use crate::error::{ReelcastError, Result};
use crate::narration::{Narrator, OpenAISpeech, SpeechSynthesizer};
use crate::render::{FfmpegRenderer, Renderer};
use crate::script::{slug, GeneratedScript, OpenAIScriptWriter, ScriptSource};
use crate::segmenter::{Segment, Segmenter};
use crate::timeline::{build_timeline, SegmentMedia};
use crate::visuals::{
    AssetFetcher, Downloader, HttpDownloader, ImageCollector, ImageSearch, OpenAIQueryGenerator, QueryDeriver,
    QueryGenerator, SerpApiSearch,
};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// External collaborators used by the pipeline.
pub struct Components {
    pub script: Arc<dyn ScriptSource>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub audio: Arc<dyn AudioTools>,
    pub queries: Arc<dyn QueryGenerator>,
    pub search: Arc<dyn ImageSearch>,
    pub downloader: Arc<dyn Downloader>,
    pub renderer: Arc<dyn Renderer>,
}

impl Components {
    /// OpenAI, SerpAPI and ffmpeg backed collaborators.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let prompts = Prompts::load(settings.prompts.custom_dir.as_deref(), Some(&settings.prompts.variables))?;

        Ok(Self {
            script: Arc::new(OpenAIScriptWriter::with_config(&settings.script, prompts.clone())?),
            speech: Arc::new(OpenAISpeech::with_config(&settings.narration)?),
            audio: Arc::new(FfmpegAudio::new()),
            queries: Arc::new(OpenAIQueryGenerator::with_config(&settings.visuals, prompts)?),
            search: Arc::new(SerpApiSearch::with_config(&settings.visuals)?),
            downloader: Arc::new(HttpDownloader::new(settings.visuals.fetch_timeout())?),
            renderer: Arc::new(FfmpegRenderer::new(settings.render.clone(), settings.temp_dir())),
        })
    }
}

/// The main orchestrator for the Reelcast pipeline.
pub struct Orchestrator {
    settings: Settings,
    script_source: Arc<dyn ScriptSource>,
    segmenter: Segmenter,
    narrator: Narrator,
    deriver: QueryDeriver,
    fetcher: AssetFetcher,
    renderer: Arc<dyn Renderer>,
    output_dir: PathBuf,
}

impl Orchestrator {
    /// Create an orchestrator with the default external services.
    pub fn new(settings: Settings) -> Result<Self> {
        let components = Components::from_settings(&settings)?;
        Self::with_components(settings, components)
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(settings: Settings, components: Components) -> Result<Self> {
        settings.validate()?;

        let audio_dir = settings.temp_dir().join("audio");
        let output_dir = settings.output_dir();
        std::fs::create_dir_all(&audio_dir)?;
        std::fs::create_dir_all(&output_dir)?;

        let narrator = Narrator::new(components.speech, components.audio, audio_dir, &settings.narration);
        let fetcher = AssetFetcher::new(
            components.search,
            components.downloader,
            settings.assets_dir(),
            &settings.visuals,
        );

        Ok(Self {
            segmenter: Segmenter::from_settings(&settings.segmenter),
            script_source: components.script,
            narrator,
            deriver: QueryDeriver::new(components.queries),
            fetcher,
            renderer: components.renderer,
            output_dir,
            settings,
        })
    }

    /// Get the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Research `query`, then narrate, illustrate and render it.
    ///
    /// `output` names the video file; relative names land in the output
    /// directory. Defaults to `<slug>.mp4`.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn generate(&self, query: &str, output: Option<&Path>) -> Result<PipelineResult> {
        eprintln!("  Writing script...");
        let script = self.script_source.generate(query).await?;
        let script_path = script.save(&self.output_dir)?;
        eprintln!("  Script saved to {} ({} sources)", script_path.display(), script.sources.len());

        let mut result = self.produce(&script, output).await?;
        result.script_path = Some(script_path);
        Ok(result)
    }

    /// Run every stage after script generation.
    #[instrument(skip(self, script), fields(query = %script.query))]
    pub async fn produce(&self, script: &GeneratedScript, output: Option<&Path>) -> Result<PipelineResult> {
        let result = self.run_stages(script, output).await;
        if let Err(e) = &result {
            error!("Pipeline failed: {}", e);
        }
        result
    }

    async fn run_stages(&self, script: &GeneratedScript, output: Option<&Path>) -> Result<PipelineResult> {
        let segments = self.segmenter.segment(&script.text);
        if segments.is_empty() {
            return Err(ReelcastError::Pipeline("Script produced no segments".to_string()));
        }
        eprintln!("  Split script into {} segments", segments.len());

        let mut media = self.narrate_all(&segments).await;
        let narrated = media.iter().filter(|m| m.audio.is_some()).count();
        if narrated == 0 {
            return Err(ReelcastError::Pipeline("No segment could be narrated".to_string()));
        }
        eprintln!("  Narrated {}/{} segments", narrated, segments.len());

        self.attach_images(&mut media, &script.query).await;
        let images = media.iter().map(|m| m.images.len()).sum();

        let timeline = build_timeline(&media, self.settings.render.crossfade_seconds);
        let destination = self.output_path(&script.query, output);

        eprintln!("  Rendering {:.1}s of video...", timeline.total_duration());
        let video_path = self.renderer.render(&timeline, &destination).await?;
        eprintln!("  Video written to {}", video_path.display());

        Ok(PipelineResult {
            video_path,
            script_path: None,
            segments: segments.len(),
            narrated,
            images,
            duration_seconds: timeline.total_duration(),
        })
    }

    /// Narrate segments one at a time; failures leave the segment without audio.
    async fn narrate_all(&self, segments: &[Segment]) -> Vec<SegmentMedia> {
        let pb = progress_bar(segments.len(), "Narration");
        let mut media = Vec::with_capacity(segments.len());

        for segment in segments {
            let mut item = SegmentMedia::new(segment.clone());
            match self.narrator.narrate(segment).await {
                Ok(audio) => item.audio = Some(audio),
                Err(e) => warn!("Dropping segment {}: {}", segment.index, e),
            }
            pb.inc(1);
            media.push(item);
        }

        pb.finish_and_clear();
        media
    }

    /// Fetch images for every narrated segment, bounded by
    /// `max_concurrent_segments`.
    async fn attach_images(&self, media: &mut [SegmentMedia], topic: &str) {
        let per_segment = self.settings.visuals.images_per_segment;
        let budget = self.settings.visuals.fallback_budget;
        let narrated: Vec<Segment> = media
            .iter()
            .filter(|m| m.audio.is_some())
            .map(|m| m.segment.clone())
            .collect();

        let mut batch = if self.settings.visuals.batch_queries {
            self.deriver.derive_batch(&narrated, per_segment, topic).await
        } else {
            BTreeMap::new()
        };

        let pb = progress_bar(narrated.len(), "Images");
        let mut stream = stream::iter(narrated.into_iter())
            .map(|segment| {
                let queries = batch.remove(&segment.index);
                let pb = pb.clone();
                async move {
                    let queries = match queries {
                        Some(q) => q,
                        None => self.deriver.derive(&segment.content, per_segment, topic).await,
                    };
                    let collector = ImageCollector::new(&self.fetcher, topic, budget);
                    let images = collector.collect(segment.index, &queries).await;
                    pb.inc(1);
                    (segment.index, images)
                }
            })
            .buffer_unordered(self.settings.visuals.max_concurrent_segments.max(1));

        let mut results: Vec<(usize, Vec<PathBuf>)> = Vec::new();
        while let Some(result) = stream.next().await {
            results.push(result);
        }
        pb.finish_and_clear();

        results.sort_by_key(|(index, _)| *index);
        for (index, images) in results {
            if images.len() < per_segment {
                info!("Segment {} has {}/{} images", index, images.len(), per_segment);
            }
            if let Some(item) = media.iter_mut().find(|m| m.segment.index == index) {
                item.images = images;
            }
        }
    }

    fn output_path(&self, query: &str, output: Option<&Path>) -> PathBuf {
        match output {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.output_dir.join(path),
            None => self.output_dir.join(format!("{}.mp4", slug(query))),
        }
    }
}

fn progress_bar(len: usize, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let template = format!("  {{spinner:.green}} {:<9} [{{bar:30.cyan/blue}}] {{pos}}/{{len}}", label);
    if let Ok(style) = ProgressStyle::default_bar().template(&template) {
        pb.set_style(style.progress_chars("█▓░"));
    }
    pb
}

/// Result of a pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    /// Rendered video.
    pub video_path: PathBuf,
    /// Saved script, when the script was generated in this run.
    pub script_path: Option<PathBuf>,
    /// Segments produced by the segmenter.
    pub segments: usize,
    /// Segments that made it into the video.
    pub narrated: usize,
    /// Images placed across all narrated segments.
    pub images: usize,
    /// Sum of segment durations.
    pub duration_seconds: f64,
}
