//! Generate command implementation.

use crate::cli::output::format_duration;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use std::path::PathBuf;

/// Command-line overrides for a single run.
#[derive(Debug, Default)]
pub struct GenerateOverrides {
    pub images_per_segment: Option<u8>,
    pub voice: Option<String>,
    pub style: Option<String>,
}

impl GenerateOverrides {
    fn apply(self, settings: &mut Settings) {
        if let Some(n) = self.images_per_segment {
            settings.visuals.images_per_segment = n as usize;
        }
        if let Some(voice) = self.voice {
            settings.narration.voice = voice;
        }
        if let Some(style) = self.style {
            settings.narration.style = style;
        }
    }
}

/// Run the generate command.
pub async fn run_generate(
    query: &str,
    images_per_segment: Option<u8>,
    voice: Option<String>,
    style: Option<String>,
    output: Option<PathBuf>,
    mut settings: Settings,
) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        Output::error("Query must not be empty");
        return Err(anyhow::anyhow!("empty query"));
    }

    GenerateOverrides { images_per_segment, voice, style }.apply(&mut settings);
    settings.validate()?;

    if let Err(e) = preflight::check(Operation::Generate, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'reelcast doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    Output::info(&format!("Generating video for: {}", query));
    Output::kv("Voice", &settings.narration.voice);
    Output::kv("Images per section", &settings.visuals.images_per_segment.to_string());

    let orchestrator = Orchestrator::new(settings)?;
    let result = match orchestrator.generate(query, output.as_deref()).await {
        Ok(result) => result,
        Err(e) => {
            Output::error(&format!("Generation failed: {}", e));
            return Err(e.into());
        }
    };

    println!();
    Output::success(&format!("Video ready: {}", result.video_path.display()));
    if let Some(script_path) = &result.script_path {
        Output::kv("Script", &script_path.display().to_string());
    }
    Output::kv("Sections", &format!("{}/{} narrated", result.narrated, result.segments));
    Output::kv("Images", &result.images.to_string());
    Output::kv("Length", &format_duration(result.duration_seconds));

    Ok(())
}
