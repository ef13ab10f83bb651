//! Segment command - preview how a script is split into narrated sections.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::script::extract_source_urls;
use crate::segmenter::Segmenter;
use anyhow::{Context, Result};
use std::path::Path;

/// Run the segment command.
pub fn run_segment(file: &Path, settings: &Settings) -> Result<()> {
    preflight::check(Operation::Segment, settings)?;
    let script = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let segments = Segmenter::from_settings(&settings.segmenter).segment(&script);
    let sources = extract_source_urls(&script);

    Output::header(&format!("{} section(s) in {}", segments.len(), file.display()));
    for segment in &segments {
        Output::segment(segment.index, segment.heading.as_deref(), &segment.content);
    }

    if segments.is_empty() {
        Output::warning("Nothing in this script would be narrated.");
    }

    if !sources.is_empty() {
        println!();
        Output::kv("Sources", &sources.len().to_string());
        for url in &sources {
            println!("    {}", url);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_segment_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.txt");
        std::fs::write(&path, "Intro.\n### Part\nBody.\n### Sources:\nhttps://a.com\n").unwrap();

        assert!(run_segment(&path, &Settings::default()).is_ok());
        assert!(run_segment(&dir.path().join("missing.txt"), &Settings::default()).is_err());
    }
}
