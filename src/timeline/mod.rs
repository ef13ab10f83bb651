//! Sequencing of narrated segments into a render timeline.
//!
//! Each segment's audio duration is split evenly across its images, with the
//! last slice absorbing rounding so the slices always add up to the audio
//! duration exactly. Segments without audio are left out.

use crate::narration::AudioArtifact;
use crate::segmenter::Segment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// A segment with everything later stages attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentMedia {
    pub segment: Segment,
    pub audio: Option<AudioArtifact>,
    pub images: Vec<PathBuf>,
}

impl SegmentMedia {
    pub fn new(segment: Segment) -> Self {
        Self { segment, audio: None, images: Vec::new() }
    }
}

/// What is shown during a slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "path")]
pub enum Visual {
    Image(PathBuf),
    /// Solid background for segments that ended up without images.
    Placeholder,
}

/// A visual shown for part of a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualSlice {
    pub visual: Visual,
    /// Offset from the start of the segment, in seconds.
    pub start: f64,
    pub duration: f64,
}

/// One segment's audio and its visuals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub segment_index: usize,
    pub heading: Option<String>,
    pub audio: PathBuf,
    pub duration: f64,
    pub slices: Vec<VisualSlice>,
}

/// The ordered sequence handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub entries: Vec<TimelineEntry>,
    /// Cross-fade between consecutive slices and segments, in seconds.
    pub crossfade: f64,
}

impl Timeline {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all segment durations, ignoring transition overlap.
    pub fn total_duration(&self) -> f64 {
        self.entries.iter().map(|e| e.duration).sum()
    }
}

/// Split `duration` into `parts` equal shares; the last absorbs the remainder.
///
/// The shares, summed in order, equal `duration` exactly.
pub fn partition(duration: f64, parts: usize) -> Vec<f64> {
    if parts == 0 {
        return Vec::new();
    }
    let share = duration / parts as f64;
    let mut slices = vec![share; parts - 1];
    let used: f64 = slices.iter().sum();
    slices.push((duration - used).max(0.0));
    slices
}

/// Build the render timeline, preserving segment order.
pub fn build_timeline(media: &[SegmentMedia], crossfade: f64) -> Timeline {
    let mut entries = Vec::with_capacity(media.len());

    for item in media {
        let Some(audio) = &item.audio else {
            debug!("Segment {} has no audio, leaving it out", item.segment.index);
            continue;
        };
        if !(audio.duration_seconds > 0.0 && audio.duration_seconds.is_finite()) {
            warn!("Segment {} has unusable audio duration, leaving it out", item.segment.index);
            continue;
        }

        let duration = audio.duration_seconds;
        let visuals: Vec<Visual> = if item.images.is_empty() {
            vec![Visual::Placeholder]
        } else {
            item.images.iter().cloned().map(Visual::Image).collect()
        };

        let mut start = 0.0;
        let slices = visuals
            .into_iter()
            .zip(partition(duration, item.images.len().max(1)))
            .map(|(visual, length)| {
                let slice = VisualSlice { visual, start, duration: length };
                start += length;
                slice
            })
            .collect();

        entries.push(TimelineEntry {
            segment_index: item.segment.index,
            heading: item.segment.heading.clone(),
            audio: audio.path.clone(),
            duration,
            slices,
        });
    }

    Timeline { entries, crossfade: crossfade.max(0.0) }
}
