//! Video rendering from a [`Timeline`].
//!
//! Each timeline entry is encoded to its own clip (images cross-faded over
//! the segment's narration), then the clips are joined with video and audio
//! cross-fades. The final file is written under a temporary name next to the
//! requested output and only renamed into place once ffmpeg succeeds.

use crate::config::RenderSettings;
use crate::error::{ReelcastError, Result};
use crate::timeline::{Timeline, TimelineEntry, Visual};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Encodes a timeline to a single video file.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `timeline` to `output` and return the written path.
    ///
    /// On failure nothing is left at `output`.
    async fn render(&self, timeline: &Timeline, output: &Path) -> Result<PathBuf>;
}

/// Renderer that drives the ffmpeg CLI.
pub struct FfmpegRenderer {
    settings: RenderSettings,
    work_dir: PathBuf,
    program: String,
}

impl FfmpegRenderer {
    pub fn new(settings: RenderSettings, work_dir: PathBuf) -> Self {
        Self { settings, work_dir, program: "ffmpeg".to_string() }
    }

    /// Use a different ffmpeg binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn run(&self, args: &[String]) -> Result<()> {
        debug!("{} {}", self.program, args.join(" "));

        let result = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        match result {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
                let tail: Vec<&str> = tail.into_iter().rev().collect();
                Err(ReelcastError::Render(format!("ffmpeg exited with {}: {}", out.status, tail.join(" | "))))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ReelcastError::ToolNotFound(self.program.clone()))
            }
            Err(e) => Err(ReelcastError::Render(format!("Failed to run ffmpeg: {}", e))),
        }
    }

    async fn encode(&self, timeline: &Timeline, partial: &Path) -> Result<()> {
        std::fs::create_dir_all(&self.work_dir)?;
        let clips_dir = tempfile::Builder::new().prefix("clips_").tempdir_in(&self.work_dir)?;

        let mut clips = Vec::with_capacity(timeline.entries.len());
        for (i, entry) in timeline.entries.iter().enumerate() {
            let clip = clips_dir.path().join(format!("clip_{:03}.mp4", i));
            info!("Encoding segment {} ({:.2}s, {} slices)", entry.segment_index, entry.duration, entry.slices.len());
            self.run(&segment_args(entry, &clip, &self.settings, timeline.crossfade)).await?;
            clips.push((clip, entry.duration));
        }

        info!("Joining {} clips", clips.len());
        self.run(&join_args(&clips, partial, &self.settings, timeline.crossfade)).await
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    #[instrument(skip(self, timeline), fields(segments = timeline.entries.len(), output = %output.display()))]
    async fn render(&self, timeline: &Timeline, output: &Path) -> Result<PathBuf> {
        if timeline.is_empty() {
            return Err(ReelcastError::Render("Timeline has no segments".to_string()));
        }

        let dir = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let extension = output.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
        let partial = dir.join(format!(".{}.partial.{}", uuid::Uuid::new_v4(), extension));

        match self.encode(timeline, &partial).await {
            Ok(()) => {
                std::fs::rename(&partial, output).inspect_err(|_| {
                    let _ = std::fs::remove_file(&partial);
                })?;
                info!("Rendered {:.1}s of video to {}", timeline.total_duration(), output.display());
                Ok(output.to_path_buf())
            }
            Err(e) => {
                if partial.exists() {
                    if let Err(rm) = std::fs::remove_file(&partial) {
                        warn!("Failed to remove partial render {}: {}", partial.display(), rm);
                    }
                }
                Err(e)
            }
        }
    }
}

fn secs(value: f64) -> String {
    format!("{:.3}", value.max(0.0))
}

/// Transition length that fits between the given durations.
fn fitted_fade(crossfade: f64, durations: impl Iterator<Item = f64>) -> f64 {
    durations.fold(crossfade.max(0.0), |fade, d| fade.min(d / 2.0))
}

/// ffmpeg arguments encoding one entry as a standalone clip.
fn segment_args(entry: &TimelineEntry, clip: &Path, settings: &RenderSettings, crossfade: f64) -> Vec<String> {
    let (w, h, fps) = (settings.width, settings.height, settings.fps);
    let count = entry.slices.len();
    let fade = if count > 1 {
        fitted_fade(crossfade, entry.slices.iter().map(|s| s.duration))
    } else {
        0.0
    };

    let mut args: Vec<String> = vec!["-y".into(), "-loglevel".into(), "error".into()];
    for (i, slice) in entry.slices.iter().enumerate() {
        // Every slice but the last runs into the next one's fade-in.
        let length = if i + 1 < count { slice.duration + fade } else { slice.duration };
        match &slice.visual {
            Visual::Image(path) => {
                args.extend(["-loop".into(), "1".into(), "-t".into(), secs(length), "-i".into()]);
                args.push(path.display().to_string());
            }
            Visual::Placeholder => {
                args.extend(["-f".into(), "lavfi".into(), "-t".into(), secs(length), "-i".into()]);
                args.push(format!("color=c={}:s={}x{}:r={}", settings.placeholder_color, w, h, fps));
            }
        }
    }
    args.extend(["-i".into(), entry.audio.display().to_string()]);

    let mut graph: Vec<String> = (0..count)
        .map(|i| {
            format!(
                "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
                 pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,fps={fps},format=yuv420p[v{i}]"
            )
        })
        .collect();

    let video_out = if count == 1 {
        "v0".to_string()
    } else if fade > 0.0 {
        let mut previous = "v0".to_string();
        for (i, slice) in entry.slices.iter().enumerate().skip(1) {
            let label = format!("x{}", i);
            graph.push(format!(
                "[{previous}][v{i}]xfade=transition=fade:duration={}:offset={}[{label}]",
                secs(fade),
                secs(slice.start)
            ));
            previous = label;
        }
        previous
    } else {
        let inputs: String = (0..count).map(|i| format!("[v{}]", i)).collect();
        graph.push(format!("{inputs}concat=n={count}:v=1:a=0[vcat]"));
        "vcat".to_string()
    };

    args.extend(["-filter_complex".into(), graph.join(";")]);
    args.extend(["-map".into(), format!("[{}]", video_out), "-map".into(), format!("{}:a", count)]);
    args.extend(encoder_args(settings));
    args.extend(["-t".into(), secs(entry.duration)]);
    args.push(clip.display().to_string());
    args
}

/// ffmpeg arguments joining clips into the final video.
fn join_args(clips: &[(PathBuf, f64)], output: &Path, settings: &RenderSettings, crossfade: f64) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-loglevel".into(), "error".into()];
    for (clip, _) in clips {
        args.extend(["-i".into(), clip.display().to_string()]);
    }

    if clips.len() == 1 {
        args.extend(["-map".into(), "0:v".into(), "-map".into(), "0:a".into(), "-c".into(), "copy".into()]);
        args.extend(["-movflags".into(), "+faststart".into()]);
        args.push(output.display().to_string());
        return args;
    }

    let fade = fitted_fade(crossfade, clips.iter().map(|(_, d)| *d));
    let mut graph = Vec::new();
    let (video_out, audio_out) = if fade > 0.0 {
        let mut video = "0:v".to_string();
        let mut audio = "0:a".to_string();
        let mut elapsed = clips[0].1;
        for (i, (_, duration)) in clips.iter().enumerate().skip(1) {
            let offset = elapsed - fade;
            graph.push(format!(
                "[{video}][{i}:v]xfade=transition=fade:duration={}:offset={}[jv{i}]",
                secs(fade),
                secs(offset)
            ));
            graph.push(format!("[{audio}][{i}:a]acrossfade=d={}[ja{i}]", secs(fade)));
            video = format!("jv{}", i);
            audio = format!("ja{}", i);
            elapsed = offset + duration;
        }
        (video, audio)
    } else {
        let inputs: String = (0..clips.len()).map(|i| format!("[{i}:v][{i}:a]")).collect();
        graph.push(format!("{inputs}concat=n={}:v=1:a=1[jv][ja]", clips.len()));
        ("jv".to_string(), "ja".to_string())
    };

    args.extend(["-filter_complex".into(), graph.join(";")]);
    args.extend(["-map".into(), format!("[{}]", video_out), "-map".into(), format!("[{}]", audio_out)]);
    args.extend(encoder_args(settings));
    args.extend(["-movflags".into(), "+faststart".into()]);
    args.push(output.display().to_string());
    args
}

fn encoder_args(settings: &RenderSettings) -> Vec<String> {
    vec![
        "-c:v".into(),
        settings.video_codec.clone(),
        "-preset".into(),
        settings.preset.clone(),
        "-b:v".into(),
        settings.bitrate.clone(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-r".into(),
        settings.fps.to_string(),
        "-c:a".into(),
        settings.audio_codec.clone(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::VisualSlice;

    fn entry(slices: Vec<(Visual, f64, f64)>, duration: f64) -> TimelineEntry {
        TimelineEntry {
            segment_index: 0,
            heading: None,
            audio: PathBuf::from("/tmp/scene_0.mp3"),
            duration,
            slices: slices
                .into_iter()
                .map(|(visual, start, duration)| VisualSlice { visual, start, duration })
                .collect(),
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let pos = args.iter().position(|a| a == flag).unwrap();
        &args[pos + 1]
    }

    #[test]
    fn test_segment_args_crossfade_chain() {
        let e = entry(
            vec![
                (Visual::Image("/a.jpg".into()), 0.0, 3.0),
                (Visual::Image("/b.jpg".into()), 3.0, 3.0),
                (Visual::Image("/c.jpg".into()), 6.0, 3.0),
            ],
            9.0,
        );
        let args = segment_args(&e, Path::new("/tmp/clip.mp4"), &RenderSettings::default(), 0.5);

        // Non-last inputs are extended by the fade.
        let lengths: Vec<&str> = args
            .windows(2)
            .filter(|w| w[0] == "-t")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(lengths, vec!["3.500", "3.500", "3.000", "9.000"]);

        let graph = value_after(&args, "-filter_complex");
        assert!(graph.contains("[v0][v1]xfade=transition=fade:duration=0.500:offset=3.000[x1]"));
        assert!(graph.contains("[x1][v2]xfade=transition=fade:duration=0.500:offset=6.000[x2]"));
        assert!(graph.contains("scale=1920:1080:force_original_aspect_ratio=decrease"));
        assert!(args.contains(&"[x2]".to_string()));
        assert!(args.contains(&"3:a".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/clip.mp4");
    }

    #[test]
    fn test_segment_args_placeholder() {
        let e = entry(vec![(Visual::Placeholder, 0.0, 4.0)], 4.0);
        let args = segment_args(&e, Path::new("/tmp/clip.mp4"), &RenderSettings::default(), 0.5);

        assert!(args.contains(&"lavfi".to_string()));
        assert!(args.contains(&"color=c=0x141414:s=1920x1080:r=30".to_string()));
        assert!(!value_after(&args, "-filter_complex").contains("xfade"));
        assert!(args.contains(&"[v0]".to_string()));
    }

    #[test]
    fn test_segment_args_without_fade_uses_concat() {
        let e = entry(
            vec![(Visual::Image("/a.jpg".into()), 0.0, 1.0), (Visual::Image("/b.jpg".into()), 1.0, 1.0)],
            2.0,
        );
        let args = segment_args(&e, Path::new("/tmp/clip.mp4"), &RenderSettings::default(), 0.0);
        assert!(value_after(&args, "-filter_complex").contains("[v0][v1]concat=n=2:v=1:a=0[vcat]"));
    }

    #[test]
    fn test_fade_shrinks_for_short_slices() {
        assert_eq!(fitted_fade(0.5, [4.0, 0.4, 2.0].into_iter()), 0.2);
        assert_eq!(fitted_fade(0.5, [4.0, 2.0].into_iter()), 0.5);
        assert_eq!(fitted_fade(-1.0, [4.0].into_iter()), 0.0);
    }

    #[test]
    fn test_join_args_offsets() {
        let clips = vec![
            (PathBuf::from("/c0.mp4"), 4.0),
            (PathBuf::from("/c1.mp4"), 3.0),
            (PathBuf::from("/c2.mp4"), 5.0),
        ];
        let args = join_args(&clips, Path::new("/out.mp4"), &RenderSettings::default(), 0.5);
        let graph = value_after(&args, "-filter_complex");

        assert!(graph.contains("[0:v][1:v]xfade=transition=fade:duration=0.500:offset=3.500[jv1]"));
        assert!(graph.contains("[jv1][2:v]xfade=transition=fade:duration=0.500:offset=6.000[jv2]"));
        assert!(graph.contains("[ja1][2:a]acrossfade=d=0.500[ja2]"));
        assert_eq!(args.last().unwrap(), "/out.mp4");
    }

    #[test]
    fn test_join_single_clip_copies() {
        let args = join_args(&[(PathBuf::from("/c0.mp4"), 4.0)], Path::new("/out.mp4"), &RenderSettings::default(), 0.5);
        assert!(!args.contains(&"-filter_complex".to_string()));
        assert_eq!(value_after(&args, "-c"), "copy");
    }

    #[tokio::test]
    async fn test_failed_render_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FfmpegRenderer::new(RenderSettings::default(), dir.path().join("work"))
            .with_program("reelcast-missing-ffmpeg");
        let timeline = Timeline {
            entries: vec![entry(vec![(Visual::Placeholder, 0.0, 1.0)], 1.0)],
            crossfade: 0.5,
        };
        let output = dir.path().join("out").join("video.mp4");

        let err = renderer.render(&timeline, &output).await.unwrap_err();
        assert!(matches!(err, ReelcastError::ToolNotFound(_)));
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(dir.path().join("out")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_timeline_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FfmpegRenderer::new(RenderSettings::default(), dir.path().to_path_buf());
        let timeline = Timeline { entries: Vec::new(), crossfade: 0.5 };

        let err = renderer.render(&timeline, &dir.path().join("v.mp4")).await.unwrap_err();
        assert!(matches!(err, ReelcastError::Render(_)));
    }
}
