//! Audio file utilities.

mod ffmpeg;

pub use ffmpeg::FfmpegAudio;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Local audio operations needed by narration and rendering.
#[async_trait]
pub trait AudioTools: Send + Sync {
    /// Duration of an audio file in seconds.
    async fn duration(&self, path: &Path) -> Result<f64>;

    /// Join `parts` in order into `dest`.
    async fn concat(&self, parts: &[PathBuf], dest: &Path) -> Result<()>;
}
