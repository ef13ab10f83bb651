//! Reelcast - research a topic and turn it into a narrated video
//!
//! A CLI tool that chains a web-search language model, text-to-speech,
//! image search and ffmpeg into a single pipeline.
//!
//! # Overview
//!
//! For a query, Reelcast:
//! - Writes a sourced narration script with `###` section headings
//! - Splits the script into sections, dropping structural ones such as "Sources"
//! - Narrates every section into its own audio file
//! - Derives image search queries per section and fetches verified images
//! - Lays the images over the narration and renders one video
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration and prompt templates
//! - `script` - Script generation and persistence
//! - `segmenter` - Script segmentation
//! - `narration` - Text cleaning, chunking and speech synthesis
//! - `audio` - Audio probing and concatenation
//! - `visuals` - Query derivation, image search, verified downloads
//! - `timeline` - Sequencing of audio and images
//! - `render` - Video encoding
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use reelcast::config::Settings;
//! use reelcast::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let result = orchestrator.generate("History of the bicycle", None).await?;
//!     println!("Rendered {}", result.video_path.display());
//!
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod narration;
pub mod openai;
pub mod orchestrator;
pub mod render;
pub mod script;
pub mod segmenter;
pub mod timeline;
pub mod visuals;

pub use error::{ReelcastError, Result};
