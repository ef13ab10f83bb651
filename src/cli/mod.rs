//! CLI module for Reelcast.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Reelcast - research a topic and turn it into a narrated slideshow video
///
/// Writes a sourced script with a web-search model, narrates it section by
/// section, illustrates each section with verified images and renders the result.
#[derive(Parser, Debug)]
#[command(name = "reelcast")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a narrated video for a query
    Generate {
        /// Topic or question to research
        query: String,

        /// Images shown per section (1-5)
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=5))]
        images_per_segment: Option<u8>,

        /// Narration voice (nova, ash, alloy, fable, ...)
        #[arg(long)]
        voice: Option<String>,

        /// Delivery directive for the narrator
        #[arg(long)]
        style: Option<String>,

        /// Output video file name (relative names go to the output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Preview how a script file is split into narrated sections
    Segment {
        /// Script text file
        file: PathBuf,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
