//! Reelcast CLI entry point.

use anyhow::Result;
use clap::Parser;
use reelcast::cli::{commands, Cli, Commands};
use reelcast::config::Settings;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.as_ref().map(PathBuf::from);
    let settings = Settings::load_from(config_path.as_ref())?;

    // Initialize logging
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("reelcast={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    // Execute command
    match &cli.command {
        Commands::Generate { query, images_per_segment, voice, style, output } => {
            std::fs::create_dir_all(settings.data_dir())?;
            std::fs::create_dir_all(settings.temp_dir())?;
            commands::run_generate(query, *images_per_segment, voice.clone(), style.clone(), output.clone(), settings)
                .await?;
        }

        Commands::Segment { file } => {
            commands::run_segment(file, &settings)?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings)?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings, config_path.as_deref())?;
        }
    }

    Ok(())
}
