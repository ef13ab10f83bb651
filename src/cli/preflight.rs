//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and configuration are available
//! before starting operations that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{ReelcastError, Result};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Video generation needs both API keys and ffmpeg.
    Generate,
    /// Segmentation preview is local only.
    Segment,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Generate => {
            check_env_key("OPENAI_API_KEY", "sk-...")?;
            check_env_key(&settings.visuals.api_key_env, "...")?;
            check_tool("ffmpeg")?;
            check_tool("ffprobe")?;
        }
        Operation::Segment => {}
    }
    Ok(())
}

/// Check that an API key variable is set and non-empty.
fn check_env_key(name: &str, example: &str) -> Result<()> {
    match std::env::var(name) {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(ReelcastError::Config(format!(
            "{} is empty. Set it with: export {}='{}'",
            name, name, example
        ))),
        Err(_) => Err(ReelcastError::Config(format!(
            "{} not set. Set it with: export {}='{}'",
            name, name, example
        ))),
    }
}

/// Check if an external tool is available.
fn check_tool(name: &str) -> Result<()> {
    match Command::new(name).arg("-version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(ReelcastError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ReelcastError::ToolNotFound(name.to_string())),
        Err(e) => Err(ReelcastError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
