//! Doctor command - verify tools, API keys and directories before a run.

use crate::cli::Output;
use crate::config::Settings;
use console::style;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Level {
    Pass,
    Warn,
    Fail,
}

/// Outcome of one diagnostic.
#[derive(Debug)]
struct Finding {
    subject: String,
    level: Level,
    detail: String,
    fix: Option<String>,
}

impl Finding {
    fn pass(subject: &str, detail: impl Into<String>) -> Self {
        Self { subject: subject.to_string(), level: Level::Pass, detail: detail.into(), fix: None }
    }

    fn warn(subject: &str, detail: impl Into<String>, fix: impl Into<String>) -> Self {
        Self { subject: subject.to_string(), level: Level::Warn, detail: detail.into(), fix: Some(fix.into()) }
    }

    fn fail(subject: &str, detail: impl Into<String>, fix: impl Into<String>) -> Self {
        Self { subject: subject.to_string(), level: Level::Fail, detail: detail.into(), fix: Some(fix.into()) }
    }

    fn print(&self) {
        let mark = match self.level {
            Level::Pass => style("✓").green(),
            Level::Warn => style("!").yellow(),
            Level::Fail => style("✗").red(),
        };
        println!("  {} {} - {}", mark, style(&self.subject).bold(), self.detail);
        if let Some(fix) = &self.fix {
            println!("    {} {}", style("→").dim(), style(fix).dim());
        }
    }
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Reelcast Doctor");
    println!();

    let sections: Vec<(&str, Vec<Finding>)> = vec![
        ("Media tools", vec![probe_tool("ffmpeg"), probe_tool("ffprobe")]),
        (
            "API keys",
            vec![
                api_key_finding("OPENAI_API_KEY", std::env::var("OPENAI_API_KEY").ok(), Some("sk-")),
                api_key_finding(
                    &settings.visuals.api_key_env,
                    std::env::var(&settings.visuals.api_key_env).ok(),
                    None,
                ),
            ],
        ),
        (
            "Directories",
            vec![
                directory_finding("Output", &settings.output_dir()),
                directory_finding("Temp", &settings.temp_dir()),
                image_cache_finding(&settings.assets_dir()),
            ],
        ),
        ("Configuration", vec![config_finding(&Settings::default_config_path())]),
    ];

    for (title, findings) in &sections {
        println!("{}", style(title).bold());
        for finding in findings {
            finding.print();
        }
        println!();
    }

    let all = sections.iter().flat_map(|(_, f)| f);
    let (failures, warnings) = all.fold((0, 0), |(f, w), finding| match finding.level {
        Level::Fail => (f + 1, w),
        Level::Warn => (f, w + 1),
        Level::Pass => (f, w),
    });

    if failures > 0 {
        Output::error(&format!("{} problem(s) must be fixed before generating videos.", failures));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("Ready, with {} warning(s).", warnings));
    } else {
        Output::success("Everything looks good. Reelcast is ready.");
    }

    Ok(())
}

fn probe_tool(name: &str) -> Finding {
    let hint = if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install ffmpeg (or your package manager)"
    } else {
        "Install from: https://ffmpeg.org/download.html"
    };

    match Command::new(name).arg("-version").output() {
        Ok(output) if output.status.success() => {
            let banner = String::from_utf8_lossy(&output.stdout);
            let first = banner.lines().next().unwrap_or("installed").trim();
            Finding::pass(name, truncate(first, 50))
        }
        Ok(_) => Finding::fail(name, "installed but not working", hint),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Finding::fail(name, "not found", hint),
        Err(e) => Finding::fail(name, format!("error: {}", e), hint),
    }
}

fn api_key_finding(var: &str, value: Option<String>, prefix: Option<&str>) -> Finding {
    let set_hint = format!("Set with: export {}='{}...'", var, prefix.unwrap_or(""));
    match value {
        None => Finding::fail(var, "not set", set_hint),
        Some(key) if key.trim().is_empty() => Finding::fail(var, "empty", set_hint),
        Some(key) if !key.is_ascii() || key.len() < 12 => {
            Finding::warn(var, "set but looks too short", "Check that the whole key was copied")
        }
        Some(key) if prefix.is_some_and(|p| !key.starts_with(p)) => {
            Finding::warn(var, "set but format looks unusual", format!("Expected a key starting with {}", prefix.unwrap_or("")))
        }
        Some(key) => Finding::pass(var, format!("configured ({})", mask(&key))),
    }
}

fn directory_finding(label: &str, dir: &Path) -> Finding {
    let subject = format!("{} directory", label);
    if dir.exists() {
        Finding::pass(&subject, format!("{} ({})", dir.display(), format_size(dir_size(dir))))
    } else {
        Finding::warn(&subject, format!("{} (will be created)", dir.display()), "Created on first run")
    }
}

fn image_cache_finding(assets: &Path) -> Finding {
    let images = std::fs::read_dir(assets)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext != "json"))
                .count()
        })
        .unwrap_or(0);
    Finding::pass("Image cache", format!("{} ({} images)", assets.display(), images))
}

fn config_finding(path: &Path) -> Finding {
    if path.exists() {
        Finding::pass("Config file", path.display().to_string())
    } else {
        Finding::warn("Config file", "using defaults", "Create with: reelcast config edit")
    }
}

/// Keep the first seven and last four characters of a key.
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 11 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Total size of the files directly inside `dir`.
fn dir_size(dir: &Path) -> u64 {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.metadata().ok())
                .filter(|m| m.is_file())
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0)
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_levels() {
        assert_eq!(api_key_finding("K", None, None).level, Level::Fail);
        assert_eq!(api_key_finding("K", Some("  ".into()), None).level, Level::Fail);
        assert_eq!(api_key_finding("K", Some("short".into()), None).level, Level::Warn);
        assert_eq!(api_key_finding("K", Some("pk-0123456789abcdef".into()), Some("sk-")).level, Level::Warn);
        assert_eq!(api_key_finding("K", Some("sk-0123456789abcdef".into()), Some("sk-")).level, Level::Pass);
    }

    #[test]
    fn test_mask_keeps_ends() {
        assert_eq!(mask("sk-abcdefghijklmnopqrstuvwxyz"), "sk-abcd...wxyz");
        assert_eq!(mask("tiny"), "****");
    }

    #[test]
    fn test_missing_directory_warns() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(directory_finding("Output", dir.path()).level, Level::Pass);
        assert_eq!(directory_finding("Output", &dir.path().join("nope")).level, Level::Warn);
    }

    #[test]
    fn test_dir_size_counts_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), [0u8; 10]).unwrap();
        std::fs::write(dir.path().join("b"), [0u8; 5]).unwrap();
        assert_eq!(dir_size(dir.path()), 15);
        assert_eq!(dir_size(&dir.path().join("missing")), 0);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }
}
