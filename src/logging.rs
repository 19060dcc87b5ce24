use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing::level_filters::LevelFilter;

use crate::config::LoggingConfig;

/// Routes `tracing` output to the configured log file.
///
/// The terminal belongs to the UI, so nothing is written to stdout or
/// stderr. Without a log file, events are dropped.
pub fn init(cfg: &LoggingConfig) -> Result<()> {
    let Some(path) = cfg.file.as_ref() else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("logging: create directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("logging: open {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_max_level(parse_level(&cfg.level))
        .try_init()
        .map_err(|err| anyhow!("logging: install subscriber: {err}"))
}

pub fn parse_level(raw: &str) -> LevelFilter {
    raw.trim().parse().unwrap_or(LevelFilter::INFO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("DEBUG"), LevelFilter::DEBUG);
        assert_eq!(parse_level(" warn "), LevelFilter::WARN);
        assert_eq!(parse_level("off"), LevelFilter::OFF);
    }

    #[test]
    fn unknown_levels_fall_back_to_info() {
        assert_eq!(parse_level("chatty"), LevelFilter::INFO);
    }

    #[test]
    fn disabled_file_is_a_no_op() {
        let cfg = LoggingConfig {
            file: None,
            level: "info".into(),
        };
        init(&cfg).unwrap();
    }
}
