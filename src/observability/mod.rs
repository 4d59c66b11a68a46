//! 可观测性：tracing 日志初始化
//!
//! 控制台（stderr，带颜色）始终开启；配置了 log.file 时另写一份无颜色的文件日志，
//! 按 log.rotation 切分，只保留最近 log.max_files 个文件。
//! 级别优先取 RUST_LOG，未设置时用配置里的 log.level。

use anyhow::Context;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogSection;

pub fn init(cfg: &LogSection) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = file_appender(cfg)?.map(|appender| {
        fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(appender)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;
    Ok(())
}

fn parse_rotation(s: &str) -> anyhow::Result<Rotation> {
    match s.trim().to_lowercase().as_str() {
        "minutely" => Ok(Rotation::MINUTELY),
        "hourly" => Ok(Rotation::HOURLY),
        "daily" => Ok(Rotation::DAILY),
        "never" => Ok(Rotation::NEVER),
        other => anyhow::bail!("unknown log rotation: {}", other),
    }
}

/// 由 log.file 拆出目录、前缀与后缀，例如 `logs/app.log` 切分后为 `logs/app.2024-05-01.log`
fn file_appender(cfg: &LogSection) -> anyhow::Result<Option<RollingFileAppender>> {
    let Some(path) = &cfg.file else {
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let prefix = path
        .file_stem()
        .and_then(|s| s.to_str())
        .context("log.file must name a file")?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let mut builder = RollingFileAppender::builder()
        .rotation(parse_rotation(&cfg.rotation)?)
        .filename_prefix(prefix)
        .max_log_files(cfg.max_files.max(1));
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        builder = builder.filename_suffix(ext);
    }

    let appender = builder
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
    Ok(Some(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_rotation() {
        assert!(parse_rotation("Daily").is_ok());
        assert!(parse_rotation("never").is_ok());
        assert!(parse_rotation("weekly").is_err());
    }

    #[test]
    fn test_no_file_configured() {
        assert!(file_appender(&LogSection::default()).unwrap().is_none());
    }

    #[test]
    fn test_rolling_file_is_created_in_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LogSection {
            file: Some(dir.path().join("logs").join("app.log")),
            ..LogSection::default()
        };

        let mut appender = file_appender(&cfg).unwrap().unwrap();
        appender.write_all(b"hello\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("logs"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("app."));
        assert!(names[0].ends_with(".log"));
    }
}
