use crate::config::LogConfig;
use anyhow::{Context, Result};
use log::LevelFilter;
use simplelog::{ConfigBuilder, WriteLogger};
use std::fs::File;

/// Sends `log` output to a file. The terminal belongs to the pager while it runs, so
/// nothing is logged to stdout or stderr.
pub fn init(config: &LogConfig) -> Result<()> {
    if config.level == LevelFilter::Off {
        return Ok(());
    }
    let path = &config.file;
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    let log_config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Debug)
        .set_target_level(LevelFilter::Error)
        .build();
    WriteLogger::init(config.level, log_config, file).context("Failed to install logger")
}
