use crate::supervisor::ShutdownPolicy;
use anyhow::{anyhow, Result};
use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "live_pager")]
#[command(version)]
#[command(about = "Page through files and live command output in split panes")]
pub struct Cli {
    /// Files to page, one pane each
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Run COMMAND through the shell and page its stdout and stderr (repeatable)
    #[arg(short, long = "spawn", value_name = "COMMAND")]
    pub spawn: Vec<String>,

    /// Shell used for --spawn
    #[arg(long, default_value = "/bin/sh")]
    pub shell: PathBuf,

    /// Delay between main loop iterations, in milliseconds
    #[arg(long, default_value_t = 16)]
    pub frame_ms: u64,

    /// Polls after SIGTERM before spawned commands are killed
    #[arg(long, default_value_t = 10)]
    pub shutdown_retries: u32,

    /// Delay between those polls, in milliseconds
    #[arg(long, default_value_t = 50)]
    pub shutdown_interval_ms: u64,

    /// Where to write the log
    #[arg(long, env = "LIVE_PAGER_LOG")]
    pub log_file: Option<PathBuf>,

    /// off, error, warn, info, debug or trace
    #[arg(long, env = "LIVE_PAGER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// An input the pager should open, in pane order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    File(PathBuf),
    Command(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub file: PathBuf,
    pub level: LevelFilter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub sources: Vec<SourceSpec>,
    pub shell: PathBuf,
    pub frame_interval: Duration,
    pub shutdown: ShutdownPolicy,
    pub log: LogConfig,
}

impl TryFrom<Cli> for Config {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self> {
        let level = LevelFilter::from_str(&cli.log_level)
            .map_err(|_| anyhow!("invalid log level `{}`", cli.log_level))?;
        let sources = cli
            .files
            .into_iter()
            .map(SourceSpec::File)
            .chain(cli.spawn.into_iter().map(SourceSpec::Command))
            .collect();
        Ok(Self {
            sources,
            shell: cli.shell,
            frame_interval: Duration::from_millis(cli.frame_ms),
            shutdown: ShutdownPolicy {
                retries: cli.shutdown_retries,
                interval: Duration::from_millis(cli.shutdown_interval_ms),
            },
            log: LogConfig {
                file: cli
                    .log_file
                    .unwrap_or_else(|| std::env::temp_dir().join("live_pager.log")),
                level,
            },
        })
    }
}
