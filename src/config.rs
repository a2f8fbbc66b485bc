//! Daemon configuration.
//!
//! Resolution order: command line, then `TIMETABLED_WORKSPACE`, then the TOML
//! file given with `--config`.

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Parser, Debug, Default)]
#[command(name = "timetabled")]
#[command(about = "Schedule and teacher-poll engine speaking line-delimited JSON on stdio")]
#[command(version)]
pub struct Args {
    /// Workspace directory to open at startup
    #[arg(short, long, env = "TIMETABLED_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub workspace: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parse config {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
}

impl Config {
    pub fn resolve(args: Args) -> anyhow::Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(args, file))
    }

    fn merge(args: Args, file: FileConfig) -> Self {
        Self {
            workspace: args.workspace.or(file.workspace),
            log_filter: file
                .log_filter
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }
}
