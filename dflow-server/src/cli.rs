//! CLI parser and config loading.

use crate::config::{AppConfig, SkillSource};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dflow")]
#[command(about = "Conversation middleware between LINE and an intent service", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the webhook server (config from env; flags override LISTEN_ADDR and SKILL_PATH).
    Run {
        #[arg(short, long)]
        listen: Option<SocketAddr>,
        #[arg(short, long)]
        skill_path: Option<PathBuf>,
    },
    /// Load the skills and list their actions and parameters.
    Skills {
        #[arg(short, long)]
        skill_path: Option<PathBuf>,
    },
}

/// Load AppConfig from environment, applying the `run` overrides.
pub fn load_config(listen: Option<SocketAddr>, skill_path: Option<PathBuf>) -> Result<AppConfig> {
    let mut config = AppConfig::load().context("Invalid configuration")?;
    if let Some(addr) = listen {
        config.listen_addr = addr;
    }
    if let Some(path) = skill_path {
        config.skills.path = path;
    }
    Ok(config)
}

/// Load SkillSource from environment, applying the `skills` override.
pub fn load_skill_source(skill_path: Option<PathBuf>) -> Result<SkillSource> {
    let mut source = SkillSource::load().context("Invalid configuration")?;
    if let Some(path) = skill_path {
        source.path = path;
    }
    Ok(source)
}
