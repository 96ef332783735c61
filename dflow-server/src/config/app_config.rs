//! Application config: platform credentials, intent resolver, skills, sessions, HTTP listener
//! and logging. Loaded from env.

use dflow_core::{DflowError, PlatformKind, Result};
use dflow_line::LineConfig;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RETENTION_MS: u64 = 60_000;
pub const DEFAULT_SKILL_PATH: &str = "skill/";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_WEBHOOK_PATH: &str = "/webhook";
pub const DEFAULT_LOG_FILE: &str = "logs/dflow.log";

/// Where skills come from. Enough to list them without any credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillSource {
    /// SKILL_PATH
    pub path: PathBuf,
    /// DEFAULT_SKILL
    pub default_skill: String,
}

impl SkillSource {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            path: PathBuf::from(optional(&lookup, "SKILL_PATH").unwrap_or_else(|| DEFAULT_SKILL_PATH.into())),
            default_skill: required(&lookup, "DEFAULT_SKILL")?,
        })
    }
}

/// Everything `dflow run` needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// MESSAGE_PLATFORM_TYPE
    pub platform: PlatformKind,
    /// LINE_CHANNEL_ID, LINE_CHANNEL_SECRET, LINE_CHANNEL_ACCESS_TOKEN, LINE_API_BASE_URL
    pub line: LineConfig,
    /// APIAI_CLIENT_ACCESS_TOKEN
    pub apiai_access_token: String,
    /// APIAI_BASE_URL
    pub apiai_base_url: Option<String>,
    /// APIAI_LANG
    pub apiai_lang: Option<String>,
    pub skills: SkillSource,
    /// MEMORY_RETENTION_MS
    pub retention: Duration,
    /// ENABLE_ASK_RETRY
    pub enable_ask_retry: bool,
    /// MESSAGE_TO_ASK_RETRY
    pub retry_prompt: Option<String>,
    /// LISTEN_ADDR
    pub listen_addr: SocketAddr,
    /// WEBHOOK_PATH
    pub webhook_path: String,
    /// LOG_FILE
    pub log_file: String,
}

impl AppConfig {
    /// Loads from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads from any key lookup. A missing required option is a configuration error naming it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let platform = match optional(&lookup, "MESSAGE_PLATFORM_TYPE") {
            Some(value) => PlatformKind::parse(&value)?,
            None => PlatformKind::DEFAULT,
        };

        let line = match platform {
            PlatformKind::Line => {
                let config = LineConfig::new(
                    required(&lookup, "LINE_CHANNEL_ID")?,
                    required(&lookup, "LINE_CHANNEL_SECRET")?,
                    required(&lookup, "LINE_CHANNEL_ACCESS_TOKEN")?,
                );
                match optional(&lookup, "LINE_API_BASE_URL") {
                    Some(url) => config.with_api_base_url(url),
                    None => config,
                }
            }
        };

        let retention_ms = match optional(&lookup, "MEMORY_RETENTION_MS") {
            Some(value) => value.parse::<u64>().map_err(|_| {
                DflowError::Configuration(format!(
                    "MEMORY_RETENTION_MS must be milliseconds, got '{}'",
                    value
                ))
            })?,
            None => DEFAULT_RETENTION_MS,
        };
        // Zero would expire every session on commit; treat it as unset.
        let retention_ms = if retention_ms == 0 {
            DEFAULT_RETENTION_MS
        } else {
            retention_ms
        };

        let listen = optional(&lookup, "LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.into());
        let listen_addr = listen.parse::<SocketAddr>().map_err(|_| {
            DflowError::Configuration(format!("LISTEN_ADDR is not a socket address: '{}'", listen))
        })?;

        let webhook_path =
            optional(&lookup, "WEBHOOK_PATH").unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.into());
        if !webhook_path.starts_with('/') {
            return Err(DflowError::Configuration(format!(
                "WEBHOOK_PATH must start with '/': '{}'",
                webhook_path
            )));
        }

        Ok(Self {
            platform,
            line,
            apiai_access_token: required(&lookup, "APIAI_CLIENT_ACCESS_TOKEN")?,
            apiai_base_url: optional(&lookup, "APIAI_BASE_URL"),
            apiai_lang: optional(&lookup, "APIAI_LANG"),
            skills: SkillSource::from_lookup(&lookup)?,
            retention: Duration::from_millis(retention_ms),
            enable_ask_retry: optional(&lookup, "ENABLE_ASK_RETRY")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            retry_prompt: optional(&lookup, "MESSAGE_TO_ASK_RETRY"),
            listen_addr,
            webhook_path,
            log_file: optional(&lookup, "LOG_FILE").unwrap_or_else(|| DEFAULT_LOG_FILE.into()),
        })
    }
}

/// Set and non-blank value of `key`.
fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key)
        .ok_or_else(|| DflowError::Configuration(format!("Required option {} is not set", key)))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
