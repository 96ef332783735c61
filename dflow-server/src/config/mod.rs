//! Server configuration: [`AppConfig`] for `dflow run`, [`SkillSource`] for `dflow skills`.

mod app_config;


pub use app_config::{
    AppConfig, SkillSource, DEFAULT_LISTEN_ADDR, DEFAULT_LOG_FILE, DEFAULT_RETENTION_MS,
    DEFAULT_SKILL_PATH, DEFAULT_WEBHOOK_PATH,
};
