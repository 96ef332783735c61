//! # dflow-server
//!
//! Webhook server for the conversation middleware: env configuration, component wiring,
//! the axum router and the runner that serves it with a session sweeper alongside.

pub mod cli;
pub mod components;
pub mod config;
pub mod runner;
pub mod webhook;

pub use cli::{load_config, load_skill_source, Cli, Commands};
pub use components::{build_components, build_components_with, load_skills, AppComponents};
pub use config::{AppConfig, SkillSource};
pub use runner::{run_server, serve};
pub use webhook::router;
