//! Component factory: builds the platform, resolver, skills, session store, dispatcher and event
//! processor from config. Isolates assembly logic from the runner.

use anyhow::{Context, Result};
use apiai_client::ApiAiClient;
use dflow_core::{IntentResolver, MessagePlatform, PlatformKind};
use dflow_line::LinePlatform;
use flow_engine::{
    EventProcessor, FlowDispatcher, FlowSettings, SkillRegistry, DEFAULT_RETRY_PROMPT,
};
use session_store::SessionStore;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::{AppConfig, SkillSource};

/// Long-lived pieces shared by the webhook handler and the sweeper.
#[derive(Clone)]
pub struct AppComponents {
    pub platform: Arc<dyn MessagePlatform>,
    pub skills: Arc<SkillRegistry>,
    pub store: Arc<SessionStore>,
    pub processor: Arc<EventProcessor>,
}

/// Builds the message platform selected by config. Called once at startup.
pub fn create_platform(config: &AppConfig) -> Result<Arc<dyn MessagePlatform>> {
    match config.platform {
        PlatformKind::Line => Ok(Arc::new(LinePlatform::new(config.line.clone())?)),
    }
}

pub fn create_resolver(config: &AppConfig) -> Result<Arc<dyn IntentResolver>> {
    let client = match &config.apiai_base_url {
        Some(url) => ApiAiClient::with_base_url(config.apiai_access_token.clone(), url.clone())?,
        None => ApiAiClient::new(config.apiai_access_token.clone())?,
    };
    Ok(match &config.apiai_lang {
        Some(lang) => Arc::new(client.with_lang(lang.clone())),
        None => Arc::new(client),
    })
}

/// Loads skills from the skill path; fails when the default skill is missing.
pub fn load_skills(source: &SkillSource) -> Result<SkillRegistry> {
    SkillRegistry::from_dir(&source.path, source.default_skill.clone())
        .with_context(|| format!("Failed to load skills from {}", source.path.display()))
}

#[instrument(skip(config), fields(platform = %config.platform.as_str()))]
pub fn build_components(config: &AppConfig) -> Result<AppComponents> {
    build_components_with(config, create_platform(config)?, create_resolver(config)?)
}

/// Builds components around a given platform and resolver.
pub fn build_components_with(
    config: &AppConfig,
    platform: Arc<dyn MessagePlatform>,
    resolver: Arc<dyn IntentResolver>,
) -> Result<AppComponents> {
    let skills = Arc::new(load_skills(&config.skills)?);
    info!(
        skills = skills.len(),
        default_skill = %skills.default_skill(),
        "Skills ready"
    );

    let prompt = config
        .retry_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_RETRY_PROMPT.to_string());
    let settings = FlowSettings::new(skills.clone()).with_ask_retry(config.enable_ask_retry, prompt);

    let store = Arc::new(SessionStore::new(config.retention));
    let dispatcher = Arc::new(FlowDispatcher::new(
        platform.clone(),
        resolver,
        Arc::new(settings),
    ));
    let processor = Arc::new(EventProcessor::new(
        platform.clone(),
        dispatcher,
        store.clone(),
    ));

    Ok(AppComponents {
        platform,
        skills,
        store,
        processor,
    })
}
