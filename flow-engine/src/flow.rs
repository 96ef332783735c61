//! Conversation flows.
//!
//! A [`Flow`] handles one turn: it checks the event is one its [`FlowKind`] supports, applies
//! the variant logic to the [`ConversationState`], then runs the shared finish step (ask the next
//! pending parameter, or complete the skill) and delivers the messages through the platform.

use crate::skill::{Skill, SkillRegistry};
use dflow_core::{
    ConversationState, DflowError, Event, Intent, MessagePlatform, OutboundMessage, Result,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Default text sent before re-asking a question whose answer could not be parsed.
pub const DEFAULT_RETRY_PROMPT: &str = "ごめんなさい、もうちょっと正確にお願いできますか？";

/// Static settings shared by every flow.
pub struct FlowSettings {
    pub skills: Arc<SkillRegistry>,
    /// Send [`retry_prompt`](Self::retry_prompt) before re-asking after an unparsable reply.
    pub enable_ask_retry: bool,
    pub retry_prompt: String,
}

impl FlowSettings {
    pub fn new(skills: Arc<SkillRegistry>) -> Self {
        Self {
            skills,
            enable_ask_retry: false,
            retry_prompt: DEFAULT_RETRY_PROMPT.to_string(),
        }
    }

    pub fn with_ask_retry(mut self, enabled: bool, prompt: impl Into<String>) -> Self {
        self.enable_ask_retry = enabled;
        self.retry_prompt = prompt.into();
        self
    }

    pub fn default_skill(&self) -> &str {
        self.skills.default_skill()
    }
}

/// The five flow variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    StartConversation,
    Reply,
    ChangeIntent,
    ChangeParameter,
    NoWay,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::StartConversation => "start_conversation",
            FlowKind::Reply => "reply",
            FlowKind::ChangeIntent => "change_intent",
            FlowKind::ChangeParameter => "change_parameter",
            FlowKind::NoWay => "no_way",
        }
    }

    /// Whether this variant handles events shaped like `event`.
    pub fn supports(&self, event: &Event) -> bool {
        match self {
            FlowKind::StartConversation | FlowKind::ChangeIntent | FlowKind::NoWay => {
                event.is_text_message()
            }
            FlowKind::Reply | FlowKind::ChangeParameter => {
                event.is_text_message() || event.is_postback()
            }
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a flow run ended. Every variant hands the state back.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowRun {
    /// Messages were delivered; the state is ready to be committed.
    Finished(ConversationState),
    /// The event shape is not supported; nothing was sent and the state is untouched.
    Dropped(ConversationState),
    /// ChangeParameter found no parameter the reply fits; the state is untouched.
    NoFit(ConversationState),
}

/// One flow variant bound to the turn it handles.
pub struct Flow {
    kind: FlowKind,
    platform: Arc<dyn MessagePlatform>,
    event: Event,
    state: ConversationState,
    settings: Arc<FlowSettings>,
}

impl Flow {
    pub fn new(
        kind: FlowKind,
        platform: Arc<dyn MessagePlatform>,
        event: Event,
        state: ConversationState,
        settings: Arc<FlowSettings>,
    ) -> Self {
        Self {
            kind,
            platform,
            event,
            state,
            settings,
        }
    }

    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    #[instrument(skip(self), fields(flow = %self.kind, event = %self.event.describe()))]
    pub async fn run(mut self) -> Result<FlowRun> {
        if !self.kind.supports(&self.event) {
            debug!("This is unsupported event type in this flow so skip processing");
            return Ok(FlowRun::Dropped(self.state));
        }
        info!(action = %self.state.intent.action, "Flow started");

        match self.kind {
            FlowKind::StartConversation | FlowKind::ChangeIntent => {
                let skill = self.settings.skills.resolve(&self.state.intent.action)?;
                self.state.reset_to_confirm(skill.parameter_order());
                self.merge_intent_parameters(skill.as_ref());
                self.finish(skill.as_ref(), Vec::new()).await
            }
            FlowKind::Reply => self.reply().await,
            FlowKind::ChangeParameter => self.change_parameter().await,
            FlowKind::NoWay => self.no_way().await,
        }
    }

    /// Parses the reply as the value of the parameter being confirmed.
    async fn reply(mut self) -> Result<FlowRun> {
        let skill = self.settings.skills.resolve(&self.state.intent.action)?;
        let (Some(key), Some(raw)) = (self.state.confirming.clone(), self.event.reply_value())
        else {
            return Ok(FlowRun::Dropped(self.state));
        };
        let mut preface = Vec::new();
        match skill.parse_parameter(&key, &Value::String(raw.to_string())) {
            Ok(value) => {
                debug!(parameter = %key, "Reply accepted");
                self.state.confirm(&key, value);
            }
            Err(e) => {
                info!(parameter = %key, error = %e, "Reply could not be parsed, asking again");
                if self.settings.enable_ask_retry {
                    preface.push(OutboundMessage::text(self.settings.retry_prompt.clone()));
                }
            }
        }
        self.finish(skill.as_ref(), preface).await
    }

    /// Overwrites the first previously confirmed parameter the reply parses as.
    async fn change_parameter(mut self) -> Result<FlowRun> {
        let skill = self.settings.skills.resolve(&self.state.intent.action)?;
        let Some(raw) = self.event.reply_value().map(str::to_string) else {
            return Ok(FlowRun::NoFit(self.state));
        };
        let candidates: Vec<String> = skill
            .parameter_order()
            .into_iter()
            .filter(|k| self.state.previous.confirmed.iter().any(|c| c == k))
            .map(str::to_string)
            .collect();

        for key in candidates {
            if let Ok(value) = skill.parse_parameter(&key, &Value::String(raw.clone())) {
                info!(parameter = %key, "Parameter changed");
                self.state.confirm(&key, value);
                return self.finish(skill.as_ref(), Vec::new()).await;
            }
        }
        debug!("Reply fits no confirmed parameter");
        Ok(FlowRun::NoFit(self.state))
    }

    /// Switches the conversation to the unrecognized intent and answers with the default skill.
    /// Confirmed, pending and previous-cycle parameters are left as they were.
    async fn no_way(mut self) -> Result<FlowRun> {
        self.state.intent = Intent::unrecognized();
        let skill = self.settings.skills.fallback()?;
        let messages = skill.finish(&self.state, &self.event).await?;
        self.deliver(&messages).await?;
        Ok(FlowRun::Finished(self.state))
    }

    /// Merges resolver-extracted parameters; a value the skill cannot parse is skipped.
    fn merge_intent_parameters(&mut self, skill: &dyn Skill) {
        let provided: Vec<(String, Value)> = self
            .state
            .intent
            .provided_parameters()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, raw) in provided {
            match skill.parse_parameter(&key, &raw) {
                Ok(value) => self.state.confirm(&key, value),
                Err(e) => debug!(parameter = %key, error = %e, "Parameter skipped"),
            }
        }
    }

    /// Asks the next pending parameter, or completes the skill when nothing is pending, then
    /// delivers `preface` followed by those messages.
    async fn finish(mut self, skill: &dyn Skill, mut messages: Vec<OutboundMessage>) -> Result<FlowRun> {
        let order = skill.parameter_order();
        let next = match &self.state.confirming {
            Some(key) if self.state.to_confirm.contains_key(key) => Some(key.clone()),
            _ => self.state.next_pending(&order).map(str::to_string),
        };

        match next {
            Some(key) => {
                let spec = skill.parameter(&key).ok_or_else(|| {
                    DflowError::FlowExecution(format!(
                        "skill '{}' has no parameter '{}'",
                        skill.name(),
                        key
                    ))
                })?;
                self.state.ask(&key);
                info!(parameter = %key, "Asking for parameter");
                messages.push(spec.question_message());
            }
            None => {
                messages.extend(skill.finish(&self.state, &self.event).await?);
                self.state.complete_cycle(&order);
                info!(
                    skill = %skill.name(),
                    confirmed = ?self.state.previous.confirmed,
                    "Skill completed"
                );
            }
        }

        self.deliver(&messages).await?;
        Ok(FlowRun::Finished(self.state))
    }

    /// Replies when the event carries a reply token, pushes to the user otherwise.
    async fn deliver(&self, messages: &[OutboundMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        if let Some(token) = &self.event.reply_token {
            self.platform.reply(token, messages).await
        } else if let Some(user_id) = &self.event.user_id {
            self.platform.send(user_id, messages).await
        } else {
            Err(DflowError::FlowExecution(
                "event has neither reply token nor user id".to_string(),
            ))
        }
    }
}
