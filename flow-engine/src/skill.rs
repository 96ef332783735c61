//! Skills: the per-intent logic flows consult.
//!
//! A [`Skill`] declares the parameters it needs (in the order they are asked), parses raw values
//! into parameter values and produces the completion messages once everything is confirmed.
//! [`SkillRegistry`] maps intent actions to skills and falls back to the default skill for
//! unknown actions. Declarative skills are loaded from `<skill_path>/<action>.toml`:
//!
//! ```toml
//! [[parameters]]
//! name = "destination"
//! question = "Where would you like to fly?"
//!
//! [[parameters]]
//! name = "seat"
//! question = "Window or aisle?"
//! parser = { one_of = ["window", "aisle"] }
//! options = ["window", "aisle"]
//!
//! [finish]
//! message = "Booked a {seat} seat to {destination}."
//! ```

use async_trait::async_trait;
use dflow_core::{
    is_blank, ConversationState, DflowError, Event, OutboundMessage, ParameterError, Result,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a raw value is turned into a parameter value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    /// Any non-blank text, trimmed.
    #[default]
    Text,
    Integer,
    Number,
    /// yes/no style answer, parsed to a boolean.
    YesNo,
    /// One of a fixed list, matched case-insensitively; yields the listed spelling.
    OneOf(Vec<String>),
}

const YES_WORDS: &[&str] = &["yes", "y", "ok", "sure", "true", "はい", "うん", "お願いします"];
const NO_WORDS: &[&str] = &["no", "n", "nope", "false", "いいえ", "いや", "やめる"];

impl ParserKind {
    pub fn parse(&self, key: &str, value: &Value) -> std::result::Result<Value, ParameterError> {
        if is_blank(value) {
            return Err(ParameterError::Empty(key.to_string()));
        }
        let invalid = |reason: String| ParameterError::Invalid {
            key: key.to_string(),
            reason,
        };
        match self {
            ParserKind::Text => Ok(match value {
                Value::String(s) => Value::String(s.trim().to_string()),
                other => other.clone(),
            }),
            ParserKind::Integer => match value {
                Value::Number(n) if n.is_i64() => Ok(value.clone()),
                _ => scalar_text(value)
                    .and_then(|s| s.parse::<i64>().ok())
                    .map(Value::from)
                    .ok_or_else(|| invalid(format!("not an integer: {}", value))),
            },
            ParserKind::Number => match value {
                Value::Number(_) => Ok(value.clone()),
                _ => scalar_text(value)
                    .and_then(|s| s.parse::<f64>().ok())
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| invalid(format!("not a number: {}", value))),
            },
            ParserKind::YesNo => {
                if let Value::Bool(_) = value {
                    return Ok(value.clone());
                }
                let text = scalar_text(value).unwrap_or_default().to_lowercase();
                if YES_WORDS.contains(&text.as_str()) {
                    Ok(Value::Bool(true))
                } else if NO_WORDS.contains(&text.as_str()) {
                    Ok(Value::Bool(false))
                } else {
                    Err(invalid(format!("not a yes/no answer: {}", text)))
                }
            }
            ParserKind::OneOf(choices) => {
                let text = scalar_text(value).unwrap_or_default();
                choices
                    .iter()
                    .find(|c| c.to_lowercase() == text.to_lowercase())
                    .map(|c| Value::String(c.clone()))
                    .ok_or_else(|| invalid(format!("expected one of {:?}", choices)))
            }
        }
    }
}

/// Trimmed text of a scalar value; `None` for arrays and objects.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A parameter a skill needs before it can complete.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    /// Question sent while this parameter is being confirmed.
    pub question: String,
    #[serde(default)]
    pub parser: ParserKind,
    /// Suggested answers offered as quick replies.
    #[serde(default)]
    pub options: Vec<String>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            question: question.into(),
            parser: ParserKind::Text,
            options: Vec::new(),
        }
    }

    pub fn with_parser(mut self, parser: ParserKind) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn question_message(&self) -> OutboundMessage {
        if self.options.is_empty() {
            OutboundMessage::text(self.question.clone())
        } else {
            OutboundMessage::QuickReply {
                text: self.question.clone(),
                options: self.options.clone(),
            }
        }
    }
}

/// Per-intent business logic.
#[async_trait]
pub trait Skill: Send + Sync {
    fn name(&self) -> &str;
    /// Parameters to confirm, in asking order.
    fn required_parameters(&self) -> &[ParameterSpec];
    /// Parses a raw value for `key`. Fails for keys the skill does not declare.
    fn parse_parameter(&self, key: &str, value: &Value) -> std::result::Result<Value, ParameterError> {
        self.required_parameters()
            .iter()
            .find(|p| p.name == key)
            .ok_or_else(|| ParameterError::Unknown(key.to_string()))?
            .parser
            .parse(key, value)
    }
    /// Messages sent when every required parameter is confirmed.
    async fn finish(&self, state: &ConversationState, event: &Event) -> Result<Vec<OutboundMessage>>;

    fn parameter(&self, key: &str) -> Option<&ParameterSpec> {
        self.required_parameters().iter().find(|p| p.name == key)
    }

    fn parameter_order(&self) -> Vec<&str> {
        self.required_parameters()
            .iter()
            .map(|p| p.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct FinishSpec {
    message: String,
    #[serde(default)]
    options: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SkillFile {
    #[serde(default)]
    parameters: Vec<ParameterSpec>,
    finish: FinishSpec,
}

/// Skill defined by a TOML file: parameters plus a completion message template.
///
/// `{name}` placeholders in the template are replaced by confirmed values.
#[derive(Debug, Clone)]
pub struct DeclarativeSkill {
    name: String,
    parameters: Vec<ParameterSpec>,
    finish: FinishSpec,
}

impl DeclarativeSkill {
    pub fn new(name: impl Into<String>, parameters: Vec<ParameterSpec>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters,
            finish: FinishSpec {
                message: message.into(),
                options: Vec::new(),
            },
        }
    }

    pub fn from_toml(name: &str, source: &str) -> Result<Self> {
        let file: SkillFile = toml::from_str(source).map_err(|e| {
            DflowError::Configuration(format!("invalid skill definition '{}': {}", name, e))
        })?;
        Ok(Self {
            name: name.to_string(),
            parameters: file.parameters,
            finish: file.finish,
        })
    }

    /// Substitutes `{key}` placeholders with confirmed values.
    pub fn render(&self, state: &ConversationState) -> String {
        let mut text = self.finish.message.clone();
        for (key, value) in &state.confirmed {
            let shown = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            text = text.replace(&format!("{{{}}}", key), &shown);
        }
        text
    }
}

#[async_trait]
impl Skill for DeclarativeSkill {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    async fn finish(&self, state: &ConversationState, _event: &Event) -> Result<Vec<OutboundMessage>> {
        let text = self.render(state);
        let message = if self.finish.options.is_empty() {
            OutboundMessage::text(text)
        } else {
            OutboundMessage::QuickReply {
                text,
                options: self.finish.options.clone(),
            }
        };
        Ok(vec![message])
    }
}

/// Action name → skill, with a default skill for everything else.
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
    default_skill: String,
}

impl SkillRegistry {
    /// Creates an empty registry. The default skill must be registered before use.
    pub fn new(default_skill: impl Into<String>) -> Self {
        Self {
            skills: HashMap::new(),
            default_skill: default_skill.into(),
        }
    }

    /// Loads every `*.toml` skill in `dir` and checks the default skill is present.
    pub fn from_dir(dir: impl AsRef<Path>, default_skill: impl Into<String>) -> Result<Self> {
        let mut registry = Self::new(default_skill);
        registry.load_dir(dir)?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn register(&mut self, action: impl Into<String>, skill: Arc<dyn Skill>) {
        let action = action.into();
        if self.skills.insert(action.clone(), skill).is_some() {
            warn!(action = %action, "Skill replaced");
        }
    }

    /// Loads `<action>.toml` files from `dir`. Returns the number of skills loaded.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            DflowError::Configuration(format!("cannot read skill path {}: {}", dir.display(), e))
        })?;
        let mut loaded = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let Some(action) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let source = std::fs::read_to_string(&path)?;
            let skill = DeclarativeSkill::from_toml(action, &source)?;
            debug!(
                action = %action,
                parameters = skill.parameters.len(),
                "Skill loaded"
            );
            self.register(action.to_string(), Arc::new(skill));
            loaded += 1;
        }
        info!(path = %dir.display(), loaded, "Skills loaded");
        Ok(loaded)
    }

    /// Fails unless the default skill is registered.
    pub fn validate(&self) -> Result<()> {
        if self.skills.contains_key(&self.default_skill) {
            Ok(())
        } else {
            Err(DflowError::Configuration(format!(
                "default skill '{}' not found",
                self.default_skill
            )))
        }
    }

    pub fn default_skill(&self) -> &str {
        &self.default_skill
    }

    /// Skill for `action`, or the default skill when none is registered for it.
    pub fn resolve(&self, action: &str) -> Result<Arc<dyn Skill>> {
        self.skills
            .get(action)
            .or_else(|| self.skills.get(&self.default_skill))
            .cloned()
            .ok_or_else(|| {
                DflowError::Configuration(format!(
                    "no skill for '{}' and default skill '{}' missing",
                    action, self.default_skill
                ))
            })
    }

    /// The default skill.
    pub fn fallback(&self) -> Result<Arc<dyn Skill>> {
        self.resolve(&self.default_skill)
    }

    /// Registered action names, sorted.
    pub fn actions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.skills.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}
