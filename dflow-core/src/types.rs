//! Core types: intent, conversation state, inbound event and outbound message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Action reported by the resolver when no intent matched the utterance.
pub const UNRECOGNIZED_ACTION: &str = "input.unknown";

/// Recognized user goal plus the parameters the resolver extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub action: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl Intent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// The sentinel intent for utterances nothing matched.
    pub fn unrecognized() -> Self {
        Self::new(UNRECOGNIZED_ACTION)
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn is_unrecognized(&self) -> bool {
        self.action == UNRECOGNIZED_ACTION
    }

    /// Parameters that actually carry a value. The resolver reports slots it could not fill as
    /// empty strings or empty arrays; those are skipped.
    pub fn provided_parameters(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.parameters.iter().filter(|(_, v)| !is_blank(v))
    }
}

/// Whether a parameter value is effectively absent.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// State of the previously completed flow cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviousCycle {
    /// Parameter names confirmed when the last cycle completed, in skill order.
    pub confirmed: Vec<String>,
}

/// Per-user conversation record kept between turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub intent: Intent,
    pub confirmed: BTreeMap<String, Value>,
    pub to_confirm: BTreeMap<String, Value>,
    pub confirming: Option<String>,
    pub previous: PreviousCycle,
}

impl ConversationState {
    /// Fresh state for a conversation that starts with `intent`.
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            confirmed: BTreeMap::new(),
            to_confirm: BTreeMap::new(),
            confirming: None,
            previous: PreviousCycle::default(),
        }
    }

    pub fn is_confirming(&self) -> bool {
        self.confirming.is_some()
    }

    /// Replaces the pending set with `required` minus what is already confirmed.
    /// Values already pending for a key that is still required are kept.
    pub fn reset_to_confirm<'a>(&mut self, required: impl IntoIterator<Item = &'a str>) {
        let mut pending = BTreeMap::new();
        for key in required {
            if self.confirmed.contains_key(key) {
                continue;
            }
            let value = self.to_confirm.remove(key).unwrap_or(Value::Null);
            pending.insert(key.to_string(), value);
        }
        self.to_confirm = pending;
        if let Some(key) = &self.confirming {
            if !self.to_confirm.contains_key(key) {
                self.confirming = None;
            }
        }
    }

    /// Records `value` as confirmed for `key`, removing it from the pending set.
    pub fn confirm(&mut self, key: &str, value: Value) {
        self.to_confirm.remove(key);
        if self.confirming.as_deref() == Some(key) {
            self.confirming = None;
        }
        self.confirmed.insert(key.to_string(), value);
    }

    /// Marks `key` as the parameter awaiting confirmation. Returns false (and changes nothing)
    /// when the key is not pending.
    pub fn ask(&mut self, key: &str) -> bool {
        if !self.to_confirm.contains_key(key) {
            return false;
        }
        self.confirming = Some(key.to_string());
        true
    }

    /// First pending key following `order`; keys pending but absent from `order` come last.
    pub fn next_pending<'a>(&'a self, order: &[&'a str]) -> Option<&'a str> {
        order
            .iter()
            .copied()
            .find(|k| self.to_confirm.contains_key(*k))
            .or_else(|| self.to_confirm.keys().next().map(String::as_str))
    }

    /// Marks the current cycle as complete: the confirmed keys become `previous.confirmed`.
    pub fn complete_cycle(&mut self, order: &[&str]) {
        let mut keys: Vec<String> = order
            .iter()
            .filter(|k| self.confirmed.contains_key(**k))
            .map(|k| k.to_string())
            .collect();
        for key in self.confirmed.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        self.previous.confirmed = keys;
    }

    /// Describes the first broken state invariant, if any.
    pub fn invariant_violation(&self) -> Option<String> {
        if let Some(key) = &self.confirming {
            if !self.to_confirm.contains_key(key) {
                return Some(format!("confirming '{}' is not pending", key));
            }
        }
        self.confirmed
            .keys()
            .find(|k| self.to_confirm.contains_key(*k))
            .map(|k| format!("'{}' is both confirmed and pending", k))
    }
}

/// Kind of an inbound platform event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Message,
    Postback,
    Follow,
    Unfollow,
    Join,
    Leave,
    Other(String),
}

impl EventType {
    pub fn parse(s: &str) -> Self {
        match s {
            "message" => EventType::Message,
            "postback" => EventType::Postback,
            "follow" => EventType::Follow,
            "unfollow" => EventType::Unfollow,
            "join" => EventType::Join,
            "leave" => EventType::Leave,
            other => EventType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventType::Message => "message",
            EventType::Postback => "postback",
            EventType::Follow => "follow",
            EventType::Unfollow => "unfollow",
            EventType::Join => "join",
            EventType::Leave => "leave",
            EventType::Other(s) => s,
        }
    }
}

/// Message subtype carried by plain text messages.
pub const TEXT_SUBTYPE: &str = "text";

/// Platform-neutral inbound event. Adapters fill in what their platform provides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    /// Message subtype (`text`, `image`, `sticker`, ...). Only set for message events.
    pub subtype: Option<String>,
    pub user_id: Option<String>,
    pub reply_token: Option<String>,
    pub text: Option<String>,
    pub postback_data: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            subtype: None,
            user_id: None,
            reply_token: None,
            text: None,
            postback_data: None,
            timestamp: None,
        }
    }

    /// A text message from `user_id`.
    pub fn text_message(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            subtype: Some(TEXT_SUBTYPE.to_string()),
            user_id: Some(user_id.into()),
            text: Some(text.into()),
            ..Self::new(EventType::Message)
        }
    }

    /// A postback (button action reply) from `user_id`.
    pub fn postback(user_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            postback_data: Some(data.into()),
            ..Self::new(EventType::Postback)
        }
    }

    pub fn with_reply_token(mut self, token: impl Into<String>) -> Self {
        self.reply_token = Some(token.into());
        self
    }

    pub fn is_text_message(&self) -> bool {
        self.event_type == EventType::Message && self.subtype.as_deref() == Some(TEXT_SUBTYPE)
    }

    pub fn is_postback(&self) -> bool {
        self.event_type == EventType::Postback
    }

    /// Free text typed by the user; only text messages carry it.
    pub fn user_text(&self) -> Option<&str> {
        if self.is_text_message() {
            self.text.as_deref()
        } else {
            None
        }
    }

    /// Value a reply-type event answers with: message text or postback data.
    pub fn reply_value(&self) -> Option<&str> {
        if self.is_text_message() {
            self.text.as_deref()
        } else if self.is_postback() {
            self.postback_data.as_deref()
        } else {
            None
        }
    }

    /// `type/subtype` label for logs.
    pub fn describe(&self) -> String {
        match &self.subtype {
            Some(sub) => format!("{}/{}", self.event_type.as_str(), sub),
            None => self.event_type.as_str().to_string(),
        }
    }
}

/// Message sent back to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text { text: String },
    /// Text with suggested answers the user can tap.
    QuickReply { text: String, options: Vec<String> },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundMessage::Text { text: text.into() }
    }

    pub fn body(&self) -> &str {
        match self {
            OutboundMessage::Text { text } | OutboundMessage::QuickReply { text, .. } => text,
        }
    }
}
