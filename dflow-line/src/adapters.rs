//! Adapters between LINE webhook/message JSON and dflow_core types.
//! Depends only on serde and dflow_core type definitions.

use chrono::{TimeZone, Utc};
use dflow_core::{Event, EventType, OutboundMessage};
use serde::{Deserialize, Serialize};

/// LINE caps quick reply buttons at 13 and their labels at 20 characters.
const MAX_QUICK_REPLY_ITEMS: usize = 13;
const MAX_LABEL_CHARS: usize = 20;

/// Webhook request body.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<LineEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<LineSource>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub message: Option<LineMessage>,
    #[serde(default)]
    pub postback: Option<LinePostback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSource {
    #[serde(rename = "type", default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LineMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LinePostback {
    pub data: String,
}

/// Wraps a LINE webhook event for conversion to core [`Event`].
pub struct LineEventWrapper<'a>(pub &'a LineEvent);

impl<'a> LineEventWrapper<'a> {
    pub fn to_core(&self) -> Event {
        let line = self.0;
        let mut event = Event::new(EventType::parse(&line.event_type));
        event.user_id = line.source.as_ref().and_then(|s| s.user_id.clone());
        event.reply_token = line.reply_token.clone();
        event.timestamp = line
            .timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        if let Some(message) = &line.message {
            event.subtype = Some(message.message_type.clone());
            event.text = message.text.clone();
        }
        if let Some(postback) = &line.postback {
            event.postback_data = Some(postback.data.clone());
        }
        event
    }
}

/// Message object of the push and reply APIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineOutbound {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quick_reply: Option<QuickReply>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickReply {
    pub items: Vec<QuickReplyItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickReplyItem {
    #[serde(rename = "type")]
    pub item_type: &'static str,
    pub action: MessageAction,
}

/// Tapping the button sends `text` back as a plain text message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageAction {
    #[serde(rename = "type")]
    pub action_type: &'static str,
    pub label: String,
    pub text: String,
}

impl From<&OutboundMessage> for LineOutbound {
    fn from(message: &OutboundMessage) -> Self {
        match message {
            OutboundMessage::Text { text } => LineOutbound {
                message_type: "text",
                text: text.clone(),
                quick_reply: None,
            },
            OutboundMessage::QuickReply { text, options } => LineOutbound {
                message_type: "text",
                text: text.clone(),
                quick_reply: Some(QuickReply {
                    items: options
                        .iter()
                        .take(MAX_QUICK_REPLY_ITEMS)
                        .map(|option| QuickReplyItem {
                            item_type: "action",
                            action: MessageAction {
                                action_type: "message",
                                label: option.chars().take(MAX_LABEL_CHARS).collect(),
                                text: option.clone(),
                            },
                        })
                        .collect(),
                }),
            },
        }
    }
}
