//! Shared test doubles: a recording platform, a mockall resolver and skill fixtures.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dflow_core::{
    ConversationState, DflowError, Event, Intent, IntentResolver, MessagePlatform,
    OutboundMessage, Result,
};
use flow_engine::{
    DeclarativeSkill, FlowSettings, ParameterSpec, ParserKind, SkillRegistry,
};

pub const VALID_SIGNATURE: &str = "valid-signature";
pub const FALLBACK_TEXT: &str = "Sorry, I didn't get that.";
pub const RETRY_PROMPT: &str = "Could you say that more precisely?";

mockall::mock! {
    pub Resolver {}

    #[async_trait]
    impl IntentResolver for Resolver {
        async fn identify(&self, session_id: &str, text: &str) -> Result<Intent>;
    }
}

/// Where a batch of messages went.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Reply(String, Vec<OutboundMessage>),
    Push(String, Vec<OutboundMessage>),
}

impl Sent {
    pub fn messages(&self) -> &[OutboundMessage] {
        match self {
            Sent::Reply(_, m) | Sent::Push(_, m) => m,
        }
    }

    pub fn bodies(&self) -> Vec<String> {
        self.messages().iter().map(|m| m.body().to_string()).collect()
    }
}

/// Platform double: accepts [`VALID_SIGNATURE`], decodes a JSON array of core events and
/// records every outbound batch. Delivery can be switched to fail.
#[derive(Default)]
pub struct RecordingPlatform {
    sent: Mutex<Vec<Sent>>,
    fail_delivery: AtomicBool,
}

impl RecordingPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let platform = Self::default();
        platform.fail_delivery.store(true, Ordering::SeqCst);
        Arc::new(platform)
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_bodies(&self) -> Vec<String> {
        self.sent().last().map(Sent::bodies).unwrap_or_default()
    }

    fn record(&self, sent: Sent) -> Result<()> {
        if self.fail_delivery.load(Ordering::SeqCst) {
            return Err(DflowError::Delivery("connection reset".into()));
        }
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }
}

#[async_trait]
impl MessagePlatform for RecordingPlatform {
    fn name(&self) -> &str {
        "recording"
    }

    fn signature_header(&self) -> &str {
        "x-test-signature"
    }

    fn validate_signature(&self, signature: &str, _raw_body: &[u8]) -> bool {
        signature == VALID_SIGNATURE
    }

    fn extract_events(&self, raw_body: &[u8]) -> Result<Vec<Event>> {
        Ok(serde_json::from_slice(raw_body)?)
    }

    async fn send(&self, user_id: &str, messages: &[OutboundMessage]) -> Result<()> {
        self.record(Sent::Push(user_id.to_string(), messages.to_vec()))
    }

    async fn reply(&self, reply_token: &str, messages: &[OutboundMessage]) -> Result<()> {
        self.record(Sent::Reply(reply_token.to_string(), messages.to_vec()))
    }
}

pub fn date_param() -> ParameterSpec {
    ParameterSpec::new("date", "When do you want to fly?")
        .with_parser(ParserKind::OneOf(vec!["today".into(), "tomorrow".into()]))
        .with_options(vec!["today".into(), "tomorrow".into()])
}

pub fn seats_param() -> ParameterSpec {
    ParameterSpec::new("seats", "How many seats?").with_parser(ParserKind::Integer)
}

/// Registry with `book_flight` (given parameters), `book_hotel` (nights) and `fallback`.
pub fn registry(book_flight_params: Vec<ParameterSpec>) -> SkillRegistry {
    let mut registry = SkillRegistry::new("fallback");
    registry.register(
        "book_flight",
        Arc::new(DeclarativeSkill::new(
            "book_flight",
            book_flight_params,
            "Flight booked for {date}.",
        )),
    );
    registry.register(
        "book_hotel",
        Arc::new(DeclarativeSkill::new(
            "book_hotel",
            vec![ParameterSpec::new("nights", "How many nights?").with_parser(ParserKind::Integer)],
            "Hotel booked for {nights} night(s).",
        )),
    );
    registry.register(
        "fallback",
        Arc::new(DeclarativeSkill::new("fallback", Vec::new(), FALLBACK_TEXT)),
    );
    registry
}

pub fn settings(book_flight_params: Vec<ParameterSpec>) -> Arc<FlowSettings> {
    Arc::new(FlowSettings::new(Arc::new(registry(book_flight_params))))
}

pub fn settings_with_retry(book_flight_params: Vec<ParameterSpec>) -> Arc<FlowSettings> {
    Arc::new(
        FlowSettings::new(Arc::new(registry(book_flight_params))).with_ask_retry(true, RETRY_PROMPT),
    )
}

pub fn text(user: &str, body: &str) -> Event {
    Event::text_message(user, body).with_reply_token(format!("rt-{}", body))
}

/// A non-text message (sticker) from `user`.
pub fn sticker(user: &str) -> Event {
    let mut event = Event::new(dflow_core::EventType::Message);
    event.subtype = Some("sticker".into());
    event.user_id = Some(user.into());
    event.reply_token = Some("rt-sticker".into());
    event
}

/// Idle book_flight conversation with `date` confirmed in a completed cycle.
pub fn completed_booking() -> ConversationState {
    let mut state = ConversationState::new(Intent::new("book_flight"));
    state.confirm("date", serde_json::json!("tomorrow"));
    state.complete_cycle(&["date"]);
    state
}

/// book_flight conversation waiting for `key`.
pub fn waiting_for(key: &str, pending: &[&str]) -> ConversationState {
    let mut state = ConversationState::new(Intent::new("book_flight"));
    state.reset_to_confirm(pending.iter().copied());
    assert!(state.ask(key));
    state
}

pub fn assert_consistent(state: &ConversationState) {
    if let Some(violation) = state.invariant_violation() {
        panic!("state invariant broken: {}", violation);
    }
}
