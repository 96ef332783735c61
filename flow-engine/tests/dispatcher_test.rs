//! Integration tests for [`flow_engine::FlowDispatcher`].
//!
//! Covers the selection table end to end: which flows run, whether the resolver is called,
//! the resulting state and the messages delivered.

mod common;

use std::sync::Arc;

use common::*;
use dflow_core::{DflowError, ErrorKind, Intent, OutboundMessage};
use flow_engine::{FlowDispatcher, FlowKind, FlowOutcome, FlowSettings};
use serde_json::json;

fn dispatcher(
    platform: Arc<RecordingPlatform>,
    resolver: MockResolver,
    settings: Arc<FlowSettings>,
) -> FlowDispatcher {
    FlowDispatcher::new(platform, Arc::new(resolver), settings)
}

fn resolving_to(intent: Intent) -> MockResolver {
    let mut resolver = MockResolver::new();
    resolver
        .expect_identify()
        .times(1)
        .returning(move |_, _| Ok(intent.clone()));
    resolver
}

fn never_resolving() -> MockResolver {
    let mut resolver = MockResolver::new();
    resolver.expect_identify().never();
    resolver
}

fn switched_to_unrecognized(mut state: dflow_core::ConversationState) -> dflow_core::ConversationState {
    state.intent = Intent::unrecognized();
    state
}

fn completed(outcome: FlowOutcome) -> dflow_core::ConversationState {
    match outcome {
        FlowOutcome::Completed(state) => {
            assert_consistent(&state);
            state
        }
        other => panic!("expected Completed, got {:?}", other),
    }
}

/// **Test: No prior state, text resolves to book_flight without parameters.**
///
/// **Expected:** StartConversation runs; intent is book_flight, nothing confirmed, nothing
/// confirming; the completion message is replied.
#[tokio::test]
async fn start_conversation_without_parameters() {
    let platform = RecordingPlatform::new();
    let d = dispatcher(
        platform.clone(),
        resolving_to(Intent::new("book_flight")),
        settings(Vec::new()),
    );

    let result = d.dispatch(&text("U1", "book a flight"), None).await;

    assert_eq!(result.flows, vec![FlowKind::StartConversation]);
    let state = completed(result.outcome);
    assert_eq!(state.intent.action, "book_flight");
    assert!(state.confirmed.is_empty());
    assert!(state.confirming.is_none());
    assert_eq!(platform.sent().len(), 1);
    assert!(matches!(&platform.sent()[0], Sent::Reply(token, _) if token == "rt-book a flight"));
}

/// **Test: StartConversation merges resolver parameters and asks the first missing one.**
///
/// **Expected:** date is confirmed from the intent; seats becomes confirming and its question is sent.
#[tokio::test]
async fn start_conversation_asks_next_parameter() {
    let platform = RecordingPlatform::new();
    let intent = Intent::new("book_flight")
        .with_parameter("date", json!("today"))
        .with_parameter("seats", json!(""));
    let d = dispatcher(
        platform.clone(),
        resolving_to(intent),
        settings(vec![date_param(), seats_param()]),
    );

    let state = completed(d.dispatch(&text("U1", "fly today"), None).await.outcome);

    assert_eq!(state.confirmed.get("date"), Some(&json!("today")));
    assert_eq!(state.confirming.as_deref(), Some("seats"));
    assert!(state.to_confirm.contains_key("seats"));
    assert_eq!(platform.last_bodies(), vec!["How many seats?"]);
}

/// **Test: A parameter the skill cannot parse is skipped, not fatal.**
#[tokio::test]
async fn start_conversation_skips_unparsable_parameter() {
    let platform = RecordingPlatform::new();
    let intent = Intent::new("book_flight").with_parameter("date", json!("next year"));
    let d = dispatcher(
        platform.clone(),
        resolving_to(intent),
        settings(vec![date_param()]),
    );

    let state = completed(d.dispatch(&text("U1", "fly next year"), None).await.outcome);

    assert!(state.confirmed.is_empty());
    assert_eq!(state.confirming.as_deref(), Some("date"));
    assert_eq!(
        platform.sent()[0].messages(),
        &[OutboundMessage::QuickReply {
            text: "When do you want to fly?".into(),
            options: vec!["today".into(), "tomorrow".into()],
        }]
    );
}

/// **Test: No prior state and an unsupported event: dropped without resolving.**
#[tokio::test]
async fn unsupported_start_event_is_dropped() {
    let platform = RecordingPlatform::new();
    let d = dispatcher(platform.clone(), never_resolving(), settings(Vec::new()));

    let result = d.dispatch(&sticker("U1"), None).await;

    assert_eq!(result.outcome, FlowOutcome::Dropped);
    assert!(result.flows.is_empty());
    assert!(platform.sent().is_empty());
}

/// **Test: Confirming date, reply "tomorrow".**
///
/// **Expected:** Reply runs without a resolver call; date moves to confirmed, confirming empties,
/// the cycle completes.
#[tokio::test]
async fn reply_confirms_pending_parameter() {
    let platform = RecordingPlatform::new();
    let d = dispatcher(platform.clone(), never_resolving(), settings(vec![date_param()]));

    let prior = waiting_for("date", &["date"]);
    let result = d.dispatch(&text("U1", "tomorrow"), Some(prior)).await;

    assert_eq!(result.flows, vec![FlowKind::Reply]);
    let state = completed(result.outcome);
    assert!(state.confirming.is_none());
    assert_eq!(state.confirmed.get("date"), Some(&json!("tomorrow")));
    assert!(state.to_confirm.is_empty());
    assert_eq!(state.previous.confirmed, vec!["date"]);
    assert_eq!(platform.last_bodies(), vec!["Flight booked for tomorrow."]);
}

/// **Test: Postback answers a pending confirmation too.**
#[tokio::test]
async fn reply_accepts_postback() {
    let platform = RecordingPlatform::new();
    let d = dispatcher(
        platform.clone(),
        never_resolving(),
        settings(vec![date_param(), seats_param()]),
    );

    let prior = waiting_for("date", &["date", "seats"]);
    let event = dflow_core::Event::postback("U1", "today");
    let state = completed(d.dispatch(&event, Some(prior)).await.outcome);

    assert_eq!(state.confirmed.get("date"), Some(&json!("today")));
    assert_eq!(state.confirming.as_deref(), Some("seats"));
    // No reply token on this postback: pushed to the user.
    assert!(matches!(&platform.sent()[0], Sent::Push(user, _) if user == "U1"));
}

/// **Test: Unparsable reply without ask-retry re-asks the question only.**
#[tokio::test]
async fn reply_unparsable_reasks() {
    let platform = RecordingPlatform::new();
    let d = dispatcher(platform.clone(), never_resolving(), settings(vec![date_param()]));

    let prior = waiting_for("date", &["date"]);
    let state = completed(d.dispatch(&text("U1", "someday"), Some(prior.clone())).await.outcome);

    assert_eq!(state, prior);
    assert_eq!(platform.last_bodies(), vec!["When do you want to fly?"]);
}

/// **Test: Unparsable reply with ask-retry sends the retry prompt before the question.**
#[tokio::test]
async fn reply_unparsable_with_retry_prompt() {
    let platform = RecordingPlatform::new();
    let d = dispatcher(
        platform.clone(),
        never_resolving(),
        settings_with_retry(vec![date_param()]),
    );

    let prior = waiting_for("date", &["date"]);
    let state = completed(d.dispatch(&text("U1", "someday"), Some(prior)).await.outcome);

    assert_eq!(state.confirming.as_deref(), Some("date"));
    assert_eq!(
        platform.last_bodies(),
        vec![RETRY_PROMPT, "When do you want to fly?"]
    );
}

/// **Test: Unsupported event while confirming is dropped, twice, with no side effects.**
#[tokio::test]
async fn drop_while_confirming_is_idempotent() {
    let platform = RecordingPlatform::new();
    let d = dispatcher(platform.clone(), never_resolving(), settings(vec![date_param()]));
    let prior = waiting_for("date", &["date"]);

    for _ in 0..2 {
        let result = d.dispatch(&sticker("U1"), Some(prior.clone())).await;
        assert_eq!(result.outcome, FlowOutcome::Dropped);
    }
    assert!(platform.sent().is_empty());
}

/// **Test: Idle conversation, text resolves to another intent.**
///
/// **Expected:** ChangeIntent runs; the new intent replaces the old one, earlier confirmations
/// are kept, and the new skill's parameters are merged.
#[tokio::test]
async fn change_intent_replaces_intent_keeps_confirmed() {
    let platform = RecordingPlatform::new();
    let intent = Intent::new("book_hotel").with_parameter("nights", json!("2"));
    let d = dispatcher(platform.clone(), resolving_to(intent), settings(vec![date_param()]));

    let result = d
        .dispatch(&text("U1", "and a hotel for 2 nights"), Some(completed_booking()))
        .await;

    assert_eq!(result.flows, vec![FlowKind::ChangeIntent]);
    let state = completed(result.outcome);
    assert_eq!(state.intent.action, "book_hotel");
    assert_eq!(state.confirmed.get("date"), Some(&json!("tomorrow")));
    assert_eq!(state.confirmed.get("nights"), Some(&json!(2)));
    assert_eq!(platform.last_bodies(), vec!["Hotel booked for 2 night(s)."]);
}

/// **Test: Unrecognized text, no earlier completed cycle.**
///
/// **Expected:** NoWay runs; the fallback answer is sent; only the intent changes, to the
/// unrecognized one.
#[tokio::test]
async fn unrecognized_without_history_runs_no_way() {
    let platform = RecordingPlatform::new();
    let d = dispatcher(
        platform.clone(),
        resolving_to(Intent::unrecognized()),
        settings(vec![date_param()]),
    );
    let prior = dflow_core::ConversationState::new(Intent::new("book_flight"));

    let result = d.dispatch(&text("U1", "blah"), Some(prior.clone())).await;

    assert_eq!(result.flows, vec![FlowKind::NoWay]);
    assert_eq!(completed(result.outcome), switched_to_unrecognized(prior));
    assert_eq!(platform.last_bodies(), vec![FALLBACK_TEXT]);
}

/// **Test: Unrecognized text, date confirmed before, text fits no parameter.**
///
/// **Expected:** ChangeParameter runs first, signals no_fit, NoWay runs and is the final outcome.
#[tokio::test]
async fn change_parameter_no_fit_falls_back_to_no_way() {
    let platform = RecordingPlatform::new();
    let d = dispatcher(
        platform.clone(),
        resolving_to(Intent::unrecognized()),
        settings(vec![date_param()]),
    );
    let prior = completed_booking();

    let result = d.dispatch(&text("U1", "purple"), Some(prior.clone())).await;

    assert_eq!(result.flows, vec![FlowKind::ChangeParameter, FlowKind::NoWay]);
    let state = completed(result.outcome);
    assert_eq!(state, switched_to_unrecognized(prior));
    assert_eq!(state.confirmed.get("date"), Some(&json!("tomorrow")));
    assert_eq!(platform.sent().len(), 1);
    assert_eq!(platform.last_bodies(), vec![FALLBACK_TEXT]);
}

/// **Test: Unrecognized text that parses as a confirmed parameter changes it and re-completes.**
#[tokio::test]
async fn change_parameter_overwrites_value() {
    let platform = RecordingPlatform::new();
    let d = dispatcher(
        platform.clone(),
        resolving_to(Intent::unrecognized()),
        settings(vec![date_param()]),
    );

    let result = d.dispatch(&text("U1", "today"), Some(completed_booking())).await;

    assert_eq!(result.flows, vec![FlowKind::ChangeParameter]);
    let state = completed(result.outcome);
    assert_eq!(state.intent.action, "book_flight");
    assert_eq!(state.confirmed.get("date"), Some(&json!("today")));
    assert_eq!(platform.last_bodies(), vec!["Flight booked for today."]);
}

/// **Test: Unrecognized text while the current intent is itself unrecognized goes to NoWay.**
#[tokio::test]
async fn unrecognized_current_intent_runs_no_way() {
    let platform = RecordingPlatform::new();
    let d = dispatcher(
        platform.clone(),
        resolving_to(Intent::unrecognized()),
        settings(vec![date_param()]),
    );
    let mut prior = completed_booking();
    prior.intent = Intent::unrecognized();

    let result = d.dispatch(&text("U1", "today"), Some(prior)).await;
    assert_eq!(result.flows, vec![FlowKind::NoWay]);
}

/// **Test: Idle conversation, postback without text skips the resolver.**
///
/// **Expected:** ChangeParameter runs directly on the postback data.
#[tokio::test]
async fn postback_when_idle_skips_resolver() {
    let platform = RecordingPlatform::new();
    let d = dispatcher(platform.clone(), never_resolving(), settings(vec![date_param()]));

    let event = dflow_core::Event::postback("U1", "today");
    let result = d.dispatch(&event, Some(completed_booking())).await;

    assert_eq!(result.flows, vec![FlowKind::ChangeParameter]);
    assert_eq!(
        completed(result.outcome).confirmed.get("date"),
        Some(&json!("today"))
    );
}

/// **Test: Idle conversation without history, sticker: NoWay does not support it, dropped.**
#[tokio::test]
async fn sticker_when_idle_without_history_is_dropped() {
    let platform = RecordingPlatform::new();
    let d = dispatcher(platform.clone(), never_resolving(), settings(vec![date_param()]));
    let prior = dflow_core::ConversationState::new(Intent::new("book_flight"));

    let result = d.dispatch(&sticker("U1"), Some(prior)).await;

    assert_eq!(result.flows, vec![FlowKind::NoWay]);
    assert_eq!(result.outcome, FlowOutcome::Dropped);
    assert!(platform.sent().is_empty());
}

/// **Test: Resolver failure at any resolving branch fails the turn and sends nothing.**
#[tokio::test]
async fn resolver_failure_fails_turn() {
    for prior in [None, Some(completed_booking())] {
        let platform = RecordingPlatform::new();
        let mut resolver = MockResolver::new();
        resolver
            .expect_identify()
            .times(1)
            .returning(|_, _| Err(DflowError::Resolution("network unreachable".into())));
        let d = dispatcher(platform.clone(), resolver, settings(vec![date_param()]));

        let result = d.dispatch(&text("U1", "hello"), prior).await;

        assert_eq!(result.outcome, FlowOutcome::Failed(ErrorKind::Resolution));
        assert!(result.flows.is_empty());
        assert!(platform.sent().is_empty());
    }
}

/// **Test: Delivery failure in the finish step fails the turn.**
#[tokio::test]
async fn delivery_failure_fails_turn() {
    let platform = RecordingPlatform::failing();
    let d = dispatcher(
        platform.clone(),
        resolving_to(Intent::new("book_flight")),
        settings(vec![date_param()]),
    );

    let result = d.dispatch(&text("U1", "book a flight"), None).await;

    assert_eq!(result.flows, vec![FlowKind::StartConversation]);
    assert_eq!(result.outcome, FlowOutcome::Failed(ErrorKind::Delivery));
}

/// **Test: The resolver receives the user id as session id and the raw text.**
#[tokio::test]
async fn resolver_called_with_user_session() {
    let platform = RecordingPlatform::new();
    let mut resolver = MockResolver::new();
    resolver
        .expect_identify()
        .withf(|session_id, text| session_id == "U42" && text == "book a flight")
        .times(1)
        .returning(|_, _| Ok(Intent::new("book_flight")));
    let d = dispatcher(platform, resolver, settings(Vec::new()));

    let result = d.dispatch(&text("U42", "book a flight"), None).await;
    assert!(matches!(result.outcome, FlowOutcome::Completed(_)));
}

/// **Test: After NoWay the conversation is on the unrecognized intent, so the next unrecognized
/// utterance goes straight to NoWay even though parameters were confirmed before.**
#[tokio::test]
async fn no_way_twice_skips_change_parameter() {
    let platform = RecordingPlatform::new();
    let mut resolver = MockResolver::new();
    resolver
        .expect_identify()
        .times(2)
        .returning(|_, _| Ok(Intent::unrecognized()));
    let d = dispatcher(platform.clone(), resolver, settings(vec![date_param()]));

    let first = d.dispatch(&text("U1", "purple"), Some(completed_booking())).await;
    assert_eq!(first.flows, vec![FlowKind::ChangeParameter, FlowKind::NoWay]);

    let second = d.dispatch(&text("U1", "today"), Some(completed(first.outcome))).await;
    assert_eq!(second.flows, vec![FlowKind::NoWay]);
    assert_eq!(platform.sent().len(), 2);
}
