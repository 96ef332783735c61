//! Push and reply against a mock LINE API.

use dflow_core::{DflowError, MessagePlatform, OutboundMessage};
use dflow_line::{LineConfig, LinePlatform};
use mockito::Matcher;
use serde_json::json;

fn platform(server: &mockito::Server) -> LinePlatform {
    LinePlatform::new(LineConfig::new("1234", "secret", "access-token").with_api_base_url(server.url()))
        .unwrap()
}

/// **Test: reply posts the reply token and messages with bearer auth.**
#[tokio::test]
async fn reply_posts_to_reply_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v2/bot/message/reply")
        .match_header("authorization", "Bearer access-token")
        .match_body(Matcher::Json(json!({
            "replyToken": "r1",
            "messages": [
                {"type": "text", "text": "Sorry, once more please."},
                {"type": "text", "text": "When?", "quickReply": {"items": [
                    {"type": "action", "action": {"type": "message", "label": "today", "text": "today"}}
                ]}}
            ]
        })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    platform(&server)
        .reply(
            "r1",
            &[
                OutboundMessage::text("Sorry, once more please."),
                OutboundMessage::QuickReply {
                    text: "When?".into(),
                    options: vec!["today".into()],
                },
            ],
        )
        .await
        .unwrap();

    mock.assert_async().await;
}

/// **Test: send pushes to the user id.**
#[tokio::test]
async fn send_posts_to_push_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v2/bot/message/push")
        .match_body(Matcher::Json(json!({
            "to": "U1",
            "messages": [{"type": "text", "text": "Flight booked."}]
        })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    platform(&server)
        .send("U1", &[OutboundMessage::text("Flight booked.")])
        .await
        .unwrap();

    mock.assert_async().await;
}

/// **Test: a non-2xx answer is a delivery error.**
#[tokio::test]
async fn rejected_delivery_is_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v2/bot/message/reply")
        .with_status(400)
        .with_body(r#"{"message":"Invalid reply token"}"#)
        .create_async()
        .await;

    let err = platform(&server)
        .reply("expired", &[OutboundMessage::text("hi")])
        .await
        .unwrap_err();

    match err {
        DflowError::Delivery(msg) => assert!(msg.contains("Invalid reply token")),
        other => panic!("expected Delivery error, got {:?}", other),
    }
}

/// **Test: an unreachable API is a delivery error.**
#[tokio::test]
async fn transport_failure_is_error() {
    let platform = LinePlatform::new(
        LineConfig::new("1234", "secret", "access-token").with_api_base_url("http://127.0.0.1:1"),
    )
    .unwrap();

    let err = platform
        .send("U1", &[OutboundMessage::text("hi")])
        .await
        .unwrap_err();

    assert!(matches!(err, DflowError::Delivery(_)));
}

/// **Test: an API that accepts the connection but never answers times out as a delivery error.**
#[tokio::test]
async fn stalled_api_times_out() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let held = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        drop(socket);
    });

    let platform = LinePlatform::with_timeout(
        LineConfig::new("1234", "secret", "access-token")
            .with_api_base_url(format!("http://{}", addr)),
        std::time::Duration::from_millis(200),
    )
    .unwrap();

    let started = std::time::Instant::now();
    let err = platform
        .send("U1", &[OutboundMessage::text("hi")])
        .await
        .unwrap_err();

    assert!(matches!(err, DflowError::Delivery(_)));
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
    held.abort();
}
