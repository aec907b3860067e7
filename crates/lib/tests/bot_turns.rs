//! Integration tests for POST /api/messages: the full turn against a scripted agent,
//! with outbound activities captured by a recording connector.

mod common;

use axum::http::StatusCode;
use common::{
    invoke, message, post_activity, spawn_agent, spawn_bot, spawn_bot_with_telemetry,
    test_config, MockAgent, RecordingConnector,
};
use lib::bot::{EMPTY_REPLY, HISTORY_CLEARED, SSO_UNAVAILABLE, UNHANDLED_ERROR_PREFIX};
use lib::channels::ActivityType;
use lib::telemetry::{MemoryTelemetry, Record, TelemetryHandle};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn agent_array_reply_shows_last_assistant_message() {
    let agent = Arc::new(MockAgent::new(
        StatusCode::OK,
        json!([
            { "role": "user", "content": "who is on call?" },
            { "role": "tool", "content": "[]" },
            { "role": "assistant", "content": "Grace is on call this week." }
        ]),
    ));
    let agent_url = spawn_agent(agent.clone()).await;
    let connector = Arc::new(RecordingConnector::default());
    let (base, state) = spawn_bot(test_config(&agent_url), connector.clone()).await;

    let status = post_activity(&base, &message("<at>Relay</at> Who is on call?")).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    assert_eq!(connector.texts(), vec!["Grace is on call this week.".to_string()]);
    let sent = connector.sent();
    assert_eq!(sent[0].typ, ActivityType::Typing);
    let reply = sent.last().unwrap();
    assert_eq!(reply.conversation.as_ref().unwrap().id, "a:conv-1");
    assert_eq!(reply.recipient.as_ref().unwrap().id, "29:ada");
    assert_eq!(reply.reply_to_id.as_deref(), Some("act-1"));

    let request = agent.last_chat.lock().unwrap().clone().unwrap();
    assert_eq!(request["session_id"], "aad-ada");
    assert_eq!(request["message"], "Who is on call?");
    let traceparent = agent.last_traceparent.lock().unwrap().clone().unwrap();
    assert!(traceparent.starts_with("00-"), "{}", traceparent);

    assert!(state.references.get("29:ada").await.is_some());
    assert!(state.references.get("aad-ada").await.is_some());
}

#[tokio::test]
async fn agent_object_reply_uses_response_field() {
    let agent = Arc::new(MockAgent::new(
        StatusCode::OK,
        json!({ "response": "Done." }),
    ));
    let agent_url = spawn_agent(agent).await;
    let connector = Arc::new(RecordingConnector::default());
    let (base, _) = spawn_bot(test_config(&agent_url), connector.clone()).await;

    post_activity(&base, &message("close the ticket")).await;
    assert_eq!(connector.texts(), vec!["Done.".to_string()]);
}

#[tokio::test]
async fn agent_server_error_is_retried_then_apologized() {
    let agent = Arc::new(MockAgent::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "detail": "boom" }),
    ));
    let agent_url = spawn_agent(agent.clone()).await;
    let connector = Arc::new(RecordingConnector::default());
    let (base, _) = spawn_bot(test_config(&agent_url), connector.clone()).await;

    let status = post_activity(&base, &message("hello")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(agent.chat_calls(), 2);
    let texts = connector.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("Sorry"), "{}", texts[0]);
    assert!(texts[0].contains("500"), "{}", texts[0]);
}

#[tokio::test]
async fn clear_history_command_resets_agent_and_store() {
    let agent = Arc::new(MockAgent::new(StatusCode::OK, json!({ "response": "hi" })));
    let agent_url = spawn_agent(agent.clone()).await;
    let connector = Arc::new(RecordingConnector::default());
    let (base, state) = spawn_bot(test_config(&agent_url), connector.clone()).await;

    let mut other = message("hello");
    other["from"] = json!({ "id": "29:grace", "name": "Grace" });
    other["conversation"] = json!({ "id": "a:conv-2" });
    post_activity(&base, &other).await;
    assert!(state.references.get("29:grace").await.is_some());

    let status = post_activity(&base, &message("  /CLS \r\n")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(agent.clear_calls(), 1);
    assert_eq!(agent.chat_calls(), 1);
    assert_eq!(connector.texts().last().map(String::as_str), Some(HISTORY_CLEARED));

    assert!(state.references.get("29:grace").await.is_none());
    assert!(state.references.get("29:ada").await.is_some());
    assert_eq!(state.references.len().await, 1);
}

#[tokio::test]
async fn sso_command_without_connection_reports_unavailable() {
    let agent = Arc::new(MockAgent::new(StatusCode::OK, json!({ "response": "hi" })));
    let agent_url = spawn_agent(agent.clone()).await;
    let connector = Arc::new(RecordingConnector::default());
    let (base, _) = spawn_bot(test_config(&agent_url), connector.clone()).await;

    post_activity(&base, &message("login")).await;
    assert_eq!(connector.texts(), vec![SSO_UNAVAILABLE.to_string()]);
    assert_eq!(agent.chat_calls(), 0);
}

#[tokio::test]
async fn signin_invoke_without_sso_is_precondition_failed() {
    let connector = Arc::new(RecordingConnector::default());
    let (base, _) = spawn_bot(test_config("http://127.0.0.1:9"), connector.clone()).await;

    let status = post_activity(&base, &invoke("signin/tokenExchange")).await;
    assert_eq!(status, reqwest::StatusCode::PRECONDITION_FAILED);

    let status = post_activity(&base, &invoke("composeExtension/query")).await;
    assert_eq!(status, reqwest::StatusCode::NOT_IMPLEMENTED);
    assert!(connector.sent().is_empty());
}

#[tokio::test]
async fn unaddressable_or_invalid_activity_is_bad_request() {
    let connector = Arc::new(RecordingConnector::default());
    let (base, state) = spawn_bot(test_config("http://127.0.0.1:9"), connector.clone()).await;

    let mut no_service_url = message("hello");
    no_service_url.as_object_mut().unwrap().remove("serviceUrl");
    let status = post_activity(&base, &no_service_url).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

    let status = reqwest::Client::new()
        .post(format!("{}/api/messages", base))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert!(state.references.is_empty().await);
    assert!(connector.sent().is_empty());
}

#[tokio::test]
async fn welcome_message_on_member_added() {
    let connector = Arc::new(RecordingConnector::default());
    let mut config = test_config("http://127.0.0.1:9");
    config.bot.welcome_message = Some("Hi, I relay your questions to the assistant.".to_string());
    let (base, _) = spawn_bot(config, connector.clone()).await;

    let mut update = message("");
    update["type"] = json!("conversationUpdate");
    update["membersAdded"] = json!([{ "id": "28:relay-bot" }, { "id": "29:ada" }]);
    let status = post_activity(&base, &update).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(
        connector.texts(),
        vec!["Hi, I relay your questions to the assistant.".to_string()]
    );
}

#[tokio::test]
async fn blank_agent_answer_gets_fixed_notice() {
    let agent = Arc::new(MockAgent::new(StatusCode::OK, json!({ "response": "" })));
    let agent_url = spawn_agent(agent.clone()).await;
    let connector = Arc::new(RecordingConnector::default());
    let (base, _) = spawn_bot(test_config(&agent_url), connector.clone()).await;

    let status = post_activity(&base, &message("hello")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(agent.chat_calls(), 1);
    assert_eq!(connector.texts(), vec![EMPTY_REPLY.to_string()]);
}

#[tokio::test]
async fn failed_reply_is_reported_and_echoed() {
    let agent = Arc::new(MockAgent::new(StatusCode::OK, json!({ "response": "pong" })));
    let agent_url = spawn_agent(agent).await;
    let connector = Arc::new(RecordingConnector::failing_first_messages(1));
    let sink = Arc::new(MemoryTelemetry::default());
    let (base, _) = spawn_bot_with_telemetry(
        test_config(&agent_url),
        connector.clone(),
        TelemetryHandle::new(sink.clone()),
    )
    .await;

    let status = post_activity(&base, &message("ping")).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let texts = connector.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with(UNHANDLED_ERROR_PREFIX), "{}", texts[0]);
    assert!(texts[0].contains("400 bad request"), "{}", texts[0]);

    let records = sink.records();
    assert!(records
        .iter()
        .any(|r| matches!(r, Record::Exception { error } if error.contains("400 bad request"))));
    assert!(records.iter().any(|r| matches!(
        r,
        Record::Operation { name, success: false, .. } if name == "bot.turn"
    )));
    assert!(records.iter().any(|r| matches!(
        r,
        Record::Operation { name, success: true, .. } if name == "agent.chat"
    )));

    let events: Vec<(String, Vec<(String, String)>)> = records
        .into_iter()
        .filter_map(|r| match r {
            Record::Event { name, props } => Some((name, props)),
            _ => None,
        })
        .collect();
    assert_eq!(events[0].0, "message.received");
    assert_eq!(events[1].0, "message.branch");
    assert_eq!(events[1].1, vec![("branch".to_string(), "agent".to_string())]);
}
