//! End-to-end tests for the Tufti chat front-end.
//!
//! These drive a session through the container with the offline chat client.

use std::path::PathBuf;

use tufti_chat::{
    ChatController, Container, ContainerConfig, MessageLog, Sender, TransformationIntent,
    UserProfile, APOLOGY_TEXT,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

async fn mock_container(history: Option<PathBuf>) -> Container {
    Container::new(ContainerConfig {
        mock_llm: true,
        history_file: history,
        ..ContainerConfig::default()
    })
    .await
    .expect("Failed to build container")
}

fn alice() -> UserProfile {
    UserProfile::new("Alice").with_transformation_intent(TransformationIntent::Awareness)
}

#[tokio::test]
async fn test_mock_conversation_round_trip() {
    let container = mock_container(None).await;
    let session = container.open_session(alice()).await;

    session.send_message("How do I wake up inside the dream?").await;
    session.send_message("And then?").await;

    let messages = session.messages().await;
    assert_eq!(messages.len(), 5);
    assert!(messages[0].text().contains("awareness"));
    for reply in [&messages[2], &messages[4]] {
        assert_eq!(reply.sender(), Sender::Assistant);
        assert_ne!(reply.text(), APOLOGY_TEXT);
        assert_eq!(reply.metadata().and_then(|m| m.cached), Some(false));
    }
}

#[tokio::test]
async fn test_history_fixture_is_preloaded_before_welcome() {
    let container = mock_container(Some(fixture("history.json"))).await;
    let log = container.message_log().expect("history log configured");
    assert_eq!(log.count().await.unwrap(), 4);

    let session = container.open_session(alice()).await;
    let messages = session.messages().await;

    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0].sender(), Sender::User);
    assert_eq!(messages[1].metadata().and_then(|m| m.relevance_score), Some(0.9));
    assert_eq!(messages[3].feedback().and_then(|f| f.liked), Some(true));
    assert!(messages[4].text().starts_with("Ah, welcome Alice"));
    assert!(!session.has_more().await, "a short first page exhausts the log");
}

#[tokio::test]
async fn test_missing_history_file_fails_loudly() {
    let result = Container::new(ContainerConfig {
        mock_llm: true,
        history_file: Some(fixture("does_not_exist.json")),
        ..ContainerConfig::default()
    })
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_ask_returns_reply_text() {
    let container = mock_container(None).await;
    let controller = ChatController::new(&container);

    let reply = controller
        .ask("Where is my attention?".to_string(), alice(), false)
        .await
        .expect("ask should succeed with the mock client");

    assert!(!reply.is_empty());
    assert_ne!(reply, APOLOGY_TEXT);
}

#[tokio::test]
async fn test_check_reports_settings() {
    let container = mock_container(Some(fixture("history.json"))).await;
    let report = ChatController::new(&container).check().await.unwrap();

    assert!(report.contains("mock-chat"));
    assert!(report.contains("40 messages"));
    assert!(report.contains("(4 messages)"));
}
