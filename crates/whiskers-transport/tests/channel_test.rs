use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use whiskers_core::envelope::Envelope;
use whiskers_core::error::TransportError;
use whiskers_test_support::{FailingBroker, SilentBroker, fixed_clock};
use whiskers_transport::{ChannelEvent, MemoryBroker, TransportChannel, TransportConfig};

fn channel_with(broker: Arc<dyn whiskers_transport::Broker>) -> TransportChannel {
    TransportChannel::new(TransportConfig::default(), broker, Arc::new(fixed_clock()))
}

fn subscribe_topic() -> String {
    TransportConfig::default().subscribe_topic
}

fn publish_topic() -> String {
    TransportConfig::default().publish_topic
}

#[tokio::test]
async fn test_publish_while_disconnected_queues_and_flushes_in_order() {
    // Arrange
    let broker = MemoryBroker::new();
    let mut channel = channel_with(Arc::new(broker.clone()));
    for n in 0..3 {
        channel
            .publish(Envelope::new("choice_made").with_field("seq", n))
            .await
            .unwrap();
    }
    assert_eq!(channel.queued(), 3);
    assert!(broker.published().is_empty());

    // Act
    channel.connect().await.unwrap();

    // Assert
    let sent = broker.published_json(&publish_topic());
    let order: Vec<i64> = sent.iter().map(|m| m["seq"].as_i64().unwrap()).collect();
    assert_eq!(order, vec![0, 1, 2]);
    assert_eq!(channel.queued(), 0);
}

#[tokio::test]
async fn test_queued_messages_go_out_before_new_traffic() {
    let broker = MemoryBroker::new();
    let mut channel = channel_with(Arc::new(broker.clone()));
    channel.publish(Envelope::new("app_ready")).await.unwrap();

    channel.connect().await.unwrap();
    channel.publish(Envelope::new("chapter_changed")).await.unwrap();

    let types: Vec<String> = broker
        .published_json(&publish_topic())
        .iter()
        .map(|m| m["type"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(types, vec!["app_ready", "chapter_changed"]);
}

#[tokio::test]
async fn test_publish_stamps_missing_timestamp() {
    let broker = MemoryBroker::new();
    let mut channel = channel_with(Arc::new(broker.clone()));
    channel.connect().await.unwrap();

    channel.publish(Envelope::new("app_paused")).await.unwrap();
    channel
        .publish(Envelope::new("app_resumed").with_timestamp("2026-01-01T00:00:00.000Z"))
        .await
        .unwrap();

    let sent = broker.published_json(&publish_topic());
    assert_eq!(sent[0]["timestamp"], json!("2026-01-15T10:00:00.000Z"));
    assert_eq!(sent[1]["timestamp"], json!("2026-01-01T00:00:00.000Z"));
}

#[tokio::test(start_paused = true)]
async fn test_connect_times_out_against_silent_broker() {
    // Arrange
    let mut channel = channel_with(Arc::new(SilentBroker));

    // Act
    let result = channel.connect().await;

    // Assert
    assert_eq!(
        result,
        Err(TransportError::ConnectionTimeout { timeout_ms: 15_000 })
    );
    assert!(!channel.is_connected());
}

#[tokio::test]
async fn test_refused_connection_reports_connection_error() {
    let mut channel = channel_with(Arc::new(FailingBroker));

    let result = channel.connect().await;

    assert!(matches!(result, Err(TransportError::Connection(_))));
}

#[tokio::test]
async fn test_reconnect_backoff_until_budget_is_spent() {
    // Arrange
    let mut channel = channel_with(Arc::new(FailingBroker));
    let expected = [
        1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000, 30000,
    ];

    // Act / Assert
    for delay_ms in expected {
        let delay = channel.schedule_reconnect().unwrap();
        assert_eq!(delay, Some(Duration::from_millis(delay_ms)));
        assert!(channel.reconnect().await.is_err());
    }
    assert_eq!(
        channel.schedule_reconnect(),
        Err(TransportError::MaxReconnect { attempts: 10 })
    );
    assert!(!channel.reconnect_pending());
}

#[tokio::test]
async fn test_only_one_reconnect_is_scheduled_at_a_time() {
    let mut channel = channel_with(Arc::new(FailingBroker));

    let first = channel.schedule_reconnect().unwrap();
    let second = channel.schedule_reconnect().unwrap();

    assert_eq!(first, Some(Duration::from_millis(1000)));
    assert_eq!(second, None);
}

#[tokio::test(start_paused = true)]
async fn test_next_event_fires_reconnect_after_delay() {
    let mut channel = channel_with(Arc::new(FailingBroker));
    channel.schedule_reconnect().unwrap();
    let started = tokio::time::Instant::now();

    let event = channel.next_event().await;

    assert_eq!(event, ChannelEvent::ReconnectDue);
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert!(!channel.reconnect_pending());
}

#[tokio::test]
async fn test_successful_reconnect_resets_attempts() {
    let broker = MemoryBroker::new();
    broker.set_online(false);
    let mut channel = channel_with(Arc::new(broker.clone()));
    channel.schedule_reconnect().unwrap();
    assert!(channel.reconnect().await.is_err());
    channel.schedule_reconnect().unwrap();
    broker.set_online(true);

    channel.reconnect().await.unwrap();

    let stats = channel.stats();
    assert!(stats.connected);
    assert_eq!(stats.reconnect_attempts, 0);
}

#[tokio::test]
async fn test_invalid_inbound_messages_are_dropped() {
    // Arrange
    let broker = MemoryBroker::new();
    let mut channel = channel_with(Arc::new(broker.clone()));
    channel.connect().await.unwrap();
    let topic = subscribe_topic();
    broker.inject(&topic, "not json");
    broker.inject_json(&topic, &json!({"type": "scroll_up"}));
    broker.inject_json(&topic, &json!({"type": 3, "timestamp": "t"}));
    broker.inject_json(&topic, &json!({"type": "scroll_down", "timestamp": "t"}));

    // Act
    let event = channel.next_event().await;

    // Assert
    match event {
        ChannelEvent::Message(envelope) => assert_eq!(envelope.message_type, "scroll_down"),
        other => panic!("expected Message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_lost_connection_switches_to_queueing() {
    let broker = MemoryBroker::new();
    let mut channel = channel_with(Arc::new(broker.clone()));
    channel.connect().await.unwrap();

    broker.drop_connections("broker restart");
    let event = channel.next_event().await;
    channel.publish(Envelope::new("app_paused")).await.unwrap();

    assert_eq!(event, ChannelEvent::ConnectionLost("broker restart".to_owned()));
    assert!(!channel.is_connected());
    assert_eq!(channel.queued(), 1);
}

#[tokio::test]
async fn test_connect_replaces_existing_session() {
    let broker = MemoryBroker::new();
    let mut channel = channel_with(Arc::new(broker.clone()));

    channel.connect().await.unwrap();
    channel.connect().await.unwrap();

    assert_eq!(broker.connection_count(), 2);
    assert_eq!(broker.open_sessions(), 1);
}

#[tokio::test]
async fn test_disconnect_cancels_pending_reconnect() {
    let broker = MemoryBroker::new();
    let mut channel = channel_with(Arc::new(broker.clone()));
    channel.connect().await.unwrap();
    channel.schedule_reconnect().unwrap();

    channel.disconnect().await;

    assert!(!channel.is_connected());
    assert!(!channel.reconnect_pending());
    assert_eq!(broker.open_sessions(), 0);
}

#[tokio::test]
async fn test_stats_report_client_id_and_url() {
    let channel = channel_with(Arc::new(MemoryBroker::new()));

    let stats = channel.stats();

    assert!(stats.client_id.starts_with("CatStory_Presenter_"));
    assert_eq!(stats.broker_url, "ws://broker.emqx.io:8083/mqtt");
    assert!(!stats.connected);
    assert_eq!(stats.queued_messages, 0);
}
