//! Shared test helpers for presenter integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;
use whiskers_core::clock::Clock;
use whiskers_core::features::FeatureToggles;
use whiskers_core::rng::DeterministicRng;
use whiskers_core::signal::SideChannelSignal;
use whiskers_sidechannel::{AudioConfig, MinigameConfig, SideChannels};
use whiskers_story::domain::chapter::StoryBook;
use whiskers_test_support::{MockRng, SAMPLE_STORY_JSON, fixed_clock};
use whiskers_transport::{MemoryBroker, TransportChannel, TransportConfig};

use whiskers_presenter::app::PresenterApp;

/// Topic the presenter listens on.
pub const SUBSCRIBE_TOPIC: &str = "catstory/orchestrator/to/presenter";

/// Topic the presenter publishes on.
pub const PUBLISH_TOPIC: &str = "catstory/presenter/to/orchestrator";

/// A presenter wired to an in-memory broker, the sample story and a fixed
/// clock.
pub struct Harness {
    pub app: PresenterApp,
    pub signals: UnboundedReceiver<SideChannelSignal>,
    pub broker: MemoryBroker,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_minigame_rng(Box::new(MockRng))
    }

    /// Uses `rng` for placeholder minigame duration, score and outcome.
    pub fn with_minigame_rng(rng: Box<dyn DeterministicRng>) -> Self {
        let broker = MemoryBroker::new();
        let (app, signals) = build_app(&broker, FeatureToggles::default(), rng);
        Self {
            app,
            signals,
            broker,
        }
    }

    /// Runs the startup sequence and forgets everything it published.
    pub async fn started() -> Self {
        let mut harness = Self::new();
        harness.app.start().await;
        harness.broker.clear_published();
        harness
    }

    /// Sends an orchestrator message and handles the resulting transport event.
    pub async fn deliver(&mut self, mut message: Value) {
        message["timestamp"] = json!("2026-01-15T10:00:00.000Z");
        let recipients = self.broker.inject_json(SUBSCRIBE_TOPIC, &message);
        assert_eq!(recipients, 1, "presenter is not subscribed");
        let event = self.app.next_transport_event().await;
        self.app.handle_transport_event(event).await;
    }

    /// Waits for the next side-channel signal and lets the presenter handle it.
    pub async fn pump_signal(&mut self) -> SideChannelSignal {
        let signal = self
            .signals
            .recv()
            .await
            .expect("side-channel signal stream closed");
        self.app.handle_signal(signal.clone()).await;
        signal
    }

    /// Everything the presenter published, decoded.
    pub fn published(&self) -> Vec<Value> {
        self.broker.published_json(PUBLISH_TOPIC)
    }

    /// Message types the presenter published, in order.
    pub fn published_types(&self) -> Vec<String> {
        self.published()
            .iter()
            .map(|m| m["type"].as_str().unwrap_or_default().to_owned())
            .collect()
    }
}

/// Builds a presenter over the sample story. Audio runs in mock mode with a
/// one second delay.
pub fn build_app(
    broker: &MemoryBroker,
    features: FeatureToggles,
    minigame_rng: Box<dyn DeterministicRng>,
) -> (PresenterApp, UnboundedReceiver<SideChannelSignal>) {
    let clock: Arc<dyn Clock> = Arc::new(fixed_clock());
    let book = Arc::new(StoryBook::from_json(SAMPLE_STORY_JSON).unwrap());
    let transport = TransportChannel::new(
        TransportConfig::default(),
        Arc::new(broker.clone()),
        Arc::clone(&clock),
    );
    let audio = AudioConfig {
        mock_delay: Some(Duration::from_secs(1)),
        ..AudioConfig::default()
    };
    let SideChannels {
        audio,
        minigame,
        signals,
    } = SideChannels::new(
        audio,
        MinigameConfig::default(),
        Arc::clone(&clock),
        Box::new(MockRng),
        minigame_rng,
    );
    let app = PresenterApp::new(book, features, transport, audio, minigame, clock);
    (app, signals)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
