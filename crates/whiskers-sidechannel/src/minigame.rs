//! Minigame hosting.
//!
//! At most one minigame is loaded at a time. A loaded minigame runs in its
//! own task, receives forwarded player input and reports `started`,
//! `progress`, `completed`, `failed` or `error` for the engine's task id.
//! Without a host, or when the host fails to load in time, a placeholder
//! plays for 10–30 s and succeeds 70% of the time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use whiskers_core::clock::{Clock, iso_timestamp};
use whiskers_core::error::SideChannelError;
use whiskers_core::rng::DeterministicRng;
use whiskers_core::signal::{MinigameEvent, MinigameResult, SideChannelSignal, TaskId};

const HISTORY_LIMIT: usize = 10;
const PLACEHOLDER_MIN_MS: u32 = 10_000;
const PLACEHOLDER_MAX_MS: u32 = 30_000;
const PLACEHOLDER_SUCCESS_THRESHOLD: f64 = 0.3;

/// Loads and runs real minigames.
#[async_trait]
pub trait MinigameHost: Send + Sync {
    /// Prepares `minigame_id`. Bounded by the adapter's loading timeout.
    ///
    /// # Errors
    ///
    /// `SideChannelError::Load` when the minigame cannot be loaded.
    async fn load(&self, minigame_id: &str) -> Result<(), SideChannelError>;

    /// Plays a loaded minigame to its end.
    ///
    /// # Errors
    ///
    /// Any `SideChannelError` that aborts the game.
    async fn play(
        &self,
        minigame_id: &str,
        session: MinigameSession,
    ) -> Result<MinigameResult, SideChannelError>;
}

/// A running minigame's link back to the presenter.
#[derive(Debug)]
pub struct MinigameSession {
    task: TaskId,
    minigame_id: String,
    inputs: UnboundedReceiver<String>,
    signals: UnboundedSender<SideChannelSignal>,
}

impl MinigameSession {
    /// Next forwarded player input; `None` once the minigame is unloaded.
    pub async fn next_input(&mut self) -> Option<String> {
        self.inputs.recv().await
    }

    /// Reports intermediate progress to the orchestrator.
    pub fn report_progress(&self, progress: Value) {
        let _ = self.signals.send(SideChannelSignal::Minigame {
            task: self.task,
            minigame_id: self.minigame_id.clone(),
            event: MinigameEvent::Progress(progress),
        });
    }

    fn emit(&self, event: MinigameEvent) {
        let _ = self.signals.send(SideChannelSignal::Minigame {
            task: self.task,
            minigame_id: self.minigame_id.clone(),
            event,
        });
    }
}

/// Minigame adapter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinigameConfig {
    pub loading_timeout: Duration,
}

impl Default for MinigameConfig {
    fn default() -> Self {
        Self {
            loading_timeout: Duration::from_millis(30_000),
        }
    }
}

/// A finished minigame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinigameHistoryEntry {
    pub minigame_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub timestamp: String,
}

/// Diagnostics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinigameStats {
    pub current_minigame: Option<String>,
    pub current_title: Option<String>,
    pub history: Vec<MinigameHistoryEntry>,
}

/// Display title of a minigame.
#[must_use]
pub fn minigame_title(minigame_id: &str) -> String {
    match minigame_id {
        "post_chapter_6" => "Power Development Challenge".to_owned(),
        "chapter_8_battle" => "Epic Dust Battle".to_owned(),
        "ending_minigame" => "Final Challenge".to_owned(),
        other => format!("Minigame: {other}"),
    }
}

#[derive(Debug)]
struct ActiveMinigame {
    task: TaskId,
    minigame_id: String,
    inputs: UnboundedSender<String>,
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy)]
struct PlaceholderOutcome {
    duration: Duration,
    success: bool,
    score: u32,
}

impl PlaceholderOutcome {
    fn result(self) -> MinigameResult {
        MinigameResult {
            success: self.success,
            score: Some(self.score),
            completion_time: Some(u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

/// Minigame side channel.
pub struct MinigameAdapter {
    config: MinigameConfig,
    host: Option<Arc<dyn MinigameHost>>,
    signals: UnboundedSender<SideChannelSignal>,
    clock: Arc<dyn Clock>,
    rng: Box<dyn DeterministicRng>,
    current: Option<ActiveMinigame>,
    history: VecDeque<MinigameHistoryEntry>,
}

impl std::fmt::Debug for MinigameAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinigameAdapter")
            .field("config", &self.config)
            .field("has_host", &self.host.is_some())
            .field("current", &self.current.as_ref().map(|m| &m.minigame_id))
            .finish_non_exhaustive()
    }
}

impl MinigameAdapter {
    /// Creates an adapter that only runs placeholders.
    #[must_use]
    pub fn new(
        config: MinigameConfig,
        signals: UnboundedSender<SideChannelSignal>,
        clock: Arc<dyn Clock>,
        rng: Box<dyn DeterministicRng>,
    ) -> Self {
        Self {
            config,
            host: None,
            signals,
            clock,
            rng,
            current: None,
            history: VecDeque::new(),
        }
    }

    /// Runs minigames on `host`, falling back to placeholders when loading fails.
    #[must_use]
    pub fn with_host(mut self, host: Arc<dyn MinigameHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Loads a minigame, unloading whatever was running.
    /// Must be called inside a tokio runtime.
    pub fn load(&mut self, task: TaskId, minigame_id: &str) {
        self.unload();
        let duration = Duration::from_millis(u64::from(
            self.rng.next_u32_range(PLACEHOLDER_MIN_MS, PLACEHOLDER_MAX_MS),
        ));
        let score = self.rng.next_u32_range(0, 999);
        let success = self.rng.next_f64() > PLACEHOLDER_SUCCESS_THRESHOLD;
        info!(%task, minigame_id, title = %minigame_title(minigame_id), "loading minigame");

        let (inputs, inputs_rx) = mpsc::unbounded_channel();
        let session = MinigameSession {
            task,
            minigame_id: minigame_id.to_owned(),
            inputs: inputs_rx,
            signals: self.signals.clone(),
        };
        let run = MinigameRun {
            host: self.host.clone(),
            loading_timeout: self.config.loading_timeout,
            placeholder: PlaceholderOutcome {
                duration,
                success,
                score,
            },
        };
        let handle = tokio::spawn(run.run(session));
        self.current = Some(ActiveMinigame {
            task,
            minigame_id: minigame_id.to_owned(),
            inputs,
            handle,
        });
    }

    /// Forwards a player input to the running minigame.
    ///
    /// # Errors
    ///
    /// Returns `SideChannelError::NoActiveMinigame` when nothing is loaded.
    pub fn forward_input(&self, input: &str) -> Result<(), SideChannelError> {
        let active = self
            .current
            .as_ref()
            .ok_or(SideChannelError::NoActiveMinigame)?;
        active
            .inputs
            .send(input.to_owned())
            .map_err(|_| SideChannelError::NoActiveMinigame)
    }

    /// Stops the running minigame. Returns whether one was running.
    pub fn unload(&mut self) -> bool {
        let Some(active) = self.current.take() else {
            return false;
        };
        active.handle.abort();
        debug!(task = %active.task, minigame_id = %active.minigame_id, "minigame unloaded");
        true
    }

    /// Updates bookkeeping from a signal this adapter emitted.
    pub fn observe(&mut self, signal: &SideChannelSignal) {
        let SideChannelSignal::Minigame {
            task,
            minigame_id,
            event,
        } = signal
        else {
            return;
        };
        if !matches!(
            event,
            MinigameEvent::Completed(_) | MinigameEvent::Failed(_) | MinigameEvent::Error(_)
        ) {
            return;
        }
        self.history.push_front(MinigameHistoryEntry {
            minigame_id: minigame_id.clone(),
            status: event.status().as_str(),
            result: event.payload(),
            timestamp: iso_timestamp(self.clock.now()),
        });
        self.history.truncate(HISTORY_LIMIT);
        if !matches!(event, MinigameEvent::Error(_)) {
            self.current.take_if(|m| m.task == *task);
        }
    }

    /// Whether a minigame is loaded.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Diagnostics snapshot.
    #[must_use]
    pub fn stats(&self) -> MinigameStats {
        let current = self.current.as_ref().map(|m| m.minigame_id.clone());
        MinigameStats {
            current_title: current.as_deref().map(minigame_title),
            current_minigame: current,
            history: self.history.iter().cloned().collect(),
        }
    }
}

struct MinigameRun {
    host: Option<Arc<dyn MinigameHost>>,
    loading_timeout: Duration,
    placeholder: PlaceholderOutcome,
}

impl MinigameRun {
    async fn run(self, session: MinigameSession) {
        let Some(host) = self.host.clone() else {
            self.simulate(session).await;
            return;
        };
        let id = session.minigame_id.clone();
        let loaded = match timeout(self.loading_timeout, host.load(&id)).await {
            Ok(result) => result,
            Err(_) => Err(SideChannelError::LoadTimeout {
                subject: id.clone(),
                timeout_ms: u64::try_from(self.loading_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        if let Err(e) = loaded {
            warn!(minigame_id = %id, error = %e, "minigame failed to load, using placeholder");
            session.emit(MinigameEvent::Error(e.to_string()));
            self.simulate(session).await;
            return;
        }

        session.emit(MinigameEvent::Started);
        let signals = session.signals.clone();
        let task = session.task;
        let event = match host.play(&id, session).await {
            Ok(result) if result.success => MinigameEvent::Completed(result),
            Ok(result) => MinigameEvent::Failed(result),
            Err(e) => {
                warn!(minigame_id = %id, error = %e, "minigame aborted");
                let _ = signals.send(SideChannelSignal::Minigame {
                    task,
                    minigame_id: id.clone(),
                    event: MinigameEvent::Error(e.to_string()),
                });
                MinigameEvent::Failed(MinigameResult {
                    success: false,
                    score: None,
                    completion_time: None,
                })
            }
        };
        let _ = signals.send(SideChannelSignal::Minigame {
            task,
            minigame_id: id,
            event,
        });
    }

    async fn simulate(&self, mut session: MinigameSession) {
        debug!(minigame_id = %session.minigame_id, "placeholder minigame");
        session.emit(MinigameEvent::Started);
        let finish = sleep(self.placeholder.duration);
        tokio::pin!(finish);
        loop {
            tokio::select! {
                () = &mut finish => break,
                input = session.inputs.recv() => match input {
                    Some(input) => debug!(minigame_id = %session.minigame_id, input = %input, "placeholder input"),
                    None => return,
                },
            }
        }
        let result = self.placeholder.result();
        let event = if result.success {
            MinigameEvent::Completed(result)
        } else {
            MinigameEvent::Failed(result)
        };
        session.emit(event);
    }
}
