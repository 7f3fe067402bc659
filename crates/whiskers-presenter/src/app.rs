//! The control dispatcher.
//!
//! `PresenterApp` owns the game state, the story engine, the transport
//! channel and both side-channel adapters. Every inbound command, local UI
//! event, transport event and side-channel signal is handled here; engine
//! outputs are carried out in the order they were produced.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use whiskers_core::clock::{Clock, iso_timestamp};
use whiskers_core::envelope::Envelope;
use whiskers_core::error::{ContentError, PresenterError, SideChannelError, TransportError};
use whiskers_core::features::FeatureToggles;
use whiskers_core::signal::{AudioStatus, MinigameEvent, SideChannelSignal};
use whiskers_sidechannel::{AudioAdapter, MinigameAdapter};
use whiskers_story::application::engine::{EngineOutput, SideChannelRequest, StoryEngine};
use whiskers_story::domain::chapter::{ChapterType, StoryBook};
use whiskers_story::domain::notifications::{ChoiceSummary, Notification, ScrollDirection};
use whiskers_story::domain::state::GameState;
use whiskers_transport::{ChannelEvent, TransportChannel};

use crate::command::{LocalEvent, RemoteCommand};
use crate::error::ErrorReporter;
use crate::state::{StatusSnapshot, StoryOverview};
use crate::viewport::Viewport;

/// The presenter: game state plus everything that acts on it.
pub struct PresenterApp {
    engine: StoryEngine,
    state: GameState,
    transport: TransportChannel,
    audio: AudioAdapter,
    minigame: MinigameAdapter,
    clock: Arc<dyn Clock>,
    features: FeatureToggles,
    viewport: Viewport,
    viewport_generation: u64,
    errors: ErrorReporter,
}

impl std::fmt::Debug for PresenterApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenterApp")
            .field("engine", &self.engine)
            .field("state", &self.state)
            .field("transport", &self.transport)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

impl PresenterApp {
    #[must_use]
    pub fn new(
        book: Arc<StoryBook>,
        features: FeatureToggles,
        transport: TransportChannel,
        audio: AudioAdapter,
        minigame: MinigameAdapter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine: StoryEngine::new(book, features),
            state: GameState::new(features.development_mode),
            transport,
            audio,
            minigame,
            clock,
            features,
            viewport: Viewport::default(),
            viewport_generation: 0,
            errors: ErrorReporter::new(),
        }
    }

    /// Startup sequence: connect, load the start chapter, announce readiness.
    #[instrument(skip(self))]
    pub async fn start(&mut self) {
        info!(features = ?self.features, "starting presenter");
        if self.features.mqtt {
            self.connect().await;
        }
        if let Err(e) = self.engine.start_story(&mut self.state, self.clock.as_ref()) {
            self.flush_outputs().await;
            self.report("story_start", e.into()).await;
            return;
        }
        self.flush_outputs().await;
        let ready = Notification::AppReady {
            development_mode: self.features.development_mode,
            features_enabled: self.features,
            story_version: self.engine.book().version_hash().to_owned(),
        };
        self.publish(ready).await;
        info!(chapter = %self.state.current_chapter, "presenter ready");
    }

    async fn connect(&mut self) {
        match self.transport.connect().await {
            Ok(()) => self.state.connection.connected = true,
            Err(e) => {
                self.state.connection.connected = self.transport.is_connected();
                self.report("mqtt_connection", e.into()).await;
                self.schedule_reconnect().await;
            }
        }
    }

    async fn schedule_reconnect(&mut self) {
        if let Err(e) = self.transport.schedule_reconnect() {
            self.report("mqtt_connection", e.into()).await;
        }
    }

    /// Waits for the next transport event.
    pub async fn next_transport_event(&mut self) -> ChannelEvent {
        self.transport.next_event().await
    }

    /// Reacts to an inbound message, a lost connection or a due reconnect.
    pub async fn handle_transport_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(envelope) => self.handle_envelope(envelope).await,
            ChannelEvent::ConnectionLost(reason) => {
                info!(reason = %reason, "connection lost, scheduling reconnect");
                self.state.connection.connected = false;
                self.schedule_reconnect().await;
            }
            ChannelEvent::ReconnectDue => {
                let attempt = self.transport.reconnect().await;
                self.state.connection.connected = self.transport.is_connected();
                if let Err(e) = attempt {
                    self.report("mqtt_reconnect", e.into()).await;
                    self.schedule_reconnect().await;
                }
            }
        }
    }

    /// Handles an orchestrator message.
    #[instrument(skip_all, fields(message_type = %envelope.message_type))]
    pub async fn handle_envelope(&mut self, envelope: Envelope) {
        self.state.connection.last_message = Some(iso_timestamp(self.clock.now()));
        if let Some(command) = RemoteCommand::from_envelope(&envelope) {
            self.dispatch(command).await;
        }
    }

    /// Executes a command, reporting any failure.
    #[instrument(skip_all, fields(correlation_id = %Uuid::new_v4(), operation = command.operation()))]
    pub async fn dispatch(&mut self, command: RemoteCommand) {
        debug!(?command, "dispatching");
        let operation = command.operation();
        let result = self.execute(command).await;
        self.flush_outputs().await;
        if let Err(e) = result {
            self.report(operation, e).await;
        }
    }

    async fn execute(&mut self, command: RemoteCommand) -> Result<(), PresenterError> {
        match command {
            RemoteCommand::ProceedChapter => {
                self.engine.proceed_to_next(&mut self.state, self.clock.as_ref())?;
            }
            RemoteCommand::MakeChoice { index } => {
                if !self.state.game_status.is_waiting_for_input {
                    debug!(index, "ignoring choice, not waiting for input");
                    return Ok(());
                }
                let index = usize::try_from(index).map_err(|_| ContentError::InvalidChoiceIndex {
                    index,
                    available: self.engine.choices().len(),
                })?;
                self.engine.make_choice(index, &mut self.state, self.clock.as_ref())?;
            }
            RemoteCommand::NavigateChoice { direction } => self.navigate(direction).await,
            RemoteCommand::ScrollUp => self.scroll(ScrollDirection::Up).await,
            RemoteCommand::ScrollDown => self.scroll(ScrollDirection::Down).await,
            RemoteCommand::MinigameInput { input } => {
                self.minigame.forward_input(&input)?;
                debug!(input = %input, "forwarded minigame input");
            }
            RemoteCommand::ResetGame => {
                info!("resetting game to beginning");
                self.engine.start_story(&mut self.state, self.clock.as_ref())?;
                self.flush_outputs().await;
                self.publish(Notification::GameReset).await;
            }
        }
        Ok(())
    }

    /// Scroll-first navigation: scrolls the text while it can, then moves the
    /// choice cursor, clamped to the available choices.
    async fn navigate(&mut self, direction: ScrollDirection) {
        self.sync_viewport();
        match direction {
            ScrollDirection::Up if !self.viewport.at_top() => {
                self.viewport.scroll_up();
                debug!(offset = self.viewport.offset(), "scrolled story text up");
                return;
            }
            ScrollDirection::Down if !self.viewport.at_bottom() => {
                self.viewport.scroll_down();
                debug!(offset = self.viewport.offset(), "scrolled story text down");
                return;
            }
            _ => {}
        }

        let count = self.engine.choices().len();
        if count == 0 {
            debug!("no choices available for navigation");
            return;
        }
        let current = self.state.game_status.current_choice_index;
        let selected = match direction {
            ScrollDirection::Up => current.saturating_sub(1),
            ScrollDirection::Down => (current + 1).min(count - 1),
        };
        if selected == current {
            return;
        }
        self.state.game_status.current_choice_index = selected;
        debug!(selected, "choice selection changed");
        let notification = Notification::ChoicesAvailable {
            chapter: self.state.current_chapter.clone(),
            choices: self
                .engine
                .choices()
                .iter()
                .enumerate()
                .map(|(index, choice)| ChoiceSummary {
                    index,
                    text: choice.text.clone(),
                })
                .collect(),
            current_selection: selected,
        };
        self.publish(notification).await;
    }

    async fn scroll(&mut self, direction: ScrollDirection) {
        self.sync_viewport();
        let at_limit = match direction {
            ScrollDirection::Up => self.viewport.scroll_up(),
            ScrollDirection::Down => self.viewport.scroll_down(),
        };
        debug!(?direction, at_limit, "scrolled story text");
        let notification = Notification::ScrollStatus {
            direction,
            at_top: self.viewport.at_top(),
            at_bottom: self.viewport.at_bottom(),
        };
        self.publish(notification).await;
    }

    /// Handles a local UI event. Returns `false` when the presenter should stop.
    pub async fn handle_local(&mut self, event: LocalEvent) -> bool {
        match event {
            LocalEvent::Command(command) => self.dispatch(command).await,
            LocalEvent::SelectCurrent => {
                let index = i64::try_from(self.state.game_status.current_choice_index)
                    .unwrap_or(i64::MAX);
                self.dispatch(RemoteCommand::MakeChoice { index }).await;
            }
            LocalEvent::PageHidden => {
                info!("page hidden, pausing activities");
                self.audio.pause();
                self.publish(Notification::AppPaused).await;
            }
            LocalEvent::PageVisible => {
                info!("page visible, resuming activities");
                self.audio.resume();
                self.publish(Notification::AppResumed).await;
            }
            LocalEvent::JumpToChapter(id) => self.jump_to_chapter(&id).await,
            LocalEvent::Shutdown => return false,
        }
        true
    }

    async fn jump_to_chapter(&mut self, id: &str) {
        let follows_link = self
            .engine
            .current_chapter()
            .is_none_or(|current| self.engine.validate_chapter_link(&current.id, id));
        info!(from = %self.state.current_chapter, to = %id, follows_link, "development chapter jump");
        let result = self
            .engine
            .jump_to_chapter(id, &mut self.state, self.clock.as_ref());
        self.flush_outputs().await;
        if let Err(e) = result {
            self.report("chapter_jump", e.into()).await;
        }
    }

    /// Routes a side-channel signal through its adapter and the engine.
    pub async fn handle_signal(&mut self, signal: SideChannelSignal) {
        match &signal {
            SideChannelSignal::Audio { .. } => self.audio.observe(&signal),
            SideChannelSignal::Minigame { .. } => self.minigame.observe(&signal),
        }
        let is_current = self.engine.pending_task() == Some(signal.task());
        let failure = match &signal {
            SideChannelSignal::Audio {
                file,
                status: AudioStatus::Error,
                ..
            } if is_current => Some((
                "audio_playback",
                SideChannelError::Playback {
                    subject: file.clone(),
                    reason: "audio backend failed, playing placeholder".to_owned(),
                },
            )),
            SideChannelSignal::Minigame {
                minigame_id,
                event: MinigameEvent::Error(message),
                ..
            } if is_current => Some((
                "minigame_loading",
                SideChannelError::Load {
                    subject: minigame_id.clone(),
                    reason: message.clone(),
                },
            )),
            _ => None,
        };

        let result = self
            .engine
            .apply_signal(signal, &mut self.state, self.clock.as_ref());
        self.flush_outputs().await;
        if let Some((operation, e)) = failure {
            self.report(operation, e.into()).await;
        }
        if let Err(e) = result {
            self.report("side_channel_signal", e.into()).await;
        }
    }

    /// Stops side channels and closes the transport.
    pub async fn shutdown(&mut self) {
        info!("shutting down presenter");
        self.engine.cancel_side_channels(&mut self.state);
        self.flush_outputs().await;
        self.transport.disconnect().await;
        self.state.connection.connected = false;
    }

    async fn flush_outputs(&mut self) {
        for output in self.engine.take_outputs() {
            match output {
                EngineOutput::Notify(notification) => self.publish(notification).await,
                EngineOutput::SideChannel(request) => self.run_side_channel(request),
            }
        }
        self.sync_viewport();
    }

    fn run_side_channel(&mut self, request: SideChannelRequest) {
        match request {
            SideChannelRequest::PlayAudio { task, chapter_id } => {
                self.audio.play_chapter(task, &chapter_id);
            }
            SideChannelRequest::StopAudio => {
                self.audio.stop();
            }
            SideChannelRequest::LoadMinigame { task, minigame_id } => {
                self.minigame.load(task, &minigame_id);
            }
            SideChannelRequest::UnloadMinigame => {
                self.minigame.unload();
            }
        }
    }

    fn sync_viewport(&mut self) {
        let generation = self.engine.generation();
        if generation == self.viewport_generation {
            return;
        }
        self.viewport = self
            .engine
            .current_chapter()
            .map_or_else(Viewport::default, |chapter| Viewport::for_text(&chapter.text));
        self.viewport_generation = generation;
    }

    async fn publish(&mut self, notification: Notification) {
        if let Err(e) = self.send(notification).await {
            self.report("mqtt_publish", e.into()).await;
        }
    }

    async fn send(&mut self, notification: Notification) -> Result<(), TransportError> {
        if !self.features.mqtt {
            debug!(message_type = notification.message_type(), "transport disabled, not publishing");
            return Ok(());
        }
        let envelope = notification.into_envelope(self.clock.as_ref());
        self.transport.publish(envelope).await
    }

    async fn report(&mut self, operation: &str, err: PresenterError) {
        let notification = self.errors.report(operation, &err, &self.state);
        if !self.transport.is_connected() {
            debug!(operation, "transport unavailable, error report not published");
            return;
        }
        if let Err(e) = self.send(notification).await {
            warn!(error = %e, "failed to publish error report");
        }
    }

    /// Current status for the development surface.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            game_state: self.state.clone(),
            phase: self.engine.phase(),
            progress: self.engine.progress(&self.state),
            connection: self.transport.stats(),
            audio: self.audio.stats(),
            minigame: self.minigame.stats(),
            last_error: self.errors.banner().cloned(),
            errors_reported: self.errors.reported(),
        }
    }

    /// Static facts about the loaded story.
    #[must_use]
    pub fn story_overview(&self) -> StoryOverview {
        StoryOverview {
            version_hash: self.engine.book().version_hash().to_owned(),
            chapters: self
                .engine
                .available_chapters()
                .into_iter()
                .map(str::to_owned)
                .collect(),
            chapter_types: self
                .engine
                .chapter_types()
                .into_iter()
                .map(ChapterType::as_str)
                .collect(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &GameState {
        &self.state
    }

    #[must_use]
    pub fn engine(&self) -> &StoryEngine {
        &self.engine
    }

    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    #[must_use]
    pub fn errors(&self) -> &ErrorReporter {
        &self.errors
    }

    #[must_use]
    pub fn transport(&self) -> &TransportChannel {
        &self.transport
    }

    #[must_use]
    pub fn audio(&self) -> &AudioAdapter {
        &self.audio
    }

    #[must_use]
    pub fn minigame(&self) -> &MinigameAdapter {
        &self.minigame
    }
}
