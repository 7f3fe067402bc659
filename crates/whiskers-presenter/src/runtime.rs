//! The presenter loop.
//!
//! A single task selects over transport events, side-channel signals, local
//! UI events and the shutdown signal. Game state is only mutated here, one
//! event at a time. A status snapshot is published after every event.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::info;
use whiskers_core::clock::Clock;
use whiskers_core::rng::DeterministicRng;
use whiskers_core::signal::SideChannelSignal;
use whiskers_sidechannel::SideChannels;
use whiskers_story::domain::chapter::StoryBook;
use whiskers_transport::{Broker, ChannelEvent, TransportChannel};

use crate::app::PresenterApp;
use crate::command::LocalEvent;
use crate::config::PresenterConfig;
use crate::state::{StatusSnapshot, StoryOverview};

/// The presenter loop and its inputs.
#[derive(Debug)]
pub struct Runtime {
    app: PresenterApp,
    signals: UnboundedReceiver<SideChannelSignal>,
    local: UnboundedReceiver<LocalEvent>,
    status: watch::Sender<StatusSnapshot>,
}

enum Wake {
    Transport(ChannelEvent),
    Signal(Option<SideChannelSignal>),
    Local(Option<LocalEvent>),
    Shutdown,
}

impl Runtime {
    /// Wires a presenter from its configuration. Returns the runtime and the
    /// sender for local UI events.
    #[must_use]
    pub fn assemble(
        config: &PresenterConfig,
        book: Arc<StoryBook>,
        broker: Arc<dyn Broker>,
        clock: Arc<dyn Clock>,
        audio_rng: Box<dyn DeterministicRng>,
        minigame_rng: Box<dyn DeterministicRng>,
    ) -> (Self, UnboundedSender<LocalEvent>) {
        let transport =
            TransportChannel::new(config.transport.clone(), broker, Arc::clone(&clock));
        let SideChannels {
            audio,
            minigame,
            signals,
        } = SideChannels::new(
            config.audio.clone(),
            config.minigame,
            Arc::clone(&clock),
            audio_rng,
            minigame_rng,
        );
        let app = PresenterApp::new(book, config.features, transport, audio, minigame, clock);
        let (local_tx, local) = mpsc::unbounded_channel();
        (Self::new(app, signals, local), local_tx)
    }

    #[must_use]
    pub fn new(
        app: PresenterApp,
        signals: UnboundedReceiver<SideChannelSignal>,
        local: UnboundedReceiver<LocalEvent>,
    ) -> Self {
        let (status, _) = watch::channel(app.snapshot());
        Self {
            app,
            signals,
            local,
            status,
        }
    }

    /// A receiver of the status snapshots published by the loop.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn story_overview(&self) -> StoryOverview {
        self.app.story_overview()
    }

    /// Runs the startup sequence and then the loop until a `Shutdown` event
    /// or the `shutdown` future completes. Returns the presenter for
    /// inspection.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> PresenterApp {
        self.app.start().await;
        self.publish_status();

        tokio::pin!(shutdown);
        let mut signals_open = true;
        let mut local_open = true;
        loop {
            let wake = tokio::select! {
                event = self.app.next_transport_event() => Wake::Transport(event),
                signal = self.signals.recv(), if signals_open => Wake::Signal(signal),
                event = self.local.recv(), if local_open => Wake::Local(event),
                () = &mut shutdown => Wake::Shutdown,
            };

            match wake {
                Wake::Transport(event) => self.app.handle_transport_event(event).await,
                Wake::Signal(Some(signal)) => self.app.handle_signal(signal).await,
                Wake::Signal(None) => signals_open = false,
                Wake::Local(Some(event)) => {
                    if !self.app.handle_local(event).await {
                        break;
                    }
                }
                Wake::Local(None) => local_open = false,
                Wake::Shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
            self.publish_status();
        }

        self.app.shutdown().await;
        self.publish_status();
        self.app
    }

    fn publish_status(&self) {
        self.status.send_replace(self.app.snapshot());
    }
}
