//! Whiskers presenter entry point.
//!
//! Runs against the in-process broker. Keyboard commands are read from stdin
//! (see `LocalEvent::from_key_line`); a line starting with `{` is injected
//! into the broker as an orchestrator message.

use std::error::Error;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tracing_subscriber::EnvFilter;
use whiskers_core::clock::{Clock, SystemClock};
use whiskers_core::rng::SystemRng;
use whiskers_presenter::command::LocalEvent;
use whiskers_presenter::config::PresenterConfig;
use whiskers_presenter::content::load_story;
use whiskers_presenter::routes;
use whiskers_presenter::runtime::Runtime;
use whiskers_presenter::state::AppState;
use whiskers_transport::MemoryBroker;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Whiskers presenter");

    let config = PresenterConfig::from_env()?;
    let book = Arc::new(load_story(config.story_path.as_deref())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let broker = Arc::new(MemoryBroker::new());

    let (runtime, local) = Runtime::assemble(
        &config,
        book,
        broker.clone(),
        clock,
        Box::new(SystemRng::new()),
        Box::new(SystemRng::new()),
    );

    if let Some(addr) = config.status_addr {
        let app = routes::router(AppState::new(runtime.subscribe(), runtime.story_overview()));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Status server listening on {}", addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "status server stopped");
            }
        });
    }

    tokio::spawn(read_keyboard(
        local,
        broker,
        config.transport.subscribe_topic.clone(),
    ));

    let app = runtime
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    tracing::info!(
        chapter = %app.state().current_chapter,
        choices = app.state().story_progress.choices_made.len(),
        "Presenter stopped"
    );

    Ok(())
}

async fn read_keyboard(
    local: UnboundedSender<LocalEvent>,
    broker: Arc<MemoryBroker>,
    topic: String,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim_start().starts_with('{') {
            if broker.inject(&topic, line.into_bytes()) == 0 {
                tracing::warn!("not connected, orchestrator message dropped");
            }
            continue;
        }
        match LocalEvent::from_key_line(&line) {
            Some(event) => {
                let stop = event == LocalEvent::Shutdown;
                if local.send(event).is_err() || stop {
                    return;
                }
            }
            None => tracing::warn!(input = %line, "unrecognized keyboard input"),
        }
    }
}
