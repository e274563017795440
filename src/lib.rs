pub mod clock;
pub mod error;
pub mod housekeeping;
pub mod interactions;
pub mod messenger;
pub mod models;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod summary;
pub mod tracker;
pub mod utils;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;
use clock::{Clock, SystemClock};
use housekeeping::Housekeeper;
use interactions::SignatureVerifier;
use log::{info, warn};
use messenger::{DiscordMessenger, Messenger};
use scheduler::{Scheduler, TokioScheduler};
use settings::{Credentials, Settings};
use store::{FileMirror, RecordStore};
use summary::Reconciler;
use tokio_util::sync::CancellationToken;
use tracker::{ActionHandler, SessionTracker};

#[derive(Clone)]
pub struct AppState {
    pub(crate) handler: Arc<ActionHandler>,
    pub(crate) verifier: Arc<SignatureVerifier>,
}

pub async fn run() -> anyhow::Result<()> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err).context("failed to read .env");
        }
    }

    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("Fichaje starting up...");

    let settings = Settings::from_env().context("invalid settings")?;
    let credentials = Credentials::from_env().context("missing credentials")?;
    let verifier = SignatureVerifier::from_hex(&credentials.public_key)
        .context("invalid application public key")?;

    let mut store = RecordStore::open(&settings.record_store_path);
    if let Some(replica) = &settings.replica_path {
        info!("Mirroring the record file to {}", replica.display());
        store = store.with_replicator(Arc::new(FileMirror::new(replica)));
    }
    let added = store.ensure_entities(settings.tracked_entities.iter().copied());
    store.save().context("failed to write the initial record file")?;
    info!(
        "Tracking {} channels ({added} new)",
        settings.tracked_entities.len()
    );
    let store = store.into_shared();

    let clock = Arc::new(SystemClock);
    let tracker = SessionTracker::new(store.clone(), clock.clone());

    // Sessions left open by the previous run keep counting.
    let now = clock.now();
    for (entity, since) in tracker.open_sessions().await {
        if since > now {
            warn!(
                "Channel {entity} has a session opened in the future ({since}); it needs fixing by hand"
            );
        } else {
            info!("Recovered open session for channel {entity} since {since}");
        }
    }

    let messenger: Arc<dyn Messenger> = Arc::new(
        DiscordMessenger::new(credentials.bot_token.clone())
            .context("failed to build the Discord client")?,
    );
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        messenger.clone(),
        settings.summary_destination,
        settings.acceleration_factor,
    ));
    let handler = Arc::new(ActionHandler::new(
        tracker,
        reconciler.clone(),
        settings.acceleration_factor,
    ));
    let housekeeper = Arc::new(Housekeeper::new(
        store,
        messenger,
        reconciler,
        settings.tracked_entities.clone(),
    ));

    let scheduler = TokioScheduler::new();
    scheduler.schedule_periodic(settings.cleanup_period(), housekeeper);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_address))?;
    let router = interactions::router(AppState {
        handler,
        verifier: Arc::new(verifier),
    });

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(interactions::serve(listener, router, shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutting down");

    shutdown.cancel();
    scheduler.shutdown().await?;
    server.await.context("server task failed to join")??;
    Ok(())
}
