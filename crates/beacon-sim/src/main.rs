//! beacon-sim: scripted run of the presence engine against the in-memory store.
//!
//! Signs a handful of users in, connects, crashes the connection, reconnects
//! and signs everyone out, then prints the resulting session analytics. The
//! clock is simulated, so minutes of "usage" pass instantly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use beacon_common::{BeaconError, Clock, Event, ManualClock, Result, SystemClock};
use beacon_config::BeaconConfig;
use beacon_presence::{AuthEvent, MemoryStore, PresenceEngine};
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

const MINUTE: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "beacon-sim", about = "Simulate sessions and presence against an in-memory store")]
struct Args {
    /// Config file to load instead of the platform default.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of simulated users.
    #[arg(short, long, default_value_t = 3)]
    users: usize,

    /// Override the store's disconnect detection delay, in milliseconds.
    #[arg(long)]
    delay_ms: Option<u32>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let (mut config, load_error) = match load(&args) {
        Ok(config) => (config, None),
        Err(e) => (BeaconConfig::default(), Some(e)),
    };
    if let Some(delay) = args.delay_ms {
        config.store.detection_delay_ms = delay;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.directive())),
        )
        .init();

    if let Some(e) = load_error {
        tracing::warn!(error = %e, "could not load config; using defaults");
    }

    if let Err(e) = run(&config, args.users.max(1)).await {
        tracing::error!(error = %e, "simulation failed");
        std::process::exit(1);
    }
}

fn load(args: &Args) -> std::result::Result<BeaconConfig, beacon_common::ConfigError> {
    match &args.config {
        Some(path) => beacon_config::load_from_path(path),
        None => beacon_config::load_config(),
    }
}

async fn run(config: &BeaconConfig, users: usize) -> Result<()> {
    let started = SystemClock.now();
    let clock = Arc::new(ManualClock::new(started));
    let delay = config.store.detection_delay();
    let store = MemoryStore::with_detection_delay(clock.clone(), delay);
    let engine = PresenceEngine::new(Arc::new(store.clone()), clock.clone(), config);

    let mut opened = engine.events().subscribe();
    tokio::spawn(log_events(engine.events().subscribe()));

    let uids: Vec<String> = (1..=users).map(|n| format!("user-{n}")).collect();
    let mut coordinator = engine.coordinator();

    tracing::info!(users, "signing in");
    for uid in &uids {
        coordinator.handle(AuthEvent::signed_in(uid.as_str())).await?;
    }
    store.connect();
    wait_for_opens(&mut opened, users).await?;
    tracing::info!(online = engine.presence().count_online().await?, "all users online");

    clock.advance(5 * MINUTE);
    tracing::info!(?delay, "dropping the connection");
    store.drop_connection().await;
    tokio::time::sleep(delay + Duration::from_millis(50)).await;
    tracing::info!(
        online = engine.presence().count_online().await?,
        "store cleanup applied"
    );

    clock.advance(MINUTE);
    store.connect();
    wait_for_opens(&mut opened, users).await?;

    for (i, uid) in uids.iter().enumerate() {
        clock.advance(MINUTE * (i as u32 + 2));
        coordinator.handle(AuthEvent::signed_out(uid.as_str())).await?;
    }
    coordinator.shutdown().await;

    let analytics = engine.analytics();
    let summary = serde_json::json!({
        "total_sessions": analytics.total_sessions().await?,
        "ended_since_start": analytics.count_since(started).await?,
        "average_length_minutes": analytics.average_length().await?,
        "online": engine.presence().count_online().await?,
    });
    let rendered = serde_json::to_string_pretty(&summary)
        .map_err(|e| BeaconError::Other(format!("failed to render summary: {e}")))?;
    println!("{rendered}");
    Ok(())
}

async fn wait_for_opens(rx: &mut broadcast::Receiver<Event>, want: usize) -> Result<()> {
    let mut seen = 0;
    let wait = async {
        while seen < want {
            match rx.recv().await {
                Ok(Event::SessionOpened { .. }) => seen += 1,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    let finished = tokio::time::timeout(Duration::from_secs(5), wait).await.is_ok();
    if !finished || seen < want {
        return Err(BeaconError::Other(format!(
            "only {seen} of {want} sessions opened"
        )));
    }
    Ok(())
}

async fn log_events(mut rx: broadcast::Receiver<Event>) {
    loop {
        match rx.recv().await {
            Ok(Event::SessionOpened { uid, session_id }) => {
                tracing::info!(%uid, %session_id, "session opened");
            }
            Ok(Event::SessionClosed {
                uid,
                session_id,
                reason,
            }) => {
                tracing::info!(%uid, %session_id, ?reason, "session closed");
            }
            Ok(Event::ConsistencyViolation { uid, detail }) => {
                tracing::warn!(%uid, %detail, "consistency violation");
            }
            Ok(Event::Error { uid, message }) => {
                tracing::warn!(%uid, %message, "engine error");
            }
            Ok(event) => tracing::debug!(?event, "event"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!(skipped = n, "event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
