#![doc = include_str!("../README.md")]

mod server;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gendora::{
    IdEncoder, IdGenerator, MemoryStore, MonotonicClock, ReleaseOutcome, SlotAllocator, SlotStore,
    SystemClock,
};
use server::config::{ClockKind, CliArgs, ServerConfig, StoreConfig};
use server::service::handler::{AppState, router};
use server::telemetry::init_telemetry;
use tokio::net::TcpListener;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry(config.log_format)?;

    match config.store.clone() {
        StoreConfig::Memory => run(MemoryStore::new(), config).await,
        #[cfg(feature = "redis")]
        StoreConfig::Redis { url } => {
            let store = gendora::RedisStore::connect(&url)
                .await
                .context("failed to connect to redis")?;
            run(store, config).await
        }
        #[cfg(not(feature = "redis"))]
        StoreConfig::Redis { .. } => {
            anyhow::bail!("STORE=redis requires the `redis` feature");
        }
    }
}

async fn run<S: SlotStore>(store: S, config: ServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr))?;

    let allocator = Arc::new(SlotAllocator::new(store, config.allocator.clone()));
    let slot = allocator
        .allocate()
        .await
        .context("failed to allocate a slot")?;
    tracing::info!(slot, owner = %allocator.owner(), "Slot allocated");

    let generator: Arc<dyn IdGenerator> = match config.clock {
        ClockKind::System => Arc::new(IdEncoder::new(Arc::clone(&allocator), SystemClock)),
        ClockKind::Monotonic => Arc::new(IdEncoder::new(
            Arc::clone(&allocator),
            MonotonicClock::new(),
        )),
    };

    log_startup_info(&config.server_addr, &config);

    let served = axum::serve(listener, router(AppState::new(generator)))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    release_slot(&allocator, &config).await;

    served?;
    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting ID service on {} with full config: {:#?}",
            addr,
            config
        );
    } else {
        tracing::info!(
            "Starting ID service on {} in namespace {}",
            addr,
            config.allocator.namespace
        );
    }
}

/// Stops the heartbeat, then deletes the slot key if it is still ours.
async fn release_slot<S: SlotStore>(allocator: &SlotAllocator<S>, config: &ServerConfig) {
    let release = async {
        allocator.stop_heartbeat().await;
        allocator.release().await
    };

    // Room for the heartbeat grace plus the release round-trips.
    let budget = config.allocator.shutdown_grace.saturating_add(config.shutdown_timeout);
    match tokio::time::timeout(budget, release).await {
        Ok(Ok(ReleaseOutcome::Released { slot })) => {
            tracing::info!(slot, "Slot released");
        }
        Ok(Ok(ReleaseOutcome::NotOwned { slot, owner })) => {
            tracing::warn!(slot, ?owner, "Slot was taken over, left in place");
        }
        Ok(Ok(ReleaseOutcome::NotHeld)) => {}
        Ok(Err(e)) => {
            tracing::error!("Error releasing slot, it will expire on its own: {:?}", e);
        }
        Err(_) => {
            tracing::error!(
                timeout = ?budget,
                "Timed out releasing slot, it will expire on its own"
            );
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
