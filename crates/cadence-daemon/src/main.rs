use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::config::CadenceConfig;
use cadence_daemon::{
    app::{self, AppState},
    cli::Cli,
    standby::{self, Standby},
};
use cadence_scheduler::{recovery::repair_crashed_runs, SchedulerContext, SchedulerEngine};
use cadence_store::Store;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // load config: --config > CADENCE_CONFIG env > ~/.cadence/cadence.toml
    let loaded = CadenceConfig::load(cli.config_path().as_deref());
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => CadenceConfig::default(),
    };
    cli.apply(&mut config);

    let default_filter = if config.logging.verbose {
        "cadence=debug,cadence_daemon=debug,cadence_scheduler=debug,cadence_store=debug,cadence_shell=debug"
    } else {
        "cadence=info,cadence_daemon=info,cadence_scheduler=info,cadence_store=info,cadence_shell=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
    if let Err(e) = &loaded {
        warn!("Config load failed ({e}), using defaults");
    }
    info!(version = cadence_daemon::VERSION, client = %config.client_name, "cadence starting");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
            }
            shutdown.cancel();
        }
    });

    let state = Arc::new(AppState::new(config.clone()));
    let http = if config.http.enabled {
        let addr: SocketAddr = format!("{}:{}", config.http.bind, config.http.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("health endpoint listening on {addr}");
        let router = app::build_router(state.clone());
        let stop = shutdown.clone();
        Some(tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await;
            if let Err(e) = served {
                error!("health endpoint failed: {e}");
            }
        }))
    } else {
        None
    };

    let retry = Duration::from_secs(config.scheduler.standby_retry_secs.max(1));
    let Some(store) = standby::open_store(&config, retry, &shutdown).await else {
        return Ok(());
    };
    let store: Arc<dyn Store> = store;
    state.attach_store(store.clone());

    let ctx = SchedulerContext::from_config(store, &config);
    match standby::acquire_identity(&ctx, retry, config.scheduler.exit_on_contention, &shutdown).await {
        Standby::Acquired => state.set_identity_held(true),
        Standby::Shutdown => return Ok(()),
        Standby::Contended => {
            shutdown.cancel();
            anyhow::bail!(
                "another scheduler is already active for client '{}'",
                config.client_name
            );
        }
    }

    let repaired = repair_crashed_runs(&ctx);
    if repaired > 0 {
        warn!(repaired, "runs left unfinished by a previous scheduler were marked failed");
    }

    SchedulerEngine::new(ctx).run(shutdown.clone()).await;

    if let Some(http) = http {
        let _ = http.await;
    }
    info!("cadence stopped");
    Ok(())
}
