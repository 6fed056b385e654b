use std::future::Future;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    application::{
        config::{Args, RuntimeConfig},
        state::SharedState,
    },
    domain::error::DomainError,
    interfaces::http,
};

pub async fn run(args: Args) -> Result<(), DomainError> {
    let config = RuntimeConfig::from_args(args)
        .map_err(|error| DomainError::InvalidRequest(format!("configuration error: {error}")))?;

    init_logging(&config.log_filter, config.json_logs)?;
    let listener = TcpListener::bind(config.bind_addr())
        .await
        .map_err(|error| DomainError::Unavailable(format!("failed to bind listener: {error}")))?;

    let signal = shutdown_signal();
    run_with_listener(listener, config, signal).await
}

pub async fn run_with_listener(
    listener: TcpListener,
    config: RuntimeConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DomainError> {
    info!(
        "starting remedi-core host={} port={} db={}",
        config.host,
        config.port,
        config.db_path.display()
    );

    let state = SharedState::new(config).await?;
    let mut workers = vec![
        spawn_scheduler_worker(state.clone()),
        spawn_delivery_worker(state.clone()),
    ];
    if let Some(task) = spawn_reconcile_worker(state.clone()) {
        workers.push(task);
    }

    let serve_result = http::serve(listener, state, shutdown).await;

    for task in workers {
        task.abort();
        if let Err(task_error) = task.await
            && !task_error.is_cancelled()
        {
            warn!("background worker aborted: {task_error}");
        }
    }

    serve_result
}

fn init_logging(filter: &str, json_logs: bool) -> Result<(), DomainError> {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(env_filter).with_target(false);

    if json_logs {
        builder.json().try_init().map_err(|error| {
            DomainError::Unavailable(format!("failed to initialize logger: {error}"))
        })?;
    } else {
        builder.compact().try_init().map_err(|error| {
            DomainError::Unavailable(format!("failed to initialize logger: {error}"))
        })?;
    }

    Ok(())
}

fn spawn_scheduler_worker(state: SharedState) -> tokio::task::JoinHandle<()> {
    let poll_interval = state.config().scheduler_poll_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if let Err(tick_error) = state.tick_due_jobs().await {
                error!("scheduler tick failed: {tick_error}");
            }
        }
    })
}

fn spawn_delivery_worker(state: SharedState) -> tokio::task::JoinHandle<()> {
    let drain_interval = state.config().delivery_drain_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(drain_interval);
        loop {
            ticker.tick().await;
            if let Err(drain_error) = state.drain_pending_deliveries().await {
                error!("delivery drain failed: {drain_error}");
            }
        }
    })
}

fn spawn_reconcile_worker(state: SharedState) -> Option<tokio::task::JoinHandle<()>> {
    if !state.config().reconcile_enabled {
        info!("schedule reconciliation disabled by runtime config");
        return None;
    }

    let interval = state.config().reconcile_interval;
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The immediate first tick doubles as the post-crash catch-up pass.
        loop {
            ticker.tick().await;
            if let Err(sweep_error) = state.reconcile_schedules().await {
                error!("schedule reconciliation failed: {sweep_error}");
            }
        }
    }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
