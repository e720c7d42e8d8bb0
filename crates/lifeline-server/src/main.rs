//! Life-Line Air status server

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lifeline_server::config::Config;
use lifeline_server::state::AppState;
use lifeline_server::{api, loops, source};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_json)?;

    tracing::info!("Starting Life-Line Air status server...");
    if config.operator_token.is_none() {
        tracing::warn!("LIFELINE_OPERATOR_TOKEN not set; operator actions are disabled");
    }
    if config.users.is_empty() {
        tracing::warn!("LIFELINE_USERS is empty; every sign-in will be refused");
    }

    let state = Arc::new(AppState::new(config.clone())?);
    let telemetry = source::from_config(&config, state.push_inbox());
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let refresh = tokio::spawn(loops::refresh_loop::run_refresh_loop(
        state.clone(),
        telemetry,
        shutdown_tx.subscribe(),
    ));

    let app = api::routes(&config)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // the loop finishes any in-flight cycle before returning
    let _ = shutdown_tx.send(());
    refresh.await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("lifeline_server=debug".parse()?);
    if json {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
