//! Kanban reference server.
//!
//! An axum server holding tasks in memory, with the REST endpoints under
//! `/tasks` and the push channel at `/ws`.
//!
//! # Usage
//!
//! ```bash
//! # Run on the default address 0.0.0.0:5000
//! cargo run --bin kanban-server
//!
//! # Custom address, with demo tasks for user "demo"
//! cargo run --bin kanban-server -- --bind 127.0.0.1:8080 --seed-user demo
//! ```

use std::sync::Arc;

use clap::Parser;
use kanban_server::config::{ServerCliArgs, ServerConfig};
use kanban_server::server::{self, AppState};

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting kanban server");

    let state = Arc::new(AppState::new());
    if let Some(user_id) = &config.seed_user {
        if let Err(e) = state.seed_demo(user_id).await {
            tracing::error!(error = %e, "failed to seed demo tasks");
        }
    }

    match server::start_server_with_state(&config.bind_addr, Arc::clone(&state)).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "kanban server listening");
            tokio::select! {
                result = handle => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "server task failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    state.close_all_connections().await;
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
