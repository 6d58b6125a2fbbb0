use std::sync::{Arc, Mutex};

use tracing::info;

use classhubd::config::Config;
use classhubd::db::open_db;
use classhubd::http::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let conn = open_db(&config.data_dir)?;
    let state = Arc::new(AppState {
        db: Mutex::new(conn),
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
