// main.rs — LINE → Google Photos bridge entry point.
use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use tracing::{error, info};

use line_photos_bridge::{
    api,
    config::{self, Config},
    logging,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let base_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));

    // Env files first so RUST_LOG from them reaches the subscriber.
    let env_file = config::load_env_files(&base_dir);
    let level_handle = logging::init();
    info!("base_dir = {}", base_dir.display());
    if let Some(path) = &env_file {
        info!("loaded environment from {}", path.display());
    }

    let cfg = match Config::load(&base_dir) {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    if let Some(handle) = &level_handle {
        logging::apply_level(handle, &cfg.log_level);
    }
    cfg.print_summary();

    let state = AppState::from_config(Arc::clone(&cfg)).context("build HTTP client")?;
    let router = api::router(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP server listening on http://{addr}");

    axum::serve(listener, router).await.context("axum server error")?;
    Ok(())
}
