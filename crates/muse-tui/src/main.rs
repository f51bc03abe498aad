mod action;
mod app;
mod components;
mod generation;
mod mpv;
mod player;
mod theme;
mod widgets;

use std::sync::Arc;

use tokio::sync::mpsc;

use muse_core::api::ApiClient;
use muse_core::config::Config;
use muse_core::library::Library;

use crate::generation::{GenerationEngine, GenerationEvent};
use crate::mpv::MpvBackend;
use crate::player::{MediaEvent, Player};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = muse_core::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let log_path = data_dir.join("muse.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Allow RUST_LOG override; default to debug for app code but suppress noisy
    // connection-level DEBUG from HTTP client internals (hyper_util, reqwest).
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // Print log path to stderr so the operator can tail it immediately.
    eprintln!("muse log: {}", log_path.display());

    tracing::info!("muse starting…");

    // ── Config / backend client ──────────────────────────────────────────────
    let config = Config::load().unwrap_or_default();
    let api = ApiClient::new(config.api_base_url());
    tracing::info!("generation backend: {}", api.base_url());

    // ── Library ──────────────────────────────────────────────────────────────
    let library = Library::load(config.paths.library_file.clone());

    // ── Channels (drivers → App) ─────────────────────────────────────────────
    let (media_tx, media_rx) = mpsc::channel::<MediaEvent>(256);
    let (generation_tx, generation_rx) = mpsc::channel::<GenerationEvent>(256);

    // ── Engine + player ──────────────────────────────────────────────────────
    let engine = GenerationEngine::new(Arc::new(api), generation_tx);
    let backend = MpvBackend::new(media_tx);
    let player = Player::new(Box::new(backend), config.player.default_volume);

    // ── Run TUI ──────────────────────────────────────────────────────────────
    let app = app::App::new(library, engine, player);
    app.run(media_rx, generation_rx).await?;

    Ok(())
}
