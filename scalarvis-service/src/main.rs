mod error;
mod metrics;
mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use scalarvis_core::{Config, Engine};
use state::{AppState, SharedState};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Parser)]
#[command(name = "scalarvis-service")]
#[command(about = "HTTP/JSON service exposing the scalar visualization engine")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Bind address
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Path to a TOML config file; falls back to built-in defaults when
    /// unset.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let engine = Engine::new(config)?;
    spawn_progress_ticker(engine.clone());

    let state: SharedState = Arc::new(AppState::new(engine));

    let app = Router::new()
        .route("/importFile", post(routes::import_file))
        .route("/getParseState", post(routes::get_parse_state))
        .route("/getAllGraph", get(routes::get_all_graph))
        .route("/getIncrementalTag", get(routes::get_incremental_tag))
        .route("/queryCreatedFile", get(routes::query_created_file))
        .route("/fileMerge", post(routes::file_merge))
        .route("/tokenSet", post(routes::token_set))
        .route("/getScalarData", post(routes::get_scalar_data))
        .route("/metrics", get(metrics::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", args.bind, args.port);
    tracing::info!(%addr, "scalarvis-service listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Drive `ParseScheduler::tick` on its configured interval so
/// `/getParseState` reflects current progress between polls, rather than
/// only at a project's completion.
fn spawn_progress_ticker(engine: Arc<Engine>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(engine.poll_interval());
        loop {
            interval.tick().await;
            let engine = engine.clone();
            let _ = tokio::task::spawn_blocking(move || engine.tick()).await;
        }
    });
}
