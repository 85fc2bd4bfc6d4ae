use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tillbook::chart::ChartConfig;
use tillbook::config::{CliArgs, Config};
use tillbook::engine::PostingEngine;
use tillbook::models::requests::{
    CardBatchPostingRequest, EzwichPostingRequest, MomoPostingRequest, PowerPostingRequest,
};
use tillbook::models::PostingOutcome;
use tillbook::postgres_storage::PostgresStorage;
use tillbook::sqlite_storage::SqliteStorage;
use tillbook::storage::{InMemoryStorage, LedgerStorage};

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    if config.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let storage: Arc<dyn LedgerStorage> = match config.storage.backend.as_str() {
        "memory" => Arc::new(InMemoryStorage::new()),
        "sqlite" => match SqliteStorage::new(&config.storage.path) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                tracing::error!(path = %config.storage.path, error = %e, "Failed to open sqlite storage");
                std::process::exit(1);
            }
        },
        "postgres" => {
            let Some(ref conn) = config.storage.connection_string else {
                tracing::error!("postgres backend requires storage.connection_string");
                std::process::exit(1);
            };
            match PostgresStorage::new(conn) {
                Ok(s) => Arc::new(s),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to connect to postgres");
                    std::process::exit(1);
                }
            }
        }
        other => {
            tracing::error!(backend = other, "Unknown storage backend");
            std::process::exit(1);
        }
    };

    let chart = match config.chart {
        Some(ref path) => match ChartConfig::load(path) {
            Ok(chart) => chart,
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Failed to load chart of accounts");
                std::process::exit(1);
            }
        },
        None => ChartConfig::builtin(),
    };

    let engine = PostingEngine::new(storage, chart);
    if let Err(e) = engine.bootstrap() {
        tracing::error!(error = %e, "Failed to bootstrap chart of accounts");
        std::process::exit(1);
    }

    let app = Router::new()
        .route("/health", get(health))
        .route("/post/momo", post(post_momo))
        .route("/post/power", post(post_power))
        .route("/post/ezwich", post(post_ezwich))
        .route("/post/card-batch", post(post_card_batch))
        .route("/accounts", get(accounts))
        .with_state(Arc::new(engine));

    let Some(addr) = config.listen_addr() else {
        tracing::error!(
            host = %config.server.host,
            port = config.server.port,
            "Invalid listen address"
        );
        std::process::exit(1);
    };
    tracing::info!(%addr, backend = %config.storage.backend, "Tillbook listening");

    if let Err(e) = axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

async fn health() -> impl IntoResponse {
    "ok"
}

fn outcome_response(outcome: PostingOutcome) -> impl IntoResponse {
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(outcome))
}

async fn post_momo(
    State(engine): State<Arc<PostingEngine>>,
    Json(req): Json<MomoPostingRequest>,
) -> impl IntoResponse {
    outcome_response(engine.post_momo(&req))
}

async fn post_power(
    State(engine): State<Arc<PostingEngine>>,
    Json(req): Json<PowerPostingRequest>,
) -> impl IntoResponse {
    outcome_response(engine.post_power(&req))
}

async fn post_ezwich(
    State(engine): State<Arc<PostingEngine>>,
    Json(req): Json<EzwichPostingRequest>,
) -> impl IntoResponse {
    outcome_response(engine.post_ezwich(&req))
}

async fn post_card_batch(
    State(engine): State<Arc<PostingEngine>>,
    Json(req): Json<CardBatchPostingRequest>,
) -> impl IntoResponse {
    outcome_response(engine.post_card_batch(&req))
}

async fn accounts(State(engine): State<Arc<PostingEngine>>) -> impl IntoResponse {
    match engine.accounts_with_balances() {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list accounts");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}
