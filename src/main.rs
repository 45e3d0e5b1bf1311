//! HTTP front end: one lookup endpoint and one administrative reset.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use log::{error, info, warn};
use phishguard::feed::HttpFeedClient;
use phishguard::store::RedisStore;
use phishguard::{BulkLoader, Config, PhishChecker, PhishError, RefreshCoordinator};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct AppState {
    checker: Arc<PhishChecker>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    setup_logging(config.log_level.as_deref())?;
    info!("phishguard starting");

    let store = Arc::new(RedisStore::connect(&config.redis_url).await?);
    let feed = Arc::new(HttpFeedClient::new(&config)?);
    let loader = BulkLoader::new(
        store.clone(),
        feed.clone(),
        Duration::from_secs(config.record_ttl_secs),
    );
    let refresh = RefreshCoordinator::new(store.clone(), feed, loader);
    let checker = Arc::new(PhishChecker::new(store, refresh));

    let app = Router::new()
        .route("/check", get(handle_check))
        .route("/reset", post(handle_reset))
        .with_state(AppState { checker });

    let listener =
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.listen_port)).await?;
    info!("Listening on port {}", config.listen_port);
    axum::serve(listener, app).await?;

    Ok(())
}

fn setup_logging(level: Option<&str>) -> Result<(), fern::InitError> {
    let level = match level {
        Some("debug") => log::LevelFilter::Debug,
        Some("warn") => log::LevelFilter::Warn,
        Some("error") => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

#[derive(Deserialize)]
struct CheckParams {
    url: Option<String>,
}

async fn handle_check(
    State(state): State<AppState>,
    Query(params): Query<CheckParams>,
) -> (StatusCode, Json<Value>) {
    let Some(url) = params.url.filter(|u| !u.is_empty()) else {
        return envelope(
            StatusCode::BAD_REQUEST,
            "no input url",
            json!({ "url": Value::Null }),
        );
    };

    match state.checker.check(&url).await {
        Ok(info) => envelope(StatusCode::OK, "OK", json!(info)),
        Err(e @ PhishError::InvalidUrl(_)) => {
            warn!("Rejected lookup for {:?}: {}", url, e);
            envelope(StatusCode::BAD_REQUEST, &e.to_string(), json!({ "url": url }))
        }
        Err(e) => {
            error!("Lookup failed for {:?}: {}", url, e);
            envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error",
                json!(e.to_string()),
            )
        }
    }
}

async fn handle_reset(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.checker.reset().await {
        Ok(()) => envelope(StatusCode::OK, "OK", json!("cache been reset")),
        Err(e) => {
            error!("Cache reset failed: {}", e);
            envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error",
                json!(e.to_string()),
            )
        }
    }
}

fn envelope(status: StatusCode, message: &str, info: Value) -> (StatusCode, Json<Value>) {
    let body = json!({
        "status": if status == StatusCode::OK { "success" } else { "error" },
        "message": message,
        "info": info,
    });
    (status, Json(body))
}
