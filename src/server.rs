use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::StatsConfig;
use crate::core::stats::{load_stats, StatsSnapshot};
use crate::error::{StatsError, StatsResult};
use crate::logs::{collect_log_stats, LogStats};
use crate::storage::{LogStatsCache, MemoryCache, StatsCache};
use crate::utils::http_date;

#[derive(Clone)]
pub struct AppState {
    pub cache: StatsCache,
    pub log_cache: LogStatsCache,
    pub config: Arc<StatsConfig>,
}

impl AppState {
    /// Log stats get their own cache, with the same ttl as `cache`.
    pub fn new(cache: StatsCache, config: StatsConfig) -> Self {
        AppState {
            log_cache: MemoryCache::new(cache.ttl()),
            cache,
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stats", get(api_stats))
        .route("/api/log-stats", get(api_log_stats))
        .with_state(state)
}

/// Serve until ctrl-c.
pub async fn serve(listener: TcpListener, state: AppState) -> StatsResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Stats API listening on http://{addr}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StatsError::Task(format!("HTTP server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Could not listen for shutdown signal. {e}");
    }
    info!("Shutting down.");
}

/// Stats for the current snapshot, from the cache when fresh.
///
/// When recomputing fails but an earlier snapshot was computed, that one is
/// served instead.
pub async fn current_stats(state: &AppState) -> StatsResult<Arc<StatsSnapshot>> {
    let config = state.config.clone();
    fresh_or_stale(&state.cache, move || {
        load_stats(&config.snapshot_path, config.leaderboard_limit)
    })
    .await
}

/// Server log stats, cached and falling back like [`current_stats`].
pub async fn current_log_stats(state: &AppState) -> StatsResult<Arc<LogStats>> {
    let Some(logs_dir) = state.config.logs_dir.clone() else {
        return Err(StatsError::NotFound(
            "no server logs directory configured".to_string(),
        ));
    };
    let limit = state.config.log_limit;
    fresh_or_stale(&state.log_cache, move || {
        collect_log_stats(&[logs_dir], limit)
    })
    .await
}

async fn fresh_or_stale<T, F>(cache: &MemoryCache<T>, compute: F) -> StatsResult<Arc<T>>
where
    T: Send + 'static,
    F: FnOnce() -> StatsResult<T> + Send + 'static,
{
    let computed = cache
        .get(|| async move {
            let value = tokio::task::spawn_blocking(compute).await??;
            Ok::<_, StatsError>(value)
        })
        .await;

    match computed {
        Ok(value) => Ok(value),
        Err(e) => match cache.peek() {
            Some(stale) => {
                warn!("Serving stale stats. {e}");
                Ok(stale)
            }
            None => Err(e),
        },
    }
}

async fn health() -> impl IntoResponse {
    "ok"
}

async fn api_stats(State(state): State<AppState>) -> Response {
    let stats = current_stats(&state).await;
    respond(stats, |stats| stats.generated_at, &state)
}

async fn api_log_stats(State(state): State<AppState>) -> Response {
    let stats = current_log_stats(&state).await;
    respond(stats, |stats| stats.generated_at, &state)
}

fn respond<T, F>(result: StatsResult<Arc<T>>, generated_at: F, state: &AppState) -> Response
where
    T: Serialize,
    F: Fn(&T) -> DateTime<Utc>,
{
    match result {
        Ok(stats) => {
            let cache_control = format!("max-age={}", state.cache.ttl().as_secs());
            (
                [
                    (header::LAST_MODIFIED, http_date(&generated_at(stats.as_ref()))),
                    (header::CACHE_CONTROL, cache_control),
                ],
                Json(stats.as_ref()),
            )
                .into_response()
        }
        Err(e) if e.is_not_found() => {
            info!("No data to serve yet. {e}");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "no_data", e)
        }
        Err(e) => {
            error!("Could not compute stats. {e}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "error", e)
        }
    }
}

fn json_error(status: StatusCode, label: &str, e: StatsError) -> Response {
    let body = json!({ "status": label, "detail": e.to_string() });
    (status, Json(body)).into_response()
}
