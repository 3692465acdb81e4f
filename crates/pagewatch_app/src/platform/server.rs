use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use engine_logging::{engine_error, engine_info};
use pagewatch_core::FatalError;
use pagewatch_engine::ServiceContext;

/// What the trigger handler does when a cycle hits a fatal error.
pub type FatalHandler = Arc<dyn Fn(&FatalError) + Send + Sync>;

#[derive(Clone)]
struct AppState {
    context: Arc<ServiceContext>,
    on_fatal: FatalHandler,
}

pub fn router(context: Arc<ServiceContext>, on_fatal: FatalHandler) -> Router {
    Router::new()
        .route("/timer", post(timer))
        .route("/health", get(health))
        .with_state(AppState { context, on_fatal })
}

/// Logs the error and ends the process.
pub fn exit_on_fatal() -> FatalHandler {
    Arc::new(|err: &FatalError| {
        engine_error!("Fatal: {}", err);
        std::process::exit(1);
    })
}

async fn timer(State(state): State<AppState>) -> StatusCode {
    match state.context.tick().await {
        Ok(report) => engine_info!("Timer cycle complete: {}", report),
        Err(err) => (state.on_fatal)(&err),
    }
    StatusCode::CREATED
}

async fn health() -> &'static str {
    "OK"
}
