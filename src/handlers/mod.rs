pub mod bookings;
pub mod health;
pub mod services;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::errors::BookingError;
use crate::state::AppState;

/// Runs a database write off the async workers. Write paths may wait on the
/// connection mutex and sleep between conflict retries.
async fn run_blocking<T, F>(state: Arc<AppState>, op: F) -> Result<T, BookingError>
where
    F: FnOnce(&AppState) -> Result<T, BookingError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&state))
        .await
        .map_err(|e| BookingError::Persistence(anyhow::anyhow!("blocking task failed: {e}")))?
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/bookings/:id/status", post(bookings::update_status))
        .route("/api/bookings/:id/reschedule", post(bookings::reschedule))
        .route(
            "/api/services/:id/availability",
            get(services::check_availability),
        )
        .route(
            "/api/services/:id/alternatives",
            get(services::find_alternatives),
        )
        .with_state(state)
}
