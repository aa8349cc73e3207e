use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{Booking, BookingStatus};
use crate::services::scheduler::{CreateBookingRequest, CreateOutcome, CreatedBooking};
use crate::state::AppState;

use super::run_blocking;

fn requester(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("missing x-user-id header".to_string()))
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreatedBooking>), AppError> {
    let user_id = requester(&headers)?;

    let outcome = run_blocking(state, move |state| {
        let mut db = state.db()?;
        state.scheduler.create_booking(&mut db, &user_id, &request)
    })
    .await?;

    match outcome {
        CreateOutcome::Booked(created) => Ok((StatusCode::CREATED, Json(created))),
        CreateOutcome::Unavailable {
            reason,
            alternatives,
        } => Err(AppError::Unavailable {
            reason,
            alternatives,
        }),
    }
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let db = state.db()?;
    Ok(Json(state.scheduler.get_booking(&db, &id)?))
}

// POST /api/bookings/:id/status
#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
    pub notes: Option<String>,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Booking>, AppError> {
    let status = BookingStatus::parse(&body.status)
        .ok_or_else(|| AppError::BadRequest(format!("unknown status: {}", body.status)))?;

    let booking = run_blocking(state, move |state| {
        let mut db = state.db()?;
        state
            .scheduler
            .update_booking_status(&mut db, &id, status, body.notes.as_deref())
    })
    .await?;
    Ok(Json(booking))
}

// POST /api/bookings/:id/reschedule
#[derive(Deserialize)]
pub struct RescheduleRequest {
    pub date_time: NaiveDateTime,
    pub reason: Option<String>,
}

pub async fn reschedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RescheduleRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = run_blocking(state, move |state| {
        let mut db = state.db()?;
        state
            .scheduler
            .reschedule_booking(&mut db, &id, body.date_time, body.reason.as_deref())
    })
    .await?;
    Ok(Json(booking))
}
