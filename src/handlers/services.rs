use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{AlternativeSlot, AvailabilitySlot};
use crate::state::AppState;

// GET /api/services/:id/availability
#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    pub employee_id: Option<String>,
}

pub async fn check_availability(
    State(state): State<Arc<AppState>>,
    Path(service_id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<AvailabilitySlot>>, AppError> {
    let db = state.db()?;
    let slots = state.scheduler.check_availability(
        &db,
        &service_id,
        query.date,
        query.employee_id.as_deref().filter(|e| !e.is_empty()),
    )?;
    Ok(Json(slots))
}

// GET /api/services/:id/alternatives
#[derive(Deserialize)]
pub struct AlternativesQuery {
    pub date_time: NaiveDateTime,
    pub days: Option<u32>,
}

pub async fn find_alternatives(
    State(state): State<Arc<AppState>>,
    Path(service_id): Path<String>,
    Query(query): Query<AlternativesQuery>,
) -> Result<Json<Vec<AlternativeSlot>>, AppError> {
    if query.days == Some(0) {
        return Err(AppError::BadRequest("days must be at least 1".to_string()));
    }

    let db = state.db()?;
    let alternatives = state
        .scheduler
        .find_alternatives(&db, &service_id, query.date_time, query.days)?;
    Ok(Json(alternatives))
}
