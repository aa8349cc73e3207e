use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::state::AppState;

const RECENT_DEAD_LETTERS: usize = 5;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let letters = state.dead_letters.snapshot();
    let recent: Vec<_> = letters
        .iter()
        .rev()
        .take(RECENT_DEAD_LETTERS)
        .map(|letter| {
            serde_json::json!({
                "effect": letter.effect.label(),
                "booking_id": letter.effect.booking_id(),
                "attempts": letter.attempts,
                "error": letter.error,
            })
        })
        .collect();

    Json(serde_json::json!({
        "status": "ok",
        "dead_letters": letters.len(),
        "recent_dead_letters": recent,
    }))
}
