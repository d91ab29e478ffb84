use axum::{extract::State, response::Json};

use crate::{error::Result, handlers::AppState, models::QuotaStatus};

pub async fn quota_status(State(state): State<AppState>) -> Result<Json<QuotaStatus>> {
    Ok(Json(state.ledger.status().await?))
}
