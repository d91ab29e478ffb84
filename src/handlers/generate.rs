use axum::{extract::State, response::Json};

use crate::{
    error::Result,
    handlers::AppState,
    middleware::session::UploadSession,
    models::GenerateResponse,
};

pub async fn generate_portrait(
    State(state): State<AppState>,
    session: UploadSession,
) -> Result<Json<GenerateResponse>> {
    let image = state.orchestrator.generate(session.id()).await?;

    Ok(Json(GenerateResponse {
        success: true,
        result_base64: image.to_data_uri(),
    }))
}
