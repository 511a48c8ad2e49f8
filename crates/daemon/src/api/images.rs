use axum::{extract::State, response::Json, routing::post, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::error::PipelineError;
use crate::pipeline::job::MAX_PROMPT_CHARS;

#[derive(Deserialize)]
pub struct ImageRequest {
    prompt: String,
}

#[derive(Serialize)]
pub struct ImageResponse {
    /// `data:image/png;base64,...`
    image_url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate-image", post(generate_image))
        .with_state(state)
}

async fn generate_image(
    State(state): State<AppState>,
    Json(request): Json<ImageRequest>,
) -> Result<Json<ImageResponse>, ApiError> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() || prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(PipelineError::validation(format!(
            "prompt must be 1 to {MAX_PROMPT_CHARS} characters"
        ))
        .into());
    }

    state.images.wait_until_ready().await?;
    let png = state.images.generate_image(prompt).await?;
    Ok(Json(ImageResponse {
        image_url: format!("data:image/png;base64,{}", STANDARD.encode(&png)),
    }))
}
