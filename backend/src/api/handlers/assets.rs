//! Stored file serving

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;

use crate::api::error::ApiResult;
use crate::core::assets::{content_type_for, AssetKind};
use crate::AppState;

const IMMUTABLE_CACHE: &str = "public, max-age=31536000";

async fn serve(state: &AppState, kind: AssetKind, filename: &str) -> ApiResult<impl IntoResponse> {
    let bytes = state
        .orchestrator
        .materializer()
        .read_stored(kind, filename)
        .await?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(filename)),
            (header::CACHE_CONTROL, IMMUTABLE_CACHE),
        ],
        bytes,
    ))
}

pub async fn serve_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<impl IntoResponse> {
    serve(&state, AssetKind::Image, &filename).await
}

pub async fn serve_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<impl IntoResponse> {
    serve(&state, AssetKind::Video, &filename).await
}
