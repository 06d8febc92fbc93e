//! Generation Routes
//!
//! Image batches (blocking and SSE), animation, job status and the editor
//! hand-off.

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::header::{self, HeaderName};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::api::dto::{AnimateSceneQuery, AnimationQuery, ProviderListResponse, ProviderQuery};
use crate::api::error::ApiResult;
use crate::core::generative::ProviderKind;
use crate::core::pipeline::{
    AnimationBatchReport, AnimationStatusReport, AnimationTask, EditorPackage, ImageBatchReport,
    ProgressEvent,
};
use crate::AppState;

pub async fn generate_images(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<ProviderQuery>,
) -> ApiResult<Json<ImageBatchReport>> {
    let report = state
        .orchestrator
        .generate_images(&project_id, query.provider.as_deref())
        .await?;
    Ok(Json(report))
}

fn sse_frame(event: &ProgressEvent) -> Event {
    match Event::default().json_data(event) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to encode progress event: {}", e);
            Event::default().data(r#"{"type":"error","message":"event encoding failed"}"#)
        }
    }
}

/// Streams image batch progress as `data: {json}` frames.
///
/// Pre-flight failures arrive as a single `error` frame on a 200 stream.
pub async fn generate_images_stream(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<ProviderQuery>,
) -> impl IntoResponse {
    info!(project_id = %project_id, "Streaming image batch");
    let events = state
        .orchestrator
        .generate_images_stream(&project_id, query.provider.as_deref())
        .map(|event| Ok::<_, Infallible>(sse_frame(&event)));

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
}

pub async fn image_providers(State(state): State<AppState>) -> Json<ProviderListResponse> {
    Json(ProviderListResponse {
        providers: state.orchestrator.list_providers(ProviderKind::Image),
    })
}

pub async fn video_providers(State(state): State<AppState>) -> Json<ProviderListResponse> {
    Json(ProviderListResponse {
        providers: state.orchestrator.list_providers(ProviderKind::Video),
    })
}

pub async fn animate_scene(
    State(state): State<AppState>,
    Query(query): Query<AnimateSceneQuery>,
) -> ApiResult<Json<AnimationTask>> {
    let (scene_id, animation) = query.into_parts();
    let params = animation.into_params()?;
    let task = state.orchestrator.animate_scene(&scene_id, &params).await?;
    Ok(Json(task))
}

pub async fn animate_scenes(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<AnimationQuery>,
) -> ApiResult<Json<AnimationBatchReport>> {
    let params = query.into_params()?;
    let report = state
        .orchestrator
        .animate_scenes(&project_id, &params)
        .await?;
    Ok(Json(report))
}

pub async fn animation_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<ProviderQuery>,
) -> ApiResult<Json<AnimationStatusReport>> {
    let report = state
        .orchestrator
        .get_animation_status(&task_id, query.provider.as_deref())
        .await?;
    Ok(Json(report))
}

pub async fn prepare_for_editor(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<EditorPackage>> {
    Ok(Json(state.orchestrator.prepare_for_editor(&project_id).await?))
}
