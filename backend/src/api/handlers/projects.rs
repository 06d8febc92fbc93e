//! Project, scene and asset record routes

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;

use crate::api::dto::IngestScenesRequest;
use crate::api::error::ApiResult;
use crate::core::assets::Asset;
use crate::core::pipeline::NewProject;
use crate::core::project::{Project, Scene};
use crate::AppState;

pub async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<NewProject>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let project = state.orchestrator.create_project(input)?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(state.orchestrator.list_projects()?))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Project>> {
    Ok(Json(state.orchestrator.get_project(&project_id)?))
}

pub async fn ingest_scenes(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<IngestScenesRequest>,
) -> ApiResult<(StatusCode, Json<Vec<Scene>>)> {
    let scenes = state
        .orchestrator
        .ingest_scene_breakdown(&project_id, body.scenes)?;
    Ok((StatusCode::CREATED, Json(scenes)))
}

pub async fn list_scenes(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<Scene>>> {
    Ok(Json(state.orchestrator.list_scenes(&project_id)?))
}

pub async fn list_project_assets(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<Asset>>> {
    Ok(Json(state.orchestrator.list_project_assets(&project_id)?))
}

pub async fn get_scene(
    State(state): State<AppState>,
    Path(scene_id): Path<String>,
) -> ApiResult<Json<Scene>> {
    Ok(Json(state.orchestrator.get_scene(&scene_id)?))
}

pub async fn list_scene_assets(
    State(state): State<AppState>,
    Path(scene_id): Path<String>,
) -> ApiResult<Json<Vec<Asset>>> {
    Ok(Json(state.orchestrator.list_scene_assets(&scene_id)?))
}
