//! Route handlers grouped by surface

pub mod assets;
pub mod generation;
pub mod projects;

use axum::response::Json;

use super::dto::HealthResponse;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
