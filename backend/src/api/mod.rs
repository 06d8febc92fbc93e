//! HTTP Surface
//!
//! axum router over the generation pipeline. Every route lives under
//! `/api/v1`; errors use the `{"detail", "kind"}` body from [`ApiError`].

pub mod dto;
mod error;
mod handlers;

pub use error::{status_for, ApiError, ApiResult, ErrorBody};

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::core::settings::ServerSettings;
use crate::AppState;

use handlers::{assets, generation, projects};

/// Builds the full application router
pub fn router(state: AppState, server: &ServerSettings) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_v1_routes())
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health))
        // Records
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route("/projects/:id", get(projects::get_project))
        .route(
            "/projects/:id/scenes",
            get(projects::list_scenes).post(projects::ingest_scenes),
        )
        .route("/projects/:id/assets", get(projects::list_project_assets))
        .route("/scenes/:id", get(projects::get_scene))
        .route("/scenes/:id/assets", get(projects::list_scene_assets))
        // Generation
        .route(
            "/generation/generate-images/:project_id",
            post(generation::generate_images),
        )
        .route(
            "/generation/generate-images-stream/:project_id",
            get(generation::generate_images_stream),
        )
        .route(
            "/generation/image-providers",
            get(generation::image_providers),
        )
        .route(
            "/generation/video-providers",
            get(generation::video_providers),
        )
        .route("/generation/animate-scene", post(generation::animate_scene))
        .route(
            "/generation/animate-scenes/:project_id",
            post(generation::animate_scenes),
        )
        .route(
            "/generation/animation-status/:task_id",
            get(generation::animation_status),
        )
        .route(
            "/generation/prepare-for-editor/:project_id",
            post(generation::prepare_for_editor),
        )
        // Files
        .route("/assets/image/:filename", get(assets::serve_image))
        .route("/assets/video/:filename", get(assets::serve_video))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o.trim() == "*") {
        return base.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(parsed))
}
