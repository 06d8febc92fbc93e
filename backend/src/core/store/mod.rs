//! Record Store
//!
//! Durable storage for projects, scenes and assets. The pipeline only talks
//! to the [`RecordStore`] trait; [`SqliteStore`] is the shipped backend.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::core::{
    assets::{Asset, AssetKind},
    project::{Project, ProjectStatus, Scene, SceneStatus, VideoStatus},
    CoreResult,
};

/// Full video-leg state of a scene, written as one unit
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneVideoState {
    pub status: SceneStatus,
    pub video_status: Option<VideoStatus>,
    pub video_provider: Option<String>,
    pub video_task_id: Option<String>,
    pub video_url: Option<String>,
}

impl From<&Scene> for SceneVideoState {
    fn from(scene: &Scene) -> Self {
        Self {
            status: scene.status,
            video_status: scene.video_status,
            video_provider: scene.video_provider.clone(),
            video_task_id: scene.video_task_id.clone(),
            video_url: scene.video_url.clone(),
        }
    }
}

/// Storage operations used by the generation pipeline
pub trait RecordStore: Send + Sync {
    // Projects
    fn insert_project(&self, project: &Project) -> CoreResult<()>;
    fn get_project(&self, project_id: &str) -> CoreResult<Option<Project>>;
    fn list_projects(&self) -> CoreResult<Vec<Project>>;
    fn set_project_status(&self, project_id: &str, status: ProjectStatus) -> CoreResult<()>;

    // Scenes
    fn insert_scenes(&self, scenes: &[Scene]) -> CoreResult<()>;
    fn get_scene(&self, scene_id: &str) -> CoreResult<Option<Scene>>;
    /// Scenes of a project ordered by `order_index`
    fn list_scenes(&self, project_id: &str) -> CoreResult<Vec<Scene>>;
    fn set_scene_status(&self, scene_id: &str, status: SceneStatus) -> CoreResult<()>;
    fn set_scene_video_state(&self, scene_id: &str, state: &SceneVideoState) -> CoreResult<()>;
    fn find_scene_by_task(&self, task_id: &str) -> CoreResult<Option<Scene>>;

    // Assets
    fn insert_asset(&self, asset: &Asset) -> CoreResult<()>;
    /// Assets of a scene, newest first
    fn list_scene_assets(&self, scene_id: &str) -> CoreResult<Vec<Asset>>;
    /// Assets of a project in scene order, newest first within a scene
    fn list_project_assets(&self, project_id: &str) -> CoreResult<Vec<Asset>>;
    /// Newest completed asset of the given kind for a scene
    fn current_asset(&self, scene_id: &str, kind: AssetKind) -> CoreResult<Option<Asset>>;
}
