//! Project and Scene Records
//!
//! A project owns an ordered list of scenes. Each scene moves through the
//! image stage and then the video stage; the project carries an aggregate
//! status derived from its scenes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{new_id, CoreError, ProjectId, SceneId, TaskId, TimeSec};

// =============================================================================
// Status Enums
// =============================================================================

/// Aggregate project lifecycle stage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Draft,
    ScenesReady,
    /// Provisional stage while an image batch runs
    GeneratingImages,
    ImagesReady,
    Animating,
    ReadyForEdit,
    Completed,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::ScenesReady => "scenes_ready",
            Self::GeneratingImages => "generating_images",
            Self::ImagesReady => "images_ready",
            Self::Animating => "animating",
            Self::ReadyForEdit => "ready_for_edit",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "scenes_ready" => Ok(Self::ScenesReady),
            "generating_images" => Ok(Self::GeneratingImages),
            "images_ready" => Ok(Self::ImagesReady),
            "animating" => Ok(Self::Animating),
            "ready_for_edit" => Ok(Self::ReadyForEdit),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::ValidationError(format!(
                "Unknown project status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-scene lifecycle stage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    #[default]
    Pending,
    ImageReady,
    Animating,
    Completed,
    Failed,
}

impl SceneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ImageReady => "image_ready",
            Self::Animating => "animating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for SceneStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "image_ready" => Ok(Self::ImageReady),
            "animating" => Ok(Self::Animating),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::ValidationError(format!(
                "Unknown scene status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SceneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video sub-state of a scene (absent until the first animation attempt)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Processing,
    Completed,
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for VideoStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::ValidationError(format!(
                "Unknown video status: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// A trailer project
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_script: Option<String>,
    /// Free-form style tag appended to image prompts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_target: Option<TimeSec>,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            title: title.into(),
            description: None,
            original_script: None,
            style: None,
            duration_target: None,
            status: ProjectStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.original_script = Some(script.into());
        self
    }
}

/// One scene of a project's breakdown
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    pub project_id: ProjectId,
    /// Position within the project, unique per project
    pub order_index: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialogue: Option<String>,
    pub image_prompt: String,
    pub duration: TimeSec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: SceneStatus,
    pub video_status: Option<VideoStatus>,
    pub video_provider: Option<String>,
    pub video_task_id: Option<TaskId>,
    pub video_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scene {
    pub fn new(
        project_id: impl Into<ProjectId>,
        order_index: i64,
        title: impl Into<String>,
        image_prompt: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            project_id: project_id.into(),
            order_index,
            title: title.into(),
            description: None,
            dialogue: None,
            image_prompt: image_prompt.into(),
            duration: 5.0,
            notes: None,
            status: SceneStatus::Pending,
            video_status: None,
            video_provider: None,
            video_task_id: None,
            video_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_dialogue(mut self, dialogue: impl Into<String>) -> Self {
        self.dialogue = Some(dialogue.into());
        self
    }

    pub fn with_duration(mut self, duration: TimeSec) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Snapshot of a scene's status fields, used to roll back a failed submission
#[derive(Clone, Debug, PartialEq)]
pub struct SceneStatusSnapshot {
    pub status: SceneStatus,
    pub video_status: Option<VideoStatus>,
}

impl From<&Scene> for SceneStatusSnapshot {
    fn from(scene: &Scene) -> Self {
        Self {
            status: scene.status,
            video_status: scene.video_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_status_round_trips_through_str() {
        for status in [
            ProjectStatus::Draft,
            ProjectStatus::GeneratingImages,
            ProjectStatus::ReadyForEdit,
        ] {
            assert_eq!(status.as_str().parse::<ProjectStatus>().unwrap(), status);
        }
        assert!("exploded".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn test_scene_status_serializes_snake_case() {
        let json = serde_json::to_string(&SceneStatus::ImageReady).unwrap();
        assert_eq!(json, "\"image_ready\"");
    }

    #[test]
    fn test_new_scene_defaults() {
        let scene = Scene::new("p1", 2, "Opening", "a foggy harbor at dawn");
        assert_eq!(scene.status, SceneStatus::Pending);
        assert!(scene.video_status.is_none());
        assert_eq!(scene.duration, 5.0);
        assert_eq!(SceneStatusSnapshot::from(&scene).status, SceneStatus::Pending);
    }
}
