//! Batch Reports and Progress Events
//!
//! Wire shapes returned by the orchestrator's batch operations and emitted by
//! the streaming image batch.

use std::path::PathBuf;

use serde::Serialize;

use crate::core::{ProjectId, SceneId, TaskId, TimeSec};

// =============================================================================
// Progress Events
// =============================================================================

/// One event of a streamed image batch.
///
/// Order per batch: `start`, then per scene `progress` followed by
/// `scene_complete` or `scene_error`, then `complete`. A pre-flight failure
/// yields a single `error` instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Start {
        total: usize,
    },
    Progress {
        current: usize,
        total: usize,
        title: String,
    },
    SceneComplete {
        /// 1-based position within the batch
        scene: usize,
        scene_id: SceneId,
        url: String,
    },
    SceneError {
        scene: usize,
        scene_id: SceneId,
        message: String,
    },
    Complete {
        generated: usize,
        total: usize,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

// =============================================================================
// Batch Reports
// =============================================================================

/// Aggregate outcome of a batch over N scenes with k successes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Completed,
    Partial,
    Failed,
}

impl BatchStatus {
    pub fn from_counts(succeeded: usize, total: usize) -> Self {
        if succeeded == 0 {
            Self::Failed
        } else if succeeded < total {
            Self::Partial
        } else {
            Self::Completed
        }
    }
}

/// Per-scene failure recorded in a batch report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneFailure {
    pub scene_id: SceneId,
    pub title: String,
    pub error: String,
    pub kind: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedImage {
    pub scene_id: SceneId,
    pub title: String,
    pub url: String,
}

/// Result of `generate_images`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageBatchReport {
    pub project_id: ProjectId,
    pub provider: String,
    pub total_scenes: usize,
    pub images_generated: usize,
    pub failed: usize,
    pub status: BatchStatus,
    pub images: Vec<GeneratedImage>,
    pub failures: Vec<SceneFailure>,
}

/// A started (or synchronously finished) animation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationTask {
    pub scene_id: SceneId,
    pub scene_title: String,
    /// Absent when the provider returned the clip synchronously
    pub task_id: Option<TaskId>,
    pub provider: String,
    /// `processing` or `completed`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

/// Result of `animate_scenes`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationBatchReport {
    pub project_id: ProjectId,
    pub provider: String,
    pub total_scenes: usize,
    pub animated: usize,
    pub failed: usize,
    pub status: BatchStatus,
    pub tasks: Vec<AnimationTask>,
    pub failures: Vec<SceneFailure>,
}

/// Result of one status check (or a completed wait) on a video job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationStatusReport {
    pub task_id: TaskId,
    pub provider: String,
    /// `queued`, `processing`, `completed`, `failed`, `rejected`, `timeout` or `error`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<SceneId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnimationStatusReport {
    pub(crate) fn new(task_id: &str, provider: &str, status: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            provider: provider.to_string(),
            status: status.to_string(),
            scene_id: None,
            video_url: None,
            progress: None,
            error: None,
        }
    }

    pub(crate) fn with_scene(mut self, scene_id: Option<SceneId>) -> Self {
        self.scene_id = scene_id;
        self
    }

    pub(crate) fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub(crate) fn with_video_url(mut self, url: impl Into<String>) -> Self {
        self.video_url = Some(url.into());
        self
    }
}

// =============================================================================
// Editor Manifest
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestScene {
    pub order: i64,
    pub title: String,
    pub video_url: String,
    pub duration: TimeSec,
    pub dialogue: Option<String>,
}

/// Hand-off document for the human editor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditorManifest {
    pub project_id: ProjectId,
    pub project_title: String,
    pub total_scenes: usize,
    pub scenes: Vec<ManifestScene>,
}

/// Result of `prepare_for_editor`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditorPackage {
    pub project_id: ProjectId,
    pub status: &'static str,
    pub total_clips: usize,
    pub manifest: EditorManifest,
    #[serde(skip)]
    pub manifest_path: PathBuf,
}
