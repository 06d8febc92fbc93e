//! Asset Model Definitions
//!
//! Durable records of materialized media attached to scenes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{new_id, AssetId, CoreError, SceneId};

/// Asset type enumeration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Video,
    /// Recorded only; the pipeline never generates audio
    Audio,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl FromStr for AssetKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(CoreError::ValidationError(format!(
                "Unknown asset type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asset processing status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Pending,
    #[default]
    Completed,
    Failed,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for AssetStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::ValidationError(format!(
                "Unknown asset status: {}",
                other
            ))),
        }
    }
}

/// A generated media file owned by a scene.
///
/// Assets are append-only: regenerating a scene adds a new row and the
/// newest completed asset of a kind is the current one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub scene_id: SceneId,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    /// Retrieval URL served by the asset routes
    pub url: String,
    pub status: AssetStatus,
    pub metadata: AssetMetadata,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    pub fn completed(
        scene_id: impl Into<SceneId>,
        kind: AssetKind,
        url: impl Into<String>,
        metadata: AssetMetadata,
    ) -> Self {
        Self {
            id: new_id(),
            scene_id: scene_id.into(),
            kind,
            url: url.into(),
            status: AssetStatus::Completed,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Metadata stored alongside an asset row (JSON column)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// Stored filename under the kind's upload root
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_title: Option<String>,
    /// Provider that produced the media
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_serializes_kind_as_type() {
        let asset = Asset::completed(
            "s1",
            AssetKind::Image,
            "http://localhost:8000/api/v1/assets/image/a.png",
            AssetMetadata {
                filename: "a.png".into(),
                ..Default::default()
            },
        );
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["metadata"]["filename"], "a.png");
        assert!(json["metadata"].get("source").is_none());
    }

    #[test]
    fn test_asset_kind_names() {
        for kind in [AssetKind::Image, AssetKind::Video, AssetKind::Audio] {
            assert_eq!(kind.as_str().parse::<AssetKind>().unwrap(), kind);
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.as_str());
        }
        assert!("music".parse::<AssetKind>().is_err());
    }

    #[test]
    fn test_metadata_tolerates_missing_fields() {
        let meta: AssetMetadata = serde_json::from_str(r#"{"filename":"x.mp4"}"#).unwrap();
        assert_eq!(meta.bytes, 0);
        assert!(meta.task_id.is_none());
    }
}
