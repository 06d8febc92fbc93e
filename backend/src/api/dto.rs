//! Request and response shapes of the HTTP surface

use serde::{Deserialize, Serialize};

use crate::core::generative::{MotionType, ProviderInfo};
use crate::core::pipeline::{AnimationParams, SceneDraft};
use crate::core::{CoreResult, TimeSec};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderQuery {
    #[serde(default)]
    pub provider: Option<String>,
}

/// Query of `POST /generation/animate-scene`
#[derive(Debug, Clone, Deserialize)]
pub struct AnimateSceneQuery {
    pub scene_id: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub duration: Option<TimeSec>,
    #[serde(default)]
    pub motion_type: Option<String>,
}

impl AnimateSceneQuery {
    pub fn into_parts(self) -> (String, AnimationQuery) {
        let animation = AnimationQuery {
            provider: self.provider,
            duration: self.duration,
            motion_type: self.motion_type,
        };
        (self.scene_id, animation)
    }
}

/// Shared animation parameters; `motion_type` is parsed strictly
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnimationQuery {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub duration: Option<TimeSec>,
    #[serde(default)]
    pub motion_type: Option<String>,
}

impl AnimationQuery {
    pub fn into_params(self) -> CoreResult<AnimationParams> {
        let motion = match self.motion_type.as_deref().map(str::trim) {
            None | Some("") => MotionType::default(),
            Some(raw) => raw.parse()?,
        };
        Ok(AnimationParams {
            provider: self.provider,
            duration: self.duration,
            motion,
        })
    }
}

/// Body of `POST /projects/{id}/scenes`
#[derive(Debug, Clone, Deserialize)]
pub struct IngestScenesRequest {
    pub scenes: Vec<SceneDraft>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderListResponse {
    pub providers: Vec<ProviderInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoreError;

    #[test]
    fn test_animation_query_defaults_to_auto() {
        let params = AnimationQuery::default().into_params().unwrap();
        assert_eq!(params.motion, MotionType::Auto);
        assert!(params.duration.is_none());
    }

    #[test]
    fn test_unknown_motion_is_rejected() {
        let query = AnimationQuery {
            motion_type: Some("barrel_roll".to_string()),
            ..AnimationQuery::default()
        };
        assert!(matches!(
            query.into_params(),
            Err(CoreError::ValidationError(_))
        ));
    }
}
