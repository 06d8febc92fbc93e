//! Script Breakdown
//!
//! The script-to-scenes analysis is an external collaborator; the pipeline
//! only defines its interface and persists its output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::project::Scene;
use crate::core::{CoreError, CoreResult, ProjectId, TimeSec};

/// One scene as produced by a breakdown, before it is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SceneDraft {
    pub title: String,
    pub image_prompt: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dialogue: Option<String>,
    #[serde(default)]
    pub duration: Option<TimeSec>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SceneDraft {
    pub fn new(title: impl Into<String>, image_prompt: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            image_prompt: image_prompt.into(),
            description: None,
            dialogue: None,
            duration: None,
            notes: None,
        }
    }

    pub fn with_dialogue(mut self, dialogue: impl Into<String>) -> Self {
        self.dialogue = Some(dialogue.into());
        self
    }

    pub fn with_duration(mut self, duration: TimeSec) -> Self {
        self.duration = Some(duration);
        self
    }

    fn validate(&self, position: usize) -> CoreResult<()> {
        if self.title.trim().is_empty() {
            return Err(CoreError::ValidationError(format!(
                "Scene {} has an empty title",
                position
            )));
        }
        if self.image_prompt.trim().is_empty() {
            return Err(CoreError::ValidationError(format!(
                "Scene {} has an empty image prompt",
                position
            )));
        }
        if let Some(d) = self.duration {
            if !d.is_finite() || d <= 0.0 {
                return Err(CoreError::ValidationError(format!(
                    "Scene {} has an invalid duration: {}",
                    position, d
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn into_scene(self, project_id: &ProjectId, order_index: i64) -> Scene {
        let mut scene = Scene::new(project_id.clone(), order_index, self.title, self.image_prompt);
        scene.description = self.description;
        scene.dialogue = self.dialogue;
        scene.notes = self.notes;
        if let Some(d) = self.duration {
            scene.duration = d;
        }
        scene
    }
}

/// Validates an ordered breakdown before it is stored
pub fn validate_breakdown(drafts: &[SceneDraft]) -> CoreResult<()> {
    if drafts.is_empty() {
        return Err(CoreError::ValidationError(
            "Scene breakdown is empty".to_string(),
        ));
    }
    drafts
        .iter()
        .enumerate()
        .try_for_each(|(i, draft)| draft.validate(i + 1))
}

/// Input handed to a [`ScriptAnalyzer`]
#[derive(Debug, Clone, PartialEq)]
pub struct BreakdownRequest {
    pub script: String,
    pub style: Option<String>,
    pub reference_prompt: Option<String>,
    pub duration_target: Option<TimeSec>,
}

/// Turns a script into an ordered scene list
#[async_trait]
pub trait ScriptAnalyzer: Send + Sync {
    async fn analyze_script(&self, request: &BreakdownRequest) -> CoreResult<Vec<SceneDraft>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_breakdown_rejected() {
        assert!(matches!(
            validate_breakdown(&[]),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn test_blank_prompt_rejected() {
        let drafts = vec![
            SceneDraft::new("Opening", "a lighthouse"),
            SceneDraft::new("Storm", "  "),
        ];
        let err = validate_breakdown(&drafts).unwrap_err();
        assert!(err.to_string().contains("Scene 2"));
    }

    #[test]
    fn test_into_scene_keeps_fields() {
        let scene = SceneDraft::new("Opening", "a lighthouse")
            .with_dialogue("Who's there?")
            .with_duration(4.0)
            .into_scene(&"p1".to_string(), 7);
        assert_eq!(scene.order_index, 7);
        assert_eq!(scene.duration, 4.0);
        assert_eq!(scene.dialogue.as_deref(), Some("Who's there?"));
    }

    #[test]
    fn test_draft_deserializes_with_defaults() {
        let draft: SceneDraft =
            serde_json::from_str(r#"{"title":"A","image_prompt":"b"}"#).unwrap();
        assert!(draft.duration.is_none());
    }
}
