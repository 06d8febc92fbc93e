//! Image Generation
//!
//! Parameters and results for AI image generation.

use serde::{Deserialize, Serialize};

/// Image generation request handed to an adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Scene image prompt
    pub prompt: String,
    /// Free-form project style tag (e.g. "noir", "watercolor")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            prompt: prompt.into(),
            style: None,
            width,
            height,
        }
    }

    pub fn with_style(mut self, style: Option<String>) -> Self {
        self.style = style.filter(|s| !s.trim().is_empty());
        self
    }

    /// Reduced aspect ratio string, e.g. 1024x768 -> "4:3"
    pub fn aspect_ratio(&self) -> String {
        if self.width == 0 || self.height == 0 {
            return "1:1".to_string();
        }
        let g = gcd(self.width, self.height);
        format!("{}:{}", self.width / g, self.height / g)
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Normalized generation result: a remote URL or an inline `data:` URI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedMedia {
    pub url: String,
    /// Model that produced the media, when the provider reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl GeneratedMedia {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn is_inline(&self) -> bool {
        self.url.starts_with("data:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_reduction() {
        assert_eq!(ImageRequest::new("p", 1024, 768).aspect_ratio(), "4:3");
        assert_eq!(ImageRequest::new("p", 1920, 1080).aspect_ratio(), "16:9");
        assert_eq!(ImageRequest::new("p", 1024, 1024).aspect_ratio(), "1:1");
        assert_eq!(ImageRequest::new("p", 0, 1024).aspect_ratio(), "1:1");
    }

    #[test]
    fn test_blank_style_is_dropped() {
        let req = ImageRequest::new("p", 1024, 768).with_style(Some("  ".to_string()));
        assert!(req.style.is_none());
        let req = ImageRequest::new("p", 1024, 768).with_style(Some("noir".to_string()));
        assert_eq!(req.style.as_deref(), Some("noir"));
    }

    #[test]
    fn test_generated_media_inline_detection() {
        assert!(GeneratedMedia::new("data:image/png;base64,AAAA").is_inline());
        assert!(!GeneratedMedia::new("https://cdn/x.png").is_inline());
    }
}
