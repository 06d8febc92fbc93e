//! Provider Registry
//!
//! Holds one adapter per known provider, records adapters that failed to
//! initialize, and resolves a capability plus optional provider name to a
//! ready adapter before any network call is made.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::provider_impls::build_provider;
use super::providers::{GenerativeProvider, ProviderCapability, ProviderId};
use super::video::MotionType;
use crate::core::settings::AppSettings;
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Provider Kind
// =============================================================================

/// Catalog grouping used for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Image,
    Video,
}

impl ProviderKind {
    fn matches(&self, id: ProviderId) -> bool {
        let descriptor = id.descriptor();
        match self {
            Self::Image => descriptor.supports(ProviderCapability::ImageGeneration),
            Self::Video => descriptor.capabilities.iter().any(|c| c.is_video()),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" | "images" => Ok(Self::Image),
            "video" | "videos" => Ok(Self::Video),
            other => Err(CoreError::ValidationError(format!(
                "Unknown provider kind '{}' (expected image or video)",
                other
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Video => f.write_str("video"),
        }
    }
}

// =============================================================================
// Listing
// =============================================================================

/// Provider entry as exposed to callers
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: ProviderId,
    pub display_name: &'static str,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
    pub is_default: bool,
    pub capabilities: &'static [ProviderCapability],
    pub max_duration_sec: Option<f64>,
    pub aspect_ratios: &'static [&'static str],
    pub resolutions: &'static [&'static str],
    pub motion_types: &'static [MotionType],
    pub note: &'static str,
}

// =============================================================================
// Registry
// =============================================================================

enum ProviderSlot {
    Ready(Arc<dyn GenerativeProvider>),
    Unavailable { reason: String },
}

/// Closed-set provider registry with deterministic defaults
pub struct ProviderRegistry {
    slots: BTreeMap<ProviderId, ProviderSlot>,
    default_image: ProviderId,
    default_video: ProviderId,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ready: Vec<_> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, ProviderSlot::Ready(_)))
            .map(|(id, _)| *id)
            .collect();
        f.debug_struct("ProviderRegistry")
            .field("ready", &ready)
            .field("default_image", &self.default_image)
            .field("default_video", &self.default_video)
            .finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(ProviderId::Dalle, ProviderId::Veo)
    }
}

impl ProviderRegistry {
    /// Creates an empty registry with the given defaults
    pub fn new(default_image: ProviderId, default_video: ProviderId) -> Self {
        Self {
            slots: BTreeMap::new(),
            default_image,
            default_video,
        }
    }

    /// Builds every known adapter from settings; failures become
    /// unavailable entries carrying the construction error
    pub fn from_settings(settings: &AppSettings) -> Self {
        let default_image = settings
            .generation
            .default_image_provider
            .parse()
            .unwrap_or(ProviderId::Dalle);
        let default_video = settings
            .generation
            .default_video_provider
            .parse()
            .unwrap_or(ProviderId::Veo);

        let mut registry = Self::new(default_image, default_video);
        for id in ProviderId::ALL {
            match build_provider(id, &settings.providers) {
                Ok(provider) => registry.register(provider),
                Err(e) => {
                    warn!("Provider {} unavailable: {}", id, e);
                    let reason = match e {
                        CoreError::ProviderUnavailable(reason) => reason,
                        other => other.to_string(),
                    };
                    registry.mark_unavailable(id, reason);
                }
            }
        }

        info!(
            "Provider registry ready: {} of {} available (defaults: image={}, video={})",
            registry.available_count(),
            ProviderId::ALL.len(),
            default_image,
            default_video
        );
        registry
    }

    /// Registers (or replaces) an adapter under its own id
    pub fn register(&mut self, provider: Arc<dyn GenerativeProvider>) {
        self.slots.insert(provider.id(), ProviderSlot::Ready(provider));
    }

    pub fn with_provider(mut self, provider: Arc<dyn GenerativeProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn mark_unavailable(&mut self, id: ProviderId, reason: impl Into<String>) {
        self.slots.insert(
            id,
            ProviderSlot::Unavailable {
                reason: reason.into(),
            },
        );
    }

    fn available_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, ProviderSlot::Ready(p) if p.is_available()))
            .count()
    }

    /// Default provider for a capability
    pub fn default_for(&self, capability: ProviderCapability) -> ProviderId {
        if capability.is_video() {
            self.default_video
        } else {
            self.default_image
        }
    }

    /// Resolves a provider for a capability.
    ///
    /// A missing or blank name selects the configured default. Unknown names,
    /// providers lacking the capability and unavailable adapters are all
    /// rejected here with distinct errors.
    pub fn resolve(
        &self,
        capability: ProviderCapability,
        name: Option<&str>,
    ) -> CoreResult<Arc<dyn GenerativeProvider>> {
        let id = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.parse::<ProviderId>()?,
            None => self.default_for(capability),
        };

        let descriptor = id.descriptor();
        if !descriptor.supports(capability) {
            return Err(CoreError::NotSupported(format!(
                "{} does not support {}",
                descriptor.display_name, capability
            )));
        }

        match self.slots.get(&id) {
            Some(ProviderSlot::Ready(provider)) if provider.is_available() => Ok(provider.clone()),
            Some(ProviderSlot::Ready(_)) => Err(CoreError::ProviderUnavailable(format!(
                "{} is not configured",
                id
            ))),
            Some(ProviderSlot::Unavailable { reason }) => {
                Err(CoreError::ProviderUnavailable(reason.clone()))
            }
            None => Err(CoreError::ProviderUnavailable(format!(
                "{} is not registered",
                id
            ))),
        }
    }

    /// Lists the image or video catalog with availability
    pub fn list_providers(&self, kind: ProviderKind) -> Vec<ProviderInfo> {
        let default = match kind {
            ProviderKind::Image => self.default_image,
            ProviderKind::Video => self.default_video,
        };

        ProviderId::ALL
            .into_iter()
            .filter(|id| kind.matches(*id))
            .map(|id| {
                let descriptor = id.descriptor();
                let (available, unavailable_reason) = match self.slots.get(&id) {
                    Some(ProviderSlot::Ready(p)) if p.is_available() => (true, None),
                    Some(ProviderSlot::Ready(_)) => (false, Some(format!("{} is not configured", id))),
                    Some(ProviderSlot::Unavailable { reason }) => (false, Some(reason.clone())),
                    None => (false, Some(format!("{} is not registered", id))),
                };
                ProviderInfo {
                    name: id,
                    display_name: descriptor.display_name,
                    available,
                    unavailable_reason,
                    is_default: id == default,
                    capabilities: descriptor.capabilities,
                    max_duration_sec: descriptor.max_duration_sec,
                    aspect_ratios: descriptor.aspect_ratios,
                    resolutions: descriptor.resolutions,
                    motion_types: descriptor.motion_types,
                    note: descriptor.note,
                }
            })
            .collect()
    }
}
