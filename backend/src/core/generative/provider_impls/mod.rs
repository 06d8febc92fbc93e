//! Generative Provider Implementations
//!
//! Concrete adapters for the image and video generation services.

pub mod dalle;
pub mod gemini;
pub mod higgsfield;
pub mod kling;
pub mod sora;
pub mod veo;

use std::sync::Arc;

pub use dalle::DalleProvider;
pub use gemini::GeminiImageProvider;
pub use higgsfield::HiggsfieldProvider;
pub use kling::KlingProvider;
pub use sora::SoraProvider;
pub use veo::VeoProvider;

use super::providers::{GenerativeProvider, ProviderId};
use crate::core::settings::ProviderSettings;
use crate::core::CoreResult;

fn key(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default()
}

/// Constructs the adapter for `id` from provider settings.
///
/// Fails when a required credential is missing or the HTTP client cannot
/// be built; the registry records such adapters as unavailable.
pub fn build_provider(
    id: ProviderId,
    settings: &ProviderSettings,
) -> CoreResult<Arc<dyn GenerativeProvider>> {
    let provider: Arc<dyn GenerativeProvider> = match id {
        ProviderId::Dalle => {
            let mut p = DalleProvider::new(key(&settings.openai_api_key))?;
            if let Some(url) = &settings.openai_base_url {
                p = p.with_base_url(url.clone());
            }
            if let Some(model) = &settings.dalle_model {
                p = p.with_model(model.clone());
            }
            Arc::new(p)
        }
        ProviderId::Higgsfield => {
            let mut p = HiggsfieldProvider::new(
                key(&settings.higgsfield_key_id),
                key(&settings.higgsfield_key_secret),
            )?;
            if let Some(url) = &settings.higgsfield_base_url {
                p = p.with_base_url(url.clone());
            }
            Arc::new(p)
        }
        ProviderId::Gemini => {
            let mut p = GeminiImageProvider::new(key(&settings.google_api_key))?;
            if let Some(url) = &settings.google_base_url {
                p = p.with_base_url(url.clone());
            }
            Arc::new(p)
        }
        ProviderId::Kling => {
            let mut p = KlingProvider::new(key(&settings.kling_api_key))?;
            if let Some(url) = &settings.kling_base_url {
                p = p.with_base_url(url.clone());
            }
            Arc::new(p)
        }
        ProviderId::Veo => {
            let mut p = VeoProvider::new(key(&settings.google_api_key))?;
            if let Some(url) = &settings.google_base_url {
                p = p.with_base_url(url.clone());
            }
            Arc::new(p)
        }
        ProviderId::Sora => {
            let mut p = SoraProvider::new(key(&settings.openai_api_key))?;
            if let Some(url) = &settings.openai_base_url {
                p = p.with_base_url(url.clone());
            }
            if let Some(model) = &settings.sora_model {
                p = p.with_model(model.clone());
            }
            Arc::new(p)
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoreError;

    #[test]
    fn test_build_provider_requires_credentials() {
        let settings = ProviderSettings::default();
        for id in ProviderId::ALL {
            let err = build_provider(id, &settings).err();
            assert!(matches!(err, Some(CoreError::ProviderUnavailable(_))), "{id}");
        }
    }

    #[test]
    fn test_build_provider_with_keys() {
        let settings = ProviderSettings {
            openai_api_key: Some("sk".to_string()),
            google_api_key: Some("g".to_string()),
            kling_api_key: Some("k".to_string()),
            ..ProviderSettings::default()
        };
        for id in [ProviderId::Dalle, ProviderId::Sora, ProviderId::Gemini, ProviderId::Veo, ProviderId::Kling] {
            let provider = build_provider(id, &settings).unwrap();
            assert_eq!(provider.id(), id);
            assert!(provider.is_available());
        }
        assert!(build_provider(ProviderId::Higgsfield, &settings).is_err());
    }
}
