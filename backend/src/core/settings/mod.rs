//! Settings Persistence System
//!
//! Provides persistent application settings with:
//! - Atomic file writes (temp file + rename)
//! - Schema validation with defaults
//! - Environment overrides for provider secrets
//!
//! Storage location: {data_dir}/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::{
    fs::atomic_write_json_pretty,
    generative::ProviderId,
    CoreError, CoreResult,
};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "settings.json.lock";

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    /// Provider credentials and endpoints
    #[serde(default)]
    pub providers: ProviderSettings,

    #[serde(default)]
    pub generation: GenerationSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            providers: ProviderSettings::default(),
            generation: GenerationSettings::default(),
        }
    }
}

impl AppSettings {
    /// Normalizes and clamps settings so persisted state is always valid.
    ///
    /// Corrects bad values instead of failing.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        if self.server.port == 0 {
            self.server.port = default_port();
        }
        if self.server.host.trim().is_empty() {
            self.server.host = default_host();
        }
        self.server.public_base_url = self
            .server
            .public_base_url
            .trim()
            .trim_end_matches('/')
            .to_string();
        if self.server.public_base_url.is_empty() {
            self.server.public_base_url = default_public_base_url();
        }

        if self.storage.uploads_dir.trim().is_empty() {
            self.storage.uploads_dir = default_uploads_dir();
        }
        if self.storage.database_file.trim().is_empty() {
            self.storage.database_file = default_database_file();
        }

        self.generation.default_image_provider = normalize_provider(
            &self.generation.default_image_provider,
            default_image_provider(),
        );
        self.generation.default_video_provider = normalize_provider(
            &self.generation.default_video_provider,
            default_video_provider(),
        );
        self.generation.image_width = self.generation.image_width.clamp(256, 4096);
        self.generation.image_height = self.generation.image_height.clamp(256, 4096);
        self.generation.default_clip_duration =
            clamp_f64(self.generation.default_clip_duration, 1.0, 10.0);
        self.generation.download_timeout_secs =
            self.generation.download_timeout_secs.clamp(5, 300);

        self.providers.normalize();
    }

    /// Applies secrets and deployment overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup (environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.providers.openai_api_key = Some(v);
        }
        if let Some(v) = get("GOOGLE_AI_API_KEY") {
            self.providers.google_api_key = Some(v);
        }
        if let Some(v) = get("HIGGSFIELD_API_KEY_ID") {
            self.providers.higgsfield_key_id = Some(v);
        }
        if let Some(v) = get("HIGGSFIELD_API_KEY_SECRET") {
            self.providers.higgsfield_key_secret = Some(v);
        }
        if let Some(v) = get("KLING_API_KEY") {
            self.providers.kling_api_key = Some(v);
        }
        if let Some(v) = get("KLING_API_URL") {
            self.providers.kling_base_url = Some(v);
        }
        if let Some(v) = get("STORYREEL_PUBLIC_BASE_URL") {
            self.server.public_base_url = v;
        }
        if let Some(v) = get("API_HOST") {
            self.server.host = v;
        }
        if let Some(port) = get("API_PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(v) = get("CORS_ORIGINS") {
            self.server.cors_origins = v
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        self.normalize();
    }

    /// Absolute uploads root for a data directory
    pub fn uploads_root(&self, data_dir: &Path) -> PathBuf {
        resolve_under(data_dir, &self.storage.uploads_dir)
    }

    /// Absolute database path for a data directory
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        resolve_under(data_dir, &self.storage.database_file)
    }
}

fn resolve_under(base: &Path, value: &str) -> PathBuf {
    let p = PathBuf::from(value);
    if p.is_absolute() {
        p
    } else {
        base.join(p)
    }
}

fn clamp_f64(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return min;
    }
    value.clamp(min, max)
}

fn normalize_provider(value: &str, fallback: String) -> String {
    match value.trim().to_ascii_lowercase().parse::<ProviderId>() {
        Ok(id) => id.as_str().to_string(),
        Err(_) => fallback,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// =============================================================================
// Sections
// =============================================================================

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base used to build asset retrieval URLs
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Allowed browser origins (empty = allow any)
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: default_public_base_url(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_public_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

/// On-disk layout, relative paths resolve under the data directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSettings {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,

    #[serde(default = "default_database_file")]
    pub database_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            database_file: default_database_file(),
        }
    }
}

fn default_uploads_dir() -> String {
    "uploads".to_string()
}

fn default_database_file() -> String {
    "storyreel.db".to_string()
}

/// Provider credentials and endpoint overrides
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default)]
    pub openai_base_url: Option<String>,

    /// Image model for the OpenAI images API (dall-e-2 or dall-e-3)
    #[serde(default)]
    pub dalle_model: Option<String>,

    #[serde(default)]
    pub google_api_key: Option<String>,

    #[serde(default)]
    pub google_base_url: Option<String>,

    #[serde(default)]
    pub higgsfield_key_id: Option<String>,

    #[serde(default)]
    pub higgsfield_key_secret: Option<String>,

    #[serde(default)]
    pub higgsfield_base_url: Option<String>,

    #[serde(default)]
    pub kling_api_key: Option<String>,

    #[serde(default)]
    pub kling_base_url: Option<String>,

    #[serde(default)]
    pub sora_model: Option<String>,
}

impl ProviderSettings {
    fn normalize(&mut self) {
        self.openai_api_key = non_empty(self.openai_api_key.take());
        self.openai_base_url = non_empty(self.openai_base_url.take());
        self.dalle_model = non_empty(self.dalle_model.take());
        self.google_api_key = non_empty(self.google_api_key.take());
        self.google_base_url = non_empty(self.google_base_url.take());
        self.higgsfield_key_id = non_empty(self.higgsfield_key_id.take());
        self.higgsfield_key_secret = non_empty(self.higgsfield_key_secret.take());
        self.higgsfield_base_url = non_empty(self.higgsfield_base_url.take());
        self.kling_api_key = non_empty(self.kling_api_key.take());
        self.kling_base_url = non_empty(self.kling_base_url.take());
        self.sora_model = non_empty(self.sora_model.take());
    }
}

/// Generation defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    #[serde(default = "default_image_provider")]
    pub default_image_provider: String,

    #[serde(default = "default_video_provider")]
    pub default_video_provider: String,

    #[serde(default = "default_image_width")]
    pub image_width: u32,

    #[serde(default = "default_image_height")]
    pub image_height: u32,

    /// Clip duration when a request does not specify one (seconds)
    #[serde(default = "default_clip_duration")]
    pub default_clip_duration: f64,

    /// Timeout for fetching remote provider results (seconds)
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            default_image_provider: default_image_provider(),
            default_video_provider: default_video_provider(),
            image_width: default_image_width(),
            image_height: default_image_height(),
            default_clip_duration: default_clip_duration(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

fn default_image_provider() -> String {
    ProviderId::Dalle.as_str().to_string()
}

fn default_video_provider() -> String {
    ProviderId::Veo.as_str().to_string()
}

fn default_image_width() -> u32 {
    1024
}

fn default_image_height() -> u32 {
    768
}

fn default_clip_duration() -> f64 {
    5.0
}

fn default_download_timeout() -> u64 {
    30
}

// =============================================================================
// Data Directory
// =============================================================================

/// Resolves the data directory: explicit value, `STORYREEL_DATA_DIR`,
/// the platform data dir, then `./.storyreel`.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir;
    }
    if let Some(dir) = std::env::var_os("STORYREEL_DATA_DIR").filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|d| d.join("storyreel"))
        .unwrap_or_else(|| PathBuf::from(".storyreel"))
}

// =============================================================================
// Settings Manager
// =============================================================================

/// Settings manager for loading and saving settings
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager with the given data directory
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            settings_path: data_dir.join(SETTINGS_FILE),
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file).map_err(|e| {
                CoreError::Internal(format!("Failed to lock settings file (exclusive): {}", e))
            })?;
        } else {
            fs2::FileExt::lock_shared(&lock_file).map_err(|e| {
                CoreError::Internal(format!("Failed to lock settings file (shared): {}", e))
            })?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> &PathBuf {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if the file is missing or invalid
    pub fn load(&self) -> AppSettings {
        let result = self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(AppSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<AppSettings>(&content)?;

            if settings.version < SETTINGS_VERSION {
                info!(
                    "Migrating settings from version {} to {}",
                    settings.version, SETTINGS_VERSION
                );
                settings.version = SETTINGS_VERSION;
            }

            settings.normalize();
            Ok(settings)
        });

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                AppSettings::default()
            }
        }
    }

    /// Loads settings then applies environment overrides
    pub fn load_with_env(&self) -> AppSettings {
        let mut settings = self.load();
        settings.apply_env_overrides();
        settings
    }

    /// Save settings to disk using atomic write (temp file + rename)
    pub fn save(&self, settings: &AppSettings) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();
            atomic_write_json_pretty(&self.settings_path, &normalized)?;
            info!("Settings saved to {:?}", self.settings_path);
            Ok(normalized)
        })
    }
}
