//! StoryReel Core Library
//!
//! AI trailer pipeline: a project's scenes become still images, the images
//! become short animated clips, and the finished clips are handed to an
//! editor. This library holds the generation engine and its HTTP surface.

pub mod api;
pub mod core;

use std::path::Path;
use std::sync::{Arc, OnceLock};

use tracing::info;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::core::assets::AssetMaterializer;
use crate::core::generative::ProviderRegistry;
use crate::core::pipeline::{GenerationOptions, GenerationOrchestrator};
use crate::core::settings::AppSettings;
use crate::core::store::{RecordStore, SqliteStore};
use crate::core::CoreResult;

// =============================================================================
// Application State
// =============================================================================

/// Shared state handed to every route
#[derive(Clone, Debug)]
pub struct AppState {
    pub orchestrator: GenerationOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: GenerationOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Wires the record store, provider registry and materializer from settings
    pub fn from_settings(settings: &AppSettings, data_dir: &Path) -> CoreResult<Self> {
        let database_path = settings.database_path(data_dir);
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open(&database_path)?);
        let registry = ProviderRegistry::from_settings(settings);
        let materializer = AssetMaterializer::from_settings(settings, data_dir)?;

        info!(
            "Pipeline ready (data dir: {}, default image provider: {}, default video provider: {})",
            data_dir.display(),
            settings.generation.default_image_provider,
            settings.generation.default_video_provider
        );

        Ok(Self::new(GenerationOrchestrator::new(
            store,
            Arc::new(registry),
            Arc::new(materializer),
            GenerationOptions::from_settings(settings),
        )))
    }
}

// =============================================================================
// Logging
// =============================================================================

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Terminal stream that console log lines go to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogConsole {
    #[default]
    Stdout,
    /// Keeps stdout clean for machine-readable output
    Stderr,
}

impl LogConsole {
    fn make_writer(self) -> BoxMakeWriter {
        match self {
            Self::Stdout => BoxMakeWriter::new(std::io::stdout),
            Self::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

/// Installs stdout and daily-rolling file logging.
///
/// `RUST_LOG` overrides the `info` default. Only the first call has effect.
pub fn init_logging(log_dir: &Path) {
    init_logging_with(log_dir, LogConsole::Stdout);
}

/// [`init_logging`] with a choice of console stream
pub fn init_logging_with(log_dir: &Path, console: LogConsole) {
    if LOG_GUARD.get().is_some() {
        return;
    }
    let _ = std::fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, "storyreel.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    if LOG_GUARD.set(guard).is_err() {
        return;
    }

    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(console.make_writer())
        .with_ansi(cfg!(debug_assertions));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);

    // Already initialized in tests or by an embedding host.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
