//! Generation Orchestrator
//!
//! Runs image and animation batches over a project's scenes with per-scene
//! failure isolation, finalizes video jobs, and hands finished projects to
//! the editor.
//!
//! Batch rules:
//! - pre-flight failures (missing project, no eligible scenes, unresolvable
//!   provider, invalid parameters) are returned before any status write
//! - scenes run sequentially in `order_index` order; one scene failing never
//!   stops the batch
//! - with zero successes the project returns to its pre-batch status

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::breakdown::{validate_breakdown, BreakdownRequest, SceneDraft, ScriptAnalyzer};
use super::events::{
    AnimationBatchReport, AnimationStatusReport, AnimationTask, BatchStatus, EditorManifest,
    EditorPackage, GeneratedImage, ImageBatchReport, ManifestScene, ProgressEvent, SceneFailure,
};
use crate::core::assets::{
    Asset, AssetKind, AssetMaterializer, AssetMetadata, MaterializeTarget, StoredMedia,
    content_type_for,
};
use crate::core::fs::{atomic_write_json_pretty, validate_path_id_component};
use crate::core::generative::video::validate_clip_duration;
use crate::core::generative::{
    poll_until_terminal, DownloadAuth, FailureKind, GeneratedMedia, GenerativeProvider, ImageRequest,
    MotionType, PollObservation, ProviderCapability, ProviderFailure, ProviderInfo, ProviderKind,
    ProviderRegistry, ProviderResult, SourceImage, VideoJobHandle, VideoJobStatus, VideoRequest,
    VideoSubmission,
};
use crate::core::project::{Project, ProjectStatus, Scene, SceneStatus, VideoStatus};
use crate::core::settings::AppSettings;
use crate::core::store::{RecordStore, SceneVideoState};
use crate::core::{CoreError, CoreResult, TimeSec};

/// Buffered progress events per streamed batch
const EVENT_BUFFER: usize = 32;

// =============================================================================
// Options & Requests
// =============================================================================

/// Generation defaults taken from settings
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub image_width: u32,
    pub image_height: u32,
    pub default_clip_duration: TimeSec,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            image_width: 1024,
            image_height: 768,
            default_clip_duration: 5.0,
        }
    }
}

impl GenerationOptions {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            image_width: settings.generation.image_width,
            image_height: settings.generation.image_height,
            default_clip_duration: settings.generation.default_clip_duration,
        }
    }
}

/// Parameters of an animation request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationParams {
    /// Provider name; the configured default when absent
    pub provider: Option<String>,
    /// Clip length; the configured default when absent
    pub duration: Option<TimeSec>,
    pub motion: MotionType,
}

impl AnimationParams {
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_duration(mut self, duration: TimeSec) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_motion(mut self, motion: MotionType) -> Self {
        self.motion = motion;
        self
    }
}

/// Fields accepted when creating a project
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProject {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "original_script")]
    pub script: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub duration_target: Option<TimeSec>,
}

// =============================================================================
// Helpers
// =============================================================================

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one adapter call, converting a panic into a failed result
async fn guarded<T>(
    label: &str,
    call: impl Future<Output = ProviderResult<T>>,
) -> ProviderResult<T> {
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("{} panicked: {}", label, message);
            Err(ProviderFailure::failed(format!("{} panicked: {}", label, message)))
        }
    }
}

async fn poll_once(
    provider: &dyn GenerativeProvider,
    handle: &VideoJobHandle,
) -> PollObservation<String> {
    PollObservation::from_video_poll(guarded("video poll", provider.poll_video(handle)).await)
}

async fn emit(events: Option<&mpsc::Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = events {
        if tx.send(event).await.is_err() {
            debug!("Progress receiver dropped; batch continues");
        }
    }
}

fn target(scene: &Scene) -> MaterializeTarget<'_> {
    MaterializeTarget {
        project_id: &scene.project_id,
        scene_id: &scene.id,
        order_index: scene.order_index,
    }
}

fn scene_failure(scene: &Scene, error: &CoreError) -> SceneFailure {
    SceneFailure {
        scene_id: scene.id.clone(),
        title: scene.title.clone(),
        error: error.to_string(),
        kind: error.kind(),
    }
}

// =============================================================================
// GenerationOrchestrator
// =============================================================================

/// Drives generation over the record store, provider registry and
/// materializer. Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    store: Arc<dyn RecordStore>,
    registry: Arc<ProviderRegistry>,
    materializer: Arc<AssetMaterializer>,
    options: GenerationOptions,
}

impl std::fmt::Debug for GenerationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationOrchestrator")
            .field("registry", &self.registry)
            .field("materializer", &self.materializer)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl GenerationOrchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: Arc<ProviderRegistry>,
        materializer: Arc<AssetMaterializer>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            store,
            registry,
            materializer,
            options,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn materializer(&self) -> &AssetMaterializer {
        &self.materializer
    }

    pub fn list_providers(&self, kind: ProviderKind) -> Vec<ProviderInfo> {
        self.registry.list_providers(kind)
    }

    // =========================================================================
    // Records
    // =========================================================================

    fn require_project(&self, project_id: &str) -> CoreResult<Project> {
        self.store
            .get_project(project_id)?
            .ok_or_else(|| CoreError::ProjectNotFound(project_id.to_string()))
    }

    fn require_scene(&self, scene_id: &str) -> CoreResult<Scene> {
        self.store
            .get_scene(scene_id)?
            .ok_or_else(|| CoreError::SceneNotFound(scene_id.to_string()))
    }

    pub fn create_project(&self, input: NewProject) -> CoreResult<Project> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(CoreError::ValidationError(
                "Project title is required".to_string(),
            ));
        }
        if let Some(target) = input.duration_target {
            if !target.is_finite() || target <= 0.0 {
                return Err(CoreError::ValidationError(format!(
                    "Invalid duration target: {}",
                    target
                )));
            }
        }

        let mut project = Project::new(title);
        project.description = input.description;
        project.original_script = input.script;
        project.style = input.style;
        project.duration_target = input.duration_target;

        self.store.insert_project(&project)?;
        info!("Created project {} ({})", project.id, project.title);
        Ok(project)
    }

    pub fn list_projects(&self) -> CoreResult<Vec<Project>> {
        self.store.list_projects()
    }

    pub fn get_project(&self, project_id: &str) -> CoreResult<Project> {
        self.require_project(project_id)
    }

    pub fn get_scene(&self, scene_id: &str) -> CoreResult<Scene> {
        self.require_scene(scene_id)
    }

    pub fn list_scenes(&self, project_id: &str) -> CoreResult<Vec<Scene>> {
        self.require_project(project_id)?;
        self.store.list_scenes(project_id)
    }

    pub fn list_scene_assets(&self, scene_id: &str) -> CoreResult<Vec<Asset>> {
        self.require_scene(scene_id)?;
        self.store.list_scene_assets(scene_id)
    }

    pub fn list_project_assets(&self, project_id: &str) -> CoreResult<Vec<Asset>> {
        self.require_project(project_id)?;
        self.store.list_project_assets(project_id)
    }

    /// Persists a scene breakdown after any existing scenes and marks the
    /// project `scenes_ready`
    pub fn ingest_scene_breakdown(
        &self,
        project_id: &str,
        drafts: Vec<SceneDraft>,
    ) -> CoreResult<Vec<Scene>> {
        let project = self.require_project(project_id)?;
        validate_breakdown(&drafts)?;

        let next_order = self
            .store
            .list_scenes(project_id)?
            .iter()
            .map(|s| s.order_index)
            .max()
            .map_or(1, |max| max + 1);

        let scenes: Vec<Scene> = drafts
            .into_iter()
            .enumerate()
            .map(|(i, draft)| draft.into_scene(&project.id, next_order + i as i64))
            .collect();

        self.store.insert_scenes(&scenes)?;
        self.store
            .set_project_status(project_id, ProjectStatus::ScenesReady)?;

        info!(
            project_id = %project_id,
            count = scenes.len(),
            "Ingested scene breakdown"
        );
        Ok(scenes)
    }

    /// Runs `analyzer` over the project's script and ingests the result
    pub async fn analyze_and_ingest(
        &self,
        project_id: &str,
        analyzer: &dyn ScriptAnalyzer,
        reference_prompt: Option<String>,
    ) -> CoreResult<Vec<Scene>> {
        let project = self.require_project(project_id)?;
        let script = project
            .original_script
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                CoreError::PreconditionFailed("Project has no script to analyze".to_string())
            })?;

        let request = BreakdownRequest {
            script,
            style: project.style.clone(),
            reference_prompt,
            duration_target: project.duration_target,
        };
        let drafts = analyzer.analyze_script(&request).await?;
        self.ingest_scene_breakdown(project_id, drafts)
    }

    async fn persist_asset(&self, asset: &Asset, stored: &StoredMedia) -> CoreResult<()> {
        if let Err(e) = self.store.insert_asset(asset) {
            let _ = tokio::fs::remove_file(&stored.path).await;
            return Err(e);
        }
        Ok(())
    }

    // =========================================================================
    // Image Batch
    // =========================================================================

    /// Generates one image per scene of the project
    pub async fn generate_images(
        &self,
        project_id: &str,
        provider: Option<&str>,
    ) -> CoreResult<ImageBatchReport> {
        self.run_image_batch(project_id, provider, None).await
    }

    /// Streaming variant of [`generate_images`](Self::generate_images).
    ///
    /// The batch runs on a spawned task; dropping the stream stops delivery
    /// but not the batch.
    pub fn generate_images_stream(
        &self,
        project_id: &str,
        provider: Option<&str>,
    ) -> ReceiverStream<ProgressEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let orchestrator = self.clone();
        let project_id = project_id.to_string();
        let provider = provider.map(str::to_string);

        tokio::spawn(async move {
            if let Err(e) = orchestrator
                .run_image_batch(&project_id, provider.as_deref(), Some(&tx))
                .await
            {
                warn!(project_id = %project_id, "Image batch aborted: {}", e);
                emit(
                    Some(&tx),
                    ProgressEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        });

        ReceiverStream::new(rx)
    }

    async fn run_image_batch(
        &self,
        project_id: &str,
        provider_name: Option<&str>,
        events: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> CoreResult<ImageBatchReport> {
        let project = self.require_project(project_id)?;
        let scenes = self.store.list_scenes(project_id)?;
        if scenes.is_empty() {
            return Err(CoreError::PreconditionFailed(
                "Project has no scenes. Ingest a scene breakdown first.".to_string(),
            ));
        }
        let provider = self
            .registry
            .resolve(ProviderCapability::ImageGeneration, provider_name)?;

        let total = scenes.len();
        let previous_status = project.status;
        self.store
            .set_project_status(project_id, ProjectStatus::GeneratingImages)?;
        info!(
            project_id = %project_id,
            provider = provider.name(),
            total,
            "Image batch started"
        );
        emit(events, ProgressEvent::Start { total }).await;

        let mut images = Vec::new();
        let mut failures = Vec::new();

        for (index, scene) in scenes.iter().enumerate() {
            let position = index + 1;
            emit(
                events,
                ProgressEvent::Progress {
                    current: position,
                    total,
                    title: scene.title.clone(),
                },
            )
            .await;

            match self
                .generate_scene_image(&project, scene, provider.as_ref())
                .await
            {
                Ok(url) => {
                    emit(
                        events,
                        ProgressEvent::SceneComplete {
                            scene: position,
                            scene_id: scene.id.clone(),
                            url: url.clone(),
                        },
                    )
                    .await;
                    images.push(GeneratedImage {
                        scene_id: scene.id.clone(),
                        title: scene.title.clone(),
                        url,
                    });
                }
                Err(e) => {
                    warn!(
                        project_id = %project_id,
                        scene_id = %scene.id,
                        provider = provider.name(),
                        attempt = position,
                        "Scene image failed: {}",
                        e
                    );
                    emit(
                        events,
                        ProgressEvent::SceneError {
                            scene: position,
                            scene_id: scene.id.clone(),
                            message: e.to_string(),
                        },
                    )
                    .await;
                    failures.push(scene_failure(scene, &e));
                }
            }
        }

        let generated = images.len();
        let next_status = if generated == 0 {
            previous_status
        } else {
            ProjectStatus::ImagesReady
        };
        self.store.set_project_status(project_id, next_status)?;

        info!(
            project_id = %project_id,
            generated,
            total,
            "Image batch finished"
        );
        emit(events, ProgressEvent::Complete { generated, total }).await;

        Ok(ImageBatchReport {
            project_id: project_id.to_string(),
            provider: provider.id().to_string(),
            total_scenes: total,
            images_generated: generated,
            failed: failures.len(),
            status: BatchStatus::from_counts(generated, total),
            images,
            failures,
        })
    }

    async fn generate_scene_image(
        &self,
        project: &Project,
        scene: &Scene,
        provider: &dyn GenerativeProvider,
    ) -> CoreResult<String> {
        let request = ImageRequest::new(
            scene.image_prompt.clone(),
            self.options.image_width,
            self.options.image_height,
        )
        .with_style(project.style.clone());

        debug!(
            scene_id = %scene.id,
            provider = provider.name(),
            "Requesting scene image"
        );
        let media = guarded("image generation", provider.generate_image(&request)).await?;

        let stored = self
            .materializer
            .materialize(&media.url, AssetKind::Image, target(scene))
            .await?;
        let asset = Asset::completed(
            scene.id.clone(),
            AssetKind::Image,
            stored.url.clone(),
            AssetMetadata {
                filename: stored.filename.clone(),
                scene_title: Some(scene.title.clone()),
                source: Some(provider.id().to_string()),
                model: media.model.clone(),
                task_id: None,
                bytes: stored.bytes,
            },
        );
        self.persist_asset(&asset, &stored).await?;
        self.store
            .set_scene_status(&scene.id, SceneStatus::ImageReady)?;

        Ok(stored.url)
    }

    // =========================================================================
    // Animation
    // =========================================================================

    fn resolve_video(
        &self,
        params: &AnimationParams,
    ) -> CoreResult<(Arc<dyn GenerativeProvider>, TimeSec)> {
        let duration = params
            .duration
            .unwrap_or(self.options.default_clip_duration);
        validate_clip_duration(duration)?;

        let provider = self
            .registry
            .resolve(ProviderCapability::ImageToVideo, params.provider.as_deref())?;
        provider
            .descriptor()
            .check_video_request(duration, params.motion)?;

        Ok((provider, duration))
    }

    /// Starts animating one scene from its current image.
    ///
    /// Provider failures are returned after the scene's status is restored.
    pub async fn animate_scene(
        &self,
        scene_id: &str,
        params: &AnimationParams,
    ) -> CoreResult<AnimationTask> {
        let scene = self.require_scene(scene_id)?;
        let image = self
            .store
            .current_asset(scene_id, AssetKind::Image)?
            .ok_or_else(|| {
                CoreError::PreconditionFailed(
                    "Scene does not have an image. Generate images first.".to_string(),
                )
            })?;
        let (provider, duration) = self.resolve_video(params)?;

        self.start_animation(&scene, &image, provider.as_ref(), duration, params.motion)
            .await
    }

    /// Starts animating every scene of the project that has an image
    pub async fn animate_scenes(
        &self,
        project_id: &str,
        params: &AnimationParams,
    ) -> CoreResult<AnimationBatchReport> {
        let project = self.require_project(project_id)?;

        let mut eligible = Vec::new();
        for scene in self.store.list_scenes(project_id)? {
            if let Some(image) = self.store.current_asset(&scene.id, AssetKind::Image)? {
                eligible.push((scene, image));
            }
        }
        if eligible.is_empty() {
            return Err(CoreError::PreconditionFailed(
                "No scenes with images found. Generate images first.".to_string(),
            ));
        }
        let (provider, duration) = self.resolve_video(params)?;

        let total = eligible.len();
        let previous_status = project.status;
        self.store
            .set_project_status(project_id, ProjectStatus::Animating)?;
        info!(
            project_id = %project_id,
            provider = provider.name(),
            total,
            "Animation batch started"
        );

        let mut tasks = Vec::new();
        let mut failures = Vec::new();

        for (index, (scene, image)) in eligible.iter().enumerate() {
            match self
                .start_animation(scene, image, provider.as_ref(), duration, params.motion)
                .await
            {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    warn!(
                        project_id = %project_id,
                        scene_id = %scene.id,
                        provider = provider.name(),
                        attempt = index + 1,
                        "Scene animation failed: {}",
                        e
                    );
                    failures.push(scene_failure(scene, &e));
                }
            }
        }

        let animated = tasks.len();
        if animated == 0 {
            self.store.set_project_status(project_id, previous_status)?;
        }
        info!(
            project_id = %project_id,
            animated,
            total,
            "Animation batch finished"
        );

        Ok(AnimationBatchReport {
            project_id: project_id.to_string(),
            provider: provider.id().to_string(),
            total_scenes: total,
            animated,
            failed: failures.len(),
            status: BatchStatus::from_counts(animated, total),
            tasks,
            failures,
        })
    }

    async fn build_video_request(
        &self,
        image: &Asset,
        duration: TimeSec,
        motion: MotionType,
    ) -> VideoRequest {
        let filename = &image.metadata.filename;
        let mut source = SourceImage::from_url(image.url.clone());
        match self.materializer.read_stored(AssetKind::Image, filename).await {
            Ok(bytes) => source = source.with_bytes(bytes, content_type_for(filename)),
            Err(e) => warn!("Source image {} is not readable locally: {}", filename, e),
        }
        VideoRequest::image_to_video(image.url.clone(), duration, motion).with_source_image(source)
    }

    async fn start_animation(
        &self,
        scene: &Scene,
        image: &Asset,
        provider: &dyn GenerativeProvider,
        duration: TimeSec,
        motion: MotionType,
    ) -> CoreResult<AnimationTask> {
        let request = self.build_video_request(image, duration, motion).await;
        request.validate()?;

        let provider_name = provider.id().to_string();
        let snapshot = SceneVideoState::from(scene);
        self.store.set_scene_video_state(
            &scene.id,
            &SceneVideoState {
                status: SceneStatus::Animating,
                video_status: Some(VideoStatus::Processing),
                video_provider: Some(provider_name.clone()),
                video_task_id: None,
                video_url: None,
            },
        )?;

        let submission = match guarded("video submission", provider.submit_video(&request)).await
        {
            Ok(submission) => submission,
            Err(failure) => {
                self.restore_video_state(&scene.id, &snapshot);
                return Err(failure.into());
            }
        };

        match submission {
            VideoSubmission::Queued(handle) => {
                let stored = self.store.set_scene_video_state(
                    &scene.id,
                    &SceneVideoState {
                        status: SceneStatus::Animating,
                        video_status: Some(VideoStatus::Processing),
                        video_provider: Some(provider_name.clone()),
                        video_task_id: Some(handle.task_id.clone()),
                        video_url: None,
                    },
                );
                if let Err(e) = stored {
                    self.restore_video_state(&scene.id, &snapshot);
                    return Err(e);
                }
                info!(
                    scene_id = %scene.id,
                    provider = %provider_name,
                    task_id = %handle.task_id,
                    "Animation submitted"
                );
                Ok(AnimationTask {
                    scene_id: scene.id.clone(),
                    scene_title: scene.title.clone(),
                    task_id: Some(handle.task_id),
                    provider: provider_name,
                    status: VideoStatus::Processing.as_str().to_string(),
                    video_url: None,
                })
            }
            VideoSubmission::Completed(media) => {
                let auth = provider.download_auth();
                match self
                    .finalize_video(scene, &provider_name, None, &media, auth.as_ref())
                    .await
                {
                    Ok(stored) => Ok(AnimationTask {
                        scene_id: scene.id.clone(),
                        scene_title: scene.title.clone(),
                        task_id: None,
                        provider: provider_name,
                        status: VideoStatus::Completed.as_str().to_string(),
                        video_url: Some(stored.url),
                    }),
                    Err(e) => {
                        self.restore_video_state(&scene.id, &snapshot);
                        Err(e)
                    }
                }
            }
        }
    }

    fn restore_video_state(&self, scene_id: &str, snapshot: &SceneVideoState) {
        if let Err(e) = self.store.set_scene_video_state(scene_id, snapshot) {
            error!("Failed to restore state of scene {}: {}", scene_id, e);
        }
    }

    /// Stores a finished clip and marks the scene completed
    async fn finalize_video(
        &self,
        scene: &Scene,
        provider_name: &str,
        task_id: Option<&str>,
        media: &GeneratedMedia,
        auth: Option<&DownloadAuth>,
    ) -> CoreResult<StoredMedia> {
        let stored = self
            .materializer
            .materialize_with_auth(&media.url, AssetKind::Video, target(scene), auth)
            .await?;
        let asset = Asset::completed(
            scene.id.clone(),
            AssetKind::Video,
            stored.url.clone(),
            AssetMetadata {
                filename: stored.filename.clone(),
                scene_title: Some(scene.title.clone()),
                source: Some(provider_name.to_string()),
                model: media.model.clone(),
                task_id: task_id.map(str::to_string),
                bytes: stored.bytes,
            },
        );
        self.persist_asset(&asset, &stored).await?;
        self.store.set_scene_video_state(
            &scene.id,
            &SceneVideoState {
                status: SceneStatus::Completed,
                video_status: Some(VideoStatus::Completed),
                video_provider: Some(provider_name.to_string()),
                video_task_id: task_id.map(str::to_string),
                video_url: Some(stored.url.clone()),
            },
        )?;

        info!(
            scene_id = %scene.id,
            provider = %provider_name,
            "Clip stored as {}",
            stored.filename
        );
        Ok(stored)
    }

    // =========================================================================
    // Job Status
    // =========================================================================

    fn resolve_task(
        &self,
        task_id: &str,
        provider_name: Option<&str>,
    ) -> CoreResult<(Option<Scene>, Arc<dyn GenerativeProvider>)> {
        if task_id.trim().is_empty() {
            return Err(CoreError::ValidationError("Task id is required".to_string()));
        }
        let scene = self.store.find_scene_by_task(task_id)?;
        let name = provider_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| scene.as_ref().and_then(|s| s.video_provider.clone()));
        let provider = self
            .registry
            .resolve(ProviderCapability::ImageToVideo, name.as_deref())?;
        Ok((scene, provider))
    }

    fn already_completed(
        scene: Option<&Scene>,
        task_id: &str,
        provider_name: &str,
    ) -> Option<AnimationStatusReport> {
        let scene = scene?;
        if scene.video_status != Some(VideoStatus::Completed) {
            return None;
        }
        let url = scene.video_url.as_ref()?;
        Some(
            AnimationStatusReport::new(task_id, provider_name, "completed")
                .with_scene(Some(scene.id.clone()))
                .with_video_url(url.clone()),
        )
    }

    async fn complete_task(
        &self,
        scene: Option<&Scene>,
        task_id: &str,
        provider_name: &str,
        video_url: String,
        auth: Option<DownloadAuth>,
    ) -> AnimationStatusReport {
        let Some(scene) = scene else {
            return match auth {
                Some(auth) => {
                    self.store_unlinked_clip(task_id, provider_name, &video_url, &auth)
                        .await
                }
                None => AnimationStatusReport::new(task_id, provider_name, "completed")
                    .with_video_url(video_url),
            };
        };

        let media = GeneratedMedia::new(video_url);
        match self
            .finalize_video(scene, provider_name, Some(task_id), &media, auth.as_ref())
            .await
        {
            Ok(stored) => AnimationStatusReport::new(task_id, provider_name, "completed")
                .with_video_url(stored.url),
            Err(e) => {
                warn!(
                    scene_id = %scene.id,
                    task_id = %task_id,
                    "Finished clip could not be stored: {}",
                    e
                );
                AnimationStatusReport::new(task_id, provider_name, "error").with_error(e.to_string())
            }
        }
    }

    /// Credentialed results are never handed out raw; the clip is stored
    /// without a scene record and its local URL returned instead.
    async fn store_unlinked_clip(
        &self,
        task_id: &str,
        provider_name: &str,
        video_url: &str,
        auth: &DownloadAuth,
    ) -> AnimationStatusReport {
        let job = task_id.rsplit('/').next().unwrap_or(task_id);
        let unlinked = MaterializeTarget {
            project_id: "unlinked",
            scene_id: job,
            order_index: 0,
        };
        match self
            .materializer
            .materialize_with_auth(video_url, AssetKind::Video, unlinked, Some(auth))
            .await
        {
            Ok(stored) => AnimationStatusReport::new(task_id, provider_name, "completed")
                .with_video_url(stored.url),
            Err(e) => {
                warn!(task_id = %task_id, "Finished clip could not be stored: {}", e);
                AnimationStatusReport::new(task_id, provider_name, "error").with_error(e.to_string())
            }
        }
    }

    fn fail_task(&self, scene: Option<&Scene>, task_id: &str, provider_name: &str) {
        let Some(scene) = scene else {
            return;
        };
        let state = SceneVideoState {
            status: SceneStatus::Failed,
            video_status: Some(VideoStatus::Failed),
            video_provider: Some(provider_name.to_string()),
            video_task_id: Some(task_id.to_string()),
            video_url: None,
        };
        if let Err(e) = self.store.set_scene_video_state(&scene.id, &state) {
            error!("Failed to mark scene {} failed: {}", scene.id, e);
        }
    }

    /// Polls a video job once and finalizes it when it has finished.
    ///
    /// Safe to call repeatedly: a scene already completed for the task
    /// returns its stored clip without polling. Poll errors are reported in
    /// the result, not raised.
    pub async fn get_animation_status(
        &self,
        task_id: &str,
        provider: Option<&str>,
    ) -> CoreResult<AnimationStatusReport> {
        let (scene, provider) = self.resolve_task(task_id, provider)?;
        let provider_name = provider.id().to_string();
        if let Some(report) = Self::already_completed(scene.as_ref(), task_id, &provider_name) {
            return Ok(report);
        }
        let scene_id = scene.as_ref().map(|s| s.id.clone());

        let handle = VideoJobHandle::new(provider.id(), task_id);
        let status = match guarded("video poll", provider.poll_video(&handle)).await {
            Ok(status) => status,
            Err(failure) => {
                warn!(
                    task_id = %task_id,
                    provider = %provider_name,
                    "Status check failed: {}",
                    failure
                );
                return Ok(AnimationStatusReport::new(task_id, &provider_name, "error")
                    .with_scene(scene_id)
                    .with_error(failure.to_string()));
            }
        };

        let report = match status {
            VideoJobStatus::Queued | VideoJobStatus::Processing { .. } => {
                let mut report =
                    AnimationStatusReport::new(task_id, &provider_name, status.as_str());
                if let VideoJobStatus::Processing { progress } = status {
                    report.progress = progress;
                }
                report
            }
            VideoJobStatus::Completed { video_url } => {
                let auth = provider.download_auth();
                self.complete_task(scene.as_ref(), task_id, &provider_name, video_url, auth)
                    .await
            }
            VideoJobStatus::Failed { error } => {
                self.fail_task(scene.as_ref(), task_id, &provider_name);
                AnimationStatusReport::new(task_id, &provider_name, "failed").with_error(error)
            }
            VideoJobStatus::Rejected { reason } => {
                self.fail_task(scene.as_ref(), task_id, &provider_name);
                AnimationStatusReport::new(task_id, &provider_name, "rejected").with_error(reason)
            }
        };

        Ok(report.with_scene(scene_id))
    }

    /// Polls a video job until it finishes or the provider's ceiling passes,
    /// then finalizes it like [`get_animation_status`](Self::get_animation_status)
    pub async fn wait_for_animation(
        &self,
        task_id: &str,
        provider: Option<&str>,
    ) -> CoreResult<AnimationStatusReport> {
        let (scene, provider) = self.resolve_task(task_id, provider)?;
        let provider_name = provider.id().to_string();
        if let Some(report) = Self::already_completed(scene.as_ref(), task_id, &provider_name) {
            return Ok(report);
        }
        let scene_id = scene.as_ref().map(|s| s.id.clone());

        let handle = VideoJobHandle::new(provider.id(), task_id);
        let label = format!("{} video job {}", provider_name, task_id);
        let adapter: &dyn GenerativeProvider = provider.as_ref();
        let handle_ref = &handle;
        let outcome = poll_until_terminal(provider.poll_policy(), &label, move |_| {
            poll_once(adapter, handle_ref)
        })
        .await;

        let report = match outcome {
            Ok(video_url) => {
                let auth = provider.download_auth();
                self.complete_task(scene.as_ref(), task_id, &provider_name, video_url, auth)
                    .await
            }
            Err(failure) => {
                self.fail_task(scene.as_ref(), task_id, &provider_name);
                let status = match failure.kind {
                    FailureKind::Timeout => "timeout",
                    FailureKind::ContentRejected => "rejected",
                    _ => "failed",
                };
                AnimationStatusReport::new(task_id, &provider_name, status)
                    .with_error(failure.message)
            }
        };

        Ok(report.with_scene(scene_id))
    }

    // =========================================================================
    // Editor Hand-off
    // =========================================================================

    /// Writes the editor manifest for all animated scenes and marks the
    /// project `ready_for_edit`
    pub async fn prepare_for_editor(&self, project_id: &str) -> CoreResult<EditorPackage> {
        let project = self.require_project(project_id)?;
        validate_path_id_component(project_id, "project_id")?;

        let scenes: Vec<ManifestScene> = self
            .store
            .list_scenes(project_id)?
            .into_iter()
            .filter_map(|scene| {
                let video_url = scene.video_url?;
                Some(ManifestScene {
                    order: scene.order_index,
                    title: scene.title,
                    video_url,
                    duration: scene.duration,
                    dialogue: scene.dialogue,
                })
            })
            .collect();
        if scenes.is_empty() {
            return Err(CoreError::PreconditionFailed(
                "No animated scenes found. Animate scenes first.".to_string(),
            ));
        }

        let manifest = EditorManifest {
            project_id: project.id.clone(),
            project_title: project.title.clone(),
            total_scenes: scenes.len(),
            scenes,
        };
        let manifest_path = self
            .materializer
            .manifests_root()
            .join(format!("{}.json", project_id));

        let path = manifest_path.clone();
        let document = manifest.clone();
        tokio::task::spawn_blocking(move || atomic_write_json_pretty(&path, &document))
            .await
            .map_err(|e| CoreError::Internal(format!("Manifest write task failed: {}", e)))??;

        self.store
            .set_project_status(project_id, ProjectStatus::ReadyForEdit)?;
        info!(
            project_id = %project_id,
            clips = manifest.total_scenes,
            "Project ready for edit"
        );

        Ok(EditorPackage {
            project_id: project.id,
            status: "ready",
            total_clips: manifest.total_scenes,
            manifest,
            manifest_path,
        })
    }
}
