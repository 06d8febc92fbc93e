//! Asset Materialization
//!
//! Turns provider output (inline `data:` URIs or remote URLs) into files
//! under the uploads root with a stable retrieval URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::models::AssetKind;
use crate::core::fs::{resolve_served_file, tmp_path_for};
use crate::core::generative::DownloadAuth;
use crate::core::settings::AppSettings;
use crate::core::{new_id, short_id, CoreError, CoreResult};

/// Maximum accepted download size (500 MB)
pub const MAX_DOWNLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Route prefix the retrieval URLs point at
pub const ASSET_ROUTE_PREFIX: &str = "/api/v1/assets";

const ID_PREFIX_LEN: usize = 8;
const TOKEN_LEN: usize = 6;

// =============================================================================
// Types
// =============================================================================

/// Identifies the scene a file is generated for; drives filename minting
#[derive(Debug, Clone, Copy)]
pub struct MaterializeTarget<'a> {
    pub project_id: &'a str,
    pub scene_id: &'a str,
    pub order_index: i64,
}

/// A file written under the uploads root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMedia {
    pub filename: String,
    pub url: String,
    pub bytes: u64,
    #[serde(skip)]
    pub path: PathBuf,
}

// =============================================================================
// AssetMaterializer
// =============================================================================

pub struct AssetMaterializer {
    client: reqwest::Client,
    uploads_root: PathBuf,
    public_base_url: String,
    max_bytes: u64,
}

impl std::fmt::Debug for AssetMaterializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetMaterializer")
            .field("uploads_root", &self.uploads_root)
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl AssetMaterializer {
    pub fn new(
        uploads_root: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        download_timeout: Duration,
    ) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            uploads_root: uploads_root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            max_bytes: MAX_DOWNLOAD_BYTES,
        })
    }

    pub fn from_settings(settings: &AppSettings, data_dir: &Path) -> CoreResult<Self> {
        Self::new(
            settings.uploads_root(data_dir),
            settings.server.public_base_url.clone(),
            Duration::from_secs(settings.generation.download_timeout_secs),
        )
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn uploads_root(&self) -> &Path {
        &self.uploads_root
    }

    /// Directory holding files of one kind
    pub fn kind_root(&self, kind: AssetKind) -> PathBuf {
        match kind {
            AssetKind::Image => self.uploads_root.join("images"),
            AssetKind::Video => self.uploads_root.join("videos"),
            AssetKind::Audio => self.uploads_root.join("audio"),
        }
    }

    pub fn manifests_root(&self) -> PathBuf {
        self.uploads_root.join("manifests")
    }

    pub fn retrieval_url(&self, kind: AssetKind, filename: &str) -> String {
        format!(
            "{}{}/{}/{}",
            self.public_base_url,
            ASSET_ROUTE_PREFIX,
            kind.as_str(),
            filename
        )
    }

    /// Resolves a served filename, refusing anything outside the kind's root
    pub fn resolve(&self, kind: AssetKind, filename: &str) -> CoreResult<PathBuf> {
        resolve_served_file(&self.kind_root(kind), filename)
    }

    /// Reads a stored file back
    pub async fn read_stored(&self, kind: AssetKind, filename: &str) -> CoreResult<Vec<u8>> {
        let path = self.resolve(kind, filename)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::AssetNotFound(filename.to_string())
            } else {
                CoreError::IoError(e)
            }
        })
    }

    /// Stores `source` (data URI or http(s) URL) as a new file.
    ///
    /// On failure nothing is left behind under the uploads root.
    pub async fn materialize(
        &self,
        source: &str,
        kind: AssetKind,
        target: MaterializeTarget<'_>,
    ) -> CoreResult<StoredMedia> {
        self.materialize_with_auth(source, kind, target, None).await
    }

    /// Like [`materialize`](Self::materialize), sending `auth` on remote downloads
    pub async fn materialize_with_auth(
        &self,
        source: &str,
        kind: AssetKind,
        target: MaterializeTarget<'_>,
        auth: Option<&DownloadAuth>,
    ) -> CoreResult<StoredMedia> {
        let dir = self.kind_root(kind);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            CoreError::MaterializationFailed(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let stored = if source.starts_with("data:") {
            let (mime, bytes) = decode_data_uri(source)?;
            if bytes.len() as u64 > self.max_bytes {
                return Err(CoreError::MaterializationFailed(format!(
                    "Inline payload exceeds size limit ({} bytes)",
                    self.max_bytes
                )));
            }
            let filename = mint_filename(kind, target, extension_for(kind, Some(&mime)));
            let path = dir.join(&filename);
            write_via_tmp(&path, &bytes).await?;
            self.stored(kind, filename, path, bytes.len() as u64)
        } else {
            self.fetch_remote(source, kind, target, &dir, auth).await?
        };

        info!(
            "Materialized {} asset {} ({} bytes)",
            kind, stored.filename, stored.bytes
        );
        Ok(stored)
    }

    fn stored(&self, kind: AssetKind, filename: String, path: PathBuf, bytes: u64) -> StoredMedia {
        StoredMedia {
            url: self.retrieval_url(kind, &filename),
            filename,
            bytes,
            path,
        }
    }

    async fn fetch_remote(
        &self,
        source: &str,
        kind: AssetKind,
        target: MaterializeTarget<'_>,
        dir: &Path,
        auth: Option<&DownloadAuth>,
    ) -> CoreResult<StoredMedia> {
        let url = validate_download_url(source)?;

        let mut request = self.client.get(url);
        if let Some(auth) = auth {
            request = request.header(auth.header, auth.value.as_str());
        }
        // reqwest errors embed the URL; result URLs can carry signatures.
        let mut resp = request.send().await.map_err(|e| {
            CoreError::MaterializationFailed(format!("Download failed: {}", e.without_url()))
        })?;

        if !resp.status().is_success() {
            return Err(CoreError::MaterializationFailed(format!(
                "Download failed with status: {}",
                resp.status()
            )));
        }

        if let Some(content_len) = resp.content_length() {
            if content_len > self.max_bytes {
                return Err(CoreError::MaterializationFailed(format!(
                    "Download is too large ({} bytes > {} bytes limit)",
                    content_len, self.max_bytes
                )));
            }
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_string());
        let filename = mint_filename(kind, target, extension_for(kind, content_type.as_deref()));
        let path = dir.join(&filename);
        let tmp_path = tmp_path_for(&path);

        let streamed = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            let mut total_bytes: u64 = 0;
            while let Some(chunk) = resp.chunk().await.map_err(|e| {
                CoreError::MaterializationFailed(format!(
                    "Failed to read chunk: {}",
                    e.without_url()
                ))
            })? {
                total_bytes = total_bytes.saturating_add(chunk.len() as u64);
                if total_bytes > self.max_bytes {
                    return Err(CoreError::MaterializationFailed(format!(
                        "Download exceeded max size limit ({} bytes)",
                        self.max_bytes
                    )));
                }
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, CoreError>(total_bytes)
        }
        .await;

        let total_bytes = match streamed {
            Ok(total) => total,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(into_materialization_error(e));
            }
        };

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(CoreError::MaterializationFailed(format!(
                "Failed to store {}: {}",
                filename, e
            )));
        }

        debug!("Downloaded {} bytes to {}", total_bytes, path.display());
        Ok(self.stored(kind, filename, path, total_bytes))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn into_materialization_error(e: CoreError) -> CoreError {
    match e {
        CoreError::MaterializationFailed(_) => e,
        other => CoreError::MaterializationFailed(other.to_string()),
    }
}

async fn write_via_tmp(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    let tmp_path = tmp_path_for(path);
    let written = async {
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = written {
        warn!("Failed to store {}: {}", path.display(), e);
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(CoreError::MaterializationFailed(format!(
            "Failed to store {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

/// Validates that a download URL is http(s)
pub fn validate_download_url(url: &str) -> CoreResult<reqwest::Url> {
    let parsed = reqwest::Url::parse(url).map_err(|e| {
        CoreError::MaterializationFailed(format!("Invalid download URL '{}': {}", url, e))
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(CoreError::MaterializationFailed(format!(
            "Unsupported download URL scheme '{}'. Only http/https are allowed.",
            scheme
        ))),
    }
}

/// Splits a base64 `data:` URI into mime type and bytes
pub fn decode_data_uri(uri: &str) -> CoreResult<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| CoreError::MaterializationFailed("Not a data URI".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| CoreError::MaterializationFailed("Malformed data URI".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| {
            CoreError::MaterializationFailed("Only base64 data URIs are supported".to_string())
        })?
        .trim();

    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if payload.is_empty() {
        return Err(CoreError::MaterializationFailed(
            "Data URI has an empty payload".to_string(),
        ));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| CoreError::MaterializationFailed(format!("Invalid base64 payload: {}", e)))?;

    let mime = if mime.is_empty() {
        "application/octet-stream"
    } else {
        mime
    };
    Ok((mime.to_string(), bytes))
}

/// Content type of a stored file, from its extension
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

fn extension_for(kind: AssetKind, mime: Option<&str>) -> &'static str {
    match kind {
        AssetKind::Video => "mp4",
        AssetKind::Audio => "mp3",
        AssetKind::Image => match mime {
            Some("image/jpeg") | Some("image/jpg") => "jpg",
            Some("image/webp") => "webp",
            Some("image/gif") => "gif",
            _ => "png",
        },
    }
}

fn sanitize_component(value: &str) -> String {
    let sanitized: String = short_id(value, ID_PREFIX_LEN)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "x".to_string()
    } else {
        sanitized
    }
}

/// `scene_{project8}_{order:02}_{scene8}_{token}.{ext}` for images and
/// `clip_..._.mp4` for videos
fn mint_filename(kind: AssetKind, target: MaterializeTarget<'_>, ext: &str) -> String {
    let prefix = match kind {
        AssetKind::Image => "scene",
        AssetKind::Video => "clip",
        AssetKind::Audio => "audio",
    };
    let id = new_id().to_ascii_lowercase();
    let token = &id[id.len().saturating_sub(TOKEN_LEN)..];
    format!(
        "{}_{}_{:02}_{}_{}.{}",
        prefix,
        sanitize_component(target.project_id),
        target.order_index,
        sanitize_component(target.scene_id),
        token,
        ext
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generative::MOCK_PNG_DATA_URI;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TARGET: MaterializeTarget<'static> = MaterializeTarget {
        project_id: "01HPROJECTABCDEF",
        scene_id: "01HSCENEXYZ12345",
        order_index: 3,
    };

    fn materializer(dir: &TempDir) -> AssetMaterializer {
        AssetMaterializer::new(
            dir.path().join("uploads"),
            "http://localhost:8000/",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn dir_entries(path: &Path) -> Vec<String> {
        match std::fs::read_dir(path) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_decode_data_uri() {
        let (mime, bytes) = decode_data_uri("data:image/jpeg;base64,AQID").unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(bytes, vec![1, 2, 3]);

        assert!(decode_data_uri("data:text/plain,hello").is_err());
        assert!(decode_data_uri("data:image/png;base64,").is_err());
        assert!(decode_data_uri("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn test_filename_shape() {
        let name = mint_filename(AssetKind::Image, TARGET, "png");
        assert!(name.starts_with("scene_01HPROJE_03_01HSCENE_"), "{name}");
        assert!(name.ends_with(".png"));
        let token = name.trim_end_matches(".png").rsplit('_').next().unwrap();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| !c.is_ascii_uppercase()));

        let clip = mint_filename(AssetKind::Video, TARGET, "mp4");
        assert!(clip.starts_with("clip_01HPROJE_03_01HSCENE_"));

        let odd = MaterializeTarget {
            project_id: "../etc",
            scene_id: "",
            order_index: 12,
        };
        let name = mint_filename(AssetKind::Image, odd, "png");
        assert!(name.starts_with("scene____etc_12_x_"), "{name}");
        assert!(!name.contains('/'));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a.PNG"), "image/png");
        assert_eq!(content_type_for("clip_x.mp4"), "video/mp4");
        assert_eq!(content_type_for("narration.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn test_retrieval_url() {
        let dir = TempDir::new().unwrap();
        let m = materializer(&dir);
        assert_eq!(
            m.retrieval_url(AssetKind::Video, "clip_a.mp4"),
            "http://localhost:8000/api/v1/assets/video/clip_a.mp4"
        );
    }

    #[tokio::test]
    async fn test_inline_payload_is_written() {
        let dir = TempDir::new().unwrap();
        let m = materializer(&dir);

        let stored = m
            .materialize(MOCK_PNG_DATA_URI, AssetKind::Image, TARGET)
            .await
            .unwrap();

        assert!(stored.filename.ends_with(".png"));
        assert_eq!(stored.url, m.retrieval_url(AssetKind::Image, &stored.filename));
        let on_disk = std::fs::read(&stored.path).unwrap();
        assert_eq!(on_disk.len() as u64, stored.bytes);
        assert_eq!(&on_disk[1..4], b"PNG");

        let read_back = m.read_stored(AssetKind::Image, &stored.filename).await.unwrap();
        assert_eq!(read_back, on_disk);
    }

    #[tokio::test]
    async fn test_remote_and_inline_produce_same_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let m = materializer(&dir);

        let remote = m
            .materialize(&format!("{}/img.jpg", server.uri()), AssetKind::Image, TARGET)
            .await
            .unwrap();
        let inline = m
            .materialize("data:image/jpeg;base64,AQID", AssetKind::Image, TARGET)
            .await
            .unwrap();

        assert_eq!(remote.bytes, inline.bytes);
        assert!(remote.filename.ends_with(".jpg") && inline.filename.ends_with(".jpg"));
        assert_ne!(remote.filename, inline.filename);
        assert_eq!(std::fs::read(&remote.path).unwrap(), std::fs::read(&inline.path).unwrap());
    }

    #[tokio::test]
    async fn test_download_auth_is_sent_as_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/v1:download"))
            .and(header("x-goog-api-key", "file-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/mp4")
                    .set_body_bytes(vec![7u8; 8]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let auth = DownloadAuth::header("x-goog-api-key", "file-key");
        let stored = materializer(&dir)
            .materialize_with_auth(
                &format!("{}/files/v1:download", server.uri()),
                AssetKind::Video,
                TARGET,
                Some(&auth),
            )
            .await
            .unwrap();

        assert!(stored.filename.ends_with(".mp4"));
        assert_eq!(stored.bytes, 8);
        assert!(!stored.url.contains("file-key"));
    }

    #[tokio::test]
    async fn test_transport_error_omits_source_url() {
        let dir = TempDir::new().unwrap();
        let err = materializer(&dir)
            .materialize(
                "http://127.0.0.1:1/files/v?signature=top-secret",
                AssetKind::Video,
                TARGET,
            )
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Download failed"), "{message}");
        assert!(!message.contains("top-secret"), "{message}");
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_nothing_behind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let m = materializer(&dir);

        let err = m
            .materialize(&format!("{}/gone.mp4", server.uri()), AssetKind::Video, TARGET)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MaterializationFailed(_)));
        assert!(dir_entries(&m.kind_root(AssetKind::Video)).is_empty());
    }

    #[tokio::test]
    async fn test_size_cap_removes_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let m = materializer(&dir).with_max_bytes(16);

        let err = m
            .materialize(&format!("{}/big.mp4", server.uri()), AssetKind::Video, TARGET)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MaterializationFailed(_)));
        assert!(dir_entries(&m.kind_root(AssetKind::Video)).is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let dir = TempDir::new().unwrap();
        let err = materializer(&dir)
            .materialize("file:///etc/passwd", AssetKind::Image, TARGET)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MaterializationFailed(_)));
    }

    #[tokio::test]
    async fn test_read_stored_rejects_traversal_and_missing() {
        let dir = TempDir::new().unwrap();
        let m = materializer(&dir);
        std::fs::create_dir_all(m.kind_root(AssetKind::Image)).unwrap();

        let err = m.read_stored(AssetKind::Image, "../../secret").await.unwrap_err();
        assert!(matches!(err, CoreError::PathOutsideRoot(_)));

        let err = m.read_stored(AssetKind::Image, "nope.png").await.unwrap_err();
        assert!(matches!(err, CoreError::AssetNotFound(_)));
    }
}
