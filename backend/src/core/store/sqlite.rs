//! SQLite Record Store
//!
//! Single-connection SQLite backend guarded by a mutex.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{RecordStore, SceneVideoState};
use crate::core::{
    assets::{Asset, AssetKind, AssetMetadata},
    project::{Project, ProjectStatus, Scene, SceneStatus, VideoStatus},
    CoreError, CoreResult,
};

const SCENE_COLUMNS: &str = "id, project_id, order_index, title, description, dialogue, \
     image_prompt, duration, notes, status, video_status, video_provider, video_task_id, \
     video_url, created_at, updated_at";

const ASSET_COLUMNS: &str = "a.id, a.scene_id, a.type, a.url, a.status, a.metadata, a.created_at";

fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> CoreError + '_ {
    move |e| CoreError::Storage(format!("{}: {}", context, e))
}

// =============================================================================
// SqliteStore
// =============================================================================

/// SQLite-backed [`RecordStore`]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and ensures the schema
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let conn = Connection::open(path).map_err(storage_err("Failed to open database"))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(storage_err("Failed to enable foreign keys"))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Creates an in-memory database (for testing)
    pub fn in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(storage_err("Failed to create in-memory database"))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(storage_err("Failed to enable foreign keys"))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> CoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Internal("Record store lock poisoned".to_string()))
    }

    fn init_schema(&self) -> CoreResult<()> {
        self.conn()?
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS projects (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    description TEXT,
                    original_script TEXT,
                    style TEXT,
                    duration_target REAL,
                    status TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS scenes (
                    id TEXT PRIMARY KEY,
                    project_id TEXT NOT NULL REFERENCES projects(id),
                    order_index INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT,
                    dialogue TEXT,
                    image_prompt TEXT NOT NULL,
                    duration REAL NOT NULL,
                    notes TEXT,
                    status TEXT NOT NULL,
                    video_status TEXT,
                    video_provider TEXT,
                    video_task_id TEXT,
                    video_url TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (project_id, order_index)
                );

                CREATE TABLE IF NOT EXISTS assets (
                    id TEXT PRIMARY KEY,
                    scene_id TEXT NOT NULL REFERENCES scenes(id),
                    type TEXT NOT NULL,
                    url TEXT NOT NULL,
                    status TEXT NOT NULL,
                    metadata TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_scenes_project ON scenes(project_id, order_index);
                CREATE INDEX IF NOT EXISTS idx_scenes_task ON scenes(video_task_id);
                CREATE INDEX IF NOT EXISTS idx_assets_scene ON assets(scene_id, type, created_at);
                "#,
            )
            .map_err(storage_err("Failed to initialize schema"))
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

struct ProjectRow {
    id: String,
    title: String,
    description: Option<String>,
    original_script: Option<String>,
    style: Option<String>,
    duration_target: Option<f64>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            original_script: row.get(3)?,
            style: row.get(4)?,
            duration_target: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_project(self) -> CoreResult<Project> {
        Ok(Project {
            id: self.id,
            title: self.title,
            description: self.description,
            original_script: self.original_script,
            style: self.style,
            duration_target: self.duration_target,
            status: self.status.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct SceneRow {
    id: String,
    project_id: String,
    order_index: i64,
    title: String,
    description: Option<String>,
    dialogue: Option<String>,
    image_prompt: String,
    duration: f64,
    notes: Option<String>,
    status: String,
    video_status: Option<String>,
    video_provider: Option<String>,
    video_task_id: Option<String>,
    video_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SceneRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            order_index: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            dialogue: row.get(5)?,
            image_prompt: row.get(6)?,
            duration: row.get(7)?,
            notes: row.get(8)?,
            status: row.get(9)?,
            video_status: row.get(10)?,
            video_provider: row.get(11)?,
            video_task_id: row.get(12)?,
            video_url: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn into_scene(self) -> CoreResult<Scene> {
        let video_status = match self.video_status.as_deref() {
            Some(s) => Some(s.parse::<VideoStatus>()?),
            None => None,
        };
        Ok(Scene {
            id: self.id,
            project_id: self.project_id,
            order_index: self.order_index,
            title: self.title,
            description: self.description,
            dialogue: self.dialogue,
            image_prompt: self.image_prompt,
            duration: self.duration,
            notes: self.notes,
            status: self.status.parse()?,
            video_status,
            video_provider: self.video_provider,
            video_task_id: self.video_task_id,
            video_url: self.video_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct AssetRow {
    id: String,
    scene_id: String,
    kind: String,
    url: String,
    status: String,
    metadata: String,
    created_at: DateTime<Utc>,
}

impl AssetRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            scene_id: row.get(1)?,
            kind: row.get(2)?,
            url: row.get(3)?,
            status: row.get(4)?,
            metadata: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_asset(self) -> CoreResult<Asset> {
        let metadata: AssetMetadata = serde_json::from_str(&self.metadata)?;
        Ok(Asset {
            id: self.id,
            scene_id: self.scene_id,
            kind: self.kind.parse()?,
            url: self.url,
            status: self.status.parse()?,
            metadata,
            created_at: self.created_at,
        })
    }
}

fn collect<R, T>(
    rows: impl Iterator<Item = rusqlite::Result<R>>,
    convert: impl Fn(R) -> CoreResult<T>,
) -> CoreResult<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(convert(row.map_err(storage_err("Failed to read row"))?)?);
    }
    Ok(out)
}

// =============================================================================
// RecordStore Implementation
// =============================================================================

impl RecordStore for SqliteStore {
    fn insert_project(&self, project: &Project) -> CoreResult<()> {
        self.conn()?
            .execute(
                "INSERT INTO projects (id, title, description, original_script, style, \
                 duration_target, status, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    project.id,
                    project.title,
                    project.description,
                    project.original_script,
                    project.style,
                    project.duration_target,
                    project.status.as_str(),
                    project.created_at,
                    project.updated_at,
                ],
            )
            .map_err(storage_err("Failed to insert project"))?;
        Ok(())
    }

    fn get_project(&self, project_id: &str) -> CoreResult<Option<Project>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, title, description, original_script, style, duration_target, \
                 status, created_at, updated_at FROM projects WHERE id = ?1",
                [project_id],
                ProjectRow::from_row,
            )
            .optional()
            .map_err(storage_err("Failed to load project"))?;
        row.map(ProjectRow::into_project).transpose()
    }

    fn list_projects(&self) -> CoreResult<Vec<Project>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, title, description, original_script, style, duration_target, \
                 status, created_at, updated_at FROM projects ORDER BY created_at DESC",
            )
            .map_err(storage_err("Failed to prepare project query"))?;
        let rows = stmt
            .query_map([], ProjectRow::from_row)
            .map_err(storage_err("Failed to list projects"))?;
        collect(rows, ProjectRow::into_project)
    }

    fn set_project_status(&self, project_id: &str, status: ProjectStatus) -> CoreResult<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE projects SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now(), project_id],
            )
            .map_err(storage_err("Failed to update project status"))?;
        if changed == 0 {
            return Err(CoreError::ProjectNotFound(project_id.to_string()));
        }
        Ok(())
    }

    fn insert_scenes(&self, scenes: &[Scene]) -> CoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(storage_err("Failed to begin transaction"))?;
        for scene in scenes {
            tx.execute(
                &format!(
                    "INSERT INTO scenes ({}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    SCENE_COLUMNS
                ),
                params![
                    scene.id,
                    scene.project_id,
                    scene.order_index,
                    scene.title,
                    scene.description,
                    scene.dialogue,
                    scene.image_prompt,
                    scene.duration,
                    scene.notes,
                    scene.status.as_str(),
                    scene.video_status.map(|s| s.as_str()),
                    scene.video_provider,
                    scene.video_task_id,
                    scene.video_url,
                    scene.created_at,
                    scene.updated_at,
                ],
            )
            .map_err(storage_err("Failed to insert scene"))?;
        }
        tx.commit().map_err(storage_err("Failed to commit scenes"))
    }

    fn get_scene(&self, scene_id: &str) -> CoreResult<Option<Scene>> {
        let row = self
            .conn()?
            .query_row(
                &format!("SELECT {} FROM scenes WHERE id = ?1", SCENE_COLUMNS),
                [scene_id],
                SceneRow::from_row,
            )
            .optional()
            .map_err(storage_err("Failed to load scene"))?;
        row.map(SceneRow::into_scene).transpose()
    }

    fn list_scenes(&self, project_id: &str) -> CoreResult<Vec<Scene>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM scenes WHERE project_id = ?1 ORDER BY order_index ASC",
                SCENE_COLUMNS
            ))
            .map_err(storage_err("Failed to prepare scene query"))?;
        let rows = stmt
            .query_map([project_id], SceneRow::from_row)
            .map_err(storage_err("Failed to list scenes"))?;
        collect(rows, SceneRow::into_scene)
    }

    fn set_scene_status(&self, scene_id: &str, status: SceneStatus) -> CoreResult<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE scenes SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now(), scene_id],
            )
            .map_err(storage_err("Failed to update scene status"))?;
        if changed == 0 {
            return Err(CoreError::SceneNotFound(scene_id.to_string()));
        }
        Ok(())
    }

    fn set_scene_video_state(&self, scene_id: &str, state: &SceneVideoState) -> CoreResult<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE scenes SET status = ?1, video_status = ?2, video_provider = ?3, \
                 video_task_id = ?4, video_url = ?5, updated_at = ?6 WHERE id = ?7",
                params![
                    state.status.as_str(),
                    state.video_status.map(|s| s.as_str()),
                    state.video_provider,
                    state.video_task_id,
                    state.video_url,
                    Utc::now(),
                    scene_id,
                ],
            )
            .map_err(storage_err("Failed to update scene video state"))?;
        if changed == 0 {
            return Err(CoreError::SceneNotFound(scene_id.to_string()));
        }
        Ok(())
    }

    fn find_scene_by_task(&self, task_id: &str) -> CoreResult<Option<Scene>> {
        let row = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {} FROM scenes WHERE video_task_id = ?1 \
                     ORDER BY updated_at DESC LIMIT 1",
                    SCENE_COLUMNS
                ),
                [task_id],
                SceneRow::from_row,
            )
            .optional()
            .map_err(storage_err("Failed to look up scene by task"))?;
        row.map(SceneRow::into_scene).transpose()
    }

    fn insert_asset(&self, asset: &Asset) -> CoreResult<()> {
        let metadata = serde_json::to_string(&asset.metadata)?;
        self.conn()?
            .execute(
                "INSERT INTO assets (id, scene_id, type, url, status, metadata, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    asset.id,
                    asset.scene_id,
                    asset.kind.as_str(),
                    asset.url,
                    asset.status.as_str(),
                    metadata,
                    asset.created_at,
                ],
            )
            .map_err(storage_err("Failed to insert asset"))?;
        Ok(())
    }

    fn list_scene_assets(&self, scene_id: &str) -> CoreResult<Vec<Asset>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM assets a WHERE a.scene_id = ?1 \
                 ORDER BY a.created_at DESC, a.id DESC",
                ASSET_COLUMNS
            ))
            .map_err(storage_err("Failed to prepare asset query"))?;
        let rows = stmt
            .query_map([scene_id], AssetRow::from_row)
            .map_err(storage_err("Failed to list scene assets"))?;
        collect(rows, AssetRow::into_asset)
    }

    fn list_project_assets(&self, project_id: &str) -> CoreResult<Vec<Asset>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM assets a JOIN scenes s ON s.id = a.scene_id \
                 WHERE s.project_id = ?1 \
                 ORDER BY s.order_index ASC, a.created_at DESC, a.id DESC",
                ASSET_COLUMNS
            ))
            .map_err(storage_err("Failed to prepare asset query"))?;
        let rows = stmt
            .query_map([project_id], AssetRow::from_row)
            .map_err(storage_err("Failed to list project assets"))?;
        collect(rows, AssetRow::into_asset)
    }

    fn current_asset(&self, scene_id: &str, kind: AssetKind) -> CoreResult<Option<Asset>> {
        let row = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {} FROM assets a \
                     WHERE a.scene_id = ?1 AND a.type = ?2 AND a.status = 'completed' \
                     ORDER BY a.created_at DESC, a.id DESC LIMIT 1",
                    ASSET_COLUMNS
                ),
                params![scene_id, kind.as_str()],
                AssetRow::from_row,
            )
            .optional()
            .map_err(storage_err("Failed to load current asset"))?;
        row.map(AssetRow::into_asset).transpose()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::assets::AssetStatus;

    fn seeded() -> (SqliteStore, Project, Vec<Scene>) {
        let store = SqliteStore::in_memory().unwrap();
        let project = Project::new("Night Train").with_style("noir");
        store.insert_project(&project).unwrap();

        let scenes = vec![
            Scene::new(&project.id, 1, "Platform", "empty platform at midnight"),
            Scene::new(&project.id, 0, "Ticket", "a torn ticket in the rain"),
        ];
        store.insert_scenes(&scenes).unwrap();
        (store, project, scenes)
    }

    fn image_asset(scene_id: &str, filename: &str) -> Asset {
        Asset::completed(
            scene_id,
            AssetKind::Image,
            format!("http://localhost:8000/api/v1/assets/image/{}", filename),
            AssetMetadata {
                filename: filename.to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_create_db_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storyreel.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_project(&Project::new("Persisted")).unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let projects = reopened.list_projects().unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].title, "Persisted");
    }

    #[test]
    fn test_project_round_trip() {
        let (store, project, _) = seeded();
        let loaded = store.get_project(&project.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Night Train");
        assert_eq!(loaded.style.as_deref(), Some("noir"));
        assert_eq!(loaded.status, ProjectStatus::Draft);

        assert!(store.get_project("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_scenes_is_ordered() {
        let (store, project, _) = seeded();
        let scenes = store.list_scenes(&project.id).unwrap();
        let titles: Vec<_> = scenes.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Ticket", "Platform"]);
    }

    #[test]
    fn test_duplicate_order_index_rejected() {
        let (store, project, _) = seeded();
        let dup = Scene::new(&project.id, 0, "Dup", "duplicate");
        let err = store.insert_scenes(&[dup]).unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(store.list_scenes(&project.id).unwrap().len(), 2);
    }

    #[test]
    fn test_status_updates() {
        let (store, project, scenes) = seeded();
        store
            .set_project_status(&project.id, ProjectStatus::ImagesReady)
            .unwrap();
        store
            .set_scene_status(&scenes[0].id, SceneStatus::ImageReady)
            .unwrap();

        assert_eq!(
            store.get_project(&project.id).unwrap().unwrap().status,
            ProjectStatus::ImagesReady
        );
        assert_eq!(
            store.get_scene(&scenes[0].id).unwrap().unwrap().status,
            SceneStatus::ImageReady
        );

        let err = store
            .set_project_status("missing", ProjectStatus::Failed)
            .unwrap_err();
        assert!(matches!(err, CoreError::ProjectNotFound(_)));
    }

    #[test]
    fn test_video_state_and_task_lookup() {
        let (store, _, scenes) = seeded();
        let state = SceneVideoState {
            status: SceneStatus::Animating,
            video_status: Some(VideoStatus::Processing),
            video_provider: Some("kling".into()),
            video_task_id: Some("task-42".into()),
            video_url: None,
        };
        store.set_scene_video_state(&scenes[1].id, &state).unwrap();

        let found = store.find_scene_by_task("task-42").unwrap().unwrap();
        assert_eq!(found.id, scenes[1].id);
        assert_eq!(SceneVideoState::from(&found), state);
        assert!(store.find_scene_by_task("nope").unwrap().is_none());
    }

    #[test]
    fn test_current_asset_is_newest_completed() {
        let (store, project, scenes) = seeded();
        let mut older = image_asset(&scenes[0].id, "old.png");
        older.created_at = Utc::now() - chrono::Duration::seconds(60);
        let newer = image_asset(&scenes[0].id, "new.png");
        let mut failed = image_asset(&scenes[0].id, "failed.png");
        failed.status = AssetStatus::Failed;

        store.insert_asset(&older).unwrap();
        store.insert_asset(&newer).unwrap();
        store.insert_asset(&failed).unwrap();

        let current = store
            .current_asset(&scenes[0].id, AssetKind::Image)
            .unwrap()
            .unwrap();
        assert_eq!(current.metadata.filename, "new.png");
        assert!(store
            .current_asset(&scenes[0].id, AssetKind::Video)
            .unwrap()
            .is_none());

        assert_eq!(store.list_scene_assets(&scenes[0].id).unwrap().len(), 3);
        assert_eq!(store.list_project_assets(&project.id).unwrap().len(), 3);
    }

    #[test]
    fn test_audio_rows_decode() {
        let (store, _, scenes) = seeded();
        let mut narration = image_asset(&scenes[1].id, "narration.mp3");
        narration.kind = AssetKind::Audio;
        narration.url = "https://cdn.example/narration.mp3".to_string();
        store.insert_asset(&narration).unwrap();

        let assets = store.list_scene_assets(&scenes[1].id).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].kind, AssetKind::Audio);
        assert_eq!(
            store
                .current_asset(&scenes[1].id, AssetKind::Audio)
                .unwrap()
                .unwrap()
                .metadata
                .filename,
            "narration.mp3"
        );
    }
}
