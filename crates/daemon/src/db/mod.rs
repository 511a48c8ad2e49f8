use chrono::{DateTime, Utc};
use engine::{Asset, AssetKind};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::PipelineResult;

/// Persistent editor index: imported assets and finished exports.
pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    pub fn new(db_path: &Path) -> PipelineResult<Self> {
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn in_memory() -> PipelineResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> PipelineResult<Self> {
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> PipelineResult<()> {
        let conn = self.conn();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS assets (
                id TEXT PRIMARY KEY,
                original_name TEXT NOT NULL,
                stored_name TEXT NOT NULL,
                path TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                kind TEXT NOT NULL,
                has_video INTEGER NOT NULL,
                has_audio INTEGER NOT NULL,
                duration REAL NOT NULL,
                width INTEGER,
                height INTEGER,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS exports (
                id TEXT PRIMARY KEY,
                output_path TEXT NOT NULL,
                duration REAL NOT NULL,
                project_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_assets_created_at ON assets(created_at)",
            [],
        )?;

        Ok(())
    }
}

fn parse_timestamp(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(column, "TEXT".to_string(), rusqlite::types::Type::Text)
        })
}

fn kind_to_str(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Video => "video",
        AssetKind::Audio => "audio",
        AssetKind::File => "file",
    }
}

fn kind_from_str(value: &str) -> AssetKind {
    match value {
        "video" => AssetKind::Video,
        "audio" => AssetKind::Audio,
        _ => AssetKind::File,
    }
}

/// An imported file as recorded in the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRecord {
    pub id: String,
    pub original_name: String,
    pub stored_name: String,
    pub path: String,
    pub size_bytes: u64,
    pub checksum: String,
    pub kind: AssetKind,
    pub has_video: bool,
    pub has_audio: bool,
    pub duration: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub created_at: DateTime<Utc>,
}

const ASSET_COLUMNS: &str = "id, original_name, stored_name, path, size_bytes, checksum, kind, \
     has_video, has_audio, duration, width, height, created_at";

impl AssetRecord {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind: String = row.get(6)?;
        let created_at: String = row.get(12)?;
        Ok(AssetRecord {
            id: row.get(0)?,
            original_name: row.get(1)?,
            stored_name: row.get(2)?,
            path: row.get(3)?,
            size_bytes: row.get::<_, i64>(4)?.max(0) as u64,
            checksum: row.get(5)?,
            kind: kind_from_str(&kind),
            has_video: row.get(7)?,
            has_audio: row.get(8)?,
            duration: row.get(9)?,
            width: row.get(10)?,
            height: row.get(11)?,
            created_at: parse_timestamp(&created_at, 12)?,
        })
    }

    /// The compiler's view of this record.
    pub fn to_asset(&self) -> Asset {
        Asset {
            id: self.id.clone(),
            kind: self.kind,
            has_video: self.has_video,
            has_audio: self.has_audio,
            duration: self.duration,
            width: self.width,
            height: self.height,
            path: self.path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecord {
    pub id: String,
    pub output_path: String,
    pub duration: f64,
    #[serde(skip)]
    pub project_json: String,
    pub created_at: DateTime<Utc>,
}

impl Database {
    pub fn insert_asset(&self, asset: &AssetRecord) -> PipelineResult<()> {
        let conn = self.conn();
        conn.execute(
            &format!("INSERT INTO assets ({ASSET_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"),
            params![
                asset.id,
                asset.original_name,
                asset.stored_name,
                asset.path,
                asset.size_bytes as i64,
                asset.checksum,
                kind_to_str(asset.kind),
                asset.has_video,
                asset.has_audio,
                asset.duration,
                asset.width,
                asset.height,
                asset.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_asset(&self, id: &str) -> PipelineResult<Option<AssetRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], |row| AssetRecord::from_row(row))?;

        match rows.next() {
            Some(Ok(asset)) => Ok(Some(asset)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Most recent first.
    pub fn list_assets(&self) -> PipelineResult<Vec<AssetRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map([], |row| AssetRecord::from_row(row))?;

        let mut assets = Vec::new();
        for row in rows {
            assets.push(row?);
        }
        Ok(assets)
    }

    pub fn count_assets(&self) -> PipelineResult<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Compiler assets for `ids`. Unknown ids are left out of the map.
    pub fn assets_by_id(&self, ids: &[&str]) -> PipelineResult<HashMap<String, Asset>> {
        let mut assets = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get_asset(id)? {
                assets.insert(record.id.clone(), record.to_asset());
            }
        }
        Ok(assets)
    }

    pub fn insert_export(&self, export: &ExportRecord) -> PipelineResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO exports (id, output_path, duration, project_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                export.id,
                export.output_path,
                export.duration,
                export.project_json,
                export.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_export(&self, id: &str) -> PipelineResult<Option<ExportRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, output_path, duration, project_json, created_at FROM exports WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], |row| {
            let created_at: String = row.get(4)?;
            Ok(ExportRecord {
                id: row.get(0)?,
                output_path: row.get(1)?,
                duration: row.get(2)?,
                project_json: row.get(3)?,
                created_at: parse_timestamp(&created_at, 4)?,
            })
        })?;

        match rows.next() {
            Some(Ok(export)) => Ok(Some(export)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}
