//! SQLite-backed evidence store implementation.
//!
//! Persists one video's evidence so that separate CLI invocations can query
//! the same session. Cosine similarity is computed in Rust; records are read
//! in insertion order on every search.

use super::{
    rank_records, EvidenceHit, EvidenceRecord, EvidenceStore, IndexedVideo, QueryEncoder,
};
use crate::error::{GlimtError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS evidence (
    ordinal INTEGER PRIMARY KEY,
    id TEXT NOT NULL,
    video_id TEXT NOT NULL,
    modality TEXT NOT NULL,
    file_path TEXT,
    text TEXT,
    start_seconds REAL,
    end_seconds REAL,
    source_timestamp REAL,
    embedding BLOB NOT NULL,
    indexed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    video_id TEXT NOT NULL,
    title TEXT NOT NULL,
    source_url TEXT NOT NULL,
    frame_count INTEGER NOT NULL,
    text_count INTEGER NOT NULL,
    duration_seconds REAL,
    indexed_at TEXT NOT NULL
);
"#;

/// SQLite-based evidence store.
pub struct SqliteEvidenceStore {
    conn: Mutex<Connection>,
    video: IndexedVideo,
    encoder: QueryEncoder,
}

impl SqliteEvidenceStore {
    /// Write a freshly built store to `path`, replacing whatever video was
    /// stored there before.
    #[instrument(skip_all, fields(video_id = %video.video_id))]
    pub fn create(
        path: &Path,
        video: IndexedVideo,
        records: &[EvidenceRecord],
        encoder: QueryEncoder,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let store = Self::populate(conn, video, records, encoder)?;
        info!("Wrote evidence store with {} records to {:?}", records.len(), path);
        Ok(store)
    }

    /// Build a store in an in-memory database (useful for testing).
    pub fn create_in_memory(
        video: IndexedVideo,
        records: &[EvidenceRecord],
        encoder: QueryEncoder,
    ) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::populate(conn, video, records, encoder)
    }

    /// Open the store at `path`. Returns `None` if no video has been stored.
    #[instrument(skip(encoder))]
    pub fn open(path: &Path, encoder: QueryEncoder) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        let video = match Self::read_session(&conn)? {
            Some(video) => video,
            None => return Ok(None),
        };

        debug!("Opened evidence store for video {}", video.video_id);
        Ok(Some(Self {
            conn: Mutex::new(conn),
            video,
            encoder,
        }))
    }

    /// Remove the database at `path` together with its WAL side files.
    pub fn remove(path: &Path) -> Result<bool> {
        let mut removed = false;
        for suffix in ["", "-wal", "-shm"] {
            let file = path.with_file_name(format!(
                "{}{}",
                path.file_name().and_then(|n| n.to_str()).unwrap_or("evidence.db"),
                suffix
            ));
            if file.exists() {
                std::fs::remove_file(&file)?;
                removed = true;
            }
        }
        Ok(removed)
    }

    /// Information about the stored video.
    pub fn indexed_video(&self) -> &IndexedVideo {
        &self.video
    }

    /// All records in insertion order.
    pub fn load_records(&self) -> Result<Vec<EvidenceRecord>> {
        let conn = self.conn.lock().map_err(|e| {
            GlimtError::backend(format!("Failed to acquire lock: {}", e))
        })?;

        let mut stmt = conn.prepare(
            r#"
            SELECT ordinal, id, video_id, modality, file_path, text,
                   start_seconds, end_seconds, source_timestamp, embedding, indexed_at
            FROM evidence
            ORDER BY ordinal
            "#,
        )?;

        // Column errors abort the query; malformed values surface per row.
        let rows = stmt.query_map([], |row| {
            let ordinal = row.get::<_, i64>(0)? as usize;
            let id_str: String = row.get(1)?;
            let embedding_bytes: Vec<u8> = row.get(9)?;
            let indexed_at_str: String = row.get(10)?;

            let record = (|| -> Result<EvidenceRecord> {
                Ok(EvidenceRecord {
                    ordinal,
                    id: parse_id(ordinal, &id_str)?,
                    video_id: row.get(2)?,
                    modality: row.get(3)?,
                    file_path: row.get(4)?,
                    text: row.get(5)?,
                    start_seconds: row.get(6)?,
                    end_seconds: row.get(7)?,
                    source_timestamp: row.get(8)?,
                    embedding: Self::bytes_to_embedding(&embedding_bytes),
                    indexed_at: parse_timestamp(ordinal, &indexed_at_str)?,
                })
            })();
            Ok(record)
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row??);
        }
        Ok(records)
    }

    fn populate(
        conn: Connection,
        video: IndexedVideo,
        records: &[EvidenceRecord],
        encoder: QueryEncoder,
    ) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;

        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM evidence", [])?;
        tx.execute("DELETE FROM session", [])?;

        for record in records {
            tx.execute(
                r#"
                INSERT INTO evidence
                (ordinal, id, video_id, modality, file_path, text, start_seconds,
                 end_seconds, source_timestamp, embedding, indexed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    record.ordinal as i64,
                    record.id.to_string(),
                    record.video_id,
                    record.modality,
                    record.file_path,
                    record.text,
                    record.start_seconds,
                    record.end_seconds,
                    record.source_timestamp,
                    Self::embedding_to_bytes(&record.embedding),
                    record.indexed_at.to_rfc3339(),
                ],
            )?;
        }

        tx.execute(
            r#"
            INSERT INTO session
            (id, video_id, title, source_url, frame_count, text_count, duration_seconds, indexed_at)
            VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                video.video_id,
                video.title,
                video.source_url,
                video.frame_count as i64,
                video.text_count as i64,
                video.duration_seconds,
                video.indexed_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;

        Ok(Self {
            conn: Mutex::new(conn),
            video,
            encoder,
        })
    }

    fn read_session(conn: &Connection) -> Result<Option<IndexedVideo>> {
        let video = conn
            .query_row(
                r#"
                SELECT video_id, title, source_url, frame_count, text_count,
                       duration_seconds, indexed_at
                FROM session WHERE id = 1
                "#,
                [],
                |row| {
                    let video_id: String = row.get(0)?;
                    let title: String = row.get(1)?;
                    let source_url: String = row.get(2)?;
                    let frame_count: i64 = row.get(3)?;
                    let text_count: i64 = row.get(4)?;
                    let duration_seconds: Option<f64> = row.get(5)?;
                    let indexed_at: String = row.get(6)?;
                    // The session row is reported at position 0.
                    Ok(parse_timestamp(0, &indexed_at).map(|indexed_at| IndexedVideo {
                        video_id,
                        title,
                        source_url,
                        frame_count: frame_count as usize,
                        text_count: text_count as usize,
                        duration_seconds,
                        indexed_at,
                    }))
                },
            )
            .optional()?;

        video.transpose()
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes. A truncated blob yields an empty
    /// vector, which ranking reports as a corrupt entry.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        if bytes.len() % 4 != 0 {
            return Vec::new();
        }

        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

fn parse_id(position: usize, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| GlimtError::CorruptIndex {
        position,
        reason: format!("invalid record id {:?}: {}", value, e),
    })
}

fn parse_timestamp(position: usize, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GlimtError::CorruptIndex {
            position,
            reason: format!("invalid timestamp {:?}: {}", value, e),
        })
}

#[async_trait]
impl EvidenceStore for SqliteEvidenceStore {
    #[instrument(skip(self, query), fields(video_id = %self.video.video_id))]
    async fn search(&self, query: &str, text_k: usize, image_k: usize) -> Result<Vec<EvidenceHit>> {
        let records = self.load_records()?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.encoder.encode(query, &records).await?;
        let hits = rank_records(&records, &vectors, text_k, image_k)?;

        debug!("Found {} matching records", hits.len());
        Ok(hits)
    }

    async fn len(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| {
            GlimtError::backend(format!("Failed to acquire lock: {}", e))
        })?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM evidence", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn video_id(&self) -> &str {
        &self.video.video_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::{FixedEmbedder, FixedImageEmbedder};
    use crate::evidence::{EvidenceItem, ImageEvidence, TextEvidence};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn encoder() -> QueryEncoder {
        QueryEncoder::new(
            Arc::new(FixedEmbedder::new(vec![1.0, 0.0, 0.0])),
            Arc::new(FixedImageEmbedder::new(vec![1.0, 0.0])),
        )
    }

    fn video(video_id: &str) -> IndexedVideo {
        IndexedVideo {
            video_id: video_id.to_string(),
            title: "Test Video".to_string(),
            source_url: format!("https://www.youtube.com/watch?v={}", video_id),
            frame_count: 1,
            text_count: 1,
            duration_seconds: Some(60.0),
            indexed_at: Utc::now(),
        }
    }

    fn records(video_id: &str) -> Vec<EvidenceRecord> {
        let items = [
            EvidenceItem::Image(ImageEvidence {
                file_path: PathBuf::from("/tmp/frames/frame0000.png"),
                embedding: vec![1.0, 0.0],
                source_timestamp: Some(0.0),
            }),
            EvidenceItem::Text(TextEvidence {
                text: "This is test content".to_string(),
                embedding: vec![1.0, 0.0, 0.0],
                start: 0.0,
                end: 60.0,
            }),
        ];
        items
            .iter()
            .enumerate()
            .map(|(i, item)| EvidenceRecord::from_item(i, video_id, item))
            .collect()
    }

    #[tokio::test]
    async fn test_sqlite_evidence_store() {
        let store =
            SqliteEvidenceStore::create_in_memory(video("video1"), &records("video1"), encoder())
                .unwrap();

        assert_eq!(store.len().await.unwrap(), 2);
        assert_eq!(store.video_id(), "video1");

        let hits = store.search("test", 5, 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!((hits[0].score - 1.0).abs() < 0.001);
        assert_eq!(hits[0].record.ordinal, 0);
    }

    #[tokio::test]
    async fn test_create_replaces_previous_video_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.db");

        SqliteEvidenceStore::create(&path, video("first"), &records("first"), encoder()).unwrap();
        SqliteEvidenceStore::create(&path, video("second"), &records("second"), encoder()).unwrap();

        let store = SqliteEvidenceStore::open(&path, encoder()).unwrap().unwrap();
        assert_eq!(store.video_id(), "second");

        let loaded = store.load_records().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|r| r.video_id == "second"));
        assert_eq!(loaded[1].text.as_deref(), Some("This is test content"));

        drop(store);
        assert!(SqliteEvidenceStore::remove(&path).unwrap());
        assert!(SqliteEvidenceStore::open(&path, encoder()).unwrap().is_none());
    }

    #[test]
    fn test_embedding_bytes() {
        let bytes = SqliteEvidenceStore::embedding_to_bytes(&[0.5, -1.25]);
        assert_eq!(SqliteEvidenceStore::bytes_to_embedding(&bytes), vec![0.5, -1.25]);
        assert!(SqliteEvidenceStore::bytes_to_embedding(&bytes[..7]).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_rows_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.db");
        SqliteEvidenceStore::create(&path, video("vid"), &records("vid"), encoder()).unwrap();

        let conn = Connection::open(&path).unwrap();
        conn.execute("UPDATE evidence SET id = 'not-a-uuid' WHERE ordinal = 1", [])
            .unwrap();
        let store = SqliteEvidenceStore::open(&path, encoder()).unwrap().unwrap();
        assert!(matches!(
            store.load_records(),
            Err(GlimtError::CorruptIndex { position: 1, .. })
        ));
        assert!(matches!(
            store.search("test", 5, 5).await,
            Err(GlimtError::CorruptIndex { position: 1, .. })
        ));

        conn.execute("UPDATE session SET indexed_at = 'yesterday'", []).unwrap();
        assert!(matches!(
            SqliteEvidenceStore::open(&path, encoder()),
            Err(GlimtError::CorruptIndex { position: 0, .. })
        ));
    }
}
