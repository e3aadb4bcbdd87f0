//! SQLite database for persistent storage
//!
//! Detection records and their chat logs. Object lists are stored as a JSON
//! column; record ids are SQLite rowids assigned at insert time.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::chat::{ChatMessage, ChatRole};
use crate::pipeline::{DetectedObject, DetectionRecord};

/// Storage write or read failure. Fatal to the operation; never retried.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to encode detection objects: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid stored timestamp '{0}'")]
    Timestamp(String),
    #[error("invalid stored chat role '{0}'")]
    Role(String),
    #[error("detection record {0} not found")]
    NotFound(i64),
}

/// Connection wrapper for the detection store.
pub struct DetectionStore {
    conn: Connection,
}

impl DetectionStore {
    /// Open or create the database at path
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        info!("Detection store ready at {:?}", path);
        Ok(store)
    }

    /// In-memory store, used by tests and ephemeral scans
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS detections (
                 id           INTEGER PRIMARY KEY AUTOINCREMENT,
                 image_url    TEXT NOT NULL,
                 image_width  INTEGER NOT NULL,
                 image_height INTEGER NOT NULL,
                 objects      TEXT NOT NULL,
                 created_at   TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS chat_messages (
                 id           INTEGER PRIMARY KEY AUTOINCREMENT,
                 detection_id INTEGER NOT NULL REFERENCES detections(id),
                 role         TEXT NOT NULL,
                 content      TEXT NOT NULL,
                 created_at   TEXT NOT NULL
             );",
        )?;
        Ok(())
    }

    /// Persist a record, returning the assigned id.
    pub fn create(&self, record: &DetectionRecord) -> Result<i64, PersistenceError> {
        let objects = serde_json::to_string(&record.objects)?;

        self.conn.execute(
            "INSERT INTO detections (image_url, image_width, image_height, objects, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.image_url,
                record.image_width,
                record.image_height,
                objects,
                record.created_at.to_rfc3339(),
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Fetch a record by id.
    pub fn get(&self, id: i64) -> Result<DetectionRecord, PersistenceError> {
        let record = self
            .conn
            .query_row(
                "SELECT id, image_url, image_width, image_height, objects, created_at
                 FROM detections
                 WHERE id = ?1",
                params![id],
                row_to_record,
            )
            .optional()?;

        record.ok_or(PersistenceError::NotFound(id))
    }

    /// List the most recent records, newest first.
    pub fn list(&self, limit: usize) -> Result<Vec<DetectionRecord>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, image_url, image_width, image_height, objects, created_at
             FROM detections
             ORDER BY id DESC
             LIMIT ?1",
        )?;

        let mut rows = stmt.query(params![limit as i64])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row)?);
        }

        Ok(records)
    }

    /// Append a message to a record's chat log.
    pub fn append_message(
        &self,
        detection_id: i64,
        role: ChatRole,
        content: &str,
    ) -> Result<ChatMessage, PersistenceError> {
        let created_at = Utc::now();

        self.conn.execute(
            "INSERT INTO chat_messages (detection_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![detection_id, role.as_str(), content, created_at.to_rfc3339()],
        )?;

        Ok(ChatMessage {
            id: self.conn.last_insert_rowid(),
            detection_id,
            role,
            content: content.to_string(),
            created_at,
        })
    }

    /// Chat log for a record, oldest first.
    pub fn list_messages(&self, detection_id: i64) -> Result<Vec<ChatMessage>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, detection_id, role, content, created_at
             FROM chat_messages
             WHERE detection_id = ?1
             ORDER BY id ASC",
        )?;

        let mut rows = stmt.query(params![detection_id])?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            let role_text: String = row.get(2)?;
            let created_at: String = row.get(4)?;
            messages.push(ChatMessage {
                id: row.get(0)?,
                detection_id: row.get(1)?,
                role: ChatRole::parse(&role_text)
                    .ok_or_else(|| PersistenceError::Role(role_text))?,
                content: row.get(3)?,
                created_at: parse_timestamp(&created_at)?,
            });
        }

        Ok(messages)
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<DetectionRecord> {
    let objects_json: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    let objects: Vec<DetectedObject> = serde_json::from_str(&objects_json).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(err))
    })?;

    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(err))
        })?
        .with_timezone(&Utc);

    Ok(DetectionRecord {
        id: Some(row.get(0)?),
        image_url: row.get(1)?,
        image_width: row.get(2)?,
        image_height: row.get(3)?,
        objects,
        created_at,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| PersistenceError::Timestamp(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::record::build_record;

    fn object(label: &str, confidence: f64) -> DetectedObject {
        DetectedObject {
            id: format!("{label}-{confidence}"),
            label: label.to_string(),
            confidence,
            x: 0.1,
            y: 0.2,
            width: 0.3,
            height: 0.4,
            color: "#2196f3".to_string(),
            context: "Life support equipment".to_string(),
            issue: None,
            reference_link: None,
            original_class: None,
        }
    }

    #[test]
    fn test_create_and_get_roundtrip() {
        let store = DetectionStore::open_in_memory().unwrap();
        let record = build_record(
            "/uploads/scan_abc.png",
            640,
            480,
            vec![object("oxygen tank", 0.8), object("toolbox", 0.7)],
        );

        let id = store.create(&record).unwrap();
        let fetched = store.get(id).unwrap();

        assert_eq!(fetched.id, Some(id));
        assert_eq!(fetched.image_url, record.image_url);
        assert_eq!(fetched.objects, record.objects);
    }

    #[test]
    fn test_get_missing_record_is_not_found() {
        let store = DetectionStore::open_in_memory().unwrap();

        match store.get(42) {
            Err(PersistenceError::NotFound(42)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_list_returns_newest_first_with_limit() {
        let store = DetectionStore::open_in_memory().unwrap();
        for index in 0..3 {
            let record = build_record(
                &format!("/uploads/scan_{index}.png"),
                640,
                480,
                vec![],
            );
            store.create(&record).unwrap();
        }

        let listed = store.list(2).unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].image_url, "/uploads/scan_2.png");
        assert_eq!(listed[1].image_url, "/uploads/scan_1.png");
    }

    #[test]
    fn test_empty_object_list_is_a_valid_record() {
        let store = DetectionStore::open_in_memory().unwrap();
        let record = build_record("/uploads/scan_empty.png", 320, 240, vec![]);

        let id = store.create(&record).unwrap();
        let fetched = store.get(id).unwrap();

        assert!(fetched.objects.is_empty());
    }

    #[test]
    fn test_chat_log_append_and_list() {
        let store = DetectionStore::open_in_memory().unwrap();
        let record = build_record("/uploads/scan_chat.png", 640, 480, vec![]);
        let id = store.create(&record).unwrap();

        store.append_message(id, ChatRole::User, "what did you find?").unwrap();
        store.append_message(id, ChatRole::Assistant, "nothing today").unwrap();

        let messages = store.list_messages(id).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[1].role, ChatRole::Assistant);
        assert_eq!(messages[1].content, "nothing today");
    }
}
