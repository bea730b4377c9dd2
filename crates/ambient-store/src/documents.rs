use std::collections::BTreeMap;

use ambient_core::{DocumentName, MemorySnapshot};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Read/replace access to the five memory documents.
pub struct DocumentRepo {
    db: Database,
}

impl DocumentRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Write the seed template for every document that does not exist yet.
    /// Existing content is never touched.
    pub fn seed(&self, at: DateTime<Utc>) -> Result<usize, StoreError> {
        let seeded = self.db.transaction(|tx| {
            let mut seeded = 0;
            for name in DocumentName::ALL {
                seeded += tx.execute(
                    "INSERT OR IGNORE INTO memory_documents (name, content, updated_at)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![name.as_str(), name.seed(), at.to_rfc3339()],
                )?;
            }
            Ok(seeded)
        })?;
        if seeded > 0 {
            info!(seeded, "seeded memory documents");
        }
        Ok(seeded)
    }

    pub fn read(&self, name: DocumentName) -> Result<String, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT content FROM memory_documents WHERE name = ?1",
                [name.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("memory document {name}")))
        })
    }

    /// Read a consistent snapshot of the given documents. Missing documents
    /// are left out of the snapshot.
    pub fn read_many(&self, names: &[DocumentName]) -> Result<MemorySnapshot, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name, content FROM memory_documents")?;
            let mut rows = stmt.query([])?;
            let mut docs = BTreeMap::new();
            while let Some(row) = rows.next()? {
                let raw: String = row_helpers::get(row, 0, "memory_documents", "name")?;
                let name: DocumentName = row_helpers::parse_enum(&raw, "memory_documents", "name")?;
                if names.contains(&name) {
                    docs.insert(name, row_helpers::get(row, 1, "memory_documents", "content")?);
                }
            }
            Ok(MemorySnapshot::new(docs))
        })
    }

    pub fn read_all(&self) -> Result<MemorySnapshot, StoreError> {
        self.read_many(&DocumentName::ALL)
    }

    pub fn replace(&self, name: DocumentName, content: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.db.with_conn(|conn| write_document(conn, name, content, at))?;
        debug!(document = %name, chars = content.len(), "memory document replaced");
        Ok(())
    }

    /// Replace every document in `updates` in one transaction: either all of
    /// them change or none do.
    pub fn replace_batch(
        &self,
        updates: &BTreeMap<DocumentName, String>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }
        self.db.transaction(|tx| {
            for (name, content) in updates {
                write_document(tx, *name, content, at)?;
            }
            Ok(())
        })?;
        debug!(documents = ?updates.keys().collect::<Vec<_>>(), "memory batch committed");
        Ok(())
    }
}

/// Update-then-insert so UPDATE triggers see every replace of a seeded row.
pub(crate) fn write_document(
    conn: &Connection,
    name: DocumentName,
    content: &str,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let changed = conn
        .execute(
            "UPDATE memory_documents SET content = ?2, updated_at = ?3 WHERE name = ?1",
            rusqlite::params![name.as_str(), content, at.to_rfc3339()],
        )
        .map_err(|e| StoreError::Database(format!("replace {name}: {e}")))?;
    if changed == 0 {
        conn.execute(
            "INSERT INTO memory_documents (name, content, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![name.as_str(), content, at.to_rfc3339()],
        )
        .map_err(|e| StoreError::Database(format!("insert {name}: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn repo() -> (Database, DocumentRepo) {
        let db = Database::in_memory().unwrap();
        let repo = DocumentRepo::new(db.clone());
        repo.seed(at()).unwrap();
        (db, repo)
    }

    #[test]
    fn seed_is_idempotent_and_never_overwrites() {
        let (_db, repo) = repo();
        repo.replace(DocumentName::Identity, "# Identity\n\ncustom", at()).unwrap();

        assert_eq!(repo.seed(at()).unwrap(), 0);
        assert_eq!(repo.read(DocumentName::Identity).unwrap(), "# Identity\n\ncustom");
        assert_eq!(repo.read(DocumentName::Queue).unwrap(), DocumentName::Queue.seed());
    }

    #[test]
    fn read_missing_document_is_not_found() {
        let db = Database::in_memory().unwrap();
        let repo = DocumentRepo::new(db);
        assert!(matches!(
            repo.read(DocumentName::UserContext),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn read_many_returns_only_requested() {
        let (_db, repo) = repo();
        let snap = repo.read_many(&DocumentName::LIGHTWEIGHT).unwrap();
        assert_eq!(snap.iter().count(), 3);
        assert_eq!(snap.get(DocumentName::UserContext), "");
        assert!(snap.get(DocumentName::ActiveThreads).starts_with("# Active Threads"));
    }

    #[test]
    fn replace_batch_writes_all() {
        let (_db, repo) = repo();
        let updates = BTreeMap::from([
            (DocumentName::UserContext, "likes tea".to_string()),
            (DocumentName::Queue, "ask about tea".to_string()),
        ]);
        repo.replace_batch(&updates, at()).unwrap();

        let snap = repo.read_all().unwrap();
        assert_eq!(snap.get(DocumentName::UserContext), "likes tea");
        assert_eq!(snap.get(DocumentName::Queue), "ask about tea");
    }

    #[test]
    fn failure_mid_batch_leaves_documents_unchanged() {
        let (db, repo) = repo();
        let before = repo.read_all().unwrap();

        // user_context sorts before queue, so its update lands first and must be rolled back.
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_queue BEFORE UPDATE ON memory_documents
                 WHEN NEW.name = 'queue'
                 BEGIN SELECT RAISE(ABORT, 'simulated disk failure'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let updates = BTreeMap::from([
            (DocumentName::UserContext, "new facts".to_string()),
            (DocumentName::Queue, "new queue".to_string()),
        ]);
        let err = repo.replace_batch(&updates, at()).unwrap_err();
        assert!(err.to_string().contains("simulated disk failure"));

        assert_eq!(repo.read_all().unwrap(), before);
    }
}
