use std::collections::BTreeMap;
use std::path::Path;

use ambient_core::{DocumentName, MemorySnapshot};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::autonomy::{AutonomyRepo, AutonomyState};
use crate::database::Database;
use crate::documents::{self, DocumentRepo};
use crate::error::StoreError;
use crate::journal::{self, JournalEntry, JournalRepo};

/// Document replacements plus journal entries committed together.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryBatch {
    pub documents: BTreeMap<DocumentName, String>,
    pub journal: Vec<String>,
}

impl MemoryBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(mut self, name: DocumentName, content: impl Into<String>) -> Self {
        self.documents.insert(name, content.into());
        self
    }

    pub fn journal(mut self, entry: impl Into<String>) -> Self {
        self.journal.push(entry.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.journal.is_empty()
    }
}

/// The Memory Store: one database shared by the document, journal and
/// autonomy repositories.
#[derive(Clone)]
pub struct MemoryStore {
    db: Database,
}

impl MemoryStore {
    /// Open (or create) the store at `path` and seed any missing documents.
    pub fn open(path: &Path, at: DateTime<Utc>) -> Result<Self, StoreError> {
        let store = Self { db: Database::open(path)? };
        store.documents().seed(at)?;
        Ok(store)
    }

    /// Seeded in-memory store (for testing).
    pub fn in_memory(at: DateTime<Utc>) -> Result<Self, StoreError> {
        let store = Self { db: Database::in_memory()? };
        store.documents().seed(at)?;
        Ok(store)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn documents(&self) -> DocumentRepo {
        DocumentRepo::new(self.db.clone())
    }

    pub fn journal(&self) -> JournalRepo {
        JournalRepo::new(self.db.clone())
    }

    pub fn autonomy(&self) -> AutonomyRepo {
        AutonomyRepo::new(self.db.clone())
    }

    pub fn read(&self, name: DocumentName) -> Result<String, StoreError> {
        self.documents().read(name)
    }

    pub fn read_many(&self, names: &[DocumentName]) -> Result<MemorySnapshot, StoreError> {
        self.documents().read_many(names)
    }

    pub fn read_all(&self) -> Result<MemorySnapshot, StoreError> {
        self.documents().read_all()
    }

    pub fn replace(&self, name: DocumentName, content: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.documents().replace(name, content, at)
    }

    pub fn replace_batch(
        &self,
        updates: &BTreeMap<DocumentName, String>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.documents().replace_batch(updates, at)
    }

    /// Journal entries from the last `days` days, rendered for prompts.
    pub fn recent_journal(&self, now: DateTime<Utc>, days: i64) -> Result<String, StoreError> {
        let entries = self.journal().since(now - Duration::days(days))?;
        Ok(journal::render(&entries))
    }

    /// Apply every document replacement and journal entry in one transaction.
    pub fn commit(&self, batch: &MemoryBatch, at: DateTime<Utc>) -> Result<Vec<JournalEntry>, StoreError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let entries = self.db.transaction(|tx| {
            for (name, content) in &batch.documents {
                documents::write_document(tx, *name, content, at)?;
            }
            batch
                .journal
                .iter()
                .map(|entry| journal::insert_entry(tx, entry, at))
                .collect::<Result<Vec<_>, _>>()
        })?;
        debug!(
            documents = batch.documents.len(),
            journal_entries = entries.len(),
            "memory batch committed"
        );
        Ok(entries)
    }

    pub fn load_autonomy(&self) -> Result<AutonomyState, StoreError> {
        self.autonomy().load()
    }

    pub fn save_autonomy(&self, state: &AutonomyState) -> Result<(), StoreError> {
        self.autonomy().save(state)
    }
}
