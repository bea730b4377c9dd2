//! SQLite-backed durable state: the five memory documents, the journal and
//! the persisted autonomy state.

pub mod autonomy;
pub mod database;
pub mod documents;
pub mod error;
pub mod journal;
pub mod row_helpers;
pub mod schema;
pub mod store;

pub use autonomy::{AutonomyRepo, AutonomyState};
pub use database::Database;
pub use documents::DocumentRepo;
pub use error::StoreError;
pub use journal::{JournalEntry, JournalRepo};
pub use store::{MemoryBatch, MemoryStore};
