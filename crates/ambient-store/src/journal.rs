use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// One entry in the companion's private journal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub day: NaiveDate,
    pub written_at: DateTime<Utc>,
    pub content: String,
}

pub struct JournalRepo {
    db: Database,
}

impl JournalRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn add(&self, content: &str, at: DateTime<Utc>) -> Result<JournalEntry, StoreError> {
        self.db.with_conn(|conn| insert_entry(conn, content, at))
    }

    /// Entries written at or after `since`, oldest first.
    pub fn since(&self, since: DateTime<Utc>) -> Result<Vec<JournalEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, day, written_at, content FROM journal_entries
                 WHERE written_at >= ?1 ORDER BY written_at ASC, id ASC",
            )?;
            let mut rows = stmt.query([since.to_rfc3339()])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                let day: String = row_helpers::get(row, 1, "journal_entries", "day")?;
                let written_at: String = row_helpers::get(row, 2, "journal_entries", "written_at")?;
                entries.push(JournalEntry {
                    id: row_helpers::get(row, 0, "journal_entries", "id")?,
                    day: row_helpers::parse_date(&day, "journal_entries", "day")?,
                    written_at: row_helpers::parse_timestamp(&written_at, "journal_entries", "written_at")?,
                    content: row_helpers::get(row, 3, "journal_entries", "content")?,
                });
            }
            Ok(entries)
        })
    }
}

pub(crate) fn insert_entry(
    conn: &Connection,
    content: &str,
    at: DateTime<Utc>,
) -> Result<JournalEntry, StoreError> {
    let day = at.date_naive();
    conn.execute(
        "INSERT INTO journal_entries (day, written_at, content) VALUES (?1, ?2, ?3)",
        rusqlite::params![day.to_string(), at.to_rfc3339(), content],
    )?;
    Ok(JournalEntry {
        id: conn.last_insert_rowid(),
        day,
        written_at: at,
        content: content.to_string(),
    })
}

/// Render entries grouped by day, one `## HH:MM UTC` heading per entry.
pub fn render(entries: &[JournalEntry]) -> String {
    let mut out = String::new();
    let mut current_day = None;
    for entry in entries {
        if current_day != Some(entry.day) {
            out.push_str(&format!("# Journal {}\n\n", entry.day));
            current_day = Some(entry.day);
        }
        out.push_str(&format!(
            "## {} UTC\n{}\n\n",
            entry.written_at.format("%H:%M"),
            entry.content.trim()
        ));
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn since_filters_and_orders() {
        let repo = JournalRepo::new(Database::in_memory().unwrap());
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        repo.add("old thought", t0).unwrap();
        repo.add("first", t0 + Duration::days(8)).unwrap();
        repo.add("second", t0 + Duration::days(8) + Duration::hours(1)).unwrap();

        let recent = repo.since(t0 + Duration::days(1)).unwrap();
        let contents: Vec<_> = recent.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, ["first", "second"]);
        assert_eq!(recent[0].day, NaiveDate::from_ymd_opt(2024, 1, 9).unwrap());
    }

    #[test]
    fn render_groups_by_day() {
        let repo = JournalRepo::new(Database::in_memory().unwrap());
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 23, 5, 0).unwrap();
        repo.add("late note", t0).unwrap();
        repo.add("morning note\n", t0 + Duration::hours(9)).unwrap();

        let text = render(&repo.since(t0).unwrap());
        assert_eq!(
            text,
            "# Journal 2024-01-01\n\n## 23:05 UTC\nlate note\n\n\
             # Journal 2024-01-02\n\n## 08:05 UTC\nmorning note"
        );
        assert_eq!(render(&[]), "");
    }
}
