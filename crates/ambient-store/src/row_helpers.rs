use chrono::{DateTime, NaiveDate, Utc};

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

pub fn parse_timestamp(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table,
            column,
            detail: format!("invalid timestamp {raw:?}: {e}"),
        })
}

pub fn parse_opt_timestamp(
    raw: Option<String>,
    table: &'static str,
    column: &'static str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(|r| parse_timestamp(&r, table, column)).transpose()
}

pub fn parse_date(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<NaiveDate, StoreError> {
    raw.parse().map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid date {raw:?}: {e}"),
    })
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambient_core::DocumentName;

    #[test]
    fn parse_enum_document_names() {
        let name: DocumentName = parse_enum("active_threads", "memory_documents", "name").unwrap();
        assert_eq!(name, DocumentName::ActiveThreads);

        let bad: Result<DocumentName, _> = parse_enum("diary", "memory_documents", "name");
        assert!(matches!(
            bad,
            Err(StoreError::CorruptRow { table: "memory_documents", column: "name", .. })
        ));
    }

    #[test]
    fn timestamps_round_trip_and_reject_garbage() {
        let t = parse_timestamp("2024-01-01T23:00:00+00:00", "autonomy_state", "last_cycle_at").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-01-01T23:00:00+00:00");
        assert!(parse_timestamp("yesterday", "autonomy_state", "last_cycle_at").is_err());
        assert_eq!(parse_opt_timestamp(None, "autonomy_state", "last_cycle_at").unwrap(), None);
    }

    #[test]
    fn dates() {
        let d = parse_date("2024-01-02", "journal_entries", "day").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert!(parse_date("01/02/2024", "journal_entries", "day").is_err());
    }
}
