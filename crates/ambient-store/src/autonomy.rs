use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Process-wide autonomy bookkeeping, persisted so restarts keep the gates honest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutonomyState {
    pub last_proactive_at: Option<DateTime<Utc>>,
    pub proactive_count_today: u32,
    /// UTC date `proactive_count_today` belongs to.
    pub count_date: Option<NaiveDate>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

pub struct AutonomyRepo {
    db: Database,
}

impl AutonomyRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load the persisted state, or the empty state on first start.
    pub fn load(&self) -> Result<AutonomyState, StoreError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT last_proactive_at, proactive_count_today, count_date, last_cycle_at
                     FROM autonomy_state WHERE id = 1",
                    [],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, u32>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .optional()?;

            let Some((last_proactive, count, count_date, last_cycle)) = row else {
                return Ok(AutonomyState::default());
            };

            Ok(AutonomyState {
                last_proactive_at: row_helpers::parse_opt_timestamp(
                    last_proactive,
                    "autonomy_state",
                    "last_proactive_at",
                )?,
                proactive_count_today: count,
                count_date: count_date
                    .map(|d| row_helpers::parse_date(&d, "autonomy_state", "count_date"))
                    .transpose()?,
                last_cycle_at: row_helpers::parse_opt_timestamp(
                    last_cycle,
                    "autonomy_state",
                    "last_cycle_at",
                )?,
            })
        })
    }

    pub fn save(&self, state: &AutonomyState) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO autonomy_state (id, last_proactive_at, proactive_count_today, count_date, last_cycle_at)
                 VALUES (1, ?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     last_proactive_at = excluded.last_proactive_at,
                     proactive_count_today = excluded.proactive_count_today,
                     count_date = excluded.count_date,
                     last_cycle_at = excluded.last_cycle_at",
                rusqlite::params![
                    state.last_proactive_at.map(|t| t.to_rfc3339()),
                    state.proactive_count_today,
                    state.count_date.map(|d| d.to_string()),
                    state.last_cycle_at.map(|t| t.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_on_first_start() {
        let repo = AutonomyRepo::new(Database::in_memory().unwrap());
        assert_eq!(repo.load().unwrap(), AutonomyState::default());
    }

    #[test]
    fn save_then_load_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("ambient-autonomy-{}", uuid::Uuid::now_v7()));
        let path = dir.join("memory.db");
        let sent = Utc.with_ymd_and_hms(2024, 1, 1, 15, 0, 0).unwrap();
        let state = AutonomyState {
            last_proactive_at: Some(sent),
            proactive_count_today: 2,
            count_date: Some(sent.date_naive()),
            last_cycle_at: Some(sent),
        };

        AutonomyRepo::new(Database::open(&path).unwrap()).save(&state).unwrap();
        let reloaded = AutonomyRepo::new(Database::open(&path).unwrap()).load().unwrap();
        assert_eq!(reloaded, state);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_overwrites_singleton() {
        let repo = AutonomyRepo::new(Database::in_memory().unwrap());
        let mut state = AutonomyState {
            proactive_count_today: 1,
            ..Default::default()
        };
        repo.save(&state).unwrap();
        state.proactive_count_today = 3;
        repo.save(&state).unwrap();
        assert_eq!(repo.load().unwrap().proactive_count_today, 3);
    }
}
