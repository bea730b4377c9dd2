/// SQL DDL for the memory database.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS memory_documents (
    name TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS journal_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    day TEXT NOT NULL,
    written_at TEXT NOT NULL,
    content TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_journal_day ON journal_entries(day);
CREATE INDEX IF NOT EXISTS idx_journal_written ON journal_entries(written_at);

-- Singleton row, id is always 1.
CREATE TABLE IF NOT EXISTS autonomy_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_proactive_at TEXT,
    proactive_count_today INTEGER NOT NULL DEFAULT 0,
    count_date TEXT,
    last_cycle_at TEXT
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
