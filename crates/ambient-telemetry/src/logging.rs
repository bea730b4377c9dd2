use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A persisted warn+ log record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: Option<String>,
    pub session_id: Option<String>,
    pub cycle_id: Option<String>,
    pub step: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    pub target: Option<String>,
    pub session_id: Option<String>,
    pub cycle_id: Option<String>,
    pub since: Option<String>,
    pub limit: Option<u32>,
}

/// SQLite sink for warn+ logs, so failed cycles can be diagnosed after the fact.
pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS logs (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp TEXT NOT NULL,
                 level TEXT NOT NULL,
                 target TEXT NOT NULL,
                 message TEXT NOT NULL,
                 fields TEXT,
                 session_id TEXT,
                 cycle_id TEXT,
                 step TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_logs_level ON logs(level);
             CREATE INDEX IF NOT EXISTS idx_logs_cycle ON logs(cycle_id);
             CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert(&self, record: &LogInsert) {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO logs (timestamp, level, target, message, fields, session_id, cycle_id, step)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                record.timestamp,
                record.level,
                record.target,
                record.message,
                record.fields,
                record.ctx.session_id,
                record.ctx.cycle_id,
                record.ctx.step,
            ],
        );
    }

    pub fn query(&self, q: &LogQuery) -> Result<Vec<LogRecord>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut sql = String::from(
            "SELECT id, timestamp, level, target, message, fields, session_id, cycle_id, step
             FROM logs WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        let mut push = |clause: &str, value: String, params: &mut Vec<Box<dyn rusqlite::types::ToSql>>| {
            sql.push_str(&format!(" AND {clause} ?{}", params.len() + 1));
            params.push(Box::new(value));
        };
        if let Some(level) = &q.level {
            push("level =", level.to_uppercase(), &mut params);
        }
        if let Some(target) = &q.target {
            push("target LIKE", format!("%{target}%"), &mut params);
        }
        if let Some(session_id) = &q.session_id {
            push("session_id =", session_id.clone(), &mut params);
        }
        if let Some(cycle_id) = &q.cycle_id {
            push("cycle_id =", cycle_id.clone(), &mut params);
        }
        if let Some(since) = &q.since {
            push("timestamp >=", since.clone(), &mut params);
        }

        sql.push_str(&format!(" ORDER BY id DESC LIMIT {}", q.limit.unwrap_or(100)));

        let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(LogRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                level: row.get(2)?,
                target: row.get(3)?,
                message: row.get(4)?,
                fields: row.get(5)?,
                session_id: row.get(6)?,
                cycle_id: row.get(7)?,
                step: row.get(8)?,
            })
        })?;

        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
    }
}

/// Correlation fields lifted out of events and spans into their own columns.
#[derive(Clone, Debug, Default)]
struct LogContext {
    session_id: Option<String>,
    cycle_id: Option<String>,
    step: Option<String>,
}

impl LogContext {
    fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "session_id" => &mut self.session_id,
            "cycle_id" => &mut self.cycle_id,
            "step" => &mut self.step,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    fn fill_from(&mut self, other: &LogContext) {
        if self.session_id.is_none() {
            self.session_id.clone_from(&other.session_id);
        }
        if self.cycle_id.is_none() {
            self.cycle_id.clone_from(&other.cycle_id);
        }
        if self.step.is_none() {
            self.step.clone_from(&other.step);
        }
    }

    fn is_complete(&self) -> bool {
        self.session_id.is_some() && self.cycle_id.is_some() && self.step.is_some()
    }

    fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.cycle_id.is_none() && self.step.is_none()
    }
}

struct LogInsert {
    timestamp: String,
    level: String,
    target: String,
    message: String,
    fields: Option<String>,
    ctx: LogContext,
}

/// tracing Layer that writes warn+ events to SQLite.
pub struct SqliteLogLayer {
    sink: Arc<SqliteLogSink>,
}

impl SqliteLogLayer {
    pub fn new(sink: Arc<SqliteLogSink>) -> Self {
        Self { sink }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
    ctx: LogContext,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(val);
        } else if !self.ctx.set(field.name(), val.trim_matches('"').to_string()) {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::String(val));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else if !self.ctx.set(field.name(), value.to_string()) {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

impl<S> Layer<S> for SqliteLogLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        if !visitor.ctx.is_complete() {
            if let Some(scope) = ctx.event_scope(event) {
                for span in scope {
                    if let Some(span_ctx) = span.extensions().get::<LogContext>() {
                        visitor.ctx.fill_from(span_ctx);
                    }
                }
            }
        }

        let fields = if visitor.fields.is_empty() {
            None
        } else {
            serde_json::to_string(&visitor.fields).ok()
        };

        self.sink.insert(&LogInsert {
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_string().to_uppercase(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields,
            ctx: visitor.ctx,
        });
    }

    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);

        if !visitor.ctx.is_empty() {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(visitor.ctx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tracing_subscriber::layer::SubscriberExt;

    fn temp_db() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ambient-test-logs-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("logs.db")
    }

    fn insert(sink: &SqliteLogSink, level: &str, message: &str, cycle: Option<&str>) {
        sink.insert(&LogInsert {
            timestamp: Utc::now().to_rfc3339(),
            level: level.into(),
            target: "ambient_engine::autonomy".into(),
            message: message.into(),
            fields: None,
            ctx: LogContext {
                cycle_id: cycle.map(String::from),
                ..Default::default()
            },
        });
    }

    #[test]
    fn query_by_level_and_cycle() {
        let sink = SqliteLogSink::new(&temp_db()).unwrap();
        insert(&sink, "WARN", "gate denied", Some("cycle_a"));
        insert(&sink, "ERROR", "think failed", Some("cycle_b"));
        insert(&sink, "WARN", "overrun", None);

        assert_eq!(sink.count().unwrap(), 3);

        let errors = sink
            .query(&LogQuery {
                level: Some("error".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "think failed");

        let cycle_a = sink
            .query(&LogQuery {
                cycle_id: Some("cycle_a".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cycle_a.len(), 1);
        assert_eq!(cycle_a[0].message, "gate denied");
    }

    #[test]
    fn query_limit_orders_newest_first() {
        let sink = SqliteLogSink::new(&temp_db()).unwrap();
        for i in 0..5 {
            insert(&sink, "WARN", &format!("msg {i}"), None);
        }
        let rows = sink
            .query(&LogQuery {
                limit: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].message, "msg 4");
    }

    #[test]
    fn layer_lifts_span_context_into_columns() {
        let sink = Arc::new(SqliteLogSink::new(&temp_db()).unwrap());
        let subscriber = tracing_subscriber::registry().with(SqliteLogLayer::new(sink.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("cycle", cycle_id = "cycle_xyz");
            let _enter = span.enter();
            tracing::info!("not persisted");
            tracing::warn!(step = "think", error = "timeout", "think step failed");
        });

        let rows = sink.query(&LogQuery::default()).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.level, "WARN");
        assert_eq!(row.cycle_id.as_deref(), Some("cycle_xyz"));
        assert_eq!(row.step.as_deref(), Some("think"));
        assert!(row.fields.as_deref().unwrap_or_default().contains("timeout"));
    }
}
