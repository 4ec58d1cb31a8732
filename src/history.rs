//! Persisted classification history.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

/// Receives completed classification results. Fire-and-forget from the
/// pipeline's perspective: the session worker logs errors and moves on.
pub trait ResultSink: Send {
    fn record(&mut self, label: &str, recorded_at: DateTime<Utc>) -> Result<()>;
}

/// One persisted classification.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryRow {
    pub id: i64,
    pub label: String,
    pub recorded_at: DateTime<Utc>,
}

/// SQLite-backed gesture history.
pub struct SqliteHistory {
    conn: Connection,
}

impl SqliteHistory {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open history database at {}", path.display()))?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("failed to open in-memory database")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS gestures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                gesture TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )",
            [],
        )
        .context("failed to create gestures table")?;
        Ok(Self { conn })
    }

    /// Newest-first slice of the history.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, gesture, recorded_at FROM gestures
             ORDER BY recorded_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, label, recorded_at) = row?;
            let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
                .with_context(|| format!("invalid timestamp in history row {id}"))?
                .with_timezone(&Utc);
            out.push(HistoryRow {
                id,
                label,
                recorded_at,
            });
        }
        Ok(out)
    }
}

impl ResultSink for SqliteHistory {
    fn record(&mut self, label: &str, recorded_at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO gestures (gesture, recorded_at) VALUES (?1, ?2)",
            params![label, recorded_at.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn records_round_trip_newest_first() {
        let mut history = SqliteHistory::open_in_memory().unwrap();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        for (i, label) in ["oliguria", "tinitus", "taquicardia"].iter().enumerate() {
            history
                .record(label, base + chrono::Duration::seconds(i as i64))
                .unwrap();
        }

        let rows = history.recent(2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, "taquicardia");
        assert_eq!(rows[1].label, "tinitus");
        assert_eq!(rows[0].recorded_at, base + chrono::Duration::seconds(2));
    }

    #[test]
    fn recent_on_empty_history_is_empty() {
        let history = SqliteHistory::open_in_memory().unwrap();
        assert!(history.recent(10).unwrap().is_empty());
    }
}
