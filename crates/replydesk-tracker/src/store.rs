use std::path::Path;

use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::types::{
    Filter, FollowUp, NewFollowUp, QueryOutput, Stats, Status, format_timestamp, parse_timestamp,
};
use crate::{Result, TrackerError};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Query the SQL console runs when the caller gives none.
pub const DEFAULT_CONSOLE_QUERY: &str = "SELECT * FROM followups ORDER BY sent_at DESC";

const SELECT_COLUMNS: &str =
    "id, subject, sender, sent_at, reply_summary, priority, deadline, status, notes";

/// Persistent follow-up records with SLA deadlines.
///
/// Thread-safe via internal `Mutex<Connection>`. Assumes a single writer
/// process.
pub struct FollowUpTracker {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for FollowUpTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FollowUpTracker").finish_non_exhaustive()
    }
}

impl FollowUpTracker {
    /// Open (or create) the database at `path` and run pending migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let mut tracker = Self {
            conn: Mutex::new(conn),
        };
        tracker.run_migrations()?;
        info!(path = %path.display(), "Follow-up tracker opened");
        Ok(tracker)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut tracker = Self {
            conn: Mutex::new(conn),
        };
        tracker.run_migrations()?;
        Ok(tracker)
    }

    fn run_migrations(&mut self) -> Result<()> {
        let conn = self.conn.get_mut();
        embedded::migrations::runner()
            .run(conn)
            .map_err(|e| TrackerError::Migration(e.to_string()))?;
        Ok(())
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Record a Pending follow-up sent now.
    pub fn create(&self, new: NewFollowUp) -> Result<FollowUp> {
        self.create_at(new, Utc::now())
    }

    /// Record a Pending follow-up sent at `sent_at`.
    ///
    /// The deadline is `sent_at + SLA(priority)` and is never recomputed.
    pub fn create_at(&self, new: NewFollowUp, sent_at: DateTime<Utc>) -> Result<FollowUp> {
        let sent_at = sent_at.trunc_subsecs(0);
        let deadline = sent_at + new.priority.sla();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO followups (subject, sender, sent_at, reply_summary, priority, deadline, status, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'Pending', '')",
            params![
                new.subject,
                new.sender,
                format_timestamp(sent_at),
                new.reply_summary,
                new.priority.label(),
                format_timestamp(deadline),
            ],
        )?;
        let id = conn.last_insert_rowid();

        info!(
            id,
            priority = new.priority.code(),
            deadline = %format_timestamp(deadline),
            "Follow-up created"
        );
        Ok(FollowUp {
            id,
            subject: new.subject,
            sender: new.sender,
            sent_at,
            reply_summary: new.reply_summary,
            priority: new.priority,
            deadline,
            status: Status::Pending,
            notes: String::new(),
        })
    }

    /// Set the status and replace the notes.
    pub fn set_status(&self, id: i64, status: Status, notes: &str) -> Result<()> {
        let changed = self.conn.lock().execute(
            "UPDATE followups SET status = ?1, notes = ?2 WHERE id = ?3",
            params![status.as_str(), notes, id],
        )?;
        if changed == 0 {
            return Err(TrackerError::NotFound(id));
        }
        info!(id, status = %status, "Follow-up status changed");
        Ok(())
    }

    /// Replace the notes, leaving the status alone.
    pub fn set_notes(&self, id: i64, notes: &str) -> Result<()> {
        let changed = self.conn.lock().execute(
            "UPDATE followups SET notes = ?1 WHERE id = ?2",
            params![notes, id],
        )?;
        if changed == 0 {
            return Err(TrackerError::NotFound(id));
        }
        info!(id, "Follow-up notes updated");
        Ok(())
    }

    pub fn delete(&self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM followups WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(TrackerError::NotFound(id));
        }
        info!(id, "Follow-up deleted");
        Ok(())
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub fn get(&self, id: i64) -> Result<FollowUp> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {SELECT_COLUMNS} FROM followups WHERE id = ?1");
        let raw = conn
            .query_row(&sql, params![id], RawRow::from_row)
            .optional()?
            .ok_or(TrackerError::NotFound(id))?;
        raw.into_follow_up()
    }

    /// Rows matching `filter`, ascending by deadline.
    pub fn list(&self, filter: Filter, now: DateTime<Utc>) -> Result<Vec<FollowUp>> {
        let rows = self.all()?;
        Ok(rows.into_iter().filter(|r| filter.matches(r, now)).collect())
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Result<Stats> {
        let rows = self.all()?;
        let mut stats = Stats {
            total: rows.len(),
            ..Default::default()
        };
        for row in &rows {
            match row.status {
                Status::Pending => stats.pending += 1,
                Status::Resolved => stats.resolved += 1,
                Status::Escalated => stats.escalated += 1,
            }
            if row.is_overdue(now) {
                stats.overdue += 1;
            }
        }
        Ok(stats)
    }

    fn all(&self) -> Result<Vec<FollowUp>> {
        let raw = {
            let conn = self.conn.lock();
            let sql = format!("SELECT {SELECT_COLUMNS} FROM followups ORDER BY deadline ASC, id ASC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], RawRow::from_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        raw.into_iter().map(RawRow::into_follow_up).collect()
    }

    // ── SQL console ─────────────────────────────────────────────────

    /// Run one ad-hoc statement for inspection.
    ///
    /// Statements that SQLite does not classify as read-only are rejected
    /// before execution, as are transaction control and `ATTACH`/`DETACH`,
    /// which SQLite counts as read-only but which change connection state.
    pub fn query_readonly(&self, sql: &str) -> Result<QueryOutput> {
        let sql = sql.trim();
        let sql = if sql.is_empty() { DEFAULT_CONSOLE_QUERY } else { sql };
        if changes_connection_state(sql) {
            return Err(TrackerError::ReadOnly(sql.to_string()));
        }

        let conn = self.conn.lock();
        let (columns, out) = {
            let mut stmt = conn.prepare(sql)?;
            if !stmt.readonly() {
                return Err(TrackerError::ReadOnly(sql.to_string()));
            }

            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let width = columns.len();
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(value_to_json(row.get_ref(i)?));
                }
                out.push(values);
            }
            (columns, out)
        };

        // Anything that slipped past the keyword check and opened a
        // transaction is undone before the connection is shared again.
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
            return Err(TrackerError::ReadOnly(sql.to_string()));
        }

        debug!(rows = out.len(), "SQL console query");
        Ok(QueryOutput {
            columns,
            rows: out,
        })
    }
}

/// Transaction control and database attachment, by leading keyword.
fn changes_connection_state(sql: &str) -> bool {
    const KEYWORDS: [&str; 8] = [
        "BEGIN", "COMMIT", "END", "ROLLBACK", "SAVEPOINT", "RELEASE", "ATTACH", "DETACH",
    ];
    let first = sql
        .split(|c: char| !c.is_ascii_alphabetic())
        .find(|w| !w.is_empty())
        .unwrap_or_default();
    KEYWORDS.iter().any(|k| first.eq_ignore_ascii_case(k))
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => i.into(),
        ValueRef::Real(f) => f.into(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned().into(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()).into(),
    }
}

/// Row as stored, before parsing enums and timestamps.
struct RawRow {
    id: i64,
    subject: String,
    sender: String,
    sent_at: String,
    reply_summary: String,
    priority: String,
    deadline: String,
    status: String,
    notes: String,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject: row.get(1)?,
            sender: row.get(2)?,
            sent_at: row.get(3)?,
            reply_summary: row.get(4)?,
            priority: row.get(5)?,
            deadline: row.get(6)?,
            status: row.get(7)?,
            notes: row.get(8)?,
        })
    }

    fn into_follow_up(self) -> Result<FollowUp> {
        Ok(FollowUp {
            id: self.id,
            subject: self.subject,
            sender: self.sender,
            sent_at: parse_timestamp(&self.sent_at)?,
            reply_summary: self.reply_summary,
            priority: self.priority.parse()?,
            deadline: parse_timestamp(&self.deadline)?,
            status: self.status.parse()?,
            notes: self.notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Indicator, Priority};
    use chrono::{TimeDelta, TimeZone};

    fn test_tracker() -> FollowUpTracker {
        FollowUpTracker::open_in_memory().expect("failed to open in-memory tracker")
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
    }

    fn new(subject: &str, priority: Priority) -> NewFollowUp {
        NewFollowUp::new(subject, "ops@partner.example", "Renewed the certificate", priority)
    }

    #[test]
    fn test_migrations_run() {
        let _tracker = test_tracker();
    }

    #[test]
    fn test_create_sets_sla_deadline() {
        let tracker = test_tracker();
        let row = tracker
            .create_at(new("AS2 down", "P1 - Production Down".parse().unwrap()), t0())
            .unwrap();

        assert_eq!(row.status, Status::Pending);
        assert_eq!(row.deadline, t0() + TimeDelta::hours(2));
        assert!(row.notes.is_empty());

        let fetched = tracker.get(row.id).unwrap();
        assert_eq!(fetched, row);
        assert!(!fetched.is_overdue(t0() + TimeDelta::hours(2)));
        assert!(fetched.is_overdue(t0() + TimeDelta::hours(2) + TimeDelta::seconds(1)));
    }

    #[test]
    fn test_subsecond_precision_is_dropped() {
        let tracker = test_tracker();
        let sent = t0() + TimeDelta::milliseconds(750);
        let row = tracker.create_at(new("x", Priority::P4), sent).unwrap();
        assert_eq!(row.sent_at, t0());
        assert_eq!(tracker.get(row.id).unwrap().sent_at, t0());
    }

    #[test]
    fn test_set_status_overwrites_notes() {
        let tracker = test_tracker();
        let row = tracker.create_at(new("x", Priority::P3), t0()).unwrap();

        tracker.set_status(row.id, Status::Escalated, "called partner").unwrap();
        tracker.set_status(row.id, Status::Resolved, "").unwrap();
        let fetched = tracker.get(row.id).unwrap();
        assert_eq!(fetched.status, Status::Resolved);
        assert_eq!(fetched.notes, "");

        tracker.set_notes(row.id, "confirmed by JO").unwrap();
        let fetched = tracker.get(row.id).unwrap();
        assert_eq!(fetched.status, Status::Resolved);
        assert_eq!(fetched.notes, "confirmed by JO");

        assert!(matches!(
            tracker.set_status(999, Status::Resolved, ""),
            Err(TrackerError::NotFound(999))
        ));
    }

    #[test]
    fn test_list_orders_by_deadline_and_filters() {
        let tracker = test_tracker();
        let slow = tracker.create_at(new("slow", Priority::P4), t0()).unwrap();
        let urgent = tracker.create_at(new("urgent", Priority::P1), t0()).unwrap();
        let mid = tracker.create_at(new("mid", Priority::P2), t0()).unwrap();
        tracker.set_status(mid.id, Status::Resolved, "").unwrap();

        let now = t0() + TimeDelta::hours(5);
        let all: Vec<i64> = tracker
            .list(Filter::All, now)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(all, vec![urgent.id, mid.id, slow.id]);

        let overdue = tracker.list(Filter::OverdueOnly, now).unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, urgent.id);
        assert_eq!(overdue[0].indicator(now), Indicator::Alert);

        assert_eq!(tracker.list(Filter::Pending, now).unwrap().len(), 2);
        assert_eq!(tracker.list(Filter::Resolved, now).unwrap().len(), 1);
        assert!(tracker.list(Filter::Escalated, now).unwrap().is_empty());

        let stats = tracker.stats(now).unwrap();
        assert_eq!(
            stats,
            Stats {
                total: 3,
                pending: 2,
                resolved: 1,
                escalated: 0,
                overdue: 1,
            }
        );
    }

    #[test]
    fn test_delete() {
        let tracker = test_tracker();
        let row = tracker.create_at(new("x", Priority::P2), t0()).unwrap();
        tracker.delete(row.id).unwrap();
        assert!(matches!(tracker.get(row.id), Err(TrackerError::NotFound(_))));
        assert!(matches!(tracker.delete(row.id), Err(TrackerError::NotFound(_))));
    }

    #[test]
    fn test_sql_console_reads() {
        let tracker = test_tracker();
        tracker.create_at(new("first", Priority::P1), t0()).unwrap();
        tracker
            .create_at(new("second", Priority::P2), t0() + TimeDelta::hours(1))
            .unwrap();

        let out = tracker.query_readonly("").unwrap();
        assert_eq!(out.columns[0], "id");
        assert_eq!(out.columns.len(), 9);
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0][1], serde_json::json!("second"));

        let out = tracker
            .query_readonly("SELECT COUNT(*) AS n FROM followups WHERE deadline < '2025-06-02 12:00:00'")
            .unwrap();
        assert_eq!(out.columns, vec!["n".to_string()]);
        assert_eq!(out.rows, vec![vec![serde_json::json!(1)]]);
    }

    #[test]
    fn test_sql_console_rejects_writes() {
        let tracker = test_tracker();
        tracker.create_at(new("keep", Priority::P1), t0()).unwrap();

        for sql in [
            "DELETE FROM followups",
            "UPDATE followups SET status = 'Resolved'",
            "DROP TABLE followups",
            "INSERT INTO followups (subject) VALUES ('x')",
        ] {
            assert!(
                matches!(tracker.query_readonly(sql), Err(TrackerError::ReadOnly(_))),
                "{sql} should be rejected"
            );
        }
        assert_eq!(tracker.stats(t0()).unwrap().total, 1);
    }

    #[test]
    fn test_sql_console_rejects_transaction_control() {
        let tracker = test_tracker();
        tracker.create_at(new("keep", Priority::P1), t0()).unwrap();

        for sql in [
            "BEGIN",
            "begin immediate",
            "SAVEPOINT console",
            "COMMIT",
            "ATTACH DATABASE ':memory:' AS other",
            "DETACH other",
        ] {
            assert!(
                matches!(tracker.query_readonly(sql), Err(TrackerError::ReadOnly(_))),
                "{sql} should be rejected"
            );
        }

        // The shared connection is still in autocommit mode, so writes land.
        tracker.set_status(1, Status::Resolved, "done").unwrap();
        assert!(tracker.conn.lock().is_autocommit());
        assert_eq!(tracker.query_readonly("").unwrap().rows.len(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("followups.db");
        let id = {
            let tracker = FollowUpTracker::open(&path).unwrap();
            tracker.create_at(new("persist", Priority::P3), t0()).unwrap().id
        };
        let tracker = FollowUpTracker::open(&path).unwrap();
        assert_eq!(tracker.get(id).unwrap().subject, "persist");
    }

    proptest::proptest! {
        #[test]
        fn prop_deadline_is_sent_plus_sla(offset_mins in 0i64..100_000, p in 0usize..4) {
            let tracker = test_tracker();
            let priority = Priority::ALL[p];
            let sent = t0() + TimeDelta::minutes(offset_mins);
            let row = tracker.create_at(new("p", priority), sent).unwrap();
            proptest::prop_assert_eq!(row.deadline - row.sent_at, TimeDelta::hours(priority.sla_hours()));
            proptest::prop_assert!(!row.is_overdue(row.deadline));
            proptest::prop_assert!(row.is_overdue(row.deadline + TimeDelta::seconds(1)));
        }
    }
}
