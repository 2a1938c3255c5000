//! Follow-up records, priorities and dashboard types.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Storage format for `sent_at` and `deadline` (UTC). Lexicographic order
/// matches chronological order and SQLite's `datetime('now')` output.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, TrackerError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| TrackerError::InvalidValue(format!("timestamp '{s}': {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Priority
// ─────────────────────────────────────────────────────────────────────────────

/// Support priority, which fixes the SLA window.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Priority {
    P1,
    P2,
    #[default]
    P3,
    P4,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::P1, Priority::P2, Priority::P3, Priority::P4];

    pub fn code(&self) -> &'static str {
        match self {
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
            Priority::P4 => "P4",
        }
    }

    /// Full label, as stored in the `priority` column.
    pub fn label(&self) -> &'static str {
        match self {
            Priority::P1 => "P1 - Production Down",
            Priority::P2 => "P2 - Degraded Service",
            Priority::P3 => "P3 - Non-critical",
            Priority::P4 => "P4 - General Query",
        }
    }

    pub fn sla_hours(&self) -> i64 {
        match self {
            Priority::P1 => 2,
            Priority::P2 => 4,
            Priority::P3 => 24,
            Priority::P4 => 48,
        }
    }

    pub fn sla(&self) -> TimeDelta {
        TimeDelta::hours(self.sla_hours())
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = TrackerError;

    /// Accepts the short code (`p1`, `P1`) or the full label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Priority::ALL
            .into_iter()
            .find(|p| s.eq_ignore_ascii_case(p.code()) || s.eq_ignore_ascii_case(p.label()))
            .ok_or_else(|| TrackerError::InvalidValue(format!("unknown priority '{s}'")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// Follow-up lifecycle state.
///
/// The intended flow is `Pending -> Resolved | Escalated`, but any status can
/// be set at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Resolved,
    Escalated,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Resolved => "Resolved",
            Status::Escalated => "Escalated",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "resolved" => Ok(Status::Resolved),
            "escalated" => Ok(Status::Escalated),
            other => Err(TrackerError::InvalidValue(format!("unknown status '{other}'"))),
        }
    }
}

/// Traffic-light classification for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    /// Resolved.
    Ok,
    /// Escalated, or still pending past the deadline.
    Alert,
    /// Pending within its SLA.
    Waiting,
}

// ─────────────────────────────────────────────────────────────────────────────
// Follow-up
// ─────────────────────────────────────────────────────────────────────────────

/// A sent reply awaiting resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowUp {
    pub id: i64,
    pub subject: String,
    pub sender: String,
    pub sent_at: DateTime<Utc>,
    pub reply_summary: String,
    pub priority: Priority,
    /// `sent_at + priority.sla()`, fixed at creation.
    pub deadline: DateTime<Utc>,
    pub status: Status,
    pub notes: String,
}

impl FollowUp {
    /// Pending and past its deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == Status::Pending && self.deadline < now
    }

    pub fn indicator(&self, now: DateTime<Utc>) -> Indicator {
        match self.status {
            Status::Resolved => Indicator::Ok,
            Status::Escalated => Indicator::Alert,
            Status::Pending if self.is_overdue(now) => Indicator::Alert,
            Status::Pending => Indicator::Waiting,
        }
    }

    /// Time left before the deadline; negative once overdue.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        self.deadline - now
    }
}

/// Fields supplied when recording a follow-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFollowUp {
    pub subject: String,
    pub sender: String,
    pub reply_summary: String,
    pub priority: Priority,
}

impl NewFollowUp {
    pub fn new(
        subject: impl Into<String>,
        sender: impl Into<String>,
        reply_summary: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            subject: subject.into(),
            sender: sender.into(),
            reply_summary: reply_summary.into(),
            priority,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listing
// ─────────────────────────────────────────────────────────────────────────────

/// List filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    Pending,
    Resolved,
    Escalated,
    /// Pending rows past their deadline.
    OverdueOnly,
}

impl Filter {
    pub fn matches(&self, row: &FollowUp, now: DateTime<Utc>) -> bool {
        match self {
            Filter::All => true,
            Filter::Pending => row.status == Status::Pending,
            Filter::Resolved => row.status == Status::Resolved,
            Filter::Escalated => row.status == Status::Escalated,
            Filter::OverdueOnly => row.is_overdue(now),
        }
    }
}

impl FromStr for Filter {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "all" => Ok(Filter::All),
            "pending" => Ok(Filter::Pending),
            "resolved" => Ok(Filter::Resolved),
            "escalated" => Ok(Filter::Escalated),
            "overdue" | "overdueonly" => Ok(Filter::OverdueOnly),
            _ => Err(TrackerError::InvalidValue(format!("unknown filter '{s}'"))),
        }
    }
}

/// Dashboard counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub pending: usize,
    pub resolved: usize,
    pub escalated: usize,
    pub overdue: usize,
}

/// Output of the read-only SQL console.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}
