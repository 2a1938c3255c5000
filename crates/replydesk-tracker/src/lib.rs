//! Follow-up tracking for sent support replies.
//!
//! Every sent reply can spawn a [`FollowUp`] whose deadline is fixed at
//! creation from its [`Priority`] SLA (P1 2h, P2 4h, P3 24h, P4 48h).
//! Rows move from `Pending` to `Resolved` or `Escalated`; a pending row past
//! its deadline is overdue.

pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, TrackerError};
pub use store::{DEFAULT_CONSOLE_QUERY, FollowUpTracker};
pub use types::{
    Filter, FollowUp, Indicator, NewFollowUp, Priority, QueryOutput, Stats, Status,
    TIMESTAMP_FORMAT, format_timestamp, parse_timestamp,
};
