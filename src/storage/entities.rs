use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Canonical domain identifier used as the aggregation key. Shared across the
/// active session, both totals maps and the session log, so it's refcounted.
pub type TrackingKey = Arc<str>;

/// Accumulated seconds per domain.
pub type TotalsMap = BTreeMap<TrackingKey, u64>;

/// The session log is capped to this many most-recent entries to keep the
/// state file from growing without bound.
pub const SESSION_LOG_CAP: usize = 1000;

/// One closed tracked interval for a domain. A long stay on a single page
/// produces several consecutive records sharing the same id, one per flush.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub domain: TrackingKey,
    pub tab_id: i64,
    #[serde(rename = "startTime", with = "chrono::serde::ts_milliseconds")]
    pub start: DateTime<Utc>,
    #[serde(rename = "endTime", with = "chrono::serde::ts_milliseconds")]
    pub end: DateTime<Utc>,
    #[serde(rename = "duration")]
    pub duration_secs: u64,
    pub date: NaiveDate,
}

/// Dashboard color scheme. Owned by the UI collaborator, the engine only
/// carries it through the state file untouched.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Copy, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Auto,
    Light,
    Dark,
}

/// Full persisted state. Field names on the wire follow the original storage
/// schema so an exported dashboard snapshot stays readable.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Default)]
pub struct StoreSnapshot {
    #[serde(rename = "dailyData", default)]
    pub daily: TotalsMap,
    #[serde(rename = "lifetimeData", default)]
    pub lifetime: TotalsMap,
    #[serde(rename = "sessionData", default)]
    pub sessions: Vec<SessionRecord>,
    #[serde(default)]
    pub limits: TotalsMap,
    #[serde(rename = "lastResetDate", default)]
    pub last_reset_date: Option<NaiveDate>,
    #[serde(default)]
    pub theme: Theme,
}

impl StoreSnapshot {
    /// Drops oldest sessions past [SESSION_LOG_CAP].
    pub fn trim_sessions(&mut self) {
        if self.sessions.len() > SESSION_LOG_CAP {
            let excess = self.sessions.len() - SESSION_LOG_CAP;
            self.sessions.drain(..excess);
        }
    }
}
