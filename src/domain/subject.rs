use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

/// Monitoring status of a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    /// Scheduled for polling
    Active,
    /// Excluded from scheduling, state frozen
    Paused,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Active => "active",
            MonitorStatus::Paused => "paused",
        }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A monitored player identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    /// Normalized tag: `#`-stripped, uppercase
    pub tag: String,
    /// Display name, refreshed from profile fetches
    pub name: String,
    pub status: MonitorStatus,
    pub created_at: DateTime<Utc>,
    /// Arena the subject was last seen in
    #[serde(default)]
    pub arena: Option<String>,
    #[serde(default)]
    pub trophies: Option<i64>,
}

impl Subject {
    pub fn new(tag: String, name: String) -> Self {
        Self {
            tag,
            name,
            status: MonitorStatus::Active,
            created_at: Utc::now(),
            arena: None,
            trophies: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MonitorStatus::Active
    }
}

/// Normalize a player tag: strip the leading `#`, uppercase, and reject
/// anything that cannot be a tag. Comparison is always on the normalized
/// form.
pub fn normalize_tag(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_start_matches('#');
    if trimmed.is_empty() {
        return Err(WatchError::InvalidTag(raw.to_string()));
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(WatchError::InvalidTag(raw.to_string()));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Render a normalized tag back in display form.
pub fn display_tag(tag: &str) -> String {
    format!("#{}", tag)
}
