//! Action log records.
//!
//! Every state change the service performs (a planned or manual placement,
//! a move during rearrangement, a retrieval, a disposal) leaves one
//! [`LogEntry`]. Entries are append-only and are queried with a
//! [`LogFilter`].

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

/// Kind of a logged action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Placement,
    Retrieval,
    Rearrangement,
    Disposal,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Placement => "placement",
            ActionType::Retrieval => "retrieval",
            ActionType::Rearrangement => "rearrangement",
            ActionType::Disposal => "disposal",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the action log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "timestamp": 1760659200,
    "userId": "astronaut-7",
    "actionType": "placement",
    "itemId": "I1",
    "details": { "containerId": "C1" }
}))]
pub struct LogEntry {
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Who asked for the action, if the caller said so.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub action_type: ActionType,
    pub item_id: String,
    /// Action-specific payload, e.g. source and target containers.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub details: Value,
}

impl LogEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(
        action_type: ActionType,
        item_id: impl Into<String>,
        user_id: Option<&str>,
        details: Value,
    ) -> Self {
        Self {
            timestamp: unix_now(),
            user_id: user_id.map(str::to_string),
            action_type,
            item_id: item_id.into(),
            details,
        }
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Query over the action log. Empty fields match everything; date bounds
/// are inclusive Unix seconds.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(default)]
    pub start_date: Option<u64>,
    #[serde(default)]
    pub end_date: Option<u64>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub action_type: Option<ActionType>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.start_date.is_none_or(|start| entry.timestamp >= start)
            && self.end_date.is_none_or(|end| entry.timestamp <= end)
            && self
                .item_id
                .as_deref()
                .is_none_or(|id| entry.item_id == id)
            && self
                .user_id
                .as_deref()
                .is_none_or(|user| entry.user_id.as_deref() == Some(user))
            && self
                .action_type
                .is_none_or(|action| entry.action_type == action)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
