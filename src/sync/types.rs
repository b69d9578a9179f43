//! Sync data types
//!
//! Wire-level snapshots exchanged during a sync round:
//! - Goal and completion change records
//! - The request a client sends and the response the server returns

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{completion_id, Completion, Goal};

/// A goal as a self-contained snapshot plus its logical clock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalChange {
    pub id: String,
    pub name: String,
    pub color: String,
    pub position: i32,
    pub updated_at: DateTime<Utc>,
    /// Tombstone flag
    pub deleted: bool,
}

impl From<&Goal> for GoalChange {
    fn from(goal: &Goal) -> Self {
        Self {
            id: goal.id.clone(),
            name: goal.name.clone(),
            color: goal.color.clone(),
            position: goal.position,
            updated_at: goal.updated_at,
            deleted: goal.is_deleted(),
        }
    }
}

/// A completion mark for one goal on one day
///
/// The completion id is never transmitted; both sides derive it from
/// `goal_id` and `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionChange {
    pub goal_id: String,
    /// Calendar day, serialized as `YYYY-MM-DD`
    pub date: NaiveDate,
    /// `false` means the mark was removed
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl CompletionChange {
    pub fn completion_id(&self) -> String {
        completion_id(&self.goal_id, self.date)
    }
}

impl From<&Completion> for CompletionChange {
    fn from(completion: &Completion) -> Self {
        Self {
            goal_id: completion.goal_id.clone(),
            date: completion.date,
            completed: completion.is_active(),
            updated_at: completion.updated_at,
        }
    }
}

/// Request sent by a client to reconcile its local state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Server time returned by the client's previous successful sync
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub goals: Vec<GoalChange>,
    #[serde(default)]
    pub completions: Vec<CompletionChange>,
}

/// Authoritative server answer to a sync round
///
/// Empty change lists mean the client's submitted state was fully accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Checkpoint the client should send as `last_synced_at` next time
    pub server_time: DateTime<Utc>,
    pub goals: Vec<GoalChange>,
    pub completions: Vec<CompletionChange>,
}

impl SyncResponse {
    pub fn is_empty(&self) -> bool {
        self.goals.is_empty() && self.completions.is_empty()
    }
}
