//! Stored entities: goals and their daily completions

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A named, colored, ordered habit definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub color: String,
    pub position: i32,
    /// Owning user, `None` for guest-mode goals
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Logical clock used for conflict resolution
    pub updated_at: DateTime<Utc>,
    /// Set when the user paused tracking; sync never touches it
    pub archived_at: Option<DateTime<Utc>>,
    /// Sync tombstone
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Goal {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner.as_deref() == Some(user_id)
    }
}

/// A "done" mark for one goal on one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub id: String,
    pub goal_id: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Tombstone; a tombstoned completion counts as "not done"
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Completion {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Derive the identifier of the completion for `goal_id` on `date`.
///
/// Two devices creating the same day's completion independently always end
/// up with the same id, so there is no allocation race.
pub fn completion_id(goal_id: &str, date: NaiveDate) -> String {
    format!("{}-{}", goal_id, date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_id_is_deterministic() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(completion_id("g1", date), "g1-2026-01-05");
        assert_eq!(completion_id("g1", date), completion_id("g1", date));
    }

    #[test]
    fn test_completion_id_pads_single_digits() {
        let date = NaiveDate::from_ymd_opt(987, 3, 9).unwrap();
        assert_eq!(completion_id("abc", date), "abc-0987-03-09");
    }

    #[test]
    fn test_goal_ownership() {
        let now = Utc::now();
        let mut goal = Goal {
            id: "g1".to_string(),
            name: "Read".to_string(),
            color: "#ff0000".to_string(),
            position: 0,
            owner: Some("alice".to_string()),
            created_at: now,
            updated_at: now,
            archived_at: None,
            deleted_at: None,
        };
        assert!(goal.is_owned_by("alice"));
        assert!(!goal.is_owned_by("bob"));

        goal.owner = None;
        assert!(!goal.is_owned_by("alice"));
    }
}
