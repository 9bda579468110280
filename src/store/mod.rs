//! Task and user persistence.
//!
//! The scheduler only talks to the [`TaskStore`] and [`UserDirectory`]
//! traits; [`SqliteStore`] is the bundled implementation and also backs the
//! default send ledger.

pub(crate) mod schema;
pub mod sqlite;

use crate::error::Result;
use crate::model::{NewTask, StatusCounts, Task, TaskId, TaskStatus, User, UserId};
use chrono::{DateTime, NaiveDate, Utc};

pub use sqlite::SqliteStore;

/// Per-user, per-day task storage.
pub trait TaskStore: Send + Sync {
    /// Tasks of one user and day in agenda order: priority rank, then due
    /// time ascending with missing last, then insertion order.
    fn list_tasks(
        &self,
        user_id: UserId,
        day: NaiveDate,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>>;

    /// Insert one validated task and return its id.
    fn insert_task(&self, task: &NewTask) -> Result<TaskId>;

    /// Insert several tasks atomically; either all rows land or none do.
    fn insert_tasks(&self, tasks: &[NewTask]) -> Result<Vec<TaskId>>;

    /// Change a task's status. Returns `false` when the user has no such task.
    fn update_status(&self, user_id: UserId, id: TaskId, status: TaskStatus) -> Result<bool>;

    /// Remove a task. Returns `false` when the user has no such task.
    fn delete_task(&self, user_id: UserId, id: TaskId) -> Result<bool>;

    /// Status totals for tasks dated within `from..=to`.
    fn status_counts(&self, user_id: UserId, from: NaiveDate, to: NaiveDate)
    -> Result<StatusCounts>;
}

/// Known users and their timezones.
pub trait UserDirectory: Send + Sync {
    /// Fetch a user, creating it with `default_tz` on first contact.
    fn get_or_create_user(&self, user_id: UserId, default_tz: &str) -> Result<User>;

    /// Store a new timezone name. Callers validate the name first.
    fn set_timezone(&self, user_id: UserId, timezone: &str) -> Result<()>;

    /// Snapshot of every known user.
    fn list_users(&self) -> Result<Vec<User>>;
}

/// Current owner of a named lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseHolder {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Named, expiring ownership shared by every process using one database.
pub trait LeaseStore: Send + Sync {
    /// Claim or extend `name` for `holder` until `expires_at`.
    ///
    /// The claim only succeeds when `holder` already owns the row or the
    /// current owner's expiry is at or before `now`. Returns the owner after
    /// the attempt, which is someone else when the claim was refused.
    fn claim_lease(
        &self,
        name: &str,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<LeaseHolder>;

    /// Drop `name` if `holder` still owns it. Returns `false` otherwise.
    fn release_lease(&self, name: &str, holder: &str) -> Result<bool>;
}
