//! SQLite-backed task store, user directory, send ledger and lease table.
//!
//! Thread-safe via an internal `Mutex<Connection>`. All reads and writes are
//! serialized, which is also what makes the ledger's insert-if-absent atomic
//! with respect to concurrent tickers in one process.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::schema::{apply_schema, read_schema_version};
use super::{LeaseHolder, LeaseStore, TaskStore, UserDirectory};
use crate::error::{NudgeError, Result};
use crate::ledger::SendLedger;
use crate::model::{
    DueTime, NewTask, Priority, SendKey, StatusCounts, Task, TaskId, TaskStatus, User, UserId,
};

const DAY_FORMAT: &str = "%Y-%m-%d";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TASK_COLUMNS: &str =
    "id, user_id, title, day, due_time, priority, tags, status, carried_from";

/// SQLite store for users, tasks and sent slots.
pub struct SqliteStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file, creating parent directories.
    ///
    /// Applies the schema if the database is new.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // Other bot processes may share the file through the ticker lease.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        apply_schema(&conn)?;
        tracing::info!(path = %path.display(), "task store opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| NudgeError::Store(format!("connection lock poisoned: {e}")))
    }
}

impl TaskStore for SqliteStore {
    fn list_tasks(
        &self,
        user_id: UserId,
        day: NaiveDate,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let day_str = day.format(DAY_FORMAT).to_string();
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {TASK_COLUMNS} FROM tasks \
                     WHERE user_id = ?1 AND day = ?2 AND status = ?3 ORDER BY id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mapped = stmt.query_map(
                    params![user_id.0, day_str, status.as_str()],
                    TaskRow::from_row,
                )?;
                mapped.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let sql = format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 AND day = ?2 ORDER BY id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mapped = stmt.query_map(params![user_id.0, day_str], TaskRow::from_row)?;
                mapped.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        drop(conn);

        let mut tasks = rows
            .into_iter()
            .map(TaskRow::into_task)
            .collect::<Result<Vec<_>>>()?;
        // Stable sort over id order keeps insertion order as the final tiebreak.
        tasks.sort_by(Task::agenda_cmp);
        Ok(tasks)
    }

    fn insert_task(&self, task: &NewTask) -> Result<TaskId> {
        task.validate()?;
        let conn = self.lock()?;
        insert_row(&conn, task)
    }

    fn insert_tasks(&self, tasks: &[NewTask]) -> Result<Vec<TaskId>> {
        for task in tasks {
            task.validate()?;
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            ids.push(insert_row(&tx, task)?);
        }
        tx.commit()?;
        Ok(ids)
    }

    fn update_status(&self, user_id: UserId, id: TaskId, status: TaskStatus) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2 AND user_id = ?3",
            params![status.as_str(), id.0, user_id.0],
        )?;
        Ok(rows > 0)
    }

    fn delete_task(&self, user_id: UserId, id: TaskId) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
            params![id.0, user_id.0],
        )?;
        Ok(rows > 0)
    }

    fn status_counts(
        &self,
        user_id: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<StatusCounts> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM tasks \
             WHERE user_id = ?1 AND day BETWEEN ?2 AND ?3 GROUP BY status",
        )?;
        let rows = stmt.query_map(
            params![
                user_id.0,
                from.format(DAY_FORMAT).to_string(),
                to.format(DAY_FORMAT).to_string()
            ],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)),
        )?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, count) = row?;
            match status.parse::<TaskStatus>()? {
                TaskStatus::Open => counts.open += count,
                TaskStatus::Done => counts.done += count,
                TaskStatus::Snoozed => counts.snoozed += count,
            }
        }
        Ok(counts)
    }
}

impl UserDirectory for SqliteStore {
    fn get_or_create_user(&self, user_id: UserId, default_tz: &str) -> Result<User> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO users (user_id, timezone, created_at) VALUES (?1, ?2, ?3)",
            params![user_id.0, default_tz, now_epoch_secs()],
        )?;
        let timezone: String = conn.query_row(
            "SELECT timezone FROM users WHERE user_id = ?1",
            params![user_id.0],
            |row| row.get(0),
        )?;
        Ok(User { user_id, timezone })
    }

    fn set_timezone(&self, user_id: UserId, timezone: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (user_id, timezone, created_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(user_id) DO UPDATE SET timezone = excluded.timezone",
            params![user_id.0, timezone, now_epoch_secs()],
        )?;
        Ok(())
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT user_id, timezone FROM users ORDER BY user_id")?;
        let rows = stmt.query_map([], |row| {
            Ok(User {
                user_id: UserId(row.get(0)?),
                timezone: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl SendLedger for SqliteStore {
    fn was_sent(&self, key: &SendKey) -> Result<bool> {
        let conn = self.lock().map_err(ledger_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT 1 FROM sends WHERE user_id = ?1 AND kind = ?2 AND day = ?3 AND hour = ?4",
            )
            .map_err(ledger_err)?;
        let exists = stmt
            .exists(params![
                key.user_id.0,
                key.kind.as_str(),
                key.day.format(DAY_FORMAT).to_string(),
                key.hour
            ])
            .map_err(ledger_err)?;
        Ok(exists)
    }

    fn mark_sent(&self, key: &SendKey) -> Result<bool> {
        let conn = self.lock().map_err(ledger_err)?;
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO sends (user_id, kind, day, hour, sent_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    key.user_id.0,
                    key.kind.as_str(),
                    key.day.format(DAY_FORMAT).to_string(),
                    key.hour,
                    now_epoch_secs()
                ],
            )
            .map_err(ledger_err)?;
        Ok(rows > 0)
    }
}

impl LeaseStore for SqliteStore {
    fn claim_lease(
        &self,
        name: &str,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<LeaseHolder> {
        let conn = self.lock()?;
        // The conditional upsert is a single statement, so two processes on
        // the same file cannot both win an expired row.
        conn.execute(
            "INSERT INTO leases (name, holder, acquired_at, expires_at_ms) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(name) DO UPDATE SET \
                 acquired_at = CASE WHEN leases.holder = excluded.holder \
                               THEN leases.acquired_at ELSE excluded.acquired_at END, \
                 holder = excluded.holder, \
                 expires_at_ms = excluded.expires_at_ms \
             WHERE leases.holder = excluded.holder OR leases.expires_at_ms <= ?3",
            params![
                name,
                holder,
                now.timestamp_millis(),
                expires_at.timestamp_millis()
            ],
        )?;
        let row = conn
            .query_row(
                "SELECT holder, acquired_at, expires_at_ms FROM leases WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((holder, acquired_ms, expires_ms)) = row else {
            return Err(NudgeError::Store(format!("lease `{name}` vanished during claim")));
        };
        Ok(LeaseHolder {
            holder,
            acquired_at: from_epoch_millis(acquired_ms)?,
            expires_at: from_epoch_millis(expires_ms)?,
        })
    }

    fn release_lease(&self, name: &str, holder: &str) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM leases WHERE name = ?1 AND holder = ?2",
            params![name, holder],
        )?;
        Ok(rows > 0)
    }
}

fn from_epoch_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| NudgeError::Store(format!("lease timestamp {ms} is out of range")))
}

fn ledger_err(e: impl std::fmt::Display) -> NudgeError {
    NudgeError::Ledger(e.to_string())
}

fn insert_row(conn: &Connection, task: &NewTask) -> Result<TaskId> {
    let tags_json = serde_json::to_string(&task.tags)
        .map_err(|e| NudgeError::Store(format!("cannot encode tags: {e}")))?;
    conn.execute(
        "INSERT INTO tasks \
         (user_id, title, day, due_time, priority, tags, status, carried_from, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'open', ?7, ?8)",
        params![
            task.user_id.0,
            task.title.trim(),
            task.day.format(DAY_FORMAT).to_string(),
            task.due_time.map(|t| t.to_string()),
            task.priority.as_str(),
            tags_json,
            task.carried_from.map(|id| id.0),
            now_epoch_secs()
        ],
    )?;
    Ok(TaskId(conn.last_insert_rowid()))
}

/// Raw column values; converted outside the rusqlite row closure so domain
/// parse failures surface as [`NudgeError`].
struct TaskRow {
    id: i64,
    user_id: i64,
    title: String,
    day: String,
    due_time: Option<String>,
    priority: String,
    tags: String,
    status: String,
    carried_from: Option<i64>,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            day: row.get(3)?,
            due_time: row.get(4)?,
            priority: row.get(5)?,
            tags: row.get(6)?,
            status: row.get(7)?,
            carried_from: row.get(8)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        let day = NaiveDate::parse_from_str(&self.day, DAY_FORMAT)
            .map_err(|e| NudgeError::Store(format!("task {} has bad day `{}`: {e}", self.id, self.day)))?;
        let due_time = self
            .due_time
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<DueTime>)
            .transpose()?;
        // Rows written by older tools may carry free-form priorities.
        let priority = self.priority.parse::<Priority>().unwrap_or_default();
        let tags: Vec<String> = serde_json::from_str(&self.tags).unwrap_or_default();
        Ok(Task {
            id: TaskId(self.id),
            user_id: UserId(self.user_id),
            title: self.title,
            day,
            due_time,
            priority,
            tags,
            status: self.status.parse()?,
            carried_from: self.carried_from.map(TaskId),
        })
    }
}

fn now_epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
