//! Domain types shared by the store, ledger, scheduler and command layers.

use crate::error::{NudgeError, Result};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Opaque per-chat user identity (the Telegram user/chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned task sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A known chat user and their configured IANA timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub timezone: String,
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Med,
    Low,
}

impl Priority {
    /// Agenda rank: high sorts first.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Med => 1,
            Self::Low => 2,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Med => "med",
            Self::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = NudgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "med" | "medium" => Ok(Self::Med),
            "low" => Ok(Self::Low),
            other => Err(NudgeError::InvalidTask(format!(
                "unknown priority `{other}`; expected low|med|high"
            ))),
        }
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Open,
    Done,
    Snoozed,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Done => "done",
            Self::Snoozed => "snoozed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = NudgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(Self::Open),
            "done" => Ok(Self::Done),
            "snoozed" => Ok(Self::Snoozed),
            other => Err(NudgeError::Store(format!("unknown task status `{other}`"))),
        }
    }
}

/// Wall-clock due time in the user's local day, written `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DueTime(NaiveTime);

impl DueTime {
    #[must_use]
    pub fn time(self) -> NaiveTime {
        self.0
    }
}

impl FromStr for DueTime {
    type Err = NudgeError;

    fn from_str(s: &str) -> Result<Self> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(Self)
            .map_err(|_| NudgeError::InvalidTask(format!("due time `{s}` is not HH:MM")))
    }
}

impl fmt::Display for DueTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// A stored task row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    /// Calendar date in the user's own local calendar.
    pub day: NaiveDate,
    pub due_time: Option<DueTime>,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub status: TaskStatus,
    /// Source row when this task was produced by carry-over.
    pub carried_from: Option<TaskId>,
}

impl Task {
    /// Agenda ordering: priority rank, then due time with missing last.
    ///
    /// Callers needing the insertion-order tiebreak must use a stable sort
    /// over id-ordered input.
    #[must_use]
    pub fn agenda_cmp(&self, other: &Self) -> Ordering {
        self.priority
            .rank()
            .cmp(&other.priority.rank())
            .then_with(|| match (self.due_time, other.due_time) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    }

    /// Builds a draft copying this task's attributes onto another day.
    #[must_use]
    pub fn carried_to(&self, day: NaiveDate) -> NewTask {
        NewTask {
            user_id: self.user_id,
            title: self.title.clone(),
            day,
            due_time: self.due_time,
            priority: self.priority,
            tags: self.tags.clone(),
            carried_from: Some(self.id),
        }
    }
}

/// A validated task about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub user_id: UserId,
    pub title: String,
    pub day: NaiveDate,
    pub due_time: Option<DueTime>,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub carried_from: Option<TaskId>,
}

impl NewTask {
    /// Creates a draft with default priority and no tags or due time.
    pub fn new(user_id: UserId, title: impl Into<String>, day: NaiveDate) -> Self {
        Self {
            user_id,
            title: title.into(),
            day,
            due_time: None,
            priority: Priority::default(),
            tags: Vec::new(),
            carried_from: None,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_due_time(mut self, due_time: DueTime) -> Self {
        self.due_time = Some(due_time);
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Rejects drafts with an empty title.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(NudgeError::InvalidTask("title must not be empty".to_owned()));
        }
        Ok(())
    }
}

/// Kind of slot-based notification recorded in the send ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendKind {
    Digest,
    Carry,
    Prompt,
}

impl SendKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Digest => "digest",
            Self::Carry => "carry",
            Self::Prompt => "prompt",
        }
    }
}

impl fmt::Display for SendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite ledger key for one logical slot of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SendKey {
    pub user_id: UserId,
    pub kind: SendKind,
    pub day: NaiveDate,
    pub hour: u8,
}

impl SendKey {
    #[must_use]
    pub fn new(user_id: UserId, kind: SendKind, day: NaiveDate, hour: u8) -> Self {
        Self {
            user_id,
            kind,
            day,
            hour,
        }
    }
}

impl fmt::Display for SendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{:02}",
            self.user_id,
            self.kind,
            self.day.format("%Y-%m-%d"),
            self.hour
        )
    }
}

/// Per-status task totals over a date range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub open: u32,
    pub done: u32,
    pub snoozed: u32,
}

impl StatusCounts {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.open + self.done + self.snoozed
    }

    /// Rounded completion percentage; zero when there are no tasks.
    #[must_use]
    pub fn completion_percent(&self) -> u32 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        (f64::from(self.done) * 100.0 / f64::from(total)).round() as u32
    }
}
