//! Carry-over of unfinished tasks into the next local day.

use crate::error::Result;
use crate::ledger::SendLedger;
use crate::model::{NewTask, SendKey, SendKind, TaskStatus, UserId};
use crate::store::TaskStore;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a ledger-gated carry-over attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarryOutcome {
    /// The `carry` slot was already recorded; nothing was copied.
    Skipped,
    /// Copies were inserted (possibly zero) and the slot recorded.
    Carried(usize),
}

impl CarryOutcome {
    #[must_use]
    pub fn carried(self) -> usize {
        match self {
            Self::Skipped => 0,
            Self::Carried(n) => n,
        }
    }
}

/// Copies yesterday's open tasks onto today.
pub struct CarryOverEngine {
    tasks: Arc<dyn TaskStore>,
    ledger: Arc<dyn SendLedger>,
}

impl CarryOverEngine {
    pub fn new(tasks: Arc<dyn TaskStore>, ledger: Arc<dyn SendLedger>) -> Self {
        Self { tasks, ledger }
    }

    /// Ungated copy. Source rows are left untouched under yesterday.
    pub fn carry_over(&self, user_id: UserId, local_date: NaiveDate) -> Result<usize> {
        let Some(yesterday) = local_date.pred_opt() else {
            return Ok(0);
        };
        let mut open = self
            .tasks
            .list_tasks(user_id, yesterday, Some(TaskStatus::Open))?;
        if open.is_empty() {
            return Ok(0);
        }
        // Copies keep the order the originals were added in.
        open.sort_by_key(|t| t.id);

        let drafts: Vec<NewTask> = open.iter().map(|t| t.carried_to(local_date)).collect();
        let ids = self.tasks.insert_tasks(&drafts)?;
        debug!(%user_id, from = %yesterday, to = %local_date, count = ids.len(), "carried tasks");
        Ok(ids.len())
    }

    /// Copy at most once per `(user, local_date, hour)`.
    ///
    /// The `carry` slot is recorded right after the copy commits and before
    /// any notification, so a failed digest retry cannot duplicate rows.
    pub fn carry_over_once(
        &self,
        user_id: UserId,
        local_date: NaiveDate,
        hour: u8,
    ) -> Result<CarryOutcome> {
        let key = SendKey::new(user_id, SendKind::Carry, local_date, hour);
        if self.ledger.was_sent(&key)? {
            return Ok(CarryOutcome::Skipped);
        }

        let count = self.carry_over(user_id, local_date)?;
        if !self.ledger.mark_sent(&key)? {
            // Lost a race with another writer after copying.
            info!(%user_id, slot = %key, "carry slot was recorded concurrently");
        }
        Ok(CarryOutcome::Carried(count))
    }
}
