//! One-shot delayed reminders (focus sessions).
//!
//! Jobs are in-memory tokio tasks; they do not survive a restart and are not
//! ledger-gated.

use crate::channels::{Notifier, OutboundMessage};
use crate::error::{NudgeError, Result};
use crate::model::UserId;
use chrono::DateTime;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Identifier of a scheduled focus job: `focus-<user>-<target epoch secs>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FocusJobId(String);

impl FocusJobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FocusJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type JobMap = Arc<Mutex<HashMap<FocusJobId, JoinHandle<()>>>>;

/// Registry of pending one-shot deliveries.
pub struct FocusTimers {
    notifier: Arc<dyn Notifier>,
    jobs: JobMap,
}

impl FocusTimers {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedule `text` for delivery to `user_id` after `delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_delayed(
        &self,
        user_id: UserId,
        local_now: DateTime<Tz>,
        delay: Duration,
        text: impl Into<String>,
    ) -> Result<FocusJobId> {
        let offset = chrono::Duration::from_std(delay)
            .map_err(|e| NudgeError::Scheduler(format!("focus delay out of range: {e}")))?;
        let target = local_now + offset;
        let base = format!("focus-{user_id}-{}", target.timestamp());

        // Hold the registry lock across spawn so a zero-delay job cannot
        // try to deregister before it is registered.
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let id = unique_id(&jobs, base);

        let message = OutboundMessage::text(user_id, text);
        let notifier = Arc::clone(&self.notifier);
        let registry = Arc::clone(&self.jobs);
        let job_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match notifier.send(message).await {
                Ok(()) => debug!(%user_id, job = %job_id, "focus reminder delivered"),
                Err(e) => warn!(%user_id, job = %job_id, "focus reminder delivery failed: {e:#}"),
            }
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&job_id);
        });
        jobs.insert(id.clone(), handle);
        info!(%user_id, job = %id, target = %target, "focus reminder scheduled");
        Ok(id)
    }

    /// Abort a pending job. Returns `false` when it already ran or never existed.
    pub fn cancel(&self, id: &FocusJobId) -> bool {
        let removed = self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        match removed {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Ids of jobs that have not fired yet, sorted.
    pub fn pending(&self) -> Vec<FocusJobId> {
        let mut ids: Vec<FocusJobId> = self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

impl Drop for FocusTimers {
    fn drop(&mut self) {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in jobs.values() {
            handle.abort();
        }
    }
}

fn unique_id(jobs: &HashMap<FocusJobId, JoinHandle<()>>, base: String) -> FocusJobId {
    let first = FocusJobId(base.clone());
    if !jobs.contains_key(&first) {
        return first;
    }
    let mut n = 2_u32;
    loop {
        let candidate = FocusJobId(format!("{base}-{n}"));
        if !jobs.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
