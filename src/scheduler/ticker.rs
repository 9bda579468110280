//! Hourly delivery loop.
//!
//! Each tick walks every known user, maps the tick instant to the user's
//! local hour, and fires the morning digest (with carry-over) and the
//! tomorrow-planning prompts. The send ledger gates every delivery so a
//! repeated or overlapping tick never sends the same slot twice.
//!
//! Store and ledger calls block (SQLite mutex, JSONL lock file), so they run
//! on the blocking pool rather than on the runtime's worker threads.

use crate::carry::{CarryOutcome, CarryOverEngine};
use crate::channels::{Notifier, OutboundMessage};
use crate::clock::{LocalSlot, TimeSource};
use crate::digest::{PROMPT_TEXT, carry_notice, compose_digest};
use crate::error::{NudgeError, Result};
use crate::ledger::SendLedger;
use crate::model::{SendKey, SendKind, TaskStatus, User, UserId};
use crate::scheduler::lease::{LeadershipDecision, TickerLease};
use crate::store::{TaskStore, UserDirectory};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Local hour of the morning digest.
pub const DEFAULT_DIGEST_HOUR: u8 = 8;
/// Local hours of the tomorrow-planning prompt.
pub const DEFAULT_PROMPT_HOURS: [u8; 5] = [10, 13, 16, 19, 22];
/// Default tick cadence (seconds).
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 3600;

/// When the ticker fires and what it sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub digest_hour: u8,
    pub prompt_hours: Vec<u8>,
    pub tick_interval: Duration,
    /// Run one tick immediately on start instead of waiting for the boundary.
    pub catch_up_on_start: bool,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            digest_hour: DEFAULT_DIGEST_HOUR,
            prompt_hours: DEFAULT_PROMPT_HOURS.to_vec(),
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            catch_up_on_start: true,
        }
    }
}

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub users: usize,
    pub digests: usize,
    pub prompts: usize,
    pub carried: usize,
    /// Delivery or storage failures; the affected slots stay unrecorded.
    pub failures: usize,
    /// Users skipped because another tick was still processing them.
    pub skipped_in_flight: usize,
}

/// Scheduling service. Cheap to share behind an `Arc`.
pub struct Ticker {
    time: TimeSource,
    users: Arc<dyn UserDirectory>,
    tasks: Arc<dyn TaskStore>,
    ledger: Arc<dyn SendLedger>,
    notifier: Arc<dyn Notifier>,
    carry: Arc<CarryOverEngine>,
    policy: SchedulePolicy,
    lease: Option<Arc<TickerLease>>,
    in_flight: Mutex<HashSet<UserId>>,
}

impl Ticker {
    pub fn new(
        time: TimeSource,
        users: Arc<dyn UserDirectory>,
        tasks: Arc<dyn TaskStore>,
        ledger: Arc<dyn SendLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let carry = Arc::new(CarryOverEngine::new(Arc::clone(&tasks), Arc::clone(&ledger)));
        Self {
            time,
            users,
            tasks,
            ledger,
            notifier,
            carry,
            policy: SchedulePolicy::default(),
            lease: None,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SchedulePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Only tick while holding this lease; it is renewed on its heartbeat.
    #[must_use]
    pub fn with_leader_lease(mut self, lease: TickerLease) -> Self {
        self.lease = Some(Arc::new(lease));
        self
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    /// Evaluate every user at `instant`.
    pub async fn tick(&self, instant: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let directory = Arc::clone(&self.users);
        let users = match off_runtime(move || directory.list_users()).await {
            Ok(users) => users,
            Err(e) => {
                warn!("tick aborted, could not list users: {e}");
                report.failures += 1;
                return report;
            }
        };
        report.users = users.len();

        for user in &users {
            let Some(_claim) = UserClaim::acquire(&self.in_flight, user.user_id) else {
                debug!(user_id = %user.user_id, "user already in flight, skipping");
                report.skipped_in_flight += 1;
                continue;
            };
            let slot = self.time.slot_at(user, instant);

            if slot.hour == self.policy.digest_hour
                && let Err(e) = self.run_digest(user, slot, &mut report).await
            {
                warn!(user_id = %user.user_id, date = %slot.date, "digest step failed: {e}");
                report.failures += 1;
            }

            if self.policy.prompt_hours.contains(&slot.hour)
                && let Err(e) = self.run_prompt(user, slot, &mut report).await
            {
                warn!(user_id = %user.user_id, date = %slot.date, "prompt step failed: {e}");
                report.failures += 1;
            }
        }

        debug!(?report, %instant, "tick finished");
        report
    }

    async fn run_digest(&self, user: &User, slot: LocalSlot, report: &mut TickReport) -> Result<()> {
        let key = SendKey::new(user.user_id, SendKind::Digest, slot.date, slot.hour);
        if self.was_sent(key).await? {
            return Ok(());
        }

        let carry = Arc::clone(&self.carry);
        let user_id = user.user_id;
        if let CarryOutcome::Carried(count) =
            off_runtime(move || carry.carry_over_once(user_id, slot.date, slot.hour)).await?
            && count > 0
        {
            report.carried += count;
            let notice = OutboundMessage::text(user.user_id, carry_notice(count));
            if let Err(e) = self.notifier.send(notice).await {
                warn!(user_id = %user.user_id, "carry notice delivery failed: {e:#}");
            }
        }

        let tasks = Arc::clone(&self.tasks);
        let (mut yesterday_open, today) = off_runtime(move || {
            let yesterday_open =
                tasks.list_tasks(user_id, slot.yesterday(), Some(TaskStatus::Open))?;
            let today = tasks.list_tasks(user_id, slot.date, None)?;
            Ok((yesterday_open, today))
        })
        .await?;
        // Yesterday reads in the order the tasks were added; today keeps agenda order.
        yesterday_open.sort_by_key(|t| t.id);
        let text = compose_digest(&yesterday_open, &today);

        match self
            .notifier
            .send(OutboundMessage::text(user.user_id, text))
            .await
        {
            Ok(()) => {
                self.mark_sent(key).await?;
                report.digests += 1;
                info!(user_id = %user.user_id, slot = %key, "digest sent");
            }
            Err(e) => {
                warn!(user_id = %user.user_id, slot = %key, "digest delivery failed: {e:#}");
                report.failures += 1;
            }
        }
        Ok(())
    }

    async fn run_prompt(&self, user: &User, slot: LocalSlot, report: &mut TickReport) -> Result<()> {
        let key = SendKey::new(user.user_id, SendKind::Prompt, slot.date, slot.hour);
        if self.was_sent(key).await? {
            return Ok(());
        }

        match self
            .notifier
            .send(OutboundMessage::text(user.user_id, PROMPT_TEXT))
            .await
        {
            Ok(()) => {
                self.mark_sent(key).await?;
                report.prompts += 1;
                debug!(user_id = %user.user_id, slot = %key, "prompt sent");
            }
            Err(e) => {
                warn!(user_id = %user.user_id, slot = %key, "prompt delivery failed: {e:#}");
                report.failures += 1;
            }
        }
        Ok(())
    }

    async fn was_sent(&self, key: SendKey) -> Result<bool> {
        let ledger = Arc::clone(&self.ledger);
        off_runtime(move || ledger.was_sent(&key)).await
    }

    async fn mark_sent(&self, key: SendKey) -> Result<bool> {
        let ledger = Arc::clone(&self.ledger);
        off_runtime(move || ledger.mark_sent(&key)).await
    }

    async fn check_lease(&self, lease: &Arc<TickerLease>) -> Result<LeadershipDecision> {
        let lease = Arc::clone(lease);
        let now = self.time.now();
        off_runtime(move || lease.check_at(now)).await
    }

    /// Whether this instance may tick now. Always true without a lease.
    pub async fn should_execute_tick(&self) -> bool {
        let Some(lease) = self.lease.as_ref() else {
            return true;
        };

        match self.check_lease(lease).await {
            Ok(LeadershipDecision::Leader { .. }) => true,
            Ok(LeadershipDecision::Follower { holder, expires_at }) => {
                debug!(%holder, %expires_at, "tick skipped; another instance leads");
                false
            }
            Err(e) => {
                warn!("ticker lease check failed, skipping tick: {e}");
                false
            }
        }
    }

    /// Renew or re-check the lease between ticks.
    ///
    /// A follower that takes over here ticks at once, so slots of the
    /// current hour that a crashed leader never delivered are still sent.
    /// Returns the report of that tick.
    pub async fn heartbeat(&self) -> Option<TickReport> {
        let lease = self.lease.as_ref()?;
        match self.check_lease(lease).await {
            Ok(LeadershipDecision::Leader {
                newly_acquired: true,
            }) => {
                let report = self.tick(self.time.now()).await;
                info!(?report, "takeover tick finished");
                Some(report)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("ticker lease heartbeat failed: {e}");
                None
            }
        }
    }

    /// Spawn the loop. It stops when `shutdown` is cancelled.
    pub fn run(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                digest_hour = self.policy.digest_hour,
                prompt_hours = ?self.policy.prompt_hours,
                interval_secs = self.policy.tick_interval.as_secs(),
                "ticker started"
            );

            // Claim the lease before the heartbeat starts so the first
            // heartbeat is not mistaken for a takeover.
            let may_tick = self.should_execute_tick().await;
            let heartbeat = self.lease.as_ref().map(|lease| {
                Arc::clone(&self).spawn_heartbeat(lease.heartbeat_interval(), shutdown.clone())
            });

            if self.policy.catch_up_on_start && may_tick {
                let report = self.tick(self.time.now()).await;
                debug!(?report, "catch-up tick finished");
            }

            loop {
                let now = self.time.now();
                let boundary = next_boundary(now, self.policy.tick_interval);
                let delay = (boundary - now).to_std().unwrap_or(Duration::ZERO);

                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                if !self.should_execute_tick().await {
                    continue;
                }
                // Never evaluate an instant before the boundary we slept for.
                let instant = self.time.now().max(boundary);
                self.tick(instant).await;
            }

            if let Some(handle) = heartbeat
                && let Err(e) = handle.await
            {
                warn!("lease heartbeat ended abnormally: {e}");
            }
            if let Some(lease) = self.lease.clone()
                && let Err(e) = off_runtime(move || lease.release()).await
            {
                warn!("releasing ticker lease failed: {e}");
            }
            info!("ticker stopped");
        })
    }

    fn spawn_heartbeat(
        self: Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(every) => {}
                }
                self.heartbeat().await;
            }
        })
    }
}

/// Run a blocking store call on the blocking pool.
async fn off_runtime<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| NudgeError::Scheduler(format!("blocking store call failed: {e}")))?
}

/// Next epoch-aligned multiple of `interval` strictly after `now`.
#[must_use]
pub fn next_boundary(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = i64::try_from(interval.as_secs().max(1)).unwrap_or(i64::MAX);
    let secs = now.timestamp();
    let next = (secs.div_euclid(step) + 1).saturating_mul(step);
    Utc.timestamp_opt(next, 0).single().unwrap_or(now)
}

/// Marks a user as being processed; released on drop.
struct UserClaim<'a> {
    set: &'a Mutex<HashSet<UserId>>,
    user_id: UserId,
}

impl<'a> UserClaim<'a> {
    fn acquire(set: &'a Mutex<HashSet<UserId>>, user_id: UserId) -> Option<Self> {
        let mut guard = set.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(user_id).then_some(Self { set, user_id })
    }
}

impl Drop for UserClaim<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user_id);
    }
}
