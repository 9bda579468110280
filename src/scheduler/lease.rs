//! Ticker leadership shared through the task database.
//!
//! Several bot processes may point at one database file. Only the holder of
//! the `ticker` lease delivers; the others keep checking on a heartbeat and
//! take over once the holder stops renewing. The heartbeat runs at a third of
//! the ttl, and the ttl must be shorter than the tick interval, so a crashed
//! holder is replaced before the next tick boundary.

use crate::error::Result;
use crate::store::LeaseStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Row name of the ticker lease.
pub const TICKER_LEASE: &str = "ticker";

/// Outcome of one lease check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadershipDecision {
    /// This process owns the lease.
    Leader {
        /// `true` when this check turned a follower into the leader.
        newly_acquired: bool,
    },
    /// Another process owns the lease until `expires_at`.
    Follower {
        holder: String,
        expires_at: DateTime<Utc>,
    },
}

/// One process's handle on the ticker lease.
pub struct TickerLease {
    store: Arc<dyn LeaseStore>,
    holder: String,
    ttl: Duration,
    leading: AtomicBool,
}

impl TickerLease {
    #[must_use]
    pub fn new(store: Arc<dyn LeaseStore>, holder: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            holder: holder.into(),
            ttl,
            leading: AtomicBool::new(false),
        }
    }

    /// Lease named after this process's pid and start time.
    #[must_use]
    pub fn for_current_process(store: Arc<dyn LeaseStore>, ttl: Duration) -> Self {
        let holder = format!(
            "nudge-{}-{}",
            std::process::id(),
            Utc::now().timestamp_millis()
        );
        Self::new(store, holder, ttl)
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// How often the lease is renewed or re-checked.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        (self.ttl / 3).max(Duration::from_secs(1))
    }

    /// Claim or renew the lease as of `now`.
    pub fn check_at(&self, now: DateTime<Utc>) -> Result<LeadershipDecision> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(now);
        let current = self
            .store
            .claim_lease(TICKER_LEASE, &self.holder, now, expires_at)?;

        if current.holder == self.holder {
            let was_leading = self.leading.swap(true, Ordering::SeqCst);
            if !was_leading {
                info!(holder = %self.holder, "ticker leadership acquired");
            }
            Ok(LeadershipDecision::Leader {
                newly_acquired: !was_leading,
            })
        } else {
            if self.leading.swap(false, Ordering::SeqCst) {
                warn!(holder = %self.holder, new_holder = %current.holder, "ticker leadership lost");
            }
            Ok(LeadershipDecision::Follower {
                holder: current.holder,
                expires_at: current.expires_at,
            })
        }
    }

    /// Give the lease up so a peer can take over without waiting for expiry.
    pub fn release(&self) -> Result<()> {
        self.leading.store(false, Ordering::SeqCst);
        if self.store.release_lease(TICKER_LEASE, &self.holder)? {
            info!(holder = %self.holder, "ticker lease released");
        }
        Ok(())
    }
}
