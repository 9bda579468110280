//! Time source and per-user local time.
//!
//! All scheduling decisions are made on a [`LocalSlot`]: the user's local
//! wall-clock time truncated to the hour. Truncation keeps the ledger key
//! stable when a tick fires slightly off the hour boundary.

use crate::error::{NudgeError, Result};
use crate::model::User;
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, Mutex};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Parse and validate an IANA zone name such as `America/New_York`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(NudgeError::InvalidTimezone(String::new()));
    }
    trimmed
        .parse::<Tz>()
        .map_err(|_| NudgeError::InvalidTimezone(trimmed.to_owned()))
}

/// One local hour of one user's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalSlot {
    pub date: NaiveDate,
    pub hour: u8,
}

impl LocalSlot {
    /// Truncates a local timestamp to its hour.
    #[must_use]
    pub fn of(local: &DateTime<Tz>) -> Self {
        // `hour()` is always 0..=23.
        let hour = u8::try_from(local.hour()).unwrap_or(0);
        Self {
            date: local.date_naive(),
            hour,
        }
    }

    /// The local calendar day before this slot's date.
    #[must_use]
    pub fn yesterday(&self) -> NaiveDate {
        self.date.pred_opt().unwrap_or(self.date)
    }
}

/// Converts instants into user-local time, falling back to a default zone.
#[derive(Clone)]
pub struct TimeSource {
    clock: Arc<dyn Clock>,
    default_tz: Tz,
}

impl TimeSource {
    pub fn new(clock: Arc<dyn Clock>, default_tz: Tz) -> Self {
        Self { clock, default_tz }
    }

    /// Wall-clock time source with the given default zone.
    #[must_use]
    pub fn system(default_tz: Tz) -> Self {
        Self::new(Arc::new(SystemClock), default_tz)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn default_tz(&self) -> Tz {
        self.default_tz
    }

    /// The user's zone, or the default when the stored name is unusable.
    #[must_use]
    pub fn zone_for(&self, user: &User) -> Tz {
        match parse_timezone(&user.timezone) {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(
                    user_id = %user.user_id,
                    timezone = %user.timezone,
                    fallback = %self.default_tz,
                    "stored timezone is invalid; using default"
                );
                self.default_tz
            }
        }
    }

    #[must_use]
    pub fn local_at(&self, user: &User, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.zone_for(user))
    }

    #[must_use]
    pub fn local_now(&self, user: &User) -> DateTime<Tz> {
        self.local_at(user, self.now())
    }

    #[must_use]
    pub fn slot_at(&self, user: &User, instant: DateTime<Utc>) -> LocalSlot {
        LocalSlot::of(&self.local_at(user, instant))
    }

    /// The user's current local calendar date.
    #[must_use]
    pub fn today(&self, user: &User) -> NaiveDate {
        self.local_now(user).date_naive()
    }
}
