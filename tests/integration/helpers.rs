//! Shared fixtures: a manual clock, an in-memory store and notifier doubles.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use nudge::assistant::Assistant;
use nudge::channels::{Notifier, OutboundMessage};
use nudge::clock::{ManualClock, TimeSource};
use nudge::model::UserId;
use nudge::scheduler::{FocusTimers, Ticker};
use nudge::store::{SqliteStore, UserDirectory};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Notifier that records every message and can be told to fail per user.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<OutboundMessage>>,
    failing: Mutex<HashSet<UserId>>,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn texts_for(&self, user_id: UserId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| m.text)
            .collect()
    }

    pub(crate) fn fail_for(&self, user_id: UserId) {
        self.failing.lock().unwrap().insert(user_id);
    }

    pub(crate) fn recover(&self, user_id: UserId) {
        self.failing.lock().unwrap().remove(&user_id);
    }

    /// Poll until at least `count` messages were recorded.
    pub(crate) async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.sent.lock().unwrap().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent.lock().unwrap().len() >= count
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn id(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(&message.user_id) {
            anyhow::bail!("simulated outage for {}", message.user_id);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// A ticker over an in-memory store with a manual clock.
pub(crate) struct Harness {
    pub store: Arc<SqliteStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub time: TimeSource,
    pub ticker: Ticker,
}

pub(crate) fn harness(default_tz: Tz, start: DateTime<Utc>) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let notifier = RecordingNotifier::new();
    let clock = Arc::new(ManualClock::new(start));
    let time = TimeSource::new(clock.clone(), default_tz);
    let ticker = Ticker::new(
        time.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        notifier.clone(),
    );
    Harness {
        store,
        notifier,
        clock,
        time,
        ticker,
    }
}

impl Harness {
    /// Register a user with an explicit zone.
    pub(crate) fn user(&self, id: i64, tz: &str) -> UserId {
        let user_id = UserId(id);
        self.store.get_or_create_user(user_id, tz).unwrap();
        self.store.set_timezone(user_id, tz).unwrap();
        user_id
    }

    pub(crate) fn assistant(&self) -> Assistant {
        Assistant::new(
            self.time.clone(),
            self.store.clone(),
            self.store.clone(),
            FocusTimers::new(self.notifier.clone()),
        )
    }
}
