use crate::helpers::{date, harness, utc};
use async_trait::async_trait;
use chrono_tz::Tz;
use nudge::channels::{ChatTransport, InboundEvent, Notifier, OutboundMessage};
use nudge::model::{TaskStatus, UserId};
use nudge::store::TaskStore;
use nudge::{NudgeConfig, runtime};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How the fake poll loop ends once its script is exhausted.
enum Ending {
    Clean,
    Fail,
    Hang,
}

struct FakeTransport {
    script: Mutex<Vec<InboundEvent>>,
    ending: Ending,
    sent: Mutex<Vec<OutboundMessage>>,
    answered: Mutex<Vec<String>>,
}

impl FakeTransport {
    fn new(script: Vec<InboundEvent>, ending: Ending) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            ending,
            sent: Mutex::new(Vec::new()),
            answered: Mutex::new(Vec::new()),
        })
    }

    fn replies(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.text.clone()).collect()
    }
}

#[async_trait]
impl Notifier for FakeTransport {
    fn id(&self) -> &'static str {
        "fake"
    }

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn run(&self, inbound_tx: mpsc::Sender<InboundEvent>) -> anyhow::Result<()> {
        let events = std::mem::take(&mut *self.script.lock().unwrap());
        for event in events {
            inbound_tx.send(event).await?;
        }
        match self.ending {
            Ending::Clean => Ok(()),
            Ending::Fail => anyhow::bail!("connection reset"),
            Ending::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn answer_callback(&self, callback_id: &str, _text: Option<&str>) -> anyhow::Result<()> {
        self.answered.lock().unwrap().push(callback_id.to_owned());
        Ok(())
    }
}

fn message(user: i64, text: &str) -> InboundEvent {
    InboundEvent::Message {
        user_id: UserId(user),
        text: text.to_owned(),
    }
}

#[tokio::test]
async fn every_event_gets_a_reply_in_order() {
    let h = harness(Tz::UTC, utc(2026, 1, 15, 9, 0));
    let assistant = h.assistant();
    let transport = FakeTransport::new(
        vec![
            message(42, "/add Gym !high"),
            InboundEvent::Callback {
                user_id: UserId(42),
                callback_id: "cb-1".to_owned(),
                token: "done|1".to_owned(),
            },
            message(42, "/list"),
        ],
        Ending::Clean,
    );

    runtime::serve(transport.clone(), &assistant, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        transport.replies(),
        vec![
            "Added for today: Gym".to_owned(),
            "Nice! Marked ✅".to_owned(),
            "✅ ⬆️ Gym (#1)".to_owned(),
        ]
    );
    assert_eq!(*transport.answered.lock().unwrap(), vec!["cb-1".to_owned()]);
    assert!(transport.sent.lock().unwrap().iter().all(|m| m.user_id == UserId(42)));
    assert_eq!(
        h.store.list_tasks(UserId(42), date(2026, 1, 15), None).unwrap()[0].status,
        TaskStatus::Done
    );
}

#[tokio::test]
async fn transport_failure_is_reported() {
    let h = harness(Tz::UTC, utc(2026, 1, 15, 9, 0));
    let assistant = h.assistant();
    let transport = FakeTransport::new(vec![message(1, "/help")], Ending::Fail);

    let err = runtime::serve(transport.clone(), &assistant, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("connection reset"));
    assert_eq!(transport.replies().len(), 1, "queued events are still answered");
}

#[tokio::test]
async fn shutdown_stops_a_blocked_transport() {
    let h = harness(Tz::UTC, utc(2026, 1, 15, 9, 0));
    let assistant = h.assistant();
    let transport = FakeTransport::new(vec![message(1, "/week")], Ending::Hang);
    let shutdown = CancellationToken::new();

    let canceller = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    tokio::time::timeout(
        Duration::from_secs(5),
        runtime::serve(transport.clone(), &assistant, shutdown),
    )
    .await
    .expect("serve returns after cancel")
    .unwrap();
    assert_eq!(transport.replies().len(), 1);
}

#[tokio::test]
async fn run_rejects_config_without_token() {
    let err = runtime::run(NudgeConfig::default(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().to_lowercase().contains("token"), "{err}");
}
