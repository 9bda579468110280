//! Process wiring: store, ledger, ticker, transport and command dispatch.

use crate::assistant::{Assistant, Reply};
use crate::channels::{ChatTransport, InboundEvent, Notifier, OutboundMessage, TelegramAdapter};
use crate::clock::{TimeSource, parse_timezone};
use crate::config::{LedgerBackend, NudgeConfig};
use crate::ledger::{JsonlSendLedger, SendLedger};
use crate::model::UserId;
use crate::scheduler::{FocusTimers, Ticker, TickerLease};
use crate::store::SqliteStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const INBOUND_QUEUE: usize = 64;

/// Run the bot until `shutdown` is cancelled or the transport stops.
///
/// # Errors
///
/// Returns an error when the configuration is invalid, the store cannot be
/// opened, or the transport fails permanently.
pub async fn run(config: NudgeConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    config.validate()?;
    let default_tz = parse_timezone(&config.schedule.default_timezone)?;
    let time = TimeSource::system(default_tz);

    let store = Arc::new(SqliteStore::open(&config.storage.database_path)?);
    let ledger: Arc<dyn SendLedger> = match config.storage.ledger {
        LedgerBackend::Sqlite => store.clone(),
        LedgerBackend::Jsonl => {
            info!(path = %config.storage.ledger_path.display(), "using JSONL send ledger");
            Arc::new(JsonlSendLedger::new(config.storage.ledger_path.clone()))
        }
    };

    let telegram = Arc::new(TelegramAdapter::new(&config.telegram)?);
    let notifier: Arc<dyn Notifier> = telegram.clone();
    let transport: Arc<dyn ChatTransport> = telegram;

    let policy = config.schedule.policy();
    let mut ticker = Ticker::new(
        time.clone(),
        store.clone(),
        store.clone(),
        ledger,
        Arc::clone(&notifier),
    )
    .with_policy(policy.clone());
    if config.schedule.leader_lease {
        let lease = TickerLease::for_current_process(
            store.clone(),
            Duration::from_secs(config.schedule.lease_ttl_secs),
        );
        info!(
            holder = lease.holder(),
            ttl_secs = config.schedule.lease_ttl_secs,
            "ticker lease enabled"
        );
        ticker = ticker.with_leader_lease(lease);
    }

    let ticker_token = shutdown.child_token();
    let ticker_handle = Arc::new(ticker).run(ticker_token.clone());

    let assistant = Assistant::new(time, store.clone(), store, FocusTimers::new(notifier))
        .with_focus_config(config.focus.clone())
        .with_schedule(policy);

    info!(transport = transport.id(), "nudge bot running");
    let result = serve(transport, &assistant, shutdown).await;

    ticker_token.cancel();
    if let Err(e) = ticker_handle.await {
        error!("ticker task ended abnormally: {e}");
    }
    result
}

/// Poll `transport` and answer every inbound event until shutdown.
pub async fn serve(
    transport: Arc<dyn ChatTransport>,
    assistant: &Assistant,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel(INBOUND_QUEUE);
    let poller = Arc::clone(&transport);
    let poll_task = tokio::spawn(async move { poller.run(tx).await });

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("shutdown requested");
                poll_task.abort();
                return Ok(());
            }
            event = rx.recv() => {
                match event {
                    Some(event) => handle_event(transport.as_ref(), assistant, event).await,
                    None => break,
                }
            }
        }
    }

    // The poller dropped its sender: surface why it stopped.
    match poll_task.await {
        Ok(Ok(())) => {
            info!("transport stopped");
            Ok(())
        }
        Ok(Err(e)) => Err(e.context("transport failed")),
        Err(e) => Err(anyhow::anyhow!("transport task panicked: {e}")),
    }
}

async fn handle_event(transport: &dyn ChatTransport, assistant: &Assistant, event: InboundEvent) {
    match event {
        InboundEvent::Message { user_id, text } => {
            let reply = assistant.handle_text(user_id, &text);
            deliver(transport, user_id, reply).await;
        }
        InboundEvent::Callback {
            user_id,
            callback_id,
            token,
        } => {
            if let Err(e) = transport.answer_callback(&callback_id, None).await {
                debug!(%user_id, "answering callback failed: {e:#}");
            }
            let reply = assistant.handle_callback(user_id, &token);
            deliver(transport, user_id, reply).await;
        }
    }
}

async fn deliver(transport: &dyn ChatTransport, user_id: UserId, reply: Reply) {
    let message = OutboundMessage::text(user_id, reply.text).with_actions(reply.actions);
    if let Err(e) = transport.send(message).await {
        warn!(%user_id, "reply delivery failed: {e:#}");
    }
}
