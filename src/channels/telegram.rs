use crate::channels::traits::{ChatTransport, InboundEvent, Notifier, OutboundMessage};
use crate::config::TelegramConfig;
use crate::model::UserId;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Longest server-requested backoff we are willing to sleep through.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);
/// Pause after a failed `getUpdates` call before polling again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(3);

/// Telegram Bot API adapter: `sendMessage` for delivery, `getUpdates` long
/// polling for input.
pub struct TelegramAdapter {
    bot_token: String,
    api_base: String,
    poll_timeout_secs: u64,
    send_retries: u32,
    retry_backoff: Duration,
    client: reqwest::Client,
    next_offset: AtomicI64,
}

impl TelegramAdapter {
    pub fn new(config: &TelegramConfig) -> anyhow::Result<Self> {
        // The client timeout must outlast the long-poll window.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()?;
        Ok(Self {
            bot_token: config.bot_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            poll_timeout_secs: config.poll_timeout_secs,
            send_retries: config.send_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            client,
            next_offset: AtomicI64::new(0),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn backoff_for(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        match retry_after {
            Some(secs) => Duration::from_secs(secs).min(MAX_RETRY_AFTER),
            None => self.retry_backoff.saturating_mul(attempt),
        }
    }

    async fn poll_once(&self) -> anyhow::Result<Vec<InboundEvent>> {
        let offset = self.next_offset.load(Ordering::SeqCst);
        let body = json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("telegram getUpdates failed ({status}): {body}");
        }

        let raw = response.text().await?;
        let batch = parse_updates(&raw)?;
        if let Some(next) = batch.next_offset {
            self.next_offset.store(next, Ordering::SeqCst);
        }
        Ok(batch.events)
    }
}

#[async_trait]
impl Notifier for TelegramAdapter {
    fn id(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()> {
        let url = self.method_url("sendMessage");
        let body = send_message_body(&message);

        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            let delay = match self.client.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    let retryable = status.is_server_error()
                        || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
                    if !retryable || attempt > self.send_retries {
                        anyhow::bail!("telegram sendMessage failed ({status}): {text}");
                    }
                    self.backoff_for(attempt, retry_after_secs(&text))
                }
                Err(e) => {
                    if attempt > self.send_retries {
                        return Err(e.into());
                    }
                    self.backoff_for(attempt, None)
                }
            };
            warn!(
                user_id = %message.user_id,
                attempt,
                "telegram sendMessage retry in {}ms",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramAdapter {
    async fn run(&self, inbound_tx: mpsc::Sender<InboundEvent>) -> anyhow::Result<()> {
        if self.bot_token.trim().is_empty() {
            anyhow::bail!("telegram bot token is empty");
        }

        loop {
            let events = match self.poll_once().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("telegram poll failed: {e:#}");
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    continue;
                }
            };
            for event in events {
                if inbound_tx.send(event).await.is_err() {
                    debug!("telegram inbound channel closed, stopping poll loop");
                    return Ok(());
                }
            }
        }
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        let response = self
            .client
            .post(self.method_url("answerCallbackQuery"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("telegram answerCallbackQuery failed ({status}): {body}");
        }
        Ok(())
    }
}

fn send_message_body(message: &OutboundMessage) -> serde_json::Value {
    let mut body = json!({
        "chat_id": message.user_id.0,
        "text": message.text,
    });
    if !message.actions.is_empty() {
        let keyboard: Vec<Vec<serde_json::Value>> = message
            .actions
            .iter()
            .map(|row| {
                row.iter()
                    .map(|a| json!({ "text": a.label, "callback_data": a.token }))
                    .collect()
            })
            .collect();
        body["reply_markup"] = json!({ "inline_keyboard": keyboard });
    }
    body
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    from: Option<TgUser>,
    chat: TgChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    #[serde(default)]
    is_bot: bool,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    data: Option<String>,
}

/// Events decoded from one `getUpdates` response.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UpdateBatch {
    pub events: Vec<InboundEvent>,
    /// Offset acknowledging every update in this batch.
    pub next_offset: Option<i64>,
}

/// Decode a `getUpdates` body. Only private-chat text and button taps from
/// human users become events; everything else is acknowledged and dropped.
pub fn parse_updates(raw: &str) -> anyhow::Result<UpdateBatch> {
    let response: ApiResponse<Vec<Update>> = serde_json::from_str(raw)?;
    if !response.ok {
        anyhow::bail!(
            "telegram getUpdates returned error: {}",
            response.description.unwrap_or_default()
        );
    }

    let mut batch = UpdateBatch::default();
    for update in response.result.unwrap_or_default() {
        batch.next_offset = Some(
            batch
                .next_offset
                .map_or(update.update_id + 1, |o| o.max(update.update_id + 1)),
        );

        if let Some(message) = update.message {
            let Some(from) = message.from else { continue };
            let Some(text) = message.text else { continue };
            if from.is_bot || message.chat.kind != "private" || text.trim().is_empty() {
                continue;
            }
            batch.events.push(InboundEvent::Message {
                user_id: UserId(from.id),
                text: text.trim().to_owned(),
            });
        } else if let Some(query) = update.callback_query {
            let Some(token) = query.data else { continue };
            batch.events.push(InboundEvent::Callback {
                user_id: UserId(query.from.id),
                callback_id: query.id,
                token,
            });
        }
    }
    Ok(batch)
}

/// Server-requested backoff from an error body, when present.
fn retry_after_secs(raw: &str) -> Option<u64> {
    serde_json::from_str::<ApiResponse<serde_json::Value>>(raw)
        .ok()?
        .parameters?
        .retry_after
}
