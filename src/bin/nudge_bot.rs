//! Telegram reminder bot entry point.
//!
//! Configuration comes from `NUDGE_CONFIG` (or the platform config dir) and
//! the `TELEGRAM_BOT_TOKEN`, `DEFAULT_TZ` and `DB_PATH` environment
//! variables. Logs go to stderr; `logging.file_logs` adds a daily file.

use nudge::NudgeConfig;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. The returned guard flushes the file writer
/// and must live until exit.
fn init_tracing(file_logs: bool) -> Option<WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if !file_logs {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(stderr_layer)
            .init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(nudge::nudge_dirs::logs_dir(), "nudge.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NudgeConfig::load()?;
    let _log_guard = init_tracing(config.logging.file_logs);

    tracing::info!(
        config = %NudgeConfig::default_config_path().display(),
        "nudge-bot starting"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("ctrl-c received");
                signal_token.cancel();
            }
            Err(e) => tracing::warn!("cannot listen for ctrl-c: {e}"),
        }
    });

    nudge::runtime::run(config, shutdown).await.map_err(|e| {
        tracing::error!(error = %e, "nudge-bot exited with error");
        e
    })?;

    tracing::info!("nudge-bot shut down cleanly");
    Ok(())
}
