//! Append-only JSONL send ledger guarded by a lock file.
//!
//! Lets several processes share one ledger without a database: every write
//! takes the lock, re-reads the file, and appends only unseen keys.

use crate::error::{NudgeError, Result};
use crate::ledger::SendLedger;
use crate::model::SendKey;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// Locks older than this are assumed abandoned by a crashed writer.
const STALE_LOCK_AGE: Duration = Duration::from_secs(30);
const LOCK_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SendRecord {
    #[serde(flatten)]
    key: SendKey,
    recorded_at_ms: u64,
}

/// File-backed [`SendLedger`].
pub struct JsonlSendLedger {
    path: PathBuf,
    seen: Mutex<HashSet<SendKey>>,
}

impl JsonlSendLedger {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(&self) -> Result<HashSet<SendKey>> {
        let mut seen = HashSet::new();
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(seen),
            Err(e) => {
                return Err(NudgeError::Ledger(format!("failed to read send ledger: {e}")));
            }
        };

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<SendRecord>(trimmed) {
                Ok(record) => {
                    seen.insert(record.key);
                }
                Err(e) => {
                    tracing::warn!(
                        "ignoring malformed send ledger line in {}: {e}",
                        self.path.display()
                    );
                }
            }
        }
        Ok(seen)
    }

    fn refresh(&self) -> Result<()> {
        let loaded = self.load_from_disk()?;
        let mut seen = self
            .seen
            .lock()
            .map_err(|e| NudgeError::Ledger(format!("ledger cache poisoned: {e}")))?;
        *seen = loaded;
        Ok(())
    }

    fn cached(&self, key: &SendKey) -> Result<bool> {
        let seen = self
            .seen
            .lock()
            .map_err(|e| NudgeError::Ledger(format!("ledger cache poisoned: {e}")))?;
        Ok(seen.contains(key))
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn acquire_write_guard(&self, timeout: Duration) -> Result<LedgerLockGuard> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                NudgeError::Ledger(format!("failed to create send ledger directory: {e}"))
            })?;
        }

        let started = std::time::Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    let _ = file.write_all(now_epoch_millis().to_string().as_bytes());
                    return Ok(LedgerLockGuard { path: lock_path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    evict_stale_lock(&lock_path);
                    if started.elapsed() > timeout {
                        return Err(NudgeError::Ledger(format!(
                            "timed out waiting for send ledger lock {}",
                            lock_path.display()
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
                Err(e) => {
                    return Err(NudgeError::Ledger(format!(
                        "failed to create send ledger lock {}: {e}",
                        lock_path.display()
                    )));
                }
            }
        }
    }
}

impl SendLedger for JsonlSendLedger {
    fn was_sent(&self, key: &SendKey) -> Result<bool> {
        if self.cached(key)? {
            return Ok(true);
        }
        // Another process may have appended since the last refresh.
        self.refresh()?;
        self.cached(key)
    }

    fn mark_sent(&self, key: &SendKey) -> Result<bool> {
        let _guard = self.acquire_write_guard(LOCK_TIMEOUT)?;
        self.refresh()?;
        if self.cached(key)? {
            return Ok(false);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| NudgeError::Ledger(format!("failed to open send ledger: {e}")))?;
        let record = SendRecord {
            key: *key,
            recorded_at_ms: now_epoch_millis(),
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| NudgeError::Ledger(format!("failed to encode send record: {e}")))?;
        writeln!(file, "{json}")
            .map_err(|e| NudgeError::Ledger(format!("failed to append send record: {e}")))?;

        self.seen
            .lock()
            .map_err(|e| NudgeError::Ledger(format!("ledger cache poisoned: {e}")))?
            .insert(*key);
        Ok(true)
    }
}

fn evict_stale_lock(lock_path: &Path) {
    let Ok(metadata) = std::fs::metadata(lock_path) else {
        return;
    };
    let Ok(modified) = metadata.modified() else {
        return;
    };
    let Ok(age) = SystemTime::now().duration_since(modified) else {
        return;
    };
    if age > STALE_LOCK_AGE {
        let _ = std::fs::remove_file(lock_path);
    }
}

struct LedgerLockGuard {
    path: PathBuf,
}

impl Drop for LedgerLockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn now_epoch_millis() -> u64 {
    match SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(duration) => u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        Err(_) => 0,
    }
}
