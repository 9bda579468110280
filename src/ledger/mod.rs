//! Send ledger: durable record of which logical slots were delivered.
//!
//! A slot is `(user, kind, local day, local hour)`. Existence of a record is
//! the only idempotence signal the scheduler uses; records are never updated
//! or removed here.

pub mod jsonl;

use crate::error::Result;
use crate::model::SendKey;

pub use jsonl::JsonlSendLedger;

/// Storage-agnostic ledger contract.
pub trait SendLedger: Send + Sync {
    /// Exact-match existence check.
    fn was_sent(&self, key: &SendKey) -> Result<bool>;

    /// Insert-if-absent. Returns `true` when newly recorded; a duplicate is a
    /// no-op returning `false`, never an error.
    fn mark_sent(&self, key: &SendKey) -> Result<bool>;
}
