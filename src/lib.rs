//! Nudge: a per-user task reminder bot for Telegram.
//!
//! Users keep daily task lists through chat commands. Once per hour the
//! ticker maps the current instant into each user's own timezone and sends
//! the morning digest (after carrying yesterday's unfinished tasks forward)
//! and the tomorrow-planning prompts.
//!
//! # Architecture
//!
//! - **clock**: instants to user-local hours
//! - **store**: tasks and users in SQLite
//! - **ledger**: at-most-once record of delivered slots
//! - **carry** / **digest**: carry-over and message composition
//! - **scheduler**: the hourly ticker, leader lease and focus timers
//! - **channels**: the Telegram transport
//! - **commands** / **assistant**: parsing and handling user input

pub mod assistant;
pub mod carry;
pub mod channels;
pub mod clock;
pub mod commands;
pub mod config;
pub mod digest;
pub mod error;
pub mod ledger;
pub mod model;
pub mod nudge_dirs;
pub mod runtime;
pub mod scheduler;
pub mod store;

pub use assistant::{Assistant, Reply};
pub use config::NudgeConfig;
pub use error::{NudgeError, Result};
pub use scheduler::{TickReport, Ticker};
