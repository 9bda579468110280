//! Proactive delivery: the hourly ticker, its leader lease, and one-shot
//! focus reminders.

pub mod focus;
pub mod lease;
pub mod ticker;

pub use focus::{FocusJobId, FocusTimers};
pub use lease::{LeadershipDecision, TICKER_LEASE, TickerLease};
pub use ticker::{SchedulePolicy, TickReport, Ticker};
