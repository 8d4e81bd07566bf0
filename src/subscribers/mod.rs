//! # Event subscribers.
//!
//! [`Subscribe`] is the trait for custom handlers; [`SubscriberSet`] fans bus
//! events out to them. Built-in implementations live in `embedded` (feature
//! `logging`).
//!
//! ```text
//! Orchestrator ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit
//!                                                        ┌──────┼──────┐
//!                                                        ▼      ▼      ▼
//!                                                    LogWriter Custom ...
//! ```

#[cfg(feature = "logging")]
pub mod embedded;
mod subscribe;
mod subscriber_set;

pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
