//! Recovery policies.
//!
//! This module groups the knobs that control **how long** the recovery
//! supervisor waits before restarting a failed service.
//!
//! ## Contents
//! - [`BackoffPolicy`] how recovery delays evolve (step / growth / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid restart stampedes
//!
//! ## Quick wiring
//! ```text
//! OrchestratorConfig { retry_delay, max_retry_delay, jitter, max_retries }
//!      └─► OrchestratorConfig::backoff() → BackoffPolicy (linear)
//!           └─► core::recovery uses backoff.next(retry_count) before each restart
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → linear, step=1s, max=60s, jitter=None.
//! - `JitterPolicy::None`.

mod backoff;
mod jitter;

pub use backoff::{BackoffPolicy, Growth};
pub use jitter::JitterPolicy;
