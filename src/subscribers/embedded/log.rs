//! # LogWriter: events as `tracing` records
//!
//! Renders every bus event as one compact line. Failures are logged at
//! `warn`, everything else at `info`. No global subscriber is installed; the
//! application decides where records go.
//!
//! ## Example output
//! ```text
//! [registered] service=db
//! [starting] service=api
//! [start-failed] service=api dependency=db reason="service 'db' failed to start: boom"
//! [recovery-attempt] service=api attempt=1 delay_ms=1000
//! [stop-failed] service=cache timeout_ms=10000 reason="..."
//! [config-updated]
//! ```

use std::fmt::Write as _;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::Event;
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Formats an event as `[kind] key=value ...`.
    pub fn render(e: &Event) -> String {
        let mut line = format!("[{}]", e.kind.as_label());
        if let Some(service) = &e.service {
            let _ = write!(line, " service={service}");
        }
        if let Some(dep) = &e.dependency {
            let _ = write!(line, " dependency={dep}");
        }
        if let Some(attempt) = e.attempt {
            let _ = write!(line, " attempt={attempt}");
        }
        if let Some(ms) = e.delay_ms {
            let _ = write!(line, " delay_ms={ms}");
        }
        if let Some(ms) = e.duration_ms {
            let _ = write!(line, " duration_ms={ms}");
        }
        if let Some(ms) = e.timeout_ms {
            let _ = write!(line, " timeout_ms={ms}");
        }
        if let Some(reason) = &e.reason {
            let _ = write!(line, " reason={reason:?}");
        }
        line
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let line = Self::render(e);
        if e.kind.is_failure() {
            warn!(target: "depvisor::events", seq = e.seq, "{line}");
        } else {
            info!(target: "depvisor::events", seq = e.seq, "{line}");
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_render_includes_present_fields_only() {
        let ev = Event::new(EventKind::ServiceRecoveryAttempt)
            .with_service("api")
            .with_attempt(2)
            .with_delay(Duration::from_millis(40));
        assert_eq!(
            LogWriter::render(&ev),
            "[recovery-attempt] service=api attempt=2 delay_ms=40"
        );
        assert_eq!(
            LogWriter::render(&Event::new(EventKind::ConfigUpdated)),
            "[config-updated]"
        );
    }

    #[test]
    fn test_render_quotes_reason() {
        let ev = Event::new(EventKind::ServiceStartFailed)
            .with_service("db")
            .with_reason("boom");
        assert_eq!(LogWriter::render(&ev), "[start-failed] service=db reason=\"boom\"");
    }
}
