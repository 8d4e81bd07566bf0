//! # Example: layered_services
//!
//! Three services with dependencies, a flaky cache that recovers on its own,
//! and a custom subscriber next to the built-in [`LogWriter`].
//!
//! Shows how to:
//! - Declare definitions with dependencies, config and capabilities.
//! - Start a service and let its dependencies come up first.
//! - Observe recovery through events.
//! - Tear everything down in reverse order with [`Orchestrator::destroy`].
//!
//! ## Flow
//! ```text
//! register(db), register(cache → db), register(api → db, cache)
//! start(api)
//!   ├─► start(db)      ─► started
//!   ├─► start(cache)   ─► fails (first build)
//!   └─► api fails      ─► recovery: sleep, restart(api)
//!                               ├─► cache builds ─► started
//!                               └─► api started  ─► ServiceRecovered
//! destroy() ─► stop api, cache, db
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example layered_services --features logging
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use depvisor::{
    Dependencies, Event, EventKind, HealthCheckable, HealthStatus, LogWriter, Orchestrator,
    OrchestratorConfig, Service, ServiceDefinition, ServiceError, Stoppable, Subscribe,
};
use tracing_subscriber::EnvFilter;

struct Db {
    url: String,
}

impl Service for Db {
    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        Some(self)
    }
}

#[async_trait]
impl Stoppable for Db {
    async fn stop(&self) -> Result<(), ServiceError> {
        println!("closing pool for {}", self.url);
        Ok(())
    }
}

struct Cache;
impl Service for Cache {}

struct Api {
    db: Arc<Db>,
}

impl Service for Api {
    fn as_health_checkable(&self) -> Option<&dyn HealthCheckable> {
        Some(self)
    }
}

#[async_trait]
impl HealthCheckable for Api {
    async fn health_check(&self) -> Result<HealthStatus, ServiceError> {
        Ok(HealthStatus::Healthy)
    }
}

/// Prints only the recovery story.
struct RecoveryWatch;

#[async_trait]
impl Subscribe for RecoveryWatch {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::ServiceRecoveryAttempt => println!(
                "[watch] retrying {} in {}ms (attempt {})",
                ev.service.as_deref().unwrap_or("<unknown>"),
                ev.delay_ms.unwrap_or(0),
                ev.attempt.unwrap_or(0)
            ),
            EventKind::ServiceRecovered => println!(
                "[watch] {} is back",
                ev.service.as_deref().unwrap_or("<unknown>")
            ),
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "recovery-watch"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = OrchestratorConfig {
        retry_delay: Duration::from_millis(200),
        health_check_interval: Duration::from_secs(1),
        ..OrchestratorConfig::default()
    };
    let orch = Orchestrator::builder(cfg)
        .with_subscriber(Arc::new(LogWriter::new()))
        .with_subscriber(Arc::new(RecoveryWatch))
        .build();

    orch.register(
        ServiceDefinition::builder("db")
            .version("14.2")
            .config(serde_json::json!({ "url": "postgres://localhost/app" }))
            .factory(|_deps: Dependencies, cfg: serde_json::Value| async move {
                let url = cfg["url"]
                    .as_str()
                    .ok_or_else(|| ServiceError::fail("missing url"))?
                    .to_string();
                Ok::<_, ServiceError>(Db { url })
            })
            .build()?,
    )
    .await?;

    let builds = Arc::new(AtomicUsize::new(0));
    orch.register(
        ServiceDefinition::builder("cache")
            .dependency("db")
            .factory(move |_deps: Dependencies, _cfg: serde_json::Value| {
                let first = builds.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if first {
                        return Err(ServiceError::fail("warming up"));
                    }
                    Ok(Cache)
                }
            })
            .build()?,
    )
    .await?;

    orch.register(
        ServiceDefinition::builder("api")
            .depends_on(["db", "cache"])
            .metadata("team", "platform")
            .factory(|deps: Dependencies, _cfg: serde_json::Value| async move {
                Ok::<_, ServiceError>(Api {
                    db: deps.require::<Db>("db")?,
                })
            })
            .build()?,
    )
    .await?;

    println!("startup order: {:?}", orch.startup_order().await);

    if let Err(err) = orch.start("api").await {
        println!("first start failed: {err}");
    }

    tokio::time::sleep(Duration::from_millis(600)).await;
    if let Some(api) = orch.get_as::<Api>("api").await {
        println!("api is talking to {}", api.db.url);
    }
    for report in orch.check_health().await {
        println!("health {}: {:?}", report.name, report.outcome);
    }
    println!("{}", serde_json::to_string_pretty(&orch.metrics().await)?);

    let report = orch.destroy().await;
    println!("stopped: {:?}", report.succeeded);
    Ok(())
}
