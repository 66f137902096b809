//! Periodic job scheduler - drives alert checks and dashboard pushes.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertEngine, TickStatus};
use crate::broadcast::BroadcastSink;
use crate::dashboard::{self, DashboardError};
use crate::repository::Repository;

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Run `job` every `period` until `shutdown` is cancelled.
///
/// The first run happens immediately. A run is always awaited before the
/// next one starts and missed ticks are dropped, so runs never overlap. A
/// panicking run is logged and the loop continues.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(MIN_PERIOD));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(job = name, period_secs = period.as_secs(), "Periodic job started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            if AssertUnwindSafe(job()).catch_unwind().await.is_err() {
                error!(job = name, "Periodic job panicked");
            }
        }

        info!(job = name, "Periodic job stopped");
    })
}

/// Owns the background jobs and their shared stop signal.
pub struct Scheduler {
    shutdown: CancellationToken,
    jobs: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Create a scheduler stopped by `shutdown`.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            jobs: Vec::new(),
        }
    }

    /// Spawn a named periodic job.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = spawn_periodic(name, period, self.shutdown.clone(), job);
        self.jobs.push(handle);
    }

    /// Run the alert rules every `period`.
    pub fn spawn_alert_checks(&mut self, engine: Arc<AlertEngine>, period: Duration) {
        self.spawn("alert-checks", period, move || {
            let engine = engine.clone();
            async move {
                let outcome = engine.run_alert_checks().await;
                match outcome.status {
                    TickStatus::Error => warn!(
                        detail = outcome.detail.as_deref().unwrap_or_default(),
                        "Alert check finished with errors"
                    ),
                    TickStatus::Skipped => debug!("Alert check skipped"),
                    TickStatus::Success => debug!(raised = outcome.raised.len(), "Alert check ok"),
                }
            }
        });
    }

    /// Publish dashboard metrics every `period`.
    pub fn spawn_dashboard_push(
        &mut self,
        repo: Arc<dyn Repository>,
        sink: Arc<dyn BroadcastSink>,
        period: Duration,
    ) {
        self.spawn("dashboard-push", period, move || {
            let repo = repo.clone();
            let sink = sink.clone();
            async move {
                match dashboard::publish(repo.as_ref(), sink.as_ref(), Utc::now()).await {
                    Ok(_) => debug!("Dashboard published"),
                    // Nobody is listening.
                    Err(DashboardError::Delivery(e)) => debug!(error = %e, "Dashboard not delivered"),
                    Err(e) => warn!(error = %e, "Failed to publish dashboard"),
                }
            }
        });
    }

    /// Number of spawned jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Cancel every job and wait for them to stop.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for job in self.jobs {
            if let Err(e) = job.await {
                error!(error = %e, "Periodic job ended abnormally");
            }
        }
    }
}
