//! Live dashboard metrics.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use decoct_core::{Task, TaskStatus, WorkerId};

use crate::alerts::rules::day_start;
use crate::broadcast::{BroadcastSink, Topic};
use crate::error::{NotificationDeliveryError, StoreError};
use crate::repository::{PrescriptionFilter, Repository, Stamp, TaskFilter};

const TOP_WORKERS: usize = 5;
const HOURLY_BUCKETS: i64 = 24;

/// Headline counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoreMetrics {
    pub total_prescriptions: usize,
    pub today_prescriptions: usize,
    pub pending_tasks: usize,
    pub completed_today: usize,
    pub total_tasks: usize,
}

/// Pending tasks by the stage they wait on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDistribution {
    pub receive: usize,
    pub formulate: usize,
    pub decoction: usize,
}

/// One row of the worker leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerEfficiency {
    pub worker_id: WorkerId,
    pub name: String,
    pub completed_count: usize,
}

/// Completions per hour over the trailing day, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyStats {
    pub hours: Vec<String>,
    pub completed: Vec<usize>,
}

/// Receive-to-finish minutes over all completed tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingTime {
    pub average_minutes: f64,
    pub fastest_minutes: f64,
    pub slowest_minutes: f64,
}

/// Everything shown on the live dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardMetrics {
    pub timestamp: DateTime<Utc>,
    pub metrics: CoreMetrics,
    pub stage_distribution: StageDistribution,
    pub worker_efficiency: Vec<WorkerEfficiency>,
    pub hourly_stats: HourlyStats,
    pub processing_time: ProcessingTime,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl DashboardMetrics {
    /// Compute the dashboard as of `now`.
    pub async fn collect(repo: &dyn Repository, now: DateTime<Utc>) -> Result<Self, StoreError> {
        let today = day_start(now);
        let pending = TaskFilter::new().status(TaskStatus::Pending);

        let metrics = CoreMetrics {
            total_prescriptions: repo
                .count_prescriptions(&PrescriptionFilter::default())
                .await?,
            today_prescriptions: repo
                .count_prescriptions(&PrescriptionFilter::between(Some(today), None))
                .await?,
            pending_tasks: repo.count_tasks(&pending).await?,
            completed_today: repo
                .count_tasks(&TaskFilter::new().status(TaskStatus::Done).ended_since(today))
                .await?,
            total_tasks: repo.count_tasks(&TaskFilter::new()).await?,
        };

        let stage_distribution = StageDistribution {
            receive: repo
                .count_tasks(&pending.clone().unstamped(Stamp::Receive))
                .await?,
            formulate: repo
                .count_tasks(
                    &pending
                        .clone()
                        .stamped(Stamp::Receive)
                        .unstamped(Stamp::Form),
                )
                .await?,
            decoction: repo
                .count_tasks(
                    &pending
                        .clone()
                        .stamped(Stamp::Form)
                        .unstamped(Stamp::DecoctionEnd),
                )
                .await?,
        };

        let done = repo
            .list_tasks(&TaskFilter::new().status(TaskStatus::Done))
            .await?;

        let mut worker_efficiency = Vec::new();
        for worker in repo.list_workers().await? {
            let completed_count = done
                .iter()
                .filter(|t| t.involves(&worker.id))
                .filter(|t| t.decoction_end_time.is_some_and(|end| end >= today))
                .count();
            worker_efficiency.push(WorkerEfficiency {
                worker_id: worker.id,
                name: worker.name,
                completed_count,
            });
        }
        // Stable sort keeps id order among ties.
        worker_efficiency.sort_by(|a, b| b.completed_count.cmp(&a.completed_count));
        worker_efficiency.truncate(TOP_WORKERS);

        let dashboard = Self {
            timestamp: now,
            metrics,
            stage_distribution,
            worker_efficiency,
            hourly_stats: hourly_stats(&done, now),
            processing_time: processing_time(&done),
        };
        debug!(pending = dashboard.metrics.pending_tasks, "Dashboard collected");
        Ok(dashboard)
    }
}

fn hourly_stats(done: &[Task], now: DateTime<Utc>) -> HourlyStats {
    let mut hours = Vec::with_capacity(HOURLY_BUCKETS as usize);
    let mut completed = Vec::with_capacity(HOURLY_BUCKETS as usize);

    for i in (1..=HOURLY_BUCKETS).rev() {
        let start = now - Duration::hours(i);
        let end = now - Duration::hours(i - 1);
        let count = done
            .iter()
            .filter(|t| {
                t.decoction_end_time
                    .is_some_and(|ended| ended >= start && ended < end)
            })
            .count();
        hours.push(start.format("%H:00").to_string());
        completed.push(count);
    }

    HourlyStats { hours, completed }
}

fn processing_time(done: &[Task]) -> ProcessingTime {
    let minutes: Vec<f64> = done
        .iter()
        .filter_map(Task::processing_duration)
        .map(|d| d.num_seconds() as f64 / 60.0)
        .collect();

    if minutes.is_empty() {
        return ProcessingTime {
            average_minutes: 0.0,
            fastest_minutes: 0.0,
            slowest_minutes: 0.0,
        };
    }

    let sum: f64 = minutes.iter().sum();
    ProcessingTime {
        average_minutes: round1(sum / minutes.len() as f64),
        fastest_minutes: round1(minutes.iter().copied().fold(f64::INFINITY, f64::min)),
        slowest_minutes: round1(minutes.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
    }
}

/// Collect the dashboard and publish it on `dashboard_update`.
pub async fn publish(
    repo: &dyn Repository,
    sink: &dyn BroadcastSink,
    now: DateTime<Utc>,
) -> Result<DashboardMetrics, DashboardError> {
    let dashboard = DashboardMetrics::collect(repo, now).await?;
    let payload = serde_json::to_value(&dashboard).map_err(|e| NotificationDeliveryError {
        sink: sink.name().to_string(),
        reason: e.to_string(),
    })?;
    sink.publish(Topic::DashboardUpdate, payload)?;
    Ok(dashboard)
}

/// Dashboard push failure.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Delivery(#[from] NotificationDeliveryError),
}
