//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;

use decoct_core::{AlertKind, TaskStatus};

use crate::error::StoreError;
use crate::repository::{AlertFilter, Repository, Stamp, TaskFilter};
use crate::state::AppState;

/// Collect all metrics from the repository and format as Prometheus text.
pub async fn collect_metrics(state: &AppState) -> Result<String, StoreError> {
    let mut output = String::new();
    let repo = state.repo.as_ref();

    collect_task_metrics(repo, &mut output).await?;
    collect_stage_metrics(repo, &mut output).await?;
    collect_alert_metrics(repo, &mut output).await?;
    collect_worker_metrics(repo, &mut output).await?;

    Ok(output)
}

/// Collect task counts by status.
async fn collect_task_metrics(repo: &dyn Repository, output: &mut String) -> Result<(), StoreError> {
    let pending = repo
        .count_tasks(&TaskFilter::new().status(TaskStatus::Pending))
        .await?;
    let done = repo
        .count_tasks(&TaskFilter::new().status(TaskStatus::Done))
        .await?;

    writeln!(
        output,
        "# HELP decoct_tasks_total Total number of tasks by status"
    )
    .ok();
    writeln!(output, "# TYPE decoct_tasks_total gauge").ok();
    writeln!(output, "decoct_tasks_total{{status=\"pending\"}} {pending}").ok();
    writeln!(output, "decoct_tasks_total{{status=\"done\"}} {done}").ok();
    Ok(())
}

/// Collect pending tasks by the stage they are waiting on.
async fn collect_stage_metrics(
    repo: &dyn Repository,
    output: &mut String,
) -> Result<(), StoreError> {
    let pending = TaskFilter::new().status(TaskStatus::Pending);
    let stages = [
        ("receive", pending.clone().unstamped(Stamp::Receive)),
        (
            "formulate",
            pending.clone().stamped(Stamp::Receive).unstamped(Stamp::Form),
        ),
        (
            "decoction",
            pending.stamped(Stamp::Form).unstamped(Stamp::DecoctionEnd),
        ),
    ];

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP decoct_tasks_awaiting Pending tasks by the stage they await"
    )
    .ok();
    writeln!(output, "# TYPE decoct_tasks_awaiting gauge").ok();
    for (stage, filter) in &stages {
        let count = repo.count_tasks(filter).await?;
        writeln!(output, "decoct_tasks_awaiting{{stage=\"{stage}\"}} {count}").ok();
    }
    Ok(())
}

/// Collect unacknowledged alerts by kind.
async fn collect_alert_metrics(
    repo: &dyn Repository,
    output: &mut String,
) -> Result<(), StoreError> {
    let open = repo
        .list_alerts(&AlertFilter::new().unacknowledged())
        .await?;

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP decoct_alerts_open Unacknowledged alerts by kind"
    )
    .ok();
    writeln!(output, "# TYPE decoct_alerts_open gauge").ok();
    for kind in AlertKind::all() {
        let count = open.iter().filter(|a| a.kind == *kind).count();
        writeln!(output, "decoct_alerts_open{{kind=\"{kind}\"}} {count}").ok();
    }
    Ok(())
}

/// Collect the registered worker count.
async fn collect_worker_metrics(
    repo: &dyn Repository,
    output: &mut String,
) -> Result<(), StoreError> {
    let workers = repo.list_workers().await?.len();

    writeln!(output).ok();
    writeln!(output, "# HELP decoct_workers_total Registered workers").ok();
    writeln!(output, "# TYPE decoct_workers_total gauge").ok();
    writeln!(output, "decoct_workers_total {workers}").ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use decoct_core::{AlertDraft, Severity};

    #[tokio::test]
    async fn test_collect_metrics_empty_state() {
        let state = AppState::new(Config::default());
        let output = collect_metrics(&state).await.unwrap();

        assert!(output.contains("decoct_tasks_total{status=\"pending\"} 0"));
        assert!(output.contains("decoct_tasks_awaiting{stage=\"receive\"} 0"));
        assert!(output.contains("decoct_alerts_open{kind=\"backlog\"} 0"));
        assert!(output.contains("decoct_workers_total 0"));
    }

    #[tokio::test]
    async fn test_open_alerts_counted_by_kind() {
        let state = AppState::new(Config::default());
        state
            .notifier
            .raise(AlertDraft::new(AlertKind::Backlog, Severity::High, "backlog"))
            .await
            .unwrap();

        let output = collect_metrics(&state).await.unwrap();
        assert!(output.contains("decoct_alerts_open{kind=\"backlog\"} 1"));
        assert!(output.contains("decoct_alerts_open{kind=\"low-efficiency\"} 0"));
    }
}
