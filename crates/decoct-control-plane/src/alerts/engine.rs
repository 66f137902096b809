//! Alert engine: runs every rule once per tick.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use decoct_core::Alert;

use super::notifier::Notifier;
use super::query::{AlertQuery, StoreAlertQuery};
use super::rules::{default_rules, AlertRule, Snapshot};
use crate::config::AlertThresholds;
use crate::error::RuleEvaluationError;
use crate::repository::Repository;

/// How a tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TickStatus {
    /// Every rule ran.
    Success,
    /// At least one rule failed, or the snapshot could not be read.
    Error,
    /// A previous tick was still running.
    Skipped,
}

/// Summary of one tick, for logs and the HTTP trigger.
#[derive(Debug, Clone, Serialize)]
pub struct TickOutcome {
    pub status: TickStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Alerts persisted during the tick, in rule order.
    pub raised: Vec<Alert>,
    /// Names of rules whose alerts were skipped.
    pub failed_rules: Vec<String>,
}

impl TickOutcome {
    fn new(status: TickStatus, timestamp: DateTime<Utc>, detail: Option<String>) -> Self {
        Self {
            status,
            timestamp,
            detail,
            raised: Vec::new(),
            failed_rules: Vec::new(),
        }
    }
}

/// Evaluates the alert rules against the repository and raises what they
/// report.
pub struct AlertEngine {
    repo: Arc<dyn Repository>,
    query: Arc<dyn AlertQuery>,
    notifier: Arc<Notifier>,
    rules: Vec<Box<dyn AlertRule>>,
    thresholds: AlertThresholds,
    /// Held for the duration of a tick.
    busy: Mutex<()>,
}

impl AlertEngine {
    /// Engine running the default rule set.
    pub fn new(
        repo: Arc<dyn Repository>,
        notifier: Arc<Notifier>,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            query: Arc::new(StoreAlertQuery::new(repo.clone())),
            rules: default_rules(&thresholds),
            repo,
            notifier,
            thresholds,
            busy: Mutex::new(()),
        }
    }

    /// Replace the rule set.
    pub fn with_rules(mut self, rules: Vec<Box<dyn AlertRule>>) -> Self {
        self.rules = rules;
        self
    }

    /// Run one tick at the current time.
    pub async fn run_alert_checks(&self) -> TickOutcome {
        self.run_alert_checks_at(Utc::now()).await
    }

    /// Run one tick as if the time were `now`.
    ///
    /// Never fails: rule errors are recorded in the outcome. Returns a
    /// `Skipped` outcome if another tick holds the engine.
    pub async fn run_alert_checks_at(&self, now: DateTime<Utc>) -> TickOutcome {
        let Ok(_guard) = self.busy.try_lock() else {
            warn!("Previous alert check still running, skipping tick");
            return TickOutcome::new(
                TickStatus::Skipped,
                now,
                Some("previous tick still running".to_string()),
            );
        };

        let snapshot = match Snapshot::load(self.repo.as_ref(), now, &self.thresholds).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Failed to load alert snapshot");
                return TickOutcome::new(
                    TickStatus::Error,
                    now,
                    Some(format!("snapshot failed: {e}")),
                );
            }
        };

        let mut outcome = TickOutcome::new(TickStatus::Success, now, None);
        let mut errors = Vec::new();

        for rule in &self.rules {
            let evaluated = AssertUnwindSafe(rule.evaluate(&snapshot, self.query.as_ref()))
                .catch_unwind()
                .await;

            let drafts = match evaluated {
                Ok(Ok(drafts)) => drafts,
                Ok(Err(source)) => {
                    let err = RuleEvaluationError {
                        rule: rule.name(),
                        source,
                    };
                    warn!(rule = rule.name(), error = %err, "Alert rule failed");
                    errors.push(err.to_string());
                    outcome.failed_rules.push(rule.name().to_string());
                    continue;
                }
                Err(_) => {
                    error!(rule = rule.name(), "Alert rule panicked");
                    errors.push(format!("Rule '{}' panicked", rule.name()));
                    outcome.failed_rules.push(rule.name().to_string());
                    continue;
                }
            };

            debug!(rule = rule.name(), count = drafts.len(), "Rule evaluated");

            for draft in drafts {
                match self.notifier.raise_at(draft, now).await {
                    Ok(raised) => outcome.raised.push(raised.alert),
                    Err(source) => {
                        let err = RuleEvaluationError {
                            rule: rule.name(),
                            source,
                        };
                        warn!(rule = rule.name(), error = %err, "Failed to persist alert");
                        errors.push(err.to_string());
                        if !outcome.failed_rules.iter().any(|r| r == rule.name()) {
                            outcome.failed_rules.push(rule.name().to_string());
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            info!(raised = outcome.raised.len(), "Alert check complete");
            outcome.detail = Some(format!("{} alerts raised", outcome.raised.len()));
        } else {
            outcome.status = TickStatus::Error;
            outcome.detail = Some(errors.join("; "));
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;

    use crate::error::StoreError;
    use crate::repository::InMemoryRepository;
    use decoct_core::{
        AlertDraft, AlertKind, NewPrescription, Severity, Stage, Task, TaskStatus, Worker,
        WorkerId, WorkerRef,
    };

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T15:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn engine(repo: &Arc<InMemoryRepository>) -> AlertEngine {
        let notifier = Arc::new(Notifier::new(repo.clone()));
        AlertEngine::new(repo.clone(), notifier, AlertThresholds::default())
    }

    async fn prescription(repo: &InMemoryRepository, date: DateTime<Utc>) -> Task {
        let prescription = NewPrescription::new("patient", "doctor", 1.0)
            .into_prescription(date)
            .unwrap();
        let prescription = repo.insert_prescription(prescription).await.unwrap();
        Task::new(prescription.id)
    }

    async fn completed(
        repo: &InMemoryRepository,
        worker: &WorkerRef,
        received: DateTime<Utc>,
        ended: DateTime<Utc>,
    ) -> Task {
        let mut task = prescription(repo, received).await;
        task.receive_worker = Some(worker.clone());
        task.form_worker = Some(worker.clone());
        task.decoction_worker = Some(worker.clone());
        task.receive_time = Some(received);
        task.form_time = Some(received);
        task.decoction_start_time = Some(received);
        task.decoction_end_time = Some(ended);
        task.status = TaskStatus::Done;
        repo.insert_task(task).await.unwrap()
    }

    fn of_kind(outcome: &TickOutcome, kind: AlertKind) -> Vec<&Alert> {
        outcome.raised.iter().filter(|a| a.kind == kind).collect()
    }

    #[tokio::test]
    async fn test_receive_timeout_fires_once() {
        let repo = Arc::new(InMemoryRepository::new());
        let mut task = prescription(&repo, now() - Duration::minutes(31)).await;
        task.assign(Stage::Receive, WorkerRef::new("w1", "Li")).unwrap();
        let task = repo.insert_task(task).await.unwrap();

        let engine = engine(&repo);
        let first = engine.run_alert_checks_at(now()).await;
        assert_eq!(first.status, TickStatus::Success);
        let timeouts = of_kind(&first, AlertKind::StageTimeoutReceive);
        assert_eq!(timeouts.len(), 1);
        assert_eq!(timeouts[0].severity, Severity::High);
        assert_eq!(timeouts[0].task_id.as_ref(), Some(&task.id));
        assert_eq!(timeouts[0].worker_id, Some(WorkerId::new("w1")));

        let second = engine.run_alert_checks_at(now()).await;
        assert!(of_kind(&second, AlertKind::StageTimeoutReceive).is_empty());

        // Acknowledging lets the timeout fire again.
        let notifier = Notifier::new(repo.clone());
        notifier.acknowledge(&timeouts[0].id).await.unwrap();
        let third = engine
            .run_alert_checks_at(now() + Duration::minutes(5))
            .await;
        let refired = of_kind(&third, AlertKind::StageTimeoutReceive);
        assert_eq!(refired.len(), 1);
        assert_ne!(refired[0].id, timeouts[0].id);
    }

    #[tokio::test]
    async fn test_fast_completion_never_repeats() {
        let repo = Arc::new(InMemoryRepository::new());
        let worker = WorkerRef::new("w1", "Li");
        let received = now() - Duration::minutes(30);
        completed(&repo, &worker, received, received + Duration::minutes(20)).await;

        let engine = engine(&repo);
        let first = engine.run_alert_checks_at(now()).await;
        let fast = of_kind(&first, AlertKind::AbnormalFastCompletion);
        assert_eq!(fast.len(), 1);
        assert_eq!(fast[0].severity, Severity::Medium);
        assert!(fast[0].message.contains("20"));

        let notifier = Notifier::new(repo.clone());
        notifier.acknowledge(&fast[0].id).await.unwrap();

        let second = engine.run_alert_checks_at(now()).await;
        assert!(of_kind(&second, AlertKind::AbnormalFastCompletion).is_empty());
    }

    #[tokio::test]
    async fn test_backlog_window() {
        let repo = Arc::new(InMemoryRepository::new());
        for _ in 0..11 {
            let task = prescription(&repo, now()).await;
            repo.insert_task(task).await.unwrap();
        }

        let engine = engine(&repo);
        let first = engine.run_alert_checks_at(now()).await;
        let backlog = of_kind(&first, AlertKind::Backlog);
        assert_eq!(backlog.len(), 1);
        assert_eq!(
            backlog[0].payload,
            Some(serde_json::json!({ "pending_count": 11 }))
        );

        let task = prescription(&repo, now()).await;
        repo.insert_task(task).await.unwrap();

        let within = engine
            .run_alert_checks_at(now() + Duration::minutes(10))
            .await;
        assert!(of_kind(&within, AlertKind::Backlog).is_empty());

        let after = engine
            .run_alert_checks_at(now() + Duration::minutes(31))
            .await;
        let backlog = of_kind(&after, AlertKind::Backlog);
        assert_eq!(backlog.len(), 1);
        assert_eq!(
            backlog[0].payload,
            Some(serde_json::json!({ "pending_count": 12 }))
        );
    }

    #[tokio::test]
    async fn test_low_efficiency_flags_idle_worker() {
        let repo = Arc::new(InMemoryRepository::new());
        let mut workers = Vec::new();
        for i in 0..5 {
            let worker = Worker::new(format!("worker-{i}")).with_id(WorkerId::new(format!("w{i}")));
            workers.push(repo.insert_worker(worker).await.unwrap());
        }

        let received = now() - Duration::hours(3);
        for worker in &workers[..4] {
            for _ in 0..10 {
                completed(&repo, &worker.to_ref(), received, now() - Duration::hours(2)).await;
            }
        }

        let engine = engine(&repo);
        let outcome = engine.run_alert_checks_at(now()).await;
        let low = of_kind(&outcome, AlertKind::LowEfficiency);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].worker_id, Some(WorkerId::new("w4")));
        assert!(low[0].message.contains("0% of average"));

        let again = engine
            .run_alert_checks_at(now() + Duration::minutes(10))
            .await;
        assert!(of_kind(&again, AlertKind::LowEfficiency).is_empty());

        let notifier = Notifier::new(repo.clone());
        notifier.acknowledge(&low[0].id).await.unwrap();
        let after_ack = engine
            .run_alert_checks_at(now() + Duration::minutes(20))
            .await;
        let refired = of_kind(&after_ack, AlertKind::LowEfficiency);
        assert_eq!(refired.len(), 1);
        assert_eq!(refired[0].worker_id, Some(WorkerId::new("w4")));

        // Yesterday's unacknowledged alert does not cover the new day.
        let tomorrow = now() + Duration::days(1);
        for worker in &workers[..4] {
            for _ in 0..10 {
                completed(
                    &repo,
                    &worker.to_ref(),
                    tomorrow - Duration::hours(3),
                    tomorrow - Duration::hours(2),
                )
                .await;
            }
        }
        let next_day = engine.run_alert_checks_at(tomorrow).await;
        let low = of_kind(&next_day, AlertKind::LowEfficiency);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].worker_id, Some(WorkerId::new("w4")));
    }

    struct BrokenRule;

    #[async_trait]
    impl AlertRule for BrokenRule {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn evaluate(
            &self,
            _: &Snapshot,
            _: &dyn AlertQuery,
        ) -> Result<Vec<AlertDraft>, StoreError> {
            Err(StoreError::Backend("connection reset".into()))
        }
    }

    struct AlwaysRule;

    #[async_trait]
    impl AlertRule for AlwaysRule {
        fn name(&self) -> &'static str {
            "always"
        }

        async fn evaluate(
            &self,
            _: &Snapshot,
            _: &dyn AlertQuery,
        ) -> Result<Vec<AlertDraft>, StoreError> {
            Ok(vec![AlertDraft::new(
                AlertKind::Backlog,
                Severity::High,
                "always",
            )])
        }
    }

    #[tokio::test]
    async fn test_failing_rule_does_not_stop_others() {
        let repo = Arc::new(InMemoryRepository::new());
        let engine =
            engine(&repo).with_rules(vec![Box::new(BrokenRule), Box::new(AlwaysRule)]);

        let outcome = engine.run_alert_checks_at(now()).await;
        assert_eq!(outcome.status, TickStatus::Error);
        assert_eq!(outcome.failed_rules, vec!["broken".to_string()]);
        assert_eq!(outcome.raised.len(), 1);
        assert!(outcome.detail.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_busy_engine_skips_tick() {
        let repo = Arc::new(InMemoryRepository::new());
        let engine = engine(&repo).with_rules(vec![Box::new(AlwaysRule)]);

        let guard = engine.busy.lock().await;
        let outcome = engine.run_alert_checks_at(now()).await;
        assert_eq!(outcome.status, TickStatus::Skipped);
        assert!(outcome.raised.is_empty());
        drop(guard);

        let outcome = engine.run_alert_checks_at(now()).await;
        assert_eq!(outcome.status, TickStatus::Success);
        assert_eq!(outcome.raised.len(), 1);
    }
}
