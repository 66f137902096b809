//! Alert rules.
//!
//! Each rule is a function of a per-tick [`Snapshot`] and an [`AlertQuery`]
//! returning the alerts it wants raised. Rules do not persist anything.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::debug;

use decoct_core::{
    AlertDraft, AlertKind, Prescription, PrescriptionId, Severity, Stage, Task, TaskStatus,
    Worker,
};

use super::query::AlertQuery;
use crate::config::AlertThresholds;
use crate::error::StoreError;
use crate::repository::{Repository, Stamp, TaskFilter};

/// Start of the UTC day containing `now`.
pub fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Workflow state read once at the start of a tick.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Evaluation time.
    pub now: DateTime<Utc>,

    /// All pending tasks.
    pub pending: Vec<Task>,

    /// Number of pending tasks.
    pub pending_count: usize,

    /// Done tasks whose decoction ended today or inside the fast window.
    pub completed: Vec<Task>,

    /// Prescriptions of pending tasks still awaiting receipt.
    pub prescriptions: HashMap<PrescriptionId, Prescription>,

    /// All workers.
    pub workers: Vec<Worker>,
}

impl Snapshot {
    /// Read everything the rules need from the repository.
    pub async fn load(
        repo: &dyn Repository,
        now: DateTime<Utc>,
        thresholds: &AlertThresholds,
    ) -> Result<Self, StoreError> {
        let pending_filter = TaskFilter::new().status(TaskStatus::Pending);
        let pending = repo.list_tasks(&pending_filter).await?;
        let pending_count = repo.count_tasks(&pending_filter).await?;

        let completed_since = day_start(now).min(now - thresholds.fast_window);
        let completed = repo
            .list_tasks(
                &TaskFilter::new()
                    .status(TaskStatus::Done)
                    .ended_since(completed_since),
            )
            .await?;

        let mut prescriptions = HashMap::new();
        for task in pending.iter().filter(|t| t.receive_time.is_none()) {
            if let Some(p) = repo.get_prescription(&task.prescription_id).await? {
                prescriptions.insert(p.id.clone(), p);
            }
        }

        let workers = repo.list_workers().await?;

        Ok(Self {
            now,
            pending,
            pending_count,
            completed,
            prescriptions,
            workers,
        })
    }
}

/// A single alert rule.
#[async_trait]
pub trait AlertRule: Send + Sync {
    /// Rule name for logs and tick outcomes.
    fn name(&self) -> &'static str;

    /// Alerts this rule wants raised for the snapshot.
    async fn evaluate(
        &self,
        snapshot: &Snapshot,
        alerts: &dyn AlertQuery,
    ) -> Result<Vec<AlertDraft>, StoreError>;
}

/// The rules run on every tick, in order.
pub fn default_rules(thresholds: &AlertThresholds) -> Vec<Box<dyn AlertRule>> {
    vec![
        Box::new(StageTimeoutRule::new(Stage::Receive, thresholds.receive_timeout)),
        Box::new(StageTimeoutRule::new(Stage::Formulate, thresholds.formulate_timeout)),
        Box::new(StageTimeoutRule::new(Stage::Decoction, thresholds.decoction_timeout)),
        Box::new(AbnormalFastRule {
            limit: thresholds.fast_completion,
            window: thresholds.fast_window,
        }),
        Box::new(BacklogRule {
            threshold: thresholds.backlog_threshold,
            window: thresholds.backlog_window,
        }),
        Box::new(WorkerEfficiencyRule {
            ratio: thresholds.efficiency_ratio,
        }),
    ]
}

fn describe(limit: Duration) -> String {
    let minutes = limit.num_minutes();
    if minutes >= 60 && minutes % 60 == 0 {
        format!("{} h", minutes / 60)
    } else {
        format!("{minutes} min")
    }
}

/// A stage has been open longer than its limit.
///
/// Suppressed while an unacknowledged timeout of the same kind exists for
/// the task, so an acknowledged timeout can fire again.
pub struct StageTimeoutRule {
    stage: Stage,
    limit: Duration,
    filter: TaskFilter,
}

impl StageTimeoutRule {
    pub fn new(stage: Stage, limit: Duration) -> Self {
        let filter = match stage {
            Stage::Receive => TaskFilter::new()
                .staffed(Stage::Receive)
                .unstamped(Stamp::Receive),
            Stage::Formulate => TaskFilter::new()
                .stamped(Stamp::Receive)
                .unstamped(Stamp::Form)
                .staffed(Stage::Formulate),
            Stage::Decoction => TaskFilter::new()
                .stamped(Stamp::Form)
                .stamped(Stamp::DecoctionStart)
                .unstamped(Stamp::DecoctionEnd),
        };
        Self {
            stage,
            limit,
            filter,
        }
    }

    /// When the stage became open for `task`.
    fn opened_at(&self, task: &Task, snapshot: &Snapshot) -> Option<DateTime<Utc>> {
        match self.stage {
            Stage::Receive => snapshot
                .prescriptions
                .get(&task.prescription_id)
                .map(|p| p.date),
            Stage::Formulate => task.receive_time,
            Stage::Decoction => task.decoction_start_time,
        }
    }
}

#[async_trait]
impl AlertRule for StageTimeoutRule {
    fn name(&self) -> &'static str {
        match self.stage {
            Stage::Receive => "timeout-receive",
            Stage::Formulate => "timeout-formulate",
            Stage::Decoction => "timeout-decoction",
        }
    }

    async fn evaluate(
        &self,
        snapshot: &Snapshot,
        alerts: &dyn AlertQuery,
    ) -> Result<Vec<AlertDraft>, StoreError> {
        let kind = AlertKind::stage_timeout(self.stage);
        let mut drafts = Vec::new();

        for task in snapshot.pending.iter().filter(|t| self.filter.matches(t)) {
            let Some(opened_at) = self.opened_at(task, snapshot) else {
                continue;
            };
            if snapshot.now - opened_at <= self.limit {
                continue;
            }
            if alerts.open_for_task(kind, &task.id).await? {
                debug!(task_id = %task.id, kind = %kind, "Timeout already open");
                continue;
            }

            let worker = task.worker(self.stage);
            let worker_name = worker.map_or("unassigned", |w| w.name.as_str());
            let mut draft = AlertDraft::new(
                kind,
                Severity::High,
                format!(
                    "Task #{} {} stage timed out (>{}), assigned worker: {}",
                    task.id,
                    self.stage,
                    describe(self.limit),
                    worker_name
                ),
            )
            .with_task(task.id.clone());
            if let Some(worker) = worker {
                draft = draft.with_worker(worker.id.clone());
            }
            drafts.push(draft);
        }

        Ok(drafts)
    }
}

/// A task went from receipt to finished decoction suspiciously fast.
///
/// Fires at most once per task, acknowledged or not.
pub struct AbnormalFastRule {
    pub limit: Duration,
    pub window: Duration,
}

#[async_trait]
impl AlertRule for AbnormalFastRule {
    fn name(&self) -> &'static str {
        "abnormal-fast"
    }

    async fn evaluate(
        &self,
        snapshot: &Snapshot,
        alerts: &dyn AlertQuery,
    ) -> Result<Vec<AlertDraft>, StoreError> {
        let kind = AlertKind::AbnormalFastCompletion;
        let window_start = snapshot.now - self.window;
        let mut drafts = Vec::new();

        for task in &snapshot.completed {
            if !task.decoction_end_time.is_some_and(|end| end >= window_start) {
                continue;
            }
            let Some(elapsed) = task.processing_duration() else {
                continue;
            };
            if elapsed >= self.limit {
                continue;
            }
            if alerts.ever_for_task(kind, &task.id).await? {
                continue;
            }

            let minutes = elapsed.num_minutes();
            drafts.push(
                AlertDraft::new(
                    kind,
                    Severity::Medium,
                    format!(
                        "Task #{} completed abnormally fast ({} min), check that procedures were followed",
                        task.id, minutes
                    ),
                )
                .with_task(task.id.clone())
                .with_payload(serde_json::json!({ "elapsed_minutes": minutes })),
            );
        }

        Ok(drafts)
    }
}

/// Too many tasks are pending system-wide.
///
/// Suppressed while an unacknowledged backlog alert younger than the
/// window exists.
pub struct BacklogRule {
    pub threshold: usize,
    pub window: Duration,
}

#[async_trait]
impl AlertRule for BacklogRule {
    fn name(&self) -> &'static str {
        "backlog"
    }

    async fn evaluate(
        &self,
        snapshot: &Snapshot,
        alerts: &dyn AlertQuery,
    ) -> Result<Vec<AlertDraft>, StoreError> {
        let pending = snapshot.pending_count;
        if pending <= self.threshold {
            return Ok(Vec::new());
        }
        if alerts
            .open_since(AlertKind::Backlog, snapshot.now - self.window)
            .await?
        {
            return Ok(Vec::new());
        }

        Ok(vec![AlertDraft::new(
            AlertKind::Backlog,
            Severity::High,
            format!(
                "Pending task backlog is high ({pending} tasks), add staff or streamline the workflow"
            ),
        )
        .with_payload(serde_json::json!({ "pending_count": pending }))])
    }
}

/// A worker completed far fewer tasks today than the average worker.
///
/// Suppressed while an unacknowledged alert for the worker raised today
/// exists.
pub struct WorkerEfficiencyRule {
    pub ratio: f64,
}

#[async_trait]
impl AlertRule for WorkerEfficiencyRule {
    fn name(&self) -> &'static str {
        "low-efficiency"
    }

    async fn evaluate(
        &self,
        snapshot: &Snapshot,
        alerts: &dyn AlertQuery,
    ) -> Result<Vec<AlertDraft>, StoreError> {
        if snapshot.workers.is_empty() {
            return Ok(Vec::new());
        }

        let today = day_start(snapshot.now);
        let finished_today: Vec<&Task> = snapshot
            .completed
            .iter()
            .filter(|t| t.decoction_end_time.is_some_and(|end| end >= today))
            .collect();

        let counts: Vec<(&Worker, usize)> = snapshot
            .workers
            .iter()
            .map(|w| (w, finished_today.iter().filter(|t| t.involves(&w.id)).count()))
            .collect();

        let total: usize = counts.iter().map(|(_, c)| c).sum();
        let mean = total as f64 / counts.len() as f64;
        let mut drafts = Vec::new();

        for (worker, completed) in counts {
            if completed as f64 >= mean * self.ratio {
                continue;
            }
            if alerts
                .open_for_worker_since(AlertKind::LowEfficiency, &worker.id, today)
                .await?
            {
                continue;
            }

            let percentage = if mean > 0.0 {
                completed as f64 / mean * 100.0
            } else {
                0.0
            };
            drafts.push(
                AlertDraft::new(
                    AlertKind::LowEfficiency,
                    Severity::Medium,
                    format!(
                        "Worker {} efficiency is low today ({percentage:.0}% of average), {completed} tasks completed",
                        worker.name
                    ),
                )
                .with_worker(worker.id.clone())
                .with_payload(serde_json::json!({
                    "completed": completed,
                    "average": mean,
                })),
            );
        }

        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use decoct_core::{TaskId, WorkerId, WorkerRef};

    /// Fake dedup capability: answers from fixed sets.
    #[derive(Default)]
    struct FakeQuery {
        open: HashSet<(AlertKind, String)>,
        ever: HashSet<(AlertKind, String)>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl AlertQuery for FakeQuery {
        async fn open_for_task(&self, kind: AlertKind, task: &TaskId) -> Result<bool, StoreError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.open.contains(&(kind, task.to_string())))
        }

        async fn ever_for_task(&self, kind: AlertKind, task: &TaskId) -> Result<bool, StoreError> {
            Ok(self.ever.contains(&(kind, task.to_string())))
        }

        async fn open_since(&self, kind: AlertKind, _: DateTime<Utc>) -> Result<bool, StoreError> {
            Ok(self.open.contains(&(kind, String::new())))
        }

        async fn open_for_worker_since(
            &self,
            kind: AlertKind,
            worker: &WorkerId,
            _: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            Ok(self.open.contains(&(kind, worker.to_string())))
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T15:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            now: now(),
            pending: Vec::new(),
            pending_count: 0,
            completed: Vec::new(),
            prescriptions: HashMap::new(),
            workers: Vec::new(),
        }
    }

    fn task(id: &str) -> Task {
        Task::new(PrescriptionId::new(format!("rx-{id}"))).with_id(TaskId::new(id))
    }

    fn finished(id: &str, worker: &str, start_min_ago: i64, took_min: i64) -> Task {
        let mut t = task(id);
        let start = now() - Duration::minutes(start_min_ago);
        let w = WorkerRef::new(worker, worker);
        t.receive_worker = Some(w.clone());
        t.form_worker = Some(w.clone());
        t.decoction_worker = Some(w);
        t.receive_time = Some(start);
        t.form_time = Some(start);
        t.decoction_start_time = Some(start);
        t.decoction_end_time = Some(start + Duration::minutes(took_min));
        t.status = TaskStatus::Done;
        t
    }

    #[tokio::test]
    async fn test_formulate_timeout_boundary_is_strict() {
        let mut at_limit = task("t1");
        at_limit.receive_time = Some(now() - Duration::minutes(60));
        at_limit.form_worker = Some(WorkerRef::new("w2", "Zhang"));
        let mut past_limit = task("t2");
        past_limit.receive_time = Some(now() - Duration::minutes(61));
        past_limit.form_worker = Some(WorkerRef::new("w2", "Zhang"));

        let mut snap = snapshot();
        snap.pending = vec![at_limit, past_limit];

        let rule = StageTimeoutRule::new(Stage::Formulate, Duration::minutes(60));
        let drafts = rule.evaluate(&snap, &FakeQuery::default()).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].kind, AlertKind::StageTimeoutFormulate);
        assert_eq!(drafts[0].task_id, Some(TaskId::new("t2")));
        assert_eq!(drafts[0].worker_id, Some(WorkerId::new("w2")));
        assert!(drafts[0].message.contains("(>1 h)"));
    }

    #[tokio::test]
    async fn test_formulate_timeout_needs_assigned_worker() {
        let mut t = task("t1");
        t.receive_time = Some(now() - Duration::hours(3));
        let mut snap = snapshot();
        snap.pending = vec![t];

        let rule = StageTimeoutRule::new(Stage::Formulate, Duration::minutes(60));
        let drafts = rule.evaluate(&snap, &FakeQuery::default()).await.unwrap();
        assert!(drafts.is_empty());
    }

    #[tokio::test]
    async fn test_decoction_timeout_suppressed_by_open_alert() {
        let mut t = task("t1");
        t.receive_time = Some(now() - Duration::hours(5));
        t.form_time = Some(now() - Duration::hours(4));
        t.decoction_start_time = Some(now() - Duration::hours(3));
        let mut snap = snapshot();
        snap.pending = vec![t];

        let mut query = FakeQuery::default();
        query
            .open
            .insert((AlertKind::StageTimeoutDecoction, "t1".to_string()));

        let rule = StageTimeoutRule::new(Stage::Decoction, Duration::minutes(120));
        let drafts = rule.evaluate(&snap, &query).await.unwrap();
        assert!(drafts.is_empty());
        assert_eq!(*query.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_receive_timeout_skips_missing_prescription() {
        let mut t = task("t1");
        t.receive_worker = Some(WorkerRef::new("w1", "Li"));
        let mut snap = snapshot();
        snap.pending = vec![t];

        let rule = StageTimeoutRule::new(Stage::Receive, Duration::minutes(30));
        let drafts = rule.evaluate(&snap, &FakeQuery::default()).await.unwrap();
        assert!(drafts.is_empty());
    }

    #[tokio::test]
    async fn test_abnormal_fast_ignores_completions_outside_window() {
        let mut snap = snapshot();
        snap.completed = vec![
            finished("recent", "w1", 30, 20),
            finished("old", "w1", 200, 10),
            finished("slow", "w1", 50, 45),
        ];

        let rule = AbnormalFastRule {
            limit: Duration::minutes(30),
            window: Duration::hours(1),
        };
        let drafts = rule.evaluate(&snap, &FakeQuery::default()).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].task_id, Some(TaskId::new("recent")));
        assert!(drafts[0].message.contains("(20 min)"));
        assert_eq!(drafts[0].severity, Severity::Medium);
    }

    #[tokio::test]
    async fn test_abnormal_fast_suppressed_by_any_prior_alert() {
        let mut snap = snapshot();
        snap.completed = vec![finished("t1", "w1", 30, 20)];
        let mut query = FakeQuery::default();
        query
            .ever
            .insert((AlertKind::AbnormalFastCompletion, "t1".to_string()));

        let rule = AbnormalFastRule {
            limit: Duration::minutes(30),
            window: Duration::hours(1),
        };
        assert!(rule.evaluate(&snap, &query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backlog_threshold_is_exclusive() {
        let rule = BacklogRule {
            threshold: 10,
            window: Duration::minutes(30),
        };
        let mut snap = snapshot();
        snap.pending_count = 10;
        assert!(rule
            .evaluate(&snap, &FakeQuery::default())
            .await
            .unwrap()
            .is_empty());

        snap.pending_count = 11;
        let drafts = rule.evaluate(&snap, &FakeQuery::default()).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(
            drafts[0].payload,
            Some(serde_json::json!({ "pending_count": 11 }))
        );
    }

    #[tokio::test]
    async fn test_efficiency_skipped_without_workers() {
        let mut snap = snapshot();
        snap.completed = vec![finished("t1", "w1", 30, 20)];
        let rule = WorkerEfficiencyRule { ratio: 0.7 };
        assert!(rule
            .evaluate(&snap, &FakeQuery::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_efficiency_quiet_when_nobody_finished() {
        let mut snap = snapshot();
        snap.workers = vec![Worker::new("A"), Worker::new("B")];
        let rule = WorkerEfficiencyRule { ratio: 0.7 };
        assert!(rule
            .evaluate(&snap, &FakeQuery::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_efficiency_ignores_yesterday() {
        let mut snap = snapshot();
        let a = Worker::new("A").with_id("a".into());
        let b = Worker::new("B").with_id("b".into());
        snap.workers = vec![a, b];
        // Finished before today's midnight, so it does not count.
        snap.completed = vec![
            finished("t1", "a", 60 * 20, 60),
            finished("t2", "b", 60, 40),
        ];

        let rule = WorkerEfficiencyRule { ratio: 0.7 };
        let drafts = rule.evaluate(&snap, &FakeQuery::default()).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].worker_id, Some(WorkerId::new("a")));
        assert!(drafts[0].message.contains("0% of average"));
    }

    #[tokio::test]
    async fn test_efficiency_suppressed_by_open_alert_for_worker() {
        let mut snap = snapshot();
        snap.workers = vec![
            Worker::new("A").with_id("a".into()),
            Worker::new("B").with_id("b".into()),
        ];
        snap.completed = vec![finished("t1", "b", 60, 40)];

        let mut query = FakeQuery::default();
        query
            .open
            .insert((AlertKind::LowEfficiency, "a".to_string()));

        let rule = WorkerEfficiencyRule { ratio: 0.7 };
        assert!(rule.evaluate(&snap, &query).await.unwrap().is_empty());
    }

    #[test]
    fn test_day_start() {
        assert_eq!(
            day_start(now()),
            DateTime::parse_from_rfc3339("2026-03-02T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc)
        );
    }
}
