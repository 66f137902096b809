//! Alert persistence and delivery.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use decoct_core::{Alert, AlertDraft, AlertId, AlertKind};

use crate::broadcast::{BroadcastSink, Topic};
use crate::error::{NotificationDeliveryError, StoreError};
use crate::repository::{AlertFilter, Repository};

/// Per-sink delivery result for one raised alert.
#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    /// Sinks that accepted the alert.
    pub delivered: Vec<String>,
    /// Sinks that rejected it.
    pub failures: Vec<NotificationDeliveryError>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A persisted alert and how its delivery went.
#[derive(Debug, Clone)]
pub struct RaiseOutcome {
    pub alert: Alert,
    pub delivery: DeliveryReport,
}

/// Persists alerts and forwards them to broadcast sinks.
///
/// An alert is stored before any sink sees it. Delivery failures never undo
/// the write.
pub struct Notifier {
    repo: Arc<dyn Repository>,
    sinks: Vec<Arc<dyn BroadcastSink>>,
}

impl Notifier {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            sinks: Vec::new(),
        }
    }

    /// Add a delivery sink.
    pub fn with_sink(mut self, sink: Arc<dyn BroadcastSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Raise an alert stamped with the current time.
    pub async fn raise(&self, draft: AlertDraft) -> Result<RaiseOutcome, StoreError> {
        self.raise_at(draft, Utc::now()).await
    }

    /// Raise an alert stamped with `now`.
    pub async fn raise_at(
        &self,
        draft: AlertDraft,
        now: DateTime<Utc>,
    ) -> Result<RaiseOutcome, StoreError> {
        let alert = self.repo.insert_alert(draft.into_alert(now)).await?;

        info!(
            alert_id = %alert.id,
            kind = %alert.kind,
            severity = %alert.severity,
            "Alert raised"
        );

        let delivery = self.deliver(&alert);
        Ok(RaiseOutcome { alert, delivery })
    }

    fn deliver(&self, alert: &Alert) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        let payload = match serde_json::to_value(alert) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(alert_id = %alert.id, error = %e, "Failed to encode alert");
                return report;
            }
        };

        for sink in &self.sinks {
            match sink.publish(Topic::NewAlert, payload.clone()) {
                Ok(()) => report.delivered.push(sink.name().to_string()),
                Err(e) => {
                    warn!(alert_id = %alert.id, error = %e, "Alert delivery failed");
                    report.failures.push(e);
                }
            }
        }

        report
    }

    /// Mark an alert acknowledged. Acknowledging twice is a no-op.
    pub async fn acknowledge(&self, id: &AlertId) -> Result<Alert, StoreError> {
        let mut alert = self.load(id).await?;
        if !alert.acknowledge() {
            return Ok(alert);
        }
        info!(alert_id = %id, "Alert acknowledged");
        self.repo.update_alert(&alert).await
    }

    /// Mark an alert resolved. The first resolution time is kept.
    pub async fn resolve(&self, id: &AlertId) -> Result<Alert, StoreError> {
        let mut alert = self.load(id).await?;
        if !alert.resolve(Utc::now()) {
            return Ok(alert);
        }
        info!(alert_id = %id, "Alert resolved");
        self.repo.update_alert(&alert).await
    }

    async fn load(&self, id: &AlertId) -> Result<Alert, StoreError> {
        self.repo
            .get_alert(id)
            .await?
            .ok_or_else(|| StoreError::not_found("alert", id))
    }

    /// All unacknowledged alerts, newest first.
    pub async fn unread(&self) -> Result<Vec<Alert>, StoreError> {
        self.repo
            .list_alerts(&AlertFilter::new().unacknowledged())
            .await
    }

    /// Latest alerts of one kind.
    pub async fn by_kind(&self, kind: AlertKind, limit: usize) -> Result<Vec<Alert>, StoreError> {
        self.repo
            .list_alerts(&AlertFilter::new().kind(kind).limit(limit))
            .await
    }

    /// Alerts raised in the trailing `hours`.
    ///
    /// A window reaching past the earliest representable time covers every
    /// alert.
    pub async fn recent(&self, hours: i64, limit: usize) -> Result<Vec<Alert>, StoreError> {
        let mut filter = AlertFilter::new().limit(limit);
        match Duration::try_hours(hours).and_then(|window| Utc::now().checked_sub_signed(window)) {
            Some(since) => filter = filter.created_since(since),
            None => debug!(hours, "Alert window out of range, listing all"),
        }
        self.repo.list_alerts(&filter).await
    }
}
