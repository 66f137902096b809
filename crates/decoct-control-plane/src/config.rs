//! Control plane configuration.

use chrono::Duration;

/// Thresholds used by the alert rules.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertThresholds {
    /// Receive must happen within this long of prescription creation.
    pub receive_timeout: Duration,

    /// Formulate must happen within this long of receipt.
    pub formulate_timeout: Duration,

    /// Decoction must finish within this long of starting.
    pub decoction_timeout: Duration,

    /// Whole-workflow completions faster than this are suspicious.
    pub fast_completion: Duration,

    /// Only completions inside this trailing window are checked for speed.
    pub fast_window: Duration,

    /// Pending task count above which a backlog alert fires.
    pub backlog_threshold: usize,

    /// Backlog alerts are suppressed for this long after one fires.
    pub backlog_window: Duration,

    /// Workers completing below this fraction of the mean are flagged.
    pub efficiency_ratio: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::minutes(30),
            formulate_timeout: Duration::minutes(60),
            decoction_timeout: Duration::minutes(120),
            fast_completion: Duration::minutes(30),
            fast_window: Duration::hours(1),
            backlog_threshold: 10,
            backlog_window: Duration::minutes(30),
            efficiency_ratio: 0.7,
        }
    }
}

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub http_bind_addr: String,

    /// Interval between alert rule ticks (seconds).
    pub check_interval_secs: u64,

    /// Interval between dashboard pushes (seconds).
    pub dashboard_interval_secs: u64,

    /// Capacity of the broadcast channel.
    pub broadcast_capacity: usize,

    /// Alert rule thresholds.
    pub thresholds: AlertThresholds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_bind_addr: "127.0.0.1:8080".to_string(),
            check_interval_secs: 60,
            dashboard_interval_secs: 60,
            broadcast_capacity: 256,
            thresholds: AlertThresholds::default(),
        }
    }
}
