//! Scheduler configuration.
//!
//! Every option has a default; deployments override through `SKUA_*`
//! environment variables. Interval options accept fractional seconds.

use std::time::Duration;

use serde::Serialize;

/// Capacity of the update, offer and failed-task queues.
pub const EVENT_QUEUE_CAPACITY: usize = 4096;

/// Backoff between SUBSCRIBE attempts while reconnecting.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Spacing between failed-task relaunches.
pub const FAILED_TASK_DELAY: Duration = Duration::from_secs(1);

/// Poll interval while waiting for agents to pass the filter chain.
pub const FILTER_POLL: Duration = Duration::from_secs(1);

/// Poll interval while waiting for a ranked agent to hold offers.
pub const OFFER_POLL: Duration = Duration::from_millis(100);

/// A persisted framework id older than this is discarded and the scheduler
/// subscribes fresh (master-side failover timeout, one week).
pub const FRAMEWORK_FAILOVER_TIMEOUT: Duration = Duration::from_secs(604_800);

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerConfig {
    /// Mesos master discovery endpoints. Each entry is queried for
    /// `/master/state` until a leader is found.
    pub zk_host: Vec<String>,

    /// ZooKeeper chroot of the Mesos ensemble. Kept for deployment parity;
    /// the core resolves the leader over HTTP.
    pub zk_path: String,

    /// Framework name presented on SUBSCRIBE.
    pub framework_name: String,

    /// User tasks run as.
    pub framework_user: String,

    /// Period between full reconciliation passes.
    pub reconciliation_interval: Duration,

    /// Tasks per RECONCILE batch.
    pub reconciliation_step: usize,

    /// Sleep between RECONCILE batches.
    pub reconciliation_step_delay: Duration,

    /// Heartbeat watchdog period; the stream is torn down when the master
    /// stays silent this long.
    pub heartbeat_timeout: Duration,

    /// How long a launch waits for agents to satisfy the filter chain
    /// before giving up with `ResourceNotEnough`.
    pub resource_timeout: Duration,

    /// Offers unused this long are declined back to the master.
    pub offer_timeout: Duration,

    /// Cap on concurrently registered event-stream subscribers.
    pub max_event_subscribers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            zk_host: vec!["127.0.0.1:5050".to_string()],
            zk_path: "/mesos".to_string(),
            framework_name: "skua".to_string(),
            framework_user: "root".to_string(),
            reconciliation_interval: Duration::from_secs(900),
            reconciliation_step: 100,
            reconciliation_step_delay: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(30),
            resource_timeout: Duration::from_secs(360_000),
            offer_timeout: Duration::from_secs(10),
            max_event_subscribers: 32,
        }
    }
}

impl SchedulerConfig {
    /// Build a configuration from `SKUA_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            zk_host: std::env::var("SKUA_ZK_HOST")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|h| h.trim().to_string())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .filter(|v: &Vec<String>| !v.is_empty())
                .unwrap_or(defaults.zk_host),
            zk_path: std::env::var("SKUA_ZK_PATH").unwrap_or(defaults.zk_path),
            framework_name: std::env::var("SKUA_FRAMEWORK_NAME")
                .unwrap_or(defaults.framework_name),
            framework_user: std::env::var("SKUA_FRAMEWORK_USER")
                .unwrap_or(defaults.framework_user),
            reconciliation_interval: secs_from_env(
                "SKUA_RECONCILIATION_INTERVAL",
                defaults.reconciliation_interval,
            ),
            reconciliation_step: std::env::var("SKUA_RECONCILIATION_STEP")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.reconciliation_step),
            reconciliation_step_delay: secs_from_env(
                "SKUA_RECONCILIATION_STEP_DELAY",
                defaults.reconciliation_step_delay,
            ),
            heartbeat_timeout: secs_from_env("SKUA_HEARTBEAT_TIMEOUT", defaults.heartbeat_timeout),
            resource_timeout: secs_from_env("SKUA_RESOURCE_TIMEOUT", defaults.resource_timeout),
            offer_timeout: secs_from_env("SKUA_OFFER_TIMEOUT", defaults.offer_timeout),
            max_event_subscribers: std::env::var("SKUA_MAX_EVENT_SUBSCRIBERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_event_subscribers),
        }
    }
}

fn secs_from_env(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.reconciliation_interval, Duration::from_secs(900));
        assert_eq!(cfg.reconciliation_step, 100);
        assert_eq!(cfg.reconciliation_step_delay, Duration::from_secs(15));
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(30));
        assert_eq!(cfg.resource_timeout, Duration::from_secs(360_000));
        assert_eq!(cfg.offer_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_fractional_seconds() {
        std::env::set_var("SKUA_HEARTBEAT_TIMEOUT", "0.25");
        let cfg = SchedulerConfig::from_env();
        assert_eq!(cfg.heartbeat_timeout, Duration::from_millis(250));
        std::env::remove_var("SKUA_HEARTBEAT_TIMEOUT");
    }

    #[test]
    fn test_garbage_env_falls_back() {
        std::env::set_var("SKUA_RECONCILIATION_STEP", "not-a-number");
        let cfg = SchedulerConfig::from_env();
        assert_eq!(cfg.reconciliation_step, 100);
        std::env::remove_var("SKUA_RECONCILIATION_STEP");
    }

    #[test]
    fn test_zk_host_list() {
        std::env::set_var("SKUA_ZK_HOST", "10.0.0.1:5050, 10.0.0.2:5050");
        let cfg = SchedulerConfig::from_env();
        assert_eq!(cfg.zk_host, vec!["10.0.0.1:5050", "10.0.0.2:5050"]);
        std::env::remove_var("SKUA_ZK_HOST");
    }
}
