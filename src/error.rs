//! Error types for caller-facing scheduler operations.
//!
//! Transient transport failures (decode errors, stream teardown, heartbeat
//! expiry) are handled by the reconnect loop and never reach callers;
//! everything here is surfaced by `LaunchTasks`, `KillTask`, `Subscribe`
//! and friends.

use thiserror::Error;

use crate::store::StoreError;

/// Errors returned by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No agent passed the filter chain within the resource timeout.
    #[error("resource not enough")]
    ResourceNotEnough,

    /// The master state endpoint reported no leader.
    #[error("no mesos leader found")]
    NoLeader,

    /// SUBSCRIBE was answered with something other than 200.
    #[error("subscribe got unexpected response [{status}]: {body}")]
    SubscribeFailed { status: u16, body: String },

    /// The master did not hand out a stream id on SUBSCRIBE.
    #[error("subscribe response missing Mesos-Stream-Id header")]
    MissingStreamId,

    /// A call was sent but not accepted with 202.
    #[error("{call} call got {status}, want 202")]
    CallRejected { call: &'static str, status: u16 },

    /// A task name does not carry the `<index>.<app-id>` suffix.
    #[error("task name {0:?} has no app id suffix")]
    MalformedTaskName(String),

    /// `LaunchTasks` was invoked with an empty batch.
    #[error("launch called with an empty task batch")]
    EmptyTaskBatch,

    /// The event-stream subscriber cap is reached.
    #[error("too many event clients")]
    SubscribersFull,

    /// A malformed RecordIO frame or payload field on the event stream.
    #[error("recordio framing error: {0}")]
    Framing(String),

    /// Store access failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Event or state JSON could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            SchedulerError::ResourceNotEnough.to_string(),
            "resource not enough"
        );
        assert_eq!(
            SchedulerError::CallRejected {
                call: "ACCEPT",
                status: 503,
            }
            .to_string(),
            "ACCEPT call got 503, want 202"
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let err: SchedulerError = StoreError::NotFound("web/0.web".into()).into();
        assert!(matches!(err, SchedulerError::Store(_)));
    }
}
