//! Decoded events from the master's RecordIO stream.
//!
//! The subscription asks for `application/json`, so every record is the
//! JSON rendering of a Mesos v1 scheduler `Event`. Unknown event kinds and
//! task states decode to catch-all variants instead of failing the stream.

use serde::{Deserialize, Serialize};

/// An opaque `{ "value": ... }` identifier wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Id {
    #[serde(default)]
    pub value: String,
}

impl Id {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Event kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Subscribed,
    Offers,
    Rescind,
    Update,
    Message,
    Failure,
    Error,
    Heartbeat,
    #[serde(other)]
    Unknown,
}

/// A decoded scheduler event.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub subscribed: Option<Subscribed>,
    #[serde(default)]
    pub offers: Option<Offers>,
    #[serde(default)]
    pub rescind: Option<Rescind>,
    #[serde(default)]
    pub update: Option<Update>,
    #[serde(default)]
    pub failure: Option<Failure>,
    #[serde(default)]
    pub error: Option<ErrorEvent>,
    #[serde(default)]
    pub message: Option<MessageEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subscribed {
    pub framework_id: Id,
    #[serde(default)]
    pub heartbeat_interval_seconds: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Offers {
    #[serde(default)]
    pub offers: Vec<Offer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rescind {
    pub offer_id: Id,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Failure {
    #[serde(default)]
    pub agent_id: Option<Id>,
    #[serde(default)]
    pub executor_id: Option<Id>,
    #[serde(default)]
    pub status: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub agent_id: Option<Id>,
    #[serde(default)]
    pub executor_id: Option<Id>,
    /// Base64-encoded payload, as protobuf bytes render in JSON.
    #[serde(default)]
    pub data: Option<String>,
}

/// Task states reported in status updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    TaskStaging,
    TaskStarting,
    TaskRunning,
    TaskKilling,
    TaskFinished,
    TaskFailed,
    TaskKilled,
    TaskError,
    TaskLost,
    TaskDropped,
    TaskUnreachable,
    TaskGone,
    TaskGoneByOperator,
    TaskUnknown,
    #[serde(other)]
    Unrecognized,
}

impl TaskState {
    /// Wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskStaging => "TASK_STAGING",
            Self::TaskStarting => "TASK_STARTING",
            Self::TaskRunning => "TASK_RUNNING",
            Self::TaskKilling => "TASK_KILLING",
            Self::TaskFinished => "TASK_FINISHED",
            Self::TaskFailed => "TASK_FAILED",
            Self::TaskKilled => "TASK_KILLED",
            Self::TaskError => "TASK_ERROR",
            Self::TaskLost => "TASK_LOST",
            Self::TaskDropped => "TASK_DROPPED",
            Self::TaskUnreachable => "TASK_UNREACHABLE",
            Self::TaskGone => "TASK_GONE",
            Self::TaskGoneByOperator => "TASK_GONE_BY_OPERATOR",
            Self::TaskUnknown => "TASK_UNKNOWN",
            Self::Unrecognized => "TASK_UNRECOGNIZED",
        }
    }

    /// States the master will never move a task out of on its own.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            Self::TaskStaging
                | Self::TaskStarting
                | Self::TaskRunning
                | Self::TaskKilling
                | Self::Unrecognized
        )
    }
}

/// A status update for a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: Id,
    pub state: TaskState,
    #[serde(default)]
    pub agent_id: Option<Id>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub healthy: Option<bool>,
    /// Base64-encoded update uuid; present when the master expects an ack.
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl TaskStatus {
    /// Minimal status for synthesized events (agent failures, tests).
    pub fn synthesized(task_id: &str, agent_id: &str, state: TaskState, message: &str) -> Self {
        Self {
            task_id: Id::new(task_id),
            state,
            agent_id: Some(Id::new(agent_id)),
            message: Some(message.to_string()),
            source: None,
            reason: None,
            healthy: None,
            uuid: None,
            timestamp: None,
        }
    }
}

/// An offer as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct Offer {
    pub id: Id,
    pub agent_id: Id,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(rename = "type")]
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub scalar: Option<Scalar>,
    #[serde(default)]
    pub ranges: Option<Ranges>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub scalar: Option<Scalar>,
    #[serde(default)]
    pub text: Option<Text>,
}

impl Attribute {
    /// Flatten to a string the way filter expressions compare attributes.
    pub fn value_string(&self) -> String {
        if let Some(text) = &self.text {
            return text.value.clone();
        }
        if let Some(scalar) = &self.scalar {
            return scalar.value.to_string();
        }
        String::new()
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Scalar {
    #[serde(default)]
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Text {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ranges {
    #[serde(default)]
    pub range: Vec<Range>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Range {
    pub begin: u64,
    pub end: u64,
}
