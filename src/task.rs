//! Per-task control object for launches and kills.
//!
//! A `Task` carries the launch configuration and a bounded status queue:
//! one producer (the update worker) and exactly one consumer (the launch or
//! kill call site). When nothing drains the queue, over-production is
//! tolerated by dropping the oldest entries.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Notify;

use crate::events::{TaskState, TaskStatus};
use crate::proto::mesos;
use crate::proto::mesos::container_info::docker_info;

/// Bounded status queue depth; overflow drops the oldest status.
const STATUS_QUEUE_CAP: usize = 64;

/// Container network mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Network {
    Host,
    Bridge,
    /// A named user network; tasks carry their own IP.
    Custom(String),
}

impl Default for Network {
    fn default() -> Self {
        Self::Host
    }
}

impl From<String> for Network {
    fn from(s: String) -> Self {
        match s.as_str() {
            "host" => Self::Host,
            "bridge" => Self::Bridge,
            _ => Self::Custom(s),
        }
    }
}

impl From<Network> for String {
    fn from(n: Network) -> Self {
        match n {
            Network::Host => "host".to_string(),
            Network::Bridge => "bridge".to_string(),
            Network::Custom(name) => name,
        }
    }
}

/// Attribute constraint operators for placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintOp {
    Eq,
    Ne,
    Exists,
}

/// A single placement constraint against agent attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub attribute: String,
    pub op: ConstraintOp,
    #[serde(default)]
    pub value: Option<String>,
}

/// Health check carried by the task configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub protocol: HealthProtocol,
    #[serde(default = "default_delay")]
    pub delay_seconds: f64,
    #[serde(default = "default_interval")]
    pub interval_seconds: f64,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    #[serde(default = "default_grace")]
    pub grace_period_seconds: f64,
    #[serde(default = "default_failures")]
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthProtocol {
    Cmd { value: String },
    Http { path: String },
    Tcp,
}

fn default_delay() -> f64 {
    15.0
}
fn default_interval() -> f64 {
    10.0
}
fn default_timeout() -> f64 {
    20.0
}
fn default_grace() -> f64 {
    10.0
}
fn default_failures() -> u32 {
    3
}

/// Launch configuration for one task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConfig {
    pub cpus: f64,
    pub mem: f64,
    #[serde(default)]
    pub disk: f64,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Container-side port for bridge networking; defaults to the
    /// allocated host port.
    #[serde(default)]
    pub container_port: Option<u32>,
    /// Fixed IP for custom networks.
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub force_pull_image: bool,
}

/// Terminal task failure, keyed by task id in launch results. `Display`
/// renders the JSON payload callers persist and report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub state: String,
    pub message: String,
    pub source: String,
    pub reason: String,
    pub healthy: bool,
}

impl TaskFailure {
    pub fn from_status(status: &TaskStatus) -> Self {
        Self {
            state: status.state.as_str().to_string(),
            message: status.message.clone().unwrap_or_default(),
            source: status.source.clone().unwrap_or_default(),
            reason: status.reason.clone().unwrap_or_default(),
            healthy: status.healthy.unwrap_or(false),
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = json!({
            "state": &self.state,
            "message": &self.message,
            "source": &self.source,
            "reason": &self.reason,
            "healthy": self.healthy,
        });
        write!(f, "{body}")
    }
}

impl std::error::Error for TaskFailure {}

/// In-memory handle for a task being launched or killed.
pub struct Task {
    id: String,
    name: String,
    cfg: TaskConfig,
    agent_id: RwLock<Option<String>>,
    queue: Mutex<VecDeque<TaskStatus>>,
    notify: Notify,
}

impl Task {
    pub fn new(cfg: TaskConfig, id: &str, name: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            name: name.to_string(),
            cfg,
            agent_id: RwLock::new(None),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        })
    }

    /// Fresh handle with the same identity and configuration; used when a
    /// failed task is relaunched, since the old queue belongs to the
    /// previous consumer.
    pub fn renew(&self) -> Arc<Self> {
        Self::new(self.cfg.clone(), &self.id, &self.name)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &TaskConfig {
        &self.cfg
    }

    /// App id encoded in the task name as `<index>.<app-id>`.
    pub fn app_id(&self) -> Option<&str> {
        self.name.splitn(2, '.').nth(1).filter(|s| !s.is_empty())
    }

    pub fn set_agent(&self, agent_id: &str) {
        *self.agent_id.write().unwrap() = Some(agent_id.to_string());
    }

    pub fn agent_id(&self) -> Option<String> {
        self.agent_id.read().unwrap().clone()
    }

    /// Enqueue a status from the master, dropping the oldest entry when
    /// the consumer has fallen behind.
    pub fn send_status(&self, status: TaskStatus) {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= STATUS_QUEUE_CAP {
            queue.pop_front();
        }
        queue.push_back(status);
        drop(queue);
        self.notify.notify_one();
    }

    /// Wait for the next status. Single consumer.
    pub async fn recv_status(&self) -> TaskStatus {
        loop {
            let notified = self.notify.notified();
            if let Some(status) = self.queue.lock().unwrap().pop_front() {
                return status;
            }
            notified.await;
        }
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Whether a status ends the launch wait: any terminal error, a
    /// finished task, or a running task whose health (if checked) is
    /// confirmed.
    pub fn is_done(&self, status: &TaskStatus) -> bool {
        if Self::is_terminal_error(status.state) {
            return true;
        }

        match status.state {
            TaskState::TaskFinished => true,
            TaskState::TaskRunning => match status.healthy {
                Some(healthy) => healthy,
                // No health report: running is enough unless the task
                // carries an explicit health check.
                None => self.cfg.health_check.is_none(),
            },
            _ => false,
        }
    }

    pub fn is_killed(status: &TaskStatus) -> bool {
        status.state == TaskState::TaskKilled
    }

    fn is_terminal_error(state: TaskState) -> bool {
        matches!(
            state,
            TaskState::TaskFailed
                | TaskState::TaskError
                | TaskState::TaskLost
                | TaskState::TaskDropped
                | TaskState::TaskUnreachable
                | TaskState::TaskGone
                | TaskState::TaskGoneByOperator
                | TaskState::TaskUnknown
        )
    }

    /// Terminal-error classification of a status.
    pub fn detect_error(&self, status: &TaskStatus) -> Option<TaskFailure> {
        if Self::is_terminal_error(status.state) {
            return Some(TaskFailure::from_status(status));
        }
        None
    }

    /// Build the TaskInfo for the ACCEPT call.
    ///
    /// `port` is the host port drawn from the consolidated offer pool;
    /// `ip` is already resolved by the launch engine (agent hostname for
    /// host/bridge, configured IP otherwise).
    pub fn build(&self, agent_id: &str, port: Option<u64>, ip: &str) -> mesos::TaskInfo {
        let mut resources = vec![
            mesos::scalar_resource("cpus", self.cfg.cpus),
            mesos::scalar_resource("mem", self.cfg.mem),
        ];
        if self.cfg.disk > 0.0 {
            resources.push(mesos::scalar_resource("disk", self.cfg.disk));
        }
        if let Some(port) = port {
            resources.push(mesos::ranges_resource("ports", &[(port, port)]));
        }

        let environment = if self.cfg.env.is_empty() {
            None
        } else {
            let mut variables: Vec<_> = self
                .cfg
                .env
                .iter()
                .map(|(name, value)| mesos::environment::Variable {
                    name: name.clone(),
                    value: Some(value.clone()),
                })
                .collect();
            variables.sort_by(|a, b| a.name.cmp(&b.name));
            Some(mesos::Environment { variables })
        };

        let command = mesos::CommandInfo {
            environment,
            value: self.cfg.cmd.clone(),
            user: None,
            shell: Some(self.cfg.cmd.is_some()),
            arguments: vec![],
        };

        let (network, port_mappings) = match &self.cfg.network {
            Network::Host => (docker_info::Network::Host, vec![]),
            Network::Bridge => {
                let mappings = port
                    .map(|p| {
                        vec![docker_info::PortMapping {
                            host_port: p as u32,
                            container_port: self.cfg.container_port.unwrap_or(p as u32),
                            protocol: Some("tcp".to_string()),
                        }]
                    })
                    .unwrap_or_default();
                (docker_info::Network::Bridge, mappings)
            }
            Network::Custom(_) => (docker_info::Network::User, vec![]),
        };

        let mut parameters = Vec::new();
        if let Network::Custom(name) = &self.cfg.network {
            parameters.push(mesos::Parameter {
                key: "net".to_string(),
                value: name.clone(),
            });
            if !ip.is_empty() {
                parameters.push(mesos::Parameter {
                    key: "ip".to_string(),
                    value: ip.to_string(),
                });
            }
        }

        let container = mesos::ContainerInfo {
            r#type: mesos::container_info::Type::Docker as i32,
            docker: Some(mesos::container_info::DockerInfo {
                image: self.cfg.image.clone(),
                network: Some(network as i32),
                port_mappings,
                privileged: Some(self.cfg.privileged),
                parameters,
                force_pull_image: Some(self.cfg.force_pull_image),
            }),
            hostname: None,
        };

        let labels = if self.cfg.labels.is_empty() {
            None
        } else {
            let mut labels: Vec<_> = self
                .cfg
                .labels
                .iter()
                .map(|(key, value)| mesos::Label {
                    key: key.clone(),
                    value: Some(value.clone()),
                })
                .collect();
            labels.sort_by(|a, b| a.key.cmp(&b.key));
            Some(mesos::Labels { labels })
        };

        mesos::TaskInfo {
            name: self.name.clone(),
            task_id: mesos::TaskId {
                value: self.id.clone(),
            },
            agent_id: mesos::AgentId {
                value: agent_id.to_string(),
            },
            resources,
            command: Some(command),
            health_check: self.build_health_check(port),
            container: Some(container),
            labels,
        }
    }

    fn build_health_check(&self, port: Option<u64>) -> Option<mesos::HealthCheck> {
        let cfg = self.cfg.health_check.as_ref()?;

        let mut check = mesos::HealthCheck {
            http: None,
            delay_seconds: Some(cfg.delay_seconds),
            interval_seconds: Some(cfg.interval_seconds),
            timeout_seconds: Some(cfg.timeout_seconds),
            consecutive_failures: Some(cfg.consecutive_failures),
            grace_period_seconds: Some(cfg.grace_period_seconds),
            command: None,
            r#type: None,
            tcp: None,
        };

        match &cfg.protocol {
            HealthProtocol::Cmd { value } => {
                check.r#type = Some(mesos::health_check::Type::Command as i32);
                check.command = Some(mesos::CommandInfo {
                    environment: None,
                    value: Some(value.clone()),
                    user: None,
                    shell: Some(true),
                    arguments: vec![],
                });
            }
            HealthProtocol::Http { path } => {
                let port = port? as u32;
                check.r#type = Some(mesos::health_check::Type::Http as i32);
                check.http = Some(mesos::health_check::HttpCheckInfo {
                    port,
                    path: Some(path.clone()),
                    scheme: None,
                    statuses: vec![],
                });
            }
            HealthProtocol::Tcp => {
                let port = port? as u32;
                check.r#type = Some(mesos::health_check::Type::Tcp as i32);
                check.tcp = Some(mesos::health_check::TcpCheckInfo { port });
            }
        }

        Some(check)
    }
}
