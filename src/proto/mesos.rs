//! Common Mesos v1 messages referenced by scheduler calls.

/// Framework identity assigned by the master on first SUBSCRIBE.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FrameworkId {
    #[prost(string, tag = "1")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OfferId {
    #[prost(string, tag = "1")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentId {
    #[prost(string, tag = "1")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskId {
    #[prost(string, tag = "1")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExecutorId {
    #[prost(string, tag = "1")]
    pub value: String,
}

/// Framework descriptor presented on SUBSCRIBE.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FrameworkInfo {
    #[prost(string, tag = "1")]
    pub user: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(message, optional, tag = "3")]
    pub id: Option<FrameworkId>,
    #[prost(double, optional, tag = "4")]
    pub failover_timeout: Option<f64>,
    #[prost(bool, optional, tag = "5")]
    pub checkpoint: Option<bool>,
    #[prost(string, optional, tag = "7")]
    pub hostname: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub principal: Option<String>,
    #[prost(message, repeated, tag = "10")]
    pub capabilities: Vec<framework_info::Capability>,
    #[prost(string, repeated, tag = "12")]
    pub roles: Vec<String>,
}

pub mod framework_info {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Capability {
        #[prost(enumeration = "capability::Type", optional, tag = "1")]
        pub r#type: Option<i32>,
    }

    pub mod capability {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
            RevocableResources = 1,
            TaskKillingState = 2,
            GpuResources = 3,
            SharedResources = 4,
            PartitionAware = 5,
            MultiRole = 6,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Value {
    #[prost(enumeration = "value::Type", tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub scalar: Option<value::Scalar>,
    #[prost(message, optional, tag = "3")]
    pub ranges: Option<value::Ranges>,
    #[prost(message, optional, tag = "4")]
    pub set: Option<value::Set>,
    #[prost(message, optional, tag = "5")]
    pub text: Option<value::Text>,
}

pub mod value {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Scalar = 0,
        Ranges = 1,
        Set = 2,
        Text = 3,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Scalar {
        #[prost(double, tag = "1")]
        pub value: f64,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Range {
        #[prost(uint64, tag = "1")]
        pub begin: u64,
        #[prost(uint64, tag = "2")]
        pub end: u64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Ranges {
        #[prost(message, repeated, tag = "1")]
        pub range: Vec<Range>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Set {
        #[prost(string, repeated, tag = "1")]
        pub item: Vec<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Text {
        #[prost(string, tag = "1")]
        pub value: String,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Resource {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "value::Type", tag = "2")]
    pub r#type: i32,
    #[prost(message, optional, tag = "3")]
    pub scalar: Option<value::Scalar>,
    #[prost(message, optional, tag = "4")]
    pub ranges: Option<value::Ranges>,
    #[prost(message, optional, tag = "5")]
    pub set: Option<value::Set>,
    #[prost(string, optional, tag = "6")]
    pub role: Option<String>,
}

/// Offer filter attached to ACCEPT and DECLINE.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Filters {
    #[prost(double, optional, tag = "1")]
    pub refuse_seconds: Option<f64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Label {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Labels {
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Parameter {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Environment {
    #[prost(message, repeated, tag = "1")]
    pub variables: Vec<environment::Variable>,
}

pub mod environment {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Variable {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, optional, tag = "2")]
        pub value: Option<String>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandInfo {
    #[prost(message, optional, tag = "2")]
    pub environment: Option<Environment>,
    #[prost(string, optional, tag = "3")]
    pub value: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub user: Option<String>,
    #[prost(bool, optional, tag = "6")]
    pub shell: Option<bool>,
    #[prost(string, repeated, tag = "7")]
    pub arguments: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerInfo {
    #[prost(enumeration = "container_info::Type", tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "3")]
    pub docker: Option<container_info::DockerInfo>,
    #[prost(string, optional, tag = "4")]
    pub hostname: Option<String>,
}

pub mod container_info {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Docker = 1,
        Mesos = 2,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DockerInfo {
        #[prost(string, tag = "1")]
        pub image: String,
        #[prost(enumeration = "docker_info::Network", optional, tag = "2")]
        pub network: Option<i32>,
        #[prost(message, repeated, tag = "3")]
        pub port_mappings: Vec<docker_info::PortMapping>,
        #[prost(bool, optional, tag = "4")]
        pub privileged: Option<bool>,
        #[prost(message, repeated, tag = "5")]
        pub parameters: Vec<super::Parameter>,
        #[prost(bool, optional, tag = "6")]
        pub force_pull_image: Option<bool>,
    }

    pub mod docker_info {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Network {
            Host = 1,
            Bridge = 2,
            None = 3,
            User = 4,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct PortMapping {
            #[prost(uint32, tag = "1")]
            pub host_port: u32,
            #[prost(uint32, tag = "2")]
            pub container_port: u32,
            #[prost(string, optional, tag = "3")]
            pub protocol: Option<String>,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HealthCheck {
    #[prost(message, optional, tag = "1")]
    pub http: Option<health_check::HttpCheckInfo>,
    #[prost(double, optional, tag = "2")]
    pub delay_seconds: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub interval_seconds: Option<f64>,
    #[prost(double, optional, tag = "4")]
    pub timeout_seconds: Option<f64>,
    #[prost(uint32, optional, tag = "5")]
    pub consecutive_failures: Option<u32>,
    #[prost(double, optional, tag = "6")]
    pub grace_period_seconds: Option<f64>,
    #[prost(message, optional, tag = "7")]
    pub command: Option<CommandInfo>,
    #[prost(enumeration = "health_check::Type", optional, tag = "8")]
    pub r#type: Option<i32>,
    #[prost(message, optional, tag = "9")]
    pub tcp: Option<health_check::TcpCheckInfo>,
}

pub mod health_check {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Unknown = 0,
        Command = 1,
        Http = 2,
        Tcp = 3,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct HttpCheckInfo {
        #[prost(uint32, tag = "1")]
        pub port: u32,
        #[prost(string, optional, tag = "2")]
        pub path: Option<String>,
        #[prost(string, optional, tag = "3")]
        pub scheme: Option<String>,
        #[prost(int32, repeated, tag = "4")]
        pub statuses: Vec<i32>,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct TcpCheckInfo {
        #[prost(uint32, tag = "1")]
        pub port: u32,
    }
}

/// Task descriptor carried by the LAUNCH operation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskInfo {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, required, tag = "2")]
    pub task_id: TaskId,
    #[prost(message, required, tag = "3")]
    pub agent_id: AgentId,
    #[prost(message, repeated, tag = "4")]
    pub resources: Vec<Resource>,
    #[prost(message, optional, tag = "7")]
    pub command: Option<CommandInfo>,
    #[prost(message, optional, tag = "8")]
    pub health_check: Option<HealthCheck>,
    #[prost(message, optional, tag = "9")]
    pub container: Option<ContainerInfo>,
    #[prost(message, optional, tag = "10")]
    pub labels: Option<Labels>,
}

/// Offer operations; only the LAUNCH subset skua emits is carried.
pub mod offer {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Operation {
        #[prost(enumeration = "operation::Type", optional, tag = "1")]
        pub r#type: Option<i32>,
        #[prost(message, optional, tag = "2")]
        pub launch: Option<operation::Launch>,
    }

    pub mod operation {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
            Launch = 1,
            Reserve = 2,
            Unreserve = 3,
            Create = 4,
            Destroy = 5,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Launch {
            #[prost(message, repeated, tag = "1")]
            pub task_infos: Vec<super::super::TaskInfo>,
        }
    }
}

/// Scalar resource (`cpus`, `mem`, `disk`) with the default role.
pub fn scalar_resource(name: &str, value: f64) -> Resource {
    Resource {
        name: name.to_string(),
        r#type: value::Type::Scalar as i32,
        scalar: Some(value::Scalar { value }),
        ranges: None,
        set: None,
        role: Some("*".to_string()),
    }
}

/// Ranges resource (`ports`) with the default role.
pub fn ranges_resource(name: &str, ranges: &[(u64, u64)]) -> Resource {
    Resource {
        name: name.to_string(),
        r#type: value::Type::Ranges as i32,
        scalar: None,
        ranges: Some(value::Ranges {
            range: ranges
                .iter()
                .map(|&(begin, end)| value::Range { begin, end })
                .collect(),
        }),
        set: None,
        role: Some("*".to_string()),
    }
}
