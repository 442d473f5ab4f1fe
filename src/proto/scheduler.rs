//! The scheduler `Call` envelope posted to `/api/v1/scheduler`.

use super::mesos::FrameworkId;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Call {
    #[prost(message, optional, tag = "1")]
    pub framework_id: Option<FrameworkId>,
    #[prost(enumeration = "call::Type", optional, tag = "2")]
    pub r#type: Option<i32>,
    #[prost(message, optional, tag = "3")]
    pub subscribe: Option<call::Subscribe>,
    #[prost(message, optional, tag = "4")]
    pub accept: Option<call::Accept>,
    #[prost(message, optional, tag = "5")]
    pub decline: Option<call::Decline>,
    #[prost(message, optional, tag = "6")]
    pub kill: Option<call::Kill>,
    #[prost(message, optional, tag = "8")]
    pub acknowledge: Option<call::Acknowledge>,
    #[prost(message, optional, tag = "9")]
    pub reconcile: Option<call::Reconcile>,
}

pub mod call {
    use crate::proto::mesos::offer;
    use crate::proto::mesos::{AgentId, Filters, FrameworkInfo, OfferId, TaskId};

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Unknown = 0,
        Subscribe = 1,
        Teardown = 2,
        Accept = 3,
        Decline = 4,
        Revive = 5,
        Kill = 6,
        Shutdown = 7,
        Acknowledge = 8,
        Reconcile = 9,
        Message = 10,
        Request = 11,
        Suppress = 12,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Subscribe {
        #[prost(message, required, tag = "1")]
        pub framework_info: FrameworkInfo,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Accept {
        #[prost(message, repeated, tag = "1")]
        pub offer_ids: Vec<OfferId>,
        #[prost(message, repeated, tag = "2")]
        pub operations: Vec<offer::Operation>,
        #[prost(message, optional, tag = "3")]
        pub filters: Option<Filters>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Decline {
        #[prost(message, repeated, tag = "1")]
        pub offer_ids: Vec<OfferId>,
        #[prost(message, optional, tag = "2")]
        pub filters: Option<Filters>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Kill {
        #[prost(message, required, tag = "1")]
        pub task_id: TaskId,
        #[prost(message, optional, tag = "2")]
        pub agent_id: Option<AgentId>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Acknowledge {
        #[prost(message, required, tag = "1")]
        pub agent_id: AgentId,
        #[prost(message, required, tag = "2")]
        pub task_id: TaskId,
        #[prost(bytes = "vec", tag = "3")]
        pub uuid: Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Reconcile {
        #[prost(message, repeated, tag = "1")]
        pub tasks: Vec<reconcile::Task>,
    }

    pub mod reconcile {
        use crate::proto::mesos::{AgentId, TaskId};

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Task {
            #[prost(message, required, tag = "1")]
            pub task_id: TaskId,
            #[prost(message, optional, tag = "2")]
            pub agent_id: Option<AgentId>,
        }
    }
}

impl Call {
    /// Empty call of the given type; payloads are filled in by the caller.
    pub fn of_type(ty: call::Type) -> Self {
        Self {
            framework_id: None,
            r#type: Some(ty as i32),
            subscribe: None,
            accept: None,
            decline: None,
            kill: None,
            acknowledge: None,
            reconcile: None,
        }
    }

    /// The call type, when set and recognized.
    pub fn call_type(&self) -> Option<call::Type> {
        self.r#type.and_then(|t| call::Type::try_from(t).ok())
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::super::mesos::{AgentId, TaskId};
    use super::*;

    #[test]
    fn test_call_type_roundtrip() {
        let mut c = Call::of_type(call::Type::Reconcile);
        c.reconcile = Some(call::Reconcile {
            tasks: vec![call::reconcile::Task {
                task_id: TaskId {
                    value: "t1".to_string(),
                },
                agent_id: Some(AgentId {
                    value: "a1".to_string(),
                }),
            }],
        });

        let decoded = Call::decode(c.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.call_type(), Some(call::Type::Reconcile));
        assert_eq!(decoded.reconcile.unwrap().tasks[0].task_id.value, "t1");
    }

    #[test]
    fn test_unknown_type_is_none() {
        let c = Call {
            r#type: Some(999),
            ..Call::of_type(call::Type::Unknown)
        };
        assert_eq!(c.call_type(), None);
    }
}
