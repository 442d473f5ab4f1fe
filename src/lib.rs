//! skua: a Mesos framework scheduler for long-running container workloads.
//!
//! The scheduler keeps a durable framework subscription to the Mesos master
//! over the v1 streaming API, ingests offers and status updates, matches
//! launch requests against offers with pluggable filters and a ranking
//! strategy, and reconciles persisted task state on a schedule.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler
//! ├── MesosClient          (leader resolution, SUBSCRIBE stream, calls)
//! ├── event reader         (RecordIO → Event, one per connection)
//! ├── update worker        (ack, forward to handles, fan-out)
//! ├── offer worker         (agent/offer registry bookkeeping)
//! ├── failed-task worker   (serial relaunch with 1s spacing)
//! ├── heartbeat watchdog   (cancels the stream on silence)
//! └── reconcile ticker     (paced RECONCILE batches from the store)
//! ```
//!
//! ## Modules
//!
//! - `scheduler`: subscription lifecycle, launch engine, reconciliation
//! - `agent` / `offer`: registry of agents and the offers they hold
//! - `task`: per-task handle with its status channel and TaskInfo builder
//! - `filter` / `strategy`: placement candidate selection and ranking
//! - `client` / `recordio` / `events` / `proto`: Mesos wire plumbing
//! - `store`: consumed persistence interface (plus an in-memory test store)
//! - `fanout`: status-update fan-out to external watchers

pub mod agent;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod fanout;
pub mod filter;
pub mod offer;
pub mod proto;
pub mod recordio;
pub mod scheduler;
pub mod store;
pub mod strategy;
pub mod task;

// Re-export the types most embedders touch.
pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use fanout::{EventManager, Subscription, TaskEvent};
pub use scheduler::Scheduler;
pub use store::{AppRecord, Store, StoreError, TaskRecord};
pub use strategy::{strategy_from_name, Strategy};
pub use task::{Task, TaskConfig, TaskFailure};
