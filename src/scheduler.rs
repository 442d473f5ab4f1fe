//! The scheduler core.
//!
//! One `Scheduler` owns the framework subscription, the agent/offer
//! registry, the launch critical section and the reconciliation loop.
//! Construction wires the collaborators; `subscribe` brings the stream and
//! its workers up; `unsubscribe` tears the whole scheduler down.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock, Weak};
use std::time::Instant;

use base64::Engine as _;
use chrono::Utc;
use futures_util::future::join_all;
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::Agent;
use crate::client::MesosClient;
use crate::config::{
    SchedulerConfig, EVENT_QUEUE_CAPACITY, FAILED_TASK_DELAY, FILTER_POLL,
    FRAMEWORK_FAILOVER_TIMEOUT, OFFER_POLL, RECONNECT_BACKOFF,
};
use crate::error::SchedulerError;
use crate::events::{Event, EventKind, TaskState, TaskStatus};
use crate::fanout::{EventManager, Subscription, TaskEvent};
use crate::filter::{apply_filters, ConstraintFilter, Filter, ResourceFilter};
use crate::offer::Offer;
use crate::proto::mesos as pb;
use crate::proto::scheduler::{call, Call};
use crate::recordio::RecordIoReader;
use crate::store::Store;
use crate::strategy::Strategy;
use crate::task::{Network, Task, TaskConfig, TaskFailure};

const STATUS_CONNECTING: &str = "connecting";
const STATUS_CONNECTED: &str = "connected";

/// Receivers handed to the queue workers on the first subscribe.
struct WorkerChannels {
    updates_rx: mpsc::Receiver<TaskStatus>,
    offers_rx: mpsc::Receiver<crate::events::Offers>,
    failed_rx: mpsc::Receiver<Arc<Task>>,
}

pub struct Scheduler {
    cfg: SchedulerConfig,
    client: MesosClient,
    store: Arc<dyn Store>,
    strategy: Box<dyn Strategy>,
    filters: StdRwLock<Vec<Box<dyn Filter>>>,
    eventmgr: Arc<EventManager>,

    framework: StdMutex<pb::FrameworkInfo>,
    agents: StdRwLock<HashMap<String, Arc<Agent>>>,

    status: StdRwLock<&'static str>,
    leader: StdRwLock<String>,
    cluster: StdRwLock<String>,

    /// Serializes every launch scheduler-wide.
    launch_sem: Semaphore,

    updates_tx: mpsc::Sender<TaskStatus>,
    offers_tx: mpsc::Sender<crate::events::Offers>,
    failed_tx: mpsc::Sender<Arc<Task>>,
    workers: StdMutex<Option<WorkerChannels>>,

    /// Token of the live stream connection; cancelled to tear it down.
    conn: StdMutex<Option<CancellationToken>>,
    /// Pinged on every HEARTBEAT to rearm the watchdog.
    heartbeat: Notify,
    reconcile_started: StdMutex<bool>,

    quit: CancellationToken,

    /// Back-reference for handing strong clones to spawned tasks.
    me: Weak<Scheduler>,
}

impl Scheduler {
    /// Wire a scheduler. Nothing talks to the master until `subscribe`.
    pub fn new(
        cfg: SchedulerConfig,
        store: Arc<dyn Store>,
        strategy: Box<dyn Strategy>,
    ) -> Arc<Self> {
        let (updates_tx, updates_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (offers_tx, offers_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (failed_tx, failed_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let framework = default_framework(&cfg);
        let eventmgr = EventManager::new(cfg.max_event_subscribers);

        Arc::new_cyclic(|me| Self {
            cfg,
            client: MesosClient::new(),
            store,
            strategy,
            filters: StdRwLock::new(vec![
                Box::new(ResourceFilter) as Box<dyn Filter>,
                Box::new(ConstraintFilter),
            ]),
            eventmgr,
            framework: StdMutex::new(framework),
            agents: StdRwLock::new(HashMap::new()),
            status: StdRwLock::new(STATUS_CONNECTING),
            leader: StdRwLock::new(String::new()),
            cluster: StdRwLock::new(String::new()),
            launch_sem: Semaphore::new(1),
            updates_tx,
            offers_tx,
            failed_tx,
            workers: StdMutex::new(Some(WorkerChannels {
                updates_rx,
                offers_rx,
                failed_rx,
            })),
            conn: StdMutex::new(None),
            heartbeat: Notify::new(),
            reconcile_started: StdMutex::new(false),
            quit: CancellationToken::new(),
            me: me.clone(),
        })
    }

    fn strong(&self) -> Arc<Self> {
        self.me.upgrade().expect("scheduler dropped while in use")
    }

    /// Replace the filter chain (defaults to resource + constraint).
    pub fn init_filters(&self, filters: Vec<Box<dyn Filter>>) {
        *self.filters.write().unwrap() = filters;
    }

    pub fn cluster_name(&self) -> String {
        self.cluster.read().unwrap().clone()
    }

    pub fn leader(&self) -> String {
        self.leader.read().unwrap().clone()
    }

    pub fn connection_status(&self) -> &'static str {
        *self.status.read().unwrap()
    }

    pub fn framework_id(&self) -> Option<String> {
        self.framework
            .lock()
            .unwrap()
            .id
            .as_ref()
            .map(|id| id.value.clone())
    }

    // -------------------------------------------------------------------
    // Subscription lifecycle
    // -------------------------------------------------------------------

    /// Resolve the master leader and open the framework subscription.
    pub async fn subscribe(&self) -> Result<(), SchedulerError> {
        *self.status.write().unwrap() = STATUS_CONNECTING;

        self.resolve_leader().await?;
        self.load_framework_id().await?;

        info!(leader = %self.leader(), "Subscribing to mesos leader");
        self.connect().await?;
        self.spawn_workers();

        Ok(())
    }

    /// Tear the scheduler down: stops the stream, the workers, the
    /// watchdog and the reconcile ticker.
    pub fn unsubscribe(&self) {
        info!(leader = %self.leader(), "Unsubscribing from mesos leader");
        self.quit.cancel();
    }

    async fn resolve_leader(&self) -> Result<(), SchedulerError> {
        let state = self.client.resolve_leader(&self.cfg.zk_host).await?;
        *self.leader.write().unwrap() = state.leader;
        *self.cluster.write().unwrap() = state.cluster;
        Ok(())
    }

    /// Adopt the persisted framework id unless it aged past the failover
    /// timeout, in which case the master has forgotten us and a fresh
    /// subscription is the only option.
    async fn load_framework_id(&self) -> Result<(), SchedulerError> {
        if self.framework_id().is_some() {
            return Ok(());
        }

        let Some((id, mtime_ms)) = self.store.get_framework_id().await? else {
            return Ok(());
        };

        let age_secs = Utc::now().timestamp() - mtime_ms / 1000;
        if age_secs >= FRAMEWORK_FAILOVER_TIMEOUT.as_secs() as i64 {
            warn!(
                framework_id = %id,
                age_secs,
                "Persisted framework id exceeds failover timeout, subscribing fresh"
            );
            return Ok(());
        }

        self.framework.lock().unwrap().id = Some(pb::FrameworkId { value: id });
        Ok(())
    }

    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<(), SchedulerError>> + Send + '_>> {
        Box::pin(async move {
            let framework = self.framework.lock().unwrap().clone();

            let mut subscribe = Call::of_type(call::Type::Subscribe);
            subscribe.framework_id = framework.id.clone();
            subscribe.subscribe = Some(call::Subscribe {
                framework_info: framework,
            });

            let resp = self.client.subscribe(&subscribe).await?;

            *self.status.write().unwrap() = STATUS_CONNECTED;
            info!(leader = %self.leader(), "Connected to mesos leader");

            let token = self.quit.child_token();
            *self.conn.lock().unwrap() = Some(token.clone());

            let sched = self.strong();
            tokio::spawn(async move { sched.read_events(resp, token).await });

            Ok(())
        })
    }

    /// Stream reader: one per connection. Any read or decode failure (and
    /// the heartbeat watchdog firing) funnels into reconnect.
    async fn read_events(&self, resp: reqwest::Response, token: CancellationToken) {
        let mut reader = RecordIoReader::new(resp.bytes_stream().boxed());

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => break,

                record = reader.next_record() => {
                    let record = match record {
                        Ok(Some(record)) => record,
                        Ok(None) => {
                            warn!("Event stream closed by master");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Event stream read failed");
                            break;
                        }
                    };

                    match serde_json::from_slice::<Event>(&record) {
                        Ok(ev) => self.dispatch(ev, &token).await,
                        Err(e) => {
                            warn!(error = %e, "Event decode failed");
                            break;
                        }
                    }
                }
            }
        }

        // Stops the watchdog tied to this connection.
        token.cancel();

        if !self.quit.is_cancelled() {
            self.reconnect().await;
        }
    }

    /// Offers are ephemeral per subscription: drop them all, re-resolve
    /// the leader, and retry SUBSCRIBE forever with fixed backoff.
    async fn reconnect(&self) {
        self.client.reset();
        *self.status.write().unwrap() = STATUS_CONNECTING;
        self.drop_all_offers();

        loop {
            if self.quit.is_cancelled() {
                return;
            }

            info!(leader = %self.leader(), "Reconnecting to mesos leader");

            let result = match self.resolve_leader().await {
                Ok(()) => self.connect().await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "Reconnect attempt failed"),
            }

            tokio::select! {
                _ = self.quit.cancelled() => return,
                _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
            }
        }
    }

    fn drop_all_offers(&self) {
        for agent in self.agents_snapshot() {
            for offer in agent.offers() {
                agent.remove_offer(offer.id());
            }
            if agent.is_empty() {
                self.remove_agent(agent.id());
            }
        }
    }

    // -------------------------------------------------------------------
    // Event dispatch and queue workers
    // -------------------------------------------------------------------

    async fn dispatch(&self, ev: Event, token: &CancellationToken) {
        match ev.kind {
            EventKind::Update => {
                if let Some(update) = ev.update {
                    if self.updates_tx.send(update.status).await.is_err() {
                        warn!("Update worker gone, dropping status");
                    }
                }
            }
            EventKind::Offers => {
                if let Some(offers) = ev.offers {
                    if self.offers_tx.send(offers).await.is_err() {
                        warn!("Offer worker gone, dropping offers");
                    }
                }
            }
            EventKind::Heartbeat => {
                debug!("Heartbeat from master");
                self.heartbeat.notify_one();
            }
            EventKind::Subscribed => self.on_subscribed(ev, token).await,
            EventKind::Rescind => {
                if let Some(rescind) = ev.rescind {
                    self.on_rescind(&rescind.offer_id.value);
                }
            }
            EventKind::Failure => self.on_failure(ev),
            EventKind::Error => {
                let message = ev.error.and_then(|e| e.message).unwrap_or_default();
                error!(message = %message, "Error event from master");
            }
            EventKind::Message => debug!("Framework message from master"),
            EventKind::Unknown => warn!("Unhandled mesos event kind"),
        }
    }

    async fn on_subscribed(&self, ev: Event, token: &CancellationToken) {
        let Some(subscribed) = ev.subscribed else {
            warn!("SUBSCRIBED event without body");
            return;
        };

        let id = subscribed.framework_id.value;
        info!(framework_id = %id, "Subscription confirmed");

        let newly_assigned = {
            let mut framework = self.framework.lock().unwrap();
            if framework.id.is_none() {
                framework.id = Some(pb::FrameworkId { value: id.clone() });
                true
            } else {
                false
            }
        };

        if newly_assigned {
            if let Err(e) = self.store.update_framework_id(&id).await {
                error!(error = %e, "Failed to persist framework id");
            }
        }

        self.spawn_watchdog(token.clone());
        self.start_reconcile();
    }

    /// Heartbeat watchdog: rearmed by every HEARTBEAT, kills the stream
    /// connection when the master stays silent for a full period.
    fn spawn_watchdog(&self, token: CancellationToken) {
        let sched = self.strong();
        let timeout = self.cfg.heartbeat_timeout;

        tokio::spawn(async move {
            debug!(
                timeout_secs = timeout.as_secs_f64(),
                "Heartbeat watchdog armed"
            );
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = sched.heartbeat.notified() => continue,
                    _ = tokio::time::sleep(timeout) => {
                        warn!("Heartbeat timeout, closing master connection");
                        token.cancel();
                        return;
                    }
                }
            }
        });
    }

    fn spawn_workers(&self) {
        let Some(channels) = self.workers.lock().unwrap().take() else {
            return;
        };

        let WorkerChannels {
            mut updates_rx,
            mut offers_rx,
            mut failed_rx,
        } = channels;

        let sched = self.strong();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sched.quit.cancelled() => return,
                    status = updates_rx.recv() => match status {
                        Some(status) => sched.on_update(status).await,
                        None => return,
                    },
                }
            }
        });

        let sched = self.strong();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sched.quit.cancelled() => return,
                    offers = offers_rx.recv() => match offers {
                        Some(offers) => {
                            for offer in offers.offers {
                                sched.register_offer(&offer);
                            }
                        }
                        None => return,
                    },
                }
            }
        });

        let sched = self.strong();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sched.quit.cancelled() => return,
                    task = failed_rx.recv() => match task {
                        Some(task) => {
                            info!(task = %task.id(), "Rescheduling failed task");
                            match sched.launch_tasks(vec![task.renew()]).await {
                                Ok(results) => {
                                    for (task_id, outcome) in results {
                                        if let Err(failure) = outcome {
                                            warn!(
                                                task = %task_id,
                                                error = %failure,
                                                "Relaunch ended in failure"
                                            );
                                        }
                                    }
                                }
                                Err(e) => warn!(task = %task.id(), error = %e, "Relaunch failed"),
                            }
                            tokio::time::sleep(FAILED_TASK_DELAY).await;
                        }
                        None => return,
                    },
                }
            }
        });
    }

    /// UPDATE policy, in order: ack, failed-task capture, forward to the
    /// handle, fan out, and finally drop terminal handles.
    async fn on_update(&self, status: TaskStatus) {
        let task_id = status.task_id.value.clone();
        let agent_id = status
            .agent_id
            .as_ref()
            .map(|id| id.value.clone())
            .unwrap_or_default();

        debug!(
            task = %task_id,
            agent = %agent_id,
            state = status.state.as_str(),
            "Status update"
        );

        if status.uuid.is_some() && !agent_id.is_empty() {
            let sched = self.strong();
            let ack_status = status.clone();
            tokio::spawn(async move {
                if let Err(e) = sched.ack_update(&ack_status).await {
                    error!(
                        task = %ack_status.task_id.value,
                        error = %e,
                        "Failed to ack status update"
                    );
                }
            });
        }

        let agent = self.get_agent(&agent_id);
        let task = agent.as_ref().and_then(|a| a.get_task(&task_id));

        if status.state == TaskState::TaskFailed {
            if let Some(task) = &task {
                if self.failed_tx.try_send(Arc::clone(task)).is_err() {
                    warn!(task = %task_id, "Failed-task queue full, dropping relaunch");
                }
            }
        }

        if let Some(task) = &task {
            task.send_status(status.clone());
        }

        self.eventmgr.publish(&TaskEvent::from_status(&status));

        if status.state.is_terminal() {
            if let Some(agent) = agent {
                agent.remove_task(&task_id);
                if agent.is_empty() {
                    self.remove_agent(agent.id());
                }
            }
        }
    }

    async fn ack_update(&self, status: &TaskStatus) -> Result<(), SchedulerError> {
        let Some(uuid_b64) = &status.uuid else {
            return Ok(());
        };
        let uuid = base64::engine::general_purpose::STANDARD
            .decode(uuid_b64)
            .map_err(|e| SchedulerError::Framing(format!("bad status uuid: {e}")))?;

        let agent_id = status
            .agent_id
            .as_ref()
            .map(|id| id.value.clone())
            .unwrap_or_default();

        let mut ack = Call::of_type(call::Type::Acknowledge);
        ack.framework_id = self.framework_id_pb();
        ack.acknowledge = Some(call::Acknowledge {
            agent_id: pb::AgentId { value: agent_id },
            task_id: pb::TaskId {
                value: status.task_id.value.clone(),
            },
            uuid,
        });

        let code = self.client.send(&ack).await?;
        if code != 202 {
            return Err(SchedulerError::CallRejected {
                call: "ACKNOWLEDGE",
                status: code,
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Agent / offer registry
    // -------------------------------------------------------------------

    fn register_offer(&self, wire: &crate::events::Offer) {
        let agent_id = wire.agent_id.value.clone();
        if agent_id.is_empty() {
            warn!("Offer without agent id, ignoring");
            return;
        }

        let offer = Arc::new(Offer::from_wire(wire));
        debug!(
            offer = offer.id(),
            agent = %agent_id,
            hostname = offer.hostname(),
            cpus = offer.cpus(),
            mem = offer.mem(),
            disk = offer.disk(),
            "Received offer"
        );

        let agent = {
            let mut agents = self.agents.write().unwrap();
            Arc::clone(agents.entry(agent_id).or_insert_with(|| {
                let attrs = wire
                    .attributes
                    .iter()
                    .map(|a| (a.name.clone(), a.value_string()))
                    .collect();
                Agent::new(&wire.agent_id.value, &wire.hostname, attrs)
            }))
        };

        agent.add_offer(Arc::clone(&offer));

        // Stale offers hold capacity hostage; hand them back.
        let sched = self.strong();
        let offer_id = offer.id().to_string();
        let timeout = self.cfg.offer_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = sched.quit.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if sched.remove_offer(&offer_id) {
                        debug!(offer = %offer_id, "Declining stale offer");
                        if let Err(e) = sched.decline_offers(&[offer_id.clone()]).await {
                            warn!(offer = %offer_id, error = %e, "Failed to decline stale offer");
                        }
                    }
                }
            }
        });
    }

    fn on_rescind(&self, offer_id: &str) {
        if self.remove_offer(offer_id) {
            debug!(offer = %offer_id, "Offer rescinded");
        } else {
            debug!(offer = %offer_id, "Rescind for unknown offer");
        }
    }

    /// An agent failure invalidates everything scheduled there. The agent
    /// leaves the registry and its live handles observe a synthesized
    /// TASK_LOST; authoritative updates follow from the master or from
    /// reconciliation.
    fn on_failure(&self, ev: Event) {
        let Some(failure) = ev.failure else {
            return;
        };

        if failure.executor_id.is_some() {
            debug!("Executor failure reported");
            return;
        }

        let Some(agent_id) = failure.agent_id.map(|id| id.value) else {
            return;
        };

        warn!(agent = %agent_id, "Agent failure reported by master");

        let Some(agent) = self.get_agent(&agent_id) else {
            return;
        };
        self.remove_agent(&agent_id);

        for task in agent.tasks() {
            task.send_status(TaskStatus::synthesized(
                task.id(),
                &agent_id,
                TaskState::TaskLost,
                "agent failed",
            ));
        }
    }

    fn get_agent(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents.read().unwrap().get(agent_id).cloned()
    }

    fn remove_agent(&self, agent_id: &str) {
        self.agents.write().unwrap().remove(agent_id);
    }

    fn agents_snapshot(&self) -> Vec<Arc<Agent>> {
        self.agents.read().unwrap().values().cloned().collect()
    }

    /// Remove an offer wherever it lives; empties out its agent when that
    /// was the last thing it held.
    fn remove_offer(&self, offer_id: &str) -> bool {
        for agent in self.agents_snapshot() {
            if agent.remove_offer(offer_id) {
                if agent.is_empty() {
                    self.remove_agent(agent.id());
                }
                return true;
            }
        }
        false
    }

    async fn decline_offers(&self, offer_ids: &[String]) -> Result<(), SchedulerError> {
        let mut decline = Call::of_type(call::Type::Decline);
        decline.framework_id = self.framework_id_pb();
        decline.decline = Some(call::Decline {
            offer_ids: offer_ids
                .iter()
                .map(|id| pb::OfferId { value: id.clone() })
                .collect(),
            filters: Some(pb::Filters {
                refuse_seconds: Some(1.0),
            }),
        });

        let code = self.client.send(&decline).await?;
        if code != 202 {
            return Err(SchedulerError::CallRejected {
                call: "DECLINE",
                status: code,
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Launch engine
    // -------------------------------------------------------------------

    /// Launch a batch of tasks on a single agent.
    ///
    /// The whole filter-rank-reserve-accept-await sequence runs inside a
    /// one-slot semaphore, so two launches can never consume overlapping
    /// offers. The first task's name carries the app id
    /// (`<index>.<app-id>`) and its config drives candidate selection.
    pub async fn launch_tasks(
        &self,
        tasks: Vec<Arc<Task>>,
    ) -> Result<HashMap<String, Result<(), TaskFailure>>, SchedulerError> {
        let Some(first) = tasks.first() else {
            return Err(SchedulerError::EmptyTaskBatch);
        };
        let app_id = first
            .app_id()
            .ok_or_else(|| SchedulerError::MalformedTaskName(first.name().to_string()))?
            .to_string();

        let _permit = self
            .launch_sem
            .acquire()
            .await
            .expect("launch semaphore closed");

        let deadline = Instant::now() + self.cfg.resource_timeout;

        // Candidates may pass the filters while their offers are still in
        // flight; re-poll until one actually holds offers.
        let (agent, offers) = loop {
            let filtered = self.filtered_agents(first.config(), deadline).await?;
            let ranked = self.strategy.rank_and_sort(filtered);

            let selected = ranked.into_iter().find_map(|a| {
                let offers = a.offers();
                (!offers.is_empty()).then_some((a, offers))
            });

            if let Some(selected) = selected {
                break selected;
            }
            tokio::time::sleep(OFFER_POLL).await;
        };

        debug!(
            agent = agent.id(),
            hostname = agent.hostname(),
            offers = offers.len(),
            tasks = tasks.len(),
            strategy = self.strategy.name(),
            "Reserving agent for launch"
        );

        // Reserve: tasks first so the agent never empties out while its
        // offers are pulled from the registry.
        for task in &tasks {
            task.set_agent(agent.id());
            agent.add_task(Arc::clone(task));
        }
        for offer in &offers {
            self.remove_offer(offer.id());
        }

        let ports: Vec<u64> = offers.iter().flat_map(|o| o.ports()).collect();
        let hostname = offers[0].hostname().to_string();

        let mut task_infos = Vec::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            let port = ports.get(i).copied();
            let ip = match task.config().network {
                Network::Host | Network::Bridge => hostname.clone(),
                Network::Custom(_) => task.config().ip.clone().unwrap_or_default(),
            };

            let mut record = self.store.get_task(&app_id, task.id()).await?;
            record.agent_id = agent.id().to_string();
            record.ip = ip.clone();
            record.port = port;
            self.store.update_task(&app_id, record).await?;

            task_infos.push(task.build(agent.id(), port, &ip));
        }

        let mut accept = Call::of_type(call::Type::Accept);
        accept.framework_id = self.framework_id_pb();
        accept.accept = Some(call::Accept {
            offer_ids: offers
                .iter()
                .map(|o| pb::OfferId {
                    value: o.id().to_string(),
                })
                .collect(),
            operations: vec![pb::offer::Operation {
                r#type: Some(pb::offer::operation::Type::Launch as i32),
                launch: Some(pb::offer::operation::Launch { task_infos }),
            }],
            filters: Some(pb::Filters {
                refuse_seconds: Some(1.0),
            }),
        });

        let code = self.client.send(&accept).await?;
        if code != 202 {
            error!(status = code, "ACCEPT call rejected");
            return Err(SchedulerError::CallRejected {
                call: "ACCEPT",
                status: code,
            });
        }

        info!(
            tasks = tasks.len(),
            agent = agent.id(),
            hostname = %hostname,
            "Launched task batch"
        );

        // Await each handle; terminal errors leave the agent, successful
        // tasks keep their handle attached for later status routing.
        let agent_id = agent.id().to_string();
        let results = join_all(tasks.iter().map(|task| {
            let task = Arc::clone(task);
            let agent_id = agent_id.clone();
            async move {
                loop {
                    let status = task.recv_status().await;
                    if !task.is_done(&status) {
                        continue;
                    }

                    let outcome = match task.detect_error(&status) {
                        Some(failure) => {
                            self.drop_task_handle(&agent_id, task.id());
                            Err(failure)
                        }
                        None => Ok(()),
                    };
                    return (task.id().to_string(), outcome);
                }
            }
        }))
        .await;

        Ok(results.into_iter().collect())
    }

    async fn filtered_agents(
        &self,
        cfg: &TaskConfig,
        deadline: Instant,
    ) -> Result<Vec<Arc<Agent>>, SchedulerError> {
        loop {
            let filtered = {
                let filters = self.filters.read().unwrap();
                apply_filters(&filters, cfg, self.agents_snapshot())
            };
            if !filtered.is_empty() {
                return Ok(filtered);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(SchedulerError::ResourceNotEnough);
            }
            tokio::time::sleep(FILTER_POLL.min(deadline - now)).await;
        }
    }

    fn drop_task_handle(&self, agent_id: &str, task_id: &str) {
        if let Some(agent) = self.get_agent(agent_id) {
            agent.remove_task(task_id);
            if agent.is_empty() {
                self.remove_agent(agent_id);
            }
        }
    }

    // -------------------------------------------------------------------
    // Kill
    // -------------------------------------------------------------------

    /// Send a KILL for the task. With `sync` the call registers a handle
    /// and blocks until the master reports TASK_KILLED.
    pub async fn kill_task(
        &self,
        task_id: &str,
        agent_id: &str,
        sync: bool,
    ) -> Result<(), SchedulerError> {
        debug!(task = %task_id, agent = %agent_id, sync, "Killing task");

        let handle = if sync {
            let task = Task::new(TaskConfig::default(), task_id, task_id);
            if let Some(agent) = self.get_agent(agent_id) {
                agent.add_task(Arc::clone(&task));
            }
            Some(task)
        } else {
            None
        };

        let mut kill = Call::of_type(call::Type::Kill);
        kill.framework_id = self.framework_id_pb();
        kill.kill = Some(call::Kill {
            task_id: pb::TaskId {
                value: task_id.to_string(),
            },
            agent_id: Some(pb::AgentId {
                value: agent_id.to_string(),
            }),
        });

        let code = self.client.send(&kill).await?;
        if code != 202 {
            return Err(SchedulerError::CallRejected {
                call: "KILL",
                status: code,
            });
        }

        if let Some(task) = handle {
            loop {
                let status = task.recv_status().await;
                if Task::is_killed(&status) {
                    self.drop_task_handle(agent_id, task_id);
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    // -------------------------------------------------------------------
    // Reconciliation
    // -------------------------------------------------------------------

    /// One-shot reconciliation: every persisted task in a single call.
    pub async fn reconcile(&self) {
        info!("Starting task reconciliation with the mesos master");

        let apps = match self.store.list_apps().await {
            Ok(apps) => apps,
            Err(e) => {
                error!(error = %e, "Failed to list apps for reconciliation");
                return;
            }
        };

        let mut pairs = Vec::new();
        for app in apps {
            match self.store.list_tasks(&app.id).await {
                Ok(tasks) => {
                    pairs.extend(tasks.into_iter().map(|t| (t.id, t.agent_id)));
                }
                Err(e) => {
                    warn!(app = %app.id, error = %e, "Failed to list tasks, skipping app");
                }
            }
        }

        if let Err(e) = self.reconcile_tasks(&pairs).await {
            error!(error = %e, "Reconcile call failed");
        }
    }

    /// Arm the periodic reconciliation ticker; idempotent.
    fn start_reconcile(&self) {
        {
            let mut started = self.reconcile_started.lock().unwrap();
            if *started {
                return;
            }
            *started = true;
        }

        let sched = self.strong();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sched.cfg.reconciliation_interval);
            // The subscription just confirmed; skip the immediate tick.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = sched.quit.cancelled() => return,
                    _ = ticker.tick() => sched.reconcile_paced().await,
                }
            }
        });
    }

    /// Paced pass: batches of `reconciliation_step` accumulated across
    /// apps, a delay between batches, store errors skipped per app.
    async fn reconcile_paced(&self) {
        let apps = match self.store.list_apps().await {
            Ok(apps) => apps,
            Err(e) => {
                error!(error = %e, "Failed to list apps for reconciliation");
                return;
            }
        };

        let mut batch: Vec<(String, String)> = Vec::new();
        let mut sent = 0usize;

        for app in apps {
            let tasks = match self.store.list_tasks(&app.id).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(app = %app.id, error = %e, "Failed to list tasks, skipping app");
                    continue;
                }
            };

            for task in tasks {
                batch.push((task.id, task.agent_id));

                if batch.len() >= self.cfg.reconciliation_step {
                    if let Err(e) = self.reconcile_tasks(&batch).await {
                        warn!(error = %e, "Reconcile batch failed");
                    }
                    sent += batch.len();
                    batch.clear();
                    tokio::time::sleep(self.cfg.reconciliation_step_delay).await;
                }
            }
        }

        if !batch.is_empty() {
            if let Err(e) = self.reconcile_tasks(&batch).await {
                warn!(error = %e, "Reconcile batch failed");
            }
            sent += batch.len();
        }

        debug!(tasks = sent, "Reconciliation pass complete");
    }

    async fn reconcile_tasks(&self, pairs: &[(String, String)]) -> Result<(), SchedulerError> {
        let mut reconcile = Call::of_type(call::Type::Reconcile);
        reconcile.framework_id = self.framework_id_pb();
        reconcile.reconcile = Some(call::Reconcile {
            tasks: pairs
                .iter()
                .map(|(task_id, agent_id)| call::reconcile::Task {
                    task_id: pb::TaskId {
                        value: task_id.clone(),
                    },
                    agent_id: (!agent_id.is_empty()).then(|| pb::AgentId {
                        value: agent_id.clone(),
                    }),
                })
                .collect(),
        });

        let code = self.client.send(&reconcile).await?;
        if code != 202 {
            return Err(SchedulerError::CallRejected {
                call: "RECONCILE",
                status: code,
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Event fan-out and diagnostics
    // -------------------------------------------------------------------

    /// Register an external watcher on the status-update stream.
    pub fn subscribe_event(&self, name: &str) -> Result<Subscription, SchedulerError> {
        self.eventmgr.subscribe(name)
    }

    /// Diagnostic snapshot of agents, config and connection state.
    pub fn dump(&self) -> serde_json::Value {
        json!({
            "agents": self.agents_snapshot()
                .iter()
                .map(|a| a.snapshot())
                .collect::<Vec<_>>(),
            "config": &self.cfg,
            "cluster": self.cluster_name(),
            "mesos_leader": self.leader(),
            "status": self.connection_status(),
        })
    }

    /// Queue depths and in-flight task count.
    pub fn load(&self) -> serde_json::Value {
        let tasks: usize = self
            .agents_snapshot()
            .iter()
            .map(|a| a.task_count())
            .sum();

        json!({
            "tasks": tasks,
            "events": self.updates_tx.max_capacity() - self.updates_tx.capacity(),
            "offers": self.offers_tx.max_capacity() - self.offers_tx.capacity(),
            "failed": self.failed_tx.max_capacity() - self.failed_tx.capacity(),
        })
    }

    fn framework_id_pb(&self) -> Option<pb::FrameworkId> {
        self.framework.lock().unwrap().id.clone()
    }
}

fn default_framework(cfg: &SchedulerConfig) -> pb::FrameworkInfo {
    pb::FrameworkInfo {
        user: cfg.framework_user.clone(),
        name: cfg.framework_name.clone(),
        id: None,
        failover_timeout: Some(FRAMEWORK_FAILOVER_TIMEOUT.as_secs() as f64),
        checkpoint: Some(true),
        hostname: None,
        principal: None,
        capabilities: vec![pb::framework_info::Capability {
            r#type: Some(pb::framework_info::capability::Type::PartitionAware as i32),
        }],
        roles: vec!["*".to_string()],
    }
}
