//! End-to-end scheduler tests against the mock master.
//!
//! Each test runs its own master, store and scheduler; events are injected
//! on the subscription stream and calls asserted from the master's log.


use std::sync::Arc;
use std::time::{Duration, Instant};

use harness::*;
use skua::proto::scheduler::call;
use skua::store::memory::MemStore;
use skua::strategy::SpreadStrategy;
use skua::task::Network;
use skua::{Scheduler, SchedulerConfig, Store as _, Task, TaskConfig};

fn new_scheduler(cfg: SchedulerConfig, store: Arc<MemStore>) -> Arc<Scheduler> {
    Scheduler::new(cfg, store, Box::new(SpreadStrategy))
}

fn web_task(id: &str, cpus: f64, mem: f64) -> Arc<Task> {
    Task::new(
        TaskConfig {
            cpus,
            mem,
            image: "nginx:latest".to_string(),
            network: Network::Host,
            ..TaskConfig::default()
        },
        id,
        "0.web",
    )
}

async fn wait_until(what: &str, timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        if Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_happy_path_launch() {
    init_tracing();
    let master = MockMaster::spawn().await.unwrap();
    let store = seeded_store("web", &["t1"]);
    let sched = new_scheduler(test_config(master.addr), Arc::clone(&store));

    sched.subscribe().await.unwrap();
    master.send_event(&subscribed_event("fw-1")).await;
    master
        .send_event(&offers_event("o1", "a1", "node-1", 4.0, 1024.0, (31000, 31002)))
        .await;

    let launch = {
        let sched = Arc::clone(&sched);
        let task = web_task("t1", 1.0, 256.0);
        tokio::spawn(async move { sched.launch_tasks(vec![task]).await })
    };

    let accepts = master
        .wait_for_calls(call::Type::Accept, 1, Duration::from_secs(5))
        .await;
    assert_eq!(accept_task_ids(&accepts[0]), vec!["t1"]);

    master
        .send_event(&update_event("t1", "a1", "TASK_RUNNING", Some(true), Some("dXVpZC0x")))
        .await;

    let results = tokio::time::timeout(Duration::from_secs(5), launch)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(results["t1"].is_ok());

    // Placement persisted: chosen agent, first offered port, host IP.
    let record = store.get_task("web", "t1").await.unwrap();
    assert_eq!(record.agent_id, "a1");
    assert_eq!(record.ip, "node-1");
    assert_eq!(record.port, Some(31000));

    // The uuid-carrying update was acknowledged with the same identifiers.
    let acks = master
        .wait_for_calls(call::Type::Acknowledge, 1, Duration::from_secs(2))
        .await;
    let ack = acks[0].acknowledge.as_ref().unwrap();
    assert_eq!(ack.task_id.value, "t1");
    assert_eq!(ack.agent_id.value, "a1");
    assert_eq!(ack.uuid, b"uuid-1");

    assert_eq!(sched.framework_id().as_deref(), Some("fw-1"));
}

#[tokio::test]
async fn test_launch_blocks_until_offers_arrive() {
    init_tracing();
    let master = MockMaster::spawn().await.unwrap();
    let store = seeded_store("web", &["t2"]);
    let sched = new_scheduler(test_config(master.addr), store);

    sched.subscribe().await.unwrap();
    master.send_event(&subscribed_event("fw-1")).await;

    let launch = {
        let sched = Arc::clone(&sched);
        let task = web_task("t2", 1.0, 256.0);
        tokio::spawn(async move { sched.launch_tasks(vec![task]).await })
    };

    // No resources yet: the call must hold off the ACCEPT.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(master.calls_of(call::Type::Accept).is_empty());
    assert!(!launch.is_finished());

    master
        .send_event(&offers_event("o1", "a1", "node-1", 4.0, 1024.0, (31000, 31000)))
        .await;

    master
        .wait_for_calls(call::Type::Accept, 1, Duration::from_secs(5))
        .await;
    master
        .send_event(&update_event("t2", "a1", "TASK_RUNNING", None, None))
        .await;

    let results = tokio::time::timeout(Duration::from_secs(5), launch)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(results["t2"].is_ok());
}

#[tokio::test]
async fn test_resource_timeout_surfaces_error() {
    init_tracing();
    let master = MockMaster::spawn().await.unwrap();
    let store = seeded_store("web", &["t3"]);
    let mut cfg = test_config(master.addr);
    cfg.resource_timeout = Duration::from_millis(200);
    let sched = new_scheduler(cfg, store);

    sched.subscribe().await.unwrap();
    master.send_event(&subscribed_event("fw-1")).await;
    master
        .send_event(&offers_event("o1", "a1", "node-1", 4.0, 1024.0, (31000, 31000)))
        .await;

    let started = Instant::now();
    let err = sched
        .launch_tasks(vec![web_task("t3", 99.0, 256.0)])
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.to_string(), "resource not enough");
    assert!(elapsed >= Duration::from_millis(150), "gave up too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "gave up too late: {elapsed:?}");
    assert!(master.calls_of(call::Type::Accept).is_empty());
}

#[tokio::test]
async fn test_rescind_removes_empty_agent() {
    init_tracing();
    let master = MockMaster::spawn().await.unwrap();
    let sched = new_scheduler(test_config(master.addr), Arc::new(MemStore::new()));

    sched.subscribe().await.unwrap();
    master.send_event(&subscribed_event("fw-1")).await;
    master
        .send_event(&offers_event("o1", "a1", "node-1", 4.0, 1024.0, (31000, 31000)))
        .await;

    wait_until("agent a1 to register", Duration::from_secs(2), || {
        sched.dump()["agents"].as_array().unwrap().len() == 1
    })
    .await;

    master.send_event(&rescind_event("o1")).await;

    wait_until("agent a1 to drain", Duration::from_secs(2), || {
        sched.dump()["agents"].as_array().unwrap().is_empty()
    })
    .await;
}

#[tokio::test]
async fn test_failed_task_is_relaunched() {
    init_tracing();
    let master = MockMaster::spawn().await.unwrap();
    let store = seeded_store("web", &["t4"]);
    let sched = new_scheduler(test_config(master.addr), store);

    sched.subscribe().await.unwrap();
    master.send_event(&subscribed_event("fw-1")).await;
    master
        .send_event(&offers_event("o1", "a1", "node-1", 4.0, 1024.0, (31000, 31000)))
        .await;

    let launch = {
        let sched = Arc::clone(&sched);
        let task = web_task("t4", 1.0, 256.0);
        tokio::spawn(async move { sched.launch_tasks(vec![task]).await })
    };

    master
        .wait_for_calls(call::Type::Accept, 1, Duration::from_secs(5))
        .await;
    master
        .send_event(&update_event("t4", "a1", "TASK_RUNNING", None, None))
        .await;
    tokio::time::timeout(Duration::from_secs(5), launch)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    // The running task fails; its handle is still attached, so the
    // failed-task worker picks it up and relaunches once offers return.
    master
        .send_event(&update_event("t4", "a1", "TASK_FAILED", None, None))
        .await;
    master
        .send_event(&offers_event("o2", "a1", "node-1", 4.0, 1024.0, (31000, 31000)))
        .await;

    let accepts = master
        .wait_for_calls(call::Type::Accept, 2, Duration::from_secs(5))
        .await;
    assert_eq!(accept_task_ids(&accepts[1]), vec!["t4"]);

    master
        .send_event(&update_event("t4", "a1", "TASK_RUNNING", None, None))
        .await;
}

#[tokio::test]
async fn test_heartbeat_timeout_triggers_resubscribe() {
    init_tracing();
    let master = MockMaster::spawn().await.unwrap();
    let mut cfg = test_config(master.addr);
    cfg.heartbeat_timeout = Duration::from_millis(100);
    let sched = new_scheduler(cfg, Arc::new(MemStore::new()));

    sched.subscribe().await.unwrap();
    assert_eq!(master.subscribe_count(), 1);

    // Arms the watchdog; the master then goes silent.
    let armed_at = Instant::now();
    master.send_event(&subscribed_event("fw-1")).await;

    master
        .wait_for_subscribes(2, Duration::from_millis(2100))
        .await;
    assert!(armed_at.elapsed() >= Duration::from_millis(90));
}

#[tokio::test]
async fn test_heartbeats_keep_connection_alive() {
    init_tracing();
    let master = MockMaster::spawn().await.unwrap();
    let mut cfg = test_config(master.addr);
    cfg.heartbeat_timeout = Duration::from_millis(200);
    let sched = new_scheduler(cfg, Arc::new(MemStore::new()));

    sched.subscribe().await.unwrap();
    master.send_event(&subscribed_event("fw-1")).await;

    // Keep beating for well past the watchdog period.
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        master.send_event(&heartbeat_event()).await;
    }

    assert_eq!(master.subscribe_count(), 1);
}

#[tokio::test]
async fn test_kill_task_sync_waits_for_killed() {
    init_tracing();
    let master = MockMaster::spawn().await.unwrap();
    let sched = new_scheduler(test_config(master.addr), Arc::new(MemStore::new()));

    sched.subscribe().await.unwrap();
    master.send_event(&subscribed_event("fw-1")).await;
    master
        .send_event(&offers_event("o1", "a1", "node-1", 4.0, 1024.0, (31000, 31000)))
        .await;

    wait_until("agent a1 to register", Duration::from_secs(2), || {
        sched.dump()["agents"].as_array().unwrap().len() == 1
    })
    .await;

    let kill = {
        let sched = Arc::clone(&sched);
        tokio::spawn(async move { sched.kill_task("t9", "a1", true).await })
    };

    let kills = master
        .wait_for_calls(call::Type::Kill, 1, Duration::from_secs(2))
        .await;
    let body = kills[0].kill.as_ref().unwrap();
    assert_eq!(body.task_id.value, "t9");
    assert_eq!(body.agent_id.as_ref().unwrap().value, "a1");

    assert!(!kill.is_finished());
    master
        .send_event(&update_event("t9", "a1", "TASK_KILLED", None, None))
        .await;

    tokio::time::timeout(Duration::from_secs(5), kill)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_agent_failure_fails_inflight_launch() {
    init_tracing();
    let master = MockMaster::spawn().await.unwrap();
    let store = seeded_store("web", &["t6"]);
    let sched = new_scheduler(test_config(master.addr), store);

    sched.subscribe().await.unwrap();
    master.send_event(&subscribed_event("fw-1")).await;
    master
        .send_event(&offers_event("o1", "a1", "node-1", 4.0, 1024.0, (31000, 31000)))
        .await;

    let launch = {
        let sched = Arc::clone(&sched);
        let task = web_task("t6", 1.0, 256.0);
        tokio::spawn(async move { sched.launch_tasks(vec![task]).await })
    };

    master
        .wait_for_calls(call::Type::Accept, 1, Duration::from_secs(5))
        .await;
    master.send_event(&failure_event("a1")).await;

    let results = tokio::time::timeout(Duration::from_secs(5), launch)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let failure = results["t6"].as_ref().unwrap_err();
    assert_eq!(failure.state, "TASK_LOST");

    wait_until("agent a1 to drain", Duration::from_secs(2), || {
        sched.dump()["agents"].as_array().unwrap().is_empty()
    })
    .await;
}

#[tokio::test]
async fn test_event_fanout_delivers_updates() {
    init_tracing();
    let master = MockMaster::spawn().await.unwrap();
    let sched = new_scheduler(test_config(master.addr), Arc::new(MemStore::new()));

    sched.subscribe().await.unwrap();
    master.send_event(&subscribed_event("fw-1")).await;

    let mut sub = sched.subscribe_event("watcher-1").unwrap();
    master
        .send_event(&update_event("t5", "a9", "TASK_RUNNING", Some(true), None))
        .await;

    let event = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.task_id, "t5");
    assert_eq!(event.agent_id, "a9");
    assert_eq!(event.state, "TASK_RUNNING");
}

#[tokio::test]
async fn test_dump_and_load_reflect_registry() {
    init_tracing();
    let master = MockMaster::spawn().await.unwrap();
    let sched = new_scheduler(test_config(master.addr), Arc::new(MemStore::new()));

    sched.subscribe().await.unwrap();
    master.send_event(&subscribed_event("fw-1")).await;
    master
        .send_event(&offers_event("o1", "a1", "node-1", 4.0, 1024.0, (31000, 31002)))
        .await;

    wait_until("agent a1 to register", Duration::from_secs(2), || {
        sched.dump()["agents"].as_array().unwrap().len() == 1
    })
    .await;

    let dump = sched.dump();
    assert_eq!(dump["cluster"], "test");
    assert_eq!(dump["status"], "connected");
    let agent = &dump["agents"][0];
    assert_eq!(agent["id"], "a1");
    assert_eq!(agent["hostname"], "node-1");

    let load = sched.load();
    assert_eq!(load["tasks"], 0);
    assert_eq!(load["failed"], 0);
}
