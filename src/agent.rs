//! An agent and the offers and in-flight tasks it holds.
//!
//! Agents are created when their first offer arrives and leave the
//! registry once they hold neither offers nor tasks. Offer and task maps
//! carry their own reader-writer locks; the scheduler's agent map is
//! locked separately, so launch snapshots the agent list and then works
//! per-agent without ordering concerns.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::json;

use crate::offer::Offer;
use crate::task::Task;

pub struct Agent {
    id: String,
    hostname: String,
    attrs: RwLock<HashMap<String, String>>,
    offers: RwLock<HashMap<String, Arc<Offer>>>,
    tasks: RwLock<HashMap<String, Arc<Task>>>,
}

impl Agent {
    pub fn new(id: &str, hostname: &str, attrs: HashMap<String, String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            hostname: hostname.to_string(),
            attrs: RwLock::new(attrs),
            offers: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn add_offer(&self, offer: Arc<Offer>) {
        // Offers for one agent carry consistent attributes; last writer
        // wins on conflicting keys.
        self.attrs
            .write()
            .unwrap()
            .extend(offer.attrs().iter().map(|(k, v)| (k.clone(), v.clone())));
        self.offers
            .write()
            .unwrap()
            .insert(offer.id().to_string(), offer);
    }

    pub fn remove_offer(&self, offer_id: &str) -> bool {
        self.offers.write().unwrap().remove(offer_id).is_some()
    }

    pub fn get_offer(&self, offer_id: &str) -> Option<Arc<Offer>> {
        self.offers.read().unwrap().get(offer_id).cloned()
    }

    pub fn offers(&self) -> Vec<Arc<Offer>> {
        self.offers.read().unwrap().values().cloned().collect()
    }

    pub fn add_task(&self, task: Arc<Task>) {
        self.tasks
            .write()
            .unwrap()
            .insert(task.id().to_string(), task);
    }

    pub fn get_task(&self, task_id: &str) -> Option<Arc<Task>> {
        self.tasks.read().unwrap().get(task_id).cloned()
    }

    pub fn remove_task(&self, task_id: &str) -> bool {
        self.tasks.write().unwrap().remove(task_id).is_some()
    }

    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.tasks.read().unwrap().values().cloned().collect()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().unwrap().len()
    }

    /// An agent belongs in the registry iff this is false.
    pub fn is_empty(&self) -> bool {
        self.offers.read().unwrap().is_empty() && self.tasks.read().unwrap().is_empty()
    }

    /// Aggregate resources across held offers: scalar sums plus the
    /// concatenated expanded port list.
    pub fn resources(&self) -> (f64, f64, f64, Vec<u64>) {
        let mut cpus = 0.0;
        let mut mem = 0.0;
        let mut disk = 0.0;
        let mut ports = Vec::new();

        for offer in self.offers() {
            cpus += offer.cpus();
            mem += offer.mem();
            disk += offer.disk();
            ports.extend(offer.ports());
        }

        (cpus, mem, disk, ports)
    }

    /// Attribute union across the agent and its offers.
    pub fn attributes(&self) -> HashMap<String, String> {
        self.attrs.read().unwrap().clone()
    }

    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "id": &self.id,
            "hostname": &self.hostname,
            "attributes": self.attributes(),
            "offers": self.offers().iter().map(|o| o.snapshot()).collect::<Vec<_>>(),
            "tasks": self.tasks().iter().map(|t| t.id().to_string()).collect::<Vec<_>>(),
        })
    }
}
