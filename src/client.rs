//! HTTP client for the Mesos master's scheduler API.
//!
//! Calls are posted as binary protobuf to `/api/v1/scheduler`; the
//! subscription response streams JSON RecordIO. After SUBSCRIBE every call
//! must echo the master-issued `Mesos-Stream-Id` header.

use std::sync::RwLock;
use std::time::Duration;

use prost::Message;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SchedulerError;
use crate::proto::scheduler::Call;

pub const STREAM_ID_HEADER: &str = "Mesos-Stream-Id";
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protocol-buffer";

/// Leader identity and cluster name from `/master/state`.
#[derive(Debug, Clone)]
pub struct MasterState {
    /// Leader address as `host:port`.
    pub leader: String,
    pub cluster: String,
}

#[derive(Debug, Deserialize)]
struct MasterStateBody {
    #[serde(default)]
    leader: Option<String>,
    #[serde(default)]
    cluster: Option<String>,
}

/// Client for one framework's connection to the master.
pub struct MesosClient {
    http: reqwest::Client,
    endpoint: RwLock<Option<String>>,
    stream_id: RwLock<Option<String>>,
}

impl MesosClient {
    pub fn new() -> Self {
        // No global timeout: the subscribe response body streams forever.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            endpoint: RwLock::new(None),
            stream_id: RwLock::new(None),
        }
    }

    /// Query each master endpoint for `/master/state` and adopt the first
    /// reported leader as the call target.
    pub async fn resolve_leader(
        &self,
        masters: &[String],
    ) -> Result<MasterState, SchedulerError> {
        for master in masters {
            let url = format!("http://{master}/master/state");
            let body = match self
                .http
                .get(&url)
                .timeout(Duration::from_secs(5))
                .send()
                .await
            {
                Ok(resp) => match resp.json::<MasterStateBody>().await {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(master = %master, error = %e, "Bad master state response");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(master = %master, error = %e, "Master state query failed");
                    continue;
                }
            };

            let Some(leader) = body.leader.as_deref().and_then(parse_leader_pid) else {
                continue;
            };

            let cluster = body
                .cluster
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "unnamed".to_string());

            debug!(leader = %leader, cluster = %cluster, "Resolved mesos leader");

            *self.endpoint.write().unwrap() =
                Some(format!("http://{leader}/api/v1/scheduler"));

            return Ok(MasterState { leader, cluster });
        }

        Err(SchedulerError::NoLeader)
    }

    /// POST a SUBSCRIBE call and hand back the streaming response.
    ///
    /// Requires 200 and a stream-id header; the stream id is retained for
    /// every subsequent [`send`](Self::send).
    pub async fn subscribe(&self, call: &Call) -> Result<reqwest::Response, SchedulerError> {
        let endpoint = self.endpoint()?;

        let resp = self
            .http
            .post(&endpoint)
            .header(reqwest::header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, "application/json")
            .body(call.encode_to_vec())
            .send()
            .await?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(SchedulerError::SubscribeFailed {
                status: status.as_u16(),
                body,
            });
        }

        let stream_id = resp
            .headers()
            .get(STREAM_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(SchedulerError::MissingStreamId)?;

        *self.stream_id.write().unwrap() = Some(stream_id);

        Ok(resp)
    }

    /// POST a one-shot call, echoing the current stream id. Returns the
    /// response status; callers decide whether non-202 is fatal.
    pub async fn send(&self, call: &Call) -> Result<u16, SchedulerError> {
        let endpoint = self.endpoint()?;

        let mut req = self
            .http
            .post(&endpoint)
            .header(reqwest::header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)
            .timeout(Duration::from_secs(10))
            .body(call.encode_to_vec());

        if let Some(stream_id) = self.stream_id.read().unwrap().clone() {
            req = req.header(STREAM_ID_HEADER, stream_id);
        }

        let resp = req.send().await?;
        Ok(resp.status().as_u16())
    }

    /// Forget the stream id ahead of a fresh SUBSCRIBE.
    pub fn reset(&self) {
        *self.stream_id.write().unwrap() = None;
    }

    pub fn stream_id(&self) -> Option<String> {
        self.stream_id.read().unwrap().clone()
    }

    fn endpoint(&self) -> Result<String, SchedulerError> {
        self.endpoint
            .read()
            .unwrap()
            .clone()
            .ok_or(SchedulerError::NoLeader)
    }
}

impl Default for MesosClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract `host:port` from a master pid like `master@10.0.0.1:5050`.
/// Plain `host:port` values pass through untouched.
fn parse_leader_pid(pid: &str) -> Option<String> {
    let addr = pid.rsplit_once('@').map_or(pid, |(_, addr)| addr).trim();
    if addr.is_empty() {
        return None;
    }
    Some(addr.to_string())
}
