//! Readiness checks against a node's control API.
//!
//! Both checks poll at a fixed interval with a bounded number of attempts.
//! A refused connection or a non-success status means "not up yet" and is
//! retried. A successful response that does not decode is a protocol
//! mismatch and fails at once, as does an identity that is present but wrong.

use serde::de::DeserializeOwned;
use testbed_core::{IDENTITY_PATH, IdResponse, SWARM_PEERS_PATH, SwarmPeersResponse};
use tracing::{debug, info};

use crate::config::ProbeConfig;
use crate::error::TestbedError;

/// What a successful probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessRecord {
    /// The control API answered within the budget.
    pub reachable: bool,
    /// Identity reported by the node, when the identity endpoint was queried.
    pub peer_id: Option<String>,
    /// Connected peers reported by the node, when the peers endpoint was queried.
    pub peer_count: usize,
}

enum Poll<T> {
    NotReady(String),
    Ready(T),
}

/// Polls node control APIs until they report ready.
#[derive(Debug, Clone)]
pub struct Prober {
    client: reqwest::Client,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(config: ProbeConfig) -> Result<Self, TestbedError> {
        // Readiness checks only target node API addresses on this host.
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .no_proxy()
            .build()
            .map_err(|e| TestbedError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Wait until the node at `addr` (`host:port`) answers as `expected`.
    pub async fn wait_for_identity(
        &self,
        expected: &str,
        addr: &str,
    ) -> Result<LivenessRecord, TestbedError> {
        for attempt in 1..=self.config.attempts {
            match self.fetch::<IdResponse>(addr, IDENTITY_PATH).await? {
                Poll::Ready(resp) => {
                    if resp.id.as_deref() != Some(expected) {
                        return Err(TestbedError::IdentityMismatch {
                            addr: addr.to_owned(),
                            expected: expected.to_owned(),
                            actual: resp.id,
                        });
                    }
                    info!(addr, peer_id = expected, attempt, "node is online");
                    return Ok(LivenessRecord {
                        reachable: true,
                        peer_id: resp.id,
                        peer_count: 0,
                    });
                }
                Poll::NotReady(reason) => {
                    debug!(addr, attempt, reason = %reason, "waiting for control API");
                }
            }
            tokio::time::sleep(self.config.interval).await;
        }
        Err(TestbedError::Timeout {
            addr: addr.to_owned(),
            condition: "come online",
            attempts: self.config.attempts,
        })
    }

    /// Wait until the node at `addr` reports at least one connected peer.
    pub async fn wait_for_peers(&self, addr: &str) -> Result<LivenessRecord, TestbedError> {
        for attempt in 1..=self.config.attempts {
            match self
                .fetch::<SwarmPeersResponse>(addr, SWARM_PEERS_PATH)
                .await?
            {
                Poll::Ready(resp) if resp.peer_count() > 0 => {
                    info!(addr, peers = resp.peer_count(), attempt, "node has peers");
                    return Ok(LivenessRecord {
                        reachable: true,
                        peer_id: None,
                        peer_count: resp.peer_count(),
                    });
                }
                Poll::Ready(_) => debug!(addr, attempt, "no peers yet"),
                Poll::NotReady(reason) => {
                    debug!(addr, attempt, reason = %reason, "waiting for control API");
                }
            }
            tokio::time::sleep(self.config.interval).await;
        }
        Err(TestbedError::Timeout {
            addr: addr.to_owned(),
            condition: "bootstrap",
            attempts: self.config.attempts,
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        addr: &str,
        path: &str,
    ) -> Result<Poll<T>, TestbedError> {
        let url = format!("http://{addr}{path}");
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return Ok(Poll::NotReady(e.to_string())),
        };
        if !response.status().is_success() {
            return Ok(Poll::NotReady(format!("HTTP {}", response.status())));
        }
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return Ok(Poll::NotReady(e.to_string())),
        };
        serde_json::from_slice(&body)
            .map(Poll::Ready)
            .map_err(|e| TestbedError::UnexpectedResponse {
                addr: addr.to_owned(),
                reason: format!("{path}: {e}"),
            })
    }
}
