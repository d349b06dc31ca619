//! Full lifecycle tests against stand-in daemons.
//!
//! `sleep` plays the daemon process and small axum servers play its control
//! API, so these run without the real daemon installed.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::routing::get;
use serde_json::json;
use testbed_core::{Bootstrap, ClusterConfig, IDENTITY_PATH, SWARM_PEERS_PATH};
use testbed_ops::{DaemonConfig, ProbeConfig, RepoInitializer, Testbed, TestbedConfig, TestbedError};

/// Writes the config document a freshly initialized repository would have.
struct FakeInitializer;

#[async_trait]
impl RepoInitializer for FakeInitializer {
    async fn init_repo(&self, node: usize, dir: &Path) -> Result<(), TestbedError> {
        let doc = json!({
            "Identity": {"PeerID": peer_id(node), "PrivKey": "k"},
            "Addresses": {
                "Swarm": ["/ip4/0.0.0.0/tcp/4001"],
                "API": "/ip4/127.0.0.1/tcp/5001",
                "Gateway": "/ip4/127.0.0.1/tcp/8080"
            },
            "Bootstrap": [],
            "Discovery": {"MDNS": {"Enabled": true}}
        });
        std::fs::write(dir.join("config"), doc.to_string())?;
        Ok(())
    }
}

fn peer_id(node: usize) -> String {
    format!("QmNode{node}")
}

fn testbed(root: &Path) -> Testbed {
    let daemon = DaemonConfig {
        program: "sleep".into(),
        run_args: vec!["30".into()],
        ..DaemonConfig::default()
    };
    let config = TestbedConfig::new(root)
        .with_daemon(daemon)
        .with_probe(ProbeConfig {
            interval: Duration::from_millis(20),
            attempts: 10,
            request_timeout: Duration::from_millis(500),
        })
        .with_stop_grace(Duration::from_secs(2));
    Testbed::new(config)
        .unwrap()
        .with_initializer(Arc::new(FakeInitializer))
}

/// Serve a control API that answers as `id` with the given swarm peers.
async fn fake_api(id: String, peers: Vec<String>) -> SocketAddr {
    let app = Router::new()
        .route(
            IDENTITY_PATH,
            get(move || async move { axum::Json(json!({"ID": id})) }),
        )
        .route(
            SWARM_PEERS_PATH,
            get(move || async move { axum::Json(json!({"Strings": peers})) }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Point node `node`'s API address at `addr`.
fn pin_api(tb: &Testbed, node: usize, addr: SocketAddr) {
    let mut config = tb.store().load_config(node).unwrap();
    config.addresses.api = format!("/ip4/{}/tcp/{}", addr.ip(), addr.port());
    tb.store().write_config(node, &config).unwrap();
}

async fn provisioned(root: &Path, count: usize) -> Testbed {
    let tb = testbed(root);
    tb.init(&ClusterConfig::builder().count(count).build(), |_| false)
        .await
        .unwrap();
    tb
}

fn pid_files(tb: &Testbed) -> Vec<usize> {
    (0..tb.store().count())
        .filter(|&n| tb.store().pid_path(n).exists())
        .collect()
}

mod start {
    use super::*;

    #[tokio::test]
    async fn wait_all_probes_every_node_then_stops_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        let tb = provisioned(tmp.path(), 3).await;
        for node in 0..3 {
            let peers = vec![format!("/ip4/127.0.0.1/tcp/4002/ipfs/{}", peer_id(0))];
            pin_api(&tb, node, fake_api(peer_id(node), peers).await);
        }

        let started = tb.start(true).await.unwrap();

        let nodes: Vec<usize> = started.iter().map(|s| s.node).collect();
        assert_eq!(nodes, vec![0, 1, 2]);
        for s in &started {
            assert_eq!(tb.store().read_pid(s.node), Some(s.pid));
        }

        let report = tb.stop().await;
        assert_eq!(report.failures().count(), 0);
        assert!(pid_files(&tb).is_empty());
    }

    #[tokio::test]
    async fn without_wait_only_hub_is_probed() {
        let tmp = tempfile::tempdir().unwrap();
        let tb = provisioned(tmp.path(), 2).await;
        pin_api(&tb, 0, fake_api(peer_id(0), Vec::new()).await);
        // Node 1's API is never served; without --wait nobody asks.

        let started = tb.start(false).await.unwrap();
        assert_eq!(started.len(), 2);

        assert_eq!(tb.stop().await.failures().count(), 0);
    }

    #[tokio::test]
    async fn unreachable_hub_times_out_and_rolls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let tb = provisioned(tmp.path(), 3).await;
        let closed = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        pin_api(&tb, 0, closed);

        let err = tb.start(false).await.unwrap_err();

        assert!(matches!(err, TestbedError::Timeout { .. }), "{err}");
        assert!(pid_files(&tb).is_empty());
        // Only the hub was ever launched; the others wait for it to answer.
        assert!(tb.store().stdout_path(0).exists());
        assert!(!tb.store().stdout_path(1).exists());
        assert!(!tb.store().stdout_path(2).exists());
    }

    #[tokio::test]
    async fn wrong_identity_fails_fast() {
        let tmp = tempfile::tempdir().unwrap();
        let tb = provisioned(tmp.path(), 2).await;
        pin_api(&tb, 0, fake_api("QmSomeoneElse".into(), Vec::new()).await);

        let err = tb.start(false).await.unwrap_err();

        assert!(matches!(
            err,
            TestbedError::IdentityMismatch { ref expected, .. } if *expected == peer_id(0)
        ));
        assert!(pid_files(&tb).is_empty());
    }

    #[tokio::test]
    async fn peerless_nodes_fail_bootstrap_check() {
        let tmp = tempfile::tempdir().unwrap();
        let tb = provisioned(tmp.path(), 2).await;
        for node in 0..2 {
            pin_api(&tb, node, fake_api(peer_id(node), Vec::new()).await);
        }

        let err = tb.start(true).await.unwrap_err();

        assert!(matches!(err, TestbedError::Timeout { condition: "bootstrap", .. }));
        assert!(pid_files(&tb).is_empty());
    }

    #[tokio::test]
    async fn single_node_skips_peer_check() {
        let tmp = tempfile::tempdir().unwrap();
        let tb = provisioned(tmp.path(), 1).await;
        pin_api(&tb, 0, fake_api(peer_id(0), Vec::new()).await);

        tb.start(true).await.unwrap();
        assert_eq!(tb.stop().await.failures().count(), 0);
    }

    #[tokio::test]
    async fn second_start_reports_already_running() {
        let tmp = tempfile::tempdir().unwrap();
        let tb = provisioned(tmp.path(), 1).await;
        pin_api(&tb, 0, fake_api(peer_id(0), Vec::new()).await);

        let first = tb.start(false).await.unwrap();
        let err = tb.start(false).await.unwrap_err();

        assert!(matches!(
            err,
            TestbedError::AlreadyRunning { node: 0, pid } if pid == first[0].pid
        ));
        // The rejected call launched nothing, so nothing was rolled back.
        assert_eq!(tb.store().read_pid(0), Some(first[0].pid));
        tb.stop().await;
    }
}

mod stop {
    use super::*;

    #[tokio::test]
    async fn missing_pid_file_is_isolated_to_its_node() {
        let tmp = tempfile::tempdir().unwrap();
        let tb = provisioned(tmp.path(), 3).await;
        tb.supervisor().start(0).await.unwrap();
        tb.supervisor().start(2).await.unwrap();

        let report = tb.stop().await;

        let failed: Vec<usize> = report.failures().map(|(n, _)| n).collect();
        assert_eq!(failed, vec![1]);
        assert!(matches!(report.nodes[1].1, Err(TestbedError::NotRunning(1))));
        assert_eq!(report.hard_failures().count(), 0);
        assert!(pid_files(&tb).is_empty());
    }

    #[tokio::test]
    async fn restart_replaces_every_daemon() {
        let tmp = tempfile::tempdir().unwrap();
        let tb = provisioned(tmp.path(), 2).await;
        pin_api(&tb, 0, fake_api(peer_id(0), Vec::new()).await);

        let before = tb.start(false).await.unwrap();
        let after = tb.restart(false).await.unwrap();

        assert_eq!(after.len(), 2);
        for (old, new) in before.iter().zip(&after) {
            assert_eq!(old.node, new.node);
            assert_ne!(old.pid, new.pid);
        }
        tb.stop().await;
    }
}

mod init {
    use super::*;

    #[tokio::test]
    async fn star_cluster_addresses_and_bootstrap() {
        let tmp = tempfile::tempdir().unwrap();
        let tb = testbed(tmp.path());
        let cluster = ClusterConfig::builder()
            .count(3)
            .bootstrap(Bootstrap::Star)
            .port_start(4002)
            .build();

        tb.init(&cluster, |_| false).await.unwrap();

        let hub = tb.store().load_config(0).unwrap();
        let one = tb.store().load_config(1).unwrap();
        assert_eq!(hub.addresses.swarm, vec!["/ip4/0.0.0.0/tcp/4002"]);
        assert_eq!(one.addresses.swarm, vec!["/ip4/0.0.0.0/tcp/4003"]);
        assert_eq!(one.addresses.api, "/ip4/127.0.0.1/tcp/5003");
        assert_eq!(one.bootstrap, vec![format!("/ip4/127.0.0.1/tcp/4002/ipfs/{}", peer_id(0))]);
        assert!(hub.bootstrap.is_empty());
    }

    #[tokio::test]
    async fn forced_reinit_leaves_exactly_new_count() {
        let tmp = tempfile::tempdir().unwrap();
        let tb = testbed(tmp.path());
        tb.init(&ClusterConfig::builder().count(4).build(), |_| false)
            .await
            .unwrap();

        tb.init(&ClusterConfig::builder().count(2).force(true).build(), |_| false)
            .await
            .unwrap();

        assert_eq!(tb.store().count(), 2);
        assert_eq!(tb.get("id", 1).unwrap(), peer_id(1));
    }

    #[tokio::test]
    async fn failed_repository_init_aborts_topology() {
        struct Flaky;

        #[async_trait]
        impl RepoInitializer for Flaky {
            async fn init_repo(&self, node: usize, dir: &Path) -> Result<(), TestbedError> {
                if node == 1 {
                    return Err(TestbedError::RepoInit {
                        node,
                        reason: "disk full".into(),
                    });
                }
                FakeInitializer.init_repo(node, dir).await
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let tb = testbed(tmp.path()).with_initializer(Arc::new(Flaky));

        let err = tb
            .init(&ClusterConfig::builder().count(3).build(), |_| false)
            .await
            .unwrap_err();

        assert!(matches!(err, TestbedError::ConfigDocument { .. }));
        // The directory set is still contiguous.
        assert_eq!(tb.store().count(), 3);
    }
}
