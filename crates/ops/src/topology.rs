//! Bootstrap topology and address pinning.
//!
//! Runs after every node's repository exists. Writes are sequential by index
//! because every non-hub node's bootstrap entry is built from node 0's
//! already-written config.

use testbed_core::{Bootstrap, ClusterConfig, RepoConfig, bootstrap_entry};
use tracing::{debug, info};

use crate::error::TestbedError;
use crate::store::NodeStore;

/// Network settings the testbed owns for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeNetwork {
    pub swarm: String,
    pub api: String,
    pub bootstrap: Vec<String>,
}

impl NodeNetwork {
    /// Settings for node `index`, bootstrapping against `hub` if given.
    pub fn for_node(cluster: &ClusterConfig, index: usize, hub: Option<&str>) -> Self {
        Self {
            swarm: cluster.swarm_addr(index),
            api: cluster.api_addr(index),
            bootstrap: hub.map(|entry| vec![entry.to_owned()]).unwrap_or_default(),
        }
    }

    /// Overwrite the testbed-owned fields of `config`.
    pub fn apply(&self, config: &mut RepoConfig, mdns: bool) {
        config.bootstrap.clone_from(&self.bootstrap);
        config.addresses.swarm = vec![self.swarm.clone()];
        config.addresses.api.clone_from(&self.api);
        config.addresses.gateway.clear();
        config.discovery.mdns.enabled = mdns;
    }
}

/// Apply `cluster.bootstrap` to nodes `0..cluster.count`.
pub fn configure(store: &NodeStore, cluster: &ClusterConfig) -> Result<(), TestbedError> {
    match cluster.bootstrap {
        Bootstrap::Star => configure_star(store, cluster),
        Bootstrap::None => configure_isolated(store, cluster),
    }?;
    info!(
        nodes = cluster.count,
        bootstrap = %cluster.bootstrap,
        port_start = cluster.port_start,
        "topology configured"
    );
    Ok(())
}

fn configure_star(store: &NodeStore, cluster: &ClusterConfig) -> Result<(), TestbedError> {
    let mut hub = store.load_config(0)?;
    NodeNetwork::for_node(cluster, 0, None)
        .apply(&mut hub, cluster.mdns);
    store.write_config(0, &hub)?;

    let hub_swarm = hub.primary_swarm_addr().unwrap_or_default();
    let entry = bootstrap_entry(hub_swarm, &hub.identity.peer_id);
    debug!(hub = %entry, "hub bootstrap entry");

    for node in 1..cluster.count {
        let mut config = store.load_config(node)?;
        NodeNetwork::for_node(cluster, node, Some(&entry))
            .apply(&mut config, cluster.mdns);
        store.write_config(node, &config)?;
    }
    Ok(())
}

fn configure_isolated(store: &NodeStore, cluster: &ClusterConfig) -> Result<(), TestbedError> {
    for node in 0..cluster.count {
        let mut config = store.load_config(node)?;
        NodeNetwork::for_node(cluster, node, None)
            .apply(&mut config, cluster.mdns);
        store.write_config(node, &config)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn seed(store: &NodeStore, count: usize) {
        for node in 0..count {
            store.create_node_dir(node).unwrap();
            let doc = json!({
                "Identity": {"PeerID": format!("QmPeer{node}"), "PrivKey": "secret"},
                "Addresses": {
                    "Swarm": ["/ip4/0.0.0.0/tcp/4001"],
                    "API": "/ip4/127.0.0.1/tcp/5001",
                    "Gateway": "/ip4/127.0.0.1/tcp/8080"
                },
                "Bootstrap": ["/dnsaddr/bootstrap.example/ipfs/QmRemote"],
                "Discovery": {"MDNS": {"Enabled": true, "Interval": 10}}
            });
            std::fs::write(store.config_path(node), doc.to_string())
                .unwrap();
        }
    }

    fn snapshot(store: &NodeStore, count: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|n| std::fs::read(store.config_path(n)).unwrap())
            .collect()
    }

    #[test]
    fn star_wires_every_node_to_hub() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NodeStore::new(tmp.path());
        seed(&store, 3);
        let cluster = ClusterConfig::builder().count(3).port_start(4002).build();

        configure(&store, &cluster).unwrap();

        let hub = store.load_config(0).unwrap();
        assert!(hub.bootstrap.is_empty());
        assert_eq!(hub.addresses.swarm, vec!["/ip4/0.0.0.0/tcp/4002"]);
        assert_eq!(hub.addresses.api, "/ip4/127.0.0.1/tcp/5002");
        assert_eq!(hub.addresses.gateway, "");
        assert!(!hub.discovery.mdns.enabled);

        let one = store.load_config(1).unwrap();
        assert_eq!(one.addresses.swarm, vec!["/ip4/0.0.0.0/tcp/4003"]);
        assert_eq!(one.bootstrap, vec!["/ip4/127.0.0.1/tcp/4002/ipfs/QmPeer0"]);

        let two = store.load_config(2).unwrap();
        assert_eq!(two.addresses.api, "/ip4/127.0.0.1/tcp/5004");
        assert_eq!(two.bootstrap.len(), 1);
        assert!(two.bootstrap[0].ends_with("/ipfs/QmPeer0"));
    }

    #[test]
    fn star_has_exactly_one_empty_bootstrap_list() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NodeStore::new(tmp.path());
        seed(&store, 6);
        let cluster = ClusterConfig::builder().count(6).build();

        configure(&store, &cluster).unwrap();

        let empty: Vec<usize> = (0..6)
            .filter(|&n| store.load_config(n).unwrap().bootstrap.is_empty())
            .collect();
        assert_eq!(empty, vec![0]);
    }

    #[test]
    fn none_clears_every_bootstrap_list() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NodeStore::new(tmp.path());
        seed(&store, 3);
        let cluster = ClusterConfig::builder()
            .count(3)
            .bootstrap(Bootstrap::None)
            .mdns(true)
            .port_start(7000)
            .build();

        configure(&store, &cluster).unwrap();

        for node in 0..3 {
            let config = store.load_config(node).unwrap();
            assert!(config.bootstrap.is_empty());
            assert_eq!(config.addresses.gateway, "");
            assert!(config.discovery.mdns.enabled);
            assert_eq!(config.addresses.swarm, vec![cluster.swarm_addr(node)]);
        }
    }

    #[test]
    fn reconfiguring_is_byte_identical() {
        for bootstrap in [Bootstrap::Star, Bootstrap::None] {
            let tmp = tempfile::tempdir().unwrap();
            let store = NodeStore::new(tmp.path());
            seed(&store, 4);
            let cluster = ClusterConfig::builder()
                .count(4)
                .bootstrap(bootstrap)
                .build();

            configure(&store, &cluster).unwrap();
            let first = snapshot(&store, 4);
            configure(&store, &cluster).unwrap();
            let second = snapshot(&store, 4);

            assert_eq!(first, second, "{bootstrap} topology not idempotent");
        }
    }

    #[test]
    fn private_fields_are_preserved() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NodeStore::new(tmp.path());
        seed(&store, 2);
        let cluster = ClusterConfig::builder().count(2).build();

        configure(&store, &cluster).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.config_path(1)).unwrap())
                .unwrap();
        assert_eq!(raw["Identity"]["PrivKey"], "secret");
        assert_eq!(raw["Discovery"]["MDNS"]["Interval"], 10);
    }

    #[test]
    fn missing_node_config_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NodeStore::new(tmp.path());
        seed(&store, 2);
        std::fs::remove_file(store.config_path(1)).unwrap();
        let cluster = ClusterConfig::builder().count(2).build();

        let err = configure(&store, &cluster).unwrap_err();
        assert!(matches!(err, TestbedError::ConfigDocument { .. }));
    }
}
