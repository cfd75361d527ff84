//! Restart paths: loading, catching up and discarding snapshots

use std::sync::Arc;

use swarmnet_state::test_utils::{fakechain_config, TestChain};
use swarmnet_state::{
    Blockchain, FileStore, MemoryStore, ServiceNodeList, ServiceNodePubkeyInfo, ServiceNodeStore,
};

const REQUIREMENT: u64 = 100_000;

fn nodes_and_height(registry: &ServiceNodeList) -> (u64, Vec<ServiceNodePubkeyInfo>) {
    (registry.height(), registry.get_service_node_list_state(&[]))
}

fn populated_chain() -> TestChain {
    let chain = TestChain::new(fakechain_config(REQUIREMENT));
    chain.add_blocks(3);
    chain.add_funded_nodes(3);
    chain.add_blocks(2);
    chain
}

#[test]
fn test_restart_loads_stored_state() {
    let chain = populated_chain();
    chain.registry.store().unwrap();

    let restarted = TestChain::with_parts(chain.config.clone(), chain.ledger.clone(), chain.store.clone());
    assert_eq!(nodes_and_height(&restarted.registry), nodes_and_height(&chain.registry));
    let height = chain.height() - 1;
    assert_eq!(restarted.registry.get_quorum_state(height), chain.registry.get_quorum_state(height));
}

#[test]
fn test_restart_catches_up_from_older_snapshot() {
    let chain = populated_chain();
    chain.registry.store().unwrap();
    chain.add_funded_nodes(2);
    chain.add_blocks(3);

    let restarted = TestChain::with_parts(chain.config.clone(), chain.ledger.clone(), chain.store.clone());
    assert_eq!(nodes_and_height(&restarted.registry), nodes_and_height(&chain.registry));
}

#[test]
fn test_restart_ignores_corrupt_snapshot() {
    let chain = populated_chain();
    chain.store.store(b"not a snapshot").unwrap();

    let restarted = TestChain::with_parts(chain.config.clone(), chain.ledger.clone(), chain.store.clone());
    assert_eq!(nodes_and_height(&restarted.registry), nodes_and_height(&chain.registry));
}

#[test]
fn test_snapshot_ahead_of_chain_is_discarded() {
    let chain = populated_chain();
    chain.registry.store().unwrap();
    chain.ledger.pop_to(chain.height() - 3);

    let restarted = TestChain::with_parts(chain.config.clone(), chain.ledger.clone(), chain.store.clone());
    let fresh = TestChain::with_parts(chain.config.clone(), chain.ledger.clone(), Arc::new(MemoryStore::new()));
    assert_eq!(restarted.registry.height(), chain.ledger.height());
    assert_eq!(nodes_and_height(&restarted.registry), nodes_and_height(&fresh.registry));
}

#[test]
fn test_file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("service_nodes.bin");
    let chain = populated_chain();

    let first = ServiceNodeList::new(chain.config.clone(), chain.ledger.clone(), Arc::new(FileStore::new(&path)));
    first.init();
    assert!(path.exists());
    assert_eq!(nodes_and_height(&first), nodes_and_height(&chain.registry));

    let second = ServiceNodeList::new(chain.config.clone(), chain.ledger.clone(), Arc::new(FileStore::new(&path)));
    second.init();
    assert_eq!(nodes_and_height(&second), nodes_and_height(&chain.registry));
}
