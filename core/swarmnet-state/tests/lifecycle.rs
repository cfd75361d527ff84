//! Deregistration, stake unlocks and expiry

use swarmnet_core::constants::hf;
use swarmnet_core::crypto::generate_keys;
use swarmnet_core::{NetworkConfig, ServiceNodeDeregister};
use swarmnet_state::test_utils::{
    deregister_tx, fakechain_config, solo_registration_tx, unlock_tx, TestChain,
};
use swarmnet_state::{KeyImageBlacklistEntry, KeyImageLock, RegistryConfig};

const REQUIREMENT: u64 = 100_000;
const LOCK_BLOCKS: u64 = 30;

fn add_blocks_until(chain: &TestChain, height: u64) {
    while chain.height() < height {
        chain.add_block(Vec::new());
    }
}

#[test]
fn test_deregistration_blacklists_locked_key_images() {
    let chain = TestChain::new(fakechain_config(REQUIREMENT));
    chain.add_blocks(3);
    let quorum_height = chain.height();
    let nodes = chain.add_funded_nodes(12);

    let quorum = chain.registry.get_quorum_state(quorum_height).unwrap();
    assert_eq!(quorum.quorum_nodes.len(), 10);
    assert_eq!(quorum.nodes_to_test.len(), 2);

    let target = quorum.nodes_to_test[0];
    let stake = nodes
        .iter()
        .find(|(keys, _)| keys.pubkey == target)
        .map(|(_, tx)| tx.stake.clone())
        .unwrap();

    // Out of range and unknown-height deregistrations change nothing
    let out_of_range = ServiceNodeDeregister { block_height: quorum_height, service_node_index: 2, votes: Vec::new() };
    let no_quorum = ServiceNodeDeregister { block_height: 1_000, service_node_index: 0, votes: Vec::new() };
    chain.add_block(vec![deregister_tx(out_of_range), deregister_tx(no_quorum)]);
    assert_eq!(chain.registry.get_service_node_list_state(&[]).len(), 12);

    let deregistered_at = chain.height();
    let deregister = ServiceNodeDeregister { block_height: quorum_height, service_node_index: 0, votes: Vec::new() };
    chain.add_block(vec![deregister_tx(deregister)]);

    assert!(!chain.registry.is_service_node(&target));
    let unlock_height = deregistered_at + LOCK_BLOCKS;
    assert_eq!(
        chain.registry.blacklisted_key_images(),
        vec![KeyImageBlacklistEntry { key_image: stake.key_image, unlock_height }]
    );
    assert_eq!(
        chain.registry.is_key_image_locked(&stake.key_image),
        Some(KeyImageLock::Blacklisted { unlock_height })
    );

    add_blocks_until(&chain, unlock_height);
    assert_eq!(chain.registry.blacklisted_key_images().len(), 1);

    chain.add_block(Vec::new());
    assert!(chain.registry.blacklisted_key_images().is_empty());
    assert_eq!(chain.registry.is_key_image_locked(&stake.key_image), None);

    // Undoing the expiry brings the entry back
    chain.pop_blocks(1);
    assert_eq!(chain.registry.blacklisted_key_images().len(), 1);
}

#[test]
fn test_unlock_request_expires_node() {
    let chain = TestChain::new(fakechain_config(REQUIREMENT));
    chain.add_blocks(3);
    let (keys, _, registration) = chain.solo_registration();
    chain.add_block(vec![registration.tx.clone()]);
    let stake = registration.stake;

    // Signed with the wrong key
    let mut forged = stake.clone();
    forged.output_secret = generate_keys().1;
    chain.add_block(vec![unlock_tx(&keys.pubkey, &forged, 1)]);
    assert_eq!(chain.registry.get_service_node(&keys.pubkey).unwrap().requested_unlock_height, None);

    let requested_at = chain.height();
    chain.add_block(vec![unlock_tx(&keys.pubkey, &stake, 2)]);
    let unlock_height = requested_at + LOCK_BLOCKS / 2;
    let info = chain.registry.get_service_node(&keys.pubkey).unwrap();
    assert_eq!(info.requested_unlock_height, Some(unlock_height));
    assert_eq!(
        chain.registry.is_key_image_locked(&stake.key_image),
        Some(KeyImageLock::Staked { service_node: keys.pubkey, unlock_height: Some(unlock_height) })
    );

    // A second request does not move the unlock height
    chain.add_block(vec![unlock_tx(&keys.pubkey, &stake, 3)]);
    let info = chain.registry.get_service_node(&keys.pubkey).unwrap();
    assert_eq!(info.requested_unlock_height, Some(unlock_height));

    add_blocks_until(&chain, unlock_height + 1);
    assert!(chain.registry.is_service_node(&keys.pubkey));

    chain.add_block(Vec::new());
    assert!(!chain.registry.is_service_node(&keys.pubkey));
    assert_eq!(chain.registry.is_key_image_locked(&stake.key_image), None);
    assert!(chain.registry.blacklisted_key_images().is_empty());

    chain.pop_blocks(1);
    let info = chain.registry.get_service_node(&keys.pubkey).unwrap();
    assert_eq!(info.requested_unlock_height, Some(unlock_height));

    chain.pop_blocks(chain.height() - requested_at);
    let info = chain.registry.get_service_node(&keys.pubkey).unwrap();
    assert_eq!(info.requested_unlock_height, None);
}

fn legacy_config() -> RegistryConfig {
    RegistryConfig::new(NetworkConfig::fakechain(
        vec![(hf::BASE, 0), (hf::SERVICE_NODES, 1), (hf::SWARMS, 2)],
        REQUIREMENT,
    ))
}

#[test]
fn test_legacy_stake_expires_after_lock_and_grace() {
    let chain = TestChain::new(legacy_config());
    chain.add_blocks(1);
    let registered_at = chain.height();
    let (keys, _, registration) = chain.solo_registration();
    chain.add_block(vec![registration.tx]);

    let expiry = registered_at + LOCK_BLOCKS + 20;
    add_blocks_until(&chain, expiry);
    assert!(chain.registry.is_service_node(&keys.pubkey));

    chain.add_block(Vec::new());
    assert!(!chain.registry.is_service_node(&keys.pubkey));
}

#[test]
fn test_legacy_reregistration_in_grace_window() {
    let chain = TestChain::new(legacy_config());
    chain.add_blocks(1);
    let registered_at = chain.height();
    let (keys, operator, registration) = chain.solo_registration();
    chain.add_block(vec![registration.tx]);

    let reregister = |chain: &TestChain| {
        let tx = solo_registration_tx(
            chain.next_hf_version(),
            &keys,
            &operator,
            chain.next_timestamp() + 3_600,
            REQUIREMENT,
        );
        chain.add_block(vec![tx.tx]);
    };

    // Stake still locked
    add_blocks_until(&chain, registered_at + LOCK_BLOCKS - 1);
    reregister(&chain);
    assert_eq!(chain.registry.get_service_node(&keys.pubkey).unwrap().registration_height, registered_at);

    let reregistered_at = chain.height();
    reregister(&chain);
    assert_eq!(
        chain.registry.get_service_node(&keys.pubkey).unwrap().registration_height,
        reregistered_at
    );

    add_blocks_until(&chain, registered_at + LOCK_BLOCKS + 25);
    assert!(chain.registry.is_service_node(&keys.pubkey));
}
