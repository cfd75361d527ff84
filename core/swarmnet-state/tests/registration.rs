//! Registration, funding and reward selection through the block hooks

use proptest::prelude::*;
use swarmnet_core::constants::STAKING_PORTIONS;
use swarmnet_core::{BlockRewardParts, Hash, PublicKey};
use swarmnet_state::test_utils::{
    contribution_tx, fakechain_config, miner_tx, registration_tx, solo_registration_tx, ServiceNodeKeys,
    TestChain, Wallet, SERVICE_NODE_REWARD,
};
use swarmnet_state::{KeyImageLock, NodeVersion};

const REQUIREMENT: u64 = 100_000;

fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(16);
    ProptestConfig::with_cases(cases)
}

/// Chain whose next block is under infinite staking
fn infinite_staking_chain() -> TestChain {
    let chain = TestChain::new(fakechain_config(REQUIREMENT));
    chain.add_blocks(3);
    chain
}

#[test]
fn test_full_stake_registration_becomes_validator() {
    let chain = infinite_staking_chain();
    let (keys, operator, registration) = chain.solo_registration();
    let registered_at = chain.height();
    chain.add_block(vec![registration.tx.clone()]);

    let info = chain.registry.get_service_node(&keys.pubkey).unwrap();
    assert!(info.is_fully_funded());
    assert_eq!(info.version, NodeVersion::V2InfiniteStaking);
    assert_eq!(info.registration_height, registered_at);
    assert_eq!(info.total_contributed, REQUIREMENT);
    assert_eq!(info.operator_address, operator.address);
    assert_eq!(info.contributors.len(), 1);
    assert_eq!(info.contributors[0].locked_contributions.len(), 1);
    assert_eq!(info.requested_unlock_height, None);

    let quorum = chain.registry.get_quorum_state(registered_at).unwrap();
    assert_eq!(quorum.quorum_nodes, vec![keys.pubkey]);
    assert!(quorum.nodes_to_test.is_empty());
    assert_eq!(chain.registry.select_winner(), keys.pubkey);

    assert_eq!(
        chain.registry.is_key_image_locked(&registration.stake.key_image),
        Some(KeyImageLock::Staked { service_node: keys.pubkey, unlock_height: None })
    );

    // Paid in the next block, which moves it to the back of the queue
    chain.add_block(Vec::new());
    let info = chain.registry.get_service_node(&keys.pubkey).unwrap();
    assert_eq!(info.last_reward_block_height, registered_at + 1);
    assert_eq!(info.last_reward_transaction_index, u32::MAX);
}

#[test]
fn test_shared_node_funded_by_reserved_contributors() {
    let chain = infinite_staking_chain();
    let keys = ServiceNodeKeys::generate();
    let operator = Wallet::generate();
    let partner = Wallet::generate();
    let half = STAKING_PORTIONS / 2;

    let registration = registration_tx(
        chain.next_hf_version(),
        &keys,
        &operator,
        &[(operator.address, half), (partner.address, half)],
        STAKING_PORTIONS / 10,
        chain.next_timestamp() + 3_600,
        REQUIREMENT / 2,
    );
    chain.add_block(vec![registration.tx]);

    let info = chain.registry.get_service_node(&keys.pubkey).unwrap();
    assert!(!info.is_fully_funded());
    assert_eq!(info.total_reserved, REQUIREMENT);
    assert_eq!(info.total_contributed, REQUIREMENT / 2);
    assert!(chain.registry.service_node_pubkeys().is_empty());
    assert!(chain.registry.select_winner().is_null());

    let contribution = contribution_tx(chain.next_hf_version(), &keys.pubkey, &partner, REQUIREMENT / 2);
    chain.add_block(vec![contribution.tx]);

    let info = chain.registry.get_service_node(&keys.pubkey).unwrap();
    assert!(info.is_fully_funded());
    assert_eq!(info.contributor(&partner.address).unwrap().amount, REQUIREMENT / 2);
    assert_eq!(chain.registry.service_node_pubkeys(), vec![keys.pubkey]);

    // Operator cut plus half of the rest, partner gets the other half
    let payouts = chain.registry.get_winner_addresses_and_portions(&keys.pubkey);
    let remaining = STAKING_PORTIONS - STAKING_PORTIONS / 10;
    assert_eq!(payouts.len(), 2);
    assert_eq!(payouts[0], (operator.address, remaining / 2 + STAKING_PORTIONS / 10));
    assert_eq!(payouts[1], (partner.address, remaining / 2));
}

#[test]
fn test_unreserved_contribution_is_clamped_to_requirement() {
    let chain = infinite_staking_chain();
    let keys = ServiceNodeKeys::generate();
    let operator = Wallet::generate();
    let registration = registration_tx(
        chain.next_hf_version(),
        &keys,
        &operator,
        &[(operator.address, STAKING_PORTIONS / 2)],
        STAKING_PORTIONS,
        chain.next_timestamp() + 3_600,
        REQUIREMENT / 2,
    );
    chain.add_block(vec![registration.tx]);

    let stranger = Wallet::generate();
    let contribution = contribution_tx(chain.next_hf_version(), &keys.pubkey, &stranger, 80_000);
    chain.add_block(vec![contribution.tx]);

    let info = chain.registry.get_service_node(&keys.pubkey).unwrap();
    let contributor = info.contributor(&stranger.address).unwrap();
    assert_eq!(contributor.amount, REQUIREMENT / 2);
    assert_eq!(contributor.reserved, REQUIREMENT / 2);
    assert_eq!(info.total_contributed, REQUIREMENT);
    assert_eq!(info.total_reserved, REQUIREMENT);

    // Nothing more is accepted once funded
    let late = contribution_tx(chain.next_hf_version(), &keys.pubkey, &Wallet::generate(), 30_000);
    chain.add_block(vec![late.tx]);
    let after = chain.registry.get_service_node(&keys.pubkey).unwrap();
    assert_eq!(after.contributors.len(), 2);
    assert_eq!(after.total_contributed, REQUIREMENT);
}

#[test]
fn test_invalid_registrations_are_skipped() {
    let chain = infinite_staking_chain();
    let hf_version = chain.next_hf_version();
    let now = chain.next_timestamp();

    let expired_keys = ServiceNodeKeys::generate();
    let expired = solo_registration_tx(hf_version, &expired_keys, &Wallet::generate(), now - 1, REQUIREMENT);

    let forged_keys = ServiceNodeKeys {
        pubkey: ServiceNodeKeys::generate().pubkey,
        secret: ServiceNodeKeys::generate().secret,
    };
    let forged = solo_registration_tx(hf_version, &forged_keys, &Wallet::generate(), now + 3_600, REQUIREMENT);

    let short_keys = ServiceNodeKeys::generate();
    let short = solo_registration_tx(hf_version, &short_keys, &Wallet::generate(), now + 3_600, REQUIREMENT / 5);

    chain.add_block(vec![expired.tx, forged.tx, short.tx]);

    assert!(!chain.registry.is_service_node(&expired_keys.pubkey));
    assert!(!chain.registry.is_service_node(&forged_keys.pubkey));
    assert!(!chain.registry.is_service_node(&short_keys.pubkey));
    assert!(chain.registry.get_service_node_list_state(&[]).is_empty());
}

#[test]
fn test_duplicate_registration_rejected_under_infinite_staking() {
    let chain = infinite_staking_chain();
    let (keys, operator, registration) = chain.solo_registration();
    chain.add_block(vec![registration.tx]);
    let original = chain.registry.get_service_node(&keys.pubkey).unwrap();

    let again = solo_registration_tx(
        chain.next_hf_version(),
        &keys,
        &operator,
        chain.next_timestamp() + 3_600,
        REQUIREMENT,
    );
    chain.add_block(vec![again.tx]);

    let info = chain.registry.get_service_node(&keys.pubkey).unwrap();
    assert_eq!(info.registration_height, original.registration_height);
    assert_eq!(info.contributors, original.contributors);
}

#[test]
fn test_list_state_filters_by_key() {
    let chain = infinite_staking_chain();
    let nodes = chain.add_funded_nodes(3);

    assert_eq!(chain.registry.get_service_node_list_state(&[]).len(), 3);
    let wanted = [nodes[1].0.pubkey, PublicKey([7; 32])];
    let state = chain.registry.get_service_node_list_state(&wanted);
    assert_eq!(state.len(), 1);
    assert_eq!(state[0].pubkey, nodes[1].0.pubkey);
}

#[test]
fn test_validate_miner_tx() {
    let chain = infinite_staking_chain();
    chain.add_funded_nodes(2);

    let height = chain.height();
    let hf_version = chain.next_hf_version();
    let parts = BlockRewardParts { service_node_total: SERVICE_NODE_REWARD };
    let winner = chain.registry.select_winner();
    let payouts = chain.registry.get_winner_addresses_and_portions(&winner);

    let good = miner_tx(height, &winner, &payouts, SERVICE_NODE_REWARD);
    assert!(chain.registry.validate_miner_tx(&Hash::null(), &good, height, hf_version, &parts));

    let others: Vec<PublicKey> = chain
        .registry
        .service_node_pubkeys()
        .into_iter()
        .filter(|key| *key != winner)
        .collect();
    let wrong_winner = miner_tx(height, &others[0], &payouts, SERVICE_NODE_REWARD);
    assert!(!chain.registry.validate_miner_tx(&Hash::null(), &wrong_winner, height, hf_version, &parts));

    let mut wrong_amount = good.clone();
    wrong_amount.outputs[1].amount -= 1;
    assert!(!chain.registry.validate_miner_tx(&Hash::null(), &wrong_amount, height, hf_version, &parts));

    let mut wrong_key = good.clone();
    wrong_key.outputs[1].key = PublicKey([3; 32]);
    assert!(!chain.registry.validate_miner_tx(&Hash::null(), &wrong_key, height, hf_version, &parts));

    let mut missing_output = good.clone();
    missing_output.outputs.truncate(1);
    assert!(!chain.registry.validate_miner_tx(&Hash::null(), &missing_output, height, hf_version, &parts));

    // Pre service node blocks are never checked
    assert!(chain.registry.validate_miner_tx(&Hash::null(), &wrong_winner, height, 7, &parts));
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn test_contributions_never_exceed_requirement(amounts in prop::collection::vec(1u64..150_000, 1..4)) {
        let chain = infinite_staking_chain();
        let keys = ServiceNodeKeys::generate();
        let operator = Wallet::generate();
        let registration = registration_tx(
            chain.next_hf_version(),
            &keys,
            &operator,
            &[(operator.address, STAKING_PORTIONS / 4)],
            STAKING_PORTIONS,
            chain.next_timestamp() + 3_600,
            REQUIREMENT / 4,
        );
        chain.add_block(vec![registration.tx]);

        for amount in amounts {
            let contribution = contribution_tx(chain.next_hf_version(), &keys.pubkey, &Wallet::generate(), amount);
            chain.add_block(vec![contribution.tx]);

            let info = chain.registry.get_service_node(&keys.pubkey).unwrap();
            prop_assert!(info.total_contributed <= info.staking_requirement);
            prop_assert!(info.total_reserved <= info.staking_requirement);
            let sum: u64 = info.contributors.iter().map(|c| c.amount).sum();
            prop_assert_eq!(sum, info.total_contributed);
            for contributor in &info.contributors {
                prop_assert!(contributor.amount <= contributor.reserved);
            }
        }
    }
}
