//! Delinquency sweep end to end: cops vote, the pool aggregates and the
//! registry drops the node once the deregistration is mined

use std::sync::Arc;

use swarmnet_consensus::{
    generate_uptime_proof, unix_now, verify_deregister, LivenessTable, NewDeregisterVote, QuorumCop,
    QuorumCopConfig, VotePoolSink,
};
use swarmnet_core::constants::REORG_SAFETY_BUFFER_IN_BLOCKS;
use swarmnet_core::{PublicKey, Transaction};
use swarmnet_state::test_utils::{fakechain_config, ServiceNodeKeys, TestChain};

const REQUIREMENT: u64 = 100_000;
const NODES: usize = 12;

struct Network {
    chain: TestChain,
    config: QuorumCopConfig,
    liveness: Arc<LivenessTable>,
    sink: Arc<VotePoolSink>,
    cops: Vec<Arc<QuorumCop>>,
    nodes: Vec<ServiceNodeKeys>,
}

impl Network {
    /// Registered nodes, each running a cop that shares one liveness table
    fn new() -> Self {
        let chain = TestChain::new(fakechain_config(REQUIREMENT));
        chain.add_blocks(3);
        let nodes: Vec<ServiceNodeKeys> = chain.add_funded_nodes(NODES).into_iter().map(|(keys, _)| keys).collect();

        let config = QuorumCopConfig { min_time_before_voting: 0, vote_relay_interval: 60, ..Default::default() };
        let liveness = Arc::new(LivenessTable::new());
        let sink = Arc::new(VotePoolSink::new(chain.registry.clone(), &config));
        chain.add_block_hook(sink.clone());

        let cops = nodes
            .iter()
            .map(|keys| {
                let cop = Arc::new(QuorumCop::new(
                    config.clone(),
                    chain.registry.clone(),
                    liveness.clone(),
                    sink.clone(),
                ));
                cop.set_service_node_keys(Some((keys.pubkey, keys.secret)));
                chain.add_block_hook(cop.clone());
                chain.add_detach_hook(cop.clone());
                cop
            })
            .collect();

        Self { chain, config, liveness, sink, cops, nodes }
    }

    fn prove_alive(&self, except: Option<&PublicKey>) {
        let now = unix_now();
        for keys in self.nodes.iter().filter(|keys| Some(&keys.pubkey) != except) {
            let proof = generate_uptime_proof(&keys.pubkey, &keys.secret, now, [0, 1, 0]).unwrap();
            self.liveness.handle_uptime_proof(&proof, &self.chain.registry, now).unwrap();
        }
    }

    /// Mine empty blocks until a deregistration is ready or `limit` is hit
    fn mine_until_ready(&self, limit: usize) -> Vec<Transaction> {
        for _ in 0..limit {
            self.chain.add_block(Vec::new());
            let ready = self.sink.take_ready_transactions();
            if !ready.is_empty() {
                return ready;
            }
        }
        Vec::new()
    }
}

#[test]
fn test_unresponsive_node_is_voted_off() {
    let network = Network::new();
    let target = network.nodes[0].pubkey;
    network.prove_alive(Some(&target));

    let ready = network.mine_until_ready(200);
    assert!(!ready.is_empty(), "no deregistration reached the vote threshold");

    for tx in &ready {
        let extra = tx.parse_extra().unwrap();
        let deregister = extra.service_node_deregister().unwrap();
        let quorum = network.chain.registry.get_quorum_state(deregister.block_height).unwrap();
        assert_eq!(quorum.nodes_to_test[deregister.service_node_index as usize], target);
        assert_eq!(verify_deregister(deregister, &quorum), Ok(()));
    }

    network.chain.add_block(ready);
    assert!(!network.chain.registry.is_service_node(&target));
    for keys in &network.nodes[1..] {
        assert!(network.chain.registry.is_service_node(&keys.pubkey));
    }
}

#[test]
fn test_live_nodes_are_left_alone() {
    let network = Network::new();
    network.prove_alive(None);

    assert!(network.mine_until_ready(90).is_empty());
    assert!(network.sink.pool().is_empty());
    assert_eq!(network.chain.registry.service_node_pubkeys().len(), NODES);
}

#[test]
fn test_cop_without_keys_does_not_vote() {
    let network = Network::new();
    for cop in &network.cops {
        cop.set_service_node_keys(None);
    }

    assert!(network.mine_until_ready(90).is_empty());
    assert!(network.sink.pool().is_empty());
    assert!(network.cops.iter().all(|cop| cop.last_height() == 0));
}

#[test]
fn test_detach_rewinds_cursor_only_past_safety_buffer() {
    let network = Network::new();
    network.prove_alive(None);
    while network.chain.height() < 80 {
        network.chain.add_block(Vec::new());
    }

    let cop = &network.cops[0];
    let processed = cop.last_height();
    assert_eq!(processed + REORG_SAFETY_BUFFER_IN_BLOCKS, network.chain.height() - 1);

    // Shallow reorgs never reach examined heights
    network.chain.pop_blocks(5);
    assert_eq!(cop.last_height(), processed);

    let detach_to = processed - 3;
    network.chain.pop_blocks(network.chain.height() - detach_to);
    assert_eq!(cop.last_height(), detach_to);
}

#[test]
fn test_votes_relay_to_peer_pool() {
    let network = Network::new();
    let target = network.nodes[0].pubkey;
    network.prove_alive(Some(&target));
    assert!(!network.mine_until_ready(200).is_empty());

    let now = unix_now();
    let message = network.sink.relayable_votes(now).unwrap();
    assert!(message.votes.len() >= 7);
    // Relayed votes wait out the interval before going out again
    assert!(network.sink.relayable_votes(now + network.config.vote_relay_interval - 1).is_none());
    assert!(network.sink.relayable_votes(now + network.config.vote_relay_interval).is_some());

    let peer = VotePoolSink::new(network.chain.registry.clone(), &network.config);
    let received = NewDeregisterVote::from_bytes(&message.to_bytes().unwrap()).unwrap();
    assert_eq!(peer.handle_new_deregister_vote(&received), received.votes.len());
    assert_eq!(peer.pool().len(), received.votes.len());

    let ready = peer.take_ready_transactions();
    assert!(!ready.is_empty());
    network.chain.add_block(ready);
    assert!(!network.chain.registry.is_service_node(&target));

    // Votes for an unknown quorum height are refused
    let mut stale = received.votes[0];
    stale.block_height = network.chain.height() + 100;
    assert_eq!(peer.handle_new_deregister_vote(&NewDeregisterVote { votes: vec![stale] }), 0);
}
