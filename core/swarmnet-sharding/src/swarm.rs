//! Swarm rebalancing
//!
//! Nodes waiting for a swarm sit in the queue pseudo-swarm. Each time
//! membership changes the registry hands the whole map to
//! [`calc_swarm_changes`], which tops up undersized swarms, spreads the
//! queue over existing swarms and carves out new swarms once the queue is
//! large enough. All choices come from one generator seeded with the block
//! hash, so every node reaches the same assignment.

use std::collections::BTreeMap;

use swarmnet_core::constants::{MAX_SWARM_SIZE, MIN_SWARM_SIZE, QUEUE_SWARM_ID, SWARM_BUFFER};
use swarmnet_core::random::{shuffle_with, uniform_distribution_portable, Mt64};
use swarmnet_core::{PublicKey, SwarmId};
use tracing::{debug, trace, warn};

use crate::metrics;

/// Members of each swarm, the queue included under [`QUEUE_SWARM_ID`]
pub type SwarmMap = BTreeMap<SwarmId, Vec<PublicKey>>;

/// Rebalance `swarms` in place
pub fn calc_swarm_changes(swarms: &mut SwarmMap, seed: u64) {
    if swarms.is_empty() {
        return;
    }

    let mut mt = Mt64::new(seed);
    let mut queue = swarms.remove(&QUEUE_SWARM_ID).unwrap_or_default();

    trace!(swarms = swarms.len(), queued = queue.len(), "calc_swarm_changes");

    let mut ids: Vec<SwarmId> = swarms.keys().copied().collect();
    shuffle_with(&mut ids, &mut mt);

    fill_undersized(swarms, &ids, &mut queue);
    steal_for_undersized(swarms, &ids);
    fill_to_max(swarms, &ids, &mut queue);

    while queue.len() >= MAX_SWARM_SIZE + SWARM_BUFFER {
        create_new_swarm_from_queue(swarms, &mut queue, &mut mt);
    }

    for (id, members) in swarms.iter() {
        if members.len() < MIN_SWARM_SIZE {
            // Members stay where they are until enough nodes register
            warn!(swarm = id, size = members.len(), "swarm below minimum size, not decommissioned");
            metrics::record_undersized_swarm();
        }
    }

    metrics::update_swarm_counts(swarms.len(), queue.len());
    swarms.insert(QUEUE_SWARM_ID, queue);
}

fn fill_undersized(swarms: &mut SwarmMap, ids: &[SwarmId], queue: &mut Vec<PublicKey>) {
    for id in ids {
        let Some(swarm) = swarms.get_mut(id) else { continue };
        while swarm.len() < MIN_SWARM_SIZE {
            let Some(node) = queue.pop() else { return };
            swarm.push(node);
        }
    }
}

/// Index into `ids` of the largest swarm, earliest on ties
fn largest(swarms: &SwarmMap, ids: &[SwarmId]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, id) in ids.iter().enumerate() {
        let size = swarms.get(id).map_or(0, Vec::len);
        if best.map_or(true, |(_, best_size)| size > best_size) {
            best = Some((i, size));
        }
    }
    best.map(|(i, _)| i)
}

fn steal_for_undersized(swarms: &mut SwarmMap, ids: &[SwarmId]) {
    for id in ids {
        while swarms.get(id).map_or(false, |s| s.len() < MIN_SWARM_SIZE) {
            let Some(donor_index) = largest(swarms, ids) else { return };
            let donor_id = ids[donor_index];
            let Some(donor) = swarms.get_mut(&donor_id) else { return };
            if donor.len() <= MIN_SWARM_SIZE {
                return;
            }
            let Some(node) = donor.pop() else { return };
            debug!(from = donor_id, to = id, %node, "moving node into undersized swarm");
            if let Some(swarm) = swarms.get_mut(id) {
                swarm.push(node);
            }
        }
    }
}

fn fill_to_max(swarms: &mut SwarmMap, ids: &[SwarmId], queue: &mut Vec<PublicKey>) {
    while !queue.is_empty() {
        let smallest = ids
            .iter()
            .filter_map(|id| swarms.get(id).map(|s| (*id, s.len())))
            .filter(|&(_, size)| size < MAX_SWARM_SIZE)
            .fold(None, |best: Option<(SwarmId, usize)>, (id, size)| match best {
                Some((_, best_size)) if best_size <= size => best,
                _ => Some((id, size)),
            });
        let Some((id, _)) = smallest else { return };
        let Some(node) = queue.pop() else { return };
        if let Some(swarm) = swarms.get_mut(&id) {
            swarm.push(node);
        }
    }
}

fn new_swarm_id(swarms: &SwarmMap, mt: &mut Mt64) -> SwarmId {
    loop {
        let id = uniform_distribution_portable(mt, u64::MAX);
        if id != QUEUE_SWARM_ID && !swarms.contains_key(&id) {
            return id;
        }
    }
}

/// Each queued node displaces a random member of an existing swarm, and the
/// displaced members form the new swarm
fn create_new_swarm_from_queue(swarms: &mut SwarmMap, queue: &mut Vec<PublicKey>, mt: &mut Mt64) {
    let new_id = new_swarm_id(swarms, mt);
    shuffle_with(queue, mt);

    let mut new_swarm = Vec::with_capacity(MAX_SWARM_SIZE);
    for _ in 0..MAX_SWARM_SIZE {
        let Some(node) = queue.pop() else { break };
        if swarms.is_empty() {
            new_swarm.push(node);
            continue;
        }
        let swarm_index = uniform_distribution_portable(mt, swarms.len() as u64) as usize;
        let Some(swarm) = swarms.values_mut().nth(swarm_index) else {
            new_swarm.push(node);
            continue;
        };
        if swarm.is_empty() {
            new_swarm.push(node);
            continue;
        }
        let member_index = uniform_distribution_portable(mt, swarm.len() as u64) as usize;
        new_swarm.push(std::mem::replace(&mut swarm[member_index], node));
    }

    debug!(swarm = new_id, size = new_swarm.len(), "created new swarm");
    metrics::record_swarm_created();
    swarms.insert(new_id, new_swarm);
}
