//! Metrics collection for the quorum cop

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, CounterVec, Gauge};

lazy_static! {
    /// Uptime proofs received, by result
    pub static ref UPTIME_PROOFS: CounterVec = register_counter_vec!(
        "swarmnet_uptime_proofs_total",
        "Total number of uptime proofs received",
        &["result"]
    ).unwrap();

    /// Deregistration votes seen by the pool, by result
    pub static ref DEREGISTER_VOTES: CounterVec = register_counter_vec!(
        "swarmnet_deregister_votes_total",
        "Total number of deregistration votes handled",
        &["result"]
    ).unwrap();

    /// Votes cast by the local node
    pub static ref VOTES_CAST: CounterVec = register_counter_vec!(
        "swarmnet_deregister_votes_cast_total",
        "Total number of deregistration votes cast by this node",
        &["result"]
    ).unwrap();

    /// Nodes with a live uptime proof
    pub static ref LIVENESS_ENTRIES: Gauge = register_gauge!(
        "swarmnet_liveness_entries",
        "Service nodes with a recent uptime proof"
    ).unwrap();
}

pub fn record_uptime_proof(result: &str) {
    UPTIME_PROOFS.with_label_values(&[result]).inc();
}

pub fn record_pool_vote(result: &str) {
    DEREGISTER_VOTES.with_label_values(&[result]).inc();
}

pub fn record_vote_cast(result: &str) {
    VOTES_CAST.with_label_values(&[result]).inc();
}

pub fn update_liveness_entries(count: usize) {
    LIVENESS_ENTRIES.set(count as f64);
}
