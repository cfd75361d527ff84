//! Swarm metrics

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge_vec, CounterVec, GaugeVec};

lazy_static! {
    /// Swarm lifecycle events
    pub static ref SWARM_EVENTS: CounterVec = register_counter_vec!(
        "swarmnet_swarm_events_total",
        "Swarm creation and undersize events",
        &["event"]
    ).unwrap();

    /// Current swarm layout
    pub static ref SWARM_COUNTS: GaugeVec = register_gauge_vec!(
        "swarmnet_swarms",
        "Number of swarms and queued nodes after the last rebalance",
        &["kind"]
    ).unwrap();
}

pub fn record_swarm_created() {
    SWARM_EVENTS.with_label_values(&["created"]).inc();
}

pub fn record_undersized_swarm() {
    SWARM_EVENTS.with_label_values(&["undersized"]).inc();
}

pub fn update_swarm_counts(swarms: usize, queued: usize) {
    SWARM_COUNTS.with_label_values(&["swarms"]).set(swarms as f64);
    SWARM_COUNTS.with_label_values(&["queued"]).set(queued as f64);
}
