//! Registry metrics

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge_vec, CounterVec, GaugeVec};

lazy_static! {
    /// Forced rebuilds of the registry, by cause
    pub static ref REGISTRY_REBUILDS: CounterVec = register_counter_vec!(
        "swarmnet_registry_rebuilds_total",
        "Total number of registry rebuilds from a chain rescan",
        &["cause"]
    ).unwrap();

    /// Rollback events undone during detaches
    pub static ref ROLLBACK_EVENTS: CounterVec = register_counter_vec!(
        "swarmnet_rollback_events_applied_total",
        "Total number of rollback events undone",
        &["kind"]
    ).unwrap();

    /// Service node transactions skipped
    pub static ref SKIPPED_TXS: CounterVec = register_counter_vec!(
        "swarmnet_skipped_service_node_txs_total",
        "Total number of service node transactions rejected by the registry",
        &["kind"]
    ).unwrap();

    /// Registered service nodes
    pub static ref SERVICE_NODES: GaugeVec = register_gauge_vec!(
        "swarmnet_service_nodes",
        "Registered service nodes",
        &["state"]
    ).unwrap();
}

pub fn record_rebuild(cause: &str) {
    REGISTRY_REBUILDS.with_label_values(&[cause]).inc();
}

pub fn record_rollback(kind: &str) {
    ROLLBACK_EVENTS.with_label_values(&[kind]).inc();
}

pub fn record_skipped_tx(kind: &str) {
    SKIPPED_TXS.with_label_values(&[kind]).inc();
}

pub fn update_service_nodes(total: usize, funded: usize) {
    SERVICE_NODES.with_label_values(&["registered"]).set(total as f64);
    SERVICE_NODES.with_label_values(&["fully_funded"]).set(funded as f64);
}
