//! Swarm partitioning for swarmnet service nodes

pub mod metrics;
pub mod swarm;

pub use swarm::{calc_swarm_changes, SwarmMap};
