//! Network selection, hard fork schedule and staking parameters

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{hf, COIN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Stagenet,
    /// Local chains used by tests; staking values are configurable
    Fakechain,
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "stagenet" => Ok(Self::Stagenet),
            "fakechain" => Ok(Self::Fakechain),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

/// Activation heights of hard fork versions, ascending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardForkSchedule {
    forks: Vec<(u8, u64)>,
}

impl HardForkSchedule {
    pub fn new(mut forks: Vec<(u8, u64)>) -> Self {
        forks.sort_by_key(|&(version, height)| (height, version));
        Self { forks }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::new(vec![
                (hf::BASE, 1),
                (hf::SERVICE_NODES, 64_324),
                (hf::SWARMS, 101_250),
                (hf::INFINITE_STAKING, 161_849),
            ]),
            Network::Testnet => Self::new(vec![
                (hf::BASE, 1),
                (hf::SERVICE_NODES, 2),
                (hf::SWARMS, 3),
                (hf::INFINITE_STAKING, 4),
            ]),
            Network::Stagenet => Self::new(vec![
                (hf::BASE, 1),
                (hf::SERVICE_NODES, 64),
                (hf::SWARMS, 96),
                (hf::INFINITE_STAKING, 128),
            ]),
            Network::Fakechain => Self::new(vec![
                (hf::BASE, 0),
                (hf::SERVICE_NODES, 1),
                (hf::SWARMS, 2),
                (hf::INFINITE_STAKING, 3),
            ]),
        }
    }

    /// Version in force at `height`
    pub fn version_at(&self, height: u64) -> u8 {
        self.forks
            .iter()
            .take_while(|&&(_, fork_height)| fork_height <= height)
            .map(|&(version, _)| version)
            .last()
            .unwrap_or(hf::BASE)
    }

    /// Activation height of `version`, if it is scheduled
    pub fn height_of(&self, version: u8) -> Option<u64> {
        self.forks.iter().find(|&&(v, _)| v == version).map(|&(_, height)| height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub network: Network,
    pub hard_forks: HardForkSchedule,
    /// Flat staking requirement on fakechain, in atomic units
    pub fakechain_staking_requirement: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let network = std::env::var("SWARMNET_NETWORK")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Network::Mainnet);

        let fakechain_staking_requirement = std::env::var("SWARMNET_FAKECHAIN_STAKING_REQUIREMENT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100_000);

        Self {
            network,
            hard_forks: HardForkSchedule::for_network(network),
            fakechain_staking_requirement,
        }
    }
}

const STAKING_HALF_LIFE_BLOCKS: u64 = 129_600;
const LINEAR_GROWTH_CAP_HEIGHT: u64 = 3_628_800;

impl NetworkConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            hard_forks: HardForkSchedule::for_network(network),
            fakechain_staking_requirement: 100_000,
        }
    }

    /// Fakechain with an explicit fork schedule
    pub fn fakechain(hard_forks: Vec<(u8, u64)>, staking_requirement: u64) -> Self {
        Self {
            network: Network::Fakechain,
            hard_forks: HardForkSchedule::new(hard_forks),
            fakechain_staking_requirement: staking_requirement,
        }
    }

    pub fn hard_fork_version(&self, height: u64) -> u8 {
        self.hard_forks.version_at(height)
    }

    /// First height at which service nodes exist
    pub fn service_node_fork_height(&self) -> u64 {
        self.hard_forks.height_of(hf::SERVICE_NODES).unwrap_or(0)
    }

    /// Blocks a stake stays locked before a legacy node expires
    pub fn staking_lock_blocks(&self) -> u64 {
        match self.network {
            Network::Mainnet => 30 * 24 * 60 * 60 / crate::constants::TARGET_BLOCK_TIME,
            Network::Testnet | Network::Stagenet => 2 * 24 * 60 * 60 / crate::constants::TARGET_BLOCK_TIME,
            Network::Fakechain => 30,
        }
    }

    /// Amount a node must stake when registering at `height`
    pub fn staking_requirement(&self, height: u64) -> u64 {
        match self.network {
            Network::Fakechain => self.fakechain_staking_requirement,
            Network::Testnet | Network::Stagenet => 100 * COIN,
            Network::Mainnet => {
                let adjusted = height.saturating_sub(self.service_node_fork_height());
                let decaying = 10_000 * COIN + halve(35_000 * COIN, adjusted, STAKING_HALF_LIFE_BLOCKS);
                let linear = if height < LINEAR_GROWTH_CAP_HEIGHT {
                    (5 * u128::from(COIN) * u128::from(height) / 2592) as u64 + 8_000 * COIN
                } else {
                    15_000 * COIN
                };
                decaying.max(linear)
            }
        }
    }
}

/// `amount / 2^(elapsed / half_life)`, interpolated linearly inside each
/// half-life interval
fn halve(amount: u64, elapsed: u64, half_life: u64) -> u64 {
    let halvings = elapsed / half_life;
    if halvings >= 64 {
        return 0;
    }
    let start = amount >> halvings;
    let progress = elapsed % half_life;
    let drop = u128::from(start / 2) * u128::from(progress) / u128::from(half_life);
    start - drop as u64
}
