//! Staking transaction builders and an in-memory chain for tests
//!
//! [`TestChain`] plays the ledger: it mines blocks paying whichever node
//! the registry selects, drives the hooks in order and pops blocks for
//! reorgs.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use swarmnet_core::constants::{hf, COIN, STAKING_PORTIONS, TARGET_BLOCK_TIME};
use swarmnet_core::crypto::{
    derivation_to_scalar, deterministic_keypair_from_height, derive_public_key, derive_secret_key,
    generate_key_derivation, generate_key_image, generate_key_image_signature, generate_keys,
    generate_signature,
};
use swarmnet_core::{
    AccountAddress, Block, BlockAddedHook, BlockHeader, BlockchainDetachedHook, Hash, KeyImage,
    KeyImageProof, KeyImageUnlock, NetworkConfig, PublicKey, SecretKey, ServiceNodeDeregister,
    ServiceNodeRegister, Transaction, TxExtra, TxExtraField, TxIn, TxOut, TxType,
};

use crate::config::RegistryConfig;
use crate::errors::StateResult;
use crate::ledger::Blockchain;
use crate::persistence::MemoryStore;
use crate::registry::ServiceNodeList;
use crate::rules::get_registration_hash;

pub const GENESIS_TIMESTAMP: u64 = 1_600_000_000;

/// Reward the test miner hands to service nodes per block
pub const SERVICE_NODE_REWARD: u64 = 50 * COIN;

/// Fakechain with service nodes at 1, swarms at 2 and infinite staking at 3
pub fn fakechain_config(staking_requirement: u64) -> RegistryConfig {
    RegistryConfig::new(NetworkConfig::fakechain(
        vec![(hf::BASE, 0), (hf::SERVICE_NODES, 1), (hf::SWARMS, 2), (hf::INFINITE_STAKING, 3)],
        staking_requirement,
    ))
}

#[derive(Debug, Clone)]
pub struct Wallet {
    pub address: AccountAddress,
    pub spend_secret: SecretKey,
    pub view_secret: SecretKey,
}

impl Wallet {
    pub fn generate() -> Self {
        let (spend_public, spend_secret) = generate_keys();
        let (view_public, view_secret) = generate_keys();
        Self { address: AccountAddress::new(spend_public, view_public), spend_secret, view_secret }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceNodeKeys {
    pub pubkey: PublicKey,
    pub secret: SecretKey,
}

impl ServiceNodeKeys {
    pub fn generate() -> Self {
        let (pubkey, secret) = generate_keys();
        Self { pubkey, secret }
    }
}

/// The output a staking transaction locks
#[derive(Debug, Clone)]
pub struct StakeOutput {
    pub key_image: KeyImage,
    pub output_key: PublicKey,
    pub output_secret: SecretKey,
    pub amount: u64,
}

#[derive(Debug, Clone)]
pub struct StakingTx {
    pub tx: Transaction,
    pub stake: StakeOutput,
}

fn staking_tx(
    hf_version: u8,
    service_node: &PublicKey,
    wallet: &Wallet,
    amount: u64,
    mut extra: TxExtra,
) -> StakingTx {
    let (tx_public, tx_secret) = generate_keys();
    let derivation = generate_key_derivation(&wallet.address.view_public_key, &tx_secret)
        .expect("wallet view key is a curve point");
    let output_key = derive_public_key(&derivation, 0, &wallet.address.spend_public_key)
        .expect("wallet spend key is a curve point");
    let output_secret =
        derive_secret_key(&derivation, 0, &wallet.spend_secret).expect("wallet secret is reduced");
    let key_image = generate_key_image(&output_key, &output_secret).expect("output secret is reduced");

    let mut tx = Transaction {
        version: 4,
        outputs: vec![TxOut { amount: 0, key: output_key }],
        ..Default::default()
    };
    tx.rct.push_output(amount, &derivation_to_scalar(&derivation, 0));

    extra
        .push(TxExtraField::PubKey(tx_public))
        .push(TxExtraField::ServiceNodePubkey(*service_node))
        .push(TxExtraField::ServiceNodeContributor(wallet.address))
        .push(TxExtraField::TxSecretKey(tx_secret));
    if hf_version >= hf::INFINITE_STAKING {
        let signature = generate_key_image_signature(&key_image, &output_key, &output_secret)
            .expect("output secret is reduced");
        extra.push(TxExtraField::KeyImageProofs(vec![KeyImageProof { key_image, signature }]));
    }
    tx.extra = extra.to_bytes().expect("extra encodes");

    StakingTx { tx, stake: StakeOutput { key_image, output_key, output_secret, amount } }
}

/// Registration reserving `reserved` portions per address, staked by `operator`
pub fn registration_tx(
    hf_version: u8,
    keys: &ServiceNodeKeys,
    operator: &Wallet,
    reserved: &[(AccountAddress, u64)],
    portions_for_operator: u64,
    expiration_timestamp: u64,
    stake: u64,
) -> StakingTx {
    let addresses: Vec<AccountAddress> = reserved.iter().map(|(address, _)| *address).collect();
    let portions: Vec<u64> = reserved.iter().map(|(_, portions)| *portions).collect();
    let hash = get_registration_hash(&addresses, portions_for_operator, &portions, expiration_timestamp)
        .expect("portions fit the portion unit");
    let service_node_signature =
        generate_signature(&hash, &keys.pubkey, &keys.secret).expect("service node secret is reduced");

    let register = ServiceNodeRegister {
        public_spend_keys: addresses.iter().map(|a| a.spend_public_key).collect(),
        public_view_keys: addresses.iter().map(|a| a.view_public_key).collect(),
        portions_for_operator,
        portions,
        expiration_timestamp,
        service_node_signature,
    };
    let mut extra = TxExtra::default();
    extra.push(TxExtraField::ServiceNodeRegister(register));
    staking_tx(hf_version, &keys.pubkey, operator, stake, extra)
}

/// Operator reserving the whole stake and taking the whole fee
pub fn solo_registration_tx(
    hf_version: u8,
    keys: &ServiceNodeKeys,
    operator: &Wallet,
    expiration_timestamp: u64,
    stake: u64,
) -> StakingTx {
    registration_tx(
        hf_version,
        keys,
        operator,
        &[(operator.address, STAKING_PORTIONS)],
        STAKING_PORTIONS,
        expiration_timestamp,
        stake,
    )
}

pub fn contribution_tx(hf_version: u8, service_node: &PublicKey, wallet: &Wallet, amount: u64) -> StakingTx {
    staking_tx(hf_version, service_node, wallet, amount, TxExtra::default())
}

/// Request to unlock `stake`, signed with its one-time output key
pub fn unlock_tx(service_node: &PublicKey, stake: &StakeOutput, nonce: u32) -> Transaction {
    let signature = generate_signature(&KeyImageUnlock::hash(nonce), &stake.output_key, &stake.output_secret)
        .expect("output secret is reduced");
    let mut extra = TxExtra::default();
    extra
        .push(TxExtraField::ServiceNodePubkey(*service_node))
        .push(TxExtraField::KeyImageUnlock(KeyImageUnlock { key_image: stake.key_image, nonce, signature }));
    Transaction {
        version: 4,
        tx_type: TxType::KeyImageUnlock,
        extra: extra.to_bytes().expect("extra encodes"),
        ..Default::default()
    }
}

pub fn deregister_tx(deregister: ServiceNodeDeregister) -> Transaction {
    let mut extra = TxExtra::default();
    extra.push(TxExtraField::ServiceNodeDeregister(deregister));
    Transaction {
        version: 3,
        tx_type: TxType::Deregister,
        extra: extra.to_bytes().expect("extra encodes"),
        ..Default::default()
    }
}

/// Coinbase naming `winner` and paying `payouts` from output 1 onwards
pub fn miner_tx(
    height: u64,
    winner: &PublicKey,
    payouts: &[(AccountAddress, u64)],
    service_node_total: u64,
) -> Transaction {
    let (governance_public, governance_secret) = deterministic_keypair_from_height(height);
    let mut outputs = vec![TxOut { amount: 10 * COIN, key: governance_public }];
    for (i, (address, portions)) in payouts.iter().enumerate() {
        let key = generate_key_derivation(&address.view_public_key, &governance_secret)
            .and_then(|derivation| derive_public_key(&derivation, i + 1, &address.spend_public_key))
            .unwrap_or_default();
        let amount = swarmnet_core::get_portion_of_reward(*portions, service_node_total);
        outputs.push(TxOut { amount, key });
    }

    let mut extra = TxExtra::default();
    extra
        .push(TxExtraField::PubKey(governance_public))
        .push(TxExtraField::ServiceNodeWinner(*winner));
    Transaction {
        version: 4,
        inputs: vec![TxIn::Gen { height }],
        outputs,
        extra: extra.to_bytes().expect("extra encodes"),
        ..Default::default()
    }
}

/// Chain kept in memory, indexed by height
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    blocks: RwLock<Vec<(Block, Vec<Transaction>)>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, block: Block, txs: Vec<Transaction>) {
        self.blocks.write().push((block, txs));
    }

    /// Drop every block at `height` and above
    pub fn pop_to(&self, height: u64) {
        self.blocks.write().truncate(height as usize);
    }

    pub fn block(&self, height: u64) -> Option<Block> {
        self.blocks.read().get(height as usize).map(|(block, _)| block.clone())
    }

    pub fn top_hash(&self) -> Hash {
        self.blocks.read().last().map(|(block, _)| block.hash()).unwrap_or_default()
    }
}

impl Blockchain for InMemoryLedger {
    fn height(&self) -> u64 {
        self.blocks.read().len() as u64
    }

    fn blocks_with_txs(&self, start: u64, count: u64) -> StateResult<Vec<(Block, Vec<Transaction>)>> {
        Ok(self
            .blocks
            .read()
            .iter()
            .skip(start as usize)
            .take(count as usize)
            .cloned()
            .collect())
    }
}

/// Ledger, store and registry wired together
pub struct TestChain {
    pub config: RegistryConfig,
    pub ledger: Arc<InMemoryLedger>,
    pub store: Arc<MemoryStore>,
    pub registry: Arc<ServiceNodeList>,
    block_hooks: Mutex<Vec<Arc<dyn BlockAddedHook>>>,
    detach_hooks: Mutex<Vec<Arc<dyn BlockchainDetachedHook>>>,
    next_timestamp: Mutex<u64>,
}

impl TestChain {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_parts(config, Arc::new(InMemoryLedger::new()), Arc::new(MemoryStore::new()))
    }

    /// Start a registry over an existing ledger and store, as after a restart
    pub fn with_parts(config: RegistryConfig, ledger: Arc<InMemoryLedger>, store: Arc<MemoryStore>) -> Self {
        let registry = Arc::new(ServiceNodeList::new(config.clone(), ledger.clone(), store.clone()));
        let next_timestamp = GENESIS_TIMESTAMP + ledger.height() * TARGET_BLOCK_TIME;
        let chain = Self {
            config,
            ledger,
            store,
            registry,
            block_hooks: Mutex::new(Vec::new()),
            detach_hooks: Mutex::new(Vec::new()),
            next_timestamp: Mutex::new(next_timestamp),
        };
        if chain.ledger.height() == 0 {
            let genesis = chain.build_block(&[]);
            chain.ledger.push(genesis, Vec::new());
        }
        chain.registry.init();
        chain
    }

    pub fn add_block_hook(&self, hook: Arc<dyn BlockAddedHook>) {
        self.block_hooks.lock().push(hook);
    }

    pub fn add_detach_hook(&self, hook: Arc<dyn BlockchainDetachedHook>) {
        self.detach_hooks.lock().push(hook);
    }

    pub fn height(&self) -> u64 {
        self.ledger.height()
    }

    /// Hard fork version of the next block
    pub fn next_hf_version(&self) -> u8 {
        self.config.network.hard_fork_version(self.height())
    }

    pub fn next_timestamp(&self) -> u64 {
        *self.next_timestamp.lock()
    }

    /// Staking requirement of the next block
    pub fn staking_requirement(&self) -> u64 {
        self.registry.staking_requirement(self.height())
    }

    fn build_block(&self, txs: &[Transaction]) -> Block {
        let height = self.height();
        let hf_version = self.config.network.hard_fork_version(height);
        let winner = self.registry.select_winner();
        let payouts = self.registry.get_winner_addresses_and_portions(&winner);
        let timestamp = {
            let mut next = self.next_timestamp.lock();
            let timestamp = *next;
            *next += TARGET_BLOCK_TIME;
            timestamp
        };
        Block {
            header: BlockHeader {
                major_version: hf_version,
                minor_version: hf_version,
                timestamp,
                prev_id: self.ledger.top_hash(),
                nonce: height as u32,
            },
            miner_tx: miner_tx(height, &winner, &payouts, SERVICE_NODE_REWARD),
            tx_hashes: txs.iter().map(Transaction::hash).collect(),
        }
    }

    /// Mine `txs` into the next block and run every hook
    pub fn add_block(&self, txs: Vec<Transaction>) -> Block {
        let block = self.build_block(&txs);
        self.ledger.push(block.clone(), txs.clone());
        self.registry.block_added(&block, &txs);
        let hooks = self.block_hooks.lock().clone();
        for hook in hooks {
            hook.block_added(&block, &txs);
        }
        block
    }

    pub fn add_blocks(&self, count: u64) {
        for _ in 0..count {
            self.add_block(Vec::new());
        }
    }

    /// Remove the top `count` blocks
    pub fn pop_blocks(&self, count: u64) {
        let height = self.height().saturating_sub(count);
        self.ledger.pop_to(height);
        self.registry.blockchain_detached(height);
        let hooks = self.detach_hooks.lock().clone();
        for hook in hooks {
            hook.blockchain_detached(height);
        }
    }

    /// Solo registration for the next block, staking the full requirement
    pub fn solo_registration(&self) -> (ServiceNodeKeys, Wallet, StakingTx) {
        let keys = ServiceNodeKeys::generate();
        let operator = Wallet::generate();
        let tx = solo_registration_tx(
            self.next_hf_version(),
            &keys,
            &operator,
            self.next_timestamp() + 86_400,
            self.staking_requirement(),
        );
        (keys, operator, tx)
    }

    /// Register `count` fully funded nodes in one block
    pub fn add_funded_nodes(&self, count: usize) -> Vec<(ServiceNodeKeys, StakingTx)> {
        let registrations: Vec<(ServiceNodeKeys, StakingTx)> = (0..count)
            .map(|_| {
                let (keys, _, tx) = self.solo_registration();
                (keys, tx)
            })
            .collect();
        self.add_block(registrations.iter().map(|(_, tx)| tx.tx.clone()).collect());
        registrations
    }
}
