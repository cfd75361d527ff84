//! The service node list
//!
//! [`ServiceNodeList`] follows the main chain one block at a time. For
//! every block it expires stakes, advances the reward queue, applies
//! registrations, contributions, deregistrations and unlock requests,
//! rebalances swarms and records the quorum for that height. Each change
//! is preceded by a rollback event so a reorg can be undone exactly; when
//! that is not possible the list is rebuilt from the chain.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use swarmnet_core::constants::{
    hf, MAX_KEY_IMAGES_PER_CONTRIBUTOR, MAX_NUMBER_OF_CONTRIBUTORS, QUORUM_LIFETIME_IN_BLOCKS,
    ROLLBACK_EVENT_EXPIRATION_BLOCKS, STAKING_PORTIONS, STAKING_REQUIREMENT_LOCK_BLOCKS_EXCESS,
};
use swarmnet_core::crypto::{
    check_key, check_signature, deterministic_keypair_from_height, derive_public_key,
    generate_key_derivation,
};
use swarmnet_core::hooks::{
    get_portion_of_reward, BlockAddedHook, BlockRewardParts, BlockchainDetachedHook, InitHook,
    ValidateMinerTxHook,
};
use swarmnet_core::{
    seed_from_hash, AccountAddress, Block, Hash, KeyImage, KeyImageUnlock, PublicKey,
    Transaction, TxExtra, TxType,
};
use swarmnet_sharding::{calc_swarm_changes, SwarmMap};
use tracing::{debug, error, info, trace, warn};

use crate::config::RegistryConfig;
use crate::contribution::get_contribution;
use crate::errors::{RejectReason, RejectResult, StateError, StateResult};
use crate::ledger::Blockchain;
use crate::metrics;
use crate::persistence::{QuorumStateForHeight, RegistrySnapshot, ServiceNodeStore, STORE_VERSION};
use crate::quorum::QuorumState;
use crate::rollback::{insert_blacklist_entry, RollbackEvent};
use crate::rules::{
    check_service_node_portions, get_min_node_contribution, get_registration_hash,
    locked_key_image_unlock_height, portions_to_amount,
};
use crate::service_node_info::{
    Contributor, KeyImageBlacklistEntry, NodeVersion, ServiceNodeInfo, ServiceNodePubkeyInfo,
};

/// Why a key image cannot be spent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyImageLock {
    /// Stake of a deregistered node, reusable from `unlock_height`
    Blacklisted { unlock_height: u64 },
    /// Stake of a live node; `unlock_height` is set once an unlock is requested
    Staked { service_node: PublicKey, unlock_height: Option<u64> },
}

#[derive(Debug, Clone, Copy)]
struct BlockContext {
    height: u64,
    hf_version: u8,
    timestamp: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Next height to process
    height: u64,
    infos: BTreeMap<PublicKey, ServiceNodeInfo>,
    events: VecDeque<RollbackEvent>,
    quorum_states: BTreeMap<u64, Arc<QuorumState>>,
    /// Ordered by key image
    key_image_blacklist: Vec<KeyImageBlacklistEntry>,
    my_pubkey: Option<PublicKey>,
}

impl RegistryState {
    fn is_mine(&self, key: &PublicKey) -> bool {
        self.my_pubkey.as_ref() == Some(key)
    }

    fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            version: STORE_VERSION,
            height: self.height,
            quorum_states: self
                .quorum_states
                .iter()
                .map(|(height, state)| QuorumStateForHeight { height: *height, state: (**state).clone() })
                .collect(),
            infos: self
                .infos
                .iter()
                .map(|(pubkey, info)| ServiceNodePubkeyInfo { pubkey: *pubkey, info: info.clone() })
                .collect(),
            events: self.events.iter().cloned().collect(),
            key_image_blacklist: self.key_image_blacklist.clone(),
        }
    }

    fn restore(&mut self, snapshot: RegistrySnapshot) {
        self.height = snapshot.height;
        self.infos = snapshot.info_map().collect();
        self.quorum_states = snapshot
            .quorum_states
            .into_iter()
            .map(|q| (q.height, Arc::new(q.state)))
            .collect();
        self.events = snapshot.events.into_iter().collect();
        self.key_image_blacklist = snapshot.key_image_blacklist;
        self.key_image_blacklist.sort();
    }

    fn record_node_counts(&self) {
        let funded = self.infos.values().filter(|info| info.is_fully_funded()).count();
        metrics::update_service_nodes(self.infos.len(), funded);
    }
}

/// Registry of service nodes, driven by the ledger's hooks
pub struct ServiceNodeList {
    config: RegistryConfig,
    ledger: Arc<dyn Blockchain>,
    store: Arc<dyn ServiceNodeStore>,
    state: Mutex<RegistryState>,
}

impl std::fmt::Debug for ServiceNodeList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ServiceNodeList")
            .field("height", &state.height)
            .field("service_nodes", &state.infos.len())
            .finish()
    }
}

impl ServiceNodeList {
    pub fn new(
        config: RegistryConfig,
        ledger: Arc<dyn Blockchain>,
        store: Arc<dyn ServiceNodeStore>,
    ) -> Self {
        let state = RegistryState {
            height: config.network.service_node_fork_height(),
            ..Default::default()
        };
        Self { config, ledger, store, state: Mutex::new(state) }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Identity of the local service node, used to flag its events in logs
    pub fn set_my_service_node_keys(&self, pubkey: Option<PublicKey>) {
        self.state.lock().my_pubkey = pubkey;
    }

    /// Load the stored snapshot and catch up with the chain
    pub fn init(&self) {
        let mut state = self.state.lock();
        let loaded = self.load(&mut state);
        let chain_height = self.ledger.height();

        if loaded && state.height == chain_height {
            info!(height = state.height, "service node list loaded");
            state.record_node_counts();
            return;
        }

        if !loaded || state.height > chain_height {
            if loaded {
                warn!(stored = state.height, chain = chain_height, "stored service node list is ahead of the chain");
                metrics::record_rebuild("snapshot_ahead");
            }
            self.clear(&mut state, true);
        }

        self.rescan(&mut state);
        self.store_locked(&state);
    }

    /// Write the current state through the store
    pub fn store(&self) -> StateResult<()> {
        let state = self.state.lock();
        let bytes = state.snapshot().encode()?;
        self.store.store(&bytes)
    }

    fn store_locked(&self, state: &RegistryState) {
        let result = state.snapshot().encode().and_then(|bytes| self.store.store(&bytes));
        if let Err(e) = result {
            warn!(error = %e, "failed to store service node list");
        }
    }

    fn load(&self, state: &mut RegistryState) -> bool {
        let bytes = match self.store.load() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "failed to read stored service node list");
                return false;
            }
        };
        let Some(snapshot) = RegistrySnapshot::decode(&bytes) else {
            return false;
        };
        state.restore(snapshot);
        true
    }

    fn clear(&self, state: &mut RegistryState, delete_from_store: bool) {
        let my_pubkey = state.my_pubkey;
        *state = RegistryState {
            height: self.config.network.service_node_fork_height(),
            my_pubkey,
            ..Default::default()
        };
        if delete_from_store {
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "failed to delete stored service node list");
            }
        }
    }

    /// Replay the chain from `state.height` to the tip
    fn rescan(&self, state: &mut RegistryState) {
        let chain_height = self.ledger.height();
        if state.height < chain_height {
            info!(from = state.height, to = chain_height, "recalculating service node list");
        }

        while state.height < chain_height {
            let count = self.config.rebuild_batch_blocks.max(1).min(chain_height - state.height);
            let blocks = match self.ledger.blocks_with_txs(state.height, count) {
                Ok(blocks) => blocks,
                Err(e) => {
                    error!(height = state.height, error = %e, "unable to fetch blocks while rescanning");
                    return;
                }
            };
            if blocks.is_empty() {
                warn!(height = state.height, "ledger returned no blocks while rescanning");
                return;
            }
            for (block, txs) in &blocks {
                if let Err(e) = self.process_block(state, block, txs) {
                    error!(height = state.height, error = %e, "rescan stopped");
                    return;
                }
            }
        }
        state.record_node_counts();
    }

    fn rebuild(&self, state: &mut RegistryState, cause: &'static str) {
        error!(cause, "rebuilding service node list from the chain");
        metrics::record_rebuild(cause);
        self.clear(state, true);
        self.rescan(state);
        self.store_locked(state);
    }

    /// Apply a new block on top of the chain
    pub fn block_added(&self, block: &Block, txs: &[Transaction]) {
        let mut state = self.state.lock();
        match self.process_block(&mut state, block, txs) {
            Ok(()) => state.record_node_counts(),
            Err(e @ StateError::HeightMismatch { .. }) => {
                error!(error = %e, "block out of order");
                self.rebuild(&mut state, "height_mismatch");
            }
            Err(e) => {
                error!(error = %e, "unable to process block");
            }
        }
    }

    fn process_block(&self, state: &mut RegistryState, block: &Block, txs: &[Transaction]) -> StateResult<()> {
        let height = block
            .height()
            .ok_or_else(|| StateError::InvalidBlock("miner tx has no coinbase input".to_string()))?;
        let hf_version = self.config.network.hard_fork_version(height);

        if hf_version < hf::SERVICE_NODES {
            if height == state.height {
                state.height += 1;
            }
            return Ok(());
        }
        if height != state.height {
            return Err(StateError::HeightMismatch { expected: state.height, actual: height });
        }
        state.height += 1;

        let ctx = BlockContext { height, hf_version, timestamp: block.header.timestamp };
        let block_hash = block.hash();

        let cull_height = height.saturating_sub(ROLLBACK_EVENT_EXPIRATION_BLOCKS);
        while state.events.front().map_or(false, |e| e.block_height() < cull_height) {
            state.events.pop_front();
        }
        state.events.push_front(RollbackEvent::PreventFence { block_height: cull_height });

        self.expire_blacklist(state, height);
        let mut membership_changed = self.expire_nodes(state, &ctx);
        self.advance_winner(state, block, height);

        for (index, tx) in txs.iter().enumerate() {
            let index = u32::try_from(index).unwrap_or(u32::MAX);
            membership_changed |= self.process_tx(state, tx, &ctx, index);
        }

        let seed = seed_from_hash(&block_hash);
        if membership_changed && hf_version >= hf::SWARMS {
            self.update_swarms(state, height, seed);
        }
        self.store_quorum_state(state, height, seed);
        Ok(())
    }

    fn expire_blacklist(&self, state: &mut RegistryState, height: u64) {
        let RegistryState { key_image_blacklist, events, .. } = state;
        key_image_blacklist.retain(|entry| {
            if height >= entry.unlock_height {
                debug!(key_image = %entry.key_image, "key image leaves the blacklist");
                events.push_back(RollbackEvent::BlacklistChange { block_height: height, entry: *entry, adding: false });
                false
            } else {
                true
            }
        });
    }

    fn expire_nodes(&self, state: &mut RegistryState, ctx: &BlockContext) -> bool {
        let lock_blocks = self.config.network.staking_lock_blocks();
        let grace = if ctx.hf_version >= hf::SWARMS { STAKING_REQUIREMENT_LOCK_BLOCKS_EXCESS } else { 0 };

        let expired: Vec<PublicKey> = state
            .infos
            .iter()
            .filter(|(_, info)| match info.version {
                NodeVersion::V2InfiniteStaking => {
                    info.requested_unlock_height.map_or(false, |unlock| ctx.height > unlock)
                }
                NodeVersion::V0 | NodeVersion::V1Swarms => {
                    ctx.height >= info.registration_height + lock_blocks + grace
                }
            })
            .map(|(key, _)| *key)
            .collect();

        for key in &expired {
            if let Some(info) = state.infos.remove(key) {
                if state.is_mine(key) {
                    info!(%key, height = ctx.height, "service node (yours) expired");
                } else {
                    debug!(%key, height = ctx.height, "service node expired");
                }
                state.events.push_back(RollbackEvent::Change { block_height: ctx.height, key: *key, info: Box::new(info) });
            }
        }
        !expired.is_empty()
    }

    fn advance_winner(&self, state: &mut RegistryState, block: &Block, height: u64) {
        let winner = block
            .miner_tx
            .parse_extra()
            .ok()
            .and_then(|extra| extra.service_node_winner().copied());
        let Some(winner) = winner else { return };

        let RegistryState { infos, events, .. } = state;
        if let Some(info) = infos.get_mut(&winner) {
            events.push_back(RollbackEvent::Change { block_height: height, key: winner, info: Box::new(info.clone()) });
            info.last_reward_block_height = height;
            info.last_reward_transaction_index = u32::MAX;
        }
    }

    /// Returns whether membership changed
    fn process_tx(&self, state: &mut RegistryState, tx: &Transaction, ctx: &BlockContext, index: u32) -> bool {
        let extra = match tx.parse_extra() {
            Ok(extra) => extra,
            Err(e) => {
                if tx.tx_type != TxType::Standard {
                    debug!(tx = %tx.hash(), error = %e, "service node tx with malformed extra");
                    metrics::record_skipped_tx("malformed");
                }
                return false;
            }
        };

        match tx.tx_type {
            TxType::Standard => {
                let mut registered = false;
                if extra.service_node_register().is_some() {
                    match self.process_registration(state, tx, &extra, ctx, index) {
                        Ok(_) => registered = true,
                        Err(reason) => self.skipped(tx, ctx, "registration", &reason),
                    }
                }
                if extra.service_node_contributor().is_some() {
                    if let Err(reason) = self.process_contribution(state, tx, &extra, ctx, index) {
                        self.skipped(tx, ctx, "contribution", &reason);
                    }
                }
                registered
            }
            TxType::Deregister => match self.process_deregistration(state, &extra, ctx) {
                Ok(_) => true,
                Err(reason) => {
                    self.skipped(tx, ctx, "deregistration", &reason);
                    false
                }
            },
            TxType::KeyImageUnlock => {
                if let Err(reason) = self.process_key_image_unlock(state, &extra, ctx) {
                    self.skipped(tx, ctx, "key_image_unlock", &reason);
                }
                false
            }
        }
    }

    fn skipped(&self, tx: &Transaction, ctx: &BlockContext, kind: &'static str, reason: &RejectReason) {
        info!(height = ctx.height, tx = %tx.hash(), kind, %reason, "service node tx skipped");
        metrics::record_skipped_tx(kind);
    }

    /// Validate a registration and build the record it creates
    fn registration_from_tx(
        &self,
        tx: &Transaction,
        extra: &TxExtra,
        ctx: &BlockContext,
        index: u32,
    ) -> RejectResult<(PublicKey, ServiceNodeInfo)> {
        let register = extra
            .service_node_register()
            .ok_or(RejectReason::MissingField("registration"))?;
        let key = *extra
            .service_node_pubkey()
            .ok_or(RejectReason::MissingField("service node pubkey"))?;

        let portions = &register.portions;
        if register.public_spend_keys.len() != register.public_view_keys.len()
            || register.public_spend_keys.len() != portions.len()
            || portions.is_empty()
        {
            return Err(RejectReason::PortionsMismatch {
                addresses: register.public_spend_keys.len(),
                portions: portions.len(),
            });
        }
        let addresses: Vec<AccountAddress> = register
            .public_spend_keys
            .iter()
            .zip(&register.public_view_keys)
            .map(|(spend, view)| AccountAddress::new(*spend, *view))
            .collect();

        if !check_service_node_portions(ctx.hf_version, portions) {
            return Err(RejectReason::InvalidPortions);
        }
        if register.portions_for_operator > STAKING_PORTIONS {
            return Err(RejectReason::InvalidOperatorPortions(register.portions_for_operator));
        }

        let hash = get_registration_hash(
            &addresses,
            register.portions_for_operator,
            portions,
            register.expiration_timestamp,
        )
        .ok_or(RejectReason::InvalidPortions)?;
        if !check_key(&key) {
            return Err(RejectReason::InvalidKey);
        }
        if !check_signature(&hash, &key, &register.service_node_signature) {
            return Err(RejectReason::InvalidSignature);
        }
        if register.expiration_timestamp < ctx.timestamp {
            return Err(RejectReason::Expired {
                expiration: register.expiration_timestamp,
                block_timestamp: ctx.timestamp,
            });
        }

        let staking_requirement = self.config.network.staking_requirement(ctx.height);
        let contribution = get_contribution(ctx.hf_version, tx, extra)?;
        let minimum = get_min_node_contribution(ctx.hf_version, staking_requirement, 0, 0);
        if contribution.transferred < minimum {
            return Err(RejectReason::InsufficientContribution { amount: contribution.transferred, minimum });
        }

        let staker_is_listed = addresses.contains(&contribution.address);
        if addresses.len() + usize::from(!staker_is_listed) > MAX_NUMBER_OF_CONTRIBUTORS {
            return Err(RejectReason::TooManyContributors);
        }

        let mut info = ServiceNodeInfo {
            version: NodeVersion::for_hard_fork(ctx.hf_version),
            registration_height: ctx.height,
            requested_unlock_height: None,
            last_reward_block_height: ctx.height,
            last_reward_transaction_index: index,
            staking_requirement,
            portions_for_operator: register.portions_for_operator,
            operator_address: addresses[0],
            ..Default::default()
        };
        for (i, (address, &portion)) in addresses.iter().zip(portions).enumerate() {
            if addresses[..i].contains(address) {
                return Err(RejectReason::DuplicateContributor);
            }
            let reserved = portions_to_amount(portion, staking_requirement);
            info.contributors.push(Contributor::new(*address, reserved));
            info.total_reserved += reserved;
        }

        Ok((key, info))
    }

    fn process_registration(
        &self,
        state: &mut RegistryState,
        tx: &Transaction,
        extra: &TxExtra,
        ctx: &BlockContext,
        index: u32,
    ) -> RejectResult<PublicKey> {
        let (key, mut info) = self.registration_from_tx(tx, extra, ctx, index)?;

        match state.infos.get(&key) {
            Some(old) => {
                if ctx.hf_version >= hf::INFINITE_STAKING || ctx.hf_version < hf::SWARMS {
                    return Err(RejectReason::AlreadyRegistered(key));
                }
                // Re-registration keeps the reward position, but only once
                // the old stake has unlocked
                let unlock_height = old.registration_height + self.config.network.staking_lock_blocks();
                if ctx.height < unlock_height {
                    return Err(RejectReason::AlreadyRegistered(key));
                }
                info.last_reward_block_height = old.last_reward_block_height;
                info.last_reward_transaction_index = old.last_reward_transaction_index;
                state.events.push_back(RollbackEvent::Change { block_height: ctx.height, key, info: Box::new(old.clone()) });
            }
            None => state.events.push_back(RollbackEvent::New { block_height: ctx.height, key }),
        }

        if state.is_mine(&key) {
            info!(%key, height = ctx.height, "service node (yours) registered");
        } else {
            debug!(%key, height = ctx.height, "service node registered");
        }
        state.infos.insert(key, info);
        Ok(key)
    }

    fn process_contribution(
        &self,
        state: &mut RegistryState,
        tx: &Transaction,
        extra: &TxExtra,
        ctx: &BlockContext,
        index: u32,
    ) -> RejectResult<()> {
        let parsed = get_contribution(ctx.hf_version, tx, extra)?;
        let key = parsed.service_node_pubkey;

        let RegistryState { infos, events, .. } = state;
        let info = infos.get_mut(&key).ok_or(RejectReason::UnknownServiceNode(key))?;
        if info.is_fully_funded() {
            return Err(RejectReason::FullyFunded(key));
        }
        if parsed.transferred == 0 {
            return Err(RejectReason::InsufficientContribution { amount: 0, minimum: 1 });
        }

        let position = info.contributors.iter().position(|c| c.address == parsed.address);
        if position.is_none() {
            if info.contributors.len() >= MAX_NUMBER_OF_CONTRIBUTORS {
                return Err(RejectReason::TooManyContributors);
            }
            let minimum = get_min_node_contribution(
                ctx.hf_version,
                info.staking_requirement,
                info.total_reserved,
                info.total_num_locked_contributions(),
            );
            if parsed.transferred < minimum {
                return Err(RejectReason::InsufficientContribution { amount: parsed.transferred, minimum });
            }
        }
        if ctx.hf_version >= hf::INFINITE_STAKING {
            let already_locked = position.map_or(0, |i| info.contributors[i].locked_contributions.len());
            if already_locked + parsed.locked_contributions.len() > MAX_KEY_IMAGES_PER_CONTRIBUTOR {
                return Err(RejectReason::TooManyKeyImages);
            }
        }

        events.push_back(RollbackEvent::Change { block_height: ctx.height, key, info: Box::new(info.clone()) });

        let position = match position {
            Some(i) => i,
            None => {
                info.contributors.push(Contributor::new(parsed.address, 0));
                info.contributors.len() - 1
            }
        };

        // Total reserved may not grow past the staking requirement
        let can_increase_reserved_by = info.staking_requirement.saturating_sub(info.total_reserved);
        let contributor = &mut info.contributors[position];
        let max_amount = contributor.reserved + can_increase_reserved_by;
        let transferred = parsed.transferred.min(max_amount.saturating_sub(contributor.amount));

        contributor.amount += transferred;
        info.total_contributed += transferred;
        if contributor.amount > contributor.reserved {
            info.total_reserved += contributor.amount - contributor.reserved;
            contributor.reserved = contributor.amount;
        }
        if ctx.hf_version >= hf::INFINITE_STAKING {
            contributor.locked_contributions.extend(parsed.locked_contributions);
        }

        info.last_reward_block_height = ctx.height;
        info.last_reward_transaction_index = index;

        trace!(%key, transferred, total = info.total_contributed, "contribution applied");
        Ok(())
    }

    fn process_deregistration(
        &self,
        state: &mut RegistryState,
        extra: &TxExtra,
        ctx: &BlockContext,
    ) -> RejectResult<PublicKey> {
        let deregister = extra
            .service_node_deregister()
            .ok_or(RejectReason::MissingField("deregister"))?;
        let quorum = state
            .quorum_states
            .get(&deregister.block_height)
            .ok_or(RejectReason::NoQuorumState(deregister.block_height))?;
        let key = *quorum
            .nodes_to_test
            .get(deregister.service_node_index as usize)
            .ok_or(RejectReason::TesteeIndexOutOfRange {
                index: deregister.service_node_index,
                len: quorum.nodes_to_test.len(),
            })?;

        let is_mine = state.is_mine(&key);
        let RegistryState { infos, events, key_image_blacklist, .. } = state;
        let info = infos.remove(&key).ok_or(RejectReason::UnknownServiceNode(key))?;

        if is_mine {
            info!(%key, height = ctx.height, "deregistration for service node (yours)");
        } else {
            debug!(%key, height = ctx.height, "service node deregistered");
        }

        if ctx.hf_version >= hf::INFINITE_STAKING {
            let unlock_height = ctx.height + self.config.network.staking_lock_blocks();
            for locked in info.contributors.iter().flat_map(|c| c.locked_contributions.iter()) {
                let entry = KeyImageBlacklistEntry { key_image: locked.key_image, unlock_height };
                insert_blacklist_entry(key_image_blacklist, entry);
                events.push_back(RollbackEvent::BlacklistChange { block_height: ctx.height, entry, adding: true });
            }
        }

        events.push_back(RollbackEvent::Change { block_height: ctx.height, key, info: Box::new(info) });
        Ok(key)
    }

    fn process_key_image_unlock(
        &self,
        state: &mut RegistryState,
        extra: &TxExtra,
        ctx: &BlockContext,
    ) -> RejectResult<PublicKey> {
        if ctx.hf_version < hf::INFINITE_STAKING {
            return Err(RejectReason::UnlockBeforeInfiniteStaking {
                hf_version: ctx.hf_version,
                required: hf::INFINITE_STAKING,
            });
        }
        let key = *extra
            .service_node_pubkey()
            .ok_or(RejectReason::MissingField("service node pubkey"))?;
        let unlock = extra
            .key_image_unlock()
            .ok_or(RejectReason::MissingField("key image unlock"))?;

        let is_mine = state.is_mine(&key);
        let RegistryState { infos, events, .. } = state;
        let info = infos.get_mut(&key).ok_or(RejectReason::UnknownServiceNode(key))?;
        if info.requested_unlock_height.is_some() {
            return Err(RejectReason::UnlockAlreadyRequested(key));
        }
        let locked = info
            .locked_contribution(&unlock.key_image)
            .ok_or(RejectReason::KeyImageNotLocked(key))?;
        if !check_signature(&KeyImageUnlock::hash(unlock.nonce), &locked.key_image_pub_key, &unlock.signature) {
            return Err(RejectReason::InvalidSignature);
        }

        let unlock_height = locked_key_image_unlock_height(self.config.network.staking_lock_blocks(), ctx.height);
        events.push_back(RollbackEvent::UnlockReset { block_height: ctx.height, key });
        info.requested_unlock_height = Some(unlock_height);

        if is_mine {
            info!(%key, unlock_height, "unlock requested for service node (yours)");
        } else {
            debug!(%key, unlock_height, "unlock requested");
        }
        Ok(key)
    }

    fn update_swarms(&self, state: &mut RegistryState, height: u64, seed: u64) {
        let mut swarms = SwarmMap::new();
        for (key, info) in &state.infos {
            swarms.entry(info.swarm_id).or_default().push(*key);
        }

        calc_swarm_changes(&mut swarms, seed);

        let my_pubkey = state.my_pubkey;
        let RegistryState { infos, events, .. } = state;
        for (swarm_id, members) in swarms {
            for key in members {
                let Some(info) = infos.get_mut(&key) else { continue };
                if info.swarm_id == swarm_id {
                    continue;
                }
                events.push_back(RollbackEvent::Change { block_height: height, key, info: Box::new(info.clone()) });
                if my_pubkey == Some(key) {
                    info!(%key, from = info.swarm_id, to = swarm_id, "service node (yours) changed swarm");
                }
                info.swarm_id = swarm_id;
            }
        }
    }

    fn store_quorum_state(&self, state: &mut RegistryState, height: u64, seed: u64) {
        let funded: Vec<PublicKey> = state
            .infos
            .iter()
            .filter(|(_, info)| info.is_fully_funded())
            .map(|(key, _)| *key)
            .collect();
        state.quorum_states.insert(height, Arc::new(QuorumState::generate(&funded, seed)));

        let keep_from = height.saturating_sub(QUORUM_LIFETIME_IN_BLOCKS);
        state.quorum_states = state.quorum_states.split_off(&keep_from);
    }

    /// Undo every block at `height` and above
    pub fn blockchain_detached(&self, height: u64) {
        let mut state = self.state.lock();
        if height > state.height {
            error!(height, processed = state.height, "detached above the last processed height");
            self.rebuild(&mut state, "height_desync");
            return;
        }

        while state.events.back().map_or(false, |e| e.block_height() >= height) {
            let Some(event) = state.events.pop_back() else { break };
            let kind = event.kind();
            let RegistryState { infos, key_image_blacklist, .. } = &mut *state;
            match event.undo(infos, key_image_blacklist) {
                Ok(()) => metrics::record_rollback(kind),
                Err(StateError::RollbackFence(fence)) => {
                    error!(fence, height, "reorg reaches past the rollback history");
                    self.rebuild(&mut state, "rollback_fence");
                    return;
                }
                Err(e) => {
                    error!(error = %e, height, "rollback failed");
                    self.rebuild(&mut state, "rollback_corrupt");
                    return;
                }
            }
        }

        let _ = state.quorum_states.split_off(&height);
        state.height = height;
        state.record_node_counts();
        self.store_locked(&state);
    }

    /// Fully funded node that has waited longest for a reward, or the null
    /// key when there is none
    pub fn select_winner(&self) -> PublicKey {
        let state = self.state.lock();
        select_winner(&state.infos)
    }

    /// Payout split of the winner's reward, in portions
    pub fn get_winner_addresses_and_portions(&self, winner: &PublicKey) -> Vec<(AccountAddress, u64)> {
        let state = self.state.lock();
        winner_addresses_and_portions(&state.infos, winner)
    }

    /// Check the winner and payouts declared by a miner transaction
    pub fn validate_miner_tx(
        &self,
        _prev_id: &Hash,
        miner_tx: &Transaction,
        height: u64,
        hf_version: u8,
        reward_parts: &BlockRewardParts,
    ) -> bool {
        if hf_version < hf::SERVICE_NODES {
            return true;
        }

        let state = self.state.lock();
        let declared = miner_tx
            .parse_extra()
            .ok()
            .and_then(|extra| extra.service_node_winner().copied())
            .unwrap_or_default();
        let expected = select_winner(&state.infos);
        if declared != expected {
            warn!(%declared, %expected, height, "miner tx pays the wrong service node");
            return false;
        }

        let payouts = winner_addresses_and_portions(&state.infos, &expected);
        if miner_tx.outputs.len() < 1 + payouts.len() {
            warn!(outputs = miner_tx.outputs.len(), expected = 1 + payouts.len(), "miner tx is missing service node outputs");
            return false;
        }

        let (_, governance_secret) = deterministic_keypair_from_height(height);
        for (i, (address, portions)) in payouts.iter().enumerate() {
            let vout = i + 1;
            let output = &miner_tx.outputs[vout];
            let reward = get_portion_of_reward(*portions, reward_parts.service_node_total);
            if output.amount != reward {
                warn!(vout, amount = output.amount, expected = reward, "service node output has the wrong amount");
                return false;
            }
            let expected_key = generate_key_derivation(&address.view_public_key, &governance_secret)
                .and_then(|derivation| derive_public_key(&derivation, vout, &address.spend_public_key));
            if expected_key != Some(output.key) {
                warn!(vout, "service node output key does not match");
                return false;
            }
        }
        true
    }

    /// Next height the list expects
    pub fn height(&self) -> u64 {
        self.state.lock().height
    }

    pub fn staking_requirement(&self, height: u64) -> u64 {
        self.config.network.staking_requirement(height)
    }

    pub fn get_quorum_state(&self, height: u64) -> Option<Arc<QuorumState>> {
        self.state.lock().quorum_states.get(&height).cloned()
    }

    pub fn is_service_node(&self, key: &PublicKey) -> bool {
        self.state.lock().infos.contains_key(key)
    }

    pub fn get_service_node(&self, key: &PublicKey) -> Option<ServiceNodeInfo> {
        self.state.lock().infos.get(key).cloned()
    }

    /// Records for `keys`, or for every node when `keys` is empty
    pub fn get_service_node_list_state(&self, keys: &[PublicKey]) -> Vec<ServiceNodePubkeyInfo> {
        let state = self.state.lock();
        let entry = |(pubkey, info): (&PublicKey, &ServiceNodeInfo)| ServiceNodePubkeyInfo {
            pubkey: *pubkey,
            info: info.clone(),
        };
        if keys.is_empty() {
            state.infos.iter().map(entry).collect()
        } else {
            keys.iter()
                .filter_map(|key| state.infos.get_key_value(key))
                .map(entry)
                .collect()
        }
    }

    /// Fully funded nodes in key order
    pub fn service_node_pubkeys(&self) -> Vec<PublicKey> {
        let state = self.state.lock();
        state
            .infos
            .iter()
            .filter(|(_, info)| info.is_fully_funded())
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn blacklisted_key_images(&self) -> Vec<KeyImageBlacklistEntry> {
        self.state.lock().key_image_blacklist.clone()
    }

    pub fn is_key_image_locked(&self, key_image: &KeyImage) -> Option<KeyImageLock> {
        let state = self.state.lock();
        if let Some(entry) = state.key_image_blacklist.iter().find(|e| &e.key_image == key_image) {
            return Some(KeyImageLock::Blacklisted { unlock_height: entry.unlock_height });
        }
        state.infos.iter().find_map(|(key, info)| {
            info.locked_contribution(key_image).map(|_| KeyImageLock::Staked {
                service_node: *key,
                unlock_height: info.requested_unlock_height,
            })
        })
    }
}

fn select_winner(infos: &BTreeMap<PublicKey, ServiceNodeInfo>) -> PublicKey {
    infos
        .iter()
        .filter(|(_, info)| info.is_fully_funded())
        .min_by_key(|(_, info)| (info.last_reward_block_height, info.last_reward_transaction_index))
        .map(|(key, _)| *key)
        .unwrap_or_default()
}

fn winner_addresses_and_portions(
    infos: &BTreeMap<PublicKey, ServiceNodeInfo>,
    winner: &PublicKey,
) -> Vec<(AccountAddress, u64)> {
    let Some(info) = infos.get(winner) else {
        return vec![(AccountAddress::null(), STAKING_PORTIONS)];
    };
    if info.staking_requirement == 0 {
        return vec![(info.operator_address, STAKING_PORTIONS)];
    }

    let remaining_portions = STAKING_PORTIONS - info.portions_for_operator.min(STAKING_PORTIONS);
    info.contributors
        .iter()
        .map(|contributor| {
            let mut portions = (u128::from(contributor.amount) * u128::from(remaining_portions)
                / u128::from(info.staking_requirement)) as u64;
            if contributor.address == info.operator_address {
                portions += info.portions_for_operator;
            }
            (contributor.address, portions)
        })
        .collect()
}

impl InitHook for ServiceNodeList {
    fn init(&self) {
        ServiceNodeList::init(self)
    }
}

impl BlockAddedHook for ServiceNodeList {
    fn block_added(&self, block: &Block, txs: &[Transaction]) {
        ServiceNodeList::block_added(self, block, txs)
    }
}

impl BlockchainDetachedHook for ServiceNodeList {
    fn blockchain_detached(&self, height: u64) {
        ServiceNodeList::blockchain_detached(self, height)
    }
}

impl ValidateMinerTxHook for ServiceNodeList {
    fn validate_miner_tx(
        &self,
        prev_id: &Hash,
        miner_tx: &Transaction,
        height: u64,
        hf_version: u8,
        reward_parts: &BlockRewardParts,
    ) -> bool {
        ServiceNodeList::validate_miner_tx(self, prev_id, miner_tx, height, hf_version, reward_parts)
    }
}
