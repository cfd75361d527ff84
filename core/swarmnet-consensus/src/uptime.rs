//! Uptime proofs and the table of nodes recently seen alive

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use swarmnet_core::constants::{
    UPTIME_PROOF_BUFFER_IN_SECONDS, UPTIME_PROOF_FREQUENCY_IN_SECONDS, UPTIME_PROOF_MAGIC,
    UPTIME_PROOF_MAX_TIME_IN_SECONDS,
};
use swarmnet_core::crypto::{check_signature, generate_signature};
use swarmnet_core::{fast_hash, Hash, PublicKey, SecretKey};
use swarmnet_state::ServiceNodeList;
use tracing::debug;

use crate::errors::UptimeProofError;
use crate::messages::UptimeProof;
use crate::metrics;

/// Seconds since the epoch by the local clock
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Message signed by an uptime proof: magic, key and timestamp
pub fn uptime_proof_hash(pubkey: &PublicKey, timestamp: u64) -> Hash {
    let mut buf = [0u8; 44];
    buf[..4].copy_from_slice(&UPTIME_PROOF_MAGIC);
    buf[4..36].copy_from_slice(pubkey.as_bytes());
    buf[36..].copy_from_slice(&timestamp.to_le_bytes());
    fast_hash(&buf)
}

/// Sign a proof for the local node
pub fn generate_uptime_proof(
    pubkey: &PublicKey,
    secret: &SecretKey,
    timestamp: u64,
    version: [u16; 3],
) -> Option<UptimeProof> {
    let signature = generate_signature(&uptime_proof_hash(pubkey, timestamp), pubkey, secret)?;
    Some(UptimeProof {
        timestamp,
        pubkey: *pubkey,
        snode_version_major: version[0],
        snode_version_minor: version[1],
        snode_version_patch: version[2],
        signature,
    })
}

/// Last accepted proof of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofInfo {
    /// Local time the proof was accepted
    pub timestamp: u64,
    pub version: [u16; 3],
}

/// Accepted uptime proofs keyed by service node
#[derive(Debug, Default)]
pub struct LivenessTable {
    proofs: DashMap<PublicKey, ProofInfo>,
}

impl LivenessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `proof` against the local clock and the registry
    pub fn handle_uptime_proof(
        &self,
        proof: &UptimeProof,
        registry: &ServiceNodeList,
        now: u64,
    ) -> Result<(), UptimeProofError> {
        let result = self.check_and_insert(proof, registry, now);
        match &result {
            Ok(()) => {
                metrics::record_uptime_proof("accepted");
                metrics::update_liveness_entries(self.proofs.len());
            }
            Err(e) => {
                debug!(pubkey = %proof.pubkey, reason = %e, "uptime proof rejected");
                metrics::record_uptime_proof(e.kind());
            }
        }
        result
    }

    fn check_and_insert(
        &self,
        proof: &UptimeProof,
        registry: &ServiceNodeList,
        now: u64,
    ) -> Result<(), UptimeProofError> {
        if proof.timestamp < now.saturating_sub(UPTIME_PROOF_BUFFER_IN_SECONDS)
            || proof.timestamp > now + UPTIME_PROOF_BUFFER_IN_SECONDS
        {
            return Err(UptimeProofError::TimestampOutOfRange { timestamp: proof.timestamp, now });
        }

        if !registry.is_service_node(&proof.pubkey) {
            return Err(UptimeProofError::UnknownServiceNode(proof.pubkey));
        }

        // The entry holds its shard lock until the proof is recorded, so
        // concurrent copies of one proof cannot both pass the rate limit
        let entry = self.proofs.entry(proof.pubkey);
        if let Entry::Occupied(last) = &entry {
            let last_seen = last.get().timestamp;
            if last_seen >= now.saturating_sub(UPTIME_PROOF_FREQUENCY_IN_SECONDS / 2) {
                return Err(UptimeProofError::TooFrequent { pubkey: proof.pubkey, last_seen });
            }
        }

        let hash = uptime_proof_hash(&proof.pubkey, proof.timestamp);
        if !check_signature(&hash, &proof.pubkey, &proof.signature) {
            return Err(UptimeProofError::BadSignature);
        }

        entry.insert(ProofInfo { timestamp: now, version: proof.version() });
        Ok(())
    }

    pub fn get_uptime_proof(&self, pubkey: &PublicKey) -> Option<ProofInfo> {
        self.proofs.get(pubkey).map(|entry| *entry)
    }

    /// `true` when `pubkey` has a proof that has not aged out at `now`
    pub fn is_alive(&self, pubkey: &PublicKey, now: u64) -> bool {
        self.get_uptime_proof(pubkey)
            .is_some_and(|info| info.timestamp + UPTIME_PROOF_MAX_TIME_IN_SECONDS >= now)
    }

    /// Drop proofs older than the maximum age, returning how many went
    pub fn prune(&self, now: u64) -> usize {
        let before = self.proofs.len();
        let cutoff = now.saturating_sub(UPTIME_PROOF_MAX_TIME_IN_SECONDS);
        self.proofs.retain(|_, info| info.timestamp >= cutoff);
        let after = self.proofs.len();
        metrics::update_liveness_entries(after);
        before - after
    }

    pub fn len(&self) -> usize {
        self.proofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmnet_core::crypto::generate_keys;

    #[test]
    fn test_proof_hash_layout() {
        let key = PublicKey([5; 32]);
        let mut expected = b"SUP\0".to_vec();
        expected.extend_from_slice(&[5; 32]);
        expected.extend_from_slice(&1_700_000_000u64.to_le_bytes());
        assert_eq!(uptime_proof_hash(&key, 1_700_000_000), fast_hash(&expected));
    }

    #[test]
    fn test_generated_proof_verifies() {
        let (pubkey, secret) = generate_keys();
        let proof = generate_uptime_proof(&pubkey, &secret, 1_700_000_000, [1, 2, 3]).unwrap();
        assert_eq!(proof.version(), [1, 2, 3]);
        let hash = uptime_proof_hash(&pubkey, proof.timestamp);
        assert!(check_signature(&hash, &pubkey, &proof.signature));
        assert!(!check_signature(&uptime_proof_hash(&pubkey, proof.timestamp + 1), &pubkey, &proof.signature));
    }

    #[test]
    fn test_prune_drops_stale_entries() {
        let table = LivenessTable::new();
        let now = 1_700_000_000;
        let fresh = PublicKey([1; 32]);
        let stale = PublicKey([2; 32]);
        table.proofs.insert(fresh, ProofInfo { timestamp: now - 60, version: [0; 3] });
        table.proofs.insert(stale, ProofInfo { timestamp: now - UPTIME_PROOF_MAX_TIME_IN_SECONDS - 1, version: [0; 3] });

        assert!(table.is_alive(&fresh, now));
        assert!(!table.is_alive(&stale, now));
        assert_eq!(table.prune(now), 1);
        assert!(table.get_uptime_proof(&stale).is_none());
        assert_eq!(table.len(), 1);
    }
}
