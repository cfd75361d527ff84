//! Decoding stake contributions from staking transactions
//!
//! A staking transaction reveals its secret key `r` and the contributor's
//! address in the tx extra. With `r` and the contributor's view key anyone
//! can recompute the shared derivation, open the RingCT amounts of the
//! outputs paying the contributor, and (after infinite staking) check the
//! key image proofs that tie each output to a lockable key image.

use swarmnet_core::constants::hf;
use swarmnet_core::crypto::{
    check_key_image_signature, derivation_to_scalar, derive_public_key, generate_key_derivation,
};
use swarmnet_core::{AccountAddress, PublicKey, SecretKey, Transaction, TxExtra};
use tracing::debug;

use crate::errors::{RejectReason, RejectResult};
use crate::service_node_info::LockedContribution;

/// Stake carried by one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedContribution {
    pub address: AccountAddress,
    pub service_node_pubkey: PublicKey,
    pub tx_secret_key: SecretKey,
    pub transferred: u64,
    pub locked_contributions: Vec<LockedContribution>,
}

/// Amount of output `index` readable with `derivation`, zero if it does not
/// decode
fn staking_output_amount(tx: &Transaction, index: usize, derivation: &swarmnet_core::KeyDerivation) -> u64 {
    let shared = derivation_to_scalar(derivation, index);
    tx.rct.decode_amount(index, &shared).unwrap_or(0)
}

pub fn get_contribution(hf_version: u8, tx: &Transaction, extra: &TxExtra) -> RejectResult<ParsedContribution> {
    let address = *extra
        .service_node_contributor()
        .ok_or(RejectReason::MissingField("contributor"))?;
    let service_node_pubkey = *extra
        .service_node_pubkey()
        .ok_or(RejectReason::MissingField("service node pubkey"))?;
    let Some(tx_secret_key) = extra.tx_secret_key().copied() else {
        debug!(tx = %tx.hash(), "contributor present but no tx secret key in extra");
        return Err(RejectReason::MissingField("tx secret key"));
    };

    let derivation = generate_key_derivation(&address.view_public_key, &tx_secret_key)
        .ok_or(RejectReason::UndecodableContribution)?;

    let mut parsed = ParsedContribution {
        address,
        service_node_pubkey,
        tx_secret_key,
        transferred: 0,
        locked_contributions: Vec::new(),
    };

    if hf_version < hf::INFINITE_STAKING {
        parsed.transferred = (0..tx.outputs.len())
            .map(|i| staking_output_amount(tx, i, &derivation))
            .fold(0u64, u64::saturating_add);
        return Ok(parsed);
    }

    let mut proofs = extra
        .key_image_proofs()
        .cloned()
        .ok_or(RejectReason::MissingField("key image proofs"))?;

    for (index, output) in tx.outputs.iter().enumerate() {
        let amount = staking_output_amount(tx, index, &derivation);
        if amount == 0 {
            continue;
        }

        // The output must pay the contributor, otherwise they could not
        // have produced its key image
        let Some(ephemeral) = derive_public_key(&derivation, index, &address.spend_public_key) else {
            continue;
        };
        if ephemeral != output.key {
            debug!(tx = %tx.hash(), index, "staking output is not addressed to the contributor");
            continue;
        }

        let Some(pos) = proofs
            .iter()
            .position(|proof| check_key_image_signature(&proof.key_image, &ephemeral, &proof.signature))
        else {
            debug!(tx = %tx.hash(), index, "no valid key image proof for staking output");
            continue;
        };
        let proof = proofs.remove(pos);
        parsed.locked_contributions.push(LockedContribution {
            key_image: proof.key_image,
            key_image_pub_key: ephemeral,
            amount,
        });
        parsed.transferred = parsed.transferred.saturating_add(amount);
    }

    Ok(parsed)
}
