//! Staking arithmetic and registration argument handling
//!
//! Stake shares are expressed in portions of [`STAKING_PORTIONS`]. All
//! conversions between portions and amounts go through 128-bit
//! intermediates so every node rounds identically.

use swarmnet_core::constants::{hf, MAX_NUMBER_OF_CONTRIBUTORS, STAKING_PORTIONS};
use swarmnet_core::{fast_hash, AccountAddress, Hash};

/// Smallest amount a new contributor must stake
pub fn get_min_node_contribution(
    hf_version: u8,
    staking_requirement: u64,
    total_reserved: u64,
    num_contributions: usize,
) -> u64 {
    let needed = staking_requirement.saturating_sub(total_reserved);
    if hf_version < hf::INFINITE_STAKING {
        return needed.min(staking_requirement / MAX_NUMBER_OF_CONTRIBUTORS as u64);
    }
    if num_contributions >= MAX_NUMBER_OF_CONTRIBUTORS {
        return u64::MAX;
    }
    needed / (MAX_NUMBER_OF_CONTRIBUTORS - num_contributions) as u64
}

pub fn get_min_node_contribution_in_portions(
    hf_version: u8,
    staking_requirement: u64,
    total_reserved: u64,
    num_contributions: usize,
) -> u64 {
    let amount = get_min_node_contribution(hf_version, staking_requirement, total_reserved, num_contributions);
    get_portions_to_make_amount(staking_requirement, amount)
}

pub fn portions_to_amount(portions: u64, staking_requirement: u64) -> u64 {
    (u128::from(staking_requirement) * u128::from(portions) / u128::from(STAKING_PORTIONS)) as u64
}

/// Portions needed to cover `amount`, rounded up
pub fn get_portions_to_make_amount(staking_requirement: u64, amount: u64) -> u64 {
    if staking_requirement == 0 {
        return u64::MAX;
    }
    let requirement = u128::from(staking_requirement);
    let portions = (u128::from(amount) * u128::from(STAKING_PORTIONS) + requirement - 1) / requirement;
    u64::try_from(portions).unwrap_or(u64::MAX)
}

/// Each portion must meet the minimum for its position and the total must
/// fit in the portion unit
pub fn check_service_node_portions(hf_version: u8, portions: &[u64]) -> bool {
    if portions.len() > MAX_NUMBER_OF_CONTRIBUTORS {
        return false;
    }
    let mut reserved: u64 = 0;
    for (i, &portion) in portions.iter().enumerate() {
        let min_portions = get_min_node_contribution_in_portions(hf_version, STAKING_PORTIONS, reserved, i);
        if portion < min_portions {
            return false;
        }
        reserved = match reserved.checked_add(portion) {
            Some(total) => total,
            None => return false,
        };
    }
    reserved <= STAKING_PORTIONS
}

/// Hash signed by the service node key when registering
pub fn get_registration_hash(
    addresses: &[AccountAddress],
    portions_for_operator: u64,
    portions: &[u64],
    expiration_timestamp: u64,
) -> Option<Hash> {
    if addresses.len() != portions.len() {
        return None;
    }
    let mut portions_left = STAKING_PORTIONS;
    for &portion in portions {
        portions_left = portions_left.checked_sub(portion)?;
    }

    let mut buf = Vec::with_capacity(addresses.len() * 72 + 16);
    buf.extend_from_slice(&portions_for_operator.to_le_bytes());
    for (address, portion) in addresses.iter().zip(portions) {
        buf.extend_from_slice(address.spend_public_key.as_bytes());
        buf.extend_from_slice(address.view_public_key.as_bytes());
        buf.extend_from_slice(&portion.to_le_bytes());
    }
    buf.extend_from_slice(&expiration_timestamp.to_le_bytes());
    Some(fast_hash(&buf))
}

/// Height at which a stake unlocks when the request lands at `current_height`
pub fn locked_key_image_unlock_height(staking_lock_blocks: u64, current_height: u64) -> u64 {
    current_height + staking_lock_blocks / 2
}

/// Validated arguments of a `register_service_node` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationArgs {
    pub portions_for_operator: u64,
    pub addresses: Vec<AccountAddress>,
    pub portions: Vec<u64>,
}

/// Parse `<operator cut> <address> <portions> [<address> <portions> ...]`
///
/// A contributor that falls short of its minimum by a few dust units takes
/// the difference from the excess of the others.
// TODO: drop the dust redistribution once wallets compute exact minimums
pub fn convert_registration_args(
    args: &[String],
    staking_requirement: u64,
    hf_version: u8,
) -> Result<RegistrationArgs, String> {
    if args.len() % 2 == 0 || args.len() < 3 {
        return Err(
            "Usage: <operator cut> <address> <fraction> [<address> <fraction> [...]]]".to_string(),
        );
    }
    if (args.len() - 1) / 2 > MAX_NUMBER_OF_CONTRIBUTORS {
        return Err(format!(
            "Exceeds the maximum number of contributors, which is {MAX_NUMBER_OF_CONTRIBUTORS}"
        ));
    }
    if staking_requirement == 0 {
        return Err("Staking requirement is zero".to_string());
    }

    let portions_for_operator: u64 = args[0]
        .parse()
        .map_err(|_| format!("Invalid portion amount: {}", args[0]))?;
    if portions_for_operator > STAKING_PORTIONS {
        return Err(format!("Invalid portion amount: {portions_for_operator}"));
    }

    let mut requested: Vec<(AccountAddress, u64)> = Vec::new();
    for pair in args[1..].chunks(2) {
        let address: AccountAddress = pair[0]
            .parse()
            .map_err(|_| format!("couldn't parse address: {}", pair[0]))?;
        let portions: u64 = pair[1]
            .parse()
            .map_err(|_| format!("Invalid amount for contributor: {}", pair[1]))?;
        requested.push((address, portions));
    }

    let mut excess_portions = vec![0u64; requested.len()];
    let mut reserved = 0u64;
    for (index, &(_, portions)) in requested.iter().enumerate() {
        let min_portions = get_min_node_contribution_in_portions(hf_version, staking_requirement, reserved, index);
        reserved = reserved.saturating_add(portions_to_amount(portions, staking_requirement));
        excess_portions[index] = portions.saturating_sub(min_portions);
    }

    const FUDGE_FACTOR: u64 = 10;
    let dust = (STAKING_PORTIONS / staking_requirement).saturating_mul(FUDGE_FACTOR);

    let mut result = RegistrationArgs { portions_for_operator, addresses: Vec::new(), portions: Vec::new() };
    let mut portions_left = STAKING_PORTIONS;
    let mut total_reserved = 0u64;
    for i in 0..requested.len() {
        let min_portions = get_min_node_contribution_in_portions(hf_version, staking_requirement, total_reserved, i);
        let mut portions_to_steal = 0;

        if requested[i].1 < min_portions {
            let mut needed = min_portions - requested[i].1;
            if needed > dust {
                continue;
            }
            for sub in 0..requested.len() {
                if sub == i || excess_portions[sub] == 0 {
                    continue;
                }
                portions_to_steal = needed.min(excess_portions[sub]);
                requested[i].1 += portions_to_steal;
                excess_portions[sub] -= portions_to_steal;
                needed -= portions_to_steal;
                requested[sub].1 -= portions_to_steal;
                if needed == 0 {
                    break;
                }
            }
            // Sole short contributor with room left: round up to the minimum
            if needed > 0 && requested.len() < MAX_NUMBER_OF_CONTRIBUTORS {
                requested[i].1 += needed;
            }
        }

        let (address, portions) = requested[i];
        if portions < min_portions || portions - portions_to_steal > portions_left {
            return Err(format!(
                "Invalid amount for contributor {address}, with portion amount {portions}. \
                 The contributors must each have at least 25%, except for the last contributor \
                 which may have the remaining amount"
            ));
        }

        if !result.addresses.contains(&address) {
            result.addresses.push(address);
            result.portions.push(portions);
            total_reserved = total_reserved.saturating_add(portions_to_amount(portions, staking_requirement));
        }
        portions_left -= portions - portions_to_steal;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmnet_core::crypto::generate_keys;

    const REQ: u64 = 100_000;

    fn address() -> AccountAddress {
        AccountAddress::new(generate_keys().0, generate_keys().0)
    }

    #[test]
    fn test_min_contribution_before_and_after_infinite_staking() {
        assert_eq!(get_min_node_contribution(9, REQ, 0, 0), 25_000);
        assert_eq!(get_min_node_contribution(9, REQ, 90_000, 3), 10_000);
        assert_eq!(get_min_node_contribution(10, REQ, 0, 0), 25_000);
        assert_eq!(get_min_node_contribution(10, REQ, 40_000, 2), 30_000);
        assert_eq!(get_min_node_contribution(10, REQ, 40_000, 4), u64::MAX);
    }

    #[test]
    fn test_portion_conversions() {
        assert_eq!(portions_to_amount(STAKING_PORTIONS, REQ), REQ);
        assert_eq!(portions_to_amount(STAKING_PORTIONS / 4, REQ), 25_000);
        assert_eq!(get_portions_to_make_amount(REQ, REQ), STAKING_PORTIONS);
        let quarter = get_portions_to_make_amount(REQ, 25_000);
        assert!(portions_to_amount(quarter, REQ) >= 25_000);
        assert_eq!(get_portions_to_make_amount(REQ, u64::MAX), u64::MAX);
    }

    #[test]
    fn test_check_portions() {
        assert!(check_service_node_portions(9, &[STAKING_PORTIONS]));
        assert!(check_service_node_portions(9, &[STAKING_PORTIONS / 4; 4]));
        assert!(!check_service_node_portions(9, &[STAKING_PORTIONS / 8]));
        assert!(!check_service_node_portions(9, &[STAKING_PORTIONS, 1]));
        assert!(!check_service_node_portions(9, &[STAKING_PORTIONS / 4; 5]));
    }

    #[test]
    fn test_registration_hash_binds_fields() {
        let addresses = vec![address()];
        let a = get_registration_hash(&addresses, 10, &[STAKING_PORTIONS], 1000).unwrap();
        let b = get_registration_hash(&addresses, 11, &[STAKING_PORTIONS], 1000).unwrap();
        let c = get_registration_hash(&addresses, 10, &[STAKING_PORTIONS], 1001).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(get_registration_hash(&addresses, 10, &[STAKING_PORTIONS, 1], 1000).is_none());
    }

    #[test]
    fn test_convert_args_single_operator() {
        let operator = address();
        let args = vec![STAKING_PORTIONS.to_string(), operator.to_string(), STAKING_PORTIONS.to_string()];
        let parsed = convert_registration_args(&args, REQ, 10).unwrap();
        assert_eq!(parsed.addresses, vec![operator]);
        assert_eq!(parsed.portions, vec![STAKING_PORTIONS]);
    }

    #[test]
    fn test_convert_args_usage_errors() {
        assert!(convert_registration_args(&["1".to_string()], REQ, 10).is_err());
        let args = vec!["x".to_string(), address().to_string(), "1".to_string()];
        assert!(convert_registration_args(&args, REQ, 10).is_err());
        let args = vec!["0".to_string(), "not-an-address".to_string(), "1".to_string()];
        assert!(convert_registration_args(&args, REQ, 10).is_err());
    }

    #[test]
    fn test_convert_args_steals_dust() {
        // First contributor one dust unit short, second has plenty of excess
        let quarter = get_min_node_contribution_in_portions(10, REQ, 0, 0);
        let short = quarter - STAKING_PORTIONS / REQ;
        let rest = STAKING_PORTIONS - short;
        let (a, b) = (address(), address());
        let args = vec![
            "0".to_string(),
            a.to_string(),
            short.to_string(),
            b.to_string(),
            rest.to_string(),
        ];
        let parsed = convert_registration_args(&args, REQ, 10).unwrap();
        assert_eq!(parsed.portions[0], quarter);
        assert_eq!(parsed.portions[0] + parsed.portions[1], STAKING_PORTIONS);
    }
}
