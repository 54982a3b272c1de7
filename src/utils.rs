//! Address minting for accounts

use bech32::{Bech32m, Hrp};
use uuid7::uuid7;

pub const ACCOUNT_PREFIX: &str = "user_";

/// Fresh time-ordered address under `prefix`, bech32m encoded.
pub fn mint_address(prefix: &str) -> anyhow::Result<String> {
    let hrp = Hrp::parse(prefix)?;
    Ok(bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?)
}

/// True when `address` decodes and carries `prefix`.
pub fn is_address(address: &str, prefix: &str) -> bool {
    match (bech32::decode(address), Hrp::parse(prefix)) {
        (Ok((hrp, data)), Ok(expected)) => hrp == expected && data.len() == 16,
        _ => false,
    }
}
