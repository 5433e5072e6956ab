//! `Config` (§6): the core's recognized runtime options. Plain
//! `serde`-deserializable struct, loaded from a config file plus CLI/env
//! overrides —
//! `bin/bridge-worker` layers `clap`/`dotenvy` on top of this shape rather
//! than this crate depending on either.

use serde::{Deserialize, Serialize};
use sidecore_types::Amount;

fn default_max_value() -> Amount {
    // 2^63 - 1 smallest units; comfortably above any realistic token supply
    // while still fitting an i64 on the wire.
    Amount::from_i128(9_223_372_036_854_775_807)
}

fn default_allowed_chars() -> String {
    "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".to_owned()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub native_token_symbol: String,
    #[serde(default)]
    pub nft_collection_creation_fee: Amount,
    #[serde(default = "default_allowed_chars")]
    pub token_symbol_allowed_chars: String,
    #[serde(default = "default_max_value")]
    pub max_value: Amount,
    pub steem_bridge_account: String,
    pub steem_bridge_active_key: String,
    #[serde(default)]
    pub steem_bridge_enabled: bool,
    pub chain_id: String,
}

impl Config {
    /// Checks a token symbol against `tokenSymbolAllowedChars` (§6), used by
    /// collection/token-creation validation.
    pub fn is_symbol_allowed(&self, symbol: &str) -> bool {
        !symbol.is_empty() && symbol.chars().all(|c| self.token_symbol_allowed_chars.contains(c))
    }

    /// Rejects any smallest-unit amount above `maxValue` (§6), the core's
    /// blanket overflow guard ahead of the arbitrary-precision math itself.
    pub fn is_within_max_value(&self, amount: &Amount) -> bool {
        amount.abs() <= self.max_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            native_token_symbol: "MRY".into(),
            nft_collection_creation_fee: Amount::from_i128(1000),
            token_symbol_allowed_chars: default_allowed_chars(),
            max_value: default_max_value(),
            steem_bridge_account: "bridge".into(),
            steem_bridge_active_key: "key".into(),
            steem_bridge_enabled: true,
            chain_id: "sidecore-1".into(),
        }
    }

    #[test]
    fn rejects_disallowed_symbol_chars() {
        let config = sample();
        assert!(config.is_symbol_allowed("MRY"));
        assert!(!config.is_symbol_allowed("mry"));
        assert!(!config.is_symbol_allowed(""));
    }

    #[test]
    fn enforces_max_value() {
        let config = sample();
        assert!(config.is_within_max_value(&Amount::from_i128(100)));
        assert!(!config.is_within_max_value(&config.max_value.checked_add(&Amount::from_i128(1))));
    }
}
