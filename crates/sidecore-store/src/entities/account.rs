use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sidecore_types::Amount;

use crate::collection::Document;

/// `Account` (§3): a mapping from token symbol to smallest-unit balance.
/// Created by the external account module; the core only ever mutates
/// balances through the account ledger (C3), never inserts a fresh account
/// from within `sidecore-engine` itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub name: String,
    pub balances: BTreeMap<String, Amount>,
}

impl Account {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), balances: BTreeMap::new() }
    }

    pub fn balance_of(&self, symbol: &str) -> Amount {
        self.balances.get(symbol).cloned().unwrap_or_else(Amount::zero)
    }
}

impl Document for Account {
    fn key(&self) -> String {
        self.name.clone()
    }
}

/// `Token` (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub symbol: String,
    pub precision: u32,
    pub max_supply: Amount,
    pub current_supply: Amount,
    pub mintable: bool,
    pub burnable: bool,
    pub issuer: Option<String>,
}

impl Document for Token {
    fn key(&self) -> String {
        self.symbol.clone()
    }
}
