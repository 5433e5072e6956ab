use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sidecore_types::Amount;

use crate::collection::Document;

/// `NftCollection` (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftCollection {
    pub symbol: String,
    pub creator: String,
    pub current_supply: u64,
    pub max_supply: u64,
    pub mintable: bool,
    pub burnable: bool,
    pub transferable: bool,
    pub royalty_bps: u32,
}

impl Document for NftCollection {
    fn key(&self) -> String {
        self.symbol.clone()
    }
}

/// `NftInstance` (§3), keyed `collectionSymbol_index`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftInstance {
    pub collection_symbol: String,
    pub index: u64,
    pub owner: String,
    pub traits: BTreeMap<String, String>,
    /// Burned instances stay in the store (no delete operator in the
    /// document facade) but are no longer transferable or offerable.
    pub burned: bool,
}

impl NftInstance {
    pub fn composite_key(collection_symbol: &str, index: u64) -> String {
        format!("{collection_symbol}_{index}")
    }
}

impl Document for NftInstance {
    fn key(&self) -> String {
        Self::composite_key(&self.collection_symbol, self.index)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OfferTargetType {
    Nft,
    Collection,
    Trait,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OfferStatus {
    Active,
    Accepted,
    Expired,
    Cancelled,
}

/// `NftOffer` (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftOffer {
    pub offer_id: String,
    pub target_type: OfferTargetType,
    pub target_id: String,
    pub offer_by: String,
    pub offer_amount: Amount,
    pub payment_token: String,
    pub escrowed_amount: Amount,
    pub status: OfferStatus,
    pub expires_at: Option<i64>,
    pub traits: Option<BTreeMap<String, String>>,
}

impl Document for NftOffer {
    fn key(&self) -> String {
        self.offer_id.clone()
    }
}
