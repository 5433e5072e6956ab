//! NFT lifecycle (C11): collection/instance management plus the offer
//! escrow state machine (make/cancel/accept).

use std::collections::BTreeMap;

use serde_json::json;

use sidecore_store::{NftCollection, NftInstance, NftOffer, OfferStatus, OfferTargetType, Store};
use sidecore_types::{deterministic_id, Amount, CoreError};

use crate::event::EventSink;
use crate::ledger;

/// `createCollection` (§10.6).
pub async fn create_collection(store: &Store, creator: &str, symbol: &str, max_supply: u64, mintable: bool, burnable: bool, transferable: bool, royalty_bps: u32) -> Result<(), CoreError> {
    if royalty_bps > 10_000 {
        return Err(CoreError::InvalidConfig { detail: format!("royaltyBps {royalty_bps} exceeds 10000") });
    }
    if store.nft_collections.find_one(|c| c.symbol == symbol).await.is_some() {
        return Err(CoreError::Other(format!("collection {symbol} already exists")));
    }
    store
        .nft_collections
        .insert_one(NftCollection { symbol: symbol.to_owned(), creator: creator.to_owned(), current_supply: 0, max_supply, mintable, burnable, transferable, royalty_bps })
        .await
        .map_err(|e| CoreError::Other(e.to_string()))
}

/// `mintInstance` (§10.6).
pub async fn mint_instance(store: &Store, sink: &dyn EventSink, minter: &str, collection_symbol: &str, owner: &str, traits: BTreeMap<String, String>) -> Result<NftInstance, CoreError> {
    let collection = store.nft_collections.find_one(|c| c.symbol == collection_symbol).await.ok_or_else(|| CoreError::CollectionNotFound { symbol: collection_symbol.to_owned() })?;
    if !collection.mintable {
        return Err(CoreError::CollectionNotMintable { symbol: collection_symbol.to_owned() });
    }
    if collection.current_supply >= collection.max_supply {
        return Err(CoreError::CollectionSupplyExceeded { symbol: collection_symbol.to_owned() });
    }

    let index = collection.current_supply;
    let instance = NftInstance { collection_symbol: collection_symbol.to_owned(), index, owner: owner.to_owned(), traits, burned: false };
    store.nft_instances.insert_one(instance.clone()).await.map_err(|e| CoreError::Other(e.to_string()))?;
    store.nft_collections.update_one(|c| c.symbol == collection_symbol, |c| c.current_supply += 1).await;

    sink.log_event("nft", "nft_minted", minter, json!({"collectionSymbol": collection_symbol, "index": index, "owner": owner}), None).await;

    Ok(instance)
}

/// `transferInstance` (§10.6).
pub async fn transfer_instance(store: &Store, sink: &dyn EventSink, from: &str, collection_symbol: &str, index: u64, to: &str) -> Result<(), CoreError> {
    let key = NftInstance::composite_key(collection_symbol, index);
    let instance = store.nft_instances.find_one(|i| NftInstance::composite_key(&i.collection_symbol, i.index) == key).await.ok_or_else(|| CoreError::NftInstanceNotFound { instance_id: key.clone() })?;
    if instance.owner != from {
        return Err(CoreError::NotNftOwner { instance_id: key, actor: from.to_owned() });
    }
    if instance.burned {
        return Err(CoreError::NotTransferable);
    }
    let collection = store.nft_collections.find_one(|c| c.symbol == collection_symbol).await.ok_or_else(|| CoreError::CollectionNotFound { symbol: collection_symbol.to_owned() })?;
    if !collection.transferable {
        return Err(CoreError::NotTransferable);
    }

    store.nft_instances.update_one(|i| NftInstance::composite_key(&i.collection_symbol, i.index) == key, |i| i.owner = to.to_owned()).await;
    sink.log_event("nft", "nft_transferred", from, json!({"instanceId": key, "to": to}), None).await;
    Ok(())
}

/// `burnInstance` (§10.6): the facade has no delete operator, so burning
/// flags the document rather than removing it.
pub async fn burn_instance(store: &Store, sink: &dyn EventSink, owner: &str, collection_symbol: &str, index: u64) -> Result<(), CoreError> {
    let key = NftInstance::composite_key(collection_symbol, index);
    let instance = store.nft_instances.find_one(|i| NftInstance::composite_key(&i.collection_symbol, i.index) == key).await.ok_or_else(|| CoreError::NftInstanceNotFound { instance_id: key.clone() })?;
    if instance.owner != owner {
        return Err(CoreError::NotNftOwner { instance_id: key, actor: owner.to_owned() });
    }
    let collection = store.nft_collections.find_one(|c| c.symbol == collection_symbol).await.ok_or_else(|| CoreError::CollectionNotFound { symbol: collection_symbol.to_owned() })?;
    if !collection.burnable {
        return Err(CoreError::CollectionNotBurnable { symbol: collection_symbol.to_owned() });
    }

    store.nft_instances.update_one(|i| NftInstance::composite_key(&i.collection_symbol, i.index) == key, |i| i.burned = true).await;
    sink.log_event("nft", "nft_burned", owner, json!({"instanceId": key}), None).await;
    Ok(())
}

fn resolve_target_owner(instance: Option<&NftInstance>) -> Option<String> {
    instance.map(|i| i.owner.clone())
}

/// `makeOffer` (§4.11).
#[allow(clippy::too_many_arguments)]
pub async fn make_offer(
    store: &Store,
    sink: &dyn EventSink,
    user: &str,
    target_type: OfferTargetType,
    target_id: &str,
    offer_amount: &Amount,
    payment_token_key: &str,
    expires_at: Option<i64>,
    traits: Option<BTreeMap<String, String>>,
    now_ms: i64,
) -> Result<NftOffer, CoreError> {
    if !offer_amount.is_positive() {
        return Err(CoreError::ZeroAmount);
    }
    if let Some(exp) = expires_at {
        if exp <= now_ms {
            return Err(CoreError::ExpirationInPast);
        }
    }

    match target_type {
        OfferTargetType::Nft => {
            let instance = store.nft_instances.find_one(|i| NftInstance::composite_key(&i.collection_symbol, i.index) == target_id).await;
            let Some(instance) = instance else { return Err(CoreError::InvalidTarget { target_type: "NFT".into(), target_id: target_id.to_owned() }) };
            if instance.burned {
                return Err(CoreError::NotTransferable);
            }
            if resolve_target_owner(Some(&instance)) == Some(user.to_owned()) {
                return Err(CoreError::SelfOffer);
            }
            let collection = store.nft_collections.find_one(|c| c.symbol == instance.collection_symbol).await.ok_or_else(|| CoreError::CollectionNotFound { symbol: instance.collection_symbol.clone() })?;
            if !collection.transferable {
                return Err(CoreError::NotTransferable);
            }
        }
        OfferTargetType::Collection | OfferTargetType::Trait => {
            let collection = store.nft_collections.find_one(|c| c.symbol == target_id).await;
            let Some(collection) = collection else { return Err(CoreError::InvalidTarget { target_type: format!("{target_type:?}"), target_id: target_id.to_owned() }) };
            if !collection.transferable {
                return Err(CoreError::NotTransferable);
            }
        }
    }

    // Cancel any existing ACTIVE offer from the same buyer for the same target and refund its escrow.
    if let Some(prior) = store.nft_offers.find_one(|o| o.offer_by == user && o.target_type == target_type && o.target_id == target_id && matches!(o.status, OfferStatus::Active)).await {
        ledger::adjust_balance(store, &prior.offer_by, &prior.payment_token, &prior.escrowed_amount).await?;
        store.nft_offers.update_one(|o| o.offer_id == prior.offer_id, |o| o.status = OfferStatus::Cancelled).await;
    }

    ledger::adjust_balance(store, user, payment_token_key, &offer_amount.neg()).await?;

    let offer_id = deterministic_id(&[&format!("{target_type:?}"), target_id, user, &now_ms.to_string()]);
    let offer = NftOffer {
        offer_id: offer_id.clone(),
        target_type,
        target_id: target_id.to_owned(),
        offer_by: user.to_owned(),
        offer_amount: offer_amount.clone(),
        payment_token: payment_token_key.to_owned(),
        escrowed_amount: offer_amount.clone(),
        status: OfferStatus::Active,
        expires_at,
        traits,
    };

    if let Err(e) = store.nft_offers.insert_one(offer.clone()).await {
        // Rollback escrow on insert failure.
        ledger::adjust_balance(store, user, payment_token_key, offer_amount).await.ok();
        return Err(CoreError::Other(e.to_string()));
    }

    sink.log_event("nft", "offer_made", user, json!({"offerId": offer_id, "targetType": format!("{target_type:?}"), "targetId": target_id, "offerAmount": offer_amount.to_string()}), None).await;

    Ok(offer)
}

/// `cancelOffer` (§10.6): refunds escrow, marks CANCELLED.
pub async fn cancel_offer(store: &Store, sink: &dyn EventSink, user: &str, offer_id: &str) -> Result<(), CoreError> {
    let offer = store.nft_offers.find_one(|o| o.offer_id == offer_id).await.ok_or_else(|| CoreError::OfferNotFound { offer_id: offer_id.to_owned() })?;
    if offer.offer_by != user {
        return Err(CoreError::NotOfferOwner { offer_id: offer_id.to_owned(), user: user.to_owned() });
    }
    if !matches!(offer.status, OfferStatus::Active) {
        return Err(CoreError::OfferNotActive { offer_id: offer_id.to_owned() });
    }

    ledger::adjust_balance(store, &offer.offer_by, &offer.payment_token, &offer.escrowed_amount).await?;
    store.nft_offers.update_one(|o| o.offer_id == offer_id, |o| o.status = OfferStatus::Cancelled).await;

    sink.log_event("nft", "offer_cancelled", user, json!({"offerId": offer_id}), None).await;
    Ok(())
}

/// `acceptOffer` (§10.6): transfers the NFT, pays escrow out (minus the
/// collection's `royaltyBps` to its creator), marks ACCEPTED.
pub async fn accept_offer(store: &Store, sink: &dyn EventSink, seller: &str, offer_id: &str, collection_symbol: &str, index: u64, now_ms: i64) -> Result<(), CoreError> {
    let offer = store.nft_offers.find_one(|o| o.offer_id == offer_id).await.ok_or_else(|| CoreError::OfferNotFound { offer_id: offer_id.to_owned() })?;
    if !matches!(offer.status, OfferStatus::Active) {
        return Err(CoreError::OfferNotActive { offer_id: offer_id.to_owned() });
    }
    if let Some(exp) = offer.expires_at {
        if exp <= now_ms {
            return Err(CoreError::OfferExpired { offer_id: offer_id.to_owned() });
        }
    }

    let key = NftInstance::composite_key(collection_symbol, index);
    let instance = store.nft_instances.find_one(|i| NftInstance::composite_key(&i.collection_symbol, i.index) == key).await.ok_or_else(|| CoreError::NftInstanceNotFound { instance_id: key.clone() })?;
    if instance.owner != seller {
        return Err(CoreError::NotNftOwner { instance_id: key, actor: seller.to_owned() });
    }

    match offer.target_type {
        OfferTargetType::Nft if offer.target_id != key => return Err(CoreError::InvalidTarget { target_type: "NFT".into(), target_id: offer.target_id.clone() }),
        OfferTargetType::Collection | OfferTargetType::Trait if offer.target_id != collection_symbol => {
            return Err(CoreError::InvalidTarget { target_type: format!("{:?}", offer.target_type), target_id: offer.target_id.clone() });
        }
        _ => {}
    }
    if offer.target_type == OfferTargetType::Trait {
        if let Some(wanted) = &offer.traits {
            let matches_all = wanted.iter().all(|(k, v)| instance.traits.get(k) == Some(v));
            if !matches_all {
                return Err(CoreError::InvalidTarget { target_type: "TRAIT".into(), target_id: offer.target_id.clone() });
            }
        }
    }

    let collection = store.nft_collections.find_one(|c| c.symbol == collection_symbol).await.ok_or_else(|| CoreError::CollectionNotFound { symbol: collection_symbol.to_owned() })?;

    let royalty = offer.escrowed_amount.checked_mul(&Amount::from_i128(collection.royalty_bps as i128)).checked_div(&Amount::from_i128(10_000)).unwrap_or_else(Amount::zero);
    let seller_proceeds = offer.escrowed_amount.checked_sub(&royalty);

    ledger::adjust_balance(store, seller, &offer.payment_token, &seller_proceeds).await?;
    if royalty.is_positive() && collection.creator != seller {
        ledger::adjust_balance(store, &collection.creator, &offer.payment_token, &royalty).await.ok();
    }

    store.nft_instances.update_one(|i| NftInstance::composite_key(&i.collection_symbol, i.index) == key, |i| i.owner = offer.offer_by.clone()).await;
    store.nft_offers.update_one(|o| o.offer_id == offer_id, |o| o.status = OfferStatus::Accepted).await;

    sink.log_event("nft", "offer_accepted", seller, json!({"offerId": offer_id, "instanceId": key, "royaltyPaid": royalty.to_string()}), None).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidecore_store::Account;
    use crate::event::NoopEventSink;

    #[tokio::test]
    async fn make_offer_escrows_then_cancel_refunds() {
        let store = Store::new();
        store.accounts.insert_one(Account::new("buyer")).await.ok();
        store.accounts.insert_one(Account::new("seller")).await.ok();
        ledger::adjust_balance(&store, "buyer", "MRY", &Amount::from_i128(1000)).await.unwrap();
        create_collection(&store, "seller", "APES", 100, true, true, true, 500).await.unwrap();
        mint_instance(&store, &NoopEventSink, "seller", "APES", "seller", BTreeMap::new()).await.unwrap();

        let sink = NoopEventSink;
        let offer = make_offer(&store, &sink, "buyer", OfferTargetType::Nft, "APES_0", &Amount::from_i128(500), "MRY", None, None, 1).await.unwrap();
        assert_eq!(ledger::balance_of(&store, "buyer", "MRY").await.to_string(), "500");

        cancel_offer(&store, &sink, "buyer", &offer.offer_id).await.unwrap();
        assert_eq!(ledger::balance_of(&store, "buyer", "MRY").await.to_string(), "1000");
    }

    #[tokio::test]
    async fn accept_offer_pays_royalty_to_creator() {
        let store = Store::new();
        store.accounts.insert_one(Account::new("buyer")).await.ok();
        store.accounts.insert_one(Account::new("seller")).await.ok();
        store.accounts.insert_one(Account::new("creator")).await.ok();
        ledger::adjust_balance(&store, "buyer", "MRY", &Amount::from_i128(1000)).await.unwrap();
        create_collection(&store, "creator", "APES", 100, true, true, true, 1000).await.unwrap();
        mint_instance(&store, &NoopEventSink, "creator", "APES", "seller", BTreeMap::new()).await.unwrap();

        let sink = NoopEventSink;
        let offer = make_offer(&store, &sink, "buyer", OfferTargetType::Nft, "APES_0", &Amount::from_i128(1000), "MRY", None, None, 1).await.unwrap();
        accept_offer(&store, &sink, "seller", &offer.offer_id, "APES", 0, 2).await.unwrap();

        assert_eq!(ledger::balance_of(&store, "seller", "MRY").await.to_string(), "900");
        assert_eq!(ledger::balance_of(&store, "creator", "MRY").await.to_string(), "100");
        let instance = store.nft_instances.find_one(|i| i.collection_symbol == "APES" && i.index == 0).await.unwrap();
        assert_eq!(instance.owner, "buyer");
    }
}
