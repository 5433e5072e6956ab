//! Account ledger (C3): the sole mutator of account balances.
//!
//! Every other component in this crate adjusts balances exclusively through
//! [`adjust_balance`], matching §5's "Account ledger (C3) is the sole writer
//! of balances" rule.

use sidecore_store::{Account, Store};
use sidecore_types::{Amount, CoreError};

/// `adjustBalance(user, tokenSymbol, deltaSmallest)` (§4.3).
///
/// Loads (or implicitly creates, matching a fresh account having all-zero
/// balances) the account, computes `new = current + delta`, and fails with
/// [`CoreError::InsufficientBalance`] if `new < 0`. Tokens carrying an issuer
/// suffix are keyed on the full `symbol@issuer` string by the caller — this
/// function just keys on whatever string it's handed.
pub async fn adjust_balance(
    store: &Store,
    user: &str,
    token_key: &str,
    delta: &Amount,
) -> Result<Amount, CoreError> {
    let existing = store.accounts.find_one(|a| a.name == user).await;
    let mut account = existing.unwrap_or_else(|| Account::new(user));
    let current = account.balance_of(token_key);
    let new_balance = current.checked_add(delta);

    if new_balance.is_negative() {
        return Err(CoreError::InsufficientBalance {
            symbol: token_key.to_owned(),
            have: current.to_string(),
            need: delta.neg().to_string(),
        });
    }

    account.balances.insert(token_key.to_owned(), new_balance.clone());

    if store.accounts.update_one(|a| a.name == user, |a| a.balances = account.balances.clone()).await {
        // existing account updated in place
    } else {
        store.accounts.insert_one(account).await.map_err(|e| CoreError::Other(e.to_string()))?;
    }

    Ok(new_balance)
}

/// Read-only balance lookup; does not create the account.
pub async fn balance_of(store: &Store, user: &str, token_key: &str) -> Amount {
    store
        .accounts
        .find_one(|a| a.name == user)
        .await
        .map(|a| a.balance_of(token_key))
        .unwrap_or_else(Amount::zero)
}

/// Resolves the ledger key for a token: `symbol@issuer` when an issuer is
/// present, otherwise the bare symbol (§4.3).
pub fn token_key(symbol: &str, issuer: Option<&str>) -> String {
    match issuer {
        Some(issuer) if !issuer.is_empty() => format!("{symbol}@{issuer}"),
        _ => symbol.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn credit_then_debit() {
        let store = Store::new();
        let new_bal = adjust_balance(&store, "alice", "MRY", &Amount::from_i128(100)).await.unwrap();
        assert_eq!(new_bal.to_string(), "100");

        let new_bal = adjust_balance(&store, "alice", "MRY", &Amount::from_i128(-40)).await.unwrap();
        assert_eq!(new_bal.to_string(), "60");
    }

    #[tokio::test]
    async fn overdraft_rejected() {
        let store = Store::new();
        adjust_balance(&store, "alice", "MRY", &Amount::from_i128(10)).await.unwrap();
        let err = adjust_balance(&store, "alice", "MRY", &Amount::from_i128(-20)).await.unwrap_err();
        assert_eq!(err.reason_code(), "insufficient_balance");

        // balance is unchanged after a rejected debit
        assert_eq!(balance_of(&store, "alice", "MRY").await.to_string(), "10");
    }

    #[tokio::test]
    async fn issuer_suffixed_keys_are_distinct() {
        let store = Store::new();
        adjust_balance(&store, "alice", &token_key("USD", Some("bank1")), &Amount::from_i128(5)).await.unwrap();
        adjust_balance(&store, "alice", &token_key("USD", Some("bank2")), &Amount::from_i128(7)).await.unwrap();
        assert_eq!(balance_of(&store, "alice", "USD@bank1").await.to_string(), "5");
        assert_eq!(balance_of(&store, "alice", "USD@bank2").await.to_string(), "7");
        assert_eq!(balance_of(&store, "alice", "USD").await.to_string(), "0");
    }
}
