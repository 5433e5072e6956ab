//! Vesting (C10): cliff-then-linear allocation schedules drawn from a
//! launchpad's tokenomics snapshot.

use serde_json::json;

use sidecore_store::{Store, VestingState};
use sidecore_types::{Amount, CoreError};

use crate::event::EventSink;
use crate::ledger;

pub struct ClaimResult {
    pub claimed: Amount,
    pub is_fully_claimed: bool,
}

/// `availableToClaim(t)` (§4.10): zero before the cliff, otherwise
/// `min(totalAllocated·elapsed/duration, totalAllocated) − totalClaimed`.
/// `vesting_start_timestamp` and `now_ms` are both milliseconds;
/// `cliffSeconds`/`durationSeconds` are compared against elapsed seconds.
pub fn available_to_claim(state: &VestingState, now_ms: i64) -> Amount {
    let elapsed_ms = (now_ms - state.vesting_start_timestamp).max(0);
    let elapsed_secs = elapsed_ms / 1000;
    if elapsed_secs < state.schedule.cliff_seconds {
        return Amount::zero();
    }
    let vested = if state.schedule.duration_seconds <= 0 {
        state.total_allocated.clone()
    } else {
        let elapsed = Amount::from_i128(elapsed_secs as i128);
        let duration = Amount::from_i128(state.schedule.duration_seconds as i128);
        state.total_allocated.checked_mul(&elapsed).checked_div(&duration).unwrap_or_else(Amount::zero).min(state.total_allocated.clone())
    };
    let available = vested.checked_sub(&state.total_claimed);
    if available.is_positive() { available } else { Amount::zero() }
}

/// `nextVestingDate(t)` (§4.10): the next schedule boundary (cliff end or
/// full-vest date) strictly after `t`, or `None` once fully vested.
pub fn next_vesting_date(state: &VestingState, now_ms: i64) -> Option<i64> {
    let cliff_ms = state.vesting_start_timestamp + state.schedule.cliff_seconds * 1000;
    let end_ms = state.vesting_start_timestamp + state.schedule.duration_seconds * 1000;
    [cliff_ms, end_ms].into_iter().filter(|&boundary| boundary > now_ms).min()
}

pub fn is_fully_claimed(state: &VestingState) -> bool {
    state.total_claimed == state.total_allocated
}

/// `claim_vesting` (§10.6): debits `availableToClaim` into `totalClaimed`
/// and credits the account ledger.
pub async fn claim_vesting(store: &Store, sink: &dyn EventSink, user: &str, launchpad_id: &str, allocation_type: &str, now_ms: i64) -> Result<ClaimResult, CoreError> {
    let key = VestingState::composite_key(user, launchpad_id, allocation_type);
    let state = store
        .vesting
        .find_one(|s| VestingState::composite_key(&s.user, &s.launchpad_id, &s.allocation_type) == key)
        .await
        .ok_or_else(|| CoreError::VestingNotFound { key: key.clone() })?;

    if is_fully_claimed(&state) {
        return Err(CoreError::AlreadyFullyClaimed { key });
    }

    let claimable = available_to_claim(&state, now_ms);
    if !claimable.is_positive() {
        return Err(CoreError::NothingToClaim { key });
    }

    let new_total_claimed = state.total_claimed.checked_add(&claimable);
    let now_fully_claimed = new_total_claimed >= state.total_allocated;

    store
        .vesting
        .update_one(
            |s| VestingState::composite_key(&s.user, &s.launchpad_id, &s.allocation_type) == key,
            |s| {
                s.total_claimed = new_total_claimed.clone();
                s.is_fully_claimed = now_fully_claimed;
            },
        )
        .await;

    ledger::adjust_balance(store, user, &state.token_symbol, &claimable).await?;

    sink.log_event("vesting", "vesting_claimed", user, json!({"launchpadId": launchpad_id, "allocationType": allocation_type, "claimed": claimable.to_string()}), None).await;

    Ok(ClaimResult { claimed: claimable, is_fully_claimed: now_fully_claimed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidecore_store::{Account, VestingSchedule};
    use crate::event::NoopEventSink;

    fn make_state() -> VestingState {
        VestingState {
            user: "alice".into(),
            launchpad_id: "lp1".into(),
            allocation_type: "seed".into(),
            token_symbol: "MRY".into(),
            total_allocated: Amount::from_i128(1_000_000),
            total_claimed: Amount::zero(),
            vesting_start_timestamp: 0,
            schedule: VestingSchedule { cliff_seconds: 100, duration_seconds: 1_000 },
            is_fully_claimed: false,
        }
    }

    #[test]
    fn nothing_available_before_cliff() {
        let state = make_state();
        assert_eq!(available_to_claim(&state, 50_000), Amount::zero());
    }

    #[test]
    fn linear_vesting_after_cliff() {
        let state = make_state();
        // t = 500s => 500/1000 * 1_000_000 = 500_000
        assert_eq!(available_to_claim(&state, 500_000).to_string(), "500000");
    }

    #[test]
    fn fully_vested_after_duration() {
        let state = make_state();
        assert_eq!(available_to_claim(&state, 2_000_000).to_string(), "1000000");
        assert_eq!(next_vesting_date(&state, 2_000_000), None);
    }

    #[tokio::test]
    async fn claim_credits_ledger_and_advances_checkpoint() {
        let store = Store::new();
        store.accounts.insert_one(Account::new("alice")).await.ok();
        store.vesting.insert_one(make_state()).await.unwrap();
        let sink = NoopEventSink;

        let result = claim_vesting(&store, &sink, "alice", "lp1", "seed", 500_000).await.unwrap();
        assert_eq!(result.claimed.to_string(), "500000");
        assert!(!result.is_fully_claimed);
        assert_eq!(ledger::balance_of(&store, "alice", "MRY").await.to_string(), "500000");
    }
}
