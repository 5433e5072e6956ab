//! Core domain types shared across the transaction execution core:
//! smallest-unit integer arithmetic (C1), symbol/id newtypes, deterministic
//! ID derivation, and the validation error taxonomy.

pub mod amount;
pub mod error;
pub mod hashing;
pub mod ids;
pub mod math;

pub use amount::Amount;
pub use error::CoreError;
pub use hashing::deterministic_id;
pub use ids::{composite_key, pool_id, Symbol};
pub use math::{fee_growth_delta, fee_growth_payout};
