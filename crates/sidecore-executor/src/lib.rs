//! The serial per-block transaction dispatcher: a `Config` loaded from the
//! recognized options (§6), and `validate`/`process` entry points that route
//! a parsed transaction to the right engine component. Every `process` call
//! uses the transaction's own `ts` as "now" (§6's clock rule) — wall time is
//! reserved for the bridge worker's staleness sweep.

pub mod config;
pub mod tx;

pub use config::Config;
pub use tx::{validate, process, Transaction, TxPayload};
