//! Identifier and symbol newtypes.
//!
//! Composite identifiers use underscore concatenation throughout the data
//! model (`user_poolId`, `user_farmId`, `collectionSymbol_index`, ...); the
//! helpers here centralize that convention so the concatenation format only
//! needs to change in one place.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A token symbol, optionally suffixed with an issuer (`symbol@issuer`).
///
/// The account ledger (C3) keys balances on the full `symbol@issuer` string
/// when an issuer is present, and on the bare symbol otherwise.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn bare(symbol: impl Into<String>) -> Self {
        Symbol(symbol.into())
    }

    pub fn with_issuer(symbol: impl AsRef<str>, issuer: Option<impl AsRef<str>>) -> Self {
        match issuer {
            Some(issuer) => Symbol(format!("{}@{}", symbol.as_ref(), issuer.as_ref())),
            None => Symbol(symbol.as_ref().to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The LP-token symbol for a pool holding `(a, b)`, with the pair's two
    /// token symbols sorted so the symbol is a pure function of the pool's
    /// token set regardless of argument order (avoids storing a reference
    /// back from the LP symbol to the pool — see DESIGN.md open questions).
    pub fn lp_symbol(a: &Symbol, b: &Symbol) -> Symbol {
        let (lo, hi) = if a.0 <= b.0 { (&a.0, &b.0) } else { (&b.0, &a.0) };
        Symbol(format!("LP_{lo}_{hi}"))
    }

    pub fn is_lp_symbol(&self) -> bool {
        self.0.starts_with("LP_")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol(s.to_owned())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Symbol(s)
    }
}

/// Builds an underscore-joined composite key, e.g. `composite_key(&[user, pool_id])`.
pub fn composite_key(parts: &[&str]) -> String {
    parts.join("_")
}

pub fn pool_id(a: &Symbol, b: &Symbol) -> String {
    let (lo, hi) = if a.as_str() <= b.as_str() {
        (a.as_str(), b.as_str())
    } else {
        (b.as_str(), a.as_str())
    };
    format!("{lo}_{hi}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lp_symbol_is_order_independent() {
        let a = Symbol::bare("MRY");
        let b = Symbol::bare("TESTS");
        assert_eq!(Symbol::lp_symbol(&a, &b), Symbol::lp_symbol(&b, &a));
        assert_eq!(Symbol::lp_symbol(&a, &b).as_str(), "LP_MRY_TESTS");
    }

    #[test]
    fn pool_id_is_order_independent() {
        let a = Symbol::bare("MRY");
        let b = Symbol::bare("TESTS");
        assert_eq!(pool_id(&a, &b), pool_id(&b, &a));
    }
}
