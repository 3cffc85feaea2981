//! Identifier and enum types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Market identifier (the outcome-token ledger's market id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId(pub u64);

impl MarketId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome side of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// Get the opposite side.
    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }

    /// Share price of this side given P(YES) in bps.
    #[must_use]
    pub fn price_bps(&self, p_yes_bps: u32) -> u32 {
        match self {
            Self::Yes => p_yes_bps,
            Self::No => 10_000u32.saturating_sub(p_yes_bps),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Venue tag reported with every trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionSource {
    /// Filled from vault inventory.
    Otc,
    /// Filled by minting fresh pairs.
    Mint,
    /// Filled on the external pool.
    Amm,
    /// Sell deposited into the vault.
    Vault,
    /// More than one venue.
    Multi,
}

impl ExecutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Otc => "otc",
            Self::Mint => "mint",
            Self::Amm => "amm",
            Self::Vault => "vault",
            Self::Multi => "mult",
        }
    }

    /// Tag for a set of venues that each filled a non-zero amount.
    ///
    /// Returns `None` when no venue filled.
    #[must_use]
    pub fn from_venues(venues: &[ExecutionSource]) -> Option<Self> {
        match venues {
            [] => None,
            [single] => Some(*single),
            _ => Some(Self::Multi),
        }
    }
}

impl fmt::Display for ExecutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
