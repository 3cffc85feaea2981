//! Error types shared by every vault and router operation.

use thiserror::Error;

/// Which timing rule rejected the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingKind {
    /// The market's close time has passed.
    MarketClosed,
    /// Inside the pre-close window where OTC and mint are disabled.
    CloseWindow,
    /// Withdrawal cooldown has not elapsed.
    CooldownActive {
        /// Seconds until the cooldown ends.
        remaining_secs: u64,
    },
    /// Settlement attempted before market close.
    NotClosed,
}

impl std::fmt::Display for TimingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarketClosed => write!(f, "market closed"),
            Self::CloseWindow => write!(f, "within close window"),
            Self::CooldownActive { remaining_secs } => {
                write!(f, "cooldown active ({}s remaining)", remaining_secs)
            }
            Self::NotClosed => write!(f, "market not closed"),
        }
    }
}

/// Errors raised by vault, oracle and router operations.
///
/// Every variant aborts the whole operation; nothing is partially applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Deadline expired: now={now} deadline={deadline}")]
    Expired { now: u64, deadline: u64 },

    #[error("Timing error: {0}")]
    Timing(TimingKind),

    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("Slippage exceeded: got {got}, minimum {min}")]
    Slippage { got: u128, min: u128 },

    #[error("Reentrant call rejected")]
    Reentrancy,

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Arithmetic overflow: {0}")]
    Overflow(&'static str),

    #[error("Unknown market: {0}")]
    UnknownMarket(u64),
}

impl VaultError {
    /// Stable machine-readable code for the error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter(_) => "INVALID_PARAMETER",
            Self::Expired { .. } => "EXPIRED",
            Self::Timing(TimingKind::MarketClosed) => "MARKET_CLOSED",
            Self::Timing(TimingKind::CloseWindow) => "CLOSE_WINDOW",
            Self::Timing(TimingKind::CooldownActive { .. }) => "COOLDOWN_ACTIVE",
            Self::Timing(TimingKind::NotClosed) => "NOT_CLOSED",
            Self::InsufficientLiquidity(_) => "INSUFFICIENT_LIQUIDITY",
            Self::Slippage { .. } => "SLIPPAGE",
            Self::Reentrancy => "REENTRANCY",
            Self::TransferFailed(_) => "TRANSFER_FAILED",
            Self::Overflow(_) => "OVERFLOW",
            Self::UnknownMarket(_) => "UNKNOWN_MARKET",
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn illiquid(msg: impl Into<String>) -> Self {
        Self::InsufficientLiquidity(msg.into())
    }
}

/// Result type alias for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;
