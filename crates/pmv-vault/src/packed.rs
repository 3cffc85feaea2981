//! Per-market vault inventory packed into one 256-bit word.
//!
//! Layout (LSB first):
//!
//! | bits      | field          |
//! |-----------|----------------|
//! | 0..112    | YES shares     |
//! | 112..224  | NO shares      |
//! | 224..256  | last activity  |
//!
//! Every write reads the full word, clears exactly one field's bits and
//! writes the word back. The other two fields must survive bit-for-bit.

use alloy::primitives::U256;
use pmv_core::math::{to_u128, MAX_U112};
use pmv_core::{Side, VaultError, VaultResult};

const SHARES_BITS: usize = 112;
const ACTIVITY_BITS: usize = 32;
const YES_OFFSET: usize = 0;
const NO_OFFSET: usize = 112;
const ACTIVITY_OFFSET: usize = 224;

/// Direction of an inventory adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Increase,
    Decrease,
}

/// Unpacked view of the vault word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VaultInventory {
    pub yes: u128,
    pub no: u128,
    pub last_activity: u32,
}

impl VaultInventory {
    #[must_use]
    pub fn of(&self, side: Side) -> u128 {
        match side {
            Side::Yes => self.yes,
            Side::No => self.no,
        }
    }
}

fn low_mask(bits: usize) -> U256 {
    (U256::from(1u8) << bits) - U256::from(1u8)
}

fn read_field(word: U256, offset: usize, bits: usize) -> U256 {
    (word >> offset) & low_mask(bits)
}

fn write_field(word: U256, offset: usize, bits: usize, value: U256) -> U256 {
    let field = low_mask(bits) << offset;
    (word & !field) | ((value & low_mask(bits)) << offset)
}

/// Vault record for one market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedVaultState(U256);

impl PackedVaultState {
    /// Build a record, rejecting share counts wider than 112 bits.
    pub fn new(yes: u128, no: u128, last_activity: u32) -> VaultResult<Self> {
        let mut state = Self::default();
        state.set_shares(Side::Yes, yes)?;
        state.set_shares(Side::No, no)?;
        state.touch_activity(last_activity);
        Ok(state)
    }

    #[must_use]
    pub fn from_word(word: U256) -> Self {
        Self(word)
    }

    #[must_use]
    pub fn word(&self) -> U256 {
        self.0
    }

    #[must_use]
    pub fn yes_shares(&self) -> u128 {
        to_u128(read_field(self.0, YES_OFFSET, SHARES_BITS)).unwrap_or(0)
    }

    #[must_use]
    pub fn no_shares(&self) -> u128 {
        to_u128(read_field(self.0, NO_OFFSET, SHARES_BITS)).unwrap_or(0)
    }

    #[must_use]
    pub fn shares(&self, side: Side) -> u128 {
        match side {
            Side::Yes => self.yes_shares(),
            Side::No => self.no_shares(),
        }
    }

    #[must_use]
    pub fn last_activity(&self) -> u32 {
        to_u128(read_field(self.0, ACTIVITY_OFFSET, ACTIVITY_BITS))
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn inventory(&self) -> VaultInventory {
        VaultInventory {
            yes: self.yes_shares(),
            no: self.no_shares(),
            last_activity: self.last_activity(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.yes_shares() == 0 && self.no_shares() == 0
    }

    fn write_yes(&mut self, value: u128) {
        self.0 = write_field(self.0, YES_OFFSET, SHARES_BITS, U256::from(value));
    }

    fn write_no(&mut self, value: u128) {
        self.0 = write_field(self.0, NO_OFFSET, SHARES_BITS, U256::from(value));
    }

    fn write_activity(&mut self, value: u32) {
        self.0 = write_field(self.0, ACTIVITY_OFFSET, ACTIVITY_BITS, U256::from(value));
    }

    fn set_shares(&mut self, side: Side, value: u128) -> VaultResult<()> {
        if value > MAX_U112 {
            return Err(VaultError::Overflow("vault shares exceed 112 bits"));
        }
        match side {
            Side::Yes => self.write_yes(value),
            Side::No => self.write_no(value),
        }
        Ok(())
    }

    /// Add or remove `delta` shares on one side, returning the new amount.
    ///
    /// Removing more than is held fails and leaves the word untouched.
    pub fn adjust_side(&mut self, side: Side, delta: u128, sign: Sign) -> VaultResult<u128> {
        let current = self.shares(side);
        let next = match sign {
            Sign::Increase => current
                .checked_add(delta)
                .ok_or(VaultError::Overflow("vault shares"))?,
            Sign::Decrease => current
                .checked_sub(delta)
                .ok_or(VaultError::Overflow("vault inventory underflow"))?,
        };
        self.set_shares(side, next)?;
        Ok(next)
    }

    pub fn touch_activity(&mut self, timestamp: u32) {
        self.write_activity(timestamp);
    }
}
