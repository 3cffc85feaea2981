//! Market books keyed by market id.

use std::collections::HashMap;

use pmv_core::{MarketId, VaultError, VaultResult};

use crate::book::MarketBook;

/// Every market the router knows about.
///
/// Cloned wholesale when an operation starts and swapped back in on
/// success, so a failed operation leaves no partial writes.
#[derive(Debug, Clone, Default)]
pub struct VaultStore {
    books: HashMap<MarketId, MarketBook>,
}

impl VaultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, market: MarketId) -> VaultResult<&MarketBook> {
        self.books
            .get(&market)
            .ok_or(VaultError::UnknownMarket(market.0))
    }

    pub fn get_mut(&mut self, market: MarketId) -> VaultResult<&mut MarketBook> {
        self.books
            .get_mut(&market)
            .ok_or(VaultError::UnknownMarket(market.0))
    }

    #[must_use]
    pub fn contains(&self, market: MarketId) -> bool {
        self.books.contains_key(&market)
    }

    pub fn insert(&mut self, book: MarketBook) -> VaultResult<()> {
        let market = book.market();
        if self.books.contains_key(&market) {
            return Err(VaultError::invalid(format!("market {market} already exists")));
        }
        self.books.insert(market, book);
        Ok(())
    }

    pub fn remove(&mut self, market: MarketId) -> Option<MarketBook> {
        self.books.remove(&market)
    }

    /// Known market ids in ascending order.
    #[must_use]
    pub fn markets(&self) -> Vec<MarketId> {
        let mut ids: Vec<MarketId> = self.books.keys().copied().collect();
        ids.sort_by_key(|m| m.0);
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.books.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
