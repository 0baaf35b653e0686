//! The UTXO lookup capability: how transaction verification obtains
//! previous outputs.
//!
//! Transports (HTTP, RPC, local storage) stay outside the crate; the
//! fetcher here owns parsing, content verification and the cache.

use crate::error::{Error, Result};
use crate::transaction::Transaction;
use crate::types::Hash256;
use std::collections::HashMap;
use std::io::Cursor;

/// The capability the transaction module consumes.
///
/// An owned handle is passed to signing and verification, so tests can
/// substitute an in-memory fake and applications can scope their caches.
pub trait UtxoLookup {
    /// Returns the transaction with the given id. `fresh` bypasses any
    /// cache the implementation keeps.
    fn fetch_previous(&mut self, txid: &Hash256, testnet: bool, fresh: bool) -> Result<Transaction>;
}

/// A source of raw transaction bytes keyed by id.
pub trait TxTransport {
    fn fetch_raw(&mut self, txid: &Hash256, testnet: bool) -> Result<Vec<u8>>;
}

/// Content-verifying, caching lookup over any transport.
///
/// Every fetched transaction is parsed and its computed id compared to the
/// requested one, so a lying transport cannot inject outputs.
pub struct CachingFetcher<T> {
    transport: T,
    cache: HashMap<Hash256, Transaction>,
}

impl<T: TxTransport> CachingFetcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport, cache: HashMap::new() }
    }
}

impl<T: TxTransport> UtxoLookup for CachingFetcher<T> {
    fn fetch_previous(&mut self, txid: &Hash256, testnet: bool, fresh: bool) -> Result<Transaction> {
        if !fresh {
            if let Some(cached) = self.cache.get(txid) {
                return Ok(cached.clone());
            }
        }
        let raw = self.transport.fetch_raw(txid, testnet)?;
        let tx = Transaction::parse(&mut Cursor::new(&raw), testnet)?;
        if tx.txid()? != *txid {
            return Err(Error::TxidMismatch);
        }
        self.cache.insert(*txid, tx.clone());
        Ok(tx)
    }
}

/// In-memory lookup for tests and offline verification.
#[derive(Default)]
pub struct MemoryTxStore {
    transactions: HashMap<Hash256, Transaction>,
}

impl MemoryTxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a transaction under its computed id.
    pub fn insert(&mut self, tx: Transaction) -> Result<Hash256> {
        let txid = tx.txid()?;
        self.transactions.insert(txid, tx);
        Ok(txid)
    }

    /// Stores a transaction under a caller-chosen id, for fixtures whose
    /// full previous transaction is not reproduced.
    pub fn insert_as(&mut self, txid: Hash256, tx: Transaction) {
        self.transactions.insert(txid, tx);
    }
}

impl UtxoLookup for MemoryTxStore {
    fn fetch_previous(&mut self, txid: &Hash256, _testnet: bool, _fresh: bool) -> Result<Transaction> {
        self.transactions
            .get(txid)
            .cloned()
            .ok_or_else(|| Error::TxNotFound(hex::encode(txid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{OutPoint, TransactionInput, TransactionOutput};
    use crate::script::Script;

    fn sample_tx() -> Transaction {
        Transaction::new(
            1,
            vec![TransactionInput::new(OutPoint { txid: [7u8; 32], vout: 0 })],
            vec![TransactionOutput { amount: 1000, script_pubkey: Script::default() }],
            0,
            false,
        )
    }

    struct FixedTransport(Vec<u8>, usize);

    impl TxTransport for FixedTransport {
        fn fetch_raw(&mut self, _txid: &Hash256, _testnet: bool) -> Result<Vec<u8>> {
            self.1 += 1;
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryTxStore::new();
        let tx = sample_tx();
        let txid = store.insert(tx.clone()).unwrap();
        assert_eq!(store.fetch_previous(&txid, false, false).unwrap(), tx);
    }

    #[test]
    fn test_memory_store_miss() {
        let mut store = MemoryTxStore::new();
        assert!(store.fetch_previous(&[0u8; 32], false, false).is_err());
    }

    #[test]
    fn test_caching_fetcher_verifies_id() {
        let tx = sample_tx();
        let raw = tx.serialize().unwrap();
        let txid = tx.txid().unwrap();
        let mut fetcher = CachingFetcher::new(FixedTransport(raw, 0));

        assert_eq!(fetcher.fetch_previous(&txid, false, false).unwrap(), tx);
        // a different requested id with the same bytes is a lying transport
        assert!(matches!(
            fetcher.fetch_previous(&[9u8; 32], false, false),
            Err(Error::TxidMismatch)
        ));
    }

    #[test]
    fn test_caching_fetcher_caches() {
        let tx = sample_tx();
        let raw = tx.serialize().unwrap();
        let txid = tx.txid().unwrap();
        let mut fetcher = CachingFetcher::new(FixedTransport(raw, 0));

        fetcher.fetch_previous(&txid, false, false).unwrap();
        fetcher.fetch_previous(&txid, false, false).unwrap();
        assert_eq!(fetcher.transport.1, 1);

        // fresh bypasses the cache
        fetcher.fetch_previous(&txid, false, true).unwrap();
        assert_eq!(fetcher.transport.1, 2);
    }
}
