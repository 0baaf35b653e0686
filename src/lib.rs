//! # lightbtc
//!
//! The protocol core a Bitcoin light client needs: secp256k1 ECDSA with
//! deterministic nonces, the Script interpreter for p2pkh and native
//! p2wpkh spends, transaction construction with both signature-hash
//! algorithms, block-header validation, BIP-37 bloom filters with
//! partial-merkle-tree proofs, and the peer wire protocol.
//!
//! Transports stay outside the crate: the peer session runs over any
//! `Read + Write` byte stream, and previous transactions are supplied
//! through the [`fetcher::UtxoLookup`] capability.
//!
//! ## Example
//!
//! ```rust
//! use lightbtc::block::BlockHeader;
//!
//! let genesis = BlockHeader::genesis(false);
//! assert!(genesis.verify_pow());
//! assert_eq!(
//!     genesis.id(),
//!     "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
//! );
//! ```

pub mod address;
pub mod block;
pub mod bloom;
pub mod constants;
pub mod curve;
pub mod ecdsa;
pub mod encoding;
pub mod error;
pub mod fetcher;
pub mod hashing;
pub mod merkle;
pub mod network;
pub mod script;
pub mod transaction;
pub mod types;

pub use block::BlockHeader;
pub use bloom::BloomFilter;
pub use ecdsa::{PrivateKey, PublicKey, Signature};
pub use error::{Error, Result};
pub use fetcher::{CachingFetcher, MemoryTxStore, TxTransport, UtxoLookup};
pub use merkle::PartialMerkleTree;
pub use network::{Envelope, Message, PeerSession};
pub use script::{Command, Script};
pub use transaction::{OutPoint, Transaction, TransactionInput, TransactionOutput};
pub use types::{Hash160, Hash256};
