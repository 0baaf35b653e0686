//! Error types shared across the crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Parsing
    #[error("unexpected end of input")]
    ShortRead,

    #[error("unknown network magic")]
    BadMagic,

    #[error("invalid SEC point encoding")]
    BadPointEncoding,

    #[error("malformed DER signature")]
    MalformedDer,

    #[error("script data push exceeds 520 bytes")]
    PushTooLong,

    #[error("transaction has outputs but no inputs")]
    OutputsWithoutInputs,

    #[error("payload checksum doesn't match")]
    ChecksumMismatch,

    #[error("header carries a non-zero transaction count")]
    HeadersWithTransactions,

    // Cryptography
    #[error("point is not on the curve")]
    InvalidPoint,

    #[error("secret scalar out of range [1, n-1]")]
    InvalidScalar,

    // Script
    #[error("opcode {0:#04x} has no evaluator")]
    UnknownOpcode(u8),

    #[error("script type is neither p2pkh nor p2wpkh")]
    UnsupportedScriptType,

    // Consensus
    #[error("fetched transaction id doesn't match the requested id")]
    TxidMismatch,

    #[error("transaction not found: {0}")]
    TxNotFound(String),

    #[error("block hash doesn't satisfy the proof-of-work target")]
    BadPow,

    #[error("previous-block hash doesn't link to the preceding header")]
    BrokenChain,

    #[error("reconstructed merkle root doesn't match the header")]
    MerkleRootMismatch,

    #[error("merkle proof has unconsumed hashes or flag bits")]
    FlagsOrHashesLeftover,

    // Network
    #[error("connection reset")]
    ConnectionReset,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    // Capacity
    #[error("bit field length must be a multiple of 8")]
    BadBitFieldLen,
}

pub type Result<T> = std::result::Result<T, Error>;
