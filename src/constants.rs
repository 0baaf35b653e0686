//! Protocol constants.

/// Mainnet wire-protocol magic bytes.
pub const MAINNET_MAGIC: [u8; 4] = [0xf9, 0xbe, 0xb4, 0xd9];

/// Testnet wire-protocol magic bytes.
pub const TESTNET_MAGIC: [u8; 4] = [0x0b, 0x11, 0x09, 0x07];

/// Protocol version advertised during the handshake.
pub const PROTOCOL_VERSION: i32 = 70015;

/// User agent advertised during the handshake.
pub const USER_AGENT: &str = "/lightbtc:0.1/";

/// Default mainnet peer port.
pub const MAINNET_PORT: u16 = 8333;

/// Default testnet peer port.
pub const TESTNET_PORT: u16 = 18333;

/// SIGHASH_ALL signature-hash type.
pub const SIGHASH_ALL: u32 = 1;

/// Seed multiplier of the BIP-37 bloom filter hash schedule.
pub const BIP37_SEED: u32 = 0xfba4c795;

/// The 80-byte mainnet genesis block header.
pub const MAINNET_GENESIS_HEADER: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";

/// The 80-byte testnet genesis block header.
pub const TESTNET_GENESIS_HEADER: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4adae5494dffff001d1aa4ae18";
