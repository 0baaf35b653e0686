//! The peer-to-peer wire protocol: envelope framing, message codecs and a
//! blocking peer session.
//!
//! Reference: https://en.bitcoin.it/wiki/Protocol_documentation

use crate::block::BlockHeader;
use crate::bloom::BloomFilter;
use crate::constants::{MAINNET_MAGIC, MAINNET_PORT, PROTOCOL_VERSION, TESTNET_MAGIC, USER_AGENT};
use crate::encoding::{
    decode_varint, encode_varint, read_array, read_bytes, read_i32_le, read_i64_le, read_u32_le,
    read_u64_le,
};
use crate::error::{Error, Result};
use crate::hashing::hash256;
use crate::merkle::{bytes_to_bit_field, PartialMerkleTree};
use crate::types::{reverse, reverse_hash, Hash256};
use std::io::{Cursor, Read, Write};
use tracing::debug;

/// A network address as carried in addr-bearing messages: 30 bytes on the
/// wire, 26 inside `version` (which drops the leading time field).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetAddr {
    pub time: u32,
    pub services: u64,
    /// IPv6 address, or an IPv4 address in v4-mapped form.
    pub ip: [u8; 16],
    pub port: u16,
}

impl Default for NetAddr {
    fn default() -> Self {
        Self { time: 0, services: 0, ip: ipv4_mapped(0, 0, 0, 0), port: MAINNET_PORT }
    }
}

/// The v4-mapped IPv6 form (::ffff:a.b.c.d) of an IPv4 address.
pub fn ipv4_mapped(a: u8, b: u8, c: u8, d: u8) -> [u8; 16] {
    let mut ip = [0u8; 16];
    ip[10] = 0xff;
    ip[11] = 0xff;
    ip[12..].copy_from_slice(&[a, b, c, d]);
    ip
}

impl NetAddr {
    /// The 30-byte wire form: time, services, ip, port (port big-endian).
    pub fn serialize(&self) -> [u8; 30] {
        let mut out = [0u8; 30];
        out[..4].copy_from_slice(&self.time.to_le_bytes());
        out[4..12].copy_from_slice(&self.services.to_le_bytes());
        out[12..28].copy_from_slice(&self.ip);
        out[28..].copy_from_slice(&self.port.to_be_bytes());
        out
    }

    /// The 26-byte form used inside `version`, without the time.
    pub fn serialize_version(&self) -> [u8; 26] {
        let mut out = [0u8; 26];
        out.copy_from_slice(&self.serialize()[4..]);
        out
    }

    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let time = read_u32_le(r)?;
        let mut addr = Self::parse_version(r)?;
        addr.time = time;
        Ok(addr)
    }

    pub fn parse_version<R: Read>(r: &mut R) -> Result<Self> {
        let services = read_u64_le(r)?;
        let ip = read_array::<16, _>(r)?;
        let port = u16::from_be_bytes(read_array::<2, _>(r)?);
        Ok(Self { time: 0, services, ip, port })
    }
}

/// The framing around every message: magic, command, length, checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Human-readable command, up to 12 bytes.
    pub command: String,
    pub payload: Vec<u8>,
    pub testnet: bool,
}

impl Envelope {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + self.payload.len());
        out.extend_from_slice(if self.testnet { &TESTNET_MAGIC } else { &MAINNET_MAGIC });
        let mut command = [0u8; 12];
        command[..self.command.len()].copy_from_slice(self.command.as_bytes());
        out.extend_from_slice(&command);
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&hash256(&self.payload)[..4]);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Reads one envelope off the stream.
    ///
    /// Any truncation mid-frame means the connection died, so every short
    /// read surfaces as [`Error::ConnectionReset`]; a checksum mismatch is
    /// reported as such and leaves the stream positioned after the frame.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let magic = read_array::<4, _>(r).map_err(|_| Error::ConnectionReset)?;
        let testnet = match magic {
            MAINNET_MAGIC => false,
            TESTNET_MAGIC => true,
            _ => return Err(Error::BadMagic),
        };

        let command_bytes = read_array::<12, _>(r).map_err(|_| Error::ConnectionReset)?;
        let end = command_bytes.iter().position(|&b| b == 0).unwrap_or(12);
        let command = String::from_utf8_lossy(&command_bytes[..end]).into_owned();

        let payload_len = read_u32_le(r).map_err(|_| Error::ConnectionReset)?;
        let checksum = read_array::<4, _>(r).map_err(|_| Error::ConnectionReset)?;
        let payload =
            read_bytes(r, payload_len as usize).map_err(|_| Error::ConnectionReset)?;

        if hash256(&payload)[..4] != checksum {
            return Err(Error::ChecksumMismatch);
        }
        Ok(Self { command, payload, testnet })
    }
}

/// The `version` handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMsg {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub addr_recv: NetAddr,
    pub addr_sndr: NetAddr,
    /// Random per connection, to detect connections to self.
    pub nonce: u64,
    pub user_agent: String,
    /// Height of the last block the sender has.
    pub height: i32,
    /// Whether the remote should relay transactions, see BIP 37.
    pub relay: bool,
}

impl Default for VersionMsg {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            services: 0,
            timestamp: 0,
            addr_recv: NetAddr::default(),
            addr_sndr: NetAddr::default(),
            nonce: 0,
            user_agent: USER_AGENT.to_string(),
            height: 0,
            relay: false,
        }
    }
}

impl VersionMsg {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.services.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.addr_recv.serialize_version());
        out.extend_from_slice(&self.addr_sndr.serialize_version());
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.extend_from_slice(&encode_varint(self.user_agent.len() as u64));
        out.extend_from_slice(self.user_agent.as_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.push(u8::from(self.relay));
        out
    }

    fn decode<R: Read>(r: &mut R) -> Result<Self> {
        let version = read_i32_le(r)?;
        let services = read_u64_le(r)?;
        let timestamp = read_i64_le(r)?;
        let addr_recv = NetAddr::parse_version(r)?;
        let addr_sndr = NetAddr::parse_version(r)?;
        let nonce = u64::from_be_bytes(read_array::<8, _>(r)?);
        let agent_len = decode_varint(r)? as usize;
        let user_agent = String::from_utf8_lossy(&read_bytes(r, agent_len)?).into_owned();
        let height = read_i32_le(r)?;
        let [relay] = read_array::<1, _>(r)?;
        Ok(Self {
            version,
            services,
            timestamp,
            addr_recv,
            addr_sndr,
            nonce,
            user_agent,
            height,
            relay: relay != 0,
        })
    }
}

/// Requests a batch of headers starting after a known block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetHeadersMsg {
    pub version: i32,
    pub num_hashes: u64,
    /// Block locator, display order.
    pub start_block: Hash256,
    /// Last desired block; all zero asks for as many as possible.
    pub end_block: Hash256,
}

impl GetHeadersMsg {
    pub fn new(start_block: Hash256) -> Self {
        Self { version: PROTOCOL_VERSION, num_hashes: 1, start_block, end_block: [0u8; 32] }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&encode_varint(self.num_hashes));
        out.extend_from_slice(&reverse(&self.start_block));
        out.extend_from_slice(&reverse(&self.end_block));
        out
    }

    fn decode<R: Read>(r: &mut R) -> Result<Self> {
        let version = read_i32_le(r)?;
        let num_hashes = decode_varint(r)?;
        let start_block = reverse_hash(&read_array::<32, _>(r)?);
        let end_block = reverse_hash(&read_array::<32, _>(r)?);
        Ok(Self { version, num_hashes, start_block, end_block })
    }
}

/// A batch of block headers.
///
/// Each header is followed by a transaction count so the same layout can
/// carry full blocks; for a headers reply the count must be zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeadersMsg {
    pub headers: Vec<BlockHeader>,
}

impl HeadersMsg {
    fn encode(&self) -> Vec<u8> {
        let mut out = encode_varint(self.headers.len() as u64);
        for header in &self.headers {
            out.extend_from_slice(&header.serialize());
            out.extend_from_slice(&encode_varint(0));
        }
        out
    }

    fn decode<R: Read>(r: &mut R) -> Result<Self> {
        let count = decode_varint(r)?;
        let mut headers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            headers.push(BlockHeader::parse(r)?);
            if decode_varint(r)? != 0 {
                return Err(Error::HeadersWithTransactions);
            }
        }
        Ok(Self { headers })
    }
}

/// Installs a bloom filter on the remote peer (BIP 37).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterLoadMsg {
    pub filter: BloomFilter,
    pub flags: u8,
}

impl FilterLoadMsg {
    fn encode(&self) -> Result<Vec<u8>> {
        let packed = self.filter.bytes()?;
        let mut out = encode_varint(packed.len() as u64);
        out.extend_from_slice(&packed);
        out.extend_from_slice(&self.filter.num_hashes.to_le_bytes());
        out.extend_from_slice(&self.filter.tweak.to_le_bytes());
        out.push(self.flags);
        Ok(out)
    }

    fn decode<R: Read>(r: &mut R) -> Result<Self> {
        let size = decode_varint(r)?;
        let packed = read_bytes(r, size as usize)?;
        let num_hashes = read_u32_le(r)?;
        let tweak = read_u32_le(r)?;
        let [flags] = read_array::<1, _>(r)?;
        let filter = BloomFilter {
            size: size as u32,
            bit_field: bytes_to_bit_field(&packed),
            num_hashes,
            tweak,
        };
        Ok(Self { filter, flags })
    }
}

pub const TX_DATA_TYPE: u32 = 1;
pub const BLOCK_DATA_TYPE: u32 = 2;
pub const FILTERED_BLOCK_DATA_TYPE: u32 = 3;
pub const COMPACT_BLOCK_DATA_TYPE: u32 = 4;

/// One requested object in a `getdata` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryVector {
    pub inv_type: u32,
    /// Object hash, display order.
    pub hash: Hash256,
}

/// Requests transactions, blocks or filtered blocks by hash.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetDataMsg {
    pub items: Vec<InventoryVector>,
}

impl GetDataMsg {
    pub fn add(&mut self, item: InventoryVector) {
        self.items.push(item);
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = encode_varint(self.items.len() as u64);
        for item in &self.items {
            out.extend_from_slice(&item.inv_type.to_le_bytes());
            out.extend_from_slice(&reverse(&item.hash));
        }
        out
    }

    fn decode<R: Read>(r: &mut R) -> Result<Self> {
        let count = decode_varint(r)?;
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let inv_type = read_u32_le(r)?;
            let hash = reverse_hash(&read_array::<32, _>(r)?);
            items.push(InventoryVector { inv_type, hash });
        }
        Ok(Self { items })
    }
}

/// A filtered block: the header, the total transaction count, and the
/// partial-merkle-tree proof for the matched transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlockMsg {
    pub header: BlockHeader,
    pub total_txs: u32,
    /// Proof hashes, display order.
    pub hashes: Vec<Hash256>,
    pub flags: Vec<u8>,
}

impl MerkleBlockMsg {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.header.serialize());
        out.extend_from_slice(&self.total_txs.to_le_bytes());
        out.extend_from_slice(&encode_varint(self.hashes.len() as u64));
        for hash in &self.hashes {
            out.extend_from_slice(&reverse(hash));
        }
        out.extend_from_slice(&encode_varint(self.flags.len() as u64));
        out.extend_from_slice(&self.flags);
        out
    }

    fn decode<R: Read>(r: &mut R) -> Result<Self> {
        let header = BlockHeader::parse(r)?;
        let total_txs = read_u32_le(r)?;
        let count = decode_varint(r)?;
        let mut hashes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            hashes.push(reverse_hash(&read_array::<32, _>(r)?));
        }
        let flag_len = decode_varint(r)?;
        let flags = read_bytes(r, flag_len as usize)?;
        Ok(Self { header, total_txs, hashes, flags })
    }

    /// Checks the inclusion proof: rebuilds the partial merkle tree from
    /// the flag bits and hashes and compares the root with the header's.
    pub fn verify(&self) -> Result<()> {
        let mut tree = PartialMerkleTree::new(self.total_txs);
        let bits = bytes_to_bit_field(&self.flags);
        let wire_order: Vec<Hash256> = self.hashes.iter().map(reverse_hash).collect();
        tree.populate(&bits, &wire_order)?;
        let root = tree.root().ok_or(Error::MerkleRootMismatch)?;
        if reverse_hash(&root) != self.header.merkle_root {
            return Err(Error::MerkleRootMismatch);
        }
        Ok(())
    }
}

/// Every message the session can exchange, keyed by its command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMsg),
    Verack,
    Ping(u64),
    Pong(u64),
    GetHeaders(GetHeadersMsg),
    Headers(HeadersMsg),
    FilterLoad(FilterLoadMsg),
    GetData(GetDataMsg),
    MerkleBlock(MerkleBlockMsg),
}

impl Message {
    /// The command string carried in the envelope.
    pub fn command(&self) -> &'static str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::GetHeaders(_) => "getheaders",
            Message::Headers(_) => "headers",
            Message::FilterLoad(_) => "filterload",
            Message::GetData(_) => "getdata",
            Message::MerkleBlock(_) => "merkleblock",
        }
    }

    /// The payload bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(match self {
            Message::Version(msg) => msg.encode(),
            Message::Verack => Vec::new(),
            Message::Ping(nonce) | Message::Pong(nonce) => nonce.to_be_bytes().to_vec(),
            Message::GetHeaders(msg) => msg.encode(),
            Message::Headers(msg) => msg.encode(),
            Message::FilterLoad(msg) => msg.encode()?,
            Message::GetData(msg) => msg.encode(),
            Message::MerkleBlock(msg) => msg.encode(),
        })
    }

    /// Decodes a payload for a known command.
    pub fn decode(command: &str, payload: &[u8]) -> Result<Self> {
        let r = &mut Cursor::new(payload);
        match command {
            "version" => Ok(Message::Version(VersionMsg::decode(r)?)),
            "verack" => Ok(Message::Verack),
            "ping" => Ok(Message::Ping(u64::from_be_bytes(read_array::<8, _>(r)?))),
            "pong" => Ok(Message::Pong(u64::from_be_bytes(read_array::<8, _>(r)?))),
            "getheaders" => Ok(Message::GetHeaders(GetHeadersMsg::decode(r)?)),
            "headers" => Ok(Message::Headers(HeadersMsg::decode(r)?)),
            "filterload" => Ok(Message::FilterLoad(FilterLoadMsg::decode(r)?)),
            "getdata" => Ok(Message::GetData(GetDataMsg::decode(r)?)),
            "merkleblock" => Ok(Message::MerkleBlock(MerkleBlockMsg::decode(r)?)),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}

/// Commands that carry nothing the session needs; `wait_for` discards
/// them and keeps reading.
const QUIESCENT_COMMANDS: [&str; 5] =
    ["sendheaders", "sendcmpct", "feefilter", "inv", "addr"];

/// A blocking session with one remote peer over any byte stream.
///
/// The session serializes writes, replies to pings while waiting, and
/// treats a dead stream as fatal; callers drive it from a single thread.
pub struct PeerSession<S> {
    stream: S,
    pub testnet: bool,
    negotiated_version: Option<i32>,
}

impl<S: Read + Write> PeerSession<S> {
    pub fn new(stream: S, testnet: bool) -> Self {
        Self { stream, testnet, negotiated_version: None }
    }

    /// The protocol version agreed during [`PeerSession::handshake`].
    pub fn negotiated_version(&self) -> Option<i32> {
        self.negotiated_version
    }

    /// Consumes the session, returning the underlying stream.
    pub fn into_stream(self) -> S {
        self.stream
    }

    /// The version handshake: send our `version`, await the remote
    /// `version` and `verack`, answer with our `verack`. Both sides then
    /// speak the minimum of the two advertised versions.
    pub fn handshake(&mut self) -> Result<()> {
        self.send(&Message::Version(VersionMsg::default()))?;
        if let Message::Version(remote) = self.wait_for(&["version"])? {
            self.negotiated_version = Some(remote.version.min(PROTOCOL_VERSION));
        }
        self.wait_for(&["verack"])?;
        self.send(&Message::Verack)
    }

    /// Wraps the message in an envelope and pushes it to the stream.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        let envelope = Envelope {
            command: message.command().to_string(),
            payload: message.encode()?,
            testnet: self.testnet,
        };
        debug!(command = message.command(), "sending");
        self.stream.write_all(&envelope.serialize())?;
        Ok(())
    }

    /// Reads one envelope off the stream.
    pub fn read(&mut self) -> Result<Envelope> {
        Envelope::parse(&mut self.stream)
    }

    /// Reads envelopes until one of the awaited commands arrives, then
    /// parses and returns it.
    ///
    /// Pings are answered with pongs, checksum-failed frames are skipped,
    /// and the quiescent commands are discarded; anything else fails with
    /// [`Error::UnknownCommand`] so protocol drift stays visible.
    pub fn wait_for(&mut self, commands: &[&str]) -> Result<Message> {
        loop {
            let envelope = match self.read() {
                Ok(envelope) => envelope,
                Err(Error::ChecksumMismatch) => continue,
                Err(e) => return Err(e),
            };
            debug!(command = %envelope.command, "received");

            if commands.contains(&envelope.command.as_str()) {
                return Message::decode(&envelope.command, &envelope.payload);
            }
            match envelope.command.as_str() {
                "ping" => {
                    if let Message::Ping(nonce) = Message::decode("ping", &envelope.payload)? {
                        self.send(&Message::Pong(nonce))?;
                    }
                }
                quiet if QUIESCENT_COMMANDS.contains(&quiet) => {}
                other => return Err(Error::UnknownCommand(other.to_string())),
            }
        }
    }
}
