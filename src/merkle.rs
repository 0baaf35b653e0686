//! Partial merkle trees, the proof structure carried by filtered blocks.
//!
//! A proof is a depth-first sequence of flag bits plus a list of hashes;
//! `populate` rebuilds the tree and the root is compared against a block
//! header's merkle root.

use crate::error::{Error, Result};
use crate::hashing::hash256;
use crate::types::Hash256;

/// hash256 of the two child hashes concatenated.
pub fn merkle_parent(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut cat = [0u8; 64];
    cat[..32].copy_from_slice(left);
    cat[32..].copy_from_slice(right);
    hash256(&cat)
}

/// The classic bottom-up merkle root, duplicating the trailing hash of odd
/// levels.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let right = pair.get(1).unwrap_or(&pair[0]);
            next.push(merkle_parent(&pair[0], right));
        }
        level = next;
    }
    level[0]
}

/// Unpacks bytes into one flag byte per bit, LSB first within each byte.
pub fn bytes_to_bit_field(bytes: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for byte in bytes {
        let mut b = *byte;
        for _ in 0..8 {
            bits.push(b & 1);
            b >>= 1;
        }
    }
    bits
}

/// A merkle tree reconstructed level by level from a filtered-block proof.
///
/// Nodes are `Option<Hash256>` so "unset" is explicit rather than an
/// all-zero sentinel.
#[derive(Debug, Clone)]
pub struct PartialMerkleTree {
    num_leaves: u32,
    max_depth: u32,
    levels: Vec<Vec<Option<Hash256>>>,
}

impl PartialMerkleTree {
    pub fn new(num_leaves: u32) -> Self {
        let max_depth = if num_leaves <= 1 { 0 } else { 32 - (num_leaves - 1).leading_zeros() };
        let levels = (0..=max_depth)
            .map(|depth| {
                let width = num_leaves.div_ceil(1 << (max_depth - depth)) as usize;
                vec![None; width]
            })
            .collect();
        Self { num_leaves, max_depth, levels }
    }

    pub fn num_leaves(&self) -> u32 {
        self.num_leaves
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// The reconstructed root, once populated.
    pub fn root(&self) -> Option<Hash256> {
        self.levels[0][0]
    }

    fn get(&self, depth: usize, index: usize) -> Option<Hash256> {
        self.levels[depth][index]
    }

    fn set(&mut self, depth: usize, index: usize, hash: Hash256) {
        self.levels[depth][index] = Some(hash);
    }

    fn has_right_child(&self, depth: usize, index: usize) -> bool {
        self.levels[depth + 1].len() > index * 2 + 1
    }

    /// Rebuilds the tree from the proof's flag bits (one byte per bit) and
    /// hash list, depth-first.
    ///
    /// At a leaf, one flag and one hash are always consumed. At an
    /// internal node whose left child is unset, one flag decides: 0 takes
    /// the node's hash from the list, 1 descends. Set children are
    /// combined into their parent without consuming anything; a missing
    /// right sibling duplicates the left.
    pub fn populate(&mut self, flag_bits: &[u8], hashes: &[Hash256]) -> Result<()> {
        let max_depth = self.max_depth as usize;
        let mut flags = flag_bits.iter();
        let mut hash_list = hashes.iter();
        let mut depth = 0usize;
        let mut index = 0usize;

        while self.root().is_none() {
            if depth == max_depth {
                flags.next().ok_or(Error::FlagsOrHashesLeftover)?;
                let hash = *hash_list.next().ok_or(Error::FlagsOrHashesLeftover)?;
                self.set(depth, index, hash);
                if depth == 0 {
                    break;
                }
                depth -= 1;
                index /= 2;
            } else if self.get(depth + 1, index * 2).is_none() {
                let flag = *flags.next().ok_or(Error::FlagsOrHashesLeftover)?;
                if flag == 0 {
                    let hash = *hash_list.next().ok_or(Error::FlagsOrHashesLeftover)?;
                    self.set(depth, index, hash);
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    index /= 2;
                } else {
                    depth += 1;
                    index *= 2;
                }
            } else if self.has_right_child(depth, index)
                && self.get(depth + 1, index * 2 + 1).is_none()
            {
                depth += 1;
                index = index * 2 + 1;
            } else {
                let left = self.get(depth + 1, index * 2).expect("left child is set");
                let right = if self.has_right_child(depth, index) {
                    self.get(depth + 1, index * 2 + 1).expect("right child is set")
                } else {
                    left
                };
                self.set(depth, index, merkle_parent(&left, &right));
                if depth == 0 {
                    break;
                }
                depth -= 1;
                index /= 2;
            }
        }

        if hash_list.next().is_some() {
            return Err(Error::FlagsOrHashesLeftover);
        }
        // trailing flag bits are byte padding and must be zero
        if flags.any(|&bit| bit != 0) {
            return Err(Error::FlagsOrHashesLeftover);
        }
        Ok(())
    }
}
