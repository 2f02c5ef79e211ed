//! Merkle proofs over wallet address sets
//!
//! Builds a binary hash tree from a list of wallet addresses and extracts
//! inclusion proofs for a single target address.
//!
//! # Design
//!
//! - Leaves are Keccak-256 of the address bytes as supplied
//! - Duplicate addresses collapse to one leaf (first occurrence wins)
//! - Leaf order is the input order; no sorting step
//! - Pairs are combined canonically: `H(min(a, b) || max(a, b))`
//! - Odd levels pair the last node with itself
//! - Proofs carry the side each sibling occupied before canonical ordering

use crate::types::WalletAddress;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::collections::HashSet;

/// 256-bit node hash
pub type Hash = [u8; 32];

/// Hash a single address into a leaf
pub fn leaf_hash(address: &WalletAddress) -> Hash {
    Keccak256::digest(address.as_bytes()).into()
}

/// Combine two sibling hashes using the canonical (sorted) pairing rule
pub fn hash_pair(a: &Hash, b: &Hash) -> Hash {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Keccak256::new();
    hasher.update(lo);
    hasher.update(hi);
    hasher.finalize().into()
}

/// Encode a hash as `0x`-prefixed lowercase hex
pub fn to_hex(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Parse a `0x`-prefixed (or bare) 32-byte hex string
pub fn parse_hex(s: &str) -> Result<Hash> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw)
        .map_err(|e| Error::Validation(format!("Invalid hash hex '{}': {}", s, e)))?;
    bytes
        .try_into()
        .map_err(|_| Error::Validation(format!("Hash '{}' is not 32 bytes", s)))
}

mod hex_hash {
    use super::{parse_hex, to_hex, Hash};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Side a sibling occupied in the tree, relative to the path node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Sibling is on the left
    Left,
    /// Sibling is on the right
    Right,
}

/// One step of an inclusion proof
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// Sibling hash
    #[serde(with = "hex_hash")]
    pub hash: Hash,
    /// Side the sibling occupied
    pub side: Side,
}

/// Inclusion proof (path from leaf to root)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Leaf being proven
    #[serde(with = "hex_hash")]
    pub leaf: Hash,
    /// Position of the leaf in the deduplicated leaf list
    pub leaf_index: usize,
    /// Sibling hashes from leaf level up to just below the root
    pub steps: Vec<ProofStep>,
    /// Root of the tree the proof was built from
    #[serde(with = "hex_hash")]
    pub root: Hash,
}

impl MerkleProof {
    /// Verify this proof against its own root
    pub fn verify(&self) -> bool {
        verify_proof(&self.steps, &self.leaf, &self.root)
    }

    /// Root recomputed from the leaf and steps
    pub fn computed_root(&self) -> Hash {
        compute_root(&self.steps, &self.leaf)
    }
}

/// Fold proof steps over a leaf with the canonical pairing rule
pub fn compute_root(steps: &[ProofStep], leaf: &Hash) -> Hash {
    steps
        .iter()
        .fold(*leaf, |current, step| hash_pair(&current, &step.hash))
}

/// Recompute the root from `leaf` and `steps` and compare with `expected_root`
pub fn verify_proof(steps: &[ProofStep], leaf: &Hash, expected_root: &Hash) -> bool {
    compute_root(steps, leaf) == *expected_root
}

/// Build a proof for `target` over `addresses`.
///
/// Fails with [`Error::Validation`] on an empty list and
/// [`Error::ProofTargetNotFound`] when the target is not one of the leaves.
pub fn build_proof(addresses: &[WalletAddress], target: &WalletAddress) -> Result<MerkleProof> {
    MerkleTree::from_addresses(addresses)?.prove(target)
}

/// Binary Merkle tree with all levels materialized
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// levels[0] are the leaves, the last level holds the root
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build from wallet addresses
    pub fn from_addresses(addresses: &[WalletAddress]) -> Result<Self> {
        Self::from_leaves(addresses.iter().map(leaf_hash).collect())
    }

    /// Build from leaf hashes, dropping repeated leaves
    pub fn from_leaves(leaves: Vec<Hash>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::Validation(
                "Cannot build tree from empty leaf set".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(leaves.len());
        let leaves: Vec<Hash> = leaves.into_iter().filter(|l| seen.insert(*l)).collect();

        let mut levels = vec![leaves];
        while levels.last().map_or(false, |level| level.len() > 1) {
            let next = Self::next_level(&levels[levels.len() - 1]);
            levels.push(next);
        }

        Ok(Self { levels })
    }

    fn next_level(level: &[Hash]) -> Vec<Hash> {
        level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                // Duplicate last hash if odd
                [last] => hash_pair(last, last),
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect()
    }

    /// Number of distinct leaves
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    /// Always false; construction rejects empty sets
    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    /// Leaf hashes in tree order
    pub fn leaves(&self) -> &[Hash] {
        &self.levels[0]
    }

    /// Tree root
    pub fn root(&self) -> Hash {
        self.levels[self.levels.len() - 1][0]
    }

    /// Index of a leaf hash
    pub fn position(&self, leaf: &Hash) -> Option<usize> {
        self.levels[0].iter().position(|l| l == leaf)
    }

    /// Generate proof for a leaf at given index
    pub fn generate_proof(&self, leaf_index: usize) -> Option<MerkleProof> {
        let leaf = *self.levels[0].get(leaf_index)?;
        let mut steps = Vec::with_capacity(self.levels.len() - 1);
        let mut index = leaf_index;

        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling, side) = if index % 2 == 0 {
                // No right neighbour on an odd level: the node pairs with itself
                (level.get(index + 1).unwrap_or(&level[index]), Side::Right)
            } else {
                (&level[index - 1], Side::Left)
            };
            steps.push(ProofStep {
                hash: *sibling,
                side,
            });
            index /= 2;
        }

        Some(MerkleProof {
            leaf,
            leaf_index,
            steps,
            root: self.root(),
        })
    }

    /// Generate proof for a wallet address
    pub fn prove(&self, target: &WalletAddress) -> Result<MerkleProof> {
        let leaf = leaf_hash(target);
        self.position(&leaf)
            .and_then(|index| self.generate_proof(index))
            .ok_or_else(|| Error::ProofTargetNotFound(target.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(list: &[&str]) -> Vec<WalletAddress> {
        list.iter().map(|a| WalletAddress::new(*a)).collect()
    }

    fn leaf(a: &str) -> Hash {
        leaf_hash(&WalletAddress::new(a))
    }

    #[test]
    fn test_hash_pair_is_order_independent() {
        let a = leaf("0xA");
        let b = leaf("0xB");
        assert_eq!(hash_pair(&a, &b), hash_pair(&b, &a));
        assert_ne!(hash_pair(&a, &b), hash_pair(&a, &a));
    }

    #[test]
    fn test_empty_set_rejected() {
        let result = MerkleTree::from_addresses(&[]);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_single_leaf() {
        let tree = MerkleTree::from_addresses(&addrs(&["0xA"])).unwrap();
        assert_eq!(tree.root(), leaf("0xA"));

        let proof = tree.prove(&WalletAddress::new("0xA")).unwrap();
        assert!(proof.steps.is_empty());
        assert!(proof.verify());
    }

    #[test]
    fn test_four_leaves_scenario() {
        let set = addrs(&["0xA", "0xB", "0xC", "0xD"]);
        let proof = build_proof(&set, &WalletAddress::new("0xB")).unwrap();

        assert_eq!(proof.steps.len(), 2);
        assert_eq!(proof.leaf_index, 1);
        assert_eq!(
            proof.steps[0],
            ProofStep {
                hash: leaf("0xA"),
                side: Side::Left
            }
        );

        let expected_root = hash_pair(
            &hash_pair(&leaf("0xA"), &leaf("0xB")),
            &hash_pair(&leaf("0xC"), &leaf("0xD")),
        );
        assert_eq!(proof.root, expected_root);
        assert!(verify_proof(&proof.steps, &leaf("0xB"), &expected_root));
    }

    #[test]
    fn test_odd_level_duplicates_last_node() {
        let set = addrs(&["0xA", "0xB", "0xC"]);
        let tree = MerkleTree::from_addresses(&set).unwrap();

        let expected_root = hash_pair(
            &hash_pair(&leaf("0xA"), &leaf("0xB")),
            &hash_pair(&leaf("0xC"), &leaf("0xC")),
        );
        assert_eq!(tree.root(), expected_root);

        let proof = tree.prove(&WalletAddress::new("0xC")).unwrap();
        assert_eq!(proof.steps.len(), 2);
        assert_eq!(proof.steps[0].hash, leaf("0xC"));
        assert_eq!(proof.steps[0].side, Side::Right);
        assert!(verify_proof(&proof.steps, &leaf("0xC"), &expected_root));
    }

    #[test]
    fn test_five_leaves_every_proof_verifies() {
        let set = addrs(&["0x1", "0x2", "0x3", "0x4", "0x5"]);
        let tree = MerkleTree::from_addresses(&set).unwrap();
        for address in &set {
            let proof = tree.prove(address).unwrap();
            assert_eq!(proof.steps.len(), 3);
            assert!(verify_proof(&proof.steps, &leaf_hash(address), &tree.root()));
        }
    }

    #[test]
    fn test_duplicates_collapse() {
        let with_dupes = MerkleTree::from_addresses(&addrs(&["0xA", "0xB", "0xA", "0xC"])).unwrap();
        let without = MerkleTree::from_addresses(&addrs(&["0xA", "0xB", "0xC"])).unwrap();
        assert_eq!(with_dupes.len(), 3);
        assert_eq!(with_dupes.root(), without.root());
    }

    #[test]
    fn test_target_not_found() {
        let result = build_proof(&addrs(&["0xA", "0xB"]), &WalletAddress::new("0xZ"));
        assert!(matches!(result, Err(Error::ProofTargetNotFound(t)) if t == "0xZ"));
    }

    #[test]
    fn test_deterministic() {
        let set = addrs(&["0xA", "0xB", "0xC", "0xD", "0xE"]);
        let first = build_proof(&set, &WalletAddress::new("0xD")).unwrap();
        let second = build_proof(&set, &WalletAddress::new("0xD")).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_tampered_proof_rejected() {
        let set = addrs(&["0xA", "0xB", "0xC", "0xD"]);
        let mut proof = build_proof(&set, &WalletAddress::new("0xA")).unwrap();
        proof.steps[1].hash = leaf("0xE");
        assert!(!proof.verify());
    }

    #[test]
    fn test_serialized_shape() {
        let proof = build_proof(&addrs(&["0xA", "0xB"]), &WalletAddress::new("0xA")).unwrap();
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["steps"][0]["side"], "right");
        assert_eq!(json["steps"][0]["hash"], to_hex(&leaf("0xB")));

        let back: MerkleProof = serde_json::from_value(json).unwrap();
        assert_eq!(back, proof);
    }

    #[test]
    fn test_parse_hex() {
        let h = leaf("0xA");
        assert_eq!(parse_hex(&to_hex(&h)).unwrap(), h);
        assert!(parse_hex("0x1234").is_err());
        assert!(parse_hex("zz").is_err());
    }
}
