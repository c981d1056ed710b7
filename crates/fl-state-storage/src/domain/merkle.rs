//! # Merkle Forest
//!
//! A versioned radix-256 trie over contract state, keyed by
//! `contract_name ‖ key` and content-addressed by node hash. Every
//! update produces a new root by copy-on-write along the affected path;
//! unchanged subtrees are shared between versions, so the forest holds
//! the state commitment of every retained height at once.
//!
//! ## Node hashing
//!
//! A node hashes to SHA-256 over its canonical serialization:
//!
//! ```text
//! u32 BE path length ‖ path bytes ‖ value hash (32 bytes)
//! ‖ u16 BE branch count ‖ (selector byte ‖ child hash)*  (ascending)
//! ```
//!
//! The empty value is represented by `SHA-256("")`, which doubles as the
//! "absent" conclusion in proofs.

use crate::errors::MerkleError;
use shared_crypto::{calc_sha256, EMPTY_SHA256};
use shared_types::{ContractStateDiff, Hash};
use std::collections::HashMap;

/// Radix of the trie: one branch per byte value.
pub const TRIE_RADIX: usize = 256;

/// Monotone identifier of a snapshot root within the forest.
pub type TrieId = u64;

/// A proof is the node sequence from the root to the decision point.
pub type Proof = Vec<MerkleNode>;

/// One trie node: a path compression segment, a value hash, and up to
/// 256 children addressed by the next path byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleNode {
    path: Vec<u8>,
    value_hash: Hash,
    branches: Box<[Option<Hash>; TRIE_RADIX]>,
}

impl MerkleNode {
    fn new(path: Vec<u8>, value_hash: Hash) -> Self {
        Self { path, value_hash, branches: Box::new([None; TRIE_RADIX]) }
    }

    fn empty() -> Self {
        Self::new(Vec::new(), EMPTY_SHA256)
    }

    /// True when this node commits to a real (non-absent) value.
    pub fn has_value(&self) -> bool {
        self.value_hash != EMPTY_SHA256
    }

    fn has_children(&self) -> bool {
        self.branches.iter().any(|b| b.is_some())
    }

    /// Content hash of the canonical serialization.
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(4 + self.path.len() + 32 + 2);
        buf.extend_from_slice(&(self.path.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.path);
        buf.extend_from_slice(&self.value_hash);
        let count = self.branches.iter().filter(|b| b.is_some()).count() as u16;
        buf.extend_from_slice(&count.to_be_bytes());
        for (selector, branch) in self.branches.iter().enumerate() {
            if let Some(child_hash) = branch {
                buf.push(selector as u8);
                buf.extend_from_slice(child_hash);
            }
        }
        calc_sha256(&buf)
    }
}

/// The forest: all retained roots plus the shared node store.
pub struct Forest {
    roots: HashMap<TrieId, Hash>,
    nodes: HashMap<Hash, MerkleNode>,
    top_root: TrieId,
}

impl Default for Forest {
    fn default() -> Self {
        Self::new()
    }
}

impl Forest {
    /// An empty forest: trie id 0 is the empty-state root.
    pub fn new() -> Self {
        let empty = MerkleNode::empty();
        let empty_hash = empty.hash();
        let mut nodes = HashMap::new();
        nodes.insert(empty_hash, empty);
        let mut roots = HashMap::new();
        roots.insert(0, empty_hash);
        Self { roots, nodes, top_root: 0 }
    }

    /// Root hash of one retained trie.
    pub fn root_hash(&self, trie_id: TrieId) -> Result<Hash, MerkleError> {
        self.roots.get(&trie_id).copied().ok_or(MerkleError::UnknownTrie(trie_id))
    }

    /// Root hash of the most recent trie.
    pub fn top_root_hash(&self) -> Hash {
        self.roots[&self.top_root]
    }

    /// Id of the most recent trie.
    pub fn top_root(&self) -> TrieId {
        self.top_root
    }

    /// Append `diffs` to the top trie, producing and retaining a new
    /// version. Returns the new trie id.
    pub fn update(&mut self, diffs: &[ContractStateDiff]) -> TrieId {
        let new_root = self.apply_diffs(self.top_root_hash(), diffs);
        self.top_root += 1;
        self.roots.insert(self.top_root, new_root);
        self.top_root
    }

    /// Compute the root that `diffs` would produce on top of `base`
    /// without retaining a new version. Created nodes stay in the store
    /// (it is content-addressed, so they are reused when the same diff
    /// commits).
    pub fn project(&mut self, base: Hash, diffs: &[ContractStateDiff]) -> Hash {
        self.apply_diffs(base, diffs)
    }

    /// Drop root entries below `keep_from`. Node storage is left in
    /// place; sharing makes per-node refcounting not worth its cost at
    /// this layer.
    pub fn forget_roots_below(&mut self, keep_from: TrieId) {
        self.roots.retain(|id, _| *id >= keep_from);
    }

    fn apply_diffs(&mut self, base: Hash, diffs: &[ContractStateDiff]) -> Hash {
        let mut root = base;
        for diff in diffs {
            for record in &diff.records {
                let path = trie_path(&diff.contract_name, &record.key);
                root = self.add_entry(root, &path, calc_sha256(&record.value));
            }
        }
        root
    }

    fn add_entry(&mut self, root: Hash, path: &[u8], value_hash: Hash) -> Hash {
        let root_node = self
            .nodes
            .get(&root)
            .cloned()
            .unwrap_or_else(|| panic!("forest root {} missing from node store", hex_prefix(&root)));
        let new_root = self.add(root_node, path, value_hash);
        let new_hash = new_root.hash();
        self.nodes.insert(new_hash, new_root);
        new_hash
    }

    /// Insert `value_hash` at `path` under `current`, returning the
    /// replacement node. Children created along the way are saved to the
    /// node store; the caller saves the returned node.
    fn add(&mut self, current: MerkleNode, path: &[u8], value_hash: Hash) -> MerkleNode {
        // Existing node updated in place (new version of it, that is).
        if current.path == path {
            let mut updated = current;
            updated.value_hash = value_hash;
            return updated;
        }

        if path.starts_with(&current.path) {
            // A node with no value and no children carries no
            // information; replace it with a leaf at the full path.
            if !current.has_value() && !current.has_children() {
                return MerkleNode::new(path.to_vec(), value_hash);
            }

            let selector = path[current.path.len()];
            let child_path = &path[current.path.len() + 1..];
            let new_child = match current.branches[selector as usize] {
                Some(child_hash) => {
                    let child = self
                        .nodes
                        .get(&child_hash)
                        .cloned()
                        .unwrap_or_else(|| {
                            panic!("forest child {} missing from node store", hex_prefix(&child_hash))
                        });
                    self.add(child, child_path, value_hash)
                }
                None => MerkleNode::new(child_path.to_vec(), value_hash),
            };
            let mut updated = current;
            self.connect_child(&mut updated, selector, new_child);
            return updated;
        }

        if current.path.starts_with(path) {
            // Insert a new valued node along current's path.
            let selector = current.path[path.len()];
            let mut demoted = current;
            demoted.path = demoted.path[path.len() + 1..].to_vec();
            let mut new_parent = MerkleNode::new(path.to_vec(), value_hash);
            self.connect_child(&mut new_parent, selector, demoted);
            return new_parent;
        }

        // Paths diverge: split at the longest common prefix, current and
        // the new leaf become siblings.
        let split = common_prefix_len(&current.path, path);
        let mut new_parent = MerkleNode::new(path[..split].to_vec(), EMPTY_SHA256);
        let new_leaf = MerkleNode::new(path[split + 1..].to_vec(), value_hash);
        self.connect_child(&mut new_parent, path[split], new_leaf);

        let old_selector = current.path[split];
        let mut demoted = current;
        demoted.path = demoted.path[split + 1..].to_vec();
        self.connect_child(&mut new_parent, old_selector, demoted);
        new_parent
    }

    fn connect_child(&mut self, parent: &mut MerkleNode, selector: u8, child: MerkleNode) {
        let child_hash = child.hash();
        parent.branches[selector as usize] = Some(child_hash);
        self.nodes.insert(child_hash, child);
    }

    /// Extract a verifiable proof for `(contract, key)` in the snapshot
    /// addressed by `trie_id`.
    pub fn get_proof(
        &self,
        trie_id: TrieId,
        contract: &str,
        key: &[u8],
    ) -> Result<Proof, MerkleError> {
        let root_hash = self.root_hash(trie_id)?;
        let full_path = trie_path(contract, key);

        let mut proof = Vec::with_capacity(10);
        let mut current = match self.nodes.get(&root_hash) {
            Some(node) => node.clone(),
            None => return Ok(proof),
        };
        proof.push(current.clone());

        let mut remaining: &[u8] = &full_path;
        while remaining.starts_with(&current.path) {
            remaining = &remaining[current.path.len()..];
            if remaining.is_empty() {
                break;
            }
            let selector = remaining[0];
            remaining = &remaining[1..];
            match current.branches[selector as usize].and_then(|h| self.nodes.get(&h)) {
                Some(next) => {
                    current = next.clone();
                    proof.push(current.clone());
                }
                None => break,
            }
        }
        Ok(proof)
    }
}

/// Check `proof` against `root_hash`: true when it proves `value` for
/// `(contract, key)` — including the absence case, where `value` is the
/// empty byte string. Errors mean the proof itself is inconsistent.
pub fn verify_proof(
    root_hash: Hash,
    proof: &[MerkleNode],
    contract: &str,
    key: &[u8],
    value: &[u8],
) -> Result<bool, MerkleError> {
    let full_path = trie_path(contract, key);
    let proven = determine_value_hash(proof, &full_path, root_hash)?;
    Ok(proven == calc_sha256(value))
}

fn determine_value_hash(
    proof: &[MerkleNode],
    full_path: &[u8],
    root_hash: Hash,
) -> Result<Hash, MerkleError> {
    let mut path = full_path;
    let mut expected_hash = root_hash;

    for node in proof {
        if node.hash() != expected_hash {
            return Err(MerkleError::ProofHashMismatch);
        }

        if path == node.path {
            // Node consumes the remainder of the key.
            return Ok(if node.has_value() { node.value_hash } else { EMPTY_SHA256 });
        }
        if path.len() <= node.path.len() || !path.starts_with(&node.path) {
            // Key diverges from the trie here: proven absent.
            return Ok(EMPTY_SHA256);
        }

        match node.branches[path[node.path.len()] as usize] {
            None => return Ok(EMPTY_SHA256),
            Some(next_hash) => {
                expected_hash = next_hash;
                path = &path[node.path.len() + 1..];
            }
        }
    }

    // Ran out of nodes before reaching a conclusion.
    Err(MerkleError::ProofIncomplete)
}

fn trie_path(contract: &str, key: &[u8]) -> Vec<u8> {
    let mut path = Vec::with_capacity(contract.len() + key.len());
    path.extend_from_slice(contract.as_bytes());
    path.extend_from_slice(key);
    path
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn hex_prefix(hash: &Hash) -> String {
    hash[..4].iter().map(|b| format!("{:02x}", b)).collect()
}
