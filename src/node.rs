//! Peer nodes and the in-process network registry
//!
//! A [`Node`] holds its own pending-transaction pool and committed block
//! list, and re-validates everything it receives against its full local
//! history before admitting it. Nodes never hold references to each other:
//! the [`Network`] registry owns every node keyed by address and keeps the
//! peer relation as a separate adjacency list, so `connect` creates no
//! cyclic ownership.
//!
//! All operations are synchronous and single-threaded. Broadcasting is a
//! direct blocking call into each peer's `recv`; a receiving node updates
//! local state only and never relays the packet onward.

use crate::error::{ChainError, Result};
use crate::ledger::{evaluate_transactions, validate_blocks};
use crate::packet::{
    block_packet, coinbase_packet, decode, short_hash, tx_packet, Address, Record, TxRecord,
    GENESIS_HASH,
};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use tracing::{debug, info};

/// A single peer: address, pending pool, committed chain, and the link for
/// the next block it generates. Peer membership lives in [`Network`].
#[derive(Debug, Clone)]
pub struct Node {
    pub address: Address,
    pending_txs: Vec<String>,
    blocks: Vec<String>,
    prev_hash: String,
}

impl Node {
    /// Create a node whose address is the truncated digest of `seed`, or of
    /// a fresh random 32-byte value when no seed is given.
    pub fn new(seed: Option<&[u8]>) -> Self {
        let address = match seed {
            Some(seed) => short_hash(seed),
            None => {
                let mut bytes = [0u8; 32];
                OsRng.fill_bytes(&mut bytes);
                short_hash(&bytes)
            }
        };
        Node {
            address,
            pending_txs: Vec::new(),
            blocks: Vec::new(),
            prev_hash: GENESIS_HASH.to_string(),
        }
    }

    /// Serialized transaction packets admitted but not yet in a block.
    pub fn pending_txs(&self) -> &[String] {
        &self.pending_txs
    }

    /// Serialized block packets committed to this node's chain.
    pub fn blocks(&self) -> &[String] {
        &self.blocks
    }

    /// The node's full transaction history: every transaction inside every
    /// committed block in block order, then the pending pool in order.
    fn all_txs(&self) -> Result<Vec<TxRecord>> {
        let mut txs = Vec::new();
        for serialized_block in &self.blocks {
            let block = match decode(serialized_block)?.record {
                Record::Block(block) => block,
                other => {
                    return Err(ChainError::InvalidBlock(format!(
                        "Block packet type error: {} != block",
                        other.type_name()
                    )))
                }
            };
            for serialized_tx in &block.txs {
                match decode(serialized_tx)?.record {
                    Record::Tx(tx) => txs.push(tx),
                    other => {
                        return Err(ChainError::InvalidBlock(format!(
                            "Tx packet type error: {} != tx",
                            other.type_name()
                        )))
                    }
                }
            }
        }
        for serialized_tx in &self.pending_txs {
            match decode(serialized_tx)?.record {
                Record::Tx(tx) => txs.push(tx),
                other => {
                    return Err(ChainError::InvalidTransaction(format!(
                        "Tx packet type error: {} != tx",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(txs)
    }

    /// Balance of `address` after replaying the full local history,
    /// committed blocks first, then pending transactions. Replaying per call
    /// is the contract here; an incremental balance cache is a production
    /// optimization this engine deliberately does not carry.
    pub fn balance_of(&self, address: &str) -> Result<i64> {
        let wallets = evaluate_transactions(&self.all_txs()?)?;
        Ok(wallets.get(address).copied().unwrap_or(0))
    }

    /// Balance of this node's own address.
    pub fn balance(&self) -> Result<i64> {
        self.balance_of(&self.address)
    }

    /// Mint a coinbase to self, wrap it with the pending pool into a new
    /// block linked to the current chain tip, and commit the block locally.
    /// Returns the block's serialized bytes for broadcasting. Cannot fail
    /// validation: the pending pool was validated on admission.
    fn generate_block(&mut self) -> String {
        let coinbase = coinbase_packet(self.address.clone());
        let mut txs = vec![coinbase.serialized];
        txs.append(&mut self.pending_txs);

        let block = block_packet(txs, &self.prev_hash);
        self.prev_hash = block.hash.clone();
        self.blocks.push(block.serialized.clone());
        block.serialized
    }

    /// Build a transfer from self, admit it to the pending pool, and return
    /// its serialized bytes for broadcasting. Fails with `InsufficientFunds`
    /// when `amount` exceeds the current balance.
    fn build_transfer(&mut self, send_to: &str, amount: u64) -> Result<String> {
        let balance = self.balance()?;
        // Anything past i64::MAX can never be covered by a balance.
        if i64::try_from(amount).map_or(true, |amount| amount > balance) {
            return Err(ChainError::InsufficientFunds(format!(
                "Insufficient funds: balance {} < amount {}",
                balance, amount
            )));
        }
        let tx = tx_packet(Some(self.address.clone()), send_to.to_string(), amount);
        self.pending_txs.push(tx.serialized.clone());
        Ok(tx.serialized)
    }

    /// Handle an inbound packet. Decodes once and dispatches on the type
    /// discriminator; unrecognized discriminators are silently ignored.
    /// On any validation failure the node's state is left untouched and the
    /// error propagates to whoever delivered the packet.
    pub fn recv(&mut self, packet: &str) -> Result<()> {
        match decode(packet)?.record {
            Record::Tx(tx) => self.receive_tx(packet, tx),
            Record::Block(_) => self.receive_block(packet),
            Record::Unknown => Ok(()),
        }
    }

    fn receive_tx(&mut self, packet: &str, tx: TxRecord) -> Result<()> {
        if tx.is_coinbase() {
            return Err(ChainError::InvalidTransaction(
                "reject CoinbaseTx".to_string(),
            ));
        }
        // Re-validate the full history with the candidate appended before
        // touching the pool.
        let mut txs = self.all_txs()?;
        txs.push(tx);
        evaluate_transactions(&txs)?;

        self.pending_txs.push(packet.to_string());
        Ok(())
    }

    fn receive_block(&mut self, packet: &str) -> Result<()> {
        let mut blocks = self.blocks.clone();
        blocks.push(packet.to_string());
        validate_blocks(&blocks)?;

        self.blocks.push(packet.to_string());
        Ok(())
    }
}

/// Registry of nodes plus the peer relation between them.
///
/// Peers are kept as unordered address pairs in insertion order. The
/// relation is symmetric and the registry does not deduplicate pairs or
/// prevent cycles; that is the caller's concern, as it was in the source
/// model where `connect` pushed each node into the other's peer list.
#[derive(Debug, Default)]
pub struct Network {
    nodes: HashMap<Address, Node>,
    links: Vec<(Address, Address)>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a node with a random identity. Returns its address.
    pub fn spawn(&mut self) -> Address {
        self.register(Node::new(None))
    }

    /// Create and register a node whose address derives from `seed`.
    pub fn spawn_with_seed(&mut self, seed: &[u8]) -> Address {
        self.register(Node::new(Some(seed)))
    }

    fn register(&mut self, node: Node) -> Address {
        let address = node.address.clone();
        info!(address = %address, "node registered");
        self.nodes.insert(address.clone(), node);
        address
    }

    pub fn node(&self, address: &str) -> Result<&Node> {
        self.nodes
            .get(address)
            .ok_or_else(|| ChainError::UnknownNode(address.to_string()))
    }

    fn node_mut(&mut self, address: &str) -> Result<&mut Node> {
        self.nodes
            .get_mut(address)
            .ok_or_else(|| ChainError::UnknownNode(address.to_string()))
    }

    /// Establish the symmetric peer relation between two registered nodes.
    pub fn connect(&mut self, a: &str, b: &str) -> Result<()> {
        self.node(a)?;
        self.node(b)?;
        info!(a = %a, b = %b, "peers connected");
        self.links.push((a.to_string(), b.to_string()));
        Ok(())
    }

    /// Addresses directly connected to `address`, in link insertion order.
    pub fn peers_of(&self, address: &str) -> Vec<Address> {
        self.links
            .iter()
            .filter_map(|(a, b)| {
                if a == address {
                    Some(b.clone())
                } else if b == address {
                    Some(a.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Generate a block on `address`'s node and broadcast it to its peers.
    pub fn generate(&mut self, address: &str) -> Result<()> {
        let block = self.node_mut(address)?.generate_block();
        info!(address = %address, "block generated");
        self.broadcast(address, &block)
    }

    /// Send `amount` from `address`'s node to `send_to` and broadcast the
    /// transaction to its peers.
    pub fn send(&mut self, address: &str, send_to: &str, amount: u64) -> Result<()> {
        let tx = self.node_mut(address)?.build_transfer(send_to, amount)?;
        info!(address = %address, send_to = %send_to, amount, "transaction sent");
        self.broadcast(address, &tx)
    }

    /// Deliver `packet` to every peer of `origin`, synchronously, in peer
    /// order. No retry, no acknowledgment; the first rejection propagates.
    pub fn broadcast(&mut self, origin: &str, packet: &str) -> Result<()> {
        for peer in self.peers_of(origin) {
            debug!(from = %origin, to = %peer, "delivering packet");
            self.node_mut(&peer)?.recv(packet)?;
        }
        Ok(())
    }

    /// External entry point: hand raw packet bytes to a node's `recv`.
    pub fn deliver(&mut self, address: &str, packet: &str) -> Result<()> {
        self.node_mut(address)?.recv(packet)
    }

    /// Balance of `address` as seen by the node registered at `address`.
    pub fn balance(&self, address: &str) -> Result<i64> {
        self.node(address)?.balance()
    }

    /// Balance of `query` as seen by the node registered at `address`.
    pub fn balance_of(&self, address: &str, query: &str) -> Result<i64> {
        self.node(address)?.balance_of(query)
    }
}
