//! # forgechain
//!
//! A single peer in a proof-of-work gossip ledger. The node keeps an
//! append-only chain in sled, tracks spendable outputs per address,
//! mines blocks under a fixed difficulty target and replicates blocks
//! and transactions to peers over a best-effort JSON/TCP gossip
//! protocol.
//!
//! ## Layout
//! - `core/`: blocks, transactions, the proof-of-work engine and the
//!   chain validator/assembler
//! - `storage/`: derived in-memory state - the UTXO index, the pending
//!   transaction pool and the block admission cache
//! - `network/`: wire messages, the peer pool and the gossip node
//! - `wallet/`: key pairs, addresses and the known-identity registry
//! - `config/`: chain constants and per-node settings
//! - `utils/`: digests, encodings, signatures, serialization
//! - `error/`: the crate-wide error type
//! - `cli/`: clap command surface, dispatched from `main.rs`
//!
//! The commit pipeline is the one path blocks take, mined locally or
//! received from peers: admission cache -> validator -> atomic store
//! commit -> UTXO update -> head advertisement.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

// Re-export commonly used types for convenience
pub use crate::cli::{Command, Opt, PaymentArg};
pub use crate::config::{NodeConfig, GENESIS_DATA, INITIAL_DIFFICULTY, MINING_REWARD};
pub use crate::core::{
    Block, BlockStatus, Blockchain, ChainIterator, ProofOfWork, TXInput, TXOutput, Transaction,
};
pub use crate::error::{ChainError, Result};
pub use crate::network::{ConnectionPool, Message, Node, PeerMeta, UserMeta};
pub use crate::storage::{BlockCache, OutputKey, PendingPool, UnspentOutput, UtxoIndex};
pub use crate::wallet::{
    convert_address, hash_pub_key, validate_address, KnownAddress, KnownAddressBook, Wallet,
    Wallets, ADDRESS_CHECK_SUM_LEN,
};
