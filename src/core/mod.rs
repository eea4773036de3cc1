//! Core ledger functionality
//!
//! Blocks, transactions, the proof-of-work engine and the chain
//! validator/assembler.

pub mod block;
pub mod blockchain;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{BlockStatus, Blockchain, ChainIterator};
pub use proof_of_work::ProofOfWork;
pub use transaction::{TXInput, TXOutput, Transaction};
