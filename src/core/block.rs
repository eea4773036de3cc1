use crate::config::{GENESIS_DATA, INITIAL_DIFFICULTY};
use crate::core::{ProofOfWork, Transaction};
use crate::error::{ChainError, Result};
use crate::utils::{deserialize, serialize, sha256_digest};
use log::info;
use serde::{Deserialize, Serialize};

/// One block of the chain. The hash covers the previous hash, the
/// description payload, the digest of the transaction ids, the nonce and
/// the difficulty; height links are validated separately.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    pre_block_hash: String,
    hash: String,
    data: String,
    transactions: Vec<Transaction>,
    nonce: u64,
    difficulty: u32,
    height: usize,
}

impl Block {
    /// Build a block linked to `pre_block_hash` and run the proof-of-work
    /// search over `workers` concurrent ranges. Construction only - the
    /// caller decides whether the result ever reaches the store.
    pub fn new_block(
        pre_block_hash: String,
        data: &str,
        transactions: &[Transaction],
        height: usize,
        difficulty: u32,
        workers: usize,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(ChainError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let mut block = Block {
            pre_block_hash,
            hash: String::new(),
            data: data.to_string(),
            transactions: transactions.to_vec(),
            nonce: 0,
            difficulty,
            height,
        };

        info!("Starting proof-of-work for block at height {height} with difficulty {difficulty}");
        let pow = ProofOfWork::new_proof_of_work(block.clone());
        let (nonce, hash) = pow.run(workers)?;
        block.nonce = nonce;
        block.hash = hash.clone();
        info!("Proof-of-work completed for block: {hash}");

        Ok(block)
    }

    /// The genesis block is a fixed thing: deterministic coinbase, the
    /// genesis marker as payload, and a single-worker search so every
    /// node mines the identical nonce.
    pub fn generate_genesis_block() -> Result<Block> {
        let coinbase = Transaction::new_genesis_coinbase();
        Block::new_block(
            String::new(),
            GENESIS_DATA,
            &[coinbase],
            0,
            INITIAL_DIFFICULTY,
            1,
        )
    }

    /// Digest of all transaction ids, in block order.
    pub fn hash_transactions(&self) -> Vec<u8> {
        let mut tx_hashes = vec![];
        for transaction in &self.transactions {
            tx_hashes.extend(transaction.get_id());
        }
        sha256_digest(tx_hashes.as_slice())
    }

    pub fn is_genesis(&self) -> bool {
        self.pre_block_hash.is_empty()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &str {
        self.pre_block_hash.as_str()
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_data(&self) -> &str {
        self.data.as_str()
    }

    pub fn get_height(&self) -> usize {
        self.height
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }
}
