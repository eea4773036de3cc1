// The chain itself: sled-backed block storage, the consensus validator,
// the assembler that mines candidate blocks, and transaction construction
// against the UTXO index.

use crate::config::{GENESIS_DATA, INITIAL_DIFFICULTY};
use crate::core::{Block, ProofOfWork, TXInput, TXOutput, Transaction};
use crate::error::{ChainError, Result};
use crate::storage::{OutputKey, UtxoIndex};
use crate::wallet::{KnownAddressBook, Wallet};
use data_encoding::HEXLOWER;
use log::info;
use sled::{Db, Tree};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock};

// The store layout: one tree, `lasthash` pointing at the tip, every other
// key a block hash mapping to the serialized block.
const TIP_HASH_KEY: &str = "lasthash";
const BLOCKS_TREE: &str = "blocks";

/// Outcome of consensus validation for a submitted block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Verified,
    WrongGenesis,
    PrevBlockNotFound,
    HashMismatch,
    WrongTxID,
    TooManyCoinbaseTX,
    SourceTXONotFound,
    WrongTXInputSignature,
    InputSumOutputSumMismatch,
    DoubleSpending,
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockStatus::Verified => "Verified",
            BlockStatus::WrongGenesis => "WrongGenesis",
            BlockStatus::PrevBlockNotFound => "PrevBlockNotFound",
            BlockStatus::HashMismatch => "HashMismatch",
            BlockStatus::WrongTxID => "WrongTxID",
            BlockStatus::TooManyCoinbaseTX => "TooManyCoinbaseTX",
            BlockStatus::SourceTXONotFound => "SourceTXONotFound",
            BlockStatus::WrongTXInputSignature => "WrongTXInputSignature",
            BlockStatus::InputSumOutputSumMismatch => "InputSumOutputSumMismatch",
            BlockStatus::DoubleSpending => "DoubleSpending",
        };
        write!(f, "{name}")
    }
}

/// The append-only chain. Tip hash and height are read caches; the store
/// is the source of truth and the last writer on every commit path.
#[derive(Clone)]
pub struct Blockchain {
    tip_hash: Arc<RwLock<String>>,
    height: Arc<RwLock<usize>>,
    db: Db,
}

impl Blockchain {
    /// Open the chain at `db_path`, mining and persisting the genesis
    /// block when the store is empty.
    pub fn init(db_path: &str) -> Result<Blockchain> {
        let db = sled::open(db_path)
            .map_err(|e| ChainError::Database(format!("Failed to open database: {e}")))?;
        let blocks_tree = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| ChainError::Database(format!("Failed to open blocks tree: {e}")))?;

        let data = blocks_tree
            .get(TIP_HASH_KEY)
            .map_err(|e| ChainError::Database(format!("Failed to get tip hash: {e}")))?;

        let (tip_hash, height) = if let Some(data) = data {
            let tip_hash = String::from_utf8(data.to_vec())
                .map_err(|e| ChainError::Database(format!("Invalid tip hash format: {e}")))?;
            let tip_block = Self::read_block(&blocks_tree, tip_hash.as_str())?.ok_or_else(|| {
                ChainError::Database("Tip hash points at a missing block".to_string())
            })?;
            info!("Continuing from saved chain at height {}", tip_block.get_height());
            (tip_hash, tip_block.get_height())
        } else {
            info!("Initiating a new chain");
            let genesis = Block::generate_genesis_block()?;
            let status = Self::validate_genesis(&genesis);
            if status != BlockStatus::Verified {
                return Err(ChainError::InvalidBlock(format!(
                    "Locally mined genesis block failed validation: {status}"
                )));
            }
            Self::update_blocks_tree(&blocks_tree, &genesis)?;
            (genesis.get_hash().to_string(), 0)
        };

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_hash)),
            height: Arc::new(RwLock::new(height)),
            db,
        })
    }

    fn update_blocks_tree(blocks_tree: &Tree, block: &Block) -> Result<()> {
        let block_data = block.serialize()?;
        blocks_tree
            .transaction(|tx_db| {
                tx_db.insert(block.get_hash().as_bytes(), block_data.as_slice())?;
                tx_db.insert(TIP_HASH_KEY, block.get_hash().as_bytes())?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError| {
                ChainError::Database(format!("Failed to update blocks tree: {e}"))
            })?;
        Ok(())
    }

    fn read_block(blocks_tree: &Tree, hash: &str) -> Result<Option<Block>> {
        if let Some(bytes) = blocks_tree
            .get(hash.as_bytes())
            .map_err(|e| ChainError::Database(format!("Failed to get block: {e}")))?
        {
            return Ok(Some(Block::deserialize(bytes.as_ref())?));
        }
        Ok(None)
    }

    fn blocks_tree(&self) -> Result<Tree> {
        self.db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| ChainError::Database(format!("Failed to open blocks tree: {e}")))
    }

    pub fn get_tip_hash(&self) -> String {
        self.tip_hash
            .read()
            .expect("Failed to acquire read lock on tip hash - this should never happen")
            .clone()
    }

    pub fn get_height(&self) -> usize {
        *self
            .height
            .read()
            .expect("Failed to acquire read lock on height - this should never happen")
    }

    fn set_tip(&self, new_tip_hash: &str, new_height: usize) {
        let mut tip_hash = self
            .tip_hash
            .write()
            .expect("Failed to acquire write lock on tip hash - this should never happen");
        let mut height = self
            .height
            .write()
            .expect("Failed to acquire write lock on height - this should never happen");
        *tip_hash = String::from(new_tip_hash);
        *height = new_height;
    }

    /// Assemble a candidate block: the caller's transactions plus a fresh
    /// coinbase paying `miner_address`, linked to the current tip, with
    /// the proof-of-work computed over `workers` search ranges. Pure
    /// construction - nothing touches the store until commit.
    pub fn mine_block(
        &self,
        miner_address: &str,
        data: &str,
        transactions: &[Transaction],
        workers: usize,
    ) -> Result<Block> {
        let mut block_transactions = transactions.to_vec();
        block_transactions.push(Transaction::new_coinbase_tx(miner_address));

        let height = self.get_height() + 1;
        info!(
            "Mining block at height {height} with {} transactions",
            block_transactions.len()
        );
        Block::new_block(
            self.get_tip_hash(),
            data,
            &block_transactions,
            height,
            INITIAL_DIFFICULTY,
            workers,
        )
    }

    /// Run the full consensus checks on a block, in rule order: chain
    /// linkage, proof-of-work, then per-transaction id, source output,
    /// owner signature, in-block double spends, and value conservation.
    pub fn validate_block(
        &self,
        block: &Block,
        utxo: &UtxoIndex,
        address_book: &KnownAddressBook,
    ) -> Result<BlockStatus> {
        if block.is_genesis() {
            return Ok(Self::validate_genesis(block));
        }

        let blocks_tree = self.blocks_tree()?;
        let prev_exists = blocks_tree
            .get(block.get_pre_block_hash().as_bytes())
            .map_err(|e| ChainError::Database(format!("Failed to check previous block: {e}")))?
            .is_some();
        if !prev_exists {
            return Ok(BlockStatus::PrevBlockNotFound);
        }

        if !ProofOfWork::validate(block) {
            return Ok(BlockStatus::HashMismatch);
        }

        let mut coinbase_count = 0;
        let mut spent_in_block: HashSet<OutputKey> = HashSet::new();
        for tx in block.get_transactions() {
            if tx.is_coinbase() {
                coinbase_count += 1;
                if coinbase_count > 1 {
                    return Ok(BlockStatus::TooManyCoinbaseTX);
                }
                continue;
            }

            // never trust the id off the wire
            if tx.hash()?.as_slice() != tx.get_id() {
                return Ok(BlockStatus::WrongTxID);
            }

            let mut input_sum: u64 = 0;
            for input in tx.get_vin() {
                let key = OutputKey {
                    txid: input.get_txid().to_vec(),
                    vout: input.get_vout(),
                };

                let (owner, value) = match utxo.lookup(&key) {
                    Some(entry) => entry,
                    None => return Ok(BlockStatus::SourceTXONotFound),
                };

                let owner_key = match address_book.public_key_of(owner.as_str()) {
                    Some(owner_key) => owner_key,
                    None => return Ok(BlockStatus::WrongTXInputSignature),
                };
                if !input.verify(owner_key.as_slice()) {
                    return Ok(BlockStatus::WrongTXInputSignature);
                }

                if !spent_in_block.insert(key) {
                    return Ok(BlockStatus::DoubleSpending);
                }

                input_sum = match input_sum.checked_add(value) {
                    Some(sum) => sum,
                    None => return Ok(BlockStatus::InputSumOutputSumMismatch),
                };
            }

            if input_sum != tx.output_value() {
                return Ok(BlockStatus::InputSumOutputSumMismatch);
            }
        }

        Ok(BlockStatus::Verified)
    }

    // The genesis block is pinned completely: proof, payload, difficulty
    // and the single coinbase paying the genesis marker.
    fn validate_genesis(block: &Block) -> BlockStatus {
        if !ProofOfWork::validate(block) {
            return BlockStatus::WrongGenesis;
        }
        if block.get_data() != GENESIS_DATA {
            return BlockStatus::WrongGenesis;
        }
        if block.get_difficulty() != INITIAL_DIFFICULTY {
            return BlockStatus::WrongGenesis;
        }
        if block.get_transactions().len() != 1 {
            return BlockStatus::WrongGenesis;
        }
        let tx = &block.get_transactions()[0];
        if !tx.is_coinbase() {
            return BlockStatus::WrongGenesis;
        }
        if !tx.get_vout()[0].belongs_to(GENESIS_DATA) {
            return BlockStatus::WrongGenesis;
        }
        BlockStatus::Verified
    }

    /// Persist a verified block and advance the tip, atomically. The
    /// commit applies only while the block still extends the stored tip;
    /// a stale block leaves everything untouched and returns false. On
    /// success the in-memory caches are refreshed and the UTXO index is
    /// updated before the caller advertises the new head.
    pub fn commit_block(&self, block: &Block, utxo: &UtxoIndex) -> Result<bool> {
        let blocks_tree = self.blocks_tree()?;
        let block_data = block.serialize()?;

        let committed = blocks_tree
            .transaction(|tx_db| {
                let current_tip = tx_db.get(TIP_HASH_KEY)?;
                let extends_tip = match &current_tip {
                    Some(tip) => tip.as_ref() == block.get_pre_block_hash().as_bytes(),
                    None => block.is_genesis(),
                };
                if !extends_tip {
                    return Ok(false);
                }
                tx_db.insert(block.get_hash().as_bytes(), block_data.as_slice())?;
                tx_db.insert(TIP_HASH_KEY, block.get_hash().as_bytes())?;
                Ok(true)
            })
            .map_err(|e: sled::transaction::TransactionError| {
                ChainError::Database(format!("Failed to commit block: {e}"))
            })?;

        if committed {
            self.set_tip(block.get_hash(), block.get_height());
            utxo.apply_block(block);
            info!(
                "Committed block {} at height {}",
                block.get_hash(),
                block.get_height()
            );
        } else {
            info!(
                "Dropped stale block {}: tip moved past {}",
                block.get_hash(),
                block.get_pre_block_hash()
            );
        }
        Ok(committed)
    }

    /// Build a transfer from `from_wallet` to the given destinations,
    /// funded by a spending plan over the sender's unspent outputs, with
    /// change returned to the sender on overshoot.
    pub fn generate_transaction(
        &self,
        from_wallet: &Wallet,
        to_addresses: &[String],
        amounts: &[u64],
        utxo: &UtxoIndex,
    ) -> Result<Transaction> {
        if to_addresses.len() != amounts.len() {
            return Err(ChainError::Transaction(
                "Receiver and amount lists must have the same length".to_string(),
            ));
        }
        if to_addresses.is_empty() {
            return Err(ChainError::Transaction(
                "Transaction needs at least one receiver".to_string(),
            ));
        }

        let total: u64 = amounts.iter().sum();
        let from_address = from_wallet.get_address();
        let (plan_total, plan) = utxo.generate_spending_plan(from_address.as_str(), total);
        if plan_total < total {
            return Err(ChainError::InsufficientFunds {
                required: total,
                available: plan_total,
            });
        }

        let mut inputs = vec![];
        for unspent in &plan {
            let mut input = TXInput::new(unspent.txid.as_slice(), unspent.vout);
            input.sign(from_wallet)?;
            inputs.push(input);
        }

        let mut outputs = vec![];
        for (address, amount) in to_addresses.iter().zip(amounts.iter()) {
            outputs.push(TXOutput::new(*amount, address));
        }
        if plan_total > total {
            outputs.push(TXOutput::new(plan_total - total, from_address.as_str()));
        }

        // the id seals inputs and outputs, so it is computed last
        let tx = Transaction::new(inputs, outputs);
        info!(
            "Generated transaction {} spending {} inputs",
            HEXLOWER.encode(tx.get_id()),
            plan.len()
        );
        Ok(tx)
    }

    pub fn get_block(&self, hash: &str) -> Result<Option<Block>> {
        let blocks_tree = self.blocks_tree()?;
        Self::read_block(&blocks_tree, hash)
    }

    pub fn iterator(&self) -> ChainIterator {
        ChainIterator::new(self.get_tip_hash(), self.db.clone())
    }
}

/// Walks the chain tip -> genesis through the store.
pub struct ChainIterator {
    db: Db,
    current_hash: String,
}

impl ChainIterator {
    fn new(tip_hash: String, db: Db) -> ChainIterator {
        ChainIterator {
            current_hash: tip_hash,
            db,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Block> {
        if self.current_hash.is_empty() {
            return None;
        }
        let blocks_tree = self.db.open_tree(BLOCKS_TREE).ok()?;
        let data = blocks_tree.get(self.current_hash.as_bytes()).ok()??;
        let block = Block::deserialize(data.as_ref()).ok()?;
        self.current_hash = block.get_pre_block_hash().to_string();
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_chain() -> (tempfile::TempDir, Blockchain, UtxoIndex) {
        let dir = tempdir().unwrap();
        let chain = Blockchain::init(dir.path().join("chain").to_str().unwrap()).unwrap();
        let utxo = UtxoIndex::new();
        utxo.rebuild(&chain).unwrap();
        (dir, chain, utxo)
    }

    #[test]
    fn test_init_creates_valid_genesis() {
        let (_dir, chain, utxo) = test_chain();
        assert_eq!(chain.get_height(), 0);

        let genesis = chain.get_block(chain.get_tip_hash().as_str()).unwrap().unwrap();
        let status = chain
            .validate_block(&genesis, &utxo, &KnownAddressBook::new())
            .unwrap();
        assert_eq!(status, BlockStatus::Verified);
        assert_eq!(utxo.total_value(), crate::config::MINING_REWARD);
    }

    #[test]
    fn test_reopen_restores_tip_and_height() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain");
        let tip = {
            let chain = Blockchain::init(path.to_str().unwrap()).unwrap();
            let utxo = UtxoIndex::new();
            utxo.rebuild(&chain).unwrap();
            let block = chain.mine_block("miner", "block 1", &[], 1).unwrap();
            assert!(chain.commit_block(&block, &utxo).unwrap());
            chain.get_tip_hash()
        };

        let chain = Blockchain::init(path.to_str().unwrap()).unwrap();
        assert_eq!(chain.get_tip_hash(), tip);
        assert_eq!(chain.get_height(), 1);
    }

    #[test]
    fn test_commit_advances_height_by_one() {
        let (_dir, chain, utxo) = test_chain();
        for expected_height in 1..=3 {
            let block = chain.mine_block("miner", "block", &[], 2).unwrap();
            assert!(chain.commit_block(&block, &utxo).unwrap());
            assert_eq!(chain.get_height(), expected_height);
        }
        assert_eq!(utxo.total_value(), 4 * crate::config::MINING_REWARD);
    }

    #[test]
    fn test_stale_block_commit_is_a_noop() {
        let (_dir, chain, utxo) = test_chain();
        let first = chain.mine_block("miner", "first", &[], 1).unwrap();
        let rival = chain.mine_block("other-miner", "rival", &[], 1).unwrap();

        assert!(chain.commit_block(&first, &utxo).unwrap());
        // the tip moved, so the sibling no longer extends it
        assert!(!chain.commit_block(&rival, &utxo).unwrap());
        assert_eq!(chain.get_height(), 1);
        assert_eq!(chain.get_tip_hash(), first.get_hash());
    }

    #[test]
    fn test_validate_rejects_unknown_previous_block() {
        let (_dir, chain, utxo) = test_chain();
        let coinbase = Transaction::new_coinbase_tx("miner");
        let orphan = Block::new_block(
            "unknown-parent".to_string(),
            "orphan",
            &[coinbase],
            5,
            INITIAL_DIFFICULTY,
            1,
        )
        .unwrap();

        let status = chain
            .validate_block(&orphan, &utxo, &KnownAddressBook::new())
            .unwrap();
        assert_eq!(status, BlockStatus::PrevBlockNotFound);
    }

    #[test]
    fn test_validate_rejects_two_coinbases() {
        let (_dir, chain, utxo) = test_chain();
        let block = Block::new_block(
            chain.get_tip_hash(),
            "greedy",
            &[
                Transaction::new_coinbase_tx("miner"),
                Transaction::new_coinbase_tx("miner"),
            ],
            1,
            INITIAL_DIFFICULTY,
            1,
        )
        .unwrap();

        let status = chain
            .validate_block(&block, &utxo, &KnownAddressBook::new())
            .unwrap();
        assert_eq!(status, BlockStatus::TooManyCoinbaseTX);
    }

    #[test]
    fn test_generate_transaction_insufficient_funds() {
        let (_dir, chain, utxo) = test_chain();
        let wallet = Wallet::new().unwrap();
        let result = chain.generate_transaction(
            &wallet,
            &["somewhere".to_string()],
            &[10],
            &utxo,
        );
        match result {
            Err(ChainError::InsufficientFunds {
                required,
                available,
            }) => {
                assert_eq!(required, 10);
                assert_eq!(available, 0);
            }
            other => panic!("Expected InsufficientFunds, got {other:?}"),
        }
    }
}
