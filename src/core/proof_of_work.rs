use crate::core::Block;
use crate::error::{ChainError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::info;
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

pub struct ProofOfWork {
    block: Block,
    target: BigInt,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block) -> ProofOfWork {
        // The target keeps the top `difficulty` bits of a valid hash zero
        let difficulty = block.get_difficulty();
        let mut target = BigInt::from(1);
        target.shl_assign(256 - difficulty);
        ProofOfWork { block, target }
    }

    /// Check a block's stored nonce and hash: the digest re-derived from
    /// the block fields must equal the stored hash and sit below the
    /// target. Pure; used after mining and on every received block.
    pub fn validate(block: &Block) -> bool {
        let pow = ProofOfWork::new_proof_of_work(block.clone());
        let data = pow.prepare_data(block.get_nonce());
        let hash = sha256_digest(data.as_slice());
        let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());

        hash_int < pow.target && HEXLOWER.encode(hash.as_slice()) == block.get_hash()
    }

    // Everything that goes into the digest except the nonce; workers only
    // append their nonce candidate to this.
    fn prepare_prefix(&self) -> Vec<u8> {
        let mut data_bytes = vec![];
        data_bytes.extend(self.block.get_pre_block_hash().as_bytes());
        data_bytes.extend(self.block.get_data().as_bytes());
        data_bytes.extend(self.block.hash_transactions());
        data_bytes
    }

    fn prepare_data(&self, nonce: u64) -> Vec<u8> {
        let mut data_bytes = self.prepare_prefix();
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes.extend(self.block.get_difficulty().to_be_bytes());
        data_bytes
    }

    /// Search the nonce space with `workers` concurrent scanners.
    ///
    /// The space [0, u64::MAX) is split into disjoint contiguous ranges,
    /// one per worker. The first worker to find a digest below the target
    /// raises the shared cancellation flag and reports through the result
    /// channel; the others observe the flag within one iteration and stop.
    /// All workers are joined before this returns. Fails only if every
    /// range is exhausted without a hit.
    pub fn run(&self, workers: usize) -> Result<(u64, String)> {
        let workers = workers.max(1);
        let prefix = Arc::new(self.prepare_prefix());
        let target = Arc::new(self.target.clone());
        let difficulty = self.block.get_difficulty();
        let cancelled = Arc::new(AtomicBool::new(false));
        let scanned = Arc::new(AtomicU64::new(0));
        let (result_sender, result_receiver) = mpsc::channel::<(u64, Vec<u8>)>();

        let started = Instant::now();
        let chunk = u64::MAX / workers as u64;
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let prefix = Arc::clone(&prefix);
            let target = Arc::clone(&target);
            let cancelled = Arc::clone(&cancelled);
            let scanned = Arc::clone(&scanned);
            let result_sender = result_sender.clone();

            let range_start = worker_id as u64 * chunk;
            let range_end = if worker_id == workers - 1 {
                u64::MAX
            } else {
                (worker_id as u64 + 1) * chunk
            };

            handles.push(thread::spawn(move || {
                let mut local_scanned = 0u64;
                for nonce in range_start..range_end {
                    if cancelled.load(Ordering::Relaxed) {
                        break;
                    }
                    let mut data = Vec::with_capacity(prefix.len() + 12);
                    data.extend_from_slice(prefix.as_slice());
                    data.extend(nonce.to_be_bytes());
                    data.extend(difficulty.to_be_bytes());
                    let hash = sha256_digest(data.as_slice());
                    local_scanned += 1;

                    let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
                    if hash_int < *target {
                        cancelled.store(true, Ordering::Relaxed);
                        // The receiver takes exactly one winner; a send
                        // losing the race is silently dropped.
                        let _ = result_sender.send((nonce, hash));
                        break;
                    }
                }
                scanned.fetch_add(local_scanned, Ordering::Relaxed);
            }));
        }
        drop(result_sender);

        // Blocks until one worker wins, or every sender hung up because
        // its range ran dry.
        let found = result_receiver.recv().ok();
        cancelled.store(true, Ordering::Relaxed);
        for handle in handles {
            let _ = handle.join();
        }

        match found {
            Some((nonce, hash)) => {
                let elapsed_ms = started.elapsed().as_millis().max(1);
                let total_scanned = scanned.load(Ordering::Relaxed);
                info!(
                    "Scanned {} nonces in {}ms ({:.3} MH/s)",
                    total_scanned,
                    elapsed_ms,
                    total_scanned as f64 / elapsed_ms as f64 / 1000.0
                );
                Ok((nonce, HEXLOWER.encode(hash.as_slice())))
            }
            None => Err(ChainError::Mining(
                "Nonce space exhausted without satisfying the target".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;

    fn mine_test_block(difficulty: u32, workers: usize) -> Block {
        let coinbase = Transaction::new_coinbase_tx("test-miner");
        Block::new_block(
            String::new(),
            "test block",
            &[coinbase],
            0,
            difficulty,
            workers,
        )
        .unwrap()
    }

    #[test]
    fn test_target_scales_with_difficulty() {
        let easy = ProofOfWork::new_proof_of_work(mine_test_block(1, 1));
        let hard = ProofOfWork::new_proof_of_work(mine_test_block(8, 1));
        assert!(hard.target < easy.target);
    }

    #[test]
    fn test_mined_block_validates() {
        let block = mine_test_block(8, 1);
        assert!(ProofOfWork::validate(&block));
    }

    #[test]
    fn test_multi_worker_search_finds_valid_nonce() {
        let block = mine_test_block(8, 4);
        assert!(ProofOfWork::validate(&block));
    }

    #[test]
    fn test_hash_has_required_leading_zero_bits() {
        let difficulty = 12;
        let block = mine_test_block(difficulty, 2);
        let hash_bytes = HEXLOWER.decode(block.get_hash().as_bytes()).unwrap();
        let hash_int = BigInt::from_bytes_be(Sign::Plus, hash_bytes.as_slice());
        let mut target = BigInt::from(1);
        target.shl_assign(256 - difficulty);
        assert!(hash_int < target);
    }

    #[test]
    fn test_prepare_data_varies_with_nonce() {
        let pow = ProofOfWork::new_proof_of_work(mine_test_block(1, 1));
        assert_eq!(pow.prepare_data(12345), pow.prepare_data(12345));
        assert_ne!(pow.prepare_data(12345), pow.prepare_data(54321));
    }
}
