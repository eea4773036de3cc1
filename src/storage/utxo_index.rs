// The unspent-output index: address -> spendable outputs, with a reverse
// owner map the validator uses to resolve who an input must be signed by.
// Mutated in exactly one place - apply_block, once per committed block.

use crate::core::{Block, Blockchain};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Mutex;

/// Composite identity of one transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputKey {
    pub txid: Vec<u8>,
    pub vout: usize,
}

/// A spendable payment fragment: which output, and how much it is worth.
#[derive(Debug, Clone)]
pub struct UnspentOutput {
    pub txid: Vec<u8>,
    pub vout: usize,
    pub value: u64,
}

impl UnspentOutput {
    pub fn key(&self) -> OutputKey {
        OutputKey {
            txid: self.txid.clone(),
            vout: self.vout,
        }
    }
}

struct IndexInner {
    by_address: HashMap<String, Vec<UnspentOutput>>,
    // OutputKey -> (owner address, value)
    owners: HashMap<OutputKey, (String, u64)>,
}

pub struct UtxoIndex {
    inner: Mutex<IndexInner>,
}

impl Default for UtxoIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl UtxoIndex {
    pub fn new() -> UtxoIndex {
        UtxoIndex {
            inner: Mutex::new(IndexInner {
                by_address: HashMap::new(),
                owners: HashMap::new(),
            }),
        }
    }

    pub fn add_utxo(&self, address: &str, utxo: UnspentOutput) {
        let mut inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on UTXO index - this should never happen");
        inner
            .owners
            .insert(utxo.key(), (address.to_string(), utxo.value));
        inner
            .by_address
            .entry(address.to_string())
            .or_default()
            .push(utxo);
    }

    pub fn remove_utxo(&self, address: &str, key: &OutputKey) {
        let mut inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on UTXO index - this should never happen");
        if let Some(outputs) = inner.by_address.get_mut(address) {
            // order within an address does not matter, so swap-remove
            if let Some(idx) = outputs
                .iter()
                .position(|utxo| utxo.txid == key.txid && utxo.vout == key.vout)
            {
                outputs.swap_remove(idx);
            }
            if outputs.is_empty() {
                inner.by_address.remove(address);
            }
        }
        inner.owners.remove(key);
    }

    /// Owner address and value of an unspent output, if it is unspent.
    pub fn lookup(&self, key: &OutputKey) -> Option<(String, u64)> {
        let inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on UTXO index - this should never happen");
        inner.owners.get(key).cloned()
    }

    /// Select outputs of `address` in stored order until the accumulated
    /// value covers `amount`. The returned total may be short of `amount`,
    /// which signals insufficient funds; nothing is marked spent either way.
    pub fn generate_spending_plan(&self, address: &str, amount: u64) -> (u64, Vec<UnspentOutput>) {
        let inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on UTXO index - this should never happen");
        let mut total = 0u64;
        let mut plan = vec![];
        if let Some(outputs) = inner.by_address.get(address) {
            for utxo in outputs {
                total += utxo.value;
                plan.push(utxo.clone());
                if total >= amount {
                    break;
                }
            }
        }
        (total, plan)
    }

    /// Retire every output the block's inputs consume and add every output
    /// it produces. The sole mutation path; called exactly once per
    /// committed block, after validation succeeded.
    pub fn apply_block(&self, block: &Block) {
        for tx in block.get_transactions() {
            for input in tx.get_vin() {
                if input.is_coinbase_marker() {
                    continue;
                }
                let key = OutputKey {
                    txid: input.get_txid().to_vec(),
                    vout: input.get_vout(),
                };
                let owner = self.lookup(&key).map(|(address, _)| address);
                match owner {
                    Some(address) => self.remove_utxo(&address, &key),
                    None => {
                        // validation guarantees this cannot happen for a
                        // committed block
                        log::error!(
                            "Committed block consumes unknown output {}:{}",
                            data_encoding::HEXLOWER.encode(input.get_txid()),
                            input.get_vout()
                        );
                    }
                }
            }
            for (idx, output) in tx.get_vout().iter().enumerate() {
                self.add_utxo(
                    output.get_address(),
                    UnspentOutput {
                        txid: tx.get_id().to_vec(),
                        vout: idx,
                        value: output.get_value(),
                    },
                );
            }
        }
    }

    pub fn balance(&self, address: &str) -> u64 {
        let inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on UTXO index - this should never happen");
        inner
            .by_address
            .get(address)
            .map(|outputs| outputs.iter().map(|utxo| utxo.value).sum())
            .unwrap_or(0)
    }

    /// Combined value of every unspent output in the index.
    pub fn total_value(&self) -> u64 {
        let inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on UTXO index - this should never happen");
        inner.owners.values().map(|(_, value)| value).sum()
    }

    /// Replay the committed chain oldest-first to repopulate the index.
    /// Only a startup bootstrap; after that the index stays incremental.
    pub fn rebuild(&self, chain: &Blockchain) -> Result<()> {
        {
            let mut inner = self
                .inner
                .lock()
                .expect("Failed to acquire lock on UTXO index - this should never happen");
            inner.by_address.clear();
            inner.owners.clear();
        }

        let mut blocks = vec![];
        let mut iterator = chain.iterator();
        while let Some(block) = iterator.next() {
            blocks.push(block);
        }
        blocks.reverse();
        for block in &blocks {
            self.apply_block(block);
        }
        Ok(())
    }
}
