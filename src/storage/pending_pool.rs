use crate::core::{Block, Transaction};
use std::collections::HashMap;
use std::sync::RwLock;

/// Relay buffer of not-yet-mined transactions, keyed by a caller-chosen
/// label. Owns a transaction from creation or reception until a committed
/// block includes it.
pub struct PendingPool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl Default for PendingPool {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingPool {
    pub fn new() -> PendingPool {
        PendingPool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_transaction(&self, key: &str, tx: Transaction) {
        match self.inner.write() {
            Ok(mut pool) => {
                pool.insert(key.to_string(), tx);
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on pending pool");
            }
        }
    }

    pub fn get_tx(&self, key: &str) -> Option<Transaction> {
        match self.inner.read() {
            Ok(pool) => pool.get(key).cloned(),
            Err(_) => {
                log::error!("Failed to acquire read lock on pending pool");
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        match self.inner.read() {
            Ok(pool) => pool.contains_key(key),
            Err(_) => {
                log::error!("Failed to acquire read lock on pending pool");
                false
            }
        }
    }

    pub fn delete_tx(&self, key: &str) {
        match self.inner.write() {
            Ok(mut pool) => {
                pool.remove(key);
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on pending pool");
            }
        }
    }

    pub fn get_all_tx(&self) -> Vec<(String, Transaction)> {
        match self.inner.read() {
            Ok(pool) => pool.iter().map(|(k, tx)| (k.clone(), tx.clone())).collect(),
            Err(_) => {
                log::error!("Failed to acquire read lock on pending pool");
                Vec::new()
            }
        }
    }

    /// Drop every pending transaction a freshly committed block includes.
    pub fn purge_committed(&self, block: &Block) {
        match self.inner.write() {
            Ok(mut pool) => {
                pool.retain(|_, pending| {
                    !block
                        .get_transactions()
                        .iter()
                        .any(|tx| tx.get_id() == pending.get_id())
                });
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on pending pool");
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(pool) => pool.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on pending pool");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TXInput, TXOutput};

    fn test_tx(source: &[u8]) -> Transaction {
        Transaction::new(
            vec![TXInput::new(source, 0)],
            vec![TXOutput::new(1, "someone")],
        )
    }

    #[test]
    fn test_add_get_delete() {
        let pool = PendingPool::new();
        let tx = test_tx(b"a");
        pool.add_transaction("tx-a", tx.clone());

        assert!(pool.contains("tx-a"));
        assert_eq!(pool.get_tx("tx-a").unwrap().get_id(), tx.get_id());

        pool.delete_tx("tx-a");
        assert!(pool.get_tx("tx-a").is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_purge_committed_removes_only_included() {
        let pool = PendingPool::new();
        let mined = test_tx(b"mined");
        let waiting = test_tx(b"waiting");
        pool.add_transaction("mined", mined.clone());
        pool.add_transaction("waiting", waiting);

        let coinbase = Transaction::new_coinbase_tx("miner");
        let block = Block::new_block(
            "prev".to_string(),
            "purge test",
            &[coinbase, mined],
            1,
            1,
            1,
        )
        .unwrap();

        pool.purge_committed(&block);
        assert!(!pool.contains("mined"));
        assert!(pool.contains("waiting"));
    }
}
