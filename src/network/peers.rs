use crate::network::message::PeerMeta;
use rand::seq::SliceRandom;
use std::sync::Mutex;

/// The known-peer set, deduplicated by network endpoint.
pub struct ConnectionPool {
    pool: Mutex<Vec<PeerMeta>>,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionPool {
    pub fn new() -> ConnectionPool {
        ConnectionPool {
            pool: Mutex::new(vec![]),
        }
    }

    /// Register a peer; returns false when its endpoint is already known.
    pub fn add_peer(&self, meta: PeerMeta) -> bool {
        let mut pool = self
            .pool
            .lock()
            .expect("Failed to acquire lock on peer pool - this should never happen");
        if pool.iter().any(|known| known.same_endpoint(&meta)) {
            return false;
        }
        pool.push(meta);
        true
    }

    pub fn exists_peer(&self, meta: &PeerMeta) -> bool {
        let pool = self
            .pool
            .lock()
            .expect("Failed to acquire lock on peer pool - this should never happen");
        pool.iter().any(|known| known.same_endpoint(meta))
    }

    /// A bounded random sample of peers for gossip fan-out. Each peer
    /// appears at most once in the result.
    pub fn get_alive_peers(&self, count: usize) -> Vec<PeerMeta> {
        let pool = self
            .pool
            .lock()
            .expect("Failed to acquire lock on peer pool - this should never happen");
        let mut rng = rand::thread_rng();
        pool.choose_multiple(&mut rng, count.min(pool.len()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        let pool = self
            .pool
            .lock()
            .expect("Failed to acquire lock on peer pool - this should never happen");
        pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
