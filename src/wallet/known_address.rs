use std::collections::HashMap;
use std::sync::Mutex;

/// Public identity of a peer's wallet, learned from identity broadcasts.
#[derive(Debug, Clone)]
pub struct KnownAddress {
    pub public_key: Vec<u8>,
    pub address: String,
}

struct BookInner {
    by_name: HashMap<String, KnownAddress>,
    // address -> public key, the view the block validator needs when it
    // checks an input signature against the output owner's key
    by_address: HashMap<String, Vec<u8>>,
}

/// Registry of logical name -> {public key, address} learned from the
/// network, shared by handlers behind its own lock.
pub struct KnownAddressBook {
    inner: Mutex<BookInner>,
}

impl Default for KnownAddressBook {
    fn default() -> Self {
        Self::new()
    }
}

impl KnownAddressBook {
    pub fn new() -> KnownAddressBook {
        KnownAddressBook {
            inner: Mutex::new(BookInner {
                by_name: HashMap::new(),
                by_address: HashMap::new(),
            }),
        }
    }

    pub fn register(&self, name: &str, public_key: Vec<u8>, address: String) {
        let mut inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on address book - this should never happen");
        inner
            .by_address
            .insert(address.clone(), public_key.clone());
        inner.by_name.insert(
            name.to_string(),
            KnownAddress {
                public_key,
                address,
            },
        );
    }

    pub fn get_by_name(&self, name: &str) -> Option<KnownAddress> {
        let inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on address book - this should never happen");
        inner.by_name.get(name).cloned()
    }

    pub fn public_key_of(&self, address: &str) -> Option<Vec<u8>> {
        let inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on address book - this should never happen");
        inner.by_address.get(address).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on address book - this should never happen");
        inner.by_name.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on address book - this should never happen");
        inner.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
