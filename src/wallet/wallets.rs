use crate::error::Result;
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// The local wallet collection, keyed by the owner's logical name.
///
/// Persisted as one bincode blob; a missing file just means an empty set.
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
    path: PathBuf,
}

impl Wallets {
    pub fn new(path: &str) -> Wallets {
        let mut wallets = Wallets {
            wallets: HashMap::new(),
            path: PathBuf::from(path),
        };
        wallets.load_from_file();
        wallets
    }

    pub fn create_wallet(&mut self, name: &str) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.wallets.insert(name.to_string(), wallet);
        self.save_to_file();
        Ok(address)
    }

    pub fn get_wallet(&self, name: &str) -> Option<&Wallet> {
        self.wallets.get(name)
    }

    pub fn get_all_names(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    fn load_from_file(&mut self) {
        if let Err(e) = self.load_from_file_safe() {
            log::warn!("Could not load wallets from file: {e}");
        }
    }

    fn load_from_file_safe(&mut self) -> std::result::Result<(), Box<dyn std::error::Error>> {
        if !Path::new(&self.path).exists() {
            return Ok(());
        }

        let mut file = File::open(&self.path)?;
        let metadata = file.metadata()?;
        let mut buf = vec![0; metadata.len() as usize];
        file.read_exact(&mut buf)?;
        let wallets = deserialize(&buf[..])?;
        self.wallets = wallets;
        Ok(())
    }

    fn save_to_file(&self) {
        if let Err(e) = self.save_to_file_safe() {
            log::error!("Could not save wallets to file: {e}");
        }
    }

    fn save_to_file_safe(&self) -> std::result::Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let wallets_bytes = serialize(&self.wallets)?;
        writer.write_all(wallets_bytes.as_slice())?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_lookup_wallet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallet.dat");
        let mut wallets = Wallets::new(path.to_str().unwrap());

        let address = wallets.create_wallet("alice").unwrap();
        let wallet = wallets.get_wallet("alice").unwrap();
        assert_eq!(wallet.get_address(), address);
        assert!(wallets.get_wallet("bob").is_none());
    }

    #[test]
    fn test_wallets_survive_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallet.dat");
        let address = {
            let mut wallets = Wallets::new(path.to_str().unwrap());
            wallets.create_wallet("alice").unwrap()
        };

        let reloaded = Wallets::new(path.to_str().unwrap());
        assert_eq!(reloaded.get_wallet("alice").unwrap().get_address(), address);
    }
}
