//! Wallets and the known-address registry
//!
//! Key pairs, address derivation and the name -> public key registry the
//! validator uses to resolve output owners.

pub mod known_address;
pub mod wallet;
pub mod wallets;

pub use known_address::{KnownAddress, KnownAddressBook};
pub use wallet::{convert_address, hash_pub_key, validate_address, Wallet, ADDRESS_CHECK_SUM_LEN};
pub use wallets::Wallets;
