//! Peer-to-peer gossip layer
//!
//! Wire messages, the known-peer pool and the node that ties the gossip
//! protocol to the chain commit pipeline.

pub mod message;
pub mod node;
pub mod peers;

pub use message::{Message, PeerMeta, UserMeta};
pub use node::Node;
pub use peers::ConnectionPool;
