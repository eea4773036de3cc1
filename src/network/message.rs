use serde::{Deserialize, Serialize};

/// Transport-level acknowledgement every request is answered with.
pub const ACK: &str = "ACK";

/// Network identity of a peer. Two metas naming the same ip:port are the
/// same peer regardless of the logical name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerMeta {
    pub ip: String,
    pub port: String,
    pub name: String,
}

impl PeerMeta {
    pub fn new(ip: &str, port: &str, name: &str) -> PeerMeta {
        PeerMeta {
            ip: ip.to_string(),
            port: port.to_string(),
            name: name.to_string(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn same_endpoint(&self, other: &PeerMeta) -> bool {
        self.ip == other.ip && self.port == other.port
    }
}

/// A wallet identity broadcast: resolves a logical name to a public key
/// and payment address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMeta {
    pub name: String,
    pub public_key: Vec<u8>,
    pub address: String,
}

/// One gossip request. Each message is a self-contained JSON value sent
/// over a fresh TCP connection and answered with an `ACK`. Blocks and
/// transactions travel as opaque serialized bytes.
#[derive(Debug, Serialize, Deserialize)]
pub enum Message {
    Ping {
        meta: PeerMeta,
        height: usize,
    },
    Peers {
        meta: PeerMeta,
        peers: Vec<PeerMeta>,
    },
    User {
        meta: PeerMeta,
        user: UserMeta,
    },
    Tx {
        meta: PeerMeta,
        key: String,
        transaction: Vec<u8>,
    },
    Block {
        meta: PeerMeta,
        block: Vec<u8>,
    },
    /// Head advertisement: "I hold a chain of this height."
    BlockSource {
        meta: PeerMeta,
        height: usize,
    },
    /// Pull request: "send me your block at this height."
    BlockRetrieve {
        meta: PeerMeta,
        height: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_meta_endpoint_identity() {
        let a = PeerMeta::new("127.0.0.1", "5000", "alice");
        let b = PeerMeta::new("127.0.0.1", "5000", "also-alice");
        let c = PeerMeta::new("127.0.0.1", "5001", "alice");
        assert!(a.same_endpoint(&b));
        assert!(!a.same_endpoint(&c));
        assert_eq!(a.addr(), "127.0.0.1:5000");
    }

    #[test]
    fn test_message_json_round_trip() {
        let msg = Message::BlockSource {
            meta: PeerMeta::new("127.0.0.1", "5000", "alice"),
            height: 42,
        };
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        match decoded {
            Message::BlockSource { meta, height } => {
                assert_eq!(meta.addr(), "127.0.0.1:5000");
                assert_eq!(height, 42);
            }
            other => panic!("Unexpected decode result: {other:?}"),
        }
    }
}
