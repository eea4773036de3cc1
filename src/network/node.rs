// The gossip node: one explicitly passed context object holding every
// piece of shared state the handlers and timers touch, each behind its
// own lock. Messages arrive over TCP, one JSON value per connection,
// acknowledged and dispatched; outbound sends are fire-and-forget with a
// short timeout, and recovery relies on periodic re-advertisement rather
// than retries.

use crate::config::NodeConfig;
use crate::core::{Block, BlockStatus, Blockchain, Transaction};
use crate::error::{ChainError, Result};
use crate::network::message::{Message, PeerMeta, UserMeta, ACK};
use crate::network::peers::ConnectionPool;
use crate::storage::{BlockCache, PendingPool, UtxoIndex};
use crate::wallet::{KnownAddressBook, Wallet};
use log::{error, info, warn};
use serde_json::Deserializer;
use std::collections::HashMap;
use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const SEND_TIMEOUT: Duration = Duration::from_millis(3000);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
// bounded fan-outs so one receipt never floods the network
const PEERS_MESSAGE_LIMIT: usize = 20;
const GOSSIP_FANOUT: usize = 8;
// a lagging node pulls one block per cooldown window
const RETRIEVE_COOLDOWN: Duration = Duration::from_secs(1);
const CATCH_UP_INTERVAL: Duration = Duration::from_millis(500);
const IDENTITY_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Node {
    meta: PeerMeta,
    pow_workers: usize,
    chain: Blockchain,
    peers: Arc<ConnectionPool>,
    pending: Arc<PendingPool>,
    utxo: Arc<UtxoIndex>,
    cache: Arc<BlockCache>,
    address_book: Arc<KnownAddressBook>,
    // height -> committed block, the source for BlockRetrieve answers
    block_index: Arc<Mutex<HashMap<usize, Block>>>,
    local_identities: Arc<Mutex<Vec<UserMeta>>>,
    last_retrieve: Arc<Mutex<Option<Instant>>>,
}

impl Node {
    /// Build the node context around an opened chain: rebuild the UTXO
    /// index and the per-height block index from the committed blocks,
    /// and point the admission cursor at the current tip.
    pub fn new(chain: Blockchain, config: &NodeConfig, name: &str) -> Result<Node> {
        let utxo = Arc::new(UtxoIndex::new());
        utxo.rebuild(&chain)?;

        let mut by_height = HashMap::new();
        let mut iterator = chain.iterator();
        while let Some(block) = iterator.next() {
            by_height.insert(block.get_height(), block);
        }

        let cache = Arc::new(BlockCache::new(
            config.cache_capacity,
            chain.get_tip_hash().as_str(),
        ));

        Ok(Node {
            meta: PeerMeta::new(config.listen_ip.as_str(), config.listen_port.as_str(), name),
            pow_workers: config.pow_workers,
            chain,
            peers: Arc::new(ConnectionPool::new()),
            pending: Arc::new(PendingPool::new()),
            utxo,
            cache,
            address_book: Arc::new(KnownAddressBook::new()),
            block_index: Arc::new(Mutex::new(by_height)),
            local_identities: Arc::new(Mutex::new(vec![])),
            last_retrieve: Arc::new(Mutex::new(None)),
        })
    }

    pub fn meta(&self) -> &PeerMeta {
        &self.meta
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn utxo(&self) -> &UtxoIndex {
        &self.utxo
    }

    pub fn pending(&self) -> &PendingPool {
        &self.pending
    }

    pub fn peers(&self) -> &ConnectionPool {
        &self.peers
    }

    pub fn address_book(&self) -> &KnownAddressBook {
        &self.address_book
    }

    pub fn get_balance(&self, address: &str) -> u64 {
        self.utxo.balance(address)
    }

    /// Remember a local wallet identity; it is broadcast immediately and
    /// re-broadcast by the identity timer.
    pub fn register_local_identity(&self, user: UserMeta) {
        self.address_book.register(
            user.name.as_str(),
            user.public_key.clone(),
            user.address.clone(),
        );
        let mut identities = self
            .local_identities
            .lock()
            .expect("Failed to acquire lock on local identities - this should never happen");
        identities.retain(|known| known.name != user.name);
        identities.push(user.clone());
        drop(identities);
        self.broadcast_identity(&user);
    }

    /// Build a transfer, park it in the pending pool under `key`, and
    /// gossip it to peers.
    pub fn create_transaction(
        &self,
        key: &str,
        from_wallet: &Wallet,
        to_addresses: &[String],
        amounts: &[u64],
    ) -> Result<Transaction> {
        let tx = self
            .chain
            .generate_transaction(from_wallet, to_addresses, amounts, &self.utxo)?;
        self.pending.add_transaction(key, tx.clone());
        self.broadcast_transaction(key, &tx);
        Ok(tx)
    }

    /// Mine a block carrying the named pending transactions and run it
    /// through the normal admission/commit pipeline. The pending entries
    /// are purged by the commit itself, so a block that loses a race
    /// leaves its transactions pooled for the next attempt.
    pub fn mine_block(&self, miner_address: &str, data: &str, tx_keys: &[String]) -> Result<Block> {
        let mut transactions = vec![];
        for key in tx_keys {
            let tx = self.pending.get_tx(key).ok_or_else(|| {
                ChainError::Transaction(format!("No pending transaction with key {key}"))
            })?;
            transactions.push(tx);
        }

        let block = self
            .chain
            .mine_block(miner_address, data, &transactions, self.pow_workers)?;
        self.handle_incoming_block(&block);
        Ok(block)
    }

    /// Feed a block - mined locally or received from the network - into
    /// the admission cache and drain the commit pipeline.
    pub fn handle_incoming_block(&self, block: &Block) {
        self.cache.add_block(block);
        self.drain_cache();
    }

    /// Pop admitted blocks in FIFO order, run full consensus validation,
    /// and commit the survivors. A successful commit purges the pending
    /// pool, records the block in the height index, advances the
    /// admission cursor to the commit result, and advertises the new head.
    pub fn drain_cache(&self) {
        while let Some(block) = self.cache.pop_block() {
            let status = match self
                .chain
                .validate_block(&block, &self.utxo, &self.address_book)
            {
                Ok(status) => status,
                Err(e) => {
                    error!("Validation failed for block {}: {e}", block.get_hash());
                    continue;
                }
            };
            if status != BlockStatus::Verified {
                error!("Rejected block {}: {status}", block.get_hash());
                continue;
            }

            match self.chain.commit_block(&block, &self.utxo) {
                Ok(true) => {
                    self.pending.purge_committed(&block);
                    {
                        let mut index = self.block_index.lock().expect(
                            "Failed to acquire lock on block index - this should never happen",
                        );
                        index.insert(block.get_height(), block.clone());
                    }
                    // the cursor advances to the committed tip, never to a
                    // candidate that might have lost the race
                    self.cache.set_cursor(self.chain.get_tip_hash().as_str());
                    self.broadcast_block_source();
                }
                Ok(false) => {
                    // stale: the tip moved while the block was queued
                }
                Err(e) => {
                    error!("Commit failed for block {}: {e}", block.get_hash());
                }
            }
        }
    }

    /// Introduce this node to a peer and trigger mutual catch-up.
    pub fn ping(&self, ip: &str, port: &str) {
        let target = PeerMeta::new(ip, port, "");
        self.peers.add_peer(target.clone());
        self.send_message(
            &target,
            &Message::Ping {
                meta: self.meta.clone(),
                height: self.chain.get_height(),
            },
        );
    }

    /// Announce a wallet identity to a bounded set of peers.
    pub fn broadcast_identity(&self, user: &UserMeta) {
        for peer in self.peers.get_alive_peers(PEERS_MESSAGE_LIMIT) {
            self.send_message(
                &peer,
                &Message::User {
                    meta: self.meta.clone(),
                    user: user.clone(),
                },
            );
        }
    }

    fn broadcast_transaction(&self, key: &str, tx: &Transaction) {
        let tx_bytes = match tx.serialize() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to serialize transaction for gossip: {e}");
                return;
            }
        };
        for peer in self.peers.get_alive_peers(GOSSIP_FANOUT) {
            self.send_message(
                &peer,
                &Message::Tx {
                    meta: self.meta.clone(),
                    key: key.to_string(),
                    transaction: tx_bytes.clone(),
                },
            );
        }
    }

    fn broadcast_block_source(&self) {
        let height = self.chain.get_height();
        for peer in self.peers.get_alive_peers(PEERS_MESSAGE_LIMIT) {
            self.send_message(
                &peer,
                &Message::BlockSource {
                    meta: self.meta.clone(),
                    height,
                },
            );
        }
    }

    /// Accept gossip connections and run the periodic timers. Blocks the
    /// calling thread on the TCP accept loop.
    pub fn serve(&self) -> Result<()> {
        let listener = TcpListener::bind(self.meta.addr()).map_err(|e| {
            ChainError::Network(format!("Failed to bind to {}: {e}", self.meta.addr()))
        })?;
        info!("Node {} listening on {}", self.meta.name, self.meta.addr());

        self.start_catch_up_timer();
        self.start_identity_timer();

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let node = self.clone();
                    thread::spawn(move || {
                        if let Err(e) = node.handle_connection(stream) {
                            warn!("Connection handler error: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
        Ok(())
    }

    // Short tick: drain the admission cache and ping one random peer so a
    // lagging node keeps discovering heads ahead of its own.
    fn start_catch_up_timer(&self) {
        let node = self.clone();
        thread::spawn(move || loop {
            thread::sleep(CATCH_UP_INTERVAL);
            node.drain_cache();
            let sample = node.peers.get_alive_peers(1);
            if let Some(peer) = sample.first() {
                node.send_message(
                    peer,
                    &Message::Ping {
                        meta: node.meta.clone(),
                        height: node.chain.get_height(),
                    },
                );
            }
        });
    }

    // Long tick: re-broadcast the identities of local wallets so late
    // joiners can resolve payment destinations by name.
    fn start_identity_timer(&self) {
        let node = self.clone();
        thread::spawn(move || loop {
            thread::sleep(IDENTITY_INTERVAL);
            let identities = {
                let identities = node
                    .local_identities
                    .lock()
                    .expect("Failed to acquire lock on local identities - this should never happen");
                identities.clone()
            };
            for user in identities {
                node.broadcast_identity(&user);
            }
        });
    }

    fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| ChainError::Network(format!("Failed to set read timeout: {e}")))?;

        let reader = BufReader::new(stream.try_clone().map_err(|e| {
            ChainError::Network(format!("Failed to clone connection stream: {e}"))
        })?);
        let messages = Deserializer::from_reader(reader).into_iter::<Message>();

        for message in messages {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    // malformed traffic is dropped without registering
                    // the sender as a peer
                    warn!("Dropping malformed message: {e}");
                    break;
                }
            };
            let mut ack_stream = &stream;
            if let Err(e) = ack_stream.write_all(ACK.as_bytes()) {
                warn!("Failed to acknowledge message: {e}");
            }
            self.handle_message(message);
        }

        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }

    fn handle_message(&self, message: Message) {
        match message {
            Message::Ping { meta, height } => self.handle_ping(meta, height),
            Message::Peers { meta, peers } => self.handle_peers(meta, peers),
            Message::User { meta, user } => self.handle_user(meta, user),
            Message::Tx {
                meta: _,
                key,
                transaction,
            } => self.handle_tx(key, transaction),
            Message::Block { meta: _, block } => self.handle_block(block),
            Message::BlockSource { meta, height } => self.handle_block_source(meta, height),
            Message::BlockRetrieve { meta, height } => self.handle_block_retrieve(meta, height),
        }
    }

    fn handle_ping(&self, meta: PeerMeta, height: usize) {
        info!("Received ping from {} at height {height}", meta.addr());

        // share what we know about the network
        self.send_message(
            &meta,
            &Message::Peers {
                meta: self.meta.clone(),
                peers: self.peers.get_alive_peers(PEERS_MESSAGE_LIMIT),
            },
        );

        let local_height = self.chain.get_height();
        if self.peers.add_peer(meta.clone()) {
            self.send_message(
                &meta,
                &Message::Ping {
                    meta: self.meta.clone(),
                    height: local_height,
                },
            );
        }

        if height < local_height {
            self.send_message(
                &meta,
                &Message::BlockSource {
                    meta: self.meta.clone(),
                    height: local_height,
                },
            );
        }
    }

    fn handle_peers(&self, meta: PeerMeta, peers: Vec<PeerMeta>) {
        self.peers.add_peer(meta);
        // one hop of discovery per receipt: ping each previously unknown
        // peer, which answers with its own peer list
        for peer in peers {
            if peer.same_endpoint(&self.meta) || self.peers.exists_peer(&peer) {
                continue;
            }
            self.peers.add_peer(peer.clone());
            self.send_message(
                &peer,
                &Message::Ping {
                    meta: self.meta.clone(),
                    height: self.chain.get_height(),
                },
            );
        }
    }

    fn handle_user(&self, meta: PeerMeta, user: UserMeta) {
        info!("Registering identity {} from {}", user.name, meta.addr());
        self.address_book
            .register(user.name.as_str(), user.public_key, user.address);
    }

    fn handle_tx(&self, key: String, tx_bytes: Vec<u8>) {
        let tx = match Transaction::deserialize(tx_bytes.as_slice()) {
            Ok(tx) => tx,
            Err(e) => {
                warn!("Dropping undecodable transaction {key}: {e}");
                return;
            }
        };
        // a transaction already held is not re-relayed; that is what makes
        // the gossip terminate
        if self.pending.contains(key.as_str()) {
            return;
        }
        info!("Received transaction from network: {key}");
        self.pending.add_transaction(key.as_str(), tx.clone());
        self.broadcast_transaction(key.as_str(), &tx);
    }

    fn handle_block(&self, block_bytes: Vec<u8>) {
        let block = match Block::deserialize(block_bytes.as_slice()) {
            Ok(block) => block,
            Err(e) => {
                warn!("Dropping undecodable block: {e}");
                return;
            }
        };
        self.handle_incoming_block(&block);
    }

    fn handle_block_source(&self, meta: PeerMeta, height: usize) {
        let local_height = self.chain.get_height();
        if height <= local_height {
            return;
        }

        // pull at most one block per cooldown window; the next
        // advertisement drives the next pull
        let mut last_retrieve = self
            .last_retrieve
            .lock()
            .expect("Failed to acquire lock on retrieve cooldown - this should never happen");
        if let Some(last) = *last_retrieve {
            if last.elapsed() < RETRIEVE_COOLDOWN {
                return;
            }
        }
        *last_retrieve = Some(Instant::now());
        drop(last_retrieve);

        self.send_message(
            &meta,
            &Message::BlockRetrieve {
                meta: self.meta.clone(),
                height: local_height + 1,
            },
        );
    }

    fn handle_block_retrieve(&self, meta: PeerMeta, height: usize) {
        let block = {
            let index = self
                .block_index
                .lock()
                .expect("Failed to acquire lock on block index - this should never happen");
            index.get(&height).cloned()
        };
        let Some(block) = block else {
            return;
        };
        let block_bytes = match block.serialize() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to serialize block for retrieval: {e}");
                return;
            }
        };
        self.send_message(
            &meta,
            &Message::Block {
                meta: self.meta.clone(),
                block: block_bytes,
            },
        );
    }

    // Fire-and-forget with a short timeout: connect, write one JSON
    // value, read the ack best-effort. Failures are swallowed; the
    // periodic re-ping is the recovery mechanism.
    fn send_message(&self, to: &PeerMeta, message: &Message) {
        if let Err(e) = self.try_send_message(to, message) {
            warn!("Failed to send message to {}: {e}", to.addr());
        }
    }

    fn try_send_message(&self, to: &PeerMeta, message: &Message) -> Result<()> {
        let addr = to
            .addr()
            .parse::<SocketAddr>()
            .map_err(|e| ChainError::Network(format!("Invalid address {}: {e}", to.addr())))?;

        let mut stream = TcpStream::connect_timeout(&addr, SEND_TIMEOUT)
            .map_err(|e| ChainError::Network(format!("Failed to connect to {addr}: {e}")))?;
        stream
            .set_write_timeout(Some(SEND_TIMEOUT))
            .map_err(|e| ChainError::Network(format!("Failed to set write timeout: {e}")))?;
        stream
            .set_read_timeout(Some(SEND_TIMEOUT))
            .map_err(|e| ChainError::Network(format!("Failed to set read timeout: {e}")))?;

        serde_json::to_writer(&stream, message)
            .map_err(|e| ChainError::Network(format!("Failed to send message: {e}")))?;
        stream
            .flush()
            .map_err(|e| ChainError::Network(format!("Failed to flush message: {e}")))?;

        let mut ack_buf = [0u8; 8];
        let _ = stream.read(&mut ack_buf);
        Ok(())
    }
}
