//! Node integration tests
//!
//! Cross-component scenarios: the reference ledger fixture, consensus
//! rejections, and block replication between two live nodes.

use forgechain::{
    BlockStatus, Blockchain, Node, NodeConfig, ProofOfWork, UserMeta, Wallets, MINING_REWARD,
};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn test_config(dir: &TempDir, name: &str, port: &str) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.data_dir = dir.path().join(name).to_string_lossy().to_string();
    config.listen_port = port.to_string();
    config.pow_workers = 2;
    config
}

fn open_node(config: &NodeConfig, name: &str) -> Node {
    let chain = Blockchain::init(config.db_path().as_str()).unwrap();
    Node::new(chain, config, name).unwrap()
}

fn register_identity(node: &Node, wallets: &Wallets, name: &str) -> String {
    let wallet = wallets.get_wallet(name).unwrap();
    node.register_local_identity(UserMeta {
        name: name.to_string(),
        public_key: wallet.get_public_key().to_vec(),
        address: wallet.get_address(),
    });
    wallet.get_address()
}

// Mirrors the reference fixture: Alice mines two blocks, Bob one, then a
// payment round recorded across two more blocks ends at balances
// Alice 100, Bob 260, Charlie 100, David 40.
#[test]
fn test_end_to_end_ledger_fixture() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, "fixture", "16830");
    let node = open_node(&config, "fixture");

    let mut wallets = Wallets::new(config.wallet_path().as_str());
    for name in ["Alice", "Bob", "Charlie", "David"] {
        wallets.create_wallet(name).unwrap();
    }
    let alice = register_identity(&node, &wallets, "Alice");
    let bob = register_identity(&node, &wallets, "Bob");
    let charlie = register_identity(&node, &wallets, "Charlie");
    let david = register_identity(&node, &wallets, "David");

    // Alice mines two blocks
    node.mine_block(&alice, "Alice 1", &[]).unwrap();
    node.mine_block(&alice, "Alice 2", &[]).unwrap();
    assert_eq!(node.get_balance(&alice), 200);

    // Bob mines one
    node.mine_block(&bob, "Bob 1", &[]).unwrap();
    assert_eq!(node.get_balance(&bob), 100);

    // Alice pays Bob 30, recorded in a block Bob mines
    let alice_wallet = wallets.get_wallet("Alice").unwrap();
    node.create_transaction("tx1", alice_wallet, &[bob.clone()], &[30])
        .unwrap();
    node.mine_block(
        &bob,
        "Bob records that Alice pays Bob 30.",
        &["tx1".to_string()],
    )
    .unwrap();
    assert_eq!(node.get_balance(&alice), 170);
    assert_eq!(node.get_balance(&bob), 230);

    // Alice gives Bob 90 and David 40, Bob returns 60, Charlie logs it
    let bob_wallet = wallets.get_wallet("Bob").unwrap();
    node.create_transaction(
        "tx2",
        alice_wallet,
        &[bob.clone(), david.clone()],
        &[90, 40],
    )
    .unwrap();
    node.create_transaction("tx3", bob_wallet, &[alice.clone()], &[60])
        .unwrap();
    node.mine_block(
        &charlie,
        "Charlie records that Alice gives Bob 90, David 40 and Bob returns 60.",
        &["tx2".to_string(), "tx3".to_string()],
    )
    .unwrap();

    assert_eq!(node.get_balance(&alice), 100);
    assert_eq!(node.get_balance(&bob), 260);
    assert_eq!(node.get_balance(&charlie), 100);
    assert_eq!(node.get_balance(&david), 40);

    // no value created or destroyed: six committed blocks, one reward each
    assert_eq!(node.chain().get_height(), 5);
    assert_eq!(node.utxo().total_value(), 6 * MINING_REWARD);

    // every committed block still proves its work
    let mut iterator = node.chain().iterator();
    let mut heights = vec![];
    while let Some(block) = iterator.next() {
        assert!(ProofOfWork::validate(&block));
        heights.push(block.get_height());
    }
    assert_eq!(heights, vec![5, 4, 3, 2, 1, 0]);

    // pending pool was purged by the commits
    assert!(node.pending().is_empty());
}

#[test]
fn test_double_spend_in_one_block_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, "doublespend", "16831");
    let node = open_node(&config, "doublespend");

    let mut wallets = Wallets::new(config.wallet_path().as_str());
    for name in ["Alice", "Bob", "Charlie"] {
        wallets.create_wallet(name).unwrap();
    }
    let alice = register_identity(&node, &wallets, "Alice");
    let bob = register_identity(&node, &wallets, "Bob");
    let charlie = register_identity(&node, &wallets, "Charlie");

    node.mine_block(&alice, "fund alice", &[]).unwrap();

    // both transactions spend Alice's only coinbase output
    let alice_wallet = wallets.get_wallet("Alice").unwrap();
    let tx_a = node
        .create_transaction("tx-a", alice_wallet, &[bob.clone()], &[100])
        .unwrap();
    let tx_b = node
        .create_transaction("tx-b", alice_wallet, &[charlie.clone()], &[100])
        .unwrap();

    let block = node
        .chain()
        .mine_block(&bob, "double spend attempt", &[tx_a, tx_b], 2)
        .unwrap();
    let status = node
        .chain()
        .validate_block(&block, node.utxo(), node.address_book())
        .unwrap();
    assert_eq!(status, BlockStatus::DoubleSpending);

    // the pipeline drops it: nothing was committed
    let height_before = node.chain().get_height();
    node.handle_incoming_block(&block);
    assert_eq!(node.chain().get_height(), height_before);
    assert_eq!(node.get_balance(&alice), 100);
    assert_eq!(node.get_balance(&bob), 0);
    assert_eq!(node.get_balance(&charlie), 0);
}

#[test]
fn test_spending_someone_elses_output_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, "forged", "16835");
    let node = open_node(&config, "forged");

    let mut wallets = Wallets::new(config.wallet_path().as_str());
    wallets.create_wallet("Alice").unwrap();
    wallets.create_wallet("Bob").unwrap();
    let alice = register_identity(&node, &wallets, "Alice");
    let bob = register_identity(&node, &wallets, "Bob");

    let funded = node.mine_block(&alice, "fund alice", &[]).unwrap();
    // the coinbase is the last transaction of the assembled block
    let coinbase = funded.get_transactions().last().unwrap();

    // Bob signs a spend of Alice's reward with his own key
    let bob_wallet = wallets.get_wallet("Bob").unwrap();
    let mut input = forgechain::TXInput::new(coinbase.get_id(), 0);
    input.sign(bob_wallet).unwrap();
    let forged = forgechain::Transaction::new(
        vec![input],
        vec![forgechain::TXOutput::new(100, &bob)],
    );

    let block = node
        .chain()
        .mine_block(&bob, "forged spend", &[forged], 2)
        .unwrap();
    let status = node
        .chain()
        .validate_block(&block, node.utxo(), node.address_book())
        .unwrap();
    assert_eq!(status, BlockStatus::WrongTXInputSignature);

    node.handle_incoming_block(&block);
    assert_eq!(node.chain().get_height(), 1);
    assert_eq!(node.get_balance(&alice), 100);
    assert_eq!(node.get_balance(&bob), 0);
}

#[test]
fn test_insufficient_funds_leaves_pool_untouched() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, "broke", "16832");
    let node = open_node(&config, "broke");

    let mut wallets = Wallets::new(config.wallet_path().as_str());
    wallets.create_wallet("Alice").unwrap();
    wallets.create_wallet("Bob").unwrap();
    register_identity(&node, &wallets, "Alice");
    let bob = register_identity(&node, &wallets, "Bob");

    let alice_wallet = wallets.get_wallet("Alice").unwrap();
    let result = node.create_transaction("too-much", alice_wallet, &[bob], &[1]);
    assert!(result.is_err());
    assert!(!node.pending().contains("too-much"));
    assert!(node.pending().is_empty());
}

// A block mined on one node commits on another: genesis is deterministic,
// so a fresh peer shares the chain root and accepts the block.
#[test]
fn test_foreign_block_commits_on_fresh_node() {
    let dir = TempDir::new().unwrap();
    let config_a = test_config(&dir, "node-a", "16833");
    let config_b = test_config(&dir, "node-b", "16834");
    let node_a = open_node(&config_a, "node-a");
    let node_b = open_node(&config_b, "node-b");

    assert_eq!(
        node_a.chain().get_tip_hash(),
        node_b.chain().get_tip_hash(),
        "both nodes must derive the identical genesis block"
    );

    let mut wallets = Wallets::new(config_a.wallet_path().as_str());
    wallets.create_wallet("Miner").unwrap();
    let miner = register_identity(&node_a, &wallets, "Miner");

    let block = node_a.mine_block(&miner, "mined on a", &[]).unwrap();
    node_b.handle_incoming_block(&block);

    assert_eq!(node_b.chain().get_height(), 1);
    assert_eq!(node_b.chain().get_tip_hash(), block.get_hash());
    assert_eq!(node_b.get_balance(&miner), MINING_REWARD);
}

// Full gossip loop over real sockets: B introduces itself to A, A mines,
// advertises its head, and B pulls the block via block_retrieve.
#[test]
fn test_block_replicates_between_live_nodes() {
    let dir = TempDir::new().unwrap();
    let config_a = test_config(&dir, "live-a", "16841");
    let config_b = test_config(&dir, "live-b", "16842");
    let node_a = open_node(&config_a, "live-a");
    let node_b = open_node(&config_b, "live-b");

    let serve_a = node_a.clone();
    thread::spawn(move || {
        let _ = serve_a.serve();
    });
    let serve_b = node_b.clone();
    thread::spawn(move || {
        let _ = serve_b.serve();
    });
    thread::sleep(Duration::from_millis(200));

    node_b.ping("127.0.0.1", "16841");
    let deadline = Instant::now() + Duration::from_secs(5);
    while !node_a.peers().exists_peer(node_b.meta()) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    assert!(node_a.peers().exists_peer(node_b.meta()));

    let mut wallets = Wallets::new(config_a.wallet_path().as_str());
    wallets.create_wallet("Miner").unwrap();
    let miner = register_identity(&node_a, &wallets, "Miner");
    let block = node_a.mine_block(&miner, "replicate me", &[]).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while node_b.chain().get_height() < 1 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(100));
    }
    assert_eq!(node_b.chain().get_height(), 1);
    assert_eq!(node_b.chain().get_tip_hash(), block.get_hash());
    assert_eq!(node_b.get_balance(&miner), MINING_REWARD);
}
