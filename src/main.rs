// CLI entry point: every subcommand builds the node context it needs and
// calls into the exposed node surface.

use clap::Parser;
use data_encoding::HEXLOWER;
use forgechain::{
    Blockchain, ChainError, Command, Node, NodeConfig, Opt, PaymentArg, UserMeta, Wallets,
};
use log::{error, LevelFilter};
use std::process;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let config = NodeConfig::from_env();

    match command {
        Command::Createwallet { name } => {
            let mut wallets = Wallets::new(config.wallet_path().as_str());
            if wallets.get_wallet(&name).is_some() {
                return Err(format!("Wallet with name {name} already exists").into());
            }
            let address = wallets.create_wallet(&name)?;
            println!("Wallet: {name}");
            println!("Address: {address}");
        }
        Command::ListWallets => {
            let wallets = Wallets::new(config.wallet_path().as_str());
            for name in wallets.get_all_names() {
                if let Some(wallet) = wallets.get_wallet(&name) {
                    println!("{name}: {}", wallet.get_address());
                }
            }
        }
        Command::GetBalance { owner } => {
            let wallets = Wallets::new(config.wallet_path().as_str());
            // a wallet name resolves to its address; anything else is
            // taken as a raw address
            let address = match wallets.get_wallet(&owner) {
                Some(wallet) => wallet.get_address(),
                None => owner.clone(),
            };
            let node = open_node(&config)?;
            println!("Balance of {owner}: {}", node.get_balance(&address));
        }
        Command::Send {
            key,
            from,
            payments,
            mine,
            peer,
        } => {
            let wallets = Wallets::new(config.wallet_path().as_str());
            let from_wallet = wallets
                .get_wallet(&from)
                .ok_or_else(|| format!("No wallet with name {from}"))?;

            let node = open_node(&config)?;
            register_local_wallets(&node, &wallets);
            if let Some(peer) = peer {
                ping_peer(&node, &peer)?;
            }

            let (to_addresses, amounts) = resolve_payments(&node, &wallets, &payments)?;
            let tx = node.create_transaction(&key, from_wallet, &to_addresses, &amounts)?;
            println!("New transaction: {key} ({})", HEXLOWER.encode(tx.get_id()));

            if let Some(miner) = mine {
                let miner_wallet = wallets
                    .get_wallet(&miner)
                    .ok_or_else(|| format!("No wallet with name {miner}"))?;
                let block =
                    node.mine_block(&miner_wallet.get_address(), &key, &[key.clone()])?;
                println!("Mined block: {}", block.get_hash());
            }
        }
        Command::Mine { miner, description } => {
            let wallets = Wallets::new(config.wallet_path().as_str());
            let miner_wallet = wallets
                .get_wallet(&miner)
                .ok_or_else(|| format!("No wallet with name {miner}"))?;

            let node = open_node(&config)?;
            register_local_wallets(&node, &wallets);
            let block = node.mine_block(&miner_wallet.get_address(), &description, &[])?;
            println!("Mined block: {} at height {}", block.get_hash(), block.get_height());
        }
        Command::ListPending => {
            let node = open_node(&config)?;
            for (key, tx) in node.pending().get_all_tx() {
                println!("{key}: {}", HEXLOWER.encode(tx.get_id()));
            }
        }
        Command::Printchain => {
            let chain = Blockchain::init(config.db_path().as_str())?;
            let mut iterator = chain.iterator();
            while let Some(block) = iterator.next() {
                println!("****************************************");
                println!("[Block] {}", block.get_data());
                println!("Hash: {}", block.get_hash());
                println!("Previous hash: {}", block.get_pre_block_hash());
                println!("Height: {}", block.get_height());
                println!("Nonce: {}", block.get_nonce());
                for tx in block.get_transactions() {
                    println!("- Transaction {}", HEXLOWER.encode(tx.get_id()));
                    for input in tx.get_vin() {
                        if input.is_coinbase_marker() {
                            println!("-- Input: coinbase");
                        } else {
                            println!(
                                "-- Input: {}:{}",
                                HEXLOWER.encode(input.get_txid()),
                                input.get_vout()
                            );
                        }
                    }
                    for output in tx.get_vout() {
                        println!(
                            "-- Output: {} to {}",
                            output.get_value(),
                            output.get_address()
                        );
                    }
                }
            }
        }
        Command::Ping { ip, port } => {
            let node = open_node(&config)?;
            node.ping(&ip, &port);
            println!("Pinged {ip}:{port}");
        }
        Command::StartNode { peer } => {
            let wallets = Wallets::new(config.wallet_path().as_str());
            let node = open_node(&config)?;
            register_local_wallets(&node, &wallets);
            if let Some(peer) = peer {
                ping_peer(&node, &peer)?;
            }
            node.serve()?;
        }
    }
    Ok(())
}

fn open_node(config: &NodeConfig) -> Result<Node, ChainError> {
    let chain = Blockchain::init(config.db_path().as_str())?;
    let name = format!("node-{}", config.listen_port);
    Node::new(chain, config, &name)
}

// Local wallets are identities too: the validator needs their public keys
// and peers need to resolve them as payment destinations.
fn register_local_wallets(node: &Node, wallets: &Wallets) {
    for name in wallets.get_all_names() {
        if let Some(wallet) = wallets.get_wallet(&name) {
            node.register_local_identity(UserMeta {
                name,
                public_key: wallet.get_public_key().to_vec(),
                address: wallet.get_address(),
            });
        }
    }
}

fn ping_peer(node: &Node, peer: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (ip, port) = peer
        .rsplit_once(':')
        .ok_or_else(|| format!("Invalid peer address {peer}, expected ip:port"))?;
    node.ping(ip, port);
    Ok(())
}

// Receivers resolve in order: local wallet name, known network identity,
// raw address.
fn resolve_payments(
    node: &Node,
    wallets: &Wallets,
    payments: &[PaymentArg],
) -> Result<(Vec<String>, Vec<u64>), Box<dyn std::error::Error>> {
    let mut to_addresses = vec![];
    let mut amounts = vec![];
    for payment in payments {
        let address = if let Some(wallet) = wallets.get_wallet(&payment.to) {
            wallet.get_address()
        } else if let Some(known) = node.address_book().get_by_name(&payment.to) {
            known.address
        } else if forgechain::validate_address(&payment.to) {
            payment.to.clone()
        } else {
            return Err(format!("Unknown receiver: {}", payment.to).into());
        };
        to_addresses.push(address);
        amounts.push(payment.amount);
    }
    Ok((to_addresses, amounts))
}
