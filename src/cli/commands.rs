use clap::{Parser, Subcommand};
use std::str::FromStr;

/// One payment leg of a transfer, written as `receiver:amount`.
/// The receiver is a wallet name, a known identity, or a raw address.
#[derive(Debug, Clone)]
pub struct PaymentArg {
    pub to: String,
    pub amount: u64,
}

impl FromStr for PaymentArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (to, amount) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("Invalid payment: {s}. Use receiver:amount"))?;
        if to.is_empty() {
            return Err(format!("Invalid payment: {s}. Receiver must not be empty"));
        }
        let amount = amount
            .parse::<u64>()
            .map_err(|_| format!("Invalid amount in payment: {s}"))?;
        Ok(PaymentArg {
            to: to.to_string(),
            amount,
        })
    }
}

#[derive(Debug, Parser)]
#[command(name = "forgechain")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createwallet", about = "Create a new named wallet")]
    Createwallet {
        #[arg(help = "Logical name of the wallet owner")]
        name: String,
    },
    #[command(name = "listwallets", about = "Print local wallet names and addresses")]
    ListWallets,
    #[command(name = "getbalance", about = "Get the balance of a wallet name or address")]
    GetBalance {
        #[arg(help = "Wallet name or raw address")]
        owner: String,
    },
    #[command(name = "send", about = "Create, pend and gossip a transaction")]
    Send {
        #[arg(help = "Label the transaction is pooled under")]
        key: String,
        #[arg(help = "Sender wallet name")]
        from: String,
        #[arg(required = true, help = "Payments, each receiver:amount")]
        payments: Vec<PaymentArg>,
        #[arg(long, help = "Mine the transaction immediately with this wallet")]
        mine: Option<String>,
        #[arg(long, help = "Bootstrap peer ip:port to gossip through")]
        peer: Option<String>,
    },
    #[command(name = "mine", about = "Mine a block paying the reward to a wallet")]
    Mine {
        #[arg(help = "Miner wallet name")]
        miner: String,
        #[arg(help = "Block description payload")]
        description: String,
    },
    #[command(name = "listpending", about = "Print all pooled transaction labels")]
    ListPending,
    #[command(name = "printchain", about = "Print all blocks from tip to genesis")]
    Printchain,
    #[command(name = "ping", about = "Introduce this node to a peer")]
    Ping {
        #[arg(help = "Peer ip")]
        ip: String,
        #[arg(help = "Peer port")]
        port: String,
    },
    #[command(name = "startnode", about = "Start the gossip node")]
    StartNode {
        #[arg(long, help = "Bootstrap peer ip:port to ping on startup")]
        peer: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_arg_parses() {
        let payment: PaymentArg = "bob:30".parse().unwrap();
        assert_eq!(payment.to, "bob");
        assert_eq!(payment.amount, 30);
    }

    #[test]
    fn test_payment_arg_rejects_garbage() {
        assert!("bob".parse::<PaymentArg>().is_err());
        assert!(":30".parse::<PaymentArg>().is_err());
        assert!("bob:lots".parse::<PaymentArg>().is_err());
    }
}
