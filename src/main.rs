use log::{info, warn};

use pow_ledger::blockchain::{Blockchain, Wallet};

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // One ledger shared by every wallet
    let blockchain = Blockchain::new();

    let satoshi = Wallet::new();
    let bob = Wallet::new();
    let alice = Wallet::new();

    let transfers = [
        (&satoshi, 50.0, &bob),
        (&bob, 23.0, &alice),
        (&alice, 5.0, &bob),
    ];

    for (payer, amount, payee) in transfers {
        match payer.send_money(&blockchain, amount, payee.public_key()) {
            Ok(block) => info!("Accepted transfer of {}: {}", amount, block.transaction),
            Err(err) => warn!("Transfer of {} rejected: {}", amount, err),
        }
    }

    info!("Chain:\n{}", serde_json::to_string_pretty(&blockchain.get_chain())?);
    info!("Last block:\n{}", serde_json::to_string_pretty(&blockchain.last_block())?);

    if !blockchain.is_valid() {
        anyhow::bail!("chain failed validation");
    }

    Ok(())
}
