pub mod classifier;
pub mod client;
pub mod deposits;
pub mod ethereum;
pub mod fetcher;
pub mod rpc;
pub mod syncer;
pub mod withdrawals;

pub use classifier::{ClassifiedBlock, ClassifiedTxn, TransactionClassifier};
pub use client::{NodeClient, TransactionBuilder};
pub use deposits::DepositExtractor;
pub use ethereum::Ethereum;
pub use fetcher::BlockFetcher;
pub use rpc::EthereumRpc;
pub use syncer::{BlockOutcome, ChainSyncer, ScanReport, SingleFlight};
pub use withdrawals::{WithdrawalMatch, WithdrawalMatcher};

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ScanError, ScanResult};
use crate::models::ChainCursor;

// Picks the node client and transaction builder named by the chain's `client` column
pub fn client_for(
    chain: &ChainCursor,
    rpc_timeout: Duration,
) -> ScanResult<(Arc<dyn NodeClient>, Arc<dyn TransactionBuilder>)> {
    match chain.client.as_str() {
        "ethereum" | "geth" | "parity" => Ok((
            Arc::new(EthereumRpc::new(&chain.server, rpc_timeout)?),
            Arc::new(Ethereum::new()),
        )),
        other => Err(ScanError::UnknownClient(other.to_string())),
    }
}
