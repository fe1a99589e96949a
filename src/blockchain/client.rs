use async_trait::async_trait;

use super::classifier::ClassifiedTxn;
use crate::error::ScanResult;
use crate::models::{Block, Currency, Receipt, Transaction, TransactionEntries};

/// Node RPC surface the scanner needs. Each call may block or fail on its own.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn latest_block_number(&self) -> ScanResult<u64>;

    /// `None` when the node does not know the block yet.
    async fn get_block(&self, number: u64) -> ScanResult<Option<Block>>;

    /// `None` when the node has not indexed the receipt yet.
    async fn get_transaction_receipt(&self, hash: &str) -> ScanResult<Option<Receipt>>;
}

/// Chain-specific interpretation of transactions. Keeps the block processing
/// itself chain-agnostic.
pub trait TransactionBuilder: Send + Sync {
    fn is_invalid_native_transaction(&self, tx: &Transaction) -> bool;

    fn is_invalid_contract_transaction(&self, receipt: &Receipt) -> bool;

    /// Value-bearing outputs of `txn` denominated in `currency`. Entry order
    /// is stable; callers use the position as the output index.
    fn build_transaction_entries(
        &self,
        txn: &ClassifiedTxn,
        block: &Block,
        currency: &Currency,
    ) -> ScanResult<TransactionEntries>;

    /// Normalized destination addresses of `txn`.
    fn resolve_addresses(&self, txn: &ClassifiedTxn) -> Vec<String>;

    fn normalize_txid(&self, hash: &str) -> String;

    fn normalize_address(&self, address: &str) -> String;
}
