// Persistence seams used by the syncer, plus the PostgreSQL implementation
pub mod queries;
pub mod schema;

pub use queries::PgStore;
pub use schema::init_db;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ScanResult;
use crate::models::{
    ChainCursor, ConfirmationEntry, Currency, DepositEntry, FailedBlock, PaymentAddress, WithdrawalRecord,
};

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get_cursor(&self, key: &str) -> ScanResult<Option<ChainCursor>>;

    async fn active_chains(&self) -> ScanResult<Vec<ChainCursor>>;

    // Never lowers the stored height.
    async fn set_height(&self, key: &str, height: u64) -> ScanResult<()>;

    async fn record_failed_block(&self, key: &str, block_number: u64, reason: &str) -> ScanResult<()>;

    async fn failed_blocks(&self, key: &str) -> ScanResult<Vec<FailedBlock>>;

    async fn clear_failed_block(&self, key: &str, block_number: u64) -> ScanResult<()>;
}

#[async_trait]
pub trait DepositLedger: Send + Sync {
    // Insert-or-update keyed by (txid, output_index, currency_id). An accepted
    // deposit stays accepted.
    async fn upsert_many(&self, entries: &[DepositEntry]) -> ScanResult<()>;
}

#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    async fn find_pending(&self, currencies: &[String], txid: &str) -> ScanResult<Vec<WithdrawalRecord>>;

    // Idempotent on (withdrawal_id, output_index).
    async fn append_confirmation(&self, record: &WithdrawalRecord, entry: &ConfirmationEntry) -> ScanResult<()>;

    async fn mark_succeed(&self, record: &WithdrawalRecord, block_number: u64) -> ScanResult<()>;
}

#[async_trait]
pub trait AddressRegistry: Send + Sync {
    // One row per currency the address is registered for.
    async fn find_by_address(&self, address: &str) -> ScanResult<Vec<PaymentAddress>>;
}

#[async_trait]
pub trait CurrencyStore: Send + Sync {
    async fn currencies_for(&self, blockchain_key: &str) -> ScanResult<Vec<Currency>>;
}

/// The collaborators one chain scan writes through.
#[derive(Clone)]
pub struct Stores {
    pub cursors: Arc<dyn CursorStore>,
    pub deposits: Arc<dyn DepositLedger>,
    pub withdrawals: Arc<dyn WithdrawalStore>,
    pub addresses: Arc<dyn AddressRegistry>,
}

impl Stores {
    /// Uses one backend for every role.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: CursorStore + DepositLedger + WithdrawalStore + AddressRegistry + 'static,
    {
        Stores {
            cursors: store.clone(),
            deposits: store.clone(),
            withdrawals: store.clone(),
            addresses: store,
        }
    }
}
