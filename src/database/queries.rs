use async_trait::async_trait;
use log::error;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use super::{AddressRegistry, CurrencyStore, CursorStore, DepositLedger, WithdrawalStore};
use crate::error::{ScanError, ScanResult};
use crate::models::{
    ChainCursor, ConfirmationEntry, Currency, DepositEntry, DepositStatus, FailedBlock, PaymentAddress,
    WithdrawalRecord, WithdrawalStatus,
};

// Maximum rows per multi-row INSERT
const BATCH_SIZE: usize = 1000;

const CURSOR_COLUMNS: &str = "key, name, client, server, height, min_confirmations, status";
const DEPOSIT_COLUMNS: &str = "txid, txout, currency_id, address, amount, account_id, block_number, status";

fn to_db_height(n: u64) -> ScanResult<i64> {
    i64::try_from(n).map_err(|_| ScanError::Decode(format!("block number {} does not fit BIGINT", n)))
}

fn from_db_height(n: i64) -> u64 {
    n.max(0) as u64
}

fn cursor_from_row(row: &PgRow) -> Result<ChainCursor, sqlx::Error> {
    Ok(ChainCursor {
        key: row.try_get("key")?,
        name: row.try_get("name")?,
        client: row.try_get("client")?,
        server: row.try_get("server")?,
        height: from_db_height(row.try_get("height")?),
        min_confirmations: row.try_get::<i32, _>("min_confirmations")?.max(0) as u64,
        status: row.try_get("status")?,
    })
}

fn deposit_from_row(row: &PgRow) -> ScanResult<DepositEntry> {
    let status: String = row.try_get("status")?;
    Ok(DepositEntry {
        txid: row.try_get("txid")?,
        address: row.try_get("address")?,
        amount: row.try_get("amount")?,
        account_id: row.try_get("account_id")?,
        currency_id: row.try_get("currency_id")?,
        output_index: row.try_get::<i32, _>("txout")?.max(0) as u32,
        block_number: from_db_height(row.try_get("block_number")?),
        status: DepositStatus::parse(&status)
            .ok_or_else(|| ScanError::Decode(format!("unknown deposit status {}", status)))?,
    })
}

fn withdrawal_from_row(row: &PgRow) -> ScanResult<WithdrawalRecord> {
    let status: String = row.try_get("status")?;
    Ok(WithdrawalRecord {
        id: row.try_get("id")?,
        txid: row.try_get("txid")?,
        currency_id: row.try_get("currency_id")?,
        status: WithdrawalStatus::parse(&status)
            .ok_or_else(|| ScanError::Decode(format!("unknown withdrawal status {}", status)))?,
        block_number: row.try_get::<Option<i64>, _>("block_number")?.map(from_db_height),
    })
}

// PostgreSQL-backed implementation of every store the syncer needs
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    // Queries every deposit entry recorded for a transaction
    pub async fn deposits_by_txid(&self, txid: &str) -> ScanResult<Vec<DepositEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM deposits WHERE txid = $1 ORDER BY currency_id, txout",
            DEPOSIT_COLUMNS
        ))
        .bind(txid)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(deposit_from_row).collect()
    }
}

#[async_trait]
impl CursorStore for PgStore {
    // Fetches one chain's cursor row, if the chain is configured
    async fn get_cursor(&self, key: &str) -> ScanResult<Option<ChainCursor>> {
        let row = sqlx::query(&format!("SELECT {} FROM blockchains WHERE key = $1", CURSOR_COLUMNS))
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(cursor_from_row).transpose()?)
    }

    // Chains the scheduler should scan, in a stable order
    async fn active_chains(&self) -> ScanResult<Vec<ChainCursor>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM blockchains WHERE status = 'active' ORDER BY key",
            CURSOR_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(cursor_from_row).collect::<Result<_, _>>()?)
    }

    async fn set_height(&self, key: &str, height: u64) -> ScanResult<()> {
        // GREATEST keeps the stored height monotonic even for out-of-order writers
        let result = sqlx::query("UPDATE blockchains SET height = GREATEST(height, $2) WHERE key = $1")
            .bind(key)
            .bind(to_db_height(height)?)
            .execute(&self.pool)
            .await?;
        // No row means the chain was removed under us
        if result.rows_affected() == 0 {
            return Err(ScanError::UnknownChain(key.to_string()));
        }
        Ok(())
    }

    async fn record_failed_block(&self, key: &str, block_number: u64, reason: &str) -> ScanResult<()> {
        // Repeat failures bump the attempt count and keep the latest reason
        sqlx::query(
            r#"
            INSERT INTO failed_blocks (blockchain_key, block_number, reason)
            VALUES ($1, $2, $3)
            ON CONFLICT (blockchain_key, block_number)
            DO UPDATE SET reason = EXCLUDED.reason,
                          attempts = failed_blocks.attempts + 1,
                          failed_at = now()
            "#,
        )
        .bind(key)
        .bind(to_db_height(block_number)?)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // Ledgered failures, oldest block first
    async fn failed_blocks(&self, key: &str) -> ScanResult<Vec<FailedBlock>> {
        let rows = sqlx::query(
            "SELECT blockchain_key, block_number, reason FROM failed_blocks WHERE blockchain_key = $1 ORDER BY block_number",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> ScanResult<FailedBlock> {
                Ok(FailedBlock {
                    blockchain_key: row.try_get("blockchain_key")?,
                    block_number: from_db_height(row.try_get("block_number")?),
                    reason: row.try_get("reason")?,
                })
            })
            .collect()
    }

    // Called once a retried block goes through
    async fn clear_failed_block(&self, key: &str, block_number: u64) -> ScanResult<()> {
        sqlx::query("DELETE FROM failed_blocks WHERE blockchain_key = $1 AND block_number = $2")
            .bind(key)
            .bind(to_db_height(block_number)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DepositLedger for PgStore {
    async fn upsert_many(&self, entries: &[DepositEntry]) -> ScanResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        // All batches of a block land together or not at all
        let mut db_tx = self.pool.begin().await?;

        // Insert deposits in batches to stay under the bind parameter limit
        for batch in entries.chunks(BATCH_SIZE) {
            let mut query = sqlx::QueryBuilder::<Postgres>::new(format!("INSERT INTO deposits ({}) ", DEPOSIT_COLUMNS));
            // Convert to column types up front so a bad value fails before the query is built
            let mut rows = Vec::with_capacity(batch.len());
            for entry in batch {
                rows.push((entry, to_db_height(entry.block_number)?, i32::try_from(entry.output_index).unwrap_or(i32::MAX)));
            }
            query.push_values(rows, |mut b, (entry, block_number, txout)| {
                b.push_bind(&entry.txid)
                    .push_bind(txout)
                    .push_bind(&entry.currency_id)
                    .push_bind(&entry.address)
                    .push_bind(entry.amount)
                    .push_bind(entry.account_id)
                    .push_bind(block_number)
                    .push_bind(entry.status.as_str());
            });
            // Re-scans refresh the block number; an accepted deposit never regresses
            query.push(
                " ON CONFLICT (txid, txout, currency_id) DO UPDATE SET \
                 block_number = EXCLUDED.block_number, \
                 status = CASE WHEN deposits.status = 'accepted' THEN deposits.status ELSE EXCLUDED.status END, \
                 updated_at = now()",
            );

            query.build().execute(&mut *db_tx).await.map_err(|e| {
                error!("Failed to upsert batch of {} deposits: {}", batch.len(), e);
                e
            })?;
        }

        // Commit the transaction
        db_tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl WithdrawalStore for PgStore {
    // Broadcast withdrawals of this chain's currencies still waiting for the chain
    async fn find_pending(&self, currencies: &[String], txid: &str) -> ScanResult<Vec<WithdrawalRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, txid, currency_id, status, block_number
            FROM withdrawals
            WHERE currency_id = ANY($1) AND txid = $2 AND status = 'confirming'
            ORDER BY id
            "#,
        )
        .bind(currencies)
        .bind(txid)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(withdrawal_from_row).collect()
    }

    async fn append_confirmation(&self, record: &WithdrawalRecord, entry: &ConfirmationEntry) -> ScanResult<()> {
        let block_number = to_db_height(entry.block_number)?;
        // Confirmation row and the withdrawal's block number move together
        let mut db_tx = self.pool.begin().await?;

        // Re-scans hit the same (withdrawal_id, txout) and only refresh the block

        sqlx::query(
            r#"
            INSERT INTO withdrawal_confirmations
                (withdrawal_id, txout, txid, destination_address, amount, block_number)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (withdrawal_id, txout)
            DO UPDATE SET block_number = EXCLUDED.block_number
            "#,
        )
        .bind(record.id)
        .bind(i32::try_from(entry.output_index).unwrap_or(i32::MAX))
        .bind(&entry.txid)
        .bind(&entry.destination_address)
        .bind(entry.amount)
        .bind(block_number)
        .execute(&mut *db_tx)
        .await?;

        // Record where the withdrawal was seen
        sqlx::query("UPDATE withdrawals SET block_number = $2 WHERE id = $1")
            .bind(record.id)
            .bind(block_number)
            .execute(&mut *db_tx)
            .await?;

        db_tx.commit().await?;
        Ok(())
    }

    // Only a confirming withdrawal moves; succeed and failed are terminal
    async fn mark_succeed(&self, record: &WithdrawalRecord, block_number: u64) -> ScanResult<()> {
        sqlx::query("UPDATE withdrawals SET status = 'succeed', block_number = $2 WHERE id = $1 AND status = 'confirming'")
            .bind(record.id)
            .bind(to_db_height(block_number)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AddressRegistry for PgStore {
    // Addresses are compared lowercased; callers pass normalized input
    async fn find_by_address(&self, address: &str) -> ScanResult<Vec<PaymentAddress>> {
        let rows = sqlx::query(
            "SELECT address, currency_id, account_id FROM payment_addresses WHERE lower(address) = $1",
        )
        .bind(address)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> ScanResult<PaymentAddress> {
                Ok(PaymentAddress {
                    address: row.try_get("address")?,
                    currency_id: row.try_get("currency_id")?,
                    account_id: row.try_get("account_id")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CurrencyStore for PgStore {
    // Currencies settled on one chain, native and tokens alike
    async fn currencies_for(&self, blockchain_key: &str) -> ScanResult<Vec<Currency>> {
        let rows = sqlx::query(
            "SELECT id, blockchain_key, decimals, contract_address FROM currencies WHERE blockchain_key = $1 ORDER BY id",
        )
        .bind(blockchain_key)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> ScanResult<Currency> {
                Ok(Currency {
                    id: row.try_get("id")?,
                    blockchain_key: row.try_get("blockchain_key")?,
                    decimals: row.try_get::<i32, _>("decimals")?.max(0) as u32,
                    contract_address: row.try_get("contract_address")?,
                })
            })
            .collect()
    }
}
