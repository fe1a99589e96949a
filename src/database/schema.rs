use sqlx::{Pool, Postgres};

// Tables are created idempotently at startup. `blockchains`, `currencies`,
// `payment_addresses` and `withdrawals` are owned by the wider exchange; the
// scanner only reads them (and moves withdrawal status and cursor height).
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS blockchains (
    key TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    client TEXT NOT NULL,
    server TEXT NOT NULL,
    height BIGINT NOT NULL DEFAULT 0,
    min_confirmations INTEGER NOT NULL DEFAULT 6,
    status TEXT NOT NULL DEFAULT 'active'
);
CREATE TABLE IF NOT EXISTS currencies (
    id TEXT PRIMARY KEY,
    blockchain_key TEXT NOT NULL REFERENCES blockchains (key),
    decimals INTEGER NOT NULL,
    contract_address TEXT
);
CREATE TABLE IF NOT EXISTS payment_addresses (
    address TEXT NOT NULL,
    currency_id TEXT NOT NULL REFERENCES currencies (id),
    account_id BIGINT NOT NULL,
    PRIMARY KEY (address, currency_id)
);
CREATE TABLE IF NOT EXISTS deposits (
    txid TEXT NOT NULL,
    txout INTEGER NOT NULL,
    currency_id TEXT NOT NULL,
    address TEXT NOT NULL,
    amount NUMERIC NOT NULL,
    account_id BIGINT NOT NULL,
    block_number BIGINT NOT NULL,
    status TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (txid, txout, currency_id)
);
CREATE TABLE IF NOT EXISTS withdrawals (
    id BIGSERIAL PRIMARY KEY,
    currency_id TEXT NOT NULL,
    txid TEXT,
    status TEXT NOT NULL,
    block_number BIGINT
);
CREATE INDEX IF NOT EXISTS idx_withdrawals_txid ON withdrawals (txid);
CREATE TABLE IF NOT EXISTS withdrawal_confirmations (
    withdrawal_id BIGINT NOT NULL REFERENCES withdrawals (id),
    txout INTEGER NOT NULL,
    txid TEXT NOT NULL,
    destination_address TEXT NOT NULL,
    amount NUMERIC NOT NULL,
    block_number BIGINT NOT NULL,
    PRIMARY KEY (withdrawal_id, txout)
);
CREATE TABLE IF NOT EXISTS failed_blocks (
    blockchain_key TEXT NOT NULL,
    block_number BIGINT NOT NULL,
    reason TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 1,
    failed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (blockchain_key, block_number)
);
-- Widen amount columns created with a fixed precision
ALTER TABLE deposits ALTER COLUMN amount TYPE NUMERIC;
ALTER TABLE withdrawal_confirmations ALTER COLUMN amount TYPE NUMERIC;
"#;

pub async fn init_db(pool: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
