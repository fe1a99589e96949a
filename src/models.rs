use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// Durable per-chain sync position. One row of the `blockchains` table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChainCursor {
    pub key: String,
    pub name: String,
    pub client: String,
    pub server: String,
    // Last block whose deposits and withdrawals are committed and deep enough.
    pub height: u64,
    pub min_confirmations: u64,
    pub status: String,
}

impl ChainCursor {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Currency {
    pub id: String,
    pub blockchain_key: String,
    pub decimals: u32,
    // Token contract; `None` for the chain's native coin.
    pub contract_address: Option<String>,
}

impl Currency {
    pub fn is_native(&self) -> bool {
        self.contract_address.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub hash: Option<String>,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub hash: String,
    pub from: Option<String>,
    pub to: Option<String>,
    // Value in base units.
    pub value: u128,
    // Raw hex call data, `0x` for plain transfers.
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: String,
    pub status: Option<u64>,
    pub to: Option<String>,
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

// Output of the transaction builder for one transaction and one currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEntries {
    pub id: String,
    pub block_number: u64,
    pub entries: Vec<TransferEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEntry {
    pub address: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Submitted,
    Accepted,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Submitted => "submitted",
            DepositStatus::Accepted => "accepted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(DepositStatus::Submitted),
            "accepted" => Some(DepositStatus::Accepted),
            _ => None,
        }
    }
}

// Natural key is (txid, output_index, currency_id).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DepositEntry {
    pub txid: String,
    pub address: String,
    pub amount: Decimal,
    pub account_id: i64,
    pub currency_id: String,
    pub output_index: u32,
    pub block_number: u64,
    pub status: DepositStatus,
}

impl DepositEntry {
    pub fn key(&self) -> (String, u32, String) {
        (self.txid.clone(), self.output_index, self.currency_id.clone())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Confirming,
    Succeed,
    Failed,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Confirming => "confirming",
            WithdrawalStatus::Succeed => "succeed",
            WithdrawalStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirming" => Some(WithdrawalStatus::Confirming),
            "succeed" => Some(WithdrawalStatus::Succeed),
            "failed" => Some(WithdrawalStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WithdrawalRecord {
    pub id: i64,
    pub txid: String,
    pub currency_id: String,
    pub status: WithdrawalStatus,
    pub block_number: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ConfirmationEntry {
    pub withdrawal_id: i64,
    pub txid: String,
    pub destination_address: String,
    pub amount: Decimal,
    pub output_index: u32,
    pub block_number: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PaymentAddress {
    pub address: String,
    pub currency_id: String,
    pub account_id: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FailedBlock {
    pub blockchain_key: String,
    pub block_number: u64,
    pub reason: String,
}
