use log::error;
use regex::Regex;

use super::classifier::ClassifiedTxn;
use super::client::TransactionBuilder;
use crate::error::{ScanError, ScanResult};
use crate::metrics::AMOUNTS_REJECTED;
use crate::models::{Block, Currency, Log, Receipt, Transaction, TransactionEntries, TransferEntry};
use crate::utils::{base_units_to_decimal, parse_hex_u128, topic_to_address};

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_EVENT_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

const SUCCESS_STATUS: u64 = 1;

lazy_static::lazy_static! {
    static ref ADDRESS_RE: Regex = Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap();
}

fn is_transfer_log(log: &Log) -> bool {
    log.topics.len() == 3 && log.topics[0].eq_ignore_ascii_case(TRANSFER_EVENT_TOPIC)
}

fn reject_amount(txid: &str, currency: &Currency, e: &ScanError) {
    error!("Dropping {} transfer in {}: {}", currency.id, txid, e);
    AMOUNTS_REJECTED.with_label_values(&[currency.id.as_str()]).inc();
}

/// Transaction interpretation for Ethereum and ERC-20 tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ethereum;

impl Ethereum {
    pub fn new() -> Self {
        Ethereum
    }

    pub fn is_valid_address(address: &str) -> bool {
        ADDRESS_RE.is_match(address)
    }

    fn native_entries(&self, tx: &Transaction, currency: &Currency) -> ScanResult<Vec<TransferEntry>> {
        let to = match &tx.to {
            Some(to) => to,
            None => return Ok(Vec::new()),
        };
        match base_units_to_decimal(tx.value, currency.decimals) {
            Ok(amount) => Ok(vec![TransferEntry { address: self.normalize_address(to), amount }]),
            Err(e) => {
                reject_amount(&tx.hash, currency, &e);
                Ok(Vec::new())
            }
        }
    }

    // One entry per Transfer event emitted by the currency's own contract.
    // Events from other contracts in the same receipt are ignored.
    fn token_entries(&self, receipt: &Receipt, currency: &Currency) -> ScanResult<Vec<TransferEntry>> {
        let contract = match &currency.contract_address {
            Some(contract) => self.normalize_address(contract),
            None => return Ok(Vec::new()),
        };
        let mut entries = Vec::new();
        for log in receipt.logs.iter().filter(|log| is_transfer_log(log)) {
            if self.normalize_address(&log.address) != contract {
                continue;
            }
            let address = match topic_to_address(&log.topics[2]) {
                Some(address) => address,
                None => continue,
            };
            // An amount the ledger cannot hold drops only this entry, not the block
            let amount = match parse_hex_u128(&log.data)
                .and_then(|value| base_units_to_decimal(value, currency.decimals))
            {
                Ok(amount) => amount,
                Err(e) => {
                    reject_amount(&receipt.transaction_hash, currency, &e);
                    continue;
                }
            };
            entries.push(TransferEntry { address, amount });
        }
        Ok(entries)
    }
}

impl TransactionBuilder for Ethereum {
    fn is_invalid_native_transaction(&self, tx: &Transaction) -> bool {
        let to = match tx.to.as_deref() {
            Some(to) if Ethereum::is_valid_address(to) => to,
            _ => return true,
        };
        if tx.value == 0 {
            return true;
        }
        matches!(&tx.from, Some(from) if from.eq_ignore_ascii_case(to))
    }

    fn is_invalid_contract_transaction(&self, receipt: &Receipt) -> bool {
        if matches!(receipt.status, Some(status) if status != SUCCESS_STATUS) {
            return true;
        }
        if receipt.to.as_deref().map_or(true, str::is_empty) {
            return true;
        }
        !receipt.logs.iter().any(is_transfer_log)
    }

    fn build_transaction_entries(
        &self,
        txn: &ClassifiedTxn,
        block: &Block,
        currency: &Currency,
    ) -> ScanResult<TransactionEntries> {
        let entries = match txn {
            ClassifiedTxn::NativeTransfer(tx) if currency.is_native() => self.native_entries(tx, currency)?,
            ClassifiedTxn::NativeTransfer(_) => Vec::new(),
            ClassifiedTxn::ContractTransfer { receipt, .. } => self.token_entries(receipt, currency)?,
        };
        Ok(TransactionEntries {
            id: self.normalize_txid(txn.hash()),
            block_number: block.number,
            entries,
        })
    }

    fn resolve_addresses(&self, txn: &ClassifiedTxn) -> Vec<String> {
        let mut addresses: Vec<String> = match txn {
            ClassifiedTxn::NativeTransfer(tx) => tx.to.iter().map(|to| self.normalize_address(to)).collect(),
            ClassifiedTxn::ContractTransfer { receipt, .. } => receipt
                .logs
                .iter()
                .filter(|log| is_transfer_log(log))
                .filter_map(|log| topic_to_address(&log.topics[2]))
                .collect(),
        };
        addresses.sort();
        addresses.dedup();
        addresses
    }

    fn normalize_txid(&self, hash: &str) -> String {
        hash.to_lowercase()
    }

    fn normalize_address(&self, address: &str) -> String {
        address.to_lowercase()
    }
}
