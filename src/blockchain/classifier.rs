use log::debug;

use super::client::TransactionBuilder;
use super::fetcher::BlockFetcher;
use crate::error::ScanResult;
use crate::models::{Block, Receipt, Transaction};
use crate::utils::hex_is_zero;

/// A transaction that passed validation, tagged by how its value moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedTxn {
    NativeTransfer(Transaction),
    ContractTransfer { tx: Transaction, receipt: Receipt },
}

impl ClassifiedTxn {
    pub fn transaction(&self) -> &Transaction {
        match self {
            ClassifiedTxn::NativeTransfer(tx) => tx,
            ClassifiedTxn::ContractTransfer { tx, .. } => tx,
        }
    }

    pub fn hash(&self) -> &str {
        &self.transaction().hash
    }
}

/// A block whose transactions have each been classified exactly once.
#[derive(Debug, Clone)]
pub struct ClassifiedBlock {
    pub block: Block,
    pub transactions: Vec<ClassifiedTxn>,
}

// Splits transactions into native transfers and contract calls, dropping
// anything the chain's validity predicates reject
pub struct TransactionClassifier<'a> {
    fetcher: &'a BlockFetcher,
    builder: &'a dyn TransactionBuilder,
}

impl<'a> TransactionClassifier<'a> {
    pub fn new(fetcher: &'a BlockFetcher, builder: &'a dyn TransactionBuilder) -> Self {
        TransactionClassifier { fetcher, builder }
    }

    // `Ok(None)` is a filtering decision; `Err` means the receipt lookup itself failed
    pub async fn classify(&self, tx: &Transaction) -> ScanResult<Option<ClassifiedTxn>> {
        if hex_is_zero(&tx.input) {
            if self.builder.is_invalid_native_transaction(tx) {
                debug!("Skipping invalid native transaction {}", tx.hash);
                return Ok(None);
            }
            return Ok(Some(ClassifiedTxn::NativeTransfer(tx.clone())));
        }

        let receipt = match self.fetcher.get_transaction_receipt(&tx.hash).await? {
            Some(receipt) => receipt,
            None => {
                debug!("Receipt for {} not available yet, skipping", tx.hash);
                return Ok(None);
            }
        };
        if self.builder.is_invalid_contract_transaction(&receipt) {
            debug!("Skipping invalid contract transaction {}", tx.hash);
            return Ok(None);
        }
        Ok(Some(ClassifiedTxn::ContractTransfer { tx: tx.clone(), receipt }))
    }

    pub async fn classify_block(&self, block: Block) -> ScanResult<ClassifiedBlock> {
        let mut transactions = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            if let Some(classified) = self.classify(tx).await? {
                transactions.push(classified);
            }
        }
        Ok(ClassifiedBlock { block, transactions })
    }
}
