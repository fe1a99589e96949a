use std::collections::HashMap;

use super::classifier::ClassifiedBlock;
use super::client::TransactionBuilder;
use crate::database::WithdrawalStore;
use crate::error::ScanResult;
use crate::models::{ConfirmationEntry, Currency, WithdrawalRecord};

/// A pending withdrawal seen on-chain, with one entry per recipient.
#[derive(Debug, Clone)]
pub struct WithdrawalMatch {
    pub record: WithdrawalRecord,
    pub confirmations: Vec<ConfirmationEntry>,
}

// Finds broadcast withdrawals among a block's transactions
pub struct WithdrawalMatcher<'a> {
    builder: &'a dyn TransactionBuilder,
    store: &'a dyn WithdrawalStore,
    currencies: &'a HashMap<String, Currency>,
    currency_ids: Vec<String>,
}

impl<'a> WithdrawalMatcher<'a> {
    pub fn new(
        builder: &'a dyn TransactionBuilder,
        store: &'a dyn WithdrawalStore,
        currencies: &'a HashMap<String, Currency>,
    ) -> Self {
        let mut currency_ids: Vec<String> = currencies.keys().cloned().collect();
        currency_ids.sort();
        WithdrawalMatcher { builder, store, currencies, currency_ids }
    }

    pub async fn match_block(&self, block: &ClassifiedBlock) -> ScanResult<Vec<WithdrawalMatch>> {
        let mut matches = Vec::new();
        if self.currency_ids.is_empty() {
            return Ok(matches);
        }

        for txn in &block.transactions {
            let txid = self.builder.normalize_txid(txn.hash());
            for record in self.store.find_pending(&self.currency_ids, &txid).await? {
                let currency = match self.currencies.get(&record.currency_id) {
                    Some(currency) => currency,
                    None => continue,
                };
                let built = self.builder.build_transaction_entries(txn, &block.block, currency)?;
                let confirmations = built
                    .entries
                    .into_iter()
                    .enumerate()
                    .map(|(index, entry)| ConfirmationEntry {
                        withdrawal_id: record.id,
                        txid: built.id.clone(),
                        destination_address: entry.address,
                        amount: entry.amount,
                        output_index: index as u32,
                        block_number: built.block_number,
                    })
                    .collect();
                matches.push(WithdrawalMatch { record, confirmations });
            }
        }

        Ok(matches)
    }
}
