use std::collections::{HashMap, HashSet};

use super::classifier::ClassifiedBlock;
use super::client::TransactionBuilder;
use crate::database::AddressRegistry;
use crate::error::ScanResult;
use crate::models::{Currency, DepositEntry, DepositStatus};

// Builds deposit entries for transfers that land on a registered custodial address
pub struct DepositExtractor<'a> {
    builder: &'a dyn TransactionBuilder,
    registry: &'a dyn AddressRegistry,
    currencies: &'a HashMap<String, Currency>,
}

impl<'a> DepositExtractor<'a> {
    pub fn new(
        builder: &'a dyn TransactionBuilder,
        registry: &'a dyn AddressRegistry,
        currencies: &'a HashMap<String, Currency>,
    ) -> Self {
        DepositExtractor { builder, registry, currencies }
    }

    // Entries come out `submitted`; the syncer decides acceptance from depth.
    // The output index is the entry's position in the builder output for that
    // currency, so it is the same on every re-scan of the block.
    pub async fn extract(&self, block: &ClassifiedBlock) -> ScanResult<Vec<DepositEntry>> {
        let mut deposits = Vec::new();
        let mut seen = HashSet::new();

        for txn in &block.transactions {
            for address in self.builder.resolve_addresses(txn) {
                for payment_address in self.registry.find_by_address(&address).await? {
                    // Addresses can be registered for currencies of other chains
                    let currency = match self.currencies.get(&payment_address.currency_id) {
                        Some(currency) => currency,
                        None => continue,
                    };
                    let owner = self.builder.normalize_address(&payment_address.address);
                    let built = self.builder.build_transaction_entries(txn, &block.block, currency)?;

                    for (index, entry) in built.entries.iter().enumerate() {
                        if entry.address != owner {
                            continue;
                        }
                        let deposit = DepositEntry {
                            txid: built.id.clone(),
                            address: entry.address.clone(),
                            amount: entry.amount,
                            account_id: payment_address.account_id,
                            currency_id: currency.id.clone(),
                            output_index: index as u32,
                            block_number: built.block_number,
                            status: DepositStatus::Submitted,
                        };
                        if seen.insert(deposit.key()) {
                            deposits.push(deposit);
                        }
                    }
                }
            }
        }

        Ok(deposits)
    }
}
