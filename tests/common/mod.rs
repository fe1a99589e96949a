#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ledgerbus::blockchain::{BlockFetcher, ChainSyncer, Ethereum, NodeClient, SingleFlight};
use ledgerbus::database::{AddressRegistry, CursorStore, DepositLedger, Stores, WithdrawalStore};
use ledgerbus::models::{
    Block, ChainCursor, ConfirmationEntry, Currency, DepositEntry, FailedBlock, Log, PaymentAddress, Receipt,
    Transaction, WithdrawalRecord, WithdrawalStatus,
};
use ledgerbus::{ScanError, ScanResult};

pub const CHAIN: &str = "eth-rinkeby";
pub const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

pub const HOT_WALLET: &str = "0x00000000000000000000000000000000000000aa";
pub const ALICE: &str = "0x1111111111111111111111111111111111111111";
pub const BOB: &str = "0x2222222222222222222222222222222222222222";
pub const CAROL: &str = "0x5555555555555555555555555555555555555555";
pub const STRANGER: &str = "0x9999999999999999999999999999999999999999";
pub const TOKEN: &str = "0x3333333333333333333333333333333333333333";

pub const ONE_ETH: u128 = 1_000_000_000_000_000_000;

/// Scriptable node: fixed tip, known blocks and receipts, and blocks that fail.
#[derive(Default)]
pub struct MockNode {
    tip: AtomicU64,
    blocks: Mutex<HashMap<u64, Block>>,
    receipts: Mutex<HashMap<String, Receipt>>,
    failing_blocks: Mutex<HashSet<u64>>,
    failing_receipts: Mutex<HashSet<String>>,
    pub block_fetches: AtomicUsize,
    pub receipt_fetches: AtomicUsize,
}

impl MockNode {
    pub fn with_tip(tip: u64) -> Arc<Self> {
        let node = MockNode::default();
        node.tip.store(tip, Ordering::SeqCst);
        Arc::new(node)
    }

    pub fn set_tip(&self, tip: u64) {
        self.tip.store(tip, Ordering::SeqCst);
    }

    pub fn add_block(&self, number: u64, transactions: Vec<Transaction>) {
        let block = Block { number, hash: Some(format!("0xb{:x}", number)), transactions };
        self.blocks.lock().unwrap().insert(number, block);
    }

    pub fn add_receipt(&self, receipt: Receipt) {
        self.receipts.lock().unwrap().insert(receipt.transaction_hash.clone(), receipt);
    }

    pub fn fail_block(&self, number: u64) {
        self.failing_blocks.lock().unwrap().insert(number);
    }

    pub fn heal_block(&self, number: u64) {
        self.failing_blocks.lock().unwrap().remove(&number);
    }

    pub fn fail_receipt(&self, hash: &str) {
        self.failing_receipts.lock().unwrap().insert(hash.to_string());
    }

    pub fn block_fetches(&self) -> usize {
        self.block_fetches.load(Ordering::SeqCst)
    }

    pub fn receipt_fetches(&self) -> usize {
        self.receipt_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn latest_block_number(&self) -> ScanResult<u64> {
        Ok(self.tip.load(Ordering::SeqCst))
    }

    async fn get_block(&self, number: u64) -> ScanResult<Option<Block>> {
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing_blocks.lock().unwrap().contains(&number) {
            return Err(ScanError::Rpc(format!("connection reset fetching block {}", number)));
        }
        Ok(self.blocks.lock().unwrap().get(&number).cloned())
    }

    async fn get_transaction_receipt(&self, hash: &str) -> ScanResult<Option<Receipt>> {
        self.receipt_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing_receipts.lock().unwrap().contains(hash) {
            return Err(ScanError::Rpc(format!("timeout fetching receipt {}", hash)));
        }
        Ok(self.receipts.lock().unwrap().get(hash).cloned())
    }
}

/// In-memory stand-in for the PostgreSQL stores with the same upsert rules.
#[derive(Default)]
pub struct MemoryStore {
    chains: Mutex<HashMap<String, ChainCursor>>,
    failed: Mutex<BTreeMap<u64, String>>,
    deposits: Mutex<BTreeMap<(String, u32, String), DepositEntry>>,
    withdrawals: Mutex<Vec<WithdrawalRecord>>,
    confirmations: Mutex<BTreeMap<(i64, u32), ConfirmationEntry>>,
    addresses: Mutex<Vec<PaymentAddress>>,
    pub writes: AtomicUsize,
}

impl MemoryStore {
    pub fn with_chain(cursor: ChainCursor) -> Arc<Self> {
        let store = MemoryStore::default();
        store.chains.lock().unwrap().insert(cursor.key.clone(), cursor);
        Arc::new(store)
    }

    pub fn register_address(&self, address: &str, currency_id: &str, account_id: i64) {
        self.addresses.lock().unwrap().push(PaymentAddress {
            address: address.to_string(),
            currency_id: currency_id.to_string(),
            account_id,
        });
    }

    pub fn add_withdrawal(&self, id: i64, txid: &str, currency_id: &str) {
        self.withdrawals.lock().unwrap().push(WithdrawalRecord {
            id,
            txid: txid.to_string(),
            currency_id: currency_id.to_string(),
            status: WithdrawalStatus::Confirming,
            block_number: None,
        });
    }

    pub fn height(&self) -> u64 {
        self.chains.lock().unwrap()[CHAIN].height
    }

    pub fn deposits(&self) -> Vec<DepositEntry> {
        self.deposits.lock().unwrap().values().cloned().collect()
    }

    pub fn confirmations(&self) -> Vec<ConfirmationEntry> {
        self.confirmations.lock().unwrap().values().cloned().collect()
    }

    pub fn withdrawal(&self, id: i64) -> WithdrawalRecord {
        self.withdrawals.lock().unwrap().iter().find(|w| w.id == id).cloned().unwrap()
    }

    pub fn failed_numbers(&self) -> Vec<u64> {
        self.failed.lock().unwrap().keys().copied().collect()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn get_cursor(&self, key: &str) -> ScanResult<Option<ChainCursor>> {
        Ok(self.chains.lock().unwrap().get(key).cloned())
    }

    async fn active_chains(&self) -> ScanResult<Vec<ChainCursor>> {
        Ok(self.chains.lock().unwrap().values().filter(|c| c.is_active()).cloned().collect())
    }

    async fn set_height(&self, key: &str, height: u64) -> ScanResult<()> {
        self.wrote();
        let mut chains = self.chains.lock().unwrap();
        let chain = chains.get_mut(key).ok_or_else(|| ScanError::UnknownChain(key.to_string()))?;
        chain.height = chain.height.max(height);
        Ok(())
    }

    async fn record_failed_block(&self, _key: &str, block_number: u64, reason: &str) -> ScanResult<()> {
        self.wrote();
        self.failed.lock().unwrap().insert(block_number, reason.to_string());
        Ok(())
    }

    async fn failed_blocks(&self, key: &str) -> ScanResult<Vec<FailedBlock>> {
        Ok(self
            .failed
            .lock()
            .unwrap()
            .iter()
            .map(|(number, reason)| FailedBlock {
                blockchain_key: key.to_string(),
                block_number: *number,
                reason: reason.clone(),
            })
            .collect())
    }

    async fn clear_failed_block(&self, _key: &str, block_number: u64) -> ScanResult<()> {
        self.wrote();
        self.failed.lock().unwrap().remove(&block_number);
        Ok(())
    }
}

#[async_trait]
impl DepositLedger for MemoryStore {
    async fn upsert_many(&self, entries: &[DepositEntry]) -> ScanResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.wrote();
        let mut deposits = self.deposits.lock().unwrap();
        for entry in entries {
            match deposits.get_mut(&entry.key()) {
                Some(existing) => {
                    existing.block_number = entry.block_number;
                    if existing.status != ledgerbus::models::DepositStatus::Accepted {
                        existing.status = entry.status;
                    }
                }
                None => {
                    deposits.insert(entry.key(), entry.clone());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WithdrawalStore for MemoryStore {
    async fn find_pending(&self, currencies: &[String], txid: &str) -> ScanResult<Vec<WithdrawalRecord>> {
        Ok(self
            .withdrawals
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.status == WithdrawalStatus::Confirming)
            .filter(|w| w.txid == txid && currencies.contains(&w.currency_id))
            .cloned()
            .collect())
    }

    async fn append_confirmation(&self, record: &WithdrawalRecord, entry: &ConfirmationEntry) -> ScanResult<()> {
        self.wrote();
        self.confirmations
            .lock()
            .unwrap()
            .insert((record.id, entry.output_index), entry.clone());
        if let Some(w) = self.withdrawals.lock().unwrap().iter_mut().find(|w| w.id == record.id) {
            w.block_number = Some(entry.block_number);
        }
        Ok(())
    }

    async fn mark_succeed(&self, record: &WithdrawalRecord, block_number: u64) -> ScanResult<()> {
        self.wrote();
        if let Some(w) = self.withdrawals.lock().unwrap().iter_mut().find(|w| w.id == record.id) {
            if w.status == WithdrawalStatus::Confirming {
                w.status = WithdrawalStatus::Succeed;
                w.block_number = Some(block_number);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AddressRegistry for MemoryStore {
    async fn find_by_address(&self, address: &str) -> ScanResult<Vec<PaymentAddress>> {
        Ok(self
            .addresses
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.address.eq_ignore_ascii_case(address))
            .cloned()
            .collect())
    }
}

pub fn cursor(height: u64, min_confirmations: u64) -> ChainCursor {
    ChainCursor {
        key: CHAIN.to_string(),
        name: "Ethereum Rinkeby".to_string(),
        client: "ethereum".to_string(),
        server: "http://127.0.0.1:8545".to_string(),
        height,
        min_confirmations,
        status: "active".to_string(),
    }
}

pub fn eth() -> Currency {
    Currency { id: "eth".into(), blockchain_key: CHAIN.into(), decimals: 18, contract_address: None }
}

pub fn trst() -> Currency {
    Currency { id: "trst".into(), blockchain_key: CHAIN.into(), decimals: 6, contract_address: Some(TOKEN.into()) }
}

pub fn syncer(node: Arc<MockNode>, store: Arc<MemoryStore>) -> ChainSyncer {
    syncer_with_flights(node, store, SingleFlight::new())
}

pub fn syncer_with_flights(node: Arc<MockNode>, store: Arc<MemoryStore>, flights: SingleFlight) -> ChainSyncer {
    syncer_with_stores(node, Stores::shared(store), flights)
}

pub fn syncer_with_stores(node: Arc<MockNode>, stores: Stores, flights: SingleFlight) -> ChainSyncer {
    ChainSyncer::new(
        CHAIN,
        BlockFetcher::without_retries(node),
        Arc::new(Ethereum::new()),
        stores,
        vec![eth(), trst()],
        flights,
    )
}

pub fn native_tx(hash: &str, from: &str, to: &str, value: u128) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        from: Some(from.to_string()),
        to: Some(to.to_string()),
        value,
        input: "0x".to_string(),
    }
}

// A call into `contract` carrying ERC-20 `transfer` call data
pub fn contract_call(hash: &str, from: &str, contract: &str) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        from: Some(from.to_string()),
        to: Some(contract.to_string()),
        value: 0,
        input: "0xa9059cbb0000000000000000000000002222222222222222222222222222222222222222".to_string(),
    }
}

fn address_topic(address: &str) -> String {
    format!("0x000000000000000000000000{}", &address[2..])
}

pub fn transfer_receipt(hash: &str, contract: &str, transfers: &[(&str, u128)]) -> Receipt {
    Receipt {
        transaction_hash: hash.to_string(),
        status: Some(1),
        to: Some(contract.to_string()),
        logs: transfers
            .iter()
            .map(|(to, amount)| Log {
                address: contract.to_string(),
                topics: vec![TRANSFER_TOPIC.to_string(), address_topic(HOT_WALLET), address_topic(to)],
                data: format!("0x{:064x}", amount),
            })
            .collect(),
    }
}
