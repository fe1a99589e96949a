use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{error, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::classifier::TransactionClassifier;
use super::client::TransactionBuilder;
use super::deposits::DepositExtractor;
use super::fetcher::BlockFetcher;
use super::withdrawals::WithdrawalMatcher;
use crate::database::Stores;
use crate::error::{ScanError, ScanResult};
use crate::metrics::{
    BLOCKS_PROCESSED, BLOCK_FAILURES, BLOCK_PROCESS_TIME, CURSOR_HEIGHT, DEPOSITS_FOUND, WITHDRAWALS_CONFIRMED,
};
use crate::models::{ChainCursor, Currency, DepositStatus};

/// What happened to one block during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "lowercase")]
pub enum BlockOutcome {
    /// Entries persisted and the block is deep enough; the cursor covers it.
    Committed(u64),
    /// Entries persisted but the cursor was not moved over the block: it is
    /// too shallow, or an earlier block's failure could not be recorded.
    Skipped,
    /// Nothing committed; the block will be retried.
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub tip: u64,
    /// Inclusive block range walked; `None` when the scan was a no-op.
    pub range: Option<(u64, u64)>,
    pub blocks: Vec<(u64, BlockOutcome)>,
    /// Earlier failed blocks retried before the range.
    pub retried: Vec<(u64, BlockOutcome)>,
    pub deposits: usize,
    pub confirmations: usize,
    /// Cursor as it stands after the scan.
    pub cursor: ChainCursor,
}

impl ScanReport {
    pub fn failures(&self) -> usize {
        self.blocks
            .iter()
            .chain(self.retried.iter())
            .filter(|(_, outcome)| matches!(outcome, BlockOutcome::Failed(_)))
            .count()
    }

    // More blocks are already deep enough than this scan could reach.
    pub fn is_lagging(&self) -> bool {
        match self.range {
            Some((_, to)) => to.saturating_add(self.cursor.min_confirmations) < self.tip,
            None => false,
        }
    }
}

/// Tracks which chains have a scan running in this process.
#[derive(Clone, Default)]
pub struct SingleFlight {
    running: Arc<DashMap<String, Uuid>>,
}

pub struct FlightGuard {
    running: Arc<DashMap<String, Uuid>>,
    key: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.running.remove(&self.key);
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        SingleFlight::default()
    }

    pub fn try_acquire(&self, key: &str, scan_id: Uuid) -> Option<FlightGuard> {
        match self.running.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(scan_id);
                Some(FlightGuard { running: self.running.clone(), key: key.to_string() })
            }
        }
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.running.contains_key(key)
    }
}

// Per-scan state threaded through block processing
struct ScanState {
    // Blocks that were already in the failure ledger when the scan started
    failed: HashSet<u64>,
    // Set once a failure could not be written to the ledger. From then on
    // the cursor must stay below that block so it is walked again.
    held_at: Option<u64>,
}

#[derive(Default)]
struct BlockWork {
    deposits: usize,
    confirmations: usize,
}

// Walks one chain's blocks in ascending order, persists what it finds and
// moves the cursor once blocks are deep enough
pub struct ChainSyncer {
    key: String,
    fetcher: BlockFetcher,
    builder: Arc<dyn TransactionBuilder>,
    stores: Stores,
    currencies: HashMap<String, Currency>,
    flights: SingleFlight,
}

impl ChainSyncer {
    pub fn new(
        key: &str,
        fetcher: BlockFetcher,
        builder: Arc<dyn TransactionBuilder>,
        stores: Stores,
        currencies: Vec<Currency>,
        flights: SingleFlight,
    ) -> Self {
        ChainSyncer {
            key: key.to_string(),
            fetcher,
            builder,
            stores,
            currencies: currencies.into_iter().map(|c| (c.id.clone(), c)).collect(),
            flights,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Loads the stored cursor and scans from it.
    pub async fn process_chain(&self, blocks_limit: u64, force: bool) -> ScanResult<ScanReport> {
        let cursor = self
            .stores
            .cursors
            .get_cursor(&self.key)
            .await?
            .ok_or_else(|| ScanError::UnknownChain(self.key.clone()))?;
        self.scan(cursor, blocks_limit, force).await
    }

    /// Scans forward from `cursor` and returns the advanced cursor in the report.
    /// Only a failure to read the chain tip aborts; block failures are recorded.
    pub async fn scan(&self, mut cursor: ChainCursor, blocks_limit: u64, force: bool) -> ScanResult<ScanReport> {
        let scan_id = Uuid::new_v4();
        // One scan per chain at a time; the guard releases the slot on drop
        let _guard = self
            .flights
            .try_acquire(&self.key, scan_id)
            .ok_or_else(|| ScanError::ScanInProgress(self.key.clone()))?;

        // Without a tip there is no range to compute, so this error aborts the scan
        let tip = self.fetcher.latest_block_number().await?;
        let mut report = ScanReport {
            scan_id,
            tip,
            range: None,
            blocks: Vec::new(),
            retried: Vec::new(),
            deposits: 0,
            confirmations: 0,
            cursor: cursor.clone(),
        };

        // Don't start if no block has crossed the confirmation threshold yet
        if cursor.height.saturating_add(cursor.min_confirmations) >= tip && !force {
            info!(
                "Skip synchronization of {}. No new blocks detected height: {}, latest_block: {}",
                self.key, cursor.height, tip
            );
            return Ok(report);
        }

        // Re-walk the last committed block; writes are idempotent
        let from = cursor.height;
        let to = tip.min(from.saturating_add(blocks_limit));
        report.range = Some((from, to));
        info!("[{}] Scanning {} blocks {}..={} (tip {})", scan_id, self.key, from, to, tip);

        // A ledger read failure only postpones retries to the next scan
        let failed: HashSet<u64> = match self.stores.cursors.failed_blocks(&self.key).await {
            Ok(blocks) => blocks.into_iter().map(|b| b.block_number).collect(),
            Err(e) => {
                warn!("Could not load failed blocks of {}: {}. Not retrying them this scan", self.key, e);
                HashSet::new()
            }
        };

        // Blocks behind the cursor are only reachable through the failure ledger
        let mut behind: Vec<u64> = failed.iter().copied().filter(|b| *b < from).collect();
        behind.sort_unstable();
        let mut state = ScanState { failed, held_at: None };
        for number in behind {
            info!("Retrying previously failed {} block {}", self.key, number);
            let outcome = self.process_block(&mut cursor, number, tip, &mut state, &mut report).await;
            report.retried.push((number, outcome));
        }

        // Ascending walk of the new range; each block succeeds or fails on its own
        for number in from..=to {
            let outcome = self.process_block(&mut cursor, number, tip, &mut state, &mut report).await;
            report.blocks.push((number, outcome));
        }

        // Hand back the cursor as committed during this scan
        report.cursor = cursor;
        info!(
            "[{}] Finished scanning {}: cursor {}, {} deposits, {} withdrawal confirmations, {} failed blocks",
            scan_id,
            self.key,
            report.cursor.height,
            report.deposits,
            report.confirmations,
            report.failures()
        );
        Ok(report)
    }

    // Never propagates: a failure is reported, recorded, and turned into an outcome
    async fn process_block(
        &self,
        cursor: &mut ChainCursor,
        number: u64,
        tip: u64,
        state: &mut ScanState,
        report: &mut ScanReport,
    ) -> BlockOutcome {
        let started = Instant::now();
        info!("Started processing {} block number {}.", self.key, number);

        let held_at = state.held_at;
        let was_failed = state.failed.contains(&number);
        let result = async {
            // Write deposits and confirmations first, then decide on the cursor
            let work = self.persist_block(number, tip, cursor.min_confirmations).await?;
            let outcome = match held_at {
                Some(unrecorded) => {
                    warn!(
                        "Not advancing {} past block {}: its failure is not in the retry ledger",
                        self.key, unrecorded
                    );
                    BlockOutcome::Skipped
                }
                None => self.advance_cursor(cursor, number, tip).await?,
            };
            // A retried block that made it through leaves the ledger
            if was_failed {
                self.stores.cursors.clear_failed_block(&self.key, number).await?;
            }
            Ok::<_, ScanError>((work, outcome))
        }
        .await;

        match result {
            Ok((work, outcome)) => {
                // Count what the block contributed and time it
                report.deposits += work.deposits;
                report.confirmations += work.confirmations;
                BLOCKS_PROCESSED.with_label_values(&[self.key.as_str()]).inc();
                BLOCK_PROCESS_TIME
                    .with_label_values(&[self.key.as_str()])
                    .observe(started.elapsed().as_secs_f64());
                info!("Finished processing {} block number {}.", self.key, number);
                outcome
            }
            Err(e) => {
                let recorded = self.report_failure(number, &e).await;
                // A block already in the ledger stays eligible even if this write failed
                if !recorded && !was_failed && state.held_at.is_none() {
                    state.held_at = Some(number);
                }
                BlockOutcome::Failed(e.to_string())
            }
        }
    }

    async fn persist_block(&self, number: u64, tip: u64, min_confirmations: u64) -> ScanResult<BlockWork> {
        // An unknown or empty block has nothing to record
        let block = match self.fetcher.fetch_block(number).await? {
            Some(block) if !block.transactions.is_empty() => block,
            _ => return Ok(BlockWork::default()),
        };

        // Classify once; deposits and withdrawals both read the same result
        let classifier = TransactionClassifier::new(&self.fetcher, self.builder.as_ref());
        let classified = classifier.classify_block(block).await?;
        let confirmed = tip.saturating_sub(number) >= min_confirmations;

        // Deposits are accepted as soon as their block is deep enough
        let mut deposits = DepositExtractor::new(self.builder.as_ref(), self.stores.addresses.as_ref(), &self.currencies)
            .extract(&classified)
            .await?;
        if confirmed {
            for deposit in deposits.iter_mut() {
                deposit.status = DepositStatus::Accepted;
            }
        }
        // Withdrawals we broadcast, matched by txid
        let withdrawals =
            WithdrawalMatcher::new(self.builder.as_ref(), self.stores.withdrawals.as_ref(), &self.currencies)
                .match_block(&classified)
                .await?;

        // Log the txids found in this block
        if !deposits.is_empty() {
            let txids: Vec<&str> = deposits.iter().map(|d| d.txid.as_str()).collect();
            info!("Deposit transactions in block {}: {}", number, txids.join(","));
        }
        if !withdrawals.is_empty() {
            let txids: Vec<&str> = withdrawals.iter().map(|w| w.record.txid.as_str()).collect();
            info!("Withdraw transactions in block {}: {}", number, txids.join(","));
        }

        // Upsert keyed by (txid, output index, currency), so re-scans are harmless
        self.stores.deposits.upsert_many(&deposits).await?;

        // One confirmation per recipient; the withdrawal succeeds once deep enough
        let mut confirmations = 0;
        for matched in &withdrawals {
            for entry in &matched.confirmations {
                self.stores.withdrawals.append_confirmation(&matched.record, entry).await?;
            }
            confirmations += matched.confirmations.len();
            if confirmed {
                self.stores.withdrawals.mark_succeed(&matched.record, number).await?;
            }
        }

        // Update Prometheus metrics
        DEPOSITS_FOUND.with_label_values(&[self.key.as_str()]).inc_by(deposits.len() as u64);
        WITHDRAWALS_CONFIRMED.with_label_values(&[self.key.as_str()]).inc_by(confirmations as u64);
        Ok(BlockWork { deposits: deposits.len(), confirmations })
    }

    // Mark the block as processed only once it is deep enough. The stored
    // height never moves backwards, so retried older blocks leave it alone.
    async fn advance_cursor(&self, cursor: &mut ChainCursor, number: u64, tip: u64) -> ScanResult<BlockOutcome> {
        if tip.saturating_sub(number) < cursor.min_confirmations {
            return Ok(BlockOutcome::Skipped);
        }
        if number > cursor.height {
            self.stores.cursors.set_height(&self.key, number).await?;
            cursor.height = number;
            CURSOR_HEIGHT.with_label_values(&[self.key.as_str()]).set(number as i64);
        }
        Ok(BlockOutcome::Committed(number))
    }

    // Returns whether the block made it into the retry ledger
    async fn report_failure(&self, number: u64, e: &ScanError) -> bool {
        error!("Failed to process {} block number {}: {}", self.key, number, e);
        BLOCK_FAILURES.with_label_values(&[self.key.as_str()]).inc();
        match self
            .stores
            .cursors
            .record_failed_block(&self.key, number, &e.to_string())
            .await
        {
            Ok(()) => true,
            Err(record_err) => {
                error!(
                    "Could not record failed {} block {} for retry: {}",
                    self.key, number, record_err
                );
                false
            }
        }
    }

    /// Scans on a fixed interval until the process exits. Lagging chains are
    /// rescanned immediately.
    pub async fn run(self: Arc<Self>, blocks_limit: u64, interval: Duration) {
        info!("Starting scheduled synchronization of {}", self.key);
        loop {
            // A refused or failed start just waits for the next tick
            let lagging = match self.process_chain(blocks_limit, false).await {
                Ok(report) => report.is_lagging() && report.failures() == 0,
                Err(ScanError::ScanInProgress(_)) => false,
                Err(e) => {
                    error!("Synchronization of {} did not start: {}", self.key, e);
                    false
                }
            };
            if !lagging {
                tokio::time::sleep(interval).await;
            }
        }
    }
}
