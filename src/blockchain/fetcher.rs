use backoff::{future::retry_notify, ExponentialBackoff};
use log::{info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::client::NodeClient;
use crate::error::{ScanError, ScanResult};
use crate::models::{Block, Receipt};

// Wraps a node client with bounded exponential retries on transient RPC errors
pub struct BlockFetcher {
    client: Arc<dyn NodeClient>,
    retry_for: Duration,
}

impl BlockFetcher {
    pub fn new(client: Arc<dyn NodeClient>, retry_for: Duration) -> Self {
        BlockFetcher { client, retry_for }
    }

    // Single attempt per call; the caller's next scan is the retry.
    pub fn without_retries(client: Arc<dyn NodeClient>) -> Self {
        BlockFetcher::new(client, Duration::ZERO)
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(self.retry_for),
            ..Default::default()
        }
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> ScanResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ScanResult<T>>,
    {
        retry_notify(
            self.backoff(),
            || {
                let fut = op();
                async move {
                    fut.await.map_err(|e| match e {
                        ScanError::Rpc(_) => backoff::Error::transient(e),
                        other => backoff::Error::permanent(other),
                    })
                }
            },
            |e: ScanError, wait: Duration| {
                warn!("{} failed: {}. Retrying in {:.1}s", what, e, wait.as_secs_f64());
            },
        )
        .await
    }

    pub async fn latest_block_number(&self) -> ScanResult<u64> {
        self.with_retry("eth_blockNumber", || self.client.latest_block_number()).await
    }

    pub async fn fetch_block(&self, number: u64) -> ScanResult<Option<Block>> {
        let block = self
            .with_retry("get_block", || self.client.get_block(number))
            .await?;
        if let Some(block) = &block {
            info!("Fetched block {} with {} transactions", number, block.transactions.len());
        }
        Ok(block)
    }

    pub async fn get_transaction_receipt(&self, hash: &str) -> ScanResult<Option<Receipt>> {
        self.with_retry("get_transaction_receipt", || self.client.get_transaction_receipt(hash))
            .await
    }
}
