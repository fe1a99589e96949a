mod common;

use common::*;
use ledgerbus::blockchain::{BlockFetcher, ClassifiedTxn, Ethereum, TransactionClassifier};
use ledgerbus::models::Block;
use ledgerbus::ScanError;

#[tokio::test]
async fn native_transfer_is_classified_without_a_receipt() {
    let node = MockNode::with_tip(10);
    let fetcher = BlockFetcher::without_retries(node.clone());
    let ethereum = Ethereum::new();
    let classifier = TransactionClassifier::new(&fetcher, &ethereum);

    let tx = native_tx("0x01", STRANGER, ALICE, ONE_ETH);
    let classified = classifier.classify(&tx).await.unwrap();

    assert_eq!(classified, Some(ClassifiedTxn::NativeTransfer(tx)));
    assert_eq!(node.receipt_fetches(), 0);
}

#[tokio::test]
async fn rejected_native_transfers_are_dropped() {
    let node = MockNode::with_tip(10);
    let fetcher = BlockFetcher::without_retries(node.clone());
    let ethereum = Ethereum::new();
    let classifier = TransactionClassifier::new(&fetcher, &ethereum);

    let zero_value = native_tx("0x01", STRANGER, ALICE, 0);
    let to_self = native_tx("0x02", ALICE, ALICE, ONE_ETH);
    let mut creation = native_tx("0x03", STRANGER, ALICE, ONE_ETH);
    creation.to = None;

    for tx in [zero_value, to_self, creation] {
        assert_eq!(classifier.classify(&tx).await.unwrap(), None, "{} should be dropped", tx.hash);
    }
    assert_eq!(node.receipt_fetches(), 0);
}

#[tokio::test]
async fn contract_call_carries_its_receipt() {
    let node = MockNode::with_tip(10);
    let receipt = transfer_receipt("0x0c", TOKEN, &[(ALICE, 42)]);
    node.add_receipt(receipt.clone());
    let fetcher = BlockFetcher::without_retries(node.clone());
    let ethereum = Ethereum::new();
    let classifier = TransactionClassifier::new(&fetcher, &ethereum);

    let tx = contract_call("0x0c", STRANGER, TOKEN);
    let classified = classifier.classify(&tx).await.unwrap();

    assert_eq!(classified, Some(ClassifiedTxn::ContractTransfer { tx, receipt }));
    assert_eq!(node.receipt_fetches(), 1);
}

#[tokio::test]
async fn missing_or_reverted_receipts_skip_the_transaction() {
    let node = MockNode::with_tip(10);
    let mut reverted = transfer_receipt("0x0d", TOKEN, &[(ALICE, 42)]);
    reverted.status = Some(0);
    node.add_receipt(reverted);
    let fetcher = BlockFetcher::without_retries(node.clone());
    let ethereum = Ethereum::new();
    let classifier = TransactionClassifier::new(&fetcher, &ethereum);

    let pending = contract_call("0x0e", STRANGER, TOKEN);
    assert_eq!(classifier.classify(&pending).await.unwrap(), None);

    let failed = contract_call("0x0d", STRANGER, TOKEN);
    assert_eq!(classifier.classify(&failed).await.unwrap(), None);
}

#[tokio::test]
async fn receipt_lookup_errors_are_not_filtering_decisions() {
    let node = MockNode::with_tip(10);
    node.fail_receipt("0x0f");
    let fetcher = BlockFetcher::without_retries(node.clone());
    let ethereum = Ethereum::new();
    let classifier = TransactionClassifier::new(&fetcher, &ethereum);

    let err = classifier.classify(&contract_call("0x0f", STRANGER, TOKEN)).await.unwrap_err();
    assert!(matches!(err, ScanError::Rpc(_)));
}

#[tokio::test]
async fn block_keeps_only_valid_transactions_in_order() {
    let node = MockNode::with_tip(10);
    node.add_receipt(transfer_receipt("0x02", TOKEN, &[(BOB, 1)]));
    let fetcher = BlockFetcher::without_retries(node.clone());
    let ethereum = Ethereum::new();
    let classifier = TransactionClassifier::new(&fetcher, &ethereum);

    let block = Block {
        number: 7,
        hash: Some("0xb7".to_string()),
        transactions: vec![
            native_tx("0x01", STRANGER, ALICE, ONE_ETH),
            contract_call("0x02", STRANGER, TOKEN),
            native_tx("0x03", STRANGER, BOB, 0),
            contract_call("0x04", STRANGER, TOKEN),
        ],
    };
    let classified = classifier.classify_block(block).await.unwrap();

    let hashes: Vec<&str> = classified.transactions.iter().map(|t| t.hash()).collect();
    assert_eq!(hashes, vec!["0x01", "0x02"]);
    assert_eq!(classified.block.number, 7);
    // Receipts are only requested for the two contract calls
    assert_eq!(node.receipt_fetches(), 2);
}
