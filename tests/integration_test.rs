//! Integration tests for partbatch
//! Drives the store and both submission adapters against the in-memory backends

use std::collections::HashSet;

use async_trait::async_trait;
use partbatch::{
    submit_document_batches, submit_table_transactions, ActionAdapter, ActionKind, ActionMode,
    AdapterBuilder, BackendAction, BucketedTransactionStore, CancellationToken, ClientError,
    ClientResult, DocumentActionAdapter, InMemoryDocumentService, InMemoryTableService,
    OperationDescriptor, StoreError, SubmissionSummary, TableAction, TableActionAdapter,
    TableActionType, TableBatchResponse, TableClient,
};

#[derive(Clone, Debug, PartialEq, Eq)]
struct Order {
    customer: String,
    id: String,
    total: u64,
}

fn order(customer: &str, id: impl ToString, total: u64) -> Order {
    Order {
        customer: customer.to_string(),
        id: id.to_string(),
        total,
    }
}

fn customer(o: &Order) -> String {
    o.customer.clone()
}

fn order_id(o: &Order) -> String {
    o.id.clone()
}

type PartitionFn = fn(&Order) -> String;

fn table_store() -> BucketedTransactionStore<Order, TableActionAdapter<PartitionFn>> {
    BucketedTransactionStore::new(TableActionAdapter::new(customer as PartitionFn))
}

fn document_store() -> BucketedTransactionStore<Order, DocumentActionAdapter<PartitionFn>> {
    BucketedTransactionStore::new(DocumentActionAdapter::new(customer as PartitionFn))
}

fn table_service() -> InMemoryTableService<Order> {
    InMemoryTableService::new(|o: &Order| (o.customer.clone(), o.id.clone()))
}

fn document_service() -> InMemoryDocumentService<Order> {
    InMemoryDocumentService::new(customer, order_id)
}

// ============================================================================
// Integration Tests
// ============================================================================

#[tokio::test]
async fn test_250_adds_round_trip() {
    let mut store = table_store();
    store
        .add_all((0..250).map(|i| order("P1", i, 10)))
        .unwrap();
    assert_eq!(store.len(), 3);

    let service = table_service();
    let outcomes = submit_table_transactions(&store, &service, &CancellationToken::new()).await;

    let sizes: Vec<usize> = outcomes
        .iter()
        .map(|o| o.value().unwrap().responses.len())
        .collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    assert_eq!(service.partition_len("P1"), 250);
    assert_eq!(service.call_count(), 3);
}

#[tokio::test]
async fn test_partial_failure_is_independent() {
    let mut store = table_store();
    store.add_all((0..5).map(|i| order("alice", i, 1))).unwrap();
    store.add_all((0..5).map(|i| order("bob", i, 1))).unwrap();

    let service = table_service();
    service.fail_partition("alice");

    let outcomes = submit_table_transactions(&store, &service, &CancellationToken::new()).await;

    assert_eq!(outcomes.len(), 2);
    assert!(!outcomes[0].is_success());
    assert_eq!(outcomes[0].partition_key, "alice");
    assert!(outcomes[1].is_success());

    assert_eq!(service.partition_len("alice"), 0);
    assert_eq!(service.partition_len("bob"), 5);

    let summary = SubmissionSummary::from_outcomes(&outcomes);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.actions_committed, 5);
}

#[tokio::test]
async fn test_backend_rejection_rolls_back_only_that_group() {
    let service = table_service();
    let cancel = CancellationToken::new();

    let mut seed = table_store();
    seed.add(order("alice", "a1", 1)).unwrap();
    submit_table_transactions(&seed, &service, &cancel).await;

    let mut store = table_store();
    store.add(order("alice", "a2", 1)).unwrap();
    store.add(order("alice", "a1", 1)).unwrap();
    store.upsert(order("bob", "b1", 1)).unwrap();

    let outcomes = submit_table_transactions(&store, &service, &cancel).await;

    let err = outcomes[0].error().unwrap();
    assert!(matches!(
        err.source,
        ClientError::Rejected {
            status: 409,
            failed_index: Some(1),
            ..
        }
    ));
    assert!(service.get("alice", "a2").is_none());
    assert!(service.get("bob", "b1").is_some());
}

#[tokio::test]
async fn test_document_unsupported_kind_makes_no_calls() {
    let mut store = document_store();
    store.add(order("alice", "a1", 1)).unwrap();
    store.upsert_with_mode(order("bob", "b1", 1), ActionMode::Merge).unwrap();

    let service = document_service();
    let result =
        submit_document_batches(&store, &service, order_id, &CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(StoreError::NotImplemented {
            kind: ActionKind::UpsertMerge,
            backend: "document"
        })
    ));
    assert_eq!(service.call_count(), 0);
    assert!(service.is_empty());
}

#[tokio::test]
async fn test_document_full_lifecycle() {
    let service = document_service();
    let cancel = CancellationToken::new();

    let mut create = document_store();
    create
        .add_all((0..120).map(|i| order("carol", i, 5)))
        .unwrap();
    let outcomes = submit_document_batches(&create, &service, order_id, &cancel)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_success()));
    assert_eq!(service.partition_len("carol"), 120);

    let mut change = document_store();
    change.update(order("carol", 0, 99)).unwrap();
    change.get(order("carol", 1, 0)).unwrap();
    change.delete(order("carol", 2, 0)).unwrap();
    change.upsert(order("dave", "d1", 1)).unwrap();

    let outcomes = submit_document_batches(&change, &service, order_id, &cancel)
        .await
        .unwrap();
    assert!(outcomes.iter().all(|o| o.is_success()));

    let carol = outcomes[0].value().unwrap();
    let statuses: Vec<u16> = carol.results.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![200, 200, 204]);
    assert_eq!(carol.results[1].resource.as_ref().unwrap().total, 5);

    assert_eq!(service.get("carol", "0").unwrap().total, 99);
    assert!(service.get("carol", "2").is_none());
    assert!(service.get("dave", "d1").is_some());
}

#[tokio::test]
async fn test_cancelled_before_submission() {
    let mut store = table_store();
    store.add_all((0..150).map(|i| order("erin", i, 1))).unwrap();

    let service = table_service();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcomes = submit_table_transactions(&store, &service, &cancel).await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_cancelled()));
    assert_eq!(service.call_count(), 0);
    assert!(service.is_empty());
}

/// Commits through the wrapped service, then cancels before the response
/// reaches the caller.
struct CancelAfterCommit {
    inner: InMemoryTableService<Order>,
}

#[async_trait]
impl TableClient<Order> for CancelAfterCommit {
    async fn submit_transaction(
        &self,
        actions: &[TableAction<Order>],
        cancel: &CancellationToken,
    ) -> ClientResult<TableBatchResponse> {
        let response = self.inner.submit_transaction(actions, cancel).await;
        cancel.cancel();
        tokio::task::yield_now().await;
        response
    }
}

#[tokio::test]
async fn test_cancel_after_commit_reports_group_committed() {
    let mut store = table_store();
    store.add(order("mia", "m1", 1)).unwrap();
    store.add(order("noah", "n1", 1)).unwrap();

    let client = CancelAfterCommit {
        inner: table_service(),
    };
    let cancel = CancellationToken::new();
    let outcomes = submit_table_transactions(&store, &client, &cancel).await;

    assert!(client.inner.get("mia", "m1").is_some());
    assert!(outcomes[0].is_success());
    assert!(!outcomes[0].is_cancelled());

    assert!(outcomes[1].is_cancelled());
    assert!(client.inner.get("noah", "n1").is_none());
    assert_eq!(client.inner.call_count(), 1);

    let summary = SubmissionSummary::from_outcomes(&outcomes);
    assert_eq!(summary.actions_committed, 1);
    assert_eq!(summary.actions_not_committed, 1);
}

#[test]
fn test_mode_overload_matches_direct_call() {
    let mut with_mode = table_store();
    with_mode
        .update_with_mode(order("frank", "f1", 1), ActionMode::Merge)
        .unwrap();

    let mut direct = table_store();
    direct.update_merge(order("frank", "f1", 1)).unwrap();

    let a: Vec<_> = with_mode.actions().cloned().collect();
    let b: Vec<_> = direct.actions().cloned().collect();
    assert_eq!(a, b);
    assert_eq!(a[0].action_type, TableActionType::UpdateMerge);
}

#[test]
fn test_interleaved_overflow_keeps_keys_unique_and_groups_homogeneous() {
    let mut store = table_store();
    let customers = ["gina", "hank", "ivan", "judy"];
    for i in 0..1_000u32 {
        let who = customers[(i as usize * 7 + i as usize / 3) % customers.len()];
        store.upsert(order(who, i, 1)).unwrap();
    }

    let mut keys = HashSet::new();
    for group in store.groups() {
        assert!(keys.insert(group.key().to_string()), "duplicate key {}", group.key());
        assert!(group.len() <= 100);
        for action in group.actions() {
            assert_eq!(
                store.adapter().partition_key(action.entity()),
                group.partition_key()
            );
            assert_eq!(action.kind(), ActionKind::Upsert);
        }
    }
    assert_eq!(store.action_count(), 1_000);
}

#[test]
fn test_overflow_keys_not_reused_after_clear() {
    let mut store = table_store();
    let mut sealed = Vec::new();

    for _ in 0..3 {
        store.add_all((0..101).map(|i| order("kim", i, 1))).unwrap();
        let keys: Vec<String> = store.groups().map(|g| g.key().to_string()).collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1], "kim");
        sealed.push(keys[0].clone());
        store.clear();
    }

    assert_eq!(sealed, vec!["kim_101", "kim_202", "kim_303"]);
    assert_eq!(store.total_recorded(), 303);
}

#[tokio::test]
async fn test_closure_adapter_drives_document_submission() {
    let adapter = AdapterBuilder::new()
        .partition_key(|o: &Order| format!("region-{}", o.customer))
        .action_builder(|o: Order, kind: ActionKind| Ok(OperationDescriptor::new(kind, o)))
        .build()
        .unwrap();
    let mut store = BucketedTransactionStore::new(adapter);
    store.add(order("lee", "l1", 3)).unwrap();

    let service =
        InMemoryDocumentService::new(|o: &Order| format!("region-{}", o.customer), order_id);
    let outcomes = submit_document_batches(&store, &service, order_id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcomes[0].is_success());
    assert_eq!(outcomes[0].partition_key, "region-lee");
    assert!(service.get("region-lee", "l1").is_some());
}

#[test]
fn test_adapter_builder_missing_function() {
    let result = AdapterBuilder::<Order, OperationDescriptor<Order>>::new()
        .partition_key(customer)
        .build();
    assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
}
