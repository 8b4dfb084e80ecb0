use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{rejected, Faults};
use crate::document::{
    DocumentBatch, DocumentBatchResponse, DocumentClient, DocumentOperation,
    DocumentOperationResult,
};
use crate::submit::ClientResult;

type ItemKey = (String, String);
type KeyFn<T> = Box<dyn Fn(&T) -> String + Send + Sync>;

/// A document container held in memory, keyed by `(partition key, id)`.
pub struct InMemoryDocumentService<T> {
    items: RwLock<HashMap<ItemKey, T>>,
    partition_fn: KeyFn<T>,
    id_fn: KeyFn<T>,
    faults: Faults,
}

impl<T: Clone> InMemoryDocumentService<T> {
    pub fn new<P, I>(partition_fn: P, id_fn: I) -> Self
    where
        P: Fn(&T) -> String + Send + Sync + 'static,
        I: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self {
            items: RwLock::new(HashMap::new()),
            partition_fn: Box::new(partition_fn),
            id_fn: Box::new(id_fn),
            faults: Faults::default(),
        }
    }

    pub fn get(&self, partition_key: &str, id: &str) -> Option<T> {
        self.items
            .read()
            .get(&(partition_key.to_string(), id.to_string()))
            .cloned()
    }

    /// Stores an item directly, outside any batch.
    pub fn insert(&self, item: T) {
        let key = ((self.partition_fn)(&item), (self.id_fn)(&item));
        self.items.write().insert(key, item);
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn partition_len(&self, partition_key: &str) -> usize {
        self.items
            .read()
            .keys()
            .filter(|(pk, _)| pk == partition_key)
            .count()
    }

    /// Makes every later batch for `partition_key` fail.
    pub fn fail_partition(&self, partition_key: &str) {
        self.faults.fail_partition(partition_key);
    }

    pub fn heal_partition(&self, partition_key: &str) {
        self.faults.heal_partition(partition_key);
    }

    /// Number of batch calls received, including rejected ones.
    pub fn call_count(&self) -> usize {
        self.faults.call_count()
    }

    /// Checks that an item written by the batch belongs to the batch's partition.
    fn item_key(&self, batch_pk: &str, index: usize, item: &T) -> ClientResult<ItemKey> {
        let pk = (self.partition_fn)(item);
        if pk != batch_pk {
            return Err(rejected(
                400,
                Some(index),
                format!("item partition {} differs from batch partition {}", pk, batch_pk),
            ));
        }
        Ok((pk, (self.id_fn)(item)))
    }

    fn apply(
        &self,
        batch: DocumentBatch<T>,
        cancel: &CancellationToken,
    ) -> ClientResult<DocumentBatchResponse<T>> {
        let batch_pk = batch.partition_key().to_string();
        self.faults
            .admit(&batch_pk, batch.len(), cancel.is_cancelled())?;

        let mut items = self.items.write();
        let mut staged: HashMap<ItemKey, Option<T>> = HashMap::new();
        let mut results = Vec::with_capacity(batch.len());

        for (index, op) in batch.operations().iter().enumerate() {
            let key = match op {
                DocumentOperation::Create { item } | DocumentOperation::Upsert { item } => {
                    self.item_key(&batch_pk, index, item)?
                }
                DocumentOperation::Replace { id, item } => {
                    let key = self.item_key(&batch_pk, index, item)?;
                    if key.1 != *id {
                        return Err(rejected(
                            400,
                            Some(index),
                            format!("replace id {} does not match item id {}", id, key.1),
                        ));
                    }
                    key
                }
                DocumentOperation::Read { id } | DocumentOperation::Delete { id } => {
                    (batch_pk.clone(), id.clone())
                }
            };

            let current = match staged.get(&key) {
                Some(item) => item.clone(),
                None => items.get(&key).cloned(),
            };

            let (next, status, resource) = match (op, current) {
                (DocumentOperation::Create { .. }, Some(_)) => {
                    let message = format!("item {} already exists", key.1);
                    return Err(rejected(409, Some(index), message));
                }
                (DocumentOperation::Create { item }, None) => {
                    (Some(item.clone()), 201, Some(item.clone()))
                }
                (
                    DocumentOperation::Read { .. }
                    | DocumentOperation::Replace { .. }
                    | DocumentOperation::Delete { .. },
                    None,
                ) => {
                    let message = format!("item {} not found", key.1);
                    return Err(rejected(404, Some(index), message));
                }
                (DocumentOperation::Read { .. }, Some(existing)) => {
                    (Some(existing.clone()), 200, Some(existing))
                }
                (DocumentOperation::Replace { item, .. }, Some(_)) => {
                    (Some(item.clone()), 200, Some(item.clone()))
                }
                (DocumentOperation::Upsert { item }, existing) => {
                    let status = if existing.is_some() { 200 } else { 201 };
                    (Some(item.clone()), status, Some(item.clone()))
                }
                (DocumentOperation::Delete { .. }, Some(_)) => (None, 204, None),
            };

            staged.insert(key, next);
            results.push(DocumentOperationResult { status, resource });
        }

        for (key, item) in staged {
            match item {
                Some(item) => items.insert(key, item),
                None => items.remove(&key),
            };
        }

        debug!(
            "Committed document batch of {} operations on partition {}",
            results.len(),
            batch_pk
        );
        Ok(DocumentBatchResponse { results })
    }
}

#[async_trait]
impl<T> DocumentClient<T> for InMemoryDocumentService<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn execute_batch(
        &self,
        batch: DocumentBatch<T>,
        cancel: &CancellationToken,
    ) -> ClientResult<DocumentBatchResponse<T>> {
        self.apply(batch, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::ClientError;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Order {
        customer: String,
        id: String,
        total: u64,
    }

    fn order(customer: &str, id: &str, total: u64) -> Order {
        Order {
            customer: customer.to_string(),
            id: id.to_string(),
            total,
        }
    }

    fn service() -> InMemoryDocumentService<Order> {
        InMemoryDocumentService::new(|o: &Order| o.customer.clone(), |o: &Order| o.id.clone())
    }

    #[tokio::test]
    async fn test_batch_primitives() {
        let svc = service();
        svc.insert(order("c1", "old", 5));
        let cancel = CancellationToken::new();

        let batch = DocumentBatch::new("c1")
            .create_item(order("c1", "o1", 10))
            .read_item("old")
            .replace_item("o1", order("c1", "o1", 12))
            .upsert_item(order("c1", "o2", 7))
            .delete_item("old");
        let resp = svc.execute_batch(batch, &cancel).await.unwrap();

        let statuses: Vec<u16> = resp.results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![201, 200, 200, 201, 204]);
        assert_eq!(resp.results[1].resource, Some(order("c1", "old", 5)));
        assert_eq!(svc.get("c1", "o1").unwrap().total, 12);
        assert!(svc.get("c1", "old").is_none());
        assert_eq!(svc.partition_len("c1"), 2);
    }

    #[tokio::test]
    async fn test_failed_operation_rolls_back_batch() {
        let svc = service();
        let batch = DocumentBatch::new("c1")
            .create_item(order("c1", "o1", 10))
            .delete_item("missing");

        let err = svc
            .execute_batch(batch, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClientError::Rejected {
                status: 404,
                failed_index: Some(1),
                ..
            }
        ));
        assert!(svc.is_empty());
    }

    #[tokio::test]
    async fn test_item_outside_batch_partition_rejected() {
        let svc = service();
        let batch = DocumentBatch::new("c1").upsert_item(order("c2", "o1", 1));
        let err = svc
            .execute_batch(batch, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected() {
        let svc = service();
        let mut batch = DocumentBatch::new("c1");
        for i in 0..101 {
            batch = batch.upsert_item(order("c1", &i.to_string(), 1));
        }
        let err = svc
            .execute_batch(batch, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 400, .. }));
        assert_eq!(svc.call_count(), 1);
    }
}
