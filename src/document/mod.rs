//! Document-style backend: transactional batches scoped to one partition key.
//!
//! The store keeps plain [`OperationDescriptor`]s for this backend. Each group
//! is turned into a [`DocumentBatch`] at submission time:
//!
//! | Recorded kind | Batch primitive |
//! |---|---|
//! | `Add` | create-item |
//! | `Get` | read-item(id) |
//! | `Update` | replace-item(id, item) |
//! | `Upsert` | upsert-item |
//! | `Delete` | delete-item(id) |
//!
//! Merge/replace variants of update and upsert have no batch primitive in this
//! backend, so building a batch that contains one fails with
//! [`StoreError::NotImplemented`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adapter::ActionAdapter;
use crate::operation::{ActionKind, OperationDescriptor};
use crate::store::{Bucket, BucketedTransactionStore, StoreError, StoreResult};
use crate::submit::{submit_groups, ClientResult, GroupLabel, GroupOutcome};

const BACKEND: &str = "document";

/// One primitive of a transactional batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentOperation<T> {
    Create { item: T },
    Read { id: String },
    Replace { id: String, item: T },
    Upsert { item: T },
    Delete { id: String },
}

impl<T> DocumentOperation<T> {
    pub fn name(&self) -> &'static str {
        match self {
            DocumentOperation::Create { .. } => "create",
            DocumentOperation::Read { .. } => "read",
            DocumentOperation::Replace { .. } => "replace",
            DocumentOperation::Upsert { .. } => "upsert",
            DocumentOperation::Delete { .. } => "delete",
        }
    }
}

/// An atomic batch of operations against a single partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentBatch<T> {
    partition_key: String,
    operations: Vec<DocumentOperation<T>>,
}

impl<T> DocumentBatch<T> {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            operations: Vec::new(),
        }
    }

    pub fn create_item(mut self, item: T) -> Self {
        self.operations.push(DocumentOperation::Create { item });
        self
    }

    pub fn read_item(mut self, id: impl Into<String>) -> Self {
        self.operations.push(DocumentOperation::Read { id: id.into() });
        self
    }

    pub fn replace_item(mut self, id: impl Into<String>, item: T) -> Self {
        self.operations.push(DocumentOperation::Replace {
            id: id.into(),
            item,
        });
        self
    }

    pub fn upsert_item(mut self, item: T) -> Self {
        self.operations.push(DocumentOperation::Upsert { item });
        self
    }

    pub fn delete_item(mut self, id: impl Into<String>) -> Self {
        self.operations.push(DocumentOperation::Delete { id: id.into() });
        self
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn operations(&self) -> &[DocumentOperation<T>] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Keeps recorded operations as descriptors; the batch is built at submission.
#[derive(Clone)]
pub struct DocumentActionAdapter<P> {
    partition_fn: P,
}

impl<P> DocumentActionAdapter<P> {
    pub fn new(partition_fn: P) -> Self {
        Self { partition_fn }
    }
}

impl<T, P> ActionAdapter<T> for DocumentActionAdapter<P>
where
    P: Fn(&T) -> String,
{
    type Action = OperationDescriptor<T>;

    fn partition_key(&self, entity: &T) -> String {
        (self.partition_fn)(entity)
    }

    fn build_action(&self, entity: T, kind: ActionKind) -> StoreResult<OperationDescriptor<T>> {
        Ok(OperationDescriptor::new(kind, entity))
    }
}

/// Builds the transactional batch for one group.
///
/// The batch's partition key is derived from the group's first entity.
pub fn build_document_batch<T, D, I>(
    bucket: &Bucket<OperationDescriptor<T>>,
    adapter: &D,
    entity_id: I,
) -> StoreResult<DocumentBatch<T>>
where
    T: Clone,
    D: ActionAdapter<T>,
    I: Fn(&T) -> String,
{
    let first = bucket.actions().first().ok_or_else(|| {
        StoreError::InvalidArgument(format!("group {} has no actions", bucket.key()))
    })?;

    let mut batch = DocumentBatch::new(adapter.partition_key(first.entity()));
    for action in bucket.actions() {
        let entity = action.entity();
        batch = match action.kind() {
            ActionKind::Add => batch.create_item(entity.clone()),
            ActionKind::Get => batch.read_item(entity_id(entity)),
            ActionKind::Update => batch.replace_item(entity_id(entity), entity.clone()),
            ActionKind::Upsert => batch.upsert_item(entity.clone()),
            ActionKind::Delete => batch.delete_item(entity_id(entity)),
            kind @ (ActionKind::UpdateMerge
            | ActionKind::UpdateReplace
            | ActionKind::UpsertMerge
            | ActionKind::UpsertReplace) => {
                return Err(StoreError::NotImplemented {
                    kind,
                    backend: BACKEND,
                })
            }
        };
    }

    debug!(
        "Built document batch for group {} with {} operations",
        bucket.key(),
        batch.len()
    );
    Ok(batch)
}

/// Result of one operation within a committed batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentOperationResult<T> {
    pub status: u16,
    /// The stored item after the operation, or the item read.
    pub resource: Option<T>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentBatchResponse<T> {
    pub results: Vec<DocumentOperationResult<T>>,
}

/// Client seam for a document-style backend.
///
/// `execute_batch` is one atomic network call: on `Ok` every operation
/// committed, on `Err` none did.
#[async_trait]
pub trait DocumentClient<T: Send + Sync + 'static>: Send + Sync {
    async fn execute_batch(
        &self,
        batch: DocumentBatch<T>,
        cancel: &CancellationToken,
    ) -> ClientResult<DocumentBatchResponse<T>>;
}

/// Submits every group of `store` as one transactional batch, in order.
///
/// All batches are built before the first network call. A group containing
/// a kind this backend cannot express fails the whole submission with
/// [`StoreError::NotImplemented`] and nothing is sent.
pub async fn submit_document_batches<T, D, C, I>(
    store: &BucketedTransactionStore<T, D>,
    client: &C,
    entity_id: I,
    cancel: &CancellationToken,
) -> StoreResult<Vec<GroupOutcome<DocumentBatchResponse<T>>>>
where
    T: Clone + Send + Sync + 'static,
    D: ActionAdapter<T, Action = OperationDescriptor<T>>,
    C: DocumentClient<T> + ?Sized,
    I: Fn(&T) -> String,
{
    let batches = store
        .groups()
        .map(|bucket| -> StoreResult<_> {
            let batch = build_document_batch(bucket, store.adapter(), &entity_id)?;
            Ok((GroupLabel::of(bucket), batch))
        })
        .collect::<StoreResult<Vec<_>>>()?;

    Ok(submit_groups(batches, cancel, |batch| client.execute_batch(batch, cancel)).await)
}
