//! # partbatch: partition-aware atomic batching for table and document stores
//!
//! Table-style and document-style stores both offer atomic multi-operation
//! batches, with two constraints: every operation in a batch must share one
//! partition key, and a batch holds at most 100 operations. partbatch lets a
//! caller record an arbitrary, unordered stream of entity operations and
//! submits them as the minimal set of batches that satisfy both constraints:
//!
//! - **Bucketing**: operations are grouped by partition key as they are recorded
//! - **Overflow**: a full bucket is sealed under a unique label and a new one opens
//! - **Table submission**: each bucket becomes one entity group transaction
//! - **Document submission**: each bucket becomes one partition-scoped batch
//! - **Per-bucket outcomes**: failures are returned per bucket, never thrown
//!
//! # Usage
//!
//! ```ignore
//! let mut store = BucketedTransactionStore::new(TableActionAdapter::new(|o: &Order| o.customer.clone()));
//! store.add_all(new_orders)?;
//! store.update_with_mode(changed, ActionMode::Replace)?;
//!
//! let outcomes = submit_table_transactions(&store, &client, &CancellationToken::new()).await;
//! for outcome in outcomes.iter().filter(|o| !o.is_success()) {
//!     eprintln!("{}", outcome.error().unwrap());
//! }
//! ```

pub mod adapter;
pub mod document;
pub mod memory;
pub mod operation;
pub mod store;
pub mod submit;
pub mod table;

pub use adapter::{ActionAdapter, AdapterBuilder, BackendAction, BoxedAdapter, FnAdapter};
pub use document::{
    build_document_batch, submit_document_batches, DocumentActionAdapter, DocumentBatch,
    DocumentBatchResponse, DocumentClient, DocumentOperation, DocumentOperationResult,
};
pub use memory::{InMemoryDocumentService, InMemoryTableService};
pub use operation::{ActionKind, ActionMode, OperationDescriptor};
pub use store::{
    Bucket, BucketedTransactionStore, StoreConfig, StoreError, StoreResult, MAX_BATCH_OPERATIONS,
};
pub use submit::{
    submit_groups, ClientError, ClientResult, GroupLabel, GroupOutcome, SubmissionSummary,
    SubmitError, SubmitResult,
};
pub use table::{
    submit_table_transactions, TableAction, TableActionAdapter, TableActionResponse,
    TableActionType, TableBatchResponse, TableClient,
};

pub use tokio_util::sync::CancellationToken;
