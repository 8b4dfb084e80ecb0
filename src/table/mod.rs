//! Table-style backend: entity group transactions.
//!
//! A table transaction carries up to 100 actions that all target the same
//! partition. Every recorded kind except `Get` has a table action; plain
//! `Update` and `Upsert` use the backend's default merge semantics.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::adapter::{ActionAdapter, BackendAction};
use crate::operation::ActionKind;
use crate::store::{BucketedTransactionStore, StoreError, StoreResult};
use crate::submit::{submit_groups, ClientResult, GroupLabel, GroupOutcome};

const BACKEND: &str = "table";

/// Wire-level action types of a table transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableActionType {
    Add,
    Delete,
    UpdateMerge,
    UpdateReplace,
    UpsertMerge,
    UpsertReplace,
}

impl TableActionType {
    pub fn from_kind(kind: ActionKind) -> StoreResult<Self> {
        match kind {
            ActionKind::Add => Ok(TableActionType::Add),
            ActionKind::Delete => Ok(TableActionType::Delete),
            ActionKind::Update | ActionKind::UpdateMerge => Ok(TableActionType::UpdateMerge),
            ActionKind::UpdateReplace => Ok(TableActionType::UpdateReplace),
            ActionKind::Upsert | ActionKind::UpsertMerge => Ok(TableActionType::UpsertMerge),
            ActionKind::UpsertReplace => Ok(TableActionType::UpsertReplace),
            ActionKind::Get => Err(StoreError::NotImplemented {
                kind,
                backend: BACKEND,
            }),
        }
    }
}

/// One action of a table transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableAction<T> {
    pub action_type: TableActionType,
    pub entity: T,
    kind: ActionKind,
}

impl<T> TableAction<T> {
    pub fn new(kind: ActionKind, entity: T) -> StoreResult<Self> {
        Ok(Self {
            action_type: TableActionType::from_kind(kind)?,
            entity,
            kind,
        })
    }
}

impl<T> BackendAction<T> for TableAction<T> {
    fn entity(&self) -> &T {
        &self.entity
    }

    fn kind(&self) -> ActionKind {
        self.kind
    }
}

/// Builds [`TableAction`]s, grouping by the supplied partition key function.
#[derive(Clone)]
pub struct TableActionAdapter<P> {
    partition_fn: P,
}

impl<P> TableActionAdapter<P> {
    pub fn new(partition_fn: P) -> Self {
        Self { partition_fn }
    }
}

impl<T, P> ActionAdapter<T> for TableActionAdapter<P>
where
    P: Fn(&T) -> String,
{
    type Action = TableAction<T>;

    fn partition_key(&self, entity: &T) -> String {
        (self.partition_fn)(entity)
    }

    fn build_action(&self, entity: T, kind: ActionKind) -> StoreResult<TableAction<T>> {
        TableAction::new(kind, entity)
    }
}

/// Per-action result of a committed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableActionResponse {
    pub status: u16,
    pub etag: Option<String>,
}

/// Response of a committed transaction, one entry per action in order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBatchResponse {
    pub responses: Vec<TableActionResponse>,
}

/// Client seam for a table-style backend.
///
/// `submit_transaction` is one atomic network call: on `Ok` every action
/// committed, on `Err` none did.
#[async_trait]
pub trait TableClient<T: Send + Sync + 'static>: Send + Sync {
    async fn submit_transaction(
        &self,
        actions: &[TableAction<T>],
        cancel: &CancellationToken,
    ) -> ClientResult<TableBatchResponse>;
}

/// Submits every group of `store` as one table transaction, in order.
pub async fn submit_table_transactions<T, D, C>(
    store: &BucketedTransactionStore<T, D>,
    client: &C,
    cancel: &CancellationToken,
) -> Vec<GroupOutcome<TableBatchResponse>>
where
    T: Send + Sync + 'static,
    D: ActionAdapter<T, Action = TableAction<T>>,
    C: TableClient<T> + ?Sized,
{
    let groups = store
        .groups()
        .map(|bucket| (GroupLabel::of(bucket), bucket.actions()))
        .collect();

    submit_groups(groups, cancel, |actions| {
        client.submit_transaction(actions, cancel)
    })
    .await
}
