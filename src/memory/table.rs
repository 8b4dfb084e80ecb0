use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{rejected, Faults};
use crate::submit::ClientResult;
use crate::table::{
    TableAction, TableActionResponse, TableActionType, TableBatchResponse, TableClient,
};

type RowKey = (String, String);
type KeyFn<T> = Box<dyn Fn(&T) -> RowKey + Send + Sync>;
type MergeFn<T> = Box<dyn Fn(&T, &T) -> T + Send + Sync>;

#[derive(Clone, Debug)]
struct StoredRow<T> {
    entity: T,
    version: u64,
}

/// A table service held in memory, keyed by `(partition key, row key)`.
pub struct InMemoryTableService<T> {
    rows: RwLock<HashMap<RowKey, StoredRow<T>>>,
    key_fn: KeyFn<T>,
    merge_fn: Option<MergeFn<T>>,
    faults: Faults,
}

impl<T: Clone> InMemoryTableService<T> {
    /// `key_fn` returns the `(partition key, row key)` of an entity.
    pub fn new<F>(key_fn: F) -> Self
    where
        F: Fn(&T) -> RowKey + Send + Sync + 'static,
    {
        Self {
            rows: RwLock::new(HashMap::new()),
            key_fn: Box::new(key_fn),
            merge_fn: None,
            faults: Faults::default(),
        }
    }

    /// Sets how merge actions combine the stored entity with the incoming one.
    /// Without it, merges replace.
    pub fn with_merge<F>(mut self, merge_fn: F) -> Self
    where
        F: Fn(&T, &T) -> T + Send + Sync + 'static,
    {
        self.merge_fn = Some(Box::new(merge_fn));
        self
    }

    pub fn get(&self, partition_key: &str, row_key: &str) -> Option<T> {
        self.rows
            .read()
            .get(&(partition_key.to_string(), row_key.to_string()))
            .map(|row| row.entity.clone())
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Rows stored under one partition.
    pub fn partition_len(&self, partition_key: &str) -> usize {
        self.rows
            .read()
            .keys()
            .filter(|(pk, _)| pk == partition_key)
            .count()
    }

    /// Makes every later transaction for `partition_key` fail.
    pub fn fail_partition(&self, partition_key: &str) {
        self.faults.fail_partition(partition_key);
    }

    pub fn heal_partition(&self, partition_key: &str) {
        self.faults.heal_partition(partition_key);
    }

    /// Number of transaction calls received, including rejected ones.
    pub fn call_count(&self) -> usize {
        self.faults.call_count()
    }

    fn merge(&self, stored: &T, incoming: &T) -> T {
        match &self.merge_fn {
            Some(merge) => merge(stored, incoming),
            None => incoming.clone(),
        }
    }

    fn apply(
        &self,
        actions: &[TableAction<T>],
        cancel: &CancellationToken,
    ) -> ClientResult<TableBatchResponse> {
        let partition_key = actions
            .first()
            .map(|action| (self.key_fn)(&action.entity).0)
            .unwrap_or_default();
        self.faults
            .admit(&partition_key, actions.len(), cancel.is_cancelled())?;

        let mut rows = self.rows.write();
        let mut staged: HashMap<RowKey, Option<StoredRow<T>>> = HashMap::new();
        let mut responses = Vec::with_capacity(actions.len());

        for (index, action) in actions.iter().enumerate() {
            let key = (self.key_fn)(&action.entity);
            if key.0 != partition_key {
                return Err(rejected(
                    400,
                    Some(index),
                    format!(
                        "partition {} differs from transaction partition {}",
                        key.0, partition_key
                    ),
                ));
            }

            let current = match staged.get(&key) {
                Some(row) => row.clone(),
                None => rows.get(&key).cloned(),
            };
            let next_version = current.as_ref().map_or(1, |row| row.version + 1);

            let (next, status) = match (action.action_type, current) {
                (TableActionType::Add, Some(_)) => {
                    let message = format!("entity {:?} already exists", key);
                    return Err(rejected(409, Some(index), message));
                }
                (TableActionType::Add, None) => (Some(action.entity.clone()), 204),
                (
                    TableActionType::UpdateMerge
                    | TableActionType::UpdateReplace
                    | TableActionType::Delete,
                    None,
                ) => {
                    let message = format!("entity {:?} not found", key);
                    return Err(rejected(404, Some(index), message));
                }
                (TableActionType::UpdateMerge | TableActionType::UpsertMerge, Some(row)) => {
                    (Some(self.merge(&row.entity, &action.entity)), 204)
                }
                (TableActionType::UpdateReplace | TableActionType::UpsertReplace, Some(_)) => {
                    (Some(action.entity.clone()), 204)
                }
                (TableActionType::UpsertMerge | TableActionType::UpsertReplace, None) => {
                    (Some(action.entity.clone()), 204)
                }
                (TableActionType::Delete, Some(_)) => (None, 204),
            };

            let etag = next.as_ref().map(|_| format!("W/\"{}\"", next_version));
            staged.insert(
                key,
                next.map(|entity| StoredRow {
                    entity,
                    version: next_version,
                }),
            );
            responses.push(TableActionResponse { status, etag });
        }

        for (key, row) in staged {
            match row {
                Some(row) => rows.insert(key, row),
                None => rows.remove(&key),
            };
        }

        debug!(
            "Committed table transaction of {} actions on partition {}",
            responses.len(),
            partition_key
        );
        Ok(TableBatchResponse { responses })
    }
}

#[async_trait]
impl<T> TableClient<T> for InMemoryTableService<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn submit_transaction(
        &self,
        actions: &[TableAction<T>],
        cancel: &CancellationToken,
    ) -> ClientResult<TableBatchResponse> {
        self.apply(actions, cancel)
    }
}
