use std::collections::HashMap;
use std::marker::PhantomData;

use tracing::{debug, trace};

use super::{Bucket, StoreConfig, StoreResult};
use crate::adapter::ActionAdapter;
use crate::operation::{ActionKind, ActionMode};

/// Groups entity operations into partition-homogeneous, capacity-bounded buckets.
///
/// The store is single-owner: mutation takes `&mut self` and there is no
/// internal locking. Share it across threads only behind the caller's own lock.
pub struct BucketedTransactionStore<T, D: ActionAdapter<T>> {
    adapter: D,
    config: StoreConfig,

    /// Buckets in creation order.
    buckets: Vec<Bucket<D::Action>>,

    /// Partition key -> index of the bucket still accepting actions.
    live: HashMap<String, usize>,

    /// Bucket label -> index. Covers live and sealed buckets.
    labels: HashMap<String, usize>,

    /// Operations recorded over the store's lifetime. Never reset, so
    /// overflow labels are never reused, not even across `clear()`.
    total_recorded: u64,

    _entity: PhantomData<fn(T)>,
}

impl<T, D: ActionAdapter<T>> BucketedTransactionStore<T, D> {
    /// Creates a store with the default capacity of 100 actions per bucket.
    pub fn new(adapter: D) -> Self {
        Self {
            adapter,
            config: StoreConfig::default(),
            buckets: Vec::new(),
            live: HashMap::new(),
            labels: HashMap::new(),
            total_recorded: 0,
            _entity: PhantomData,
        }
    }

    pub fn with_config(adapter: D, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let mut store = Self::new(adapter);
        store.config = config;
        Ok(store)
    }

    pub fn adapter(&self) -> &D {
        &self.adapter
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Records one operation, opening or sealing buckets as needed.
    ///
    /// The backend action is built before any bucket is touched, so an
    /// unsupported kind leaves the grouping unchanged.
    pub fn record(&mut self, entity: T, kind: ActionKind) -> StoreResult<()> {
        self.total_recorded += 1;

        let partition_key = self.adapter.partition_key(&entity);
        let action = self.adapter.build_action(entity, kind)?;

        if let Some(&idx) = self.live.get(&partition_key) {
            if self.buckets[idx].len() < self.config.max_actions_per_group {
                self.buckets[idx].push(action);
                trace!("Recorded {} into bucket {}", kind, self.buckets[idx].key());
                return Ok(());
            }

            self.seal(idx);
        }

        self.open(partition_key, action);
        Ok(())
    }

    /// Relabels the full bucket at `idx` and drops it from the live set.
    fn seal(&mut self, idx: usize) {
        let partition_key = self.buckets[idx].partition_key().to_string();
        self.labels.remove(&partition_key);
        self.live.remove(&partition_key);

        let label = self.fresh_label(format!("{}_{}", partition_key, self.total_recorded));
        self.labels.insert(label.clone(), idx);

        debug!(
            "Sealed bucket for partition {} as {} with {} actions",
            partition_key,
            label,
            self.buckets[idx].len()
        );
        self.buckets[idx].seal(label);
    }

    fn open(&mut self, partition_key: String, action: D::Action) {
        // A sealed bucket of another partition may already carry this label.
        if let Some(holder) = self.labels.remove(&partition_key) {
            let label = self.fresh_label(format!("{}_{}", partition_key, self.total_recorded));
            debug!(
                "Relabelling sealed bucket {} to {} to free the label",
                partition_key, label
            );
            self.labels.insert(label.clone(), holder);
            self.buckets[holder].relabel(label);
        }

        let idx = self.buckets.len();
        let mut bucket = Bucket::new(partition_key.clone(), self.config.max_actions_per_group);
        bucket.push(action);
        self.buckets.push(bucket);

        self.labels.insert(partition_key.clone(), idx);
        debug!("Opened bucket for partition {}", partition_key);
        self.live.insert(partition_key, idx);
    }

    fn fresh_label(&self, mut label: String) -> String {
        while self.labels.contains_key(&label) {
            label = format!("{}_{}", label, self.total_recorded);
        }
        label
    }

    pub fn add(&mut self, entity: T) -> StoreResult<()> {
        self.record(entity, ActionKind::Add)
    }

    pub fn add_all<I: IntoIterator<Item = T>>(&mut self, entities: I) -> StoreResult<()> {
        self.record_all(entities, ActionKind::Add)
    }

    /// Records a read of the entity inside the batch.
    pub fn get(&mut self, entity: T) -> StoreResult<()> {
        self.record(entity, ActionKind::Get)
    }

    pub fn get_all<I: IntoIterator<Item = T>>(&mut self, entities: I) -> StoreResult<()> {
        self.record_all(entities, ActionKind::Get)
    }

    pub fn update(&mut self, entity: T) -> StoreResult<()> {
        self.record(entity, ActionKind::Update)
    }

    pub fn update_all<I: IntoIterator<Item = T>>(&mut self, entities: I) -> StoreResult<()> {
        self.record_all(entities, ActionKind::Update)
    }

    pub fn update_with_mode(&mut self, entity: T, mode: ActionMode) -> StoreResult<()> {
        self.record(entity, ActionKind::update(mode))
    }

    pub fn update_all_with_mode<I: IntoIterator<Item = T>>(
        &mut self,
        entities: I,
        mode: ActionMode,
    ) -> StoreResult<()> {
        self.record_all(entities, ActionKind::update(mode))
    }

    pub fn update_merge(&mut self, entity: T) -> StoreResult<()> {
        self.record(entity, ActionKind::UpdateMerge)
    }

    pub fn update_replace(&mut self, entity: T) -> StoreResult<()> {
        self.record(entity, ActionKind::UpdateReplace)
    }

    pub fn upsert(&mut self, entity: T) -> StoreResult<()> {
        self.record(entity, ActionKind::Upsert)
    }

    pub fn upsert_all<I: IntoIterator<Item = T>>(&mut self, entities: I) -> StoreResult<()> {
        self.record_all(entities, ActionKind::Upsert)
    }

    pub fn upsert_with_mode(&mut self, entity: T, mode: ActionMode) -> StoreResult<()> {
        self.record(entity, ActionKind::upsert(mode))
    }

    pub fn upsert_all_with_mode<I: IntoIterator<Item = T>>(
        &mut self,
        entities: I,
        mode: ActionMode,
    ) -> StoreResult<()> {
        self.record_all(entities, ActionKind::upsert(mode))
    }

    pub fn upsert_merge(&mut self, entity: T) -> StoreResult<()> {
        self.record(entity, ActionKind::UpsertMerge)
    }

    pub fn upsert_replace(&mut self, entity: T) -> StoreResult<()> {
        self.record(entity, ActionKind::UpsertReplace)
    }

    pub fn delete(&mut self, entity: T) -> StoreResult<()> {
        self.record(entity, ActionKind::Delete)
    }

    pub fn delete_all<I: IntoIterator<Item = T>>(&mut self, entities: I) -> StoreResult<()> {
        self.record_all(entities, ActionKind::Delete)
    }

    /// Records every entity with the same kind, stopping at the first failure.
    /// Entities recorded before the failure stay recorded.
    pub fn record_all<I: IntoIterator<Item = T>>(
        &mut self,
        entities: I,
        kind: ActionKind,
    ) -> StoreResult<()> {
        for entity in entities {
            self.record(entity, kind)?;
        }
        Ok(())
    }

    /// Discards every bucket. The lifetime counter is kept.
    pub fn clear(&mut self) {
        debug!("Clearing {} buckets", self.buckets.len());
        self.buckets.clear();
        self.live.clear();
        self.labels.clear();
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of actions currently held across all buckets.
    pub fn action_count(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    /// Operations recorded over the store's lifetime, including cleared ones.
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    /// All actions, flattened in bucket order.
    pub fn actions(&self) -> impl Iterator<Item = &D::Action> {
        self.buckets.iter().flat_map(|bucket| bucket.actions().iter())
    }

    /// All buckets in creation order, each destined for one atomic batch.
    pub fn groups(&self) -> std::slice::Iter<'_, Bucket<D::Action>> {
        self.buckets.iter()
    }

    pub fn get_group(&self, key: &str) -> Option<&Bucket<D::Action>> {
        self.labels.get(key).map(|&idx| &self.buckets[idx])
    }

    pub fn into_groups(self) -> Vec<Bucket<D::Action>> {
        self.buckets
    }
}

impl<'a, T, D: ActionAdapter<T>> IntoIterator for &'a BucketedTransactionStore<T, D> {
    type Item = &'a Bucket<D::Action>;
    type IntoIter = std::slice::Iter<'a, Bucket<D::Action>>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups()
    }
}
