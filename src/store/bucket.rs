/// A capacity-bounded, partition-homogeneous group of backend actions.
///
/// `key` starts out equal to `partition_key` and changes only when the bucket
/// is sealed; `partition_key` never changes.
#[derive(Clone, Debug)]
pub struct Bucket<A> {
    key: String,
    partition_key: String,
    actions: Vec<A>,
    sealed: bool,
}

impl<A> Bucket<A> {
    pub(crate) fn new(partition_key: String, capacity: usize) -> Self {
        Self {
            key: partition_key.clone(),
            partition_key,
            actions: Vec::with_capacity(capacity),
            sealed: false,
        }
    }

    /// The unique label of this bucket within its store.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The partition key shared by every action in the bucket.
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn actions(&self) -> &[A] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Whether the bucket was relabelled after an overflow. A full bucket
    /// stays unsealed, under its partition key, until the next action for
    /// that partition arrives.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn into_actions(self) -> Vec<A> {
        self.actions
    }

    pub(crate) fn push(&mut self, action: A) {
        debug_assert!(!self.sealed, "push into sealed bucket {}", self.key);
        self.actions.push(action);
    }

    pub(crate) fn relabel(&mut self, key: String) {
        self.key = key;
    }

    pub(crate) fn seal(&mut self, key: String) {
        self.key = key;
        self.sealed = true;
    }
}
