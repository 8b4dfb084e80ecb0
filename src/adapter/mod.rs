//! Backend action adapters.
//!
//! A store is parameterized by an [`ActionAdapter`]: the pair of functions that
//! extract a partition key from an entity and turn an `(entity, kind)` pair into
//! the backend's wire-level batch action. Backends ship their own adapters
//! (`TableActionAdapter`, `DocumentActionAdapter`); [`FnAdapter`] and
//! [`AdapterBuilder`] cover caller-supplied closures.

use crate::operation::{ActionKind, OperationDescriptor};
use crate::store::{StoreError, StoreResult};

/// A backend-specific batch action that still knows which entity it was built from.
pub trait BackendAction<T> {
    /// The entity this action was derived from.
    fn entity(&self) -> &T;

    /// The action kind this action was built for.
    fn kind(&self) -> ActionKind;
}

impl<T> BackendAction<T> for OperationDescriptor<T> {
    fn entity(&self) -> &T {
        OperationDescriptor::entity(self)
    }

    fn kind(&self) -> ActionKind {
        OperationDescriptor::kind(self)
    }
}

/// Converts entities into backend actions and names their partition.
///
/// Both functions must be pure: the store calls `partition_key` once per
/// recorded operation and relies on it being stable for a given entity.
pub trait ActionAdapter<T> {
    type Action: BackendAction<T>;

    /// Extracts the partition key shared by every action in one atomic batch.
    fn partition_key(&self, entity: &T) -> String;

    /// Builds the wire representation of a single batch action.
    ///
    /// Fails only for kinds the backend cannot express.
    fn build_action(&self, entity: T, kind: ActionKind) -> StoreResult<Self::Action>;
}

/// Adapter backed by two closures.
#[derive(Clone)]
pub struct FnAdapter<P, B> {
    partition_fn: P,
    build_fn: B,
}

impl<P, B> FnAdapter<P, B> {
    pub fn new(partition_fn: P, build_fn: B) -> Self {
        Self {
            partition_fn,
            build_fn,
        }
    }
}

impl<T, A, P, B> ActionAdapter<T> for FnAdapter<P, B>
where
    A: BackendAction<T>,
    P: Fn(&T) -> String,
    B: Fn(T, ActionKind) -> StoreResult<A>,
{
    type Action = A;

    fn partition_key(&self, entity: &T) -> String {
        (self.partition_fn)(entity)
    }

    fn build_action(&self, entity: T, kind: ActionKind) -> StoreResult<A> {
        (self.build_fn)(entity, kind)
    }
}

pub type PartitionFn<T> = Box<dyn Fn(&T) -> String + Send + Sync>;
pub type BuildFn<T, A> = Box<dyn Fn(T, ActionKind) -> StoreResult<A> + Send + Sync>;

/// A closure adapter with both functions boxed, as produced by [`AdapterBuilder`].
pub type BoxedAdapter<T, A> = FnAdapter<PartitionFn<T>, BuildFn<T, A>>;

/// Assembles a [`BoxedAdapter`] from functions supplied one at a time.
///
/// `build` refuses to produce an adapter unless both functions were given.
pub struct AdapterBuilder<T, A> {
    partition_fn: Option<PartitionFn<T>>,
    build_fn: Option<BuildFn<T, A>>,
}

impl<T, A> AdapterBuilder<T, A> {
    pub fn new() -> Self {
        Self {
            partition_fn: None,
            build_fn: None,
        }
    }

    pub fn partition_key<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.partition_fn = Some(Box::new(f));
        self
    }

    pub fn action_builder<F>(mut self, f: F) -> Self
    where
        F: Fn(T, ActionKind) -> StoreResult<A> + Send + Sync + 'static,
    {
        self.build_fn = Some(Box::new(f));
        self
    }

    pub fn build(self) -> StoreResult<BoxedAdapter<T, A>> {
        let partition_fn = self.partition_fn.ok_or_else(|| {
            StoreError::InvalidArgument("partition key function is required".to_string())
        })?;
        let build_fn = self.build_fn.ok_or_else(|| {
            StoreError::InvalidArgument("action builder function is required".to_string())
        })?;
        Ok(FnAdapter::new(partition_fn, build_fn))
    }
}

impl<T, A> Default for AdapterBuilder<T, A> {
    fn default() -> Self {
        Self::new()
    }
}
