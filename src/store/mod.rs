//! The bucketed transaction store.
//!
//! Both target backends accept atomic batches under two constraints: every
//! operation in a batch shares one partition key, and a batch holds at most
//! [`MAX_BATCH_OPERATIONS`] operations. The store accepts an unordered stream
//! of entity operations and keeps them pre-grouped so that each [`Bucket`] can
//! be submitted as one atomic batch as-is:
//!
//! 1. Operations are bucketed by the partition key the adapter reports
//! 2. A bucket that reaches capacity is sealed and relabelled with a unique key
//! 3. The next operation for that partition opens a fresh live bucket
//!
//! Buckets enumerate in creation order, and actions within a bucket keep the
//! order they were recorded in.

pub mod bucket;
pub mod bucketed;
pub mod config;

pub use bucket::Bucket;
pub use bucketed::BucketedTransactionStore;
pub use config::{StoreConfig, MAX_BATCH_OPERATIONS};

use thiserror::Error;

use crate::operation::ActionKind;

/// Store errors. Both variants are caller errors and are never deferred.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Action {kind} is not supported by the {backend} backend")]
    NotImplemented {
        kind: ActionKind,
        backend: &'static str,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;
