//! In-process backends implementing [`TableClient`](crate::table::TableClient)
//! and [`DocumentClient`](crate::document::DocumentClient).
//!
//! Both honor the same batch rules as the real services: at most 100
//! operations, a single partition per batch, and all-or-nothing commits.
//! A batch is evaluated against a staged overlay of the touched keys and
//! applied only when every operation succeeds. Faults can be injected per
//! partition key to simulate a backend rejecting a batch.

pub mod document;
pub mod table;

pub use document::InMemoryDocumentService;
pub use table::InMemoryTableService;

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::store::MAX_BATCH_OPERATIONS;
use crate::submit::{ClientError, ClientResult};

/// Call counting and per-partition fault injection shared by both services.
#[derive(Debug, Default)]
struct Faults {
    failing: RwLock<HashSet<String>>,
    calls: AtomicUsize,
}

impl Faults {
    fn fail_partition(&self, partition_key: &str) {
        self.failing.write().insert(partition_key.to_string());
    }

    fn heal_partition(&self, partition_key: &str) {
        self.failing.write().remove(partition_key);
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Counts the call and applies the checks every batch goes through
    /// before any operation is evaluated.
    fn admit(&self, partition_key: &str, len: usize, cancelled: bool) -> ClientResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if cancelled {
            return Err(ClientError::Cancelled);
        }

        if len == 0 {
            return Err(rejected(400, None, "batch contains no operations".to_string()));
        }

        if len > MAX_BATCH_OPERATIONS {
            return Err(rejected(
                400,
                None,
                format!(
                    "batch contains {} operations, limit is {}",
                    len, MAX_BATCH_OPERATIONS
                ),
            ));
        }

        if self.failing.read().contains(partition_key) {
            return Err(ClientError::Transport(format!(
                "injected fault for partition {}",
                partition_key
            )));
        }

        Ok(())
    }
}

fn rejected(status: u16, failed_index: Option<usize>, message: String) -> ClientError {
    ClientError::Rejected {
        status,
        failed_index,
        message,
    }
}
