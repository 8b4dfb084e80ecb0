use serde::{Deserialize, Serialize};

use super::{StoreError, StoreResult};

/// Hard cap on operations per atomic batch shared by both backends.
pub const MAX_BATCH_OPERATIONS: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Number of actions after which a bucket is sealed.
    /// Backends reject batches above [`MAX_BATCH_OPERATIONS`].
    pub max_actions_per_group: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_actions_per_group: MAX_BATCH_OPERATIONS,
        }
    }
}

impl StoreConfig {
    pub fn new(max_actions_per_group: usize) -> Self {
        Self {
            max_actions_per_group,
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.max_actions_per_group == 0 {
            return Err(StoreError::InvalidArgument(
                "max_actions_per_group must be greater than 0".to_string(),
            ));
        }

        if self.max_actions_per_group > MAX_BATCH_OPERATIONS {
            return Err(StoreError::InvalidArgument(format!(
                "max_actions_per_group must not exceed {}",
                MAX_BATCH_OPERATIONS
            )));
        }

        Ok(())
    }
}
