//! Operation descriptors: one requested change against one entity.
//!
//! An [`OperationDescriptor`] is created synchronously inside a store
//! mutation call and is never mutated afterwards. The [`ActionKind`]
//! it carries is the closed set of changes both backends understand in
//! some form; which of them a backend can actually express inside an
//! atomic batch is decided by that backend's adapter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::store::StoreError;

/// The kind of change recorded for an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Add,
    Get,
    Update,
    UpdateMerge,
    UpdateReplace,
    Delete,
    Upsert,
    UpsertMerge,
    UpsertReplace,
}

impl ActionKind {
    /// Resolves an `Update` with an explicit mode.
    pub fn update(mode: ActionMode) -> Self {
        match mode {
            ActionMode::Merge => ActionKind::UpdateMerge,
            ActionMode::Replace => ActionKind::UpdateReplace,
        }
    }

    /// Resolves an `Upsert` with an explicit mode.
    pub fn upsert(mode: ActionMode) -> Self {
        match mode {
            ActionMode::Merge => ActionKind::UpsertMerge,
            ActionMode::Replace => ActionKind::UpsertReplace,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Add => "add",
            ActionKind::Get => "get",
            ActionKind::Update => "update",
            ActionKind::UpdateMerge => "update-merge",
            ActionKind::UpdateReplace => "update-replace",
            ActionKind::Delete => "delete",
            ActionKind::Upsert => "upsert",
            ActionKind::UpsertMerge => "upsert-merge",
            ActionKind::UpsertReplace => "upsert-replace",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merge-vs-replace selector for updates and upserts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionMode {
    Merge,
    Replace,
}

impl FromStr for ActionMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "merge" => Ok(ActionMode::Merge),
            "replace" => Ok(ActionMode::Replace),
            _ => Err(StoreError::InvalidArgument(format!(
                "Invalid action mode: {}. Must be 'merge' or 'replace'",
                s
            ))),
        }
    }
}

impl TryFrom<u8> for ActionMode {
    type Error = StoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ActionMode::Merge),
            1 => Ok(ActionMode::Replace),
            other => Err(StoreError::InvalidArgument(format!(
                "action mode out of range: {}",
                other
            ))),
        }
    }
}

/// An immutable record of one requested change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationDescriptor<T> {
    kind: ActionKind,
    entity: T,
}

impl<T> OperationDescriptor<T> {
    pub fn new(kind: ActionKind, entity: T) -> Self {
        Self { kind, entity }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn entity(&self) -> &T {
        &self.entity
    }

    pub fn into_entity(self) -> T {
        self.entity
    }
}
