//! Sequential per-group submission and result aggregation.
//!
//! Each group is one atomic batch at the backend. Across groups there is no
//! atomicity: the aggregate is a sequence of independent all-or-nothing
//! commits, and partial completion is an ordinary outcome. Failures of one
//! group are returned as data in that group's [`GroupOutcome`] and never stop
//! the remaining groups from being attempted.
//!
//! The cancellation token is checked before every group. A call that has
//! already started runs to completion; the client receives the token and
//! decides for itself whether to abort before committing.

use serde::Serialize;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::store::Bucket;

/// Errors reported by a backend client for one batch call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The backend evaluated the batch and rolled it back.
    #[error("Batch rejected with status {status}: {message}")]
    Rejected {
        status: u16,
        /// Index of the first failing operation, when the backend reports it.
        failed_index: Option<usize>,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request cancelled")]
    Cancelled,
}

pub type ClientResult<T> = Result<T, ClientError>;

/// A failed group, annotated with the group it belongs to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Group {key} (partition {partition_key}) failed: {source}")]
pub struct SubmitError {
    pub key: String,
    pub partition_key: String,
    #[source]
    pub source: ClientError,
}

impl SubmitError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, ClientError::Cancelled)
    }
}

pub type SubmitResult<T> = Result<T, SubmitError>;

/// Identity of a group as seen by the submission loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupLabel {
    pub key: String,
    pub partition_key: String,
    pub action_count: usize,
}

impl GroupLabel {
    pub fn of<A>(bucket: &Bucket<A>) -> Self {
        Self {
            key: bucket.key().to_string(),
            partition_key: bucket.partition_key().to_string(),
            action_count: bucket.len(),
        }
    }
}

/// The outcome of submitting one group.
#[derive(Debug)]
pub struct GroupOutcome<R> {
    pub key: String,
    pub partition_key: String,
    pub action_count: usize,
    pub result: SubmitResult<R>,
}

impl<R> GroupOutcome<R> {
    fn new(label: GroupLabel, result: ClientResult<R>) -> Self {
        let result = result.map_err(|source| SubmitError {
            key: label.key.clone(),
            partition_key: label.partition_key.clone(),
            source,
        });

        Self {
            key: label.key,
            partition_key: label.partition_key,
            action_count: label.action_count,
            result,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&self.result, Err(e) if e.is_cancelled())
    }

    pub fn value(&self) -> Option<&R> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&SubmitError> {
        self.result.as_ref().err()
    }
}

/// Submits every group in order and collects one outcome per group.
///
/// `submit` performs the single network call for one group's payload. The
/// returned outcomes line up with `groups` by position.
pub async fn submit_groups<P, R, F, Fut>(
    groups: Vec<(GroupLabel, P)>,
    cancel: &CancellationToken,
    mut submit: F,
) -> Vec<GroupOutcome<R>>
where
    F: FnMut(P) -> Fut,
    Fut: Future<Output = ClientResult<R>>,
{
    let total = groups.len();
    info!("Submitting {} groups", total);

    let mut outcomes = Vec::with_capacity(total);
    for (position, (label, payload)) in groups.into_iter().enumerate() {
        let result = if cancel.is_cancelled() {
            Err(ClientError::Cancelled)
        } else {
            submit(payload).await
        };

        match &result {
            Ok(_) => debug!(
                "Group {}/{} {} committed {} actions",
                position + 1,
                total,
                label.key,
                label.action_count
            ),
            Err(e) => warn!(
                "Group {}/{} {} (partition {}) failed: {}",
                position + 1,
                total,
                label.key,
                label.partition_key,
                e
            ),
        }

        outcomes.push(GroupOutcome::new(label, result));
    }

    let summary = SubmissionSummary::from_outcomes(&outcomes);
    info!(
        "Submission finished: {} succeeded, {} failed, {} cancelled",
        summary.succeeded, summary.failed, summary.cancelled
    );

    outcomes
}

/// Counts over a list of group outcomes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionSummary {
    pub groups: usize,
    pub succeeded: usize,
    /// Groups the backend rejected or that hit a transport error.
    pub failed: usize,
    pub cancelled: usize,
    pub actions_committed: usize,
    pub actions_not_committed: usize,
}

impl SubmissionSummary {
    pub fn from_outcomes<R>(outcomes: &[GroupOutcome<R>]) -> Self {
        let mut summary = Self {
            groups: outcomes.len(),
            ..Self::default()
        };

        for outcome in outcomes {
            if outcome.is_success() {
                summary.succeeded += 1;
                summary.actions_committed += outcome.action_count;
            } else {
                if outcome.is_cancelled() {
                    summary.cancelled += 1;
                } else {
                    summary.failed += 1;
                }
                summary.actions_not_committed += outcome.action_count;
            }
        }

        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn label(key: &str, count: usize) -> GroupLabel {
        GroupLabel {
            key: key.to_string(),
            partition_key: key.to_string(),
            action_count: count,
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_groups() {
        let groups = vec![(label("a", 2), 1u32), (label("b", 3), 2), (label("c", 1), 3)];
        let cancel = CancellationToken::new();

        let outcomes = submit_groups(groups, &cancel, |n| async move {
            if n == 1 {
                Err(ClientError::Rejected {
                    status: 409,
                    failed_index: Some(0),
                    message: "conflict".to_string(),
                })
            } else {
                Ok(n * 10)
            }
        })
        .await;

        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[0].is_success());
        assert_eq!(outcomes[0].error().unwrap().partition_key, "a");
        assert_eq!(outcomes[1].value(), Some(&20));
        assert_eq!(outcomes[2].value(), Some(&30));

        let summary = SubmissionSummary::from_outcomes(&outcomes);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.actions_committed, 4);
        assert_eq!(summary.actions_not_committed, 2);
        assert!(!summary.all_succeeded());
    }

    #[tokio::test]
    async fn test_cancellation_checked_before_each_group() {
        let groups = vec![(label("a", 1), ()), (label("b", 1), ()), (label("c", 1), ())];
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);

        let outcomes = submit_groups(groups, &cancel, |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                cancel.cancel();
            }
            async { Ok::<_, ClientError>(()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outcomes[0].is_success());
        assert!(outcomes[1].is_cancelled());
        assert!(outcomes[2].is_cancelled());

        let summary = SubmissionSummary::from_outcomes(&outcomes);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.cancelled, 2);
        assert_eq!(summary.actions_committed, 1);
    }

    #[tokio::test]
    async fn test_cancel_during_committed_call_keeps_success() {
        let groups = vec![(label("a", 4), ()), (label("b", 2), ())];
        let cancel = CancellationToken::new();
        let committed = AtomicUsize::new(0);
        let (counter, token) = (&committed, &cancel);

        let outcomes = submit_groups(groups, &cancel, move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            token.cancel();
            tokio::task::yield_now().await;
            Ok::<_, ClientError>(())
        })
        .await;

        assert_eq!(committed.load(Ordering::SeqCst), 1);
        assert!(outcomes[0].is_success());
        assert!(outcomes[1].is_cancelled());

        let summary = SubmissionSummary::from_outcomes(&outcomes);
        assert_eq!(summary.actions_committed, 4);
        assert_eq!(summary.actions_not_committed, 2);
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_calls() {
        let groups = vec![(label("a", 1), ()), (label("b", 1), ())];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicUsize::new(0);

        let outcomes = submit_groups(groups, &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ClientError>(()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(outcomes.iter().all(GroupOutcome::is_cancelled));
    }

    #[test]
    fn test_submit_error_display() {
        let err = SubmitError {
            key: "p_101".to_string(),
            partition_key: "p".to_string(),
            source: ClientError::Transport("connection reset".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Group p_101 (partition p) failed: Transport error: connection reset"
        );
        assert!(!err.is_cancelled());
    }
}
