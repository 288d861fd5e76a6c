//! The generic ensure-resource protocol.
//!
//! Every managed kind goes through the same sequence: read the object, create
//! it when absent, otherwise compare the managed fields and write back only
//! when they drifted. Kinds differ solely in what "managed fields" means,
//! which each kind supplies through [`DesiredState`].

use crate::control_plane::{ApiObject, ResourceStore};
use crate::error::{ErrorKind, Result};
use kube::ResourceExt;
use std::fmt;
use tracing::{info, warn};

/// Per-kind comparison and merge strategy.
pub trait DesiredState: ApiObject {
    /// Whether `observed` already carries every managed field of `self`.
    /// Server-assigned metadata is never part of the comparison.
    fn matches(&self, observed: &Self) -> bool;

    /// Overwrite the managed fields of `observed` with those of `self`,
    /// leaving metadata such as `uid` and `resourceVersion` untouched.
    fn merge_into(&self, observed: &mut Self);
}

/// What a single ensure call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    UpdatedToMatch,
    AlreadyMatched,
    /// Recorded by [`ReconcileLog`] for the step that halted a sequence.
    Failed(ErrorKind),
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Created => write!(f, "created"),
            ReconcileOutcome::UpdatedToMatch => write!(f, "updated to match desired state"),
            ReconcileOutcome::AlreadyMatched => write!(f, "already matches desired state"),
            ReconcileOutcome::Failed(kind) => write!(f, "failed ({:?})", kind),
        }
    }
}

/// Converge one object towards `desired`.
///
/// A conflicting update is surfaced as [`crate::error::ProvisionError::Conflict`] rather
/// than retried; re-running the command re-reads and converges.
pub async fn ensure<K: DesiredState>(
    store: &dyn ResourceStore<K>,
    desired: &K,
) -> Result<ReconcileOutcome> {
    let name = desired.name_any();
    let kind = K::kind(&());

    match store.get(&name).await? {
        None => {
            store.create(desired).await?;
            info!(kind = %kind, name = %name, "Created");
            Ok(ReconcileOutcome::Created)
        }
        Some(observed) if desired.matches(&observed) => {
            info!(kind = %kind, name = %name, "Already matches desired state");
            Ok(ReconcileOutcome::AlreadyMatched)
        }
        Some(mut observed) => {
            desired.merge_into(&mut observed);
            store.replace(&observed).await?;
            info!(kind = %kind, name = %name, "Updated to match desired state");
            Ok(ReconcileOutcome::UpdatedToMatch)
        }
    }
}

/// One recorded ensure call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileStep {
    pub kind: String,
    pub name: String,
    pub outcome: ReconcileOutcome,
}

/// Ordered record of every ensure call made during a pipeline run.
#[derive(Debug, Default)]
pub struct ReconcileLog {
    steps: Vec<ReconcileStep>,
}

impl ReconcileLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run [`ensure`] and record its outcome, including failures.
    pub async fn ensure<K: DesiredState>(
        &mut self,
        store: &dyn ResourceStore<K>,
        desired: &K,
    ) -> Result<ReconcileOutcome> {
        let result = ensure(store, desired).await;
        self.record(&K::kind(&()), &desired.name_any(), &result);
        result
    }

    pub fn record(&mut self, kind: &str, name: &str, result: &Result<ReconcileOutcome>) {
        let outcome = match result {
            Ok(outcome) => *outcome,
            Err(err) => {
                warn!(kind = %kind, name = %name, error = %err, "Reconcile failed");
                ReconcileOutcome::Failed(err.kind())
            }
        };
        self.steps.push(ReconcileStep {
            kind: kind.to_string(),
            name: name.to_string(),
            outcome,
        });
    }

    pub fn steps(&self) -> &[ReconcileStep] {
        &self.steps
    }

    pub fn outcome_of(&self, kind: &str, name: &str) -> Option<ReconcileOutcome> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.kind == kind && s.name == name)
            .map(|s| s.outcome)
    }

    /// True when every recorded step found the object already converged.
    pub fn all_matched(&self) -> bool {
        self.steps
            .iter()
            .all(|s| s.outcome == ReconcileOutcome::AlreadyMatched)
    }

    pub fn first_failure(&self) -> Option<&ReconcileStep> {
        self.steps
            .iter()
            .find(|s| matches!(s.outcome, ReconcileOutcome::Failed(_)))
    }
}
