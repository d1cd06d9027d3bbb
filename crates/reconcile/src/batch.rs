//! Concurrent deletion: one task per object, joined before returning.

use operand_core::{ErrorList, ObjectRef, ReconcileError};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::converge::{Converger, DeleteOutcome};

/// Delete every object with convergence, concurrently.
///
/// Returns the items whose deletion completed (deleted, absent or skipped),
/// in input order, and every failure. Each item is reported exactly once.
pub async fn delete_batch<K>(conv: &Converger, items: Vec<(K, ObjectRef)>) -> (Vec<(K, ObjectRef)>, ErrorList)
where
    K: Send + 'static,
{
    let mut set = JoinSet::new();
    for (index, (_, target)) in items.iter().enumerate() {
        let conv = conv.clone();
        let target = target.clone();
        set.spawn(async move { (index, conv.delete_with_convergence(&target).await) });
    }

    let mut results: Vec<Option<Result<DeleteOutcome, ReconcileError>>> = items.iter().map(|_| None).collect();
    let mut aborted = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => aborted.push(e.to_string()),
        }
    }

    ErrorList::fold(items.into_iter().zip(results).map(|((key, target), result)| match result {
        Some(Ok(outcome)) => {
            debug!(%target, ?outcome, "batch delete");
            Ok((key, target))
        }
        Some(Err(e)) => {
            warn!(%target, error = %e, "batch delete failed");
            Err(e)
        }
        None => {
            let message = aborted.pop().unwrap_or_else(|| "task did not complete".to_string());
            Err(ReconcileError::Task { target, message })
        }
    }))
}
