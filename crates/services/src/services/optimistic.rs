//! Snapshot, apply, then commit or roll back.

use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq)]
pub enum OptimisticError<E> {
    /// The remote write failed; local state has been rolled back
    #[error("{0}")]
    Commit(E),
    /// The session ended before the write settled; local state has been rolled back
    #[error("cancelled")]
    Cancelled,
}

/// Apply a local change before the remote write settles.
///
/// `apply` mutates `state` immediately. `commit` performs the remote write.
/// On failure or cancellation `rollback` receives the state together with the
/// snapshot taken before `apply` ran. A token that is already cancelled leaves
/// `state` untouched.
pub async fn optimistic<S, T, E, Apply, Commit, Fut, Rollback>(
    state: &mut S,
    cancel: &CancellationToken,
    apply: Apply,
    commit: Commit,
    rollback: Rollback,
) -> Result<T, OptimisticError<E>>
where
    S: Clone,
    Apply: FnOnce(&mut S),
    Commit: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Rollback: FnOnce(&mut S, S),
{
    if cancel.is_cancelled() {
        return Err(OptimisticError::Cancelled);
    }

    let snapshot = state.clone();
    apply(state);

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = commit() => Some(result),
    };

    match outcome {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => {
            rollback(state, snapshot);
            Err(OptimisticError::Commit(e))
        }
        None => {
            rollback(state, snapshot);
            Err(OptimisticError::Cancelled)
        }
    }
}

/// Default rollback: put the snapshot back
pub fn restore<S>(state: &mut S, snapshot: S) {
    *state = snapshot;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_keeps_applied_state() {
        let mut state = vec![1, 2, 3];
        let result: Result<&str, OptimisticError<String>> = optimistic(
            &mut state,
            &CancellationToken::new(),
            |s| s.retain(|v| *v != 2),
            || async { Ok("saved") },
            restore,
        )
        .await;
        assert_eq!(result, Ok("saved"));
        assert_eq!(state, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_failure_restores_snapshot() {
        let mut state = vec![1, 2, 3];
        let before = state.clone();
        let result: Result<(), _> = optimistic(
            &mut state,
            &CancellationToken::new(),
            |s| s.push(4),
            || async { Err("offline".to_string()) },
            restore,
        )
        .await;
        assert_eq!(result, Err(OptimisticError::Commit("offline".to_string())));
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_cancellation_rolls_back_in_flight_change() {
        let cancel = CancellationToken::new();
        let mut state = vec![1];
        let trigger = cancel.clone();
        let result: Result<(), OptimisticError<String>> = optimistic(
            &mut state,
            &cancel,
            |s| s.clear(),
            || async move {
                trigger.cancel();
                std::future::pending::<Result<(), String>>().await
            },
            restore,
        )
        .await;
        assert_eq!(result, Err(OptimisticError::Cancelled));
        assert_eq!(state, vec![1]);
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_apply() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut state = vec![1];
        let result: Result<(), OptimisticError<String>> = optimistic(
            &mut state,
            &cancel,
            |s| s.clear(),
            || async { Ok(()) },
            |_, _| panic!("nothing to roll back"),
        )
        .await;
        assert_eq!(result, Err(OptimisticError::Cancelled));
        assert_eq!(state, vec![1]);
    }

    #[tokio::test]
    async fn test_custom_rollback_receives_snapshot() {
        let mut state = (vec![1, 2], 0u32);
        let _: Result<(), _> = optimistic(
            &mut state,
            &CancellationToken::new(),
            |s| s.0.clear(),
            || async { Err(()) },
            |s, snapshot| {
                s.0 = snapshot.0;
                s.1 += 1;
            },
        )
        .await;
        assert_eq!(state, (vec![1, 2], 1));
    }
}
