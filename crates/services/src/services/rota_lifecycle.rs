//! Draft, published, locked. Status only moves forward and each step is
//! gated by its own permission.

use domain::models::rota::{Permission, Rota, RotaStatus};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{
    context::{PermissionSet, PlannerContext},
    notification::Notice,
    rota_api::RotaApiError,
};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LifecycleError {
    #[error("rota cannot move from {from} to {to}")]
    InvalidTransition { from: RotaStatus, to: RotaStatus },
    #[error("missing permission {0}")]
    MissingPermission(Permission),
    #[error(transparent)]
    Api(#[from] RotaApiError),
    #[error("cancelled")]
    Cancelled,
}

/// Local guard run before any request is made
pub fn check_transition(
    permissions: &PermissionSet,
    rota: &Rota,
    target: RotaStatus,
) -> Result<(), LifecycleError> {
    if !rota.status.can_transition_to(target) {
        return Err(LifecycleError::InvalidTransition {
            from: rota.status,
            to: target,
        });
    }
    match target.required_permission() {
        Some(permission) if !permissions.has(permission) => {
            Err(LifecycleError::MissingPermission(permission))
        }
        _ => Ok(()),
    }
}

fn titles(target: RotaStatus) -> (&'static str, &'static str) {
    match target {
        RotaStatus::Published => ("Rota published", "Could not publish rota"),
        RotaStatus::Locked => ("Rota locked", "Could not lock rota"),
        RotaStatus::Draft => ("Rota moved to draft", "Could not move rota to draft"),
    }
}

/// Move `rota` to `target` and return the server's copy.
///
/// Invalid or unauthorised transitions fail without a request. Every outcome
/// except cancellation produces one notice.
pub async fn transition(
    ctx: &PlannerContext,
    rota: &Rota,
    target: RotaStatus,
    cancel: &CancellationToken,
) -> Result<Rota, LifecycleError> {
    let (success, failure) = titles(target);

    if let Err(e) = check_transition(&ctx.permissions, rota, target) {
        warn!(
            rota_id = %rota.id,
            from = %rota.status,
            to = %target,
            error = %e,
            "Rota transition refused"
        );
        ctx.notifier.notify(Notice::error(failure, &e));
        return Err(e);
    }

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(LifecycleError::Cancelled),
        result = ctx.api.update_rota_status(rota.id, target) => result,
    };

    match result {
        Ok(updated) => {
            info!(rota_id = %updated.id, status = %updated.status, "Rota status changed");
            ctx.notifier.notify(Notice::success(success));
            Ok(updated)
        }
        Err(e) => {
            warn!(rota_id = %rota.id, to = %target, error = %e, "Rota status update failed");
            ctx.notifier.notify(Notice::error(failure, &e));
            Err(e.into())
        }
    }
}

pub async fn publish(
    ctx: &PlannerContext,
    rota: &Rota,
    cancel: &CancellationToken,
) -> Result<Rota, LifecycleError> {
    transition(ctx, rota, RotaStatus::Published, cancel).await
}

pub async fn lock(
    ctx: &PlannerContext,
    rota: &Rota,
    cancel: &CancellationToken,
) -> Result<Rota, LifecycleError> {
    transition(ctx, rota, RotaStatus::Locked, cancel).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::services::{
        notification::NoticeLevel,
        testing::{ApiCall, FakeRotaApi, test_context, test_context_with},
    };

    fn api_with_draft() -> (Arc<FakeRotaApi>, Rota) {
        let week = FakeRotaApi::sample_week(Uuid::new_v4());
        let rota = week.rota.clone().unwrap();
        (Arc::new(FakeRotaApi::with_week(week)), rota)
    }

    #[tokio::test]
    async fn test_publish_then_lock() {
        let (api, rota) = api_with_draft();
        let (ctx, notifier) = test_context(api.clone());
        let cancel = CancellationToken::new();

        let published = publish(&ctx, &rota, &cancel).await.unwrap();
        assert_eq!(published.status, RotaStatus::Published);
        let locked = lock(&ctx, &published, &cancel).await.unwrap();
        assert_eq!(locked.status, RotaStatus::Locked);

        assert_eq!(
            notifier.notices(),
            vec![Notice::success("Rota published"), Notice::success("Rota locked")]
        );
    }

    #[tokio::test]
    async fn test_backward_transition_makes_no_request() {
        let (api, rota) = api_with_draft();
        let (ctx, notifier) = test_context(api.clone());
        let cancel = CancellationToken::new();
        let published = publish(&ctx, &rota, &cancel).await.unwrap();

        let err = transition(&ctx, &published, RotaStatus::Draft, &cancel)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: RotaStatus::Published,
                to: RotaStatus::Draft,
            }
        );
        assert_eq!(api.write_calls().len(), 1);
        let last = notifier.notices().pop().unwrap();
        assert_eq!(last.level, NoticeLevel::Error);
        assert_eq!(last.title, "Could not move rota to draft");
    }

    #[tokio::test]
    async fn test_skipping_publish_is_rejected() {
        let (api, rota) = api_with_draft();
        let (ctx, _) = test_context(api.clone());

        let err = lock(&ctx, &rota, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
        assert!(api.write_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_permission_blocks_request() {
        let (api, rota) = api_with_draft();
        let (ctx, notifier) =
            test_context_with(api.clone(), PermissionSet::new([Permission::RotaLock]));

        let err = publish(&ctx, &rota, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, LifecycleError::MissingPermission(Permission::RotaPublish));
        assert!(api.write_calls().is_empty());
        assert_eq!(
            notifier.notices()[0].detail.as_deref(),
            Some("missing permission rota.publish")
        );
    }

    #[tokio::test]
    async fn test_server_rejection_is_reported() {
        let (api, rota) = api_with_draft();
        let (ctx, notifier) = test_context(api.clone());
        api.fail_writes(Some(RotaApiError::PermissionDenied(
            "rota.publish".to_string(),
        )));

        let err = publish(&ctx, &rota, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Api(RotaApiError::PermissionDenied(_))));
        assert_eq!(
            api.write_calls(),
            vec![ApiCall::UpdateRotaStatus {
                rota_id: rota.id,
                status: RotaStatus::Published,
            }]
        );
        assert_eq!(notifier.notices()[0].title, "Could not publish rota");
    }

    #[tokio::test]
    async fn test_cancelled_transition_is_silent() {
        let (api, rota) = api_with_draft();
        let (ctx, notifier) = test_context(api.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = publish(&ctx, &rota, &cancel).await.unwrap_err();

        assert_eq!(err, LifecycleError::Cancelled);
        assert!(api.write_calls().is_empty());
        assert!(notifier.notices().is_empty());
    }
}
