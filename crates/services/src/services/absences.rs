//! Create the same absence for several users in one action.

use domain::{
    models::leave::{AbsenceDraft, Leave},
    validation::ValidationError,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::{context::PlannerContext, notification::Notice, rota_api::RotaApiError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbsenceBatchOutcome {
    pub requested: usize,
    pub created: Vec<Leave>,
    pub failed: Vec<(Uuid, RotaApiError)>,
    /// Users never attempted because the session ended first
    pub cancelled: usize,
}

impl AbsenceBatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled == 0
    }

    pub fn collisions(&self) -> usize {
        self.failed
            .iter()
            .filter(|(_, e)| matches!(e, RotaApiError::LeaveCollision(_)))
            .count()
    }

    /// The single notice summarising the batch
    pub fn notice(&self) -> Notice {
        if self.failed.is_empty() {
            return match self.cancelled {
                0 => Notice::success(format!("Created {} absences", self.created.len())),
                n => Notice::info(format!(
                    "Created {} absences, {n} skipped",
                    self.created.len()
                )),
            };
        }

        let title = format!(
            "{} of {} absences failed",
            self.failed.len(),
            self.requested
        );
        let (user_id, first) = &self.failed[0];
        let detail = match first {
            RotaApiError::LeaveCollision(_) => {
                format!("user {user_id} already has an absence in this period")
            }
            e => format!("user {user_id}: {e}"),
        };
        Notice::error(title, detail)
    }
}

/// Validate `draft` once, then create one leave per distinct user in order.
/// Failures for one user never stop the rest of the batch.
pub async fn create_absences(
    ctx: &PlannerContext,
    user_ids: &[Uuid],
    draft: &AbsenceDraft,
    cancel: &CancellationToken,
) -> Result<AbsenceBatchOutcome, ValidationError> {
    let validated = draft.validate().and_then(|()| {
        if user_ids.is_empty() {
            Err(ValidationError::MissingField("user_ids"))
        } else {
            Ok(())
        }
    });
    if let Err(e) = validated {
        ctx.notifier
            .notify(Notice::error("Could not create absences", &e));
        return Err(e);
    }

    let mut users = Vec::with_capacity(user_ids.len());
    for user_id in user_ids {
        if !users.contains(user_id) {
            users.push(*user_id);
        }
    }

    let mut outcome = AbsenceBatchOutcome {
        requested: users.len(),
        ..Default::default()
    };

    for (done, user_id) in users.iter().enumerate() {
        let payload = draft.for_user(*user_id);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = ctx.api.create_leave(&payload) => Some(result),
        };
        match result {
            Some(Ok(leave)) => outcome.created.push(leave),
            Some(Err(e)) => {
                warn!(%user_id, error = %e, "Absence not created");
                outcome.failed.push((*user_id, e));
            }
            None => {
                outcome.cancelled = users.len() - done;
                break;
            }
        }
    }

    info!(
        requested = outcome.requested,
        created = outcome.created.len(),
        failed = outcome.failed.len(),
        cancelled = outcome.cancelled,
        "Absence batch finished"
    );
    ctx.notifier.notify(outcome.notice());
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use domain::models::{leave::LeaveStatus, week::RotaWeek};

    use super::*;
    use crate::services::{
        notification::NoticeLevel,
        testing::{ApiCall, FakeRotaApi, test_context},
    };

    fn draft() -> AbsenceDraft {
        AbsenceDraft {
            start_at: Utc.with_ymd_and_hms(2025, 3, 4, 0, 0, 0).unwrap(),
            end_at: Utc.with_ymd_and_hms(2025, 3, 6, 0, 0, 0).unwrap(),
            status: LeaveStatus::Approved,
            leave_type: Some("holiday".to_string()),
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_creates_one_leave_per_distinct_user() {
        let api = Arc::new(FakeRotaApi::default());
        let (ctx, notifier) = test_context(api.clone());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let outcome = create_absences(&ctx, &[a, b, a], &draft(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.requested, 2);
        assert_eq!(outcome.created.len(), 2);
        assert_eq!(
            api.write_calls(),
            vec![
                ApiCall::CreateLeave { user_id: a },
                ApiCall::CreateLeave { user_id: b },
            ]
        );
        assert_eq!(notifier.notices(), vec![Notice::success("Created 2 absences")]);
    }

    #[tokio::test]
    async fn test_collision_is_reported_once_and_batch_continues() {
        let api = Arc::new(FakeRotaApi::with_week(RotaWeek::default()));
        let (ctx, notifier) = test_context(api.clone());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        create_absences(&ctx, &[a], &draft(), &CancellationToken::new())
            .await
            .unwrap();
        notifier.take();

        let outcome = create_absences(&ctx, &[a, b], &draft(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].user_id, b);
        assert_eq!(outcome.collisions(), 1);
        let notices = notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].title, "1 of 2 absences failed");
        assert_eq!(
            notices[0].detail.as_deref(),
            Some(format!("user {a} already has an absence in this period").as_str())
        );
    }

    #[tokio::test]
    async fn test_invalid_draft_makes_no_request() {
        let api = Arc::new(FakeRotaApi::default());
        let (ctx, notifier) = test_context(api.clone());
        let mut backwards = draft();
        std::mem::swap(&mut backwards.start_at, &mut backwards.end_at);

        let err = create_absences(&ctx, &[Uuid::new_v4()], &backwards, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, ValidationError::InvalidInterval { entity: "absence" });
        assert!(api.calls().is_empty());
        assert_eq!(notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_user_list_is_rejected() {
        let api = Arc::new(FakeRotaApi::default());
        let (ctx, _) = test_context(api.clone());

        let err = create_absences(&ctx, &[], &draft(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, ValidationError::MissingField("user_ids"));
    }

    #[tokio::test]
    async fn test_cancelled_batch_counts_skipped_users() {
        let api = Arc::new(FakeRotaApi::default());
        let (ctx, notifier) = test_context(api.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = create_absences(&ctx, &[Uuid::new_v4(), Uuid::new_v4()], &draft(), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.cancelled, 2);
        assert!(outcome.created.is_empty());
        assert!(api.calls().is_empty());
        assert_eq!(notifier.notices()[0].level, NoticeLevel::Info);
    }
}
