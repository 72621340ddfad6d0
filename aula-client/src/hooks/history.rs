use std::time::Duration;

use aula_cache::{MutationOptions, QueryOptions, QueryState};
use aula_core::{
    keys, AcademicHistory, DocumentUpload, Entity, ErrorKind, HistoryUploadSummary,
    Recommendation, Role,
};

use super::{MutationOutcome, HISTORY_UPLOAD_TYPES};
use crate::context::AppContext;
use crate::notifications::Notification;

pub const HISTORY_STALE_TIME: Duration = Duration::from_secs(5 * 60);
pub const RECOMMENDATION_STALE_TIME: Duration = Duration::from_secs(10 * 60);

impl AppContext {
    /// The signed-in student's academic history. A missing history reads as empty.
    pub async fn academic_history(&self) -> QueryState<AcademicHistory> {
        let Some(session) = self.session() else {
            return self.signed_out(Entity::AcademicHistory);
        };
        let options = QueryOptions::new(keys::academic_history(session.user_id))
            .with_stale_time(HISTORY_STALE_TIME);
        self.query(options, |api| async move {
            match api.academic_history().await {
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(AcademicHistory::default()),
                other => other,
            }
        })
        .await
    }

    /// Recommendations, only once a non-empty history is cached and still valid.
    pub async fn recommendations(&self) -> QueryState<Vec<Recommendation>> {
        let Some(session) = self.session() else {
            return self.signed_out(Entity::Recommendations);
        };
        let has_history = self
            .queries
            .get_valid_query_data::<AcademicHistory>(&keys::academic_history(session.user_id))
            .is_some_and(|history| !history.is_empty());
        let options = QueryOptions::new(keys::recommendations(session.user_id))
            .with_stale_time(RECOMMENDATION_STALE_TIME)
            .enabled(session.role == Role::Student && has_history);
        self.query(options, |api| async move { api.recommendations().await })
            .await
    }

    pub async fn upload_academic_history(
        &self,
        upload: DocumentUpload,
    ) -> MutationOutcome<HistoryUploadSummary> {
        upload.validate(HISTORY_UPLOAD_TYPES)?;
        let session = self.require_session()?;
        let api = self.api.clone();
        self.run_mutation(
            history_cascade("upload_academic_history", session.user_id),
            async move { api.upload_academic_history(upload).await },
            |summary: &HistoryUploadSummary| {
                Notification::success("Academic history uploaded").with_description(format!(
                    "{} subjects loaded",
                    summary.subjects_loaded
                ))
            },
            "Could not upload the academic history",
        )
        .await
    }

    pub async fn delete_academic_history(&self) -> MutationOutcome<()> {
        let session = self.require_session()?;
        let api = self.api.clone();
        self.run_mutation(
            history_cascade("delete_academic_history", session.user_id),
            async move { api.delete_academic_history().await },
            |_| Notification::success("Academic history deleted"),
            "Could not delete the academic history",
        )
        .await
    }
}

fn history_cascade(name: &'static str, user: aula_core::UserId) -> MutationOptions {
    MutationOptions::new(name)
        .invalidates(keys::academic_history(user))
        .invalidates(keys::recommendations(user))
        .invalidates(keys::available_subjects(user))
}
