use std::time::Duration;

use aula_cache::{MutationOptions, QueryOptions, QueryState};
use aula_core::{keys, DocumentUpload, Entity, Plan, PlanUploadSummary, Subject, ValidationError};

use super::{MutationFailure, MutationOutcome};
use crate::context::AppContext;
use crate::notifications::Notification;

pub const PLAN_STALE_TIME: Duration = Duration::from_secs(30 * 60);

pub const PLAN_UPLOAD_TYPES: &[&str] = &[
    "application/pdf",
    "text/csv",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

impl AppContext {
    pub async fn plans(&self) -> QueryState<Vec<Plan>> {
        let options = QueryOptions::new(keys::plans()).with_stale_time(PLAN_STALE_TIME);
        self.query(options, |api| async move { api.plans().await })
            .await
    }

    pub async fn plan_subjects(&self, plan_code: &str) -> QueryState<Vec<Subject>> {
        let code = plan_code.to_string();
        let options = QueryOptions::new(keys::plan_subjects(plan_code))
            .with_stale_time(PLAN_STALE_TIME)
            .enabled(!plan_code.trim().is_empty());
        self.query(options, move |api| {
            let code = code.clone();
            async move { api.plan_subjects(&code).await }
        })
        .await
    }

    /// Upload a study plan (admin). The success message names the plan and
    /// how many subjects it holds.
    pub async fn upload_plan(&self, upload: DocumentUpload) -> MutationOutcome<PlanUploadSummary> {
        upload.validate(PLAN_UPLOAD_TYPES)?;
        self.require_admin()?;
        let api = self.api.clone();
        let options = MutationOptions::new("upload_plan")
            .invalidates(Entity::Plans.namespace())
            .invalidates(Entity::PlanSubjects.namespace());
        self.run_mutation(
            options,
            async move { api.upload_plan(upload).await },
            |summary: &PlanUploadSummary| {
                Notification::success(format!(
                    "Plan {} uploaded with {} subjects",
                    summary.plan_name, summary.subject_count
                ))
            },
            "Could not upload the study plan",
        )
        .await
    }

    pub async fn delete_plan(&self, plan_code: &str) -> MutationOutcome<()> {
        if plan_code.trim().is_empty() {
            return Err(ValidationError::new("codigo", "must not be empty").into());
        }
        self.require_admin()?;
        let api = self.api.clone();
        let code = plan_code.to_string();
        let options = MutationOptions::new("delete_plan")
            .invalidates(Entity::Plans.namespace())
            .invalidates(keys::plan_subjects(plan_code));
        self.run_mutation(
            options,
            async move { api.delete_plan(&code).await },
            |_| Notification::success("Study plan deleted"),
            "Could not delete the study plan",
        )
        .await
    }

    fn require_admin(&self) -> Result<(), MutationFailure> {
        let session = self.require_session()?;
        if session.is_admin() {
            Ok(())
        } else {
            Err(ValidationError::new("role", "study plans are managed by administrators").into())
        }
    }
}
