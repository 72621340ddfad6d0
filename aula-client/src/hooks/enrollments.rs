use std::time::Duration;

use aula_cache::{MutationOptions, QueryOptions, QueryState};
use aula_core::{keys, Enrollment, EnrollmentRequest, Entity, Subject, UserId};

use super::MutationOutcome;
use crate::context::AppContext;
use crate::notifications::Notification;

pub const ENROLLMENT_STALE_TIME: Duration = Duration::from_secs(60);

impl AppContext {
    pub async fn available_subjects(&self) -> QueryState<Vec<Subject>> {
        let Some(session) = self.session() else {
            return self.signed_out(Entity::AvailableSubjects);
        };
        let options = QueryOptions::new(keys::available_subjects(session.user_id))
            .with_stale_time(ENROLLMENT_STALE_TIME);
        self.query(options, |api| async move { api.available_subjects().await })
            .await
    }

    pub async fn enrollments(&self) -> QueryState<Vec<Enrollment>> {
        let Some(session) = self.session() else {
            return self.signed_out(Entity::Enrollments);
        };
        let options = QueryOptions::new(keys::enrollments(session.user_id))
            .with_stale_time(ENROLLMENT_STALE_TIME);
        self.query(options, |api| async move { api.enrollments().await })
            .await
    }

    /// Enroll in a subject. A 409 (already enrolled) surfaces as a warning.
    pub async fn enroll(&self, request: EnrollmentRequest) -> MutationOutcome<Enrollment> {
        request.validate()?;
        let session = self.require_session()?;
        let api = self.api.clone();
        let subject = request.subject_code.clone();
        self.run_mutation(
            enrollment_cascade("enroll", session.user_id),
            async move { api.enroll(&request).await },
            move |_| Notification::success(format!("Enrolled in {}", subject)),
            "Could not enroll",
        )
        .await
    }

    pub async fn unenroll(&self, enrollment_id: i64) -> MutationOutcome<()> {
        let session = self.require_session()?;
        let api = self.api.clone();
        self.run_mutation(
            enrollment_cascade("unenroll", session.user_id),
            async move { api.unenroll(enrollment_id).await },
            |_| Notification::success("Enrollment cancelled"),
            "Could not cancel the enrollment",
        )
        .await
    }
}

fn enrollment_cascade(name: &'static str, user: UserId) -> MutationOptions {
    MutationOptions::new(name)
        .invalidates(keys::available_subjects(user))
        .invalidates(keys::enrollments(user))
}
