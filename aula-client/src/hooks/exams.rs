use std::time::Duration;

use aula_cache::{MutationOptions, QueryOptions, QueryState};
use aula_core::{keys, Entity, ExamRegistration, ExamRegistrationRequest, ExamSession, UserId};

use super::MutationOutcome;
use crate::context::AppContext;
use crate::notifications::Notification;

pub const EXAM_STALE_TIME: Duration = Duration::from_secs(2 * 60);

impl AppContext {
    pub async fn exam_sessions(&self) -> QueryState<Vec<ExamSession>> {
        let Some(session) = self.session() else {
            return self.signed_out(Entity::ExamSessions);
        };
        let options =
            QueryOptions::new(keys::exam_sessions(session.user_id)).with_stale_time(EXAM_STALE_TIME);
        self.query(options, |api| async move { api.exam_sessions().await })
            .await
    }

    pub async fn exam_registrations(&self) -> QueryState<Vec<ExamRegistration>> {
        let Some(session) = self.session() else {
            return self.signed_out(Entity::ExamRegistrations);
        };
        let options = QueryOptions::new(keys::exam_registrations(session.user_id))
            .with_stale_time(EXAM_STALE_TIME);
        self.query(options, |api| async move { api.exam_registrations().await })
            .await
    }

    pub async fn register_for_exam(
        &self,
        request: ExamRegistrationRequest,
    ) -> MutationOutcome<ExamRegistration> {
        request.validate()?;
        let session = self.require_session()?;
        let api = self.api.clone();
        self.run_mutation(
            exam_cascade("register_for_exam", session.user_id),
            async move { api.register_for_exam(&request).await },
            |_| Notification::success("Registered for the exam"),
            "Could not register for the exam",
        )
        .await
    }

    pub async fn cancel_exam_registration(&self, registration_id: i64) -> MutationOutcome<()> {
        let session = self.require_session()?;
        let api = self.api.clone();
        self.run_mutation(
            exam_cascade("cancel_exam_registration", session.user_id),
            async move { api.cancel_exam_registration(registration_id).await },
            |_| Notification::success("Exam registration cancelled"),
            "Could not cancel the exam registration",
        )
        .await
    }
}

fn exam_cascade(name: &'static str, user: UserId) -> MutationOptions {
    MutationOptions::new(name)
        .invalidates(keys::exam_sessions(user))
        .invalidates(keys::exam_registrations(user))
}
