use std::collections::HashSet;
use std::time::Duration;

use aula_cache::{MutationOptions, QueryOptions, QueryState};
use aula_core::{keys, Entity, Experience, NewExperience, TakenExam, UserId};

use super::MutationOutcome;
use crate::context::AppContext;
use crate::notifications::Notification;

pub const EXPERIENCE_STALE_TIME: Duration = Duration::from_secs(5 * 60);

impl AppContext {
    /// The signed-in student's own experiences.
    pub async fn experiences(&self) -> QueryState<Vec<Experience>> {
        let Some(session) = self.session() else {
            return self.signed_out(Entity::Experiences);
        };
        let options = QueryOptions::new(keys::experiences(session.user_id))
            .with_stale_time(EXPERIENCE_STALE_TIME);
        self.query(options, |api| async move { api.experiences().await })
            .await
    }

    pub async fn exams_taken(&self) -> QueryState<Vec<TakenExam>> {
        let Some(session) = self.session() else {
            return self.signed_out(Entity::ExamsTaken);
        };
        let options = QueryOptions::new(keys::exams_taken(session.user_id))
            .with_stale_time(EXPERIENCE_STALE_TIME);
        self.query(options, |api| async move { api.exams_taken().await })
            .await
    }

    /// Exams taken that have no experience yet.
    ///
    /// Exams whose id appears as `exam_id` in the user's experience list are
    /// excluded. Until both lists are available the state carries no data.
    pub async fn exams_pending_review(&self) -> QueryState<Vec<TakenExam>> {
        let taken = self.exams_taken().await;
        if taken.data().is_none() {
            return taken;
        }
        let experiences = self.experiences().await;
        let Some(reviewed) = experiences.data().map(|list| reviewed_exam_ids(list)) else {
            return experiences.map(|_| Vec::new());
        };
        taken.map(|exams| pending_review(exams, &reviewed))
    }

    pub async fn subject_experiences(&self, subject_code: &str) -> QueryState<Vec<Experience>> {
        let code = subject_code.to_string();
        let options = QueryOptions::new(keys::subject_experiences(subject_code))
            .with_stale_time(EXPERIENCE_STALE_TIME)
            .enabled(!subject_code.trim().is_empty());
        self.query(options, move |api| {
            let code = code.clone();
            async move { api.subject_experiences(&code).await }
        })
        .await
    }

    pub async fn create_experience(&self, experience: NewExperience) -> MutationOutcome<Experience> {
        experience.validate()?;
        let session = self.require_session()?;
        let api = self.api.clone();
        let options = experience_cascade("create_experience", session.user_id, &experience.subject_code);
        self.run_mutation(
            options,
            async move { api.create_experience(&experience).await },
            |_| Notification::success("Experience saved"),
            "Could not save the experience",
        )
        .await
    }

    pub async fn delete_experience(&self, experience: &Experience) -> MutationOutcome<()> {
        let session = self.require_session()?;
        let api = self.api.clone();
        let id = experience.id;
        let options = experience_cascade("delete_experience", session.user_id, &experience.subject_code);
        self.run_mutation(
            options,
            async move { api.delete_experience(id).await },
            |_| Notification::success("Experience deleted"),
            "Could not delete the experience",
        )
        .await
    }
}

fn experience_cascade(name: &'static str, user: UserId, subject_code: &str) -> MutationOptions {
    MutationOptions::new(name)
        .invalidates(keys::experiences(user))
        .invalidates(keys::exams_taken(user))
        .invalidates(keys::subject_experiences(subject_code))
}

fn reviewed_exam_ids(experiences: &[Experience]) -> HashSet<i64> {
    experiences.iter().map(|e| e.exam_id).collect()
}

pub(crate) fn pending_review(exams: Vec<TakenExam>, reviewed: &HashSet<i64>) -> Vec<TakenExam> {
    exams
        .into_iter()
        .filter(|exam| !reviewed.contains(&exam.id))
        .collect()
}
