use aula_cache::QueryStatus;
use aula_client::api_client::{
    ADMIN_PLANS_PATH, ADMIN_STATISTICS_PATH, AVAILABLE_SUBJECTS_PATH, ENROLLMENTS_PATH,
    EXAMS_TAKEN_PATH, EXAM_REGISTRATIONS_PATH, EXAM_SESSIONS_PATH, EXPERIENCES_PATH, HISTORY_PATH,
    PLANS_PATH,
};
use aula_client::hooks::GENERIC_FALLBACK;
use aula_client::{AuthEvent, AuthProvider, MutationFailure, NotificationLevel};
use aula_core::{
    keys, DocumentUpload, EnrollmentRequest, ExamRegistrationRequest, NewExperience, UserId,
    UserSession,
};
use aula_test_utils::{fixtures, Harness};
use reqwest::Method;
use serde_json::json;

fn new_experience(exam_id: i64, subject_code: &str) -> NewExperience {
    NewExperience {
        exam_id,
        subject_code: subject_code.to_string(),
        difficulty: 4,
        study_hours: Some(20),
        comment: None,
    }
}

fn invalidated(h: &Harness, key: &aula_core::QueryKey) -> bool {
    h.context
        .queries()
        .entry(key)
        .is_some_and(|entry| entry.invalidated)
}

// ============================================================================
// INVALIDATION CASCADES
// ============================================================================

#[tokio::test]
async fn test_exam_registration_invalidates_exam_keys_only() {
    let h = Harness::student();
    let user = h.user_id();
    h.transport
        .on(Method::GET, EXAM_SESSIONS_PATH, Ok(json!([])))
        .on(Method::GET, EXAM_REGISTRATIONS_PATH, Ok(json!([])))
        .on(Method::GET, ENROLLMENTS_PATH, Ok(json!([])))
        .on(
            Method::POST,
            EXAM_REGISTRATIONS_PATH,
            Ok(json!({"id": 9, "final_id": 12})),
        );

    h.context.exam_sessions().await;
    h.context.exam_registrations().await;
    h.context.enrollments().await;

    let registration = h
        .context
        .register_for_exam(ExamRegistrationRequest { exam_session_id: 12 })
        .await
        .unwrap();
    assert_eq!(registration.exam_session_id, 12);

    assert!(invalidated(&h, &keys::exam_sessions(user)));
    assert!(invalidated(&h, &keys::exam_registrations(user)));
    assert!(!invalidated(&h, &keys::enrollments(user)));
    assert_eq!(h.sink.levels(), vec![NotificationLevel::Success]);
}

#[tokio::test]
async fn test_unenroll_invalidates_subjects_and_enrollments() {
    let h = Harness::student();
    let user = h.user_id();
    h.transport
        .on(Method::GET, AVAILABLE_SUBJECTS_PATH, Ok(fixtures::subjects(&["AM1"])))
        .on(Method::GET, ENROLLMENTS_PATH, Ok(json!([fixtures::enrollment(3, "AL")])))
        .on(Method::GET, HISTORY_PATH, Ok(fixtures::history(&["AL"])))
        .on(Method::DELETE, &format!("{}/3", ENROLLMENTS_PATH), Ok(serde_json::Value::Null));

    h.context.available_subjects().await;
    h.context.enrollments().await;
    h.context.academic_history().await;

    h.context.unenroll(3).await.unwrap();

    assert!(invalidated(&h, &keys::available_subjects(user)));
    assert!(invalidated(&h, &keys::enrollments(user)));
    assert!(!invalidated(&h, &keys::academic_history(user)));
}

#[tokio::test]
async fn test_history_delete_invalidates_recommendations_and_subjects() {
    let h = Harness::student();
    let user = h.user_id();
    h.transport
        .on(Method::GET, HISTORY_PATH, Ok(fixtures::history(&["AM1"])))
        .on(Method::GET, AVAILABLE_SUBJECTS_PATH, Ok(fixtures::subjects(&["AM2"])))
        .on(
            Method::GET,
            aula_client::api_client::RECOMMENDATIONS_PATH,
            Ok(fixtures::recommendations(&["AM2"])),
        )
        .on(Method::DELETE, HISTORY_PATH, Ok(serde_json::Value::Null));

    h.context.academic_history().await;
    h.context.available_subjects().await;
    assert!(h.context.recommendations().await.is_success());

    h.context.delete_academic_history().await.unwrap();

    assert!(invalidated(&h, &keys::academic_history(user)));
    assert!(invalidated(&h, &keys::recommendations(user)));
    assert!(invalidated(&h, &keys::available_subjects(user)));
}

#[tokio::test]
async fn test_plan_delete_invalidates_plans_and_its_subjects() {
    let h = Harness::admin();
    h.transport
        .on(Method::GET, PLANS_PATH, Ok(fixtures::plans(&["K2008", "K2023"])))
        .on(Method::GET, &format!("{}/K2008/materias", PLANS_PATH), Ok(fixtures::subjects(&["AM1"])))
        .on(Method::GET, &format!("{}/K2023/materias", PLANS_PATH), Ok(fixtures::subjects(&["AL"])))
        .on(Method::DELETE, &format!("{}/K2008", ADMIN_PLANS_PATH), Ok(serde_json::Value::Null));

    h.context.plans().await;
    h.context.plan_subjects("K2008").await;
    h.context.plan_subjects("K2023").await;

    h.context.delete_plan("K2008").await.unwrap();

    assert!(invalidated(&h, &keys::plans()));
    assert!(invalidated(&h, &keys::plan_subjects("K2008")));
    assert!(!invalidated(&h, &keys::plan_subjects("K2023")));
}

// ============================================================================
// VALIDATION AND ROLES
// ============================================================================

#[tokio::test]
async fn test_invalid_input_sends_nothing_and_notifies_nobody() {
    let h = Harness::student();

    let blank = h.context.enroll(EnrollmentRequest::new("   ")).await;
    assert!(matches!(blank, Err(MutationFailure::Invalid(ref e)) if e.field == "codigo_materia"));

    let wrong_type = h
        .context
        .upload_academic_history(DocumentUpload::new("historia.png", "image/png", vec![1; 8]))
        .await;
    assert!(matches!(wrong_type, Err(MutationFailure::Invalid(_))));

    let mut too_hard = new_experience(4, "AM1");
    too_hard.difficulty = 9;
    let experience = h.context.create_experience(too_hard).await;
    assert!(matches!(experience, Err(MutationFailure::Invalid(ref e)) if e.field == "dificultad"));

    let exam = h
        .context
        .register_for_exam(ExamRegistrationRequest { exam_session_id: 0 })
        .await;
    assert!(matches!(exam, Err(MutationFailure::Invalid(_))));

    assert_eq!(h.transport.total_calls(), 0);
    assert!(h.sink.notifications().is_empty());
}

#[tokio::test]
async fn test_students_cannot_upload_plans() {
    let h = Harness::student();
    let result = h
        .context
        .upload_plan(DocumentUpload::new("plan.csv", "text/csv", vec![1; 4]))
        .await;
    assert!(matches!(result, Err(MutationFailure::Invalid(ref e)) if e.field == "role"));
    assert_eq!(h.transport.call_count(&Method::POST, ADMIN_PLANS_PATH), 0);
}

#[tokio::test]
async fn test_admin_statistics_disabled_for_students() {
    let student = Harness::student();
    let state = student.context.admin_statistics().await;
    assert!(!state.is_enabled());
    assert_eq!(student.transport.call_count(&Method::GET, ADMIN_STATISTICS_PATH), 0);

    let admin = Harness::admin();
    admin
        .transport
        .on(Method::GET, ADMIN_STATISTICS_PATH, Ok(json!({"usuarios": 120})));
    let state = admin.context.admin_statistics().await;
    assert!(state.is_success());
    assert_eq!(state.data().unwrap().get("usuarios"), Some(&json!(120)));
}

#[tokio::test]
async fn test_signed_out_reads_are_idle_and_silent() {
    let h = Harness::new(None);

    let history = h.context.academic_history().await;
    assert_eq!(history.status(), QueryStatus::Idle);
    assert!(!history.is_enabled());
    assert!(!h.context.enrollments().await.is_enabled());
    assert!(!h.context.recommendations().await.is_enabled());

    let write = h.context.enroll(EnrollmentRequest::new("AM1")).await;
    assert!(matches!(write, Err(MutationFailure::NoSession)));
    assert_eq!(h.transport.total_calls(), 0);
}

// ============================================================================
// FAILURES
// ============================================================================

#[tokio::test]
async fn test_server_error_is_not_retried_and_carries_backend_message() {
    let h = Harness::student();
    h.transport.on(
        Method::POST,
        ENROLLMENTS_PATH,
        Err(fixtures::status(503, "Sistema en mantenimiento")),
    );

    let failure = h.context.enroll(EnrollmentRequest::new("AM1")).await.unwrap_err();
    assert!(!failure.is_conflict());
    assert_eq!(h.transport.call_count(&Method::POST, ENROLLMENTS_PATH), 1);

    let notification = h.sink.last().unwrap();
    assert_eq!(notification.level, NotificationLevel::Error);
    assert_eq!(notification.message, "Could not enroll");
    assert_eq!(notification.description.as_deref(), Some("Sistema en mantenimiento"));
}

#[tokio::test]
async fn test_network_failure_uses_generic_description() {
    let h = Harness::student();
    h.transport.on(
        Method::DELETE,
        &format!("{}/5", EXPERIENCES_PATH),
        Err(aula_core::RemoteError::Network("connection reset".into())),
    );
    let experience = serde_json::from_value(fixtures::experience(5, 2, "AM1")).unwrap();

    h.context.delete_experience(&experience).await.unwrap_err();

    let notification = h.sink.last().unwrap();
    assert_eq!(notification.level, NotificationLevel::Error);
    assert_eq!(notification.description.as_deref(), Some(GENERIC_FALLBACK));
}

#[tokio::test]
async fn test_unauthorized_read_expires_the_session() {
    let h = Harness::student();
    let mut events = h.auth.subscribe();
    h.transport
        .on(Method::GET, ENROLLMENTS_PATH, Err(fixtures::status(401, "token vencido")));

    let state = h.context.enrollments().await;
    assert!(state.is_error());
    assert_eq!(h.transport.call_count(&Method::GET, ENROLLMENTS_PATH), 1);
    assert!(h.auth.access_token().is_none());
    assert_eq!(events.try_recv().unwrap(), AuthEvent::SessionExpired);
}

#[tokio::test]
async fn test_cached_unauthorized_error_is_reported_once() {
    let h = Harness::student();
    let user = h.user_id();
    let mut events = h.auth.subscribe();
    h.transport
        .on(Method::GET, HISTORY_PATH, Ok(fixtures::history(&["AM1"])))
        .on(
            Method::GET,
            aula_client::api_client::RECOMMENDATIONS_PATH,
            Err(fixtures::status(401, "token vencido")),
        );

    h.context.academic_history().await;
    assert!(h.context.recommendations().await.is_error());
    assert_eq!(events.try_recv().unwrap(), AuthEvent::SessionExpired);

    // Disabled now, so the read only echoes the cached 401.
    h.context
        .queries()
        .invalidate(&keys::academic_history(user))
        .await;
    let echoed = h.context.recommendations().await;
    assert!(!echoed.is_enabled());
    assert!(echoed.is_error());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_retry_reissues_a_failed_read() {
    let h = Harness::student();
    let user = h.user_id();
    h.transport
        .once(Method::GET, EXAM_SESSIONS_PATH, Err(fixtures::status(500, "timeout")))
        .on(
            Method::GET,
            EXAM_SESSIONS_PATH,
            Ok(json!([{"id": 1, "codigo_materia": "AM1", "fecha": "2024-12-10"}])),
        );

    let failed = h.context.exam_sessions().await;
    assert!(failed.is_error());

    let key = keys::exam_sessions(user);
    assert!(h.context.retry(&key).await);
    let sessions = h
        .context
        .queries()
        .get_query_data::<Vec<aula_core::ExamSession>>(&key)
        .unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(h.transport.call_count(&Method::GET, EXAM_SESSIONS_PATH), 2);

    assert!(!h.context.retry(&keys::plans()).await);
}

// ============================================================================
// EXPERIENCES
// ============================================================================

#[tokio::test]
async fn test_pending_review_drops_exams_once_reviewed() {
    let h = Harness::student();
    let user = h.user_id();
    h.transport
        .on(Method::GET, EXAMS_TAKEN_PATH, Ok(fixtures::taken_exams(&[1, 2, 3])))
        .on(Method::GET, EXPERIENCES_PATH, Ok(json!([fixtures::experience(10, 2, "M2")])))
        .on(Method::POST, EXPERIENCES_PATH, Ok(fixtures::experience(11, 1, "M1")));

    let pending = h.context.exams_pending_review().await;
    let ids: Vec<i64> = pending.data().unwrap().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 3]);

    let created = h.context.create_experience(new_experience(1, "M1")).await.unwrap();
    assert_eq!(created.exam_id, 1);
    assert!(invalidated(&h, &keys::experiences(user)));
    assert!(invalidated(&h, &keys::exams_taken(user)));

    h.transport.on(
        Method::GET,
        EXPERIENCES_PATH,
        Ok(json!([fixtures::experience(10, 2, "M2"), fixtures::experience(11, 1, "M1")])),
    );
    let pending = h.context.exams_pending_review().await;
    let ids: Vec<i64> = pending.data().unwrap().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![3]);
    assert_eq!(h.transport.call_count(&Method::GET, EXPERIENCES_PATH), 2);
}

#[tokio::test]
async fn test_pending_review_without_experiences_has_no_data() {
    let h = Harness::student();
    h.transport
        .on(Method::GET, EXAMS_TAKEN_PATH, Ok(fixtures::taken_exams(&[1])))
        .on(Method::GET, EXPERIENCES_PATH, Err(fixtures::status(500, "boom")));

    let pending = h.context.exams_pending_review().await;
    assert!(pending.data().is_none());
    assert!(pending.is_error());
}

#[tokio::test]
async fn test_subject_experiences_blank_code_is_disabled() {
    let h = Harness::student();
    let state = h.context.subject_experiences(" ").await;
    assert!(!state.is_enabled());
    assert_eq!(h.transport.total_calls(), 0);
}

// ============================================================================
// SESSION CHANGES
// ============================================================================

#[tokio::test]
async fn test_sign_in_as_another_user_clears_cache() {
    let h = Harness::student();
    let user = h.user_id();
    h.transport.on(Method::GET, PLANS_PATH, Ok(fixtures::plans(&["K2023"])));
    h.context.plans().await;

    let same = UserSession::student(user);
    h.auth.sign_in(same.clone(), Some("fresh".into()));
    h.context.handle_auth_event(&AuthEvent::SignedIn(same));
    assert_eq!(h.context.queries().len(), 1);

    let other = UserSession::student(UserId::new(uuid::Uuid::now_v7()));
    h.auth.sign_in(other.clone(), Some("other".into()));
    h.context.handle_auth_event(&AuthEvent::SignedIn(other));
    assert!(h.context.queries().is_empty());
}

#[tokio::test]
async fn test_token_refresh_keeps_cache() {
    let h = Harness::student();
    h.transport.on(Method::GET, PLANS_PATH, Ok(fixtures::plans(&["K2023"])));
    h.context.plans().await;

    h.auth.refresh_token("rotated".into());
    h.context.handle_auth_event(&AuthEvent::TokenRefreshed);

    assert_eq!(h.context.queries().len(), 1);
    assert_eq!(h.auth.access_token().as_deref(), Some("rotated"));
}
