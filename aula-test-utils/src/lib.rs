//! Aula Test Utilities
//!
//! Test doubles and fixtures shared by the workspace's integration tests:
//!
//! - [`MockTransport`]: scripted backend with call recording and delays
//! - [`RecordingSink`]: notification sink that keeps everything it receives
//! - [`Harness`]: an [`AppContext`] wired to both, with a controllable session
//! - `fixtures`: backend payloads and sessions

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use aula_cache::{CacheConfig, QueryClient};
use aula_client::{
    ApiRequest, AppContext, Notification, NotificationLevel, NotificationSink, SessionAuthProvider,
    Transport, UiStore,
};
use aula_core::{RemoteError, UserId, UserSession};
use reqwest::Method;
use serde_json::Value;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

#[derive(Debug, Clone)]
struct Scripted {
    reply: Result<Value, RemoteError>,
    delay: Duration,
}

#[derive(Default)]
struct Route {
    queued: VecDeque<Scripted>,
    standing: Option<Scripted>,
}

/// Scripted backend. Routes match on method and path; the query string is
/// recorded but not matched. Unrouted requests answer 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), Route>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every request to `method path` with `reply`.
    pub fn on(&self, method: Method, path: &str, reply: Result<Value, RemoteError>) -> &Self {
        self.on_delayed(method, path, Duration::ZERO, reply)
    }

    pub fn on_delayed(
        &self,
        method: Method,
        path: &str,
        delay: Duration,
        reply: Result<Value, RemoteError>,
    ) -> &Self {
        lock(&self.routes)
            .entry((method, path.to_string()))
            .or_default()
            .standing = Some(Scripted { reply, delay });
        self
    }

    /// Answer the next request to `method path` with `reply`, ahead of any
    /// standing reply.
    pub fn once(&self, method: Method, path: &str, reply: Result<Value, RemoteError>) -> &Self {
        self.once_delayed(method, path, Duration::ZERO, reply)
    }

    pub fn once_delayed(
        &self,
        method: Method,
        path: &str,
        delay: Duration,
        reply: Result<Value, RemoteError>,
    ) -> &Self {
        lock(&self.routes)
            .entry((method, path.to_string()))
            .or_default()
            .queued
            .push_back(Scripted { reply, delay });
        self
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, method: &Method, path: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|r| &r.method == method && r.path == path)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    fn next_reply(&self, request: &ApiRequest) -> Scripted {
        let mut routes = lock(&self.routes);
        let route = routes.get_mut(&(request.method.clone(), request.path.clone()));
        match route {
            Some(route) => route
                .queued
                .pop_front()
                .or_else(|| route.standing.clone())
                .unwrap_or_else(|| not_found(request)),
            None => not_found(request),
        }
    }
}

fn not_found(request: &ApiRequest) -> Scripted {
    Scripted {
        reply: Err(RemoteError::Status {
            status: 404,
            message: Some(format!("no mock route for {} {}", request.method, request.path)),
        }),
        delay: Duration::ZERO,
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, RemoteError> {
        let scripted = self.next_reply(&request);
        lock(&self.calls).push(request);
        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }
        scripted.reply
    }
}

// ============================================================================
// RECORDING SINK
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    received: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.received).clone()
    }

    pub fn levels(&self) -> Vec<NotificationLevel> {
        lock(&self.received).iter().map(|n| n.level).collect()
    }

    pub fn last(&self) -> Option<Notification> {
        lock(&self.received).last().cloned()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        lock(&self.received).push(notification);
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// An application context wired to test doubles.
pub struct Harness {
    pub context: Arc<AppContext>,
    pub transport: Arc<MockTransport>,
    pub sink: Arc<RecordingSink>,
    pub auth: Arc<SessionAuthProvider>,
}

impl Harness {
    /// In-memory preferences; retries disabled so failures surface at once.
    pub fn new(session: Option<UserSession>) -> Self {
        Self::with_store(session, UiStore::in_memory())
    }

    pub fn with_store(session: Option<UserSession>, ui: UiStore) -> Self {
        let transport = MockTransport::new();
        let sink = RecordingSink::new();
        let auth = Arc::new(match session {
            Some(session) => SessionAuthProvider::new(session, Some("test-token".to_string())),
            None => SessionAuthProvider::signed_out(),
        });
        let queries = QueryClient::new(
            CacheConfig::new().with_read_retry(aula_cache::RetryPolicy::never()),
        );
        let context = AppContext::new(queries, transport.clone(), ui, sink.clone(), auth.clone());
        Self {
            context,
            transport,
            sink,
            auth,
        }
    }

    pub fn student() -> Self {
        Self::new(Some(fixtures::student_session()))
    }

    pub fn admin() -> Self {
        Self::new(Some(fixtures::admin_session()))
    }

    /// Id of the signed-in user. Panics when signed out.
    pub fn user_id(&self) -> UserId {
        match self.context.session() {
            Some(session) => session.user_id,
            None => panic!("harness has no signed-in user"),
        }
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use aula_core::{RemoteError, UserId, UserSession};
    use serde_json::{json, Value};

    pub fn student_session() -> UserSession {
        UserSession::student(UserId::new(uuid::Uuid::now_v7()))
    }

    pub fn admin_session() -> UserSession {
        UserSession::admin(UserId::new(uuid::Uuid::now_v7()))
    }

    pub fn status(code: u16, message: &str) -> RemoteError {
        RemoteError::from_response(code, &json!({ "message": message }).to_string())
    }

    pub fn history(subject_codes: &[&str]) -> Value {
        let materias: Vec<Value> = subject_codes
            .iter()
            .map(|code| json!({"codigo": code, "nombre": format!("Materia {}", code), "estado": "aprobada", "nota": 8}))
            .collect();
        json!({ "materias": materias })
    }

    pub fn subjects(codes: &[&str]) -> Value {
        Value::Array(
            codes
                .iter()
                .map(|code| json!({"codigo": code, "nombre": format!("Materia {}", code)}))
                .collect(),
        )
    }

    pub fn enrollment(id: i64, subject_code: &str) -> Value {
        json!({"id": id, "codigo_materia": subject_code})
    }

    pub fn recommendations(codes: &[&str]) -> Value {
        Value::Array(
            codes
                .iter()
                .enumerate()
                .map(|(i, code)| json!({"codigo": code, "nombre": format!("Materia {}", code), "puntaje": 1.0 - i as f64 * 0.1}))
                .collect(),
        )
    }

    pub fn plans(codes: &[&str]) -> Value {
        Value::Array(
            codes
                .iter()
                .map(|code| json!({"codigo": code, "nombre": format!("Plan {}", code), "anio": 2023}))
                .collect(),
        )
    }

    pub fn plan_upload(code: &str, name: &str, subject_count: u32) -> Value {
        json!({"codigo": code, "nombre": name, "cantidad_materias": subject_count})
    }

    pub fn taken_exams(ids: &[i64]) -> Value {
        Value::Array(
            ids.iter()
                .map(|id| json!({"id": id, "codigo_materia": format!("M{}", id), "fecha": "2024-07-01"}))
                .collect(),
        )
    }

    pub fn experience(id: i64, exam_id: i64, subject_code: &str) -> Value {
        json!({"id": id, "examen_id": exam_id, "codigo_materia": subject_code, "dificultad": 3})
    }
}
