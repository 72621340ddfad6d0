//! Remote access layer: one async function per backend endpoint.
//!
//! Functions here map a request to a response and nothing else. Caching,
//! retry and notifications belong to the hooks.

use std::sync::Arc;

use async_trait::async_trait;
use aula_core::{
    AcademicHistory, DocumentUpload, Enrollment, EnrollmentRequest, ExamRegistration,
    ExamRegistrationRequest, ExamSession, Experience, HistoryUploadSummary, NewExperience, Plan,
    PlanUploadSummary, Recommendation, RemoteError, StatisticsReport, Subject, TakenExam,
};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::auth::AuthProvider;
use crate::config::AulaConfig;
use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// A single document sent as the `file` part of a multipart form.
    Multipart(DocumentUpload),
}

/// Transport-neutral description of one backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, RequestBody::Empty)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, RequestBody::Empty)
    }

    pub fn post_json<B: Serialize + ?Sized>(path: impl Into<String>, body: &B) -> Result<Self, RemoteError> {
        let value = serde_json::to_value(body)
            .map_err(|e| RemoteError::InvalidRequest(e.to_string()))?;
        Ok(Self::new(Method::POST, path, RequestBody::Json(value)))
    }

    pub fn post_multipart(path: impl Into<String>, upload: DocumentUpload) -> Self {
        Self::new(Method::POST, path, RequestBody::Multipart(upload))
    }

    pub fn with_query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }

    fn new(method: Method, path: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }
}

/// Sends one request and returns the decoded JSON body.
///
/// Empty success bodies (204) come back as `Value::Null`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Value, RemoteError>;
}

/// HTTP transport over `reqwest`.
#[derive(Clone)]
pub struct RestTransport {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl RestTransport {
    pub fn new(config: &AulaConfig, auth: Arc<dyn AuthProvider>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for RestTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, RemoteError> {
        let ApiRequest {
            method,
            path,
            query,
            body,
        } = request;
        debug!(method = %method, path = %path, "sending request");

        let mut builder = self.client.request(method, self.url(&path));
        // No token: the request goes out unauthenticated and the backend decides.
        if let Some(token) = self.auth.access_token() {
            builder = builder.bearer_auth(token);
        }
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(upload) => builder.multipart(document_form(upload)?),
        };

        let response = builder.send().await.map_err(network_error)?;
        parse_response(response).await
    }
}

async fn parse_response(response: reqwest::Response) -> Result<Value, RemoteError> {
    let status = response.status();
    let text = response.text().await.map_err(network_error)?;
    if status.is_success() {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&text).map_err(RemoteError::from);
    }
    Err(RemoteError::from_response(status.as_u16(), &text))
}

fn document_form(upload: DocumentUpload) -> Result<Form, RemoteError> {
    let part = Part::bytes(upload.bytes)
        .file_name(upload.file_name)
        .mime_str(&upload.content_type)
        .map_err(|e| RemoteError::InvalidRequest(e.to_string()))?;
    Ok(Form::new().part("file", part))
}

fn network_error(err: reqwest::Error) -> RemoteError {
    RemoteError::Network(err.to_string())
}

pub const HISTORY_PATH: &str = "/api/shared/historia-academica";
pub const RECOMMENDATIONS_PATH: &str = "/api/shared/recomendaciones";
pub const EXAM_SESSIONS_PATH: &str = "/api/shared/finales";
pub const EXAM_REGISTRATIONS_PATH: &str = "/api/shared/finales/inscripciones";
pub const AVAILABLE_SUBJECTS_PATH: &str = "/api/shared/inscripciones/materias-disponibles";
pub const ENROLLMENTS_PATH: &str = "/api/shared/inscripciones";
pub const EXPERIENCES_PATH: &str = "/api/shared/experiencias";
pub const EXAMS_TAKEN_PATH: &str = "/api/shared/experiencias/examenes";
pub const STATISTICS_PATH: &str = "/api/shared/estadisticas";
pub const PLANS_PATH: &str = "/api/shared/planes";
pub const ADMIN_PLANS_PATH: &str = "/api/admin/planes";
pub const ADMIN_STATISTICS_PATH: &str = "/api/admin/estadisticas";

/// Typed backend API. Cheap to clone.
#[derive(Clone)]
pub struct AulaApi {
    transport: Arc<dyn Transport>,
}

impl AulaApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, RemoteError> {
        let value = self.transport.send(request).await?;
        serde_json::from_value(value).map_err(RemoteError::from)
    }

    /// For endpoints whose success body carries nothing the client reads.
    async fn call_discarding(&self, request: ApiRequest) -> Result<(), RemoteError> {
        self.transport.send(request).await.map(|_| ())
    }

    // === Academic history ===

    pub async fn academic_history(&self) -> Result<AcademicHistory, RemoteError> {
        self.call(ApiRequest::get(HISTORY_PATH)).await
    }

    pub async fn upload_academic_history(
        &self,
        upload: DocumentUpload,
    ) -> Result<HistoryUploadSummary, RemoteError> {
        self.call(ApiRequest::post_multipart(HISTORY_PATH, upload)).await
    }

    pub async fn delete_academic_history(&self) -> Result<(), RemoteError> {
        self.call_discarding(ApiRequest::delete(HISTORY_PATH)).await
    }

    pub async fn recommendations(&self) -> Result<Vec<Recommendation>, RemoteError> {
        self.call(ApiRequest::get(RECOMMENDATIONS_PATH)).await
    }

    // === Exam sessions ===

    pub async fn exam_sessions(&self) -> Result<Vec<ExamSession>, RemoteError> {
        self.call(ApiRequest::get(EXAM_SESSIONS_PATH)).await
    }

    pub async fn exam_registrations(&self) -> Result<Vec<ExamRegistration>, RemoteError> {
        self.call(ApiRequest::get(EXAM_REGISTRATIONS_PATH)).await
    }

    pub async fn register_for_exam(
        &self,
        request: &ExamRegistrationRequest,
    ) -> Result<ExamRegistration, RemoteError> {
        self.call(ApiRequest::post_json(EXAM_REGISTRATIONS_PATH, request)?)
            .await
    }

    pub async fn cancel_exam_registration(&self, registration_id: i64) -> Result<(), RemoteError> {
        let path = format!("{}/{}", EXAM_REGISTRATIONS_PATH, registration_id);
        self.call_discarding(ApiRequest::delete(path)).await
    }

    // === Enrollments ===

    pub async fn available_subjects(&self) -> Result<Vec<Subject>, RemoteError> {
        self.call(ApiRequest::get(AVAILABLE_SUBJECTS_PATH)).await
    }

    pub async fn enrollments(&self) -> Result<Vec<Enrollment>, RemoteError> {
        self.call(ApiRequest::get(ENROLLMENTS_PATH)).await
    }

    pub async fn enroll(&self, request: &EnrollmentRequest) -> Result<Enrollment, RemoteError> {
        self.call(ApiRequest::post_json(ENROLLMENTS_PATH, request)?)
            .await
    }

    pub async fn unenroll(&self, enrollment_id: i64) -> Result<(), RemoteError> {
        let path = format!("{}/{}", ENROLLMENTS_PATH, enrollment_id);
        self.call_discarding(ApiRequest::delete(path)).await
    }

    // === Experiences ===

    pub async fn experiences(&self) -> Result<Vec<Experience>, RemoteError> {
        self.call(ApiRequest::get(EXPERIENCES_PATH)).await
    }

    pub async fn subject_experiences(&self, subject_code: &str) -> Result<Vec<Experience>, RemoteError> {
        let path = format!("{}/materias/{}", EXPERIENCES_PATH, subject_code);
        self.call(ApiRequest::get(path)).await
    }

    pub async fn exams_taken(&self) -> Result<Vec<TakenExam>, RemoteError> {
        self.call(ApiRequest::get(EXAMS_TAKEN_PATH)).await
    }

    pub async fn create_experience(&self, experience: &NewExperience) -> Result<Experience, RemoteError> {
        self.call(ApiRequest::post_json(EXPERIENCES_PATH, experience)?)
            .await
    }

    pub async fn delete_experience(&self, experience_id: i64) -> Result<(), RemoteError> {
        let path = format!("{}/{}", EXPERIENCES_PATH, experience_id);
        self.call_discarding(ApiRequest::delete(path)).await
    }

    // === Statistics ===

    pub async fn general_statistics(&self) -> Result<StatisticsReport, RemoteError> {
        self.call(ApiRequest::get(STATISTICS_PATH)).await
    }

    pub async fn subject_statistics(
        &self,
        subject_code: &str,
        plan_code: Option<&str>,
    ) -> Result<StatisticsReport, RemoteError> {
        let mut request = ApiRequest::get(format!("{}/materias/{}", STATISTICS_PATH, subject_code));
        if let Some(plan) = plan_code {
            request = request.with_query("plan", plan);
        }
        self.call(request).await
    }

    pub async fn admin_statistics(&self) -> Result<StatisticsReport, RemoteError> {
        self.call(ApiRequest::get(ADMIN_STATISTICS_PATH)).await
    }

    // === Study plans ===

    pub async fn plans(&self) -> Result<Vec<Plan>, RemoteError> {
        self.call(ApiRequest::get(PLANS_PATH)).await
    }

    pub async fn plan_subjects(&self, plan_code: &str) -> Result<Vec<Subject>, RemoteError> {
        let path = format!("{}/{}/materias", PLANS_PATH, plan_code);
        self.call(ApiRequest::get(path)).await
    }

    pub async fn upload_plan(&self, upload: DocumentUpload) -> Result<PlanUploadSummary, RemoteError> {
        self.call(ApiRequest::post_multipart(ADMIN_PLANS_PATH, upload)).await
    }

    pub async fn delete_plan(&self, plan_code: &str) -> Result<(), RemoteError> {
        let path = format!("{}/{}", ADMIN_PLANS_PATH, plan_code);
        self.call_discarding(ApiRequest::delete(path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct Recorder {
        requests: Mutex<Vec<ApiRequest>>,
        reply: Value,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, request: ApiRequest) -> Result<Value, RemoteError> {
            self.requests.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    fn api(reply: Value) -> (AulaApi, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            requests: Mutex::new(Vec::new()),
            reply,
        });
        (AulaApi::new(recorder.clone()), recorder)
    }

    #[tokio::test]
    async fn test_subject_statistics_sends_plan_query() {
        let (api, recorder) = api(json!({"aprobados": 10}));
        let report = api.subject_statistics("AM1", Some("K2023")).await.unwrap();
        assert_eq!(report.get("aprobados"), Some(&json!(10)));

        let requests = recorder.requests.lock().unwrap();
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].path, "/api/shared/estadisticas/materias/AM1");
        assert_eq!(requests[0].query, vec![("plan".to_string(), "K2023".to_string())]);
    }

    #[tokio::test]
    async fn test_enroll_posts_json_body() {
        let (api, recorder) = api(json!({"id": 7, "codigo_materia": "AM1"}));
        let enrollment = api.enroll(&EnrollmentRequest::new("AM1")).await.unwrap();
        assert_eq!(enrollment.id, 7);

        let requests = recorder.requests.lock().unwrap();
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].body, RequestBody::Json(json!({"codigo_materia": "AM1"})));
    }

    #[tokio::test]
    async fn test_delete_ignores_response_body() {
        let (api, recorder) = api(json!({"ok": true}));
        api.delete_plan("K2023").await.unwrap();
        api.cancel_exam_registration(4).await.unwrap();

        let requests = recorder.requests.lock().unwrap();
        assert_eq!(requests[0].path, "/api/admin/planes/K2023");
        assert_eq!(requests[1].path, "/api/shared/finales/inscripciones/4");
        assert!(requests.iter().all(|r| r.method == Method::DELETE));
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_decode_error() {
        let (api, _) = api(json!({"not": "a list"}));
        let err = api.plans().await.unwrap_err();
        assert_eq!(err.kind(), aula_core::ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_upload_uses_multipart_body() {
        let (api, recorder) = api(json!({"codigo": "K2023", "nombre": "Plan 2023", "cantidad_materias": 41}));
        let upload = DocumentUpload::new("plan.pdf", "application/pdf", vec![1, 2, 3]);
        let summary = api.upload_plan(upload.clone()).await.unwrap();
        assert_eq!(summary.subject_count, 41);

        let requests = recorder.requests.lock().unwrap();
        assert_eq!(requests[0].path, ADMIN_PLANS_PATH);
        assert_eq!(requests[0].body, RequestBody::Multipart(upload));
    }
}
