//! Backend payload types.
//!
//! The backend owns these shapes. Each struct names the fields the client
//! reads and keeps everything else in `extra`, so unknown fields survive a
//! round trip through the cache.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

pub type JsonMap = Map<String, Value>;

// ============================================================================
// ACADEMIC HISTORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AcademicHistory {
    #[serde(rename = "materias", default)]
    pub subjects: Vec<HistoryEntry>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl AcademicHistory {
    /// A history with no subjects counts as "not uploaded".
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "codigo")]
    pub subject_code: String,
    #[serde(rename = "nombre")]
    pub subject_name: String,
    #[serde(rename = "estado", default)]
    pub status: Option<String>,
    #[serde(rename = "nota", default)]
    pub grade: Option<f64>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryUploadSummary {
    #[serde(rename = "materias_cargadas")]
    pub subjects_loaded: u32,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// A document selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Shared checks for every uploaded document.
    pub fn validate(&self, accepted_types: &[&str]) -> Result<(), ValidationError> {
        if self.file_name.trim().is_empty() {
            return Err(ValidationError::new("file_name", "must not be empty"));
        }
        if self.bytes.is_empty() {
            return Err(ValidationError::new("file", "must not be empty"));
        }
        if !accepted_types
            .iter()
            .any(|accepted| self.content_type.eq_ignore_ascii_case(accepted))
        {
            return Err(ValidationError::new(
                "content_type",
                format!("expected one of {}", accepted_types.join(", ")),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// RECOMMENDATIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "codigo")]
    pub subject_code: String,
    #[serde(rename = "nombre")]
    pub subject_name: String,
    #[serde(rename = "puntaje", default)]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

// ============================================================================
// EXAM SESSIONS (FINALES)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: i64,
    #[serde(rename = "codigo_materia")]
    pub subject_code: String,
    #[serde(rename = "nombre_materia", default)]
    pub subject_name: Option<String>,
    #[serde(rename = "fecha", default)]
    pub date: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamRegistration {
    pub id: i64,
    #[serde(rename = "final_id")]
    pub exam_session_id: i64,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamRegistrationRequest {
    #[serde(rename = "final_id")]
    pub exam_session_id: i64,
}

impl ExamRegistrationRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.exam_session_id <= 0 {
            return Err(ValidationError::new("final_id", "must be a positive id"));
        }
        Ok(())
    }
}

// ============================================================================
// SUBJECTS AND ENROLLMENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    #[serde(rename = "codigo_materia")]
    pub subject_code: String,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    #[serde(rename = "codigo_materia")]
    pub subject_code: String,
}

impl EnrollmentRequest {
    pub fn new(subject_code: impl Into<String>) -> Self {
        Self {
            subject_code: subject_code.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.subject_code.trim().is_empty() {
            return Err(ValidationError::new("codigo_materia", "must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// EXPERIENCES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub id: i64,
    #[serde(rename = "examen_id")]
    pub exam_id: i64,
    #[serde(rename = "codigo_materia")]
    pub subject_code: String,
    #[serde(rename = "dificultad", default)]
    pub difficulty: Option<u8>,
    #[serde(rename = "comentario", default)]
    pub comment: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// An exam the student has taken and may write an experience about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakenExam {
    pub id: i64,
    #[serde(rename = "codigo_materia")]
    pub subject_code: String,
    #[serde(rename = "nombre_materia", default)]
    pub subject_name: Option<String>,
    #[serde(rename = "fecha", default)]
    pub date: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExperience {
    #[serde(rename = "examen_id")]
    pub exam_id: i64,
    #[serde(rename = "codigo_materia")]
    pub subject_code: String,
    #[serde(rename = "dificultad")]
    pub difficulty: u8,
    #[serde(rename = "horas_estudio", default)]
    pub study_hours: Option<u32>,
    #[serde(rename = "comentario", default)]
    pub comment: Option<String>,
}

impl NewExperience {
    pub const MAX_COMMENT_CHARS: usize = 2_000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.exam_id <= 0 {
            return Err(ValidationError::new("examen_id", "must be a positive id"));
        }
        if self.subject_code.trim().is_empty() {
            return Err(ValidationError::new("codigo_materia", "must not be empty"));
        }
        if !(1..=5).contains(&self.difficulty) {
            return Err(ValidationError::new("dificultad", "must be between 1 and 5"));
        }
        if let Some(comment) = &self.comment {
            if comment.chars().count() > Self::MAX_COMMENT_CHARS {
                return Err(ValidationError::new(
                    "comentario",
                    format!("must be at most {} characters", Self::MAX_COMMENT_CHARS),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// STUDY PLANS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "anio", default)]
    pub year: Option<i32>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanUploadSummary {
    #[serde(rename = "codigo")]
    pub plan_code: String,
    #[serde(rename = "nombre")]
    pub plan_name: String,
    #[serde(rename = "cantidad_materias")]
    pub subject_count: u32,
    #[serde(flatten)]
    pub extra: JsonMap,
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Aggregated statistics. The shape is computed by the backend and rendered
/// as-is, so the client keeps it opaque.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatisticsReport {
    pub fields: JsonMap,
}

impl StatisticsReport {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}
