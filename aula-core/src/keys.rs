//! Query key registry.
//!
//! Every cached read is addressed by a `QueryKey`: an ordered sequence of
//! segments laid out as `[domain, entity, ...params]`. Keys for one entity
//! always share the `[domain, entity]` prefix, so a prefix addresses the whole
//! family for bulk invalidation.
//!
//! Parameter order is fixed per entity. Optional parameters are only ever
//! appended at the tail, never skipped in the middle of the sequence.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::UserId;

/// One segment of a query key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
    Int(i64),
    Str(String),
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Int(value) => write!(f, "{}", value),
            KeySegment::Str(value) => write!(f, "{:?}", value),
        }
    }
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        KeySegment::Str(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        KeySegment::Str(value)
    }
}

impl From<i64> for KeySegment {
    fn from(value: i64) -> Self {
        KeySegment::Int(value)
    }
}

impl From<i32> for KeySegment {
    fn from(value: i32) -> Self {
        KeySegment::Int(i64::from(value))
    }
}

impl From<u32> for KeySegment {
    fn from(value: u32) -> Self {
        KeySegment::Int(i64::from(value))
    }
}

impl From<UserId> for KeySegment {
    fn from(value: UserId) -> Self {
        KeySegment::Str(value.to_string())
    }
}

/// Top-level key namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Student,
    Admin,
    Shared,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Student => "student",
            Domain::Admin => "admin",
            Domain::Shared => "shared",
        }
    }

    /// Prefix covering every key in this domain.
    pub fn root(self) -> QueryKey {
        QueryKey::from_segments(vec![KeySegment::from(self.as_str())])
    }
}

/// Cached entity families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    AcademicHistory,
    Recommendations,
    ExamSessions,
    ExamRegistrations,
    AvailableSubjects,
    Enrollments,
    Experiences,
    ExamsTaken,
    SubjectExperiences,
    GeneralStatistics,
    SubjectStatistics,
    Plans,
    PlanSubjects,
    AdminStatistics,
}

impl Entity {
    pub fn all() -> &'static [Entity] {
        &[
            Entity::AcademicHistory,
            Entity::Recommendations,
            Entity::ExamSessions,
            Entity::ExamRegistrations,
            Entity::AvailableSubjects,
            Entity::Enrollments,
            Entity::Experiences,
            Entity::ExamsTaken,
            Entity::SubjectExperiences,
            Entity::GeneralStatistics,
            Entity::SubjectStatistics,
            Entity::Plans,
            Entity::PlanSubjects,
            Entity::AdminStatistics,
        ]
    }

    pub fn domain(&self) -> Domain {
        match self {
            Entity::AcademicHistory
            | Entity::Recommendations
            | Entity::ExamSessions
            | Entity::ExamRegistrations
            | Entity::AvailableSubjects
            | Entity::Enrollments
            | Entity::Experiences
            | Entity::ExamsTaken => Domain::Student,
            Entity::SubjectExperiences
            | Entity::GeneralStatistics
            | Entity::SubjectStatistics
            | Entity::Plans
            | Entity::PlanSubjects => Domain::Shared,
            Entity::AdminStatistics => Domain::Admin,
        }
    }

    /// Key segment naming this entity inside its domain.
    pub fn segment(&self) -> &'static str {
        match self {
            Entity::AcademicHistory => "academic-history",
            Entity::Recommendations => "recommendations",
            Entity::ExamSessions => "exam-sessions",
            Entity::ExamRegistrations => "exam-registrations",
            Entity::AvailableSubjects => "available-subjects",
            Entity::Enrollments => "enrollments",
            Entity::Experiences => "experiences",
            Entity::ExamsTaken => "exams-taken",
            Entity::SubjectExperiences => "subject-experiences",
            Entity::GeneralStatistics => "general-statistics",
            Entity::SubjectStatistics => "subject-statistics",
            Entity::Plans => "plans",
            Entity::PlanSubjects => "plan-subjects",
            Entity::AdminStatistics => "admin-statistics",
        }
    }

    /// Prefix shared by every key of this entity.
    pub fn namespace(self) -> QueryKey {
        QueryKey::from_segments(vec![
            KeySegment::from(self.domain().as_str()),
            KeySegment::from(self.segment()),
        ])
    }
}

/// Hierarchical, structurally comparable cache key.
///
/// Only constructible through [`key_for`], the per-entity constructors below,
/// or [`Domain::root`]/[`Entity::namespace`], so every key starts with a
/// known namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QueryKey {
    segments: Vec<KeySegment>,
}

impl QueryKey {
    fn from_segments(segments: Vec<KeySegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a segment at the tail.
    pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Append a segment only when present. Used for trailing optional params.
    pub fn with_optional<S: Into<KeySegment>>(self, segment: Option<S>) -> Self {
        match segment {
            Some(segment) => self.with(segment),
            None => self,
        }
    }

    /// True if `prefix` addresses this key (a key is a prefix of itself).
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// The domain and entity this key belongs to, if it is a full entity key.
    pub fn entity(&self) -> Option<Entity> {
        let domain = self.segments.first()?;
        let segment = self.segments.get(1)?;
        Entity::all().iter().copied().find(|entity| {
            *domain == KeySegment::from(entity.domain().as_str())
                && *segment == KeySegment::from(entity.segment())
        })
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", segment)?;
        }
        write!(f, "]")
    }
}

/// Build the key for `entity` with its parameters in call order.
pub fn key_for(entity: Entity, params: &[KeySegment]) -> QueryKey {
    let mut key = entity.namespace();
    key.segments.extend(params.iter().cloned());
    key
}

pub fn academic_history(user: UserId) -> QueryKey {
    Entity::AcademicHistory.namespace().with(user)
}

pub fn recommendations(user: UserId) -> QueryKey {
    Entity::Recommendations.namespace().with(user)
}

pub fn exam_sessions(user: UserId) -> QueryKey {
    Entity::ExamSessions.namespace().with(user)
}

pub fn exam_registrations(user: UserId) -> QueryKey {
    Entity::ExamRegistrations.namespace().with(user)
}

pub fn available_subjects(user: UserId) -> QueryKey {
    Entity::AvailableSubjects.namespace().with(user)
}

pub fn enrollments(user: UserId) -> QueryKey {
    Entity::Enrollments.namespace().with(user)
}

pub fn experiences(user: UserId) -> QueryKey {
    Entity::Experiences.namespace().with(user)
}

pub fn exams_taken(user: UserId) -> QueryKey {
    Entity::ExamsTaken.namespace().with(user)
}

pub fn subject_experiences(subject_code: &str) -> QueryKey {
    Entity::SubjectExperiences.namespace().with(subject_code)
}

pub fn general_statistics() -> QueryKey {
    Entity::GeneralStatistics.namespace()
}

/// Statistics for one subject, optionally narrowed to a study plan.
pub fn subject_statistics(subject_code: &str, plan_code: Option<&str>) -> QueryKey {
    Entity::SubjectStatistics
        .namespace()
        .with(subject_code)
        .with_optional(plan_code)
}

pub fn plans() -> QueryKey {
    Entity::Plans.namespace()
}

pub fn plan_subjects(plan_code: &str) -> QueryKey {
    Entity::PlanSubjects.namespace().with(plan_code)
}

pub fn admin_statistics() -> QueryKey {
    Entity::AdminStatistics.namespace()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_entity_namespace_layout() {
        let key = Entity::Enrollments.namespace();
        assert_eq!(
            key.segments(),
            &[KeySegment::from("student"), KeySegment::from("enrollments")]
        );
    }

    #[test]
    fn test_key_starts_with_namespace_and_domain() {
        let user = UserId::new(Uuid::now_v7());
        let key = available_subjects(user);
        assert!(key.starts_with(&Entity::AvailableSubjects.namespace()));
        assert!(key.starts_with(&Domain::Student.root()));
        assert!(!key.starts_with(&Domain::Shared.root()));
        assert!(!key.starts_with(&Entity::Enrollments.namespace()));
    }

    #[test]
    fn test_key_is_prefix_of_itself() {
        let key = plan_subjects("K2023");
        assert!(key.starts_with(&key));
    }

    #[test]
    fn test_longer_prefix_does_not_match_shorter_key() {
        let namespace = plans();
        let longer = plans().with("extra");
        assert!(!namespace.starts_with(&longer));
    }

    #[test]
    fn test_optional_tail_segment() {
        let without = subject_statistics("AM1", None);
        let with = subject_statistics("AM1", Some("K2023"));
        assert_eq!(without.len(), 3);
        assert_eq!(with.len(), 4);
        assert!(with.starts_with(&without));
        assert_ne!(with, without);
    }

    #[test]
    fn test_int_and_string_segments_differ() {
        let int_key = key_for(Entity::PlanSubjects, &[KeySegment::from(2023i64)]);
        let str_key = key_for(Entity::PlanSubjects, &[KeySegment::from("2023")]);
        assert_ne!(int_key, str_key);
    }

    #[test]
    fn test_entity_lookup_from_key() {
        for entity in Entity::all() {
            let key = key_for(*entity, &[KeySegment::from("p")]);
            assert_eq!(key.entity(), Some(*entity));
        }
        assert_eq!(Domain::Admin.root().entity(), None);
    }

    #[test]
    fn test_display_format() {
        let key = plan_subjects("K2023");
        assert_eq!(key.to_string(), r#"["shared", "plan-subjects", "K2023"]"#);
    }
}
