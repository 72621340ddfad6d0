//! Top-level tabs and switching between them.

use aula_core::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tab {
    History,
    Recommendations,
    ExamSessions,
    Enrollments,
    Experiences,
    Statistics,
    Plans,
}

impl Tab {
    pub fn title(&self) -> &'static str {
        match self {
            Tab::History => "Academic history",
            Tab::Recommendations => "Recommendations",
            Tab::ExamSessions => "Exams",
            Tab::Enrollments => "Enrollments",
            Tab::Experiences => "Experiences",
            Tab::Statistics => "Statistics",
            Tab::Plans => "Study plans",
        }
    }

    pub fn all() -> &'static [Tab] {
        &[
            Tab::History,
            Tab::Recommendations,
            Tab::ExamSessions,
            Tab::Enrollments,
            Tab::Experiences,
            Tab::Statistics,
            Tab::Plans,
        ]
    }

    /// Tabs shown to a role, in display order.
    pub fn for_role(role: Role) -> &'static [Tab] {
        match role {
            Role::Student => &[
                Tab::History,
                Tab::Recommendations,
                Tab::ExamSessions,
                Tab::Enrollments,
                Tab::Experiences,
                Tab::Statistics,
            ],
            Role::Admin => &[Tab::Plans, Tab::Statistics],
        }
    }

    pub fn default_for(role: Role) -> Tab {
        Self::for_role(role)[0]
    }

    pub fn is_visible_to(&self, role: Role) -> bool {
        Self::for_role(role).contains(self)
    }

    pub fn index(&self) -> usize {
        Self::all()
            .iter()
            .position(|t| t == self)
            .unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Tab> {
        Self::all().get(index).copied()
    }

    pub fn next(&self) -> Tab {
        let all = Self::all();
        all[(self.index() + 1) % all.len()]
    }

    pub fn previous(&self) -> Tab {
        let idx = self.index();
        let all = Self::all();
        let prev = if idx == 0 { all.len() - 1 } else { idx - 1 };
        all[prev]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_and_previous_wrap() {
        assert_eq!(Tab::Plans.next(), Tab::History);
        assert_eq!(Tab::History.previous(), Tab::Plans);
        assert_eq!(Tab::History.next().previous(), Tab::History);
    }

    #[test]
    fn test_role_defaults() {
        assert_eq!(Tab::default_for(Role::Student), Tab::History);
        assert_eq!(Tab::default_for(Role::Admin), Tab::Plans);
        assert!(!Tab::Plans.is_visible_to(Role::Student));
        assert!(Tab::Statistics.is_visible_to(Role::Admin));
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(serde_json::to_string(&Tab::ExamSessions).unwrap(), "\"exam-sessions\"");
    }
}
