use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questiontype", rename_all = "snake_case")]
pub(crate) enum QuestionType {
    McqSingle,
    McqMulti,
    TrueFalse,
    ShortAnswer,
    Essay,
    Numeric,
}

impl QuestionType {
    pub(crate) const ALL: [QuestionType; 6] = [
        Self::McqSingle,
        Self::McqMulti,
        Self::TrueFalse,
        Self::ShortAnswer,
        Self::Essay,
        Self::Numeric,
    ];

    /// Whether a response can be scored without a human.
    pub(crate) fn is_auto_gradable(self) -> bool {
        !matches!(self, Self::Essay)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::McqSingle => "mcq_single",
            Self::McqMulti => "mcq_multi",
            Self::TrueFalse => "true_false",
            Self::ShortAnswer => "short_answer",
            Self::Essay => "essay",
            Self::Numeric => "numeric",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "difficultylevel", rename_all = "lowercase")]
pub(crate) enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

impl DifficultyLevel {
    pub(crate) const ALL: [DifficultyLevel; 3] = [Self::Easy, Self::Medium, Self::Hard];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "quizstatus", rename_all = "lowercase")]
pub(crate) enum QuizStatus {
    Draft,
    Published,
    Archived,
}

impl QuizStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "gradingpolicy", rename_all = "snake_case")]
pub(crate) enum GradingPolicy {
    AutoOnly,
    ManualOnly,
    Hybrid,
}

impl GradingPolicy {
    /// Whether objective responses are scored when the attempt closes.
    pub(crate) fn auto_grades(self) -> bool {
        !matches!(self, Self::ManualOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptstatus", rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    InProgress,
    Submitted,
    Graded,
    Expired,
}

impl AttemptStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Submitted => "submitted",
            Self::Graded => "graded",
            Self::Expired => "expired",
        }
    }

    /// Closed attempts accept grading writes.
    pub(crate) fn is_closed(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "gradingstatus", rename_all = "snake_case")]
pub(crate) enum GradingStatus {
    Pending,
    AutoGraded,
    ManuallyGraded,
}

impl GradingStatus {
    pub(crate) fn is_scored(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "lifecyclestatus", rename_all = "lowercase")]
pub(crate) enum LifecycleStatus {
    Active,
    Deleted,
}

impl LifecycleStatus {
    pub(crate) fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_essay_needs_a_human() {
        let manual: Vec<_> =
            QuestionType::ALL.iter().filter(|kind| !kind.is_auto_gradable()).collect();
        assert_eq!(manual, vec![&QuestionType::Essay]);
    }

    #[test]
    fn serde_names_match_database_labels() {
        assert_eq!(serde_json::to_string(&QuestionType::McqMulti).unwrap(), "\"mcq_multi\"");
        assert_eq!(serde_json::to_string(&AttemptStatus::InProgress).unwrap(), "\"in_progress\"");
        assert_eq!(serde_json::to_string(&GradingPolicy::AutoOnly).unwrap(), "\"auto_only\"");
        assert_eq!(serde_json::to_string(&DifficultyLevel::Hard).unwrap(), "\"hard\"");
        for kind in QuestionType::ALL {
            assert_eq!(serde_json::to_string(&kind).unwrap(), format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn difficulty_orders_easy_first() {
        let mut levels = vec![DifficultyLevel::Hard, DifficultyLevel::Easy, DifficultyLevel::Medium];
        levels.sort();
        assert_eq!(levels, DifficultyLevel::ALL.to_vec());
    }
}
