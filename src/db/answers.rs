//! Answer keys and submitted answers.
//!
//! Both are stored as JSONB. A key carries its own `type` tag, so a question
//! row can never hold a key of the wrong shape once it passed
//! [`AnswerKey::validate`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::types::QuestionType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ChoiceOption {
    pub(crate) id: String,
    pub(crate) text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum AnswerKey {
    McqSingle {
        options: Vec<ChoiceOption>,
        correct: String,
    },
    McqMulti {
        options: Vec<ChoiceOption>,
        correct: Vec<String>,
    },
    TrueFalse {
        correct: bool,
    },
    ShortAnswer {
        accepted: Vec<String>,
    },
    Essay {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rubric: Option<String>,
    },
    Numeric {
        value: f64,
        #[serde(default)]
        tolerance: f64,
    },
}

/// What a student sent for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum AnswerPayload {
    Flag(bool),
    Number(f64),
    Choices(Vec<String>),
    Text(String),
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum AnswerKeyError {
    #[error("answer key is for {key} but the question is {question}")]
    TypeMismatch { question: &'static str, key: &'static str },
    #[error("choice questions need at least two options")]
    TooFewOptions,
    #[error("option ids must be non-empty and unique")]
    BadOptionIds,
    #[error("correct option {0} is not one of the listed options")]
    UnknownCorrectOption(String),
    #[error("at least one correct option is required")]
    NoCorrectOption,
    #[error("at least one non-blank accepted answer is required")]
    NoAcceptedAnswer,
    #[error("numeric key value and tolerance must be finite and tolerance non-negative")]
    BadNumeric,
}

impl AnswerKey {
    pub(crate) fn question_type(&self) -> QuestionType {
        match self {
            Self::McqSingle { .. } => QuestionType::McqSingle,
            Self::McqMulti { .. } => QuestionType::McqMulti,
            Self::TrueFalse { .. } => QuestionType::TrueFalse,
            Self::ShortAnswer { .. } => QuestionType::ShortAnswer,
            Self::Essay { .. } => QuestionType::Essay,
            Self::Numeric { .. } => QuestionType::Numeric,
        }
    }

    pub(crate) fn validate_for(&self, question_type: QuestionType) -> Result<(), AnswerKeyError> {
        if self.question_type() != question_type {
            return Err(AnswerKeyError::TypeMismatch {
                question: question_type.as_str(),
                key: self.question_type().as_str(),
            });
        }
        self.validate()
    }

    pub(crate) fn validate(&self) -> Result<(), AnswerKeyError> {
        match self {
            Self::McqSingle { options, correct } => {
                check_options(options)?;
                if !options.iter().any(|option| &option.id == correct) {
                    return Err(AnswerKeyError::UnknownCorrectOption(correct.clone()));
                }
                Ok(())
            }
            Self::McqMulti { options, correct } => {
                check_options(options)?;
                if correct.is_empty() {
                    return Err(AnswerKeyError::NoCorrectOption);
                }
                let mut seen = HashSet::new();
                for id in correct {
                    if !options.iter().any(|option| &option.id == id) || !seen.insert(id) {
                        return Err(AnswerKeyError::UnknownCorrectOption(id.clone()));
                    }
                }
                Ok(())
            }
            Self::TrueFalse { .. } | Self::Essay { .. } => Ok(()),
            Self::ShortAnswer { accepted } => {
                if accepted.iter().all(|item| item.trim().is_empty()) {
                    return Err(AnswerKeyError::NoAcceptedAnswer);
                }
                Ok(())
            }
            Self::Numeric { value, tolerance } => {
                if !value.is_finite() || !tolerance.is_finite() || *tolerance < 0.0 {
                    return Err(AnswerKeyError::BadNumeric);
                }
                Ok(())
            }
        }
    }

    /// The option list a student may pick from, if this is a choice question.
    pub(crate) fn options(&self) -> Option<&[ChoiceOption]> {
        match self {
            Self::McqSingle { options, .. } | Self::McqMulti { options, .. } => Some(options),
            _ => None,
        }
    }
}

fn check_options(options: &[ChoiceOption]) -> Result<(), AnswerKeyError> {
    if options.len() < 2 {
        return Err(AnswerKeyError::TooFewOptions);
    }
    let mut ids = HashSet::new();
    for option in options {
        if option.id.trim().is_empty() || !ids.insert(option.id.as_str()) {
            return Err(AnswerKeyError::BadOptionIds);
        }
    }
    Ok(())
}
