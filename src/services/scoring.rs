//! Per-type answer checking and automatic scoring.

use std::collections::HashSet;

use crate::db::answers::{AnswerKey, AnswerPayload, ChoiceOption};
use crate::repositories::round2;
use crate::services::errors::AssessmentError;

const NUMERIC_EPSILON: f64 = 1e-9;

/// Rejects answers whose shape does not fit the question.
pub(crate) fn check_answer(
    question_id: &str,
    key: &AnswerKey,
    answer: &AnswerPayload,
) -> Result<(), AssessmentError> {
    let invalid = |detail: &str| {
        AssessmentError::validation(format!("answer for question {question_id}: {detail}"))
    };

    match key {
        AnswerKey::McqSingle { options, .. } => {
            let selected = single_choice(answer).ok_or_else(|| invalid("expected one option id"))?;
            if !has_option(options, selected) {
                return Err(invalid(&format!("unknown option {selected}")));
            }
        }
        AnswerKey::McqMulti { options, .. } => {
            let selected = multi_choice(answer).ok_or_else(|| invalid("expected option ids"))?;
            let mut seen = HashSet::new();
            for id in selected {
                if !has_option(options, id) {
                    return Err(invalid(&format!("unknown option {id}")));
                }
                if !seen.insert(id) {
                    return Err(invalid(&format!("option {id} selected twice")));
                }
            }
        }
        AnswerKey::TrueFalse { .. } => {
            flag(answer).ok_or_else(|| invalid("expected true or false"))?;
        }
        AnswerKey::ShortAnswer { .. } | AnswerKey::Essay { .. } => {
            if !matches!(answer, AnswerPayload::Text(_)) {
                return Err(invalid("expected text"));
            }
        }
        AnswerKey::Numeric { .. } => {
            number(answer).ok_or_else(|| invalid("expected a finite number"))?;
        }
    }

    Ok(())
}

/// Points earned by an answer, or `None` when a human has to decide.
///
/// Unanswered objective questions earn zero. Answers of the wrong shape
/// earn zero as well; they are rejected earlier by [`check_answer`].
pub(crate) fn auto_score(key: &AnswerKey, points: f64, answer: Option<&AnswerPayload>) -> Option<f64> {
    if matches!(key, AnswerKey::Essay { .. }) {
        return None;
    }
    let Some(answer) = answer else {
        return Some(0.0);
    };

    let full = |correct: bool| if correct { points } else { 0.0 };
    let score = match key {
        AnswerKey::McqSingle { correct, .. } => {
            full(single_choice(answer).is_some_and(|selected| selected == correct.as_str()))
        }
        AnswerKey::McqMulti { correct, .. } => multi_score(correct, points, answer),
        AnswerKey::TrueFalse { correct } => full(flag(answer) == Some(*correct)),
        AnswerKey::ShortAnswer { accepted } => full(match answer {
            AnswerPayload::Text(text) => {
                let given = normalize_text(text);
                accepted.iter().any(|candidate| normalize_text(candidate) == given)
            }
            _ => false,
        }),
        AnswerKey::Numeric { value, tolerance } => full(
            number(answer).is_some_and(|given| (given - value).abs() <= tolerance + NUMERIC_EPSILON),
        ),
        AnswerKey::Essay { .. } => return None,
    };

    Some(score)
}

fn multi_score(correct: &[String], points: f64, answer: &AnswerPayload) -> f64 {
    let Some(selected) = multi_choice(answer) else {
        return 0.0;
    };
    if correct.is_empty() {
        return 0.0;
    }

    let selected: HashSet<&str> = selected.iter().map(String::as_str).collect();
    let hits = selected.iter().filter(|&&id| correct.iter().any(|c| c == id)).count() as f64;
    let misses = selected.len() as f64 - hits;
    let raw = points * (hits - misses) / correct.len() as f64;

    round2(raw.max(0.0))
}

fn has_option(options: &[ChoiceOption], id: &str) -> bool {
    options.iter().any(|option| option.id == id)
}

fn single_choice(answer: &AnswerPayload) -> Option<&str> {
    match answer {
        AnswerPayload::Text(id) => Some(id.as_str()),
        AnswerPayload::Choices(ids) if ids.len() == 1 => Some(ids[0].as_str()),
        _ => None,
    }
}

fn multi_choice(answer: &AnswerPayload) -> Option<&[String]> {
    match answer {
        AnswerPayload::Choices(ids) => Some(ids.as_slice()),
        AnswerPayload::Text(id) => Some(std::slice::from_ref(id)),
        _ => None,
    }
}

fn flag(answer: &AnswerPayload) -> Option<bool> {
    match answer {
        AnswerPayload::Flag(value) => Some(*value),
        AnswerPayload::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn number(answer: &AnswerPayload) -> Option<f64> {
    let value = match answer {
        AnswerPayload::Number(value) => *value,
        AnswerPayload::Text(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Lowercases and collapses runs of whitespace.
pub(crate) fn normalize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
