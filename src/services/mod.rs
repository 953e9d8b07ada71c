pub(crate) mod attempts;
pub(crate) mod errors;
pub(crate) mod essay_assist;
pub(crate) mod events;
pub(crate) mod grading;
pub(crate) mod question_bank;
pub(crate) mod question_pool;
pub(crate) mod quizzes;
pub(crate) mod scoring;
pub(crate) mod statistics;

#[cfg(test)]
mod tests;

pub(crate) type ServiceResult<T> = Result<T, errors::AssessmentError>;
