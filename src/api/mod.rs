pub(crate) mod attempts;
pub(crate) mod errors;
pub(crate) mod grading;
pub(crate) mod handlers;
pub(crate) mod pagination;
pub(crate) mod pools;
pub(crate) mod questions;
pub(crate) mod quizzes;
pub(crate) mod router;
pub(crate) mod students;
pub(crate) mod tags;
pub(crate) mod tenant;

#[cfg(test)]
mod tests;
