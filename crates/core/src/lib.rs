//! Shared primitives for all Rust crates in Tidegate.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across Tidegate crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl Display for NonEmptyString {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Ordered collection of errors reported together.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<AppError>);

impl ErrorList {
    /// Creates an empty error list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one error.
    pub fn push(&mut self, error: AppError) {
        self.0.push(error);
    }

    /// Returns the number of collected errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no error has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the collected errors.
    #[must_use]
    pub fn errors(&self) -> &[AppError] {
        self.0.as_slice()
    }

    /// Converts the list into a single error, or `None` when empty.
    ///
    /// A list holding exactly one error unwraps to that error.
    #[must_use]
    pub fn into_error(mut self) -> Option<AppError> {
        match self.0.len() {
            0 => None,
            1 => self.0.pop(),
            _ => Some(AppError::Multiple(self)),
        }
    }
}

impl Display for ErrorList {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} errors occurred:", self.0.len())?;
        for error in &self.0 {
            write!(formatter, "\n\t* {error}")?;
        }

        Ok(())
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state or ownership.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A collaborator call (source, remote, secret store, notifier) failed.
    #[error("remote error: {0}")]
    Remote(String),

    /// Remote state disagrees with what was just applied.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Several independent errors reported as one.
    #[error("{0}")]
    Multiple(ErrorList),
}

impl AppError {
    /// Prefixes the error message with additional context, keeping the category.
    #[must_use]
    pub fn context(self, context: impl Display) -> Self {
        match self {
            Self::Validation(message) => Self::Validation(format!("{context}: {message}")),
            Self::NotFound(message) => Self::NotFound(format!("{context}: {message}")),
            Self::Conflict(message) => Self::Conflict(format!("{context}: {message}")),
            Self::Remote(message) => Self::Remote(format!("{context}: {message}")),
            Self::Consistency(message) => Self::Consistency(format!("{context}: {message}")),
            Self::Internal(message) => Self::Internal(format!("{context}: {message}")),
            Self::Multiple(errors) => Self::Validation(format!("{context}: {errors}")),
        }
    }
}
