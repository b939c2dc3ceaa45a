use serde::{Deserialize, Serialize};

/// Outcome reported for one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationState {
    /// The pass converged without error.
    Success,
    /// The pass aborted.
    Failure,
}

impl NotificationState {
    /// Returns stable state value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Notification emitted once per pass and deduplicated against the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Declared-state revision the pass reconciled.
    pub revision: String,
    /// Pass outcome.
    pub state: NotificationState,
    /// Short notification name, e.g. a commit status context.
    pub name: String,
    /// Free text description; backends apply their own length limits.
    pub description: String,
}

impl NotificationEvent {
    /// Creates a success event.
    #[must_use]
    pub fn success(revision: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            state: NotificationState::Success,
            name: name.into(),
            description: "reconciliation succeeded".to_owned(),
        }
    }

    /// Creates a failure event describing `reason`.
    #[must_use]
    pub fn failure(
        revision: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            revision: revision.into(),
            state: NotificationState::Failure,
            name: name.into(),
            description: reason.into(),
        }
    }
}
