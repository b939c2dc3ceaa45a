use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Tag key written on every declared payload and read back to decide ownership.
pub const MANAGED_TAG_KEY: &str = "tidegate.io/managed";

/// Secret name holding the container registry password.
pub const REGISTRY_SECRET_NAME: &str = "azcagit-reg-cred";

/// Kind of container workload handled by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Long-running container app.
    App,
    /// Batch container job.
    Job,
}

impl ResourceKind {
    /// Every kind, in reconciliation order.
    pub const ALL: [Self; 2] = [Self::App, Self::Job];

    /// Returns stable kind value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Job => "job",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Normalizes a region identifier: spaces removed, lowercased.
#[must_use]
pub fn sanitize_location(location: &str) -> String {
    location
        .chars()
        .filter(|character| *character != ' ')
        .flat_map(char::to_lowercase)
        .collect()
}
