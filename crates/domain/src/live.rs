use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::resource::MANAGED_TAG_KEY;

/// Resource as currently reported by the remote platform.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveResource {
    name: String,
    payload: Value,
    managed: bool,
    created_at: Option<DateTime<Utc>>,
    last_modified_at: Option<DateTime<Utc>>,
}

impl LiveResource {
    /// Creates a live resource without remote timestamps.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value, managed: bool) -> Self {
        Self {
            name: name.into(),
            payload,
            managed,
            created_at: None,
            last_modified_at: None,
        }
    }

    /// Builds a live resource from a remote payload.
    ///
    /// Ownership is read from the managed tag and timestamps from
    /// `systemData.createdAt` / `systemData.lastModifiedAt`.
    #[must_use]
    pub fn from_remote_payload(name: impl Into<String>, payload: Value) -> Self {
        let managed = payload
            .get("tags")
            .and_then(|tags| tags.get(MANAGED_TAG_KEY))
            .and_then(Value::as_str)
            == Some("true");
        let created_at = system_timestamp(&payload, "createdAt");
        let last_modified_at = system_timestamp(&payload, "lastModifiedAt");

        Self {
            name: name.into(),
            payload,
            managed,
            created_at,
            last_modified_at,
        }
    }

    /// Sets the remote creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Sets the remote last-modification timestamp.
    #[must_use]
    pub fn with_last_modified_at(mut self, last_modified_at: DateTime<Utc>) -> Self {
        self.last_modified_at = Some(last_modified_at);
        self
    }

    /// Returns the resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the deployed payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns true when this reconciler owns the resource.
    #[must_use]
    pub fn managed(&self) -> bool {
        self.managed
    }

    /// Returns the remote creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Returns the remote last-modification timestamp.
    #[must_use]
    pub fn last_modified_at(&self) -> Option<DateTime<Utc>> {
        self.last_modified_at
    }

    /// Returns the last-modified timestamp, falling back to creation time.
    #[must_use]
    pub fn modified_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_modified_at.or(self.created_at)
    }
}

fn system_timestamp(payload: &Value, field: &str) -> Option<DateTime<Utc>> {
    payload
        .get("systemData")
        .and_then(|system_data| system_data.get(field))
        .and_then(Value::as_str)
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|value| value.with_timezone(&Utc))
}

/// Read-only view of one kind's remote resources, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveState {
    resources: BTreeMap<String, LiveResource>,
}

impl LiveState {
    /// Creates an empty live state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a resource by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LiveResource> {
        self.resources.get(name)
    }

    /// Returns resources in name order.
    pub fn resources(&self) -> impl Iterator<Item = &LiveResource> {
        self.resources.values()
    }

    /// Returns resource names in sorted order.
    #[must_use]
    pub fn sorted_names(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    /// Returns the number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true when the remote reported nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl FromIterator<LiveResource> for LiveState {
    fn from_iter<T: IntoIterator<Item = LiveResource>>(iter: T) -> Self {
        Self {
            resources: iter
                .into_iter()
                .map(|resource| (resource.name.clone(), resource))
                .collect(),
        }
    }
}
