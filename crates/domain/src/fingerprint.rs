use std::fmt::{Display, Formatter};

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tidegate_core::{AppError, AppResult};

use crate::declared::ResourceSpecification;
use crate::live::LiveResource;

/// Change signal recorded after a verified apply: remote timestamp plus desired content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    modified_timestamp: DateTime<Utc>,
    content_hash: String,
}

impl Fingerprint {
    /// Creates a fingerprint, rounding the timestamp to millisecond precision.
    #[must_use]
    pub fn new(modified_timestamp: DateTime<Utc>, content_hash: impl Into<String>) -> Self {
        Self {
            modified_timestamp: round_to_millisecond(modified_timestamp),
            content_hash: content_hash.into(),
        }
    }

    /// Captures the fingerprint of a live resource and its desired specification.
    ///
    /// Returns `None` when the live resource carries no timestamp.
    pub fn observe(live: &LiveResource, desired: &ResourceSpecification) -> AppResult<Option<Self>> {
        let Some(modified_timestamp) = live.modified_timestamp() else {
            return Ok(None);
        };

        Ok(Some(Self::new(
            modified_timestamp,
            content_hash(desired.payload())?,
        )))
    }

    /// Returns the recorded remote timestamp.
    #[must_use]
    pub fn modified_timestamp(&self) -> DateTime<Utc> {
        self.modified_timestamp
    }

    /// Returns the recorded desired content hash.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        self.content_hash.as_str()
    }

    /// Decides whether `desired` must be applied given the cached fingerprint and live state.
    pub fn detect_change(
        cached: Option<&Self>,
        live: Option<&LiveResource>,
        desired: &ResourceSpecification,
    ) -> AppResult<ChangeReason> {
        let Some(cached) = cached else {
            return Ok(ChangeReason::NotCached);
        };
        let Some(live) = live else {
            return Ok(ChangeReason::LiveResourceMissing);
        };
        let Some(live_timestamp) = live.modified_timestamp() else {
            return Ok(ChangeReason::LiveTimestampMissing);
        };

        if round_to_millisecond(cached.modified_timestamp) != round_to_millisecond(live_timestamp) {
            return Ok(ChangeReason::LiveTimestampChanged);
        }

        if cached.content_hash != content_hash(desired.payload())? {
            return Ok(ChangeReason::SpecificationChanged);
        }

        Ok(ChangeReason::Unchanged)
    }
}

/// Outcome of a fingerprint comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    /// Nothing recorded for the resource yet.
    NotCached,
    /// The resource is absent from the live state.
    LiveResourceMissing,
    /// The live resource reports neither modification nor creation time.
    LiveTimestampMissing,
    /// The resource was modified remotely since the last verified apply.
    LiveTimestampChanged,
    /// The desired specification changed since the last verified apply.
    SpecificationChanged,
    /// Nothing changed.
    Unchanged,
}

impl ChangeReason {
    /// Returns true when the resource must be applied remotely.
    #[must_use]
    pub fn requires_apply(self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Returns stable reason text.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotCached => "not cached",
            Self::LiveResourceMissing => "live resource missing",
            Self::LiveTimestampMissing => "live timestamp missing",
            Self::LiveTimestampChanged => "live timestamp changed",
            Self::SpecificationChanged => "specification changed",
            Self::Unchanged => "no changes",
        }
    }
}

impl Display for ChangeReason {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Rounds a timestamp to the nearest millisecond.
#[must_use]
pub fn round_to_millisecond(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .duration_round(TimeDelta::milliseconds(1))
        .unwrap_or(timestamp)
}

/// Returns the hex SHA-256 digest of the canonical JSON form of `value`.
///
/// Object keys are written in sorted order, so logically equal payloads hash
/// identically regardless of key order.
pub fn content_hash(value: &Value) -> AppResult<String> {
    let mut encoded = Vec::new();
    write_canonical(value, &mut encoded)?;

    let digest = Sha256::digest(encoded);
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}

fn write_canonical(value: &Value, output: &mut Vec<u8>) -> AppResult<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            output.push(b'{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    output.push(b',');
                }
                write_scalar(&Value::String(key.clone()), output)?;
                output.push(b':');
                if let Some(field) = map.get(key) {
                    write_canonical(field, output)?;
                }
            }
            output.push(b'}');
        }
        Value::Array(items) => {
            output.push(b'[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    output.push(b',');
                }
                write_canonical(item, output)?;
            }
            output.push(b']');
        }
        scalar => write_scalar(scalar, output)?,
    }

    Ok(())
}

fn write_scalar(value: &Value, output: &mut Vec<u8>) -> AppResult<()> {
    serde_json::to_writer(output, value).map_err(|error| {
        AppError::Internal(format!("failed to encode specification hash input: {error}"))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeDelta, TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::{Value, json};

    use super::{ChangeReason, Fingerprint, content_hash, round_to_millisecond};
    use crate::declared::{ResourceSpecification, ResourceSpecificationInput};
    use crate::live::LiveResource;
    use crate::resource::ResourceKind;

    fn specification(payload: Value) -> ResourceSpecification {
        ResourceSpecification::new(ResourceSpecificationInput {
            kind: ResourceKind::App,
            api_version: "tidegate.io/v1".to_owned(),
            metadata: BTreeMap::from([("name".to_owned(), "foo".to_owned())]),
            payload,
            remote_secrets: Vec::new(),
            location_filter: Vec::new(),
            image_replacements: Vec::new(),
        })
        .unwrap_or_else(|_| unreachable!())
    }

    fn live_at(millis: i64) -> LiveResource {
        let timestamp = Utc.timestamp_millis_opt(millis).single().unwrap_or_default();
        LiveResource::new("foo", json!({}), true).with_last_modified_at(timestamp)
    }

    #[test]
    fn content_hash_ignores_key_order() {
        let first: Value = serde_json::from_str(r#"{"a":1,"b":{"c":true,"d":[1,2]}}"#)
            .unwrap_or_default();
        let second: Value = serde_json::from_str(r#"{"b":{"d":[1,2],"c":true},"a":1}"#)
            .unwrap_or_default();

        assert_eq!(content_hash(&first).ok(), content_hash(&second).ok());
    }

    #[test]
    fn content_hash_is_hex_sha256() {
        let hash = content_hash(&json!({})).unwrap_or_default();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|character| character.is_ascii_hexdigit()));
    }

    #[test]
    fn missing_cache_entry_requires_apply() {
        let reason = Fingerprint::detect_change(None, Some(&live_at(1)), &specification(json!({})));
        assert_eq!(reason.ok(), Some(ChangeReason::NotCached));
    }

    #[test]
    fn live_resource_without_timestamp_requires_apply() {
        let desired = specification(json!({}));
        let cached = Fingerprint::observe(&live_at(1_000), &desired)
            .ok()
            .flatten();
        let live = LiveResource::new("foo", json!({}), true);

        let reason = Fingerprint::detect_change(cached.as_ref(), Some(&live), &desired);
        assert_eq!(reason.ok(), Some(ChangeReason::LiveTimestampMissing));

        let reason = Fingerprint::detect_change(cached.as_ref(), None, &desired);
        assert_eq!(reason.ok(), Some(ChangeReason::LiveResourceMissing));
    }

    #[test]
    fn unchanged_fingerprint_skips_apply() {
        let desired = specification(json!({"properties": {"replicas": 1}}));
        let live = live_at(1_700_000_000_123);
        let cached = Fingerprint::observe(&live, &desired).ok().flatten();

        let reason = Fingerprint::detect_change(cached.as_ref(), Some(&live), &desired);
        assert_eq!(reason.ok(), Some(ChangeReason::Unchanged));
    }

    #[test]
    fn changed_timestamp_or_specification_requires_apply() {
        let desired = specification(json!({"properties": {"replicas": 1}}));
        let cached = Fingerprint::observe(&live_at(1_000), &desired).ok().flatten();

        let reason = Fingerprint::detect_change(cached.as_ref(), Some(&live_at(2_000)), &desired);
        assert_eq!(reason.ok(), Some(ChangeReason::LiveTimestampChanged));

        let changed = specification(json!({"properties": {"replicas": 2}}));
        let reason = Fingerprint::detect_change(cached.as_ref(), Some(&live_at(1_000)), &changed);
        assert_eq!(reason.ok(), Some(ChangeReason::SpecificationChanged));
    }

    #[test]
    fn sub_millisecond_differences_are_tolerated() {
        let base = Utc.timestamp_millis_opt(1_000).single().unwrap_or_default();
        let jittered = base + TimeDelta::microseconds(200);
        assert_eq!(round_to_millisecond(base), round_to_millisecond(jittered));

        let desired = specification(json!({}));
        let cached = Fingerprint::new(base, content_hash(desired.payload()).unwrap_or_default());
        let live = LiveResource::new("foo", json!({}), true).with_last_modified_at(jittered);
        let reason = Fingerprint::detect_change(Some(&cached), Some(&live), &desired);
        assert_eq!(reason.ok(), Some(ChangeReason::Unchanged));
    }

    #[test]
    fn fingerprint_serializes_with_camel_case_fields() {
        let fingerprint = Fingerprint::new(
            Utc.timestamp_millis_opt(0).single().unwrap_or_default(),
            "abc",
        );
        let encoded = serde_json::to_value(&fingerprint).unwrap_or_default();
        assert_eq!(encoded["contentHash"], json!("abc"));
        assert!(encoded.get("modifiedTimestamp").is_some());
    }

    proptest! {
        #[test]
        fn content_hash_is_deterministic(
            entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
        ) {
            let forward: serde_json::Map<String, Value> = entries
                .iter()
                .map(|(key, value)| (key.clone(), json!(value)))
                .collect();
            let reversed: serde_json::Map<String, Value> = entries
                .iter()
                .rev()
                .map(|(key, value)| (key.clone(), json!(value)))
                .collect();

            let forward_hash = content_hash(&Value::Object(forward.clone())).ok();
            prop_assert_eq!(forward_hash.clone(), content_hash(&Value::Object(forward)).ok());
            prop_assert_eq!(forward_hash, content_hash(&Value::Object(reversed)).ok());
        }
    }
}
