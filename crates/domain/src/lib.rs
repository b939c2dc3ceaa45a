//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod declared;
mod fingerprint;
mod live;
mod notification;
mod resource;

pub use declared::{
    DeclaredEntry, DeclaredSnapshot, DeclaredState, ImageReplacement, RemoteSecretReference,
    ResourceSpecification, ResourceSpecificationInput,
};
pub use fingerprint::{ChangeReason, Fingerprint, content_hash, round_to_millisecond};
pub use live::{LiveResource, LiveState};
pub use notification::{NotificationEvent, NotificationState};
pub use resource::{MANAGED_TAG_KEY, REGISTRY_SECRET_NAME, ResourceKind, sanitize_location};
