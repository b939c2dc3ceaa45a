mod cache;
mod metrics;
mod notification;
mod remote;
mod secret;
mod source;

pub use cache::{FingerprintStore, NotificationCache, RevisionCache};
pub use metrics::MetricsSink;
pub use notification::Notifier;
pub use remote::ResourceRemote;
pub use secret::{SecretStore, SecretValue};
pub use source::{DeclaredSource, ManifestSource};
