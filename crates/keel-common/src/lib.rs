//! Common types for Keel: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label key marking resources managed by Keel
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label value for resources managed by Keel
pub const LABEL_MANAGED_BY_KEEL: &str = "keel";

/// Label key carrying the owning App name
pub const LABEL_APP_NAME: &str = "keel.dev/app-name";

/// Maximum length of a Kubernetes name that must also be a DNS label
pub const MAX_DNS_LABEL_LENGTH: usize = 63;
