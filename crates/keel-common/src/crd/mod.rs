//! Custom Resource Definitions for Keel
//!
//! - `App`: a deployed application and the custom domains it owns
//! - `Framework`: cluster-level policy the App runs under (ingress class,
//!   automated certificate issuer)

mod app;
mod framework;
mod types;

pub use app::{App, AppSpec, AppStatus, Cname, CnameList, IngressSpec};
pub use framework::{Framework, FrameworkSpec, IngressControllerSpec, IngressControllerType};
pub use types::{Condition, ConditionStatus, INGRESS_READY_CONDITION};

/// Validate a DNS label (RFC 1123): lowercase alphanumeric with hyphens,
/// starting and ending with an alphanumeric, at most 63 characters.
pub fn validate_dns_label(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("name cannot be empty".to_string());
    }
    if s.len() > crate::MAX_DNS_LABEL_LENGTH {
        return Err(format!(
            "name must be at most {} characters: {}",
            crate::MAX_DNS_LABEL_LENGTH,
            s
        ));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(format!(
            "name must be lowercase alphanumeric with hyphens: {}",
            s
        ));
    }
    if s.starts_with('-') || s.ends_with('-') {
        return Err(format!("name cannot start or end with hyphen: {}", s));
    }
    Ok(())
}
