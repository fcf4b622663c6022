//! Framework CRD: cluster-level policy shared by the Apps that run on it

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Spec for a Framework
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keel.dev",
    version = "v1beta1",
    kind = "Framework",
    plural = "frameworks",
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".spec.namespaceName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkSpec {
    /// Namespace the framework's Apps are deployed into
    #[serde(default)]
    pub namespace_name: String,

    /// Ingress controller the framework's Apps are exposed through
    #[serde(default)]
    pub ingress_controller: IngressControllerSpec,
}

/// Ingress controller settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressControllerSpec {
    /// Ingress/Gateway class name; defaults by controller type when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub class_name: String,

    /// External endpoint of the controller (IP or host)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_endpoint: String,

    /// Controller implementation
    #[serde(default, rename = "type")]
    pub type_: IngressControllerType,

    /// cert-manager ClusterIssuer for automatically issued certificates.
    /// Empty means no automated issuance is available.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_issuer: String,
}

impl IngressControllerSpec {
    /// The configured issuer, if any
    pub fn issuer(&self) -> Option<&str> {
        Some(self.cluster_issuer.as_str()).filter(|s| !s.is_empty())
    }

    /// Class name, falling back to the controller type's default
    pub fn effective_class_name(&self) -> &str {
        if self.class_name.is_empty() {
            self.type_.default_class_name()
        } else {
            &self.class_name
        }
    }
}

/// Supported ingress controllers
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngressControllerType {
    /// Traefik
    #[default]
    Traefik,
    /// Istio
    Istio,
    /// ingress-nginx
    Nginx,
}

impl IngressControllerType {
    /// Conventional class name for this controller
    pub fn default_class_name(self) -> &'static str {
        match self {
            Self::Traefik => "traefik",
            Self::Istio => "istio",
            Self::Nginx => "nginx",
        }
    }
}

impl std::fmt::Display for IngressControllerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.default_class_name())
    }
}
