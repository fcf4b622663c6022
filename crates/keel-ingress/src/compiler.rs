//! Gateway API and cert-manager resources for a resolved ingress
//!
//! For each App with at least one resolved domain this generates:
//! - **Gateway**: one HTTP listener per plain host and one HTTPS listener per
//!   TLS endpoint, terminating with the endpoint's secret
//! - **HTTPRoute**: routes every host to the App's backend Service
//! - **Certificate**: one per endpoint whose certificate cert-manager issues
//!
//! Endpoints with a user-supplied secret only get a listener; nothing is
//! issued for them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use keel_common::crd::IngressControllerSpec;
use keel_common::kube_utils::{
    bounded_name, deterministic_hash, HasApiResource, ObjectMeta, NAME_HASH_LEN,
};
use keel_common::{Error, Result, MAX_DNS_LABEL_LENGTH};

use crate::resolver::{Resolution, CNAMES_FIELD, MISSING_CLUSTER_ISSUER};

macro_rules! impl_api_defaults {
    ($type:ty) => {
        impl $type {
            fn default_api_version() -> String {
                <Self as HasApiResource>::API_VERSION.to_string()
            }
            fn default_kind() -> String {
                <Self as HasApiResource>::KIND.to_string()
            }
        }
    };
}

// =============================================================================
// Gateway API Types
// =============================================================================

/// Kubernetes Gateway API Gateway resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    /// API version (gateway.networking.k8s.io/v1)
    #[serde(default = "Gateway::default_api_version")]
    pub api_version: String,
    /// Resource kind (Gateway)
    #[serde(default = "Gateway::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Gateway specification
    pub spec: GatewaySpec,
}

impl HasApiResource for Gateway {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    const KIND: &'static str = "Gateway";
}

impl_api_defaults!(Gateway);

/// Gateway spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// GatewayClass name
    pub gateway_class_name: String,
    /// Listener configurations
    pub listeners: Vec<GatewayListener>,
}

/// Gateway listener configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayListener {
    /// Listener name
    pub name: String,
    /// Hostname filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Port number
    pub port: u16,
    /// Protocol (HTTP, HTTPS)
    pub protocol: String,
    /// TLS configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<GatewayTlsConfig>,
}

/// Gateway TLS configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTlsConfig {
    /// TLS mode (Terminate)
    pub mode: String,
    /// Certificate references
    pub certificate_refs: Vec<CertificateRef>,
}

/// Secret in the Gateway's namespace holding a TLS certificate
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CertificateRef {
    /// Secret name
    pub name: String,
}

/// Kubernetes Gateway API HTTPRoute resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// API version (gateway.networking.k8s.io/v1)
    #[serde(default = "HttpRoute::default_api_version")]
    pub api_version: String,
    /// Resource kind (HTTPRoute)
    #[serde(default = "HttpRoute::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// HTTPRoute specification
    pub spec: HttpRouteSpec,
}

impl HasApiResource for HttpRoute {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    const KIND: &'static str = "HTTPRoute";
}

impl_api_defaults!(HttpRoute);

/// HTTPRoute spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    /// Parent gateway references
    pub parent_refs: Vec<ParentRef>,
    /// Hostnames to match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    /// Routing rules
    pub rules: Vec<HttpRouteRule>,
}

/// Gateway the route attaches to, in the route's own namespace
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ParentRef {
    /// Gateway name
    pub name: String,
}

/// HTTPRoute rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteRule {
    /// Backend references
    pub backend_refs: Vec<BackendRef>,
}

/// Service receiving matched traffic
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackendRef {
    /// Service name
    pub name: String,
    /// Service port
    pub port: u16,
}

// =============================================================================
// Certificate Types (cert-manager)
// =============================================================================

/// cert-manager Certificate resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// API version (cert-manager.io/v1)
    #[serde(default = "Certificate::default_api_version")]
    pub api_version: String,
    /// Resource kind (Certificate)
    #[serde(default = "Certificate::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Certificate specification
    pub spec: CertificateSpec,
}

impl HasApiResource for Certificate {
    const API_VERSION: &'static str = "cert-manager.io/v1";
    const KIND: &'static str = "Certificate";
}

impl_api_defaults!(Certificate);

/// Certificate spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    /// Name of the Secret to store the certificate
    pub secret_name: String,
    /// DNS names for the certificate
    pub dns_names: Vec<String>,
    /// Reference to the issuer
    pub issuer_ref: IssuerRef,
}

/// Issuer reference for Certificate; the group defaults to cert-manager.io
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IssuerRef {
    /// Issuer name
    pub name: String,
    /// Issuer kind (ClusterIssuer)
    pub kind: String,
}

// =============================================================================
// Generated Resources
// =============================================================================

/// Generated ingress resources for one App
#[derive(Clone, Debug, Default)]
pub struct GeneratedIngress {
    /// Gateway resource
    pub gateway: Option<Gateway>,
    /// HTTPRoute resource
    pub http_route: Option<HttpRoute>,
    /// One Certificate per issuer-managed endpoint
    pub certificates: Vec<Certificate>,
}

impl GeneratedIngress {
    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.gateway.is_none() && self.http_route.is_none() && self.certificates.is_empty()
    }

    /// Total resource count
    pub fn total_count(&self) -> usize {
        usize::from(self.gateway.is_some())
            + usize::from(self.http_route.is_some())
            + self.certificates.len()
    }
}

/// Where matched traffic is sent
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Backend {
    /// Service name
    pub service: String,
    /// Service port
    pub port: u16,
}

// =============================================================================
// Ingress Compiler
// =============================================================================

/// Compiles a [`Resolution`] into Gateway API and cert-manager resources
pub struct IngressCompiler;

impl IngressCompiler {
    const HTTP_PORT: u16 = 80;
    const HTTPS_PORT: u16 = 443;

    /// Compile ingress resources for `app` in `namespace`
    ///
    /// `cluster_issuer` must be the issuer `resolution` was computed with;
    /// issuer-managed endpoints without one are rejected. Returns nothing
    /// when the resolution is empty.
    pub fn compile(
        app: &str,
        namespace: &str,
        resolution: &Resolution,
        backend: &Backend,
        cluster_issuer: &str,
        controller: &IngressControllerSpec,
    ) -> Result<GeneratedIngress> {
        if resolution.is_empty() {
            return Ok(GeneratedIngress::default());
        }
        if cluster_issuer.is_empty() && resolution.issuer_managed().next().is_some() {
            return Err(Error::validation_for_field(
                app,
                CNAMES_FIELD,
                MISSING_CLUSTER_ISSUER,
            ));
        }

        let output = GeneratedIngress {
            gateway: Some(Self::compile_gateway(app, namespace, resolution, controller)?),
            http_route: Some(Self::compile_http_route(app, namespace, resolution, backend)),
            certificates: Self::compile_certificates(app, namespace, resolution, cluster_issuer),
        };

        debug!(
            app = %app,
            namespace = %namespace,
            resources = output.total_count(),
            certificates = output.certificates.len(),
            "compiled ingress"
        );
        Ok(output)
    }

    fn gateway_name(app: &str) -> String {
        format!("{}-gateway", app)
    }

    /// Plain listeners are keyed by a hash of the host, so no two distinct
    /// hosts share a name and none matches an endpoint's `-https-` id.
    fn http_listener_name(app: &str, host: &str) -> String {
        bounded_name(
            &format!("{}-http-{}", app, deterministic_hash(host, NAME_HASH_LEN)),
            MAX_DNS_LABEL_LENGTH,
        )
    }

    fn compile_gateway(
        app: &str,
        namespace: &str,
        resolution: &Resolution,
        controller: &IngressControllerSpec,
    ) -> Result<Gateway> {
        // A repeated host on the same protocol shares one listener.
        let mut hosts = BTreeSet::new();
        let mut names = ListenerNames::default();
        let mut listeners = Vec::new();

        for host in &resolution.http {
            if !hosts.insert(("HTTP", host.as_str())) {
                continue;
            }
            let name = Self::http_listener_name(app, host);
            names.claim(app, &name, host)?;
            listeners.push(GatewayListener {
                name,
                hostname: Some(host.clone()),
                port: Self::HTTP_PORT,
                protocol: "HTTP".to_string(),
                tls: None,
            });
        }

        for endpoint in &resolution.https {
            if !hosts.insert(("HTTPS", endpoint.cname.as_str())) {
                continue;
            }
            names.claim(app, &endpoint.unique_name, &endpoint.cname)?;
            listeners.push(GatewayListener {
                name: endpoint.unique_name.clone(),
                hostname: Some(endpoint.cname.clone()),
                port: Self::HTTPS_PORT,
                protocol: "HTTPS".to_string(),
                tls: Some(GatewayTlsConfig {
                    mode: "Terminate".to_string(),
                    certificate_refs: vec![CertificateRef {
                        name: endpoint.secret_name.clone(),
                    }],
                }),
            });
        }

        Ok(Gateway {
            api_version: Gateway::default_api_version(),
            kind: Gateway::default_kind(),
            metadata: ObjectMeta::new(Self::gateway_name(app), namespace, app),
            spec: GatewaySpec {
                gateway_class_name: controller.effective_class_name().to_string(),
                listeners,
            },
        })
    }

    /// Hostnames are listed plain hosts first, then TLS hosts, each in input
    /// order, without repeats.
    fn compile_http_route(
        app: &str,
        namespace: &str,
        resolution: &Resolution,
        backend: &Backend,
    ) -> HttpRoute {
        let mut seen = BTreeSet::new();
        let hostnames = resolution
            .http
            .iter()
            .chain(resolution.https.iter().map(|e| &e.cname))
            .filter(|h| seen.insert(*h))
            .cloned()
            .collect();

        HttpRoute {
            api_version: HttpRoute::default_api_version(),
            kind: HttpRoute::default_kind(),
            metadata: ObjectMeta::new(format!("{}-route", app), namespace, app),
            spec: HttpRouteSpec {
                parent_refs: vec![ParentRef {
                    name: Self::gateway_name(app),
                }],
                hostnames,
                rules: vec![HttpRouteRule {
                    backend_refs: vec![BackendRef {
                        name: backend.service.clone(),
                        port: backend.port,
                    }],
                }],
            },
        }
    }

    fn compile_certificates(
        app: &str,
        namespace: &str,
        resolution: &Resolution,
        cluster_issuer: &str,
    ) -> Vec<Certificate> {
        let mut seen = BTreeSet::new();
        resolution
            .issuer_managed()
            .filter(|e| seen.insert(e.unique_name.clone()))
            .map(|endpoint| Certificate {
                api_version: Certificate::default_api_version(),
                kind: Certificate::default_kind(),
                metadata: ObjectMeta::new(endpoint.unique_name.clone(), namespace, app),
                spec: CertificateSpec {
                    secret_name: endpoint.secret_name.clone(),
                    dns_names: vec![endpoint.cname.clone()],
                    issuer_ref: IssuerRef {
                        name: cluster_issuer.to_string(),
                        kind: "ClusterIssuer".to_string(),
                    },
                },
            })
            .collect()
    }
}

/// Listener names handed out on one Gateway
#[derive(Default)]
struct ListenerNames<'a> {
    owners: BTreeMap<String, &'a str>,
}

impl<'a> ListenerNames<'a> {
    fn claim(&mut self, app: &str, name: &str, host: &'a str) -> Result<()> {
        match self.owners.get(name) {
            Some(owner) if *owner != host => Err(Error::validation_for_field(
                app,
                CNAMES_FIELD,
                format!(
                    "cnames {} and {} both resolve to gateway listener {}",
                    owner, host, name
                ),
            )),
            _ => {
                self.owners.insert(name.to_string(), host);
                Ok(())
            }
        }
    }
}
