//! Ingress and TLS resolution for Keel Apps
//!
//! - [`resolver`]: partitions an App's cnames into HTTP hosts and HTTPS
//!   endpoints and decides who owns each certificate
//! - [`naming`]: resource names derived from the App and domain names
//! - [`compiler`]: Gateway API and cert-manager resources for a resolution

#![deny(missing_docs)]

pub mod compiler;
pub mod naming;
pub mod resolver;

pub use compiler::{Backend, GeneratedIngress, IngressCompiler};
pub use resolver::{
    resolve, resolve_for_app, CertificateManager, HttpsEndpoint, Resolution, Resolver,
    ResolverOptions, MIN_NAME_LENGTH, MISSING_CLUSTER_ISSUER,
};
