//! Ingress resolution: which custom domains are plain HTTP, which are TLS,
//! and who owns each TLS certificate.
//!
//! Resolution is a pure function of the App name, the Framework's cluster
//! issuer and the ordered cname list. It either partitions every cname into
//! `http` or `https` or fails as a whole; a half-resolved ingress is never
//! returned.
//!
//! ```yaml
//! # App                                  # Framework
//! spec:                                  spec:
//!   ingress:                               ingressController:
//!     cnames:                                clusterIssuer: letsencrypt
//!       - name: a.name
//!       - name: b.name
//!         secure: true
//!       - name: c.name
//!         secure: true
//!         secretName: c-ssl
//! ```
//!
//! resolves to `http: [a.name]` and two HTTPS endpoints, `b.name` with a
//! cert-manager issued secret and `c.name` with the user's `c-ssl`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use keel_common::crd::{App, Cname, Framework};
use keel_common::kube_utils::NAME_HASH_LEN;
use keel_common::{Error, Result, MAX_DNS_LABEL_LENGTH};

use crate::naming::NameSynthesizer;

/// Message reported when a secure cname needs an issuer nobody configured
pub const MISSING_CLUSTER_ISSUER: &str =
    "secure cnames require a framework.Ingress.ClusterIssuer to be specified";

pub(crate) const CNAMES_FIELD: &str = "spec.ingress.cnames";

/// Smallest name limit that still keeps one readable character before the
/// hash suffix of a shortened name
pub const MIN_NAME_LENGTH: usize = NAME_HASH_LEN + 2;

// =============================================================================
// Output Types
// =============================================================================

/// Who owns the certificate of an HTTPS endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CertificateManager {
    /// Issued and rotated by cert-manager through the cluster issuer
    CertManager,
    /// Pre-existing secret supplied by the App owner
    User,
}

/// A TLS-secured custom domain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpsEndpoint {
    /// Domain name as given by the user
    pub cname: String,
    /// Secret holding the TLS certificate
    pub secret_name: String,
    /// Identifier of this domain's ingress rule
    pub unique_name: String,
    /// Certificate ownership
    pub managed_by: CertificateManager,
}

/// Resolved ingress for one App
///
/// Serializes to the values shape consumed by the chart templates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Plain HTTP hosts in input order
    #[serde(default)]
    pub http: Vec<String>,
    /// HTTPS endpoints in input order
    #[serde(default)]
    pub https: Vec<HttpsEndpoint>,
}

impl Resolution {
    /// True when no domain was resolved
    pub fn is_empty(&self) -> bool {
        self.http.is_empty() && self.https.is_empty()
    }

    /// Number of resolved domains across both lists
    pub fn len(&self) -> usize {
        self.http.len() + self.https.len()
    }

    /// Endpoints whose certificate cert-manager must issue
    pub fn issuer_managed(&self) -> impl Iterator<Item = &HttpsEndpoint> {
        self.https
            .iter()
            .filter(|e| e.managed_by == CertificateManager::CertManager)
    }

    /// Chart values for the templating engine
    pub fn to_values(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolver tunables
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Upper bound for every synthesized name
    pub max_name_length: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_name_length: MAX_DNS_LABEL_LENGTH,
        }
    }
}

/// Partitions an App's cnames into HTTP hosts and HTTPS endpoints
#[derive(Clone, Copy, Debug, Default)]
pub struct Resolver {
    options: ResolverOptions,
}

impl Resolver {
    /// Resolver with explicit options
    ///
    /// Rejects a `max_name_length` below [`MIN_NAME_LENGTH`].
    pub fn new(options: ResolverOptions) -> Result<Self> {
        if options.max_name_length < MIN_NAME_LENGTH {
            return Err(Error::validation(format!(
                "max_name_length {} is below the minimum of {}",
                options.max_name_length, MIN_NAME_LENGTH
            )));
        }
        Ok(Self { options })
    }

    /// Resolve `cnames` for the App `app_name`.
    ///
    /// `cluster_issuer` may be empty, meaning no automated issuance. Fails on
    /// the first secure cname without a secret when no issuer is configured,
    /// and when two distinct cnames would share a synthesized name.
    pub fn resolve(
        &self,
        app_name: &str,
        cluster_issuer: &str,
        cnames: &[Cname],
    ) -> Result<Resolution> {
        let names = NameSynthesizer::new(app_name, self.options.max_name_length);
        let mut claims = NameClaims::default();
        let mut resolution = Resolution::default();

        for cname in cnames {
            if !cname.secure {
                resolution.http.push(cname.name.clone());
                continue;
            }

            let (secret_name, managed_by) = if !cname.secret_name.is_empty() {
                (cname.secret_name.clone(), CertificateManager::User)
            } else if cluster_issuer.is_empty() {
                return Err(Error::validation_for_field(
                    app_name,
                    CNAMES_FIELD,
                    MISSING_CLUSTER_ISSUER,
                ));
            } else {
                (
                    names.secret_name(&cname.name),
                    CertificateManager::CertManager,
                )
            };
            let unique_name = names.unique_name(&cname.name);

            claims.claim_unique_name(app_name, &unique_name, &cname.name)?;
            claims.claim_secret(app_name, &secret_name, &cname.name, managed_by)?;

            resolution.https.push(HttpsEndpoint {
                cname: cname.name.clone(),
                secret_name,
                unique_name,
                managed_by,
            });
        }

        Ok(resolution)
    }
}

/// Resolve with default options
pub fn resolve(app_name: &str, cluster_issuer: &str, cnames: &[Cname]) -> Result<Resolution> {
    Resolver::default().resolve(app_name, cluster_issuer, cnames)
}

/// Resolve an App against the Framework it runs under
pub fn resolve_for_app(app: &App, framework: &Framework) -> Result<Resolution> {
    let app_name = app.name();
    let issuer = framework.spec.ingress_controller.issuer();

    match resolve(app_name, issuer.unwrap_or_default(), &app.spec.ingress.cnames.0) {
        Ok(resolution) => {
            debug!(
                app = %app_name,
                issuer = issuer.unwrap_or("none"),
                http = resolution.http.len(),
                https = resolution.https.len(),
                issuer_managed = resolution.issuer_managed().count(),
                "resolved ingress"
            );
            Ok(resolution)
        }
        Err(err) => {
            warn!(app = %app_name, error = %err, "ingress resolution failed");
            Err(err)
        }
    }
}

/// Synthesized names already handed out in one resolution
#[derive(Default)]
struct NameClaims<'a> {
    unique_names: BTreeMap<String, &'a str>,
    secrets: BTreeMap<String, (&'a str, CertificateManager)>,
}

impl<'a> NameClaims<'a> {
    fn claim_unique_name(&mut self, app: &str, unique_name: &str, cname: &'a str) -> Result<()> {
        match self.unique_names.get(unique_name) {
            Some(owner) if *owner != cname => {
                Err(collision(app, "ingress rule", unique_name, owner, cname))
            }
            Some(_) => Ok(()),
            None => {
                self.unique_names.insert(unique_name.to_string(), cname);
                Ok(())
            }
        }
    }

    /// User secrets may be shared (e.g. a wildcard certificate); a secret
    /// written by cert-manager must belong to exactly one domain.
    fn claim_secret(
        &mut self,
        app: &str,
        secret: &str,
        cname: &'a str,
        managed_by: CertificateManager,
    ) -> Result<()> {
        match self.secrets.get(secret) {
            Some((owner, owner_managed_by))
                if *owner != cname
                    && (managed_by == CertificateManager::CertManager
                        || *owner_managed_by == CertificateManager::CertManager) =>
            {
                Err(collision(app, "certificate secret", secret, owner, cname))
            }
            Some(_) => Ok(()),
            None => {
                self.secrets.insert(secret.to_string(), (cname, managed_by));
                Ok(())
            }
        }
    }
}

fn collision(app: &str, what: &str, name: &str, first: &str, second: &str) -> Error {
    Error::validation_for_field(
        app,
        CNAMES_FIELD,
        format!(
            "cnames {} and {} both resolve to {} name {}",
            first, second, what, name
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_common::crd::{AppSpec, FrameworkSpec, IngressControllerSpec, IngressSpec};
    use rstest::rstest;

    const APP: &str = "my-app";
    const ISSUER: &str = "test-cluster-issuer";

    fn endpoint(cname: &str, secret: &str, unique: &str, by: CertificateManager) -> HttpsEndpoint {
        HttpsEndpoint {
            cname: cname.to_string(),
            secret_name: secret.to_string(),
            unique_name: unique.to_string(),
            managed_by: by,
        }
    }

    // =========================================================================
    // Story: Table of resolution cases
    // =========================================================================

    fn http(hosts: &[&str]) -> Vec<String> {
        hosts.iter().map(|h| h.to_string()).collect()
    }

    #[rstest]
    #[case::happy(
        vec![
            Cname::plain("a.name"),
            Cname::secure("b.name"),
            Cname::with_secret("c.name", "c-ssl"),
        ],
        ISSUER,
        Resolution {
            http: http(&["a.name"]),
            https: vec![
                endpoint(
                    "b.name",
                    "my-app-cname-b-name",
                    "my-app-https-b-name",
                    CertificateManager::CertManager,
                ),
                endpoint("c.name", "c-ssl", "my-app-https-c-name", CertificateManager::User),
            ],
        },
    )]
    #[case::no_https_no_cluster_issuer(
        vec![Cname::plain("a.name"), Cname::plain("b.name")],
        "",
        Resolution { http: http(&["a.name", "b.name"]), https: vec![] },
    )]
    #[case::empty_list_with_issuer(vec![], ISSUER, Resolution::default())]
    #[case::empty_list_without_issuer(vec![], "", Resolution::default())]
    #[case::user_secret_needs_no_issuer(
        vec![Cname::with_secret("c.name", "c-ssl")],
        "",
        Resolution {
            http: vec![],
            https: vec![endpoint(
                "c.name",
                "c-ssl",
                "my-app-https-c-name",
                CertificateManager::User,
            )],
        },
    )]
    #[case::secret_on_plain_cname_is_ignored(
        vec![Cname {
            name: "a.name".to_string(),
            secure: false,
            secret_name: "unused".to_string(),
        }],
        "",
        Resolution { http: http(&["a.name"]), https: vec![] },
    )]
    fn resolves_to_expected_partition(
        #[case] cnames: Vec<Cname>,
        #[case] issuer: &str,
        #[case] expected: Resolution,
    ) {
        assert_eq!(resolve(APP, issuer, &cnames).expect("resolves"), expected);
    }

    #[rstest]
    #[case::single_secure(vec![Cname::secure("a.name")])]
    #[case::secure_after_plain(vec![Cname::plain("a.name"), Cname::secure("b.name")])]
    #[case::secure_after_user_secret(vec![
        Cname::with_secret("c.name", "c-ssl"),
        Cname::secure("b.name"),
    ])]
    fn secure_cname_without_issuer_fails(#[case] cnames: Vec<Cname>) {
        let err = resolve(APP, "", &cnames).expect_err("no cluster issuer");
        assert_eq!(err.to_string(), MISSING_CLUSTER_ISSUER);
    }

    // =========================================================================
    // Story: Failure is atomic
    // =========================================================================

    #[test]
    fn story_missing_issuer_aborts_whole_resolution() {
        let cnames = vec![
            Cname::plain("a.name"),
            Cname::with_secret("c.name", "c-ssl"),
            Cname::secure("b.name"),
            Cname::plain("d.name"),
        ];
        let err = resolve(APP, "", &cnames).expect_err("should fail");
        assert!(!err.is_retryable());
        assert_eq!(err.app(), Some(APP));
        assert_eq!(err.field(), Some("spec.ingress.cnames"));
    }

    #[test]
    fn user_secret_wins_even_with_issuer() {
        let resolution =
            resolve(APP, ISSUER, &[Cname::with_secret("c.name", "c-ssl")]).expect("resolves");
        assert_eq!(resolution.https[0].managed_by, CertificateManager::User);
        assert_eq!(resolution.https[0].secret_name, "c-ssl");
        assert_eq!(resolution.issuer_managed().count(), 0);
    }

    // =========================================================================
    // Story: Ordering, duplicates and determinism
    // =========================================================================

    #[test]
    fn order_is_preserved_per_list() {
        let cnames = vec![
            Cname::secure("z.name"),
            Cname::plain("y.name"),
            Cname::secure("a.name"),
            Cname::plain("b.name"),
        ];
        let resolution = resolve(APP, ISSUER, &cnames).expect("resolves");
        assert_eq!(resolution.http, vec!["y.name", "b.name"]);
        let https: Vec<_> = resolution.https.iter().map(|e| e.cname.as_str()).collect();
        assert_eq!(https, vec!["z.name", "a.name"]);
        assert_eq!(resolution.len(), cnames.len());
    }

    #[test]
    fn duplicates_are_reproduced() {
        let cnames = vec![
            Cname::plain("a.name"),
            Cname::plain("a.name"),
            Cname::secure("b.name"),
            Cname::secure("b.name"),
        ];
        let resolution = resolve(APP, ISSUER, &cnames).expect("duplicates are not collisions");
        assert_eq!(resolution.http, vec!["a.name", "a.name"]);
        assert_eq!(resolution.https.len(), 2);
        assert_eq!(resolution.https[0], resolution.https[1]);
    }

    #[test]
    fn repeated_calls_are_byte_identical() {
        let cnames = vec![
            Cname::plain("a.name"),
            Cname::secure("b.name"),
            Cname::with_secret("c.name", "c-ssl"),
        ];
        let first = serde_json::to_vec(&resolve(APP, ISSUER, &cnames).expect("resolves"))
            .expect("serialize");
        let second = serde_json::to_vec(&resolve(APP, ISSUER, &cnames).expect("resolves"))
            .expect("serialize");
        assert_eq!(first, second);
    }

    // =========================================================================
    // Story: Name collisions
    // =========================================================================

    #[test]
    fn distinct_cnames_with_same_sanitized_form_are_rejected() {
        let cnames = vec![Cname::secure("a-b.name"), Cname::secure("a.b.name")];
        let err = resolve(APP, ISSUER, &cnames).expect_err("collision");
        let message = err.to_string();
        assert!(message.contains("a-b.name"));
        assert!(message.contains("a.b.name"));
        assert!(message.contains("my-app-https-a-b-name"));
    }

    #[test]
    fn plain_cnames_never_collide() {
        let cnames = vec![Cname::plain("a-b.name"), Cname::plain("a.b.name")];
        assert!(resolve(APP, "", &cnames).is_ok());
    }

    #[test]
    fn user_secret_shared_by_domains_is_allowed() {
        let cnames = vec![
            Cname::with_secret("a.example.com", "wildcard-tls"),
            Cname::with_secret("b.example.com", "wildcard-tls"),
        ];
        let resolution = resolve(APP, "", &cnames).expect("shared user secret");
        assert_eq!(resolution.https.len(), 2);
    }

    #[test]
    fn user_secret_may_not_shadow_issued_secret() {
        let cnames = vec![
            Cname::secure("b.name"),
            Cname::with_secret("c.name", "my-app-cname-b-name"),
        ];
        let err = resolve(APP, ISSUER, &cnames).expect_err("secret collision");
        assert!(err.to_string().contains("certificate secret"));
    }

    #[test]
    fn long_names_respect_configured_limit() {
        let domain = format!("{}.example.com", "x".repeat(70));
        let resolver = Resolver::new(ResolverOptions {
            max_name_length: 40,
        })
        .expect("valid options");
        let resolution = resolver
            .resolve(APP, ISSUER, &[Cname::secure(domain.clone())])
            .expect("resolves");
        let endpoint = &resolution.https[0];
        assert_eq!(endpoint.cname, domain);
        assert!(endpoint.secret_name.len() <= 40);
        assert!(endpoint.unique_name.len() <= 40);
    }

    #[rstest]
    #[case::zero(0)]
    #[case::shorter_than_hash(5)]
    #[case::just_below_minimum(MIN_NAME_LENGTH - 1)]
    fn name_limits_below_minimum_are_rejected(#[case] max_name_length: usize) {
        let err = Resolver::new(ResolverOptions { max_name_length }).expect_err("too small");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("max_name_length"));
    }

    #[test]
    fn minimum_name_limit_is_enforced_on_every_name() {
        let resolver = Resolver::new(ResolverOptions {
            max_name_length: MIN_NAME_LENGTH,
        })
        .expect("minimum is accepted");
        let resolution = resolver
            .resolve(APP, ISSUER, &[Cname::secure("b.name")])
            .expect("resolves");
        let endpoint = &resolution.https[0];
        assert!(endpoint.secret_name.len() <= MIN_NAME_LENGTH);
        assert!(endpoint.unique_name.len() <= MIN_NAME_LENGTH);
        assert_ne!(endpoint.secret_name, endpoint.unique_name);
    }

    // =========================================================================
    // Story: Chart values and CRD adapter
    // =========================================================================

    #[test]
    fn values_use_chart_field_names() {
        let resolution = resolve(
            APP,
            ISSUER,
            &[Cname::plain("a.name"), Cname::secure("b.name")],
        )
        .expect("resolves");
        let values = resolution.to_values().expect("values");
        assert_eq!(values["http"][0], "a.name");
        assert_eq!(values["https"][0]["cname"], "b.name");
        assert_eq!(values["https"][0]["secretName"], "my-app-cname-b-name");
        assert_eq!(values["https"][0]["uniqueName"], "my-app-https-b-name");
        assert_eq!(values["https"][0]["managedBy"], "certManager");
    }

    #[test]
    fn resolve_for_app_reads_framework_issuer() {
        let app = App::new(
            APP,
            AppSpec {
                framework: "fw".to_string(),
                ingress: IngressSpec {
                    cnames: vec![Cname::secure("b.name")].into(),
                },
            },
        );
        let mut framework = Framework::new(
            "fw",
            FrameworkSpec {
                namespace_name: "keel-fw".to_string(),
                ingress_controller: IngressControllerSpec::default(),
            },
        );

        let err = resolve_for_app(&app, &framework).expect_err("no issuer");
        assert_eq!(err.to_string(), MISSING_CLUSTER_ISSUER);

        framework.spec.ingress_controller.cluster_issuer = ISSUER.to_string();
        let resolution = resolve_for_app(&app, &framework).expect("resolves");
        assert_eq!(resolution.https[0].secret_name, "my-app-cname-b-name");
    }
}
