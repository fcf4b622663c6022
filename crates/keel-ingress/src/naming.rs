//! Resource names synthesized from an App name and a custom domain
//!
//! `my-app` + `b.name` gives the certificate secret `my-app-cname-b-name`
//! and the ingress rule id `my-app-https-b-name`. Names longer than the
//! configured limit are shortened with a hash suffix.

use keel_common::kube_utils::bounded_name;

/// Infix for secrets holding automatically issued certificates
pub const SECRET_NAME_INFIX: &str = "cname";

/// Infix for per-domain HTTPS rule identifiers
pub const UNIQUE_NAME_INFIX: &str = "https";

/// Turn a domain into a name segment by replacing every `.` with `-`
pub fn sanitize(domain: &str) -> String {
    domain.replace('.', "-")
}

/// Builds bounded names for one App
#[derive(Clone, Copy, Debug)]
pub struct NameSynthesizer<'a> {
    app: &'a str,
    max_len: usize,
}

impl<'a> NameSynthesizer<'a> {
    /// Names for `app`, each at most `max_len` characters
    pub fn new(app: &'a str, max_len: usize) -> Self {
        Self { app, max_len }
    }

    /// Secret for an automatically issued certificate
    pub fn secret_name(&self, domain: &str) -> String {
        self.build(SECRET_NAME_INFIX, domain)
    }

    /// Identifier of the HTTPS rule for `domain`
    pub fn unique_name(&self, domain: &str) -> String {
        self.build(UNIQUE_NAME_INFIX, domain)
    }

    fn build(&self, infix: &str, domain: &str) -> String {
        let full = format!("{}-{}-{}", self.app, infix, sanitize(domain));
        bounded_name(&full, self.max_len)
    }
}
