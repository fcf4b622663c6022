//! App CRD: an application and the custom domains routed to it

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;
use super::validate_dns_label;
use crate::Error;

/// Spec for an App
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keel.dev",
    version = "v1beta1",
    kind = "App",
    plural = "apps",
    status = "AppStatus",
    printcolumn = r#"{"name":"Framework","type":"string","jsonPath":".spec.framework"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Name of the Framework this App runs under
    #[serde(default)]
    pub framework: String,

    /// Ingress configuration
    #[serde(default)]
    pub ingress: IngressSpec,
}

/// App status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl AppStatus {
    /// Insert or replace the condition with the same type
    pub fn set_condition(&mut self, condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.type_ == condition.type_)
        {
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }

    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

/// Ingress configuration of an App
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Custom domains, in the order the user listed them
    #[serde(default)]
    pub cnames: CnameList,
}

/// A custom domain routed to the App
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Cname {
    /// DNS host name
    pub name: String,

    /// Serve this domain over TLS
    #[serde(default)]
    pub secure: bool,

    /// Pre-existing certificate Secret; only used when `secure` is set
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_name: String,
}

impl Cname {
    /// Plain HTTP domain
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// TLS domain whose certificate is issued automatically
    pub fn secure(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secure: true,
            secret_name: String::new(),
        }
    }

    /// TLS domain backed by a user-supplied certificate Secret
    pub fn with_secret(name: impl Into<String>, secret_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secure: true,
            secret_name: secret_name.into(),
        }
    }
}

/// Ordered list of custom domains
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(transparent)]
pub struct CnameList(pub Vec<Cname>);

impl CnameList {
    /// Iterate in input order
    pub fn iter(&self) -> std::slice::Iter<'_, Cname> {
        self.0.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no domains are listed
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Domain names in input order
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|c| c.name.as_str()).collect()
    }

    /// Secure entries in input order
    pub fn secure(&self) -> impl Iterator<Item = &Cname> {
        self.0.iter().filter(|c| c.secure)
    }

    /// Plain HTTP entries in input order
    pub fn plain(&self) -> impl Iterator<Item = &Cname> {
        self.0.iter().filter(|c| !c.secure)
    }
}

impl From<Vec<Cname>> for CnameList {
    fn from(cnames: Vec<Cname>) -> Self {
        Self(cnames)
    }
}

impl FromIterator<Cname> for CnameList {
    fn from_iter<I: IntoIterator<Item = Cname>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a CnameList {
    type Item = &'a Cname;
    type IntoIter = std::slice::Iter<'a, Cname>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl App {
    /// App name from metadata
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Admission-time checks the resolver relies on
    ///
    /// The App name must be a DNS label and every cname must be non-empty.
    pub fn validate(&self) -> Result<(), Error> {
        let name = self.name();
        validate_dns_label(name)
            .map_err(|msg| Error::validation_for_field(name, "metadata.name", msg))?;

        if let Some(pos) = self.spec.ingress.cnames.iter().position(|c| c.name.is_empty()) {
            return Err(Error::validation_for_field(
                name,
                format!("spec.ingress.cnames[{}].name", pos),
                "cname cannot be empty",
            ));
        }
        Ok(())
    }
}
