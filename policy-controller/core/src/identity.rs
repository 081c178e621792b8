use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A workload's mesh identity: a service account within a namespace.
///
/// Identities are written as `name.namespace`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceIdentity {
    pub name: String,
    pub namespace: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid service identity {0:?}: expected `name.namespace`")]
pub struct InvalidIdentity(pub String);

// === impl ServiceIdentity ===

impl ServiceIdentity {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// The certificate common name for this identity in the given trust
    /// domain.
    pub fn common_name(&self, trust_domain: &str) -> String {
        format!("{}.{}.{}", self.name, self.namespace, trust_domain)
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.namespace)
    }
}

impl FromStr for ServiceIdentity {
    type Err = InvalidIdentity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((name, ns)) if !name.is_empty() && !ns.is_empty() && !ns.contains('.') => {
                Ok(Self::new(name, ns))
            }
            _ => Err(InvalidIdentity(s.to_string())),
        }
    }
}

impl TryFrom<String> for ServiceIdentity {
    type Error = InvalidIdentity;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ServiceIdentity> for String {
    fn from(id: ServiceIdentity) -> Self {
        id.to_string()
    }
}
