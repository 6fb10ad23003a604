use std::fmt;

use kube::{Resource, ResourceExt};

/// Namespace + name pair addressing exactly one namespaced object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of any namespaced object. Objects without a namespace map to
    /// the empty namespace, which no namespaced lookup will match.
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }

    /// Identity of a child derived from this one: same namespace, suffixed name
    pub fn child(&self, suffix: &str) -> Self {
        Self::new(self.namespace.clone(), format!("{}-{}", self.name, suffix))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
