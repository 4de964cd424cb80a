use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;

use super::traits::KernelConnector;

struct Registered {
    connector: Arc<dyn KernelConnector>,
    tags: BTreeSet<String>,
}

/// Connectors keyed by URI, with free-form tags for lookup by role.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: IndexMap<String, Registered>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connector` under its URI, replacing any earlier one.
    pub fn register<I, S>(&mut self, connector: Arc<dyn KernelConnector>, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags = tags.into_iter().map(Into::into).collect();
        self.connectors
            .insert(connector.uri().to_string(), Registered { connector, tags });
    }

    pub fn get(&self, uri: &str) -> Option<Arc<dyn KernelConnector>> {
        self.connectors.get(uri).map(|r| r.connector.clone())
    }

    /// First connector registered with `tag`.
    pub fn tagged(&self, tag: &str) -> Option<Arc<dyn KernelConnector>> {
        self.connectors
            .values()
            .find(|r| r.tags.contains(tag))
            .map(|r| r.connector.clone())
    }

    /// Exact URI match first, then the first connector carrying `tag`.
    pub fn resolve(&self, uri: &str, tag: Option<&str>) -> Option<Arc<dyn KernelConnector>> {
        self.get(uri).or_else(|| self.tagged(tag?))
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.connectors.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use weave_kernel::CompositeKernel;

    use super::*;
    use crate::connectors::LoopbackConnector;

    #[test]
    fn resolves_by_uri_then_tag() {
        let mut registry = ConnectorRegistry::new();
        let remote = CompositeKernel::new("frontend");
        registry.register(
            Arc::new(LoopbackConnector::new("kernel://vscode", remote.clone())),
            ["frontend"],
        );
        registry.register(
            Arc::new(LoopbackConnector::new("kernel://other", remote)),
            Vec::<String>::new(),
        );

        assert_eq!(
            registry.resolve("kernel://vscode", None).unwrap().uri(),
            "kernel://vscode"
        );
        assert_eq!(
            registry.resolve("kernel://missing", Some("frontend")).unwrap().uri(),
            "kernel://vscode"
        );
        assert!(registry.resolve("kernel://missing", None).is_none());
        assert_eq!(registry.uris().count(), 2);
    }
}
