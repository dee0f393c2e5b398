use std::sync::Arc;

use util::HashMap;

use crate::{Error, NodeDesc};

/// Registry of node-type descriptors, keyed by type name.
///
/// Always an explicit instance injected into the graph and scheduler,
/// never ambient global state: tests register throwaway types on their
/// own registries and drop them afterwards.
#[derive(Default)]
pub struct Registry {
    descs: HashMap<String, Arc<NodeDesc>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type. Re-registering a name replaces the
    /// previous descriptor; existing node instances keep the Arc they
    /// were built with.
    pub fn register(&mut self, desc: NodeDesc) -> Arc<NodeDesc> {
        let desc = Arc::new(desc);
        self.descs.insert(desc.name.clone(), Arc::clone(&desc));
        desc
    }

    /// Remove a node type. Returns true if it was present.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.descs.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Result<&Arc<NodeDesc>, Error> {
        self.descs
            .get(name)
            .ok_or_else(|| Error::UnknownNodeType(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.descs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }

    /// Registered type names, sorted for stable output.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.descs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.type_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeRuntime;

    #[test]
    fn test_register_and_unregister() {
        let mut reg = Registry::new();
        assert!(reg.is_empty());
        reg.register(NodeDesc::new("Blur", NodeRuntime::Input));
        assert!(reg.contains("Blur"));
        assert!(reg.get("Blur").is_ok());
        assert!(matches!(
            reg.get("Sharpen").unwrap_err(),
            Error::UnknownNodeType(_)
        ));
        assert!(reg.unregister("Blur"));
        assert!(!reg.unregister("Blur"));
    }
}
