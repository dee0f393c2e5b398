use std::sync::Arc;

use serde_json::Map;
use util::HashMap;

use crate::{
    chunk_ranges, AttrAddr, Attribute, AttributeDesc, ChunkRange, Error, NodeDesc, NodeRuntime,
    Uid, UidDigest, Value, UID_GROUP_DEFAULT,
};

/// Typed index of a node within a `Graph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl From<usize> for NodeId {
    fn from(i: usize) -> Self {
        Self(i)
    }
}

impl From<NodeId> for usize {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Placeholder payload for a node whose type is unknown or whose
/// serialized attributes no longer match the registered descriptor.
/// The raw values are preserved verbatim so nothing is lost on re-save.
#[derive(Debug, Clone)]
pub struct CompatInfo {
    pub node_type: String,
    pub raw_values: Map<String, serde_json::Value>,
    pub issue: String,
}

/// A node instance: a named application of a node type inside a graph.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    desc: Arc<NodeDesc>,
    attrs: Vec<Attribute>,
    uids: HashMap<usize, Uid>,
    size: usize,
    compat: Option<CompatInfo>,
    /// Set when an attribute changes; cleared by `Graph::update`.
    pub(crate) dirty: bool,
}

impl Node {
    pub fn new(name: &str, desc: Arc<NodeDesc>) -> Self {
        let attrs = desc
            .all_attrs()
            .map(|(a, is_output)| Attribute::from_desc(a, is_output))
            .collect();
        Self {
            name: name.to_owned(),
            desc,
            attrs,
            uids: HashMap::default(),
            size: 0,
            compat: None,
            dirty: true,
        }
    }

    /// Build a placeholder for an unloadable node. It keeps its name and
    /// raw attribute values but cannot be edited or executed.
    pub fn new_compat(
        name: &str,
        node_type: &str,
        raw_values: Map<String, serde_json::Value>,
        issue: String,
    ) -> Self {
        let desc = Arc::new(NodeDesc::new(node_type, NodeRuntime::Input));
        let mut node = Self::new(name, desc);
        node.compat = Some(CompatInfo {
            node_type: node_type.to_owned(),
            raw_values,
            issue,
        });
        node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_type(&self) -> &str {
        &self.desc.name
    }

    pub fn desc(&self) -> &Arc<NodeDesc> {
        &self.desc
    }

    pub fn is_compat(&self) -> bool {
        self.compat.is_some()
    }

    pub fn compat(&self) -> Option<&CompatInfo> {
        self.compat.as_ref()
    }

    /// Task count, as of the last graph update.
    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    /// Cache-folder uid (group 0), as of the last graph update.
    pub fn uid(&self) -> Option<&Uid> {
        self.uids.get(&UID_GROUP_DEFAULT)
    }

    pub fn uid_for_group(&self, group: usize) -> Option<&Uid> {
        self.uids.get(&group)
    }

    /// Chunk decomposition at the current size.
    pub fn chunks(&self) -> Vec<ChunkRange> {
        chunk_ranges(self.size, self.desc.parallelization)
    }

    pub fn attrs(&self) -> &[Attribute] {
        &self.attrs
    }

    pub(crate) fn attrs_mut(&mut self) -> &mut [Attribute] {
        &mut self.attrs
    }

    /// Look up an attribute by dotted path (`"pose.rotation"` descends
    /// into group members).
    pub fn attr(&self, path: &str) -> Result<&Attribute, Error> {
        let not_found = || Error::AttrNotFound(self.name.clone(), path.to_owned());
        let mut parts = path.split('.');
        let head = parts.next().ok_or_else(not_found)?;
        let mut attr = self
            .attrs
            .iter()
            .find(|a| a.name() == head)
            .ok_or_else(not_found)?;
        for part in parts {
            attr = attr
                .members()
                .and_then(|ms| ms.iter().find(|a| a.name() == part))
                .ok_or_else(not_found)?;
        }
        Ok(attr)
    }

    pub(crate) fn attr_mut(&mut self, path: &str) -> Result<&mut Attribute, Error> {
        let not_found = || Error::AttrNotFound(self.name.clone(), path.to_owned());
        let mut parts = path.split('.');
        let head = parts.next().ok_or_else(not_found)?;
        let mut attr = self
            .attrs
            .iter_mut()
            .find(|a| a.name() == head)
            .ok_or_else(not_found)?;
        for part in parts {
            attr = attr
                .members_mut()
                .and_then(|ms| ms.iter_mut().find(|a| a.name() == part))
                .ok_or_else(not_found)?;
        }
        Ok(attr)
    }

    /// Whether the attribute's enabled predicate currently holds.
    pub fn attr_enabled(&self, attr: &Attribute) -> bool {
        match &attr.desc.enabled_if {
            Some(enabled) => enabled(self),
            None => true,
        }
    }

    pub(crate) fn guard_editable(&self) -> Result<(), Error> {
        if self.is_compat() {
            return Err(Error::CompatNode(self.name.clone()));
        }
        Ok(())
    }

    /// Resolve an attribute to a concrete value, following links through
    /// `resolve` and flattening groups to lists of member values.
    pub fn effective_value(
        &self,
        attr: &Attribute,
        resolve: &dyn Fn(&AttrAddr) -> Result<Value, Error>,
    ) -> Result<Value, Error> {
        match attr.store() {
            crate::Store::Value(v) => Ok(v.clone()),
            crate::Store::Link(addr) => resolve(addr),
            crate::Store::Group(members) => {
                let mut values = Vec::with_capacity(members.len());
                for m in members {
                    values.push(self.effective_value(m, resolve)?);
                }
                Ok(Value::List(values))
            }
        }
    }

    /// Recompute the per-group uids from enabled uid-group attributes.
    ///
    /// Entries are hashed as sorted (path, value) pairs after the type
    /// name, so declaration order never leaks into the fingerprint.
    pub(crate) fn compute_uids(
        &mut self,
        resolve: &dyn Fn(&AttrAddr) -> Result<Value, Error>,
    ) -> Result<(), Error> {
        let mut groups: Vec<usize> = Vec::new();
        for attr in &self.attrs {
            collect_groups(&attr.desc, &mut groups);
        }
        groups.sort_unstable();
        groups.dedup();
        if !groups.contains(&UID_GROUP_DEFAULT) {
            groups.push(UID_GROUP_DEFAULT);
        }

        let mut uids = HashMap::default();
        for group in groups {
            let mut entries: Vec<(String, Value)> = Vec::new();
            for attr in &self.attrs {
                self.collect_uid_entries(attr, attr.name().to_owned(), group, resolve, &mut entries)?;
            }
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut digest = UidDigest::new();
            digest.write_str(self.node_type());
            for (path, value) in &entries {
                digest.write_str(path);
                digest.write_value(value);
            }
            uids.insert(group, digest.finish());
        }
        self.uids = uids;
        Ok(())
    }

    fn collect_uid_entries(
        &self,
        attr: &Attribute,
        path: String,
        group: usize,
        resolve: &dyn Fn(&AttrAddr) -> Result<Value, Error>,
        entries: &mut Vec<(String, Value)>,
    ) -> Result<(), Error> {
        if attr.desc.in_uid_group(group) && !attr.is_output && self.attr_enabled(attr) {
            let value = self.effective_value(attr, resolve)?;
            let ignored = attr
                .desc
                .uid_ignore_value
                .as_ref()
                .is_some_and(|ignore| *ignore == value);
            if !ignored {
                entries.push((path.clone(), value));
            }
        }
        if let Some(members) = attr.members() {
            for m in members {
                self.collect_uid_entries(m, format!("{path}.{}", m.name()), group, resolve, entries)?;
            }
        }
        Ok(())
    }
}

fn collect_groups(desc: &AttributeDesc, groups: &mut Vec<usize>) {
    if desc.invalidate {
        groups.extend(desc.uid.iter().copied());
    }
    for m in &desc.members {
        collect_groups(m, groups);
    }
}
