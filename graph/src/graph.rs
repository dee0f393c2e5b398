//! The node graph: nodes, typed edges and the update pass that keeps
//! sizes, uids and output values consistent with the current inputs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;
use util::{HashMap, HashSet, IdVec};

use crate::template::{parse_template, render, CmdVars};
use crate::{
    AttrAddr, Attribute, Error, Node, NodeDesc, NodeId, SizeBase, SizePost, Store, Value,
};

/// A directed acyclic graph of node instances.
///
/// Edges always connect an upstream output attribute to a downstream
/// input attribute; a given input holds at most one incoming edge.
/// Removed nodes leave tombstones so `NodeId`s stay stable and
/// iteration keeps insertion order.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: IdVec<NodeId, Option<Node>>,
    by_name: HashMap<String, NodeId>,
    /// dst input addr -> src output addr.
    edges: HashMap<AttrAddr, AttrAddr>,
    cache_root: PathBuf,
}

impl Graph {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            nodes: IdVec::with_capacity(16),
            by_name: HashMap::default(),
            edges: HashMap::default(),
            cache_root: cache_root.into(),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn set_cache_root(&mut self, cache_root: impl Into<PathBuf>) {
        self.cache_root = cache_root.into();
        for node in self.nodes.iter_mut().flatten() {
            node.dirty = true;
        }
    }

    /// Live nodes, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    pub fn node_count(&self) -> usize {
        self.by_name.len()
    }

    pub fn node(&self, name: &str) -> Result<&Node, Error> {
        let id = self.id_of(name)?;
        Ok(self.get(id))
    }

    pub fn id_of(&self, name: &str) -> Result<NodeId, Error> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::NodeNotFound(name.to_owned()))
    }

    fn get(&self, id: NodeId) -> &Node {
        self.nodes.get(id).as_ref().expect("live node id")
    }

    /// Panics on a tombstoned id; ids obtained from this graph's
    /// traversal methods are always live.
    pub fn node_by_id(&self, id: NodeId) -> &Node {
        self.get(id)
    }

    fn get_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(id).as_mut().expect("live node id")
    }

    /// First free name of the form `Type_1`, `Type_2`, ...
    pub fn unique_name(&self, node_type: &str) -> String {
        let mut n = 1;
        loop {
            let name = format!("{node_type}_{n}");
            if !self.by_name.contains_key(&name) {
                return name;
            }
            n += 1;
        }
    }

    pub fn add_node(&mut self, name: &str, desc: Arc<NodeDesc>) -> Result<NodeId, Error> {
        self.insert(Node::new(name, desc))
    }

    /// Insert a prebuilt node (used by graph loading for compat
    /// placeholders).
    pub fn insert(&mut self, node: Node) -> Result<NodeId, Error> {
        if self.by_name.contains_key(node.name()) {
            return Err(Error::DuplicateNode(node.name().to_owned()));
        }
        let name = node.name().to_owned();
        let id = self.nodes.push(Some(node));
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Swap a node in place, keeping its id and name. Used when a
    /// compatibility placeholder is upgraded to a real node.
    pub(crate) fn replace_node(&mut self, name: &str, mut node: Node) -> Result<NodeId, Error> {
        let id = self.id_of(name)?;
        node.dirty = true;
        *self.nodes.get_mut(id) = Some(node);
        Ok(id)
    }

    /// Remove a node and every edge touching it. Downstream inputs that
    /// were fed by this node revert to their defaults.
    pub fn remove_node(&mut self, name: &str) -> Result<Node, Error> {
        let id = self.id_of(name)?;
        self.edges.retain(|dst, _| dst.node != name);
        let orphaned: Vec<AttrAddr> = self
            .edges
            .iter()
            .filter(|(_, src)| src.node == name)
            .map(|(dst, _)| dst.clone())
            .collect();
        for dst in orphaned {
            self.edges.remove(&dst);
            let dst_id = self.id_of(&dst.node)?;
            let node = self.get_mut(dst_id);
            node.attr_mut(&dst.attr)?.clear_link();
            node.dirty = true;
        }
        self.by_name.remove(name);
        let node = self.nodes.get_mut(id).take().expect("live node id");
        Ok(node)
    }

    /// Connect an upstream output to a downstream input.
    pub fn add_edge(&mut self, src: AttrAddr, dst: AttrAddr) -> Result<(), Error> {
        let src_id = self.id_of(&src.node)?;
        let dst_id = self.id_of(&dst.node)?;
        {
            let src_node = self.get(src_id);
            let src_attr = src_node.attr(&src.attr)?;
            if !src_attr.is_output {
                return Err(Error::NotConnected(src.to_string()));
            }
            let dst_node = self.get(dst_id);
            dst_node.guard_editable()?;
            let dst_attr = dst_node.attr(&dst.attr)?;
            if dst_attr.is_output {
                return Err(Error::WriteToOutput(dst.to_string()));
            }
        }
        if self.edges.contains_key(&dst) {
            return Err(Error::DuplicateEdge(dst.to_string()));
        }
        if src_id == dst_id || self.ancestors_of(src_id).contains(&dst_id) {
            return Err(Error::Cycle {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }
        self.get_mut(dst_id).attr_mut(&dst.attr)?.set_link(src.clone());
        self.edges.insert(dst.clone(), src);
        self.get_mut(dst_id).dirty = true;
        Ok(())
    }

    /// Disconnect a downstream input; it reverts to its default value.
    pub fn remove_edge(&mut self, dst: &AttrAddr) -> Result<(), Error> {
        if self.edges.remove(dst).is_none() {
            return Err(Error::NotConnected(dst.to_string()));
        }
        let dst_id = self.id_of(&dst.node)?;
        let node = self.get_mut(dst_id);
        node.attr_mut(&dst.attr)?.clear_link();
        node.dirty = true;
        Ok(())
    }

    pub fn edge_src(&self, dst: &AttrAddr) -> Option<&AttrAddr> {
        self.edges.get(dst)
    }

    pub fn edges(&self) -> impl Iterator<Item = (&AttrAddr, &AttrAddr)> {
        self.edges.iter()
    }

    pub fn set_value(&mut self, node: &str, attr: &str, value: Value) -> Result<(), Error> {
        self.edit(node, |n| n.attr_mut(attr)?.set_value(value))
    }

    pub fn list_append(&mut self, node: &str, attr: &str, value: Value) -> Result<(), Error> {
        self.edit(node, |n| n.attr_mut(attr)?.list_append(value))
    }

    pub fn list_extend(&mut self, node: &str, attr: &str, values: Vec<Value>) -> Result<(), Error> {
        self.edit(node, |n| n.attr_mut(attr)?.list_extend(values))
    }

    pub fn list_remove(&mut self, node: &str, attr: &str, index: usize) -> Result<(), Error> {
        self.edit(node, |n| n.attr_mut(attr)?.list_remove(index))
    }

    fn edit(
        &mut self,
        node: &str,
        edit: impl FnOnce(&mut Node) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let id = self.id_of(node)?;
        let node = self.get_mut(id);
        node.guard_editable()?;
        edit(node)?;
        node.dirty = true;
        Ok(())
    }

    /// Resolve an attribute address to a concrete value, following link
    /// chains. A visited set guards against malformed cyclic links that
    /// bypassed edge validation (e.g. a hand-edited graph file).
    pub fn resolved_value(&self, addr: &AttrAddr) -> Result<Value, Error> {
        let mut visited = HashSet::default();
        self.resolve_inner(addr, &mut visited)
    }

    fn resolve_inner(
        &self,
        addr: &AttrAddr,
        visited: &mut HashSet<AttrAddr>,
    ) -> Result<Value, Error> {
        if !visited.insert(addr.clone()) {
            return Err(Error::LinkCycle(addr.to_string()));
        }
        let node = self.node(&addr.node)?;
        let attr = node.attr(&addr.attr)?;
        match attr.store() {
            Store::Value(v) => Ok(v.clone()),
            Store::Link(next) => self.resolve_inner(next, visited),
            Store::Group(members) => {
                let mut values = Vec::with_capacity(members.len());
                for m in members {
                    values.push(self.resolve_inner(
                        &AttrAddr::new(&addr.node, &format!("{}.{}", addr.attr, m.name())),
                        visited,
                    )?);
                }
                Ok(Value::List(values))
            }
        }
    }

    /// Node ids upstream of `id` (transitive), excluding `id` itself.
    pub fn ancestors_of(&self, id: NodeId) -> HashSet<NodeId> {
        self.closure(id, |deps, n| deps.get(&n).cloned().unwrap_or_default())
    }

    /// Node ids downstream of `id` (transitive), excluding `id` itself.
    pub fn descendants_of(&self, id: NodeId) -> HashSet<NodeId> {
        let rdeps = self.reverse_deps();
        let mut out = HashSet::default();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            for &next in rdeps.get(&n).map(Vec::as_slice).unwrap_or(&[]) {
                if out.insert(next) {
                    stack.push(next);
                }
            }
        }
        out
    }

    fn closure(
        &self,
        id: NodeId,
        step: impl Fn(&HashMap<NodeId, Vec<NodeId>>, NodeId) -> Vec<NodeId>,
    ) -> HashSet<NodeId> {
        let deps = self.node_deps();
        let mut out = HashSet::default();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            for next in step(&deps, n) {
                if out.insert(next) {
                    stack.push(next);
                }
            }
        }
        out
    }

    /// Per-node upstream dependencies, derived from attribute edges.
    fn node_deps(&self) -> HashMap<NodeId, Vec<NodeId>> {
        let mut deps: HashMap<NodeId, Vec<NodeId>> = HashMap::default();
        for (dst, src) in &self.edges {
            let (Ok(dst_id), Ok(src_id)) = (self.id_of(&dst.node), self.id_of(&src.node)) else {
                continue;
            };
            let entry = deps.entry(dst_id).or_default();
            if !entry.contains(&src_id) {
                entry.push(src_id);
            }
        }
        deps
    }

    fn reverse_deps(&self) -> HashMap<NodeId, Vec<NodeId>> {
        let mut rdeps: HashMap<NodeId, Vec<NodeId>> = HashMap::default();
        for (dst_id, srcs) in self.node_deps() {
            for src_id in srcs {
                let entry = rdeps.entry(src_id).or_default();
                if !entry.contains(&dst_id) {
                    entry.push(dst_id);
                }
            }
        }
        rdeps
    }

    /// Nodes with no incoming edges, in insertion order.
    pub fn roots(&self) -> Vec<NodeId> {
        let deps = self.node_deps();
        self.live_ids()
            .into_iter()
            .filter(|id| deps.get(id).map_or(true, Vec::is_empty))
            .collect()
    }

    /// Nodes with no outgoing edges, in insertion order.
    pub fn leaves(&self) -> Vec<NodeId> {
        let rdeps = self.reverse_deps();
        self.live_ids()
            .into_iter()
            .filter(|id| rdeps.get(id).map_or(true, Vec::is_empty))
            .collect()
    }

    fn live_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter_with_ids()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id))
            .collect()
    }

    /// Topological order over all live nodes. Nodes whose dependencies
    /// are equally satisfied come out in insertion order, so plans are
    /// reproducible run to run.
    pub fn topo_order(&self) -> Vec<NodeId> {
        let deps = self.node_deps();
        let ids = self.live_ids();
        let mut done: HashSet<NodeId> = HashSet::default();
        let mut order = Vec::with_capacity(ids.len());
        while order.len() < ids.len() {
            let before = order.len();
            for &id in &ids {
                if done.contains(&id) {
                    continue;
                }
                let ready = deps
                    .get(&id)
                    .map_or(true, |ds| ds.iter().all(|d| done.contains(d)));
                if ready {
                    done.insert(id);
                    order.push(id);
                }
            }
            // edges are validated acyclic at insertion; a stall here
            // would mean internal state corruption
            debug_assert!(order.len() > before, "cycle in node graph");
            if order.len() == before {
                break;
            }
        }
        order
    }

    /// Upstream closure of the target nodes (targets included), in
    /// topological order. With no targets, the whole graph.
    pub fn upstream_order(&self, targets: &[NodeId]) -> Vec<NodeId> {
        let order = self.topo_order();
        if targets.is_empty() {
            return order;
        }
        let mut wanted: HashSet<NodeId> = targets.iter().copied().collect();
        for &t in targets {
            wanted.extend(self.ancestors_of(t));
        }
        order.into_iter().filter(|id| wanted.contains(id)).collect()
    }

    /// Recompute sizes, uids and output values for every dirty node and
    /// everything downstream of one, in topological order.
    pub fn update(&mut self) -> Result<(), Error> {
        let order = self.topo_order();
        let mut stale: HashSet<NodeId> = HashSet::default();
        for &id in &order {
            if self.get(id).dirty {
                stale.insert(id);
                stale.extend(self.descendants_of(id));
            }
        }
        for id in order {
            if !stale.contains(&id) {
                continue;
            }
            self.update_node(id)?;
        }
        Ok(())
    }

    fn update_node(&mut self, id: NodeId) -> Result<(), Error> {
        // Take the node out so hooks and uid computation can borrow the
        // rest of the graph immutably at the same time.
        let mut node = self.nodes.get_mut(id).take().expect("live node id");
        let result = self.update_taken_node(&mut node);
        // a failed update leaves the node dirty so the next pass retries
        if result.is_ok() {
            node.dirty = false;
        }
        *self.nodes.get_mut(id) = Some(node);
        result
    }

    fn update_taken_node(&self, node: &mut Node) -> Result<(), Error> {
        if node.is_compat() {
            return Ok(());
        }
        let desc = Arc::clone(node.desc());
        if let Some(hook) = &desc.pre_update {
            if let Err(e) = hook(node) {
                warn!("pre-update hook failed on {}: {e:#}", node.name());
            }
        }

        let size = self.eval_size(node)?;
        node.set_size(size);

        let resolve = |addr: &AttrAddr| self.resolved_value(addr);
        node.compute_uids(&resolve)?;

        self.eval_outputs(node)?;

        if let Some(hook) = &desc.post_update {
            if let Err(e) = hook(node) {
                warn!("post-update hook failed on {}: {e:#}", node.name());
            }
        }
        Ok(())
    }

    /// Evaluate a node's size strategy against current attribute values.
    fn eval_size(&self, node: &Node) -> Result<usize, Error> {
        let base = match &node.desc().size.base {
            SizeBase::Static(n) => *n,
            SizeBase::Dynamic(inputs) => {
                let mut total = 0usize;
                for name in inputs {
                    total += self.input_size(node, name)?;
                }
                total
            }
        };
        let size = match &node.desc().size.post {
            SizePost::None => base,
            SizePost::DivideBy(attr) => {
                let d = self.int_attr(node, attr)?;
                if d > 0 {
                    base.div_ceil(d as usize)
                } else {
                    base
                }
            }
            SizePost::Subtract(attr) => {
                let s = self.int_attr(node, attr)?.max(0) as usize;
                base.saturating_sub(s)
            }
        };
        Ok(size)
    }

    /// Size contribution of one named input: a linked input takes the
    /// source node's size, a list its length, an int its value, and
    /// everything else counts as 1.
    fn input_size(&self, node: &Node, name: &str) -> Result<usize, Error> {
        let attr = node.attr(name)?;
        if let Some(addr) = attr.link() {
            return Ok(self.node(&addr.node)?.size());
        }
        let resolve = |addr: &AttrAddr| self.resolved_value(addr);
        Ok(match node.effective_value(attr, &resolve)? {
            Value::List(items) => items.len(),
            Value::Int(i) => i.max(0) as usize,
            _ => 1,
        })
    }

    fn int_attr(&self, node: &Node, name: &str) -> Result<i64, Error> {
        let resolve = |addr: &AttrAddr| self.resolved_value(addr);
        let attr = node.attr(name)?;
        let value = node.effective_value(attr, &resolve)?;
        value.as_int().ok_or_else(|| Error::ValueType {
            attr: name.to_owned(),
            expected: "int".to_owned(),
            got: value.to_string(),
        })
    }

    /// Re-render templated output values, e.g.
    /// `{cache}/{nodeType}/{uid}/out.png`.
    fn eval_outputs(&self, node: &mut Node) -> Result<(), Error> {
        let mut vars = CmdVars::default();
        vars.insert("cache".to_owned(), self.cache_root.display().to_string());
        vars.insert("nodeType".to_owned(), node.node_type().to_owned());
        vars.insert("name".to_owned(), node.name().to_owned());
        if let Some(uid) = node.uid() {
            vars.insert("uid".to_owned(), uid.to_string());
        }
        let resolve = |addr: &AttrAddr| self.resolved_value(addr);
        for attr in node.attrs() {
            if !attr.is_output {
                insert_attr_vars(node, attr, attr.name().to_owned(), &resolve, &mut vars)?;
            }
        }

        let mut rendered: Vec<(String, Value)> = Vec::new();
        for attr in node.attrs() {
            if !attr.is_output {
                continue;
            }
            let Some(Value::Str(expr)) = &attr.desc.value else {
                continue;
            };
            if !expr.contains('{') {
                continue;
            }
            let template = parse_template(expr)?;
            rendered.push((attr.name().to_owned(), Value::Str(render(&template, &vars)?)));
        }
        for (name, value) in rendered {
            node.attr_mut(&name)?.set_output_value(value)?;
        }
        Ok(())
    }
}

/// Insert an attribute's value under its name, and group members under
/// dotted paths (`pose.rotation`), matching the template grammar.
fn insert_attr_vars(
    node: &Node,
    attr: &Attribute,
    path: String,
    resolve: &dyn Fn(&AttrAddr) -> Result<Value, Error>,
    vars: &mut CmdVars,
) -> Result<(), Error> {
    let value = node.effective_value(attr, resolve)?;
    vars.insert(path.clone(), value.to_cmd_str(false));
    if let Some(members) = attr.members() {
        for member in members {
            insert_attr_vars(node, member, format!("{path}.{}", member.name()), resolve, vars)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttributeDesc, NodeRuntime, Registry, SizeStrategy, ValueKind};

    fn registry() -> Registry {
        let mut reg = Registry::new();
        reg.register(
            NodeDesc::new("Source", NodeRuntime::Input)
                .with_input(
                    AttributeDesc::new(
                        "frames",
                        ValueKind::List {
                            element: Box::new(ValueKind::Str),
                        },
                    )
                    .with_uid(),
                )
                .with_output(
                    AttributeDesc::new("output", ValueKind::File)
                        .with_default(Value::Str("{cache}/{nodeType}/{uid}/list.txt".into())),
                )
                .with_size(SizeStrategy::from_input("frames")),
        );
        reg.register(
            NodeDesc::new("Blur", NodeRuntime::CommandLine {
                template: "blur --in {input} --out {output}".into(),
            })
            .with_input(AttributeDesc::new("input", ValueKind::File).with_uid())
            .with_input(
                AttributeDesc::new("radius", ValueKind::Int)
                    .with_uid()
                    .with_default(Value::Int(2)),
            )
            .with_output(
                AttributeDesc::new("output", ValueKind::File)
                    .with_default(Value::Str("{cache}/{nodeType}/{uid}/out.png".into())),
            )
            .with_size(SizeStrategy::from_input("input")),
        );
        reg
    }

    fn two_node_graph(reg: &Registry) -> Graph {
        let mut g = Graph::new("/cache");
        g.add_node("Source_1", Arc::clone(reg.get("Source").unwrap())).unwrap();
        g.add_node("Blur_1", Arc::clone(reg.get("Blur").unwrap())).unwrap();
        g.add_edge(
            AttrAddr::new("Source_1", "output"),
            AttrAddr::new("Blur_1", "input"),
        )
        .unwrap();
        g
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let reg = registry();
        let mut g = Graph::new("/cache");
        g.add_node("A", Arc::clone(reg.get("Blur").unwrap())).unwrap();
        assert!(matches!(
            g.add_node("A", Arc::clone(reg.get("Blur").unwrap())).unwrap_err(),
            Error::DuplicateNode(_)
        ));
        assert_eq!(g.unique_name("Blur"), "Blur_1");
    }

    #[test]
    fn test_edge_validation() {
        let reg = registry();
        let mut g = two_node_graph(&reg);

        // second edge into the same input
        assert!(matches!(
            g.add_edge(
                AttrAddr::new("Source_1", "output"),
                AttrAddr::new("Blur_1", "input"),
            )
            .unwrap_err(),
            Error::DuplicateEdge(_)
        ));

        // linking from an input attr
        assert!(g
            .add_edge(
                AttrAddr::new("Source_1", "frames"),
                AttrAddr::new("Blur_1", "radius"),
            )
            .is_err());
    }

    #[test]
    fn test_cycle_rejected() {
        let reg = registry();
        let mut g = Graph::new("/cache");
        g.add_node("A", Arc::clone(reg.get("Blur").unwrap())).unwrap();
        g.add_node("B", Arc::clone(reg.get("Blur").unwrap())).unwrap();
        g.add_edge(AttrAddr::new("A", "output"), AttrAddr::new("B", "input")).unwrap();
        assert!(matches!(
            g.add_edge(AttrAddr::new("B", "output"), AttrAddr::new("A", "input")).unwrap_err(),
            Error::Cycle { .. }
        ));
        // self-edge
        assert!(matches!(
            g.add_edge(AttrAddr::new("A", "output"), AttrAddr::new("A", "radius")).unwrap_err(),
            Error::Cycle { .. }
        ));
    }

    #[test]
    fn test_update_sizes_and_outputs() {
        let reg = registry();
        let mut g = two_node_graph(&reg);
        g.list_extend(
            "Source_1",
            "frames",
            vec![Value::Str("a.png".into()), Value::Str("b.png".into())],
        )
        .unwrap();
        g.update().unwrap();

        assert_eq!(g.node("Source_1").unwrap().size(), 2);
        // Blur's size follows its linked input's source node
        assert_eq!(g.node("Blur_1").unwrap().size(), 2);

        let uid = g.node("Blur_1").unwrap().uid().unwrap().to_string();
        let out = g
            .resolved_value(&AttrAddr::new("Blur_1", "output"))
            .unwrap();
        assert_eq!(
            out.as_str().unwrap(),
            format!("/cache/Blur/{uid}/out.png")
        );
    }

    #[test]
    fn test_upstream_change_propagates_to_downstream_uid() {
        let reg = registry();
        let mut g = two_node_graph(&reg);
        g.update().unwrap();
        let before = g.node("Blur_1").unwrap().uid().unwrap().clone();

        g.list_append("Source_1", "frames", Value::Str("a.png".into())).unwrap();
        g.update().unwrap();
        let after = g.node("Blur_1").unwrap().uid().unwrap().clone();
        assert_ne!(before, after);

        // changing a non-linked param on the downstream node only
        g.set_value("Blur_1", "radius", Value::Int(7)).unwrap();
        g.update().unwrap();
        assert_ne!(g.node("Blur_1").unwrap().uid().unwrap(), &after);
    }

    #[test]
    fn test_equal_params_equal_uid() {
        let reg = registry();
        let g1 = {
            let mut g = two_node_graph(&reg);
            g.update().unwrap();
            g
        };
        let g2 = {
            let mut g = two_node_graph(&reg);
            g.update().unwrap();
            g
        };
        assert_eq!(g1.node("Blur_1").unwrap().uid(), g2.node("Blur_1").unwrap().uid());
    }

    #[test]
    fn test_remove_edge_restores_default() {
        let reg = registry();
        let mut g = two_node_graph(&reg);
        g.remove_edge(&AttrAddr::new("Blur_1", "input")).unwrap();
        let v = g.resolved_value(&AttrAddr::new("Blur_1", "input")).unwrap();
        assert_eq!(v, Value::Str(String::new()));
        assert!(matches!(
            g.remove_edge(&AttrAddr::new("Blur_1", "input")).unwrap_err(),
            Error::NotConnected(_)
        ));
    }

    #[test]
    fn test_remove_node_clears_downstream_links() {
        let reg = registry();
        let mut g = two_node_graph(&reg);
        g.remove_node("Source_1").unwrap();
        assert!(g.node("Source_1").is_err());
        assert!(!g.node("Blur_1").unwrap().attr("input").unwrap().is_link());
    }

    #[test]
    fn test_topo_order_insertion_tiebreak() {
        let reg = registry();
        let mut g = Graph::new("/cache");
        g.add_node("C", Arc::clone(reg.get("Blur").unwrap())).unwrap();
        g.add_node("A", Arc::clone(reg.get("Blur").unwrap())).unwrap();
        g.add_node("B", Arc::clone(reg.get("Blur").unwrap())).unwrap();
        g.add_edge(AttrAddr::new("A", "output"), AttrAddr::new("B", "input")).unwrap();

        let order: Vec<&str> = g
            .topo_order()
            .into_iter()
            .map(|id| g.get(id).name())
            .collect();
        assert_eq!(order, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_failed_update_keeps_node_dirty() {
        let mut reg = Registry::new();
        reg.register(
            NodeDesc::new("Shard", NodeRuntime::Input)
                .with_input(
                    AttributeDesc::new("div", ValueKind::Str)
                        .with_default(Value::Str("x".into())),
                )
                .with_size(SizeStrategy {
                    base: SizeBase::Static(10),
                    post: SizePost::DivideBy("div".into()),
                }),
        );
        let mut g = Graph::new("/cache");
        g.add_node("Shard_1", Arc::clone(reg.get("Shard").unwrap())).unwrap();

        assert!(g.update().is_err());
        // the node stays dirty, so the next update retries (and fails
        // again) instead of silently reporting a clean graph
        assert!(g.update().is_err());
    }

    #[test]
    fn test_output_expr_resolves_group_member_var() {
        let mut reg = Registry::new();
        reg.register(
            NodeDesc::new("Render", NodeRuntime::Input)
                .with_input({
                    let mut params = AttributeDesc::new("params", ValueKind::Group);
                    params.members = vec![AttributeDesc::new("tag", ValueKind::Str)
                        .with_default(Value::Str("v1".into()))];
                    params
                })
                .with_output(
                    AttributeDesc::new("output", ValueKind::File).with_default(Value::Str(
                        "{cache}/{nodeType}/{uid}/{params.tag}/out.png".into(),
                    )),
                ),
        );
        let mut g = Graph::new("/cache");
        g.add_node("Render_1", Arc::clone(reg.get("Render").unwrap())).unwrap();
        g.update().unwrap();

        let out = g.resolved_value(&AttrAddr::new("Render_1", "output")).unwrap();
        assert!(out.as_str().unwrap().ends_with("/v1/out.png"));
    }

    #[test]
    fn test_upstream_order_filters_to_targets() {
        let reg = registry();
        let mut g = two_node_graph(&reg);
        g.add_node("Other", Arc::clone(reg.get("Blur").unwrap())).unwrap();
        let blur = g.id_of("Blur_1").unwrap();
        let order: Vec<&str> = g
            .upstream_order(&[blur])
            .into_iter()
            .map(|id| g.get(id).name())
            .collect();
        assert_eq!(order, vec!["Source_1", "Blur_1"]);
    }
}
