//! Graph file persistence and node-type descriptor loading.
//!
//! Graph files are JSON with a small header and one record per node.
//! Only non-default attribute values are written; edges are stored as
//! `{NodeName.attrName}` link expressions on the destination input.
//! Loading is resilient: a node whose type is unknown or whose values
//! no longer fit the registered descriptor becomes a compatibility
//! placeholder instead of failing the whole file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::{
    AttrAddr, AttributeDesc, Error, Graph, Node, NodeDesc, NodeRuntime, Parallelization,
    Registry, SizeStrategy, Value,
};

pub const FILE_VERSION: &str = "1.0";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    file_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache_root: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeRecord {
    node_type: String,
    #[serde(default)]
    attributes: Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphFile {
    header: Header,
    graph: BTreeMap<String, NodeRecord>,
}

/// Write a graph to disk as JSON, atomically (tmp + rename).
pub fn save_graph(graph: &Graph, path: &Path) -> Result<(), Error> {
    let mut records = BTreeMap::new();
    for node in graph.nodes() {
        let record = match node.compat() {
            Some(compat) => NodeRecord {
                node_type: compat.node_type.clone(),
                attributes: compat.raw_values.clone(),
            },
            None => {
                let mut attributes = Map::new();
                for attr in node.attrs() {
                    if attr.is_output || attr.is_default() {
                        continue;
                    }
                    attributes.insert(attr.name().to_owned(), attr.export_value());
                }
                NodeRecord {
                    node_type: node.node_type().to_owned(),
                    attributes,
                }
            }
        };
        records.insert(node.name().to_owned(), record);
    }
    let file = GraphFile {
        header: Header {
            file_version: FILE_VERSION.to_owned(),
            cache_root: Some(graph.cache_root().display().to_string()),
        },
        graph: records,
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| Error::InvalidGraphFile(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a graph file, resolving node types against the registry.
///
/// Runs a graph update before returning, so sizes, uids and output
/// values are consistent with the loaded inputs.
pub fn load_graph(path: &Path, registry: &Registry) -> Result<Graph, Error> {
    let text = fs::read_to_string(path)?;
    let file: GraphFile =
        serde_json::from_str(&text).map_err(|e| Error::InvalidGraphFile(e.to_string()))?;

    let cache_root = file.header.cache_root.unwrap_or_default();
    let mut graph = Graph::new(cache_root);
    let mut pending: Vec<(AttrAddr, AttrAddr)> = Vec::new();

    for (name, record) in &file.graph {
        match registry.get(&record.node_type) {
            Err(_) => {
                warn!("unknown node type \"{}\" for {name}; loading as placeholder", record.node_type);
                graph.insert(Node::new_compat(
                    name,
                    &record.node_type,
                    record.attributes.clone(),
                    format!("unknown node type \"{}\"", record.node_type),
                ))?;
            }
            Ok(desc) => {
                let mut node = Node::new(name, Arc::clone(desc));
                let (links, lost) = apply_values(&mut node, &record.attributes);
                if lost.is_empty() {
                    graph.insert(node)?;
                    pending.extend(
                        links
                            .into_iter()
                            .map(|(attr, src)| (AttrAddr::new(name, &attr), src)),
                    );
                } else {
                    warn!("{name} no longer matches its \"{}\" descriptor (mismatched: {}); loading as placeholder",
                        record.node_type, lost.join(", "));
                    graph.insert(Node::new_compat(
                        name,
                        &record.node_type,
                        record.attributes.clone(),
                        format!("mismatched attributes: {}", lost.join(", ")),
                    ))?;
                }
            }
        }
    }

    for (dst, src) in pending {
        if let Err(e) = graph.add_edge(src.clone(), dst.clone()) {
            warn!("skipping edge {src} -> {dst}: {e}");
        }
    }

    graph.update()?;
    Ok(graph)
}

/// Apply raw JSON attribute values to a freshly built node.
///
/// Returns link expressions found (attr path, source address) for a
/// later edge pass, and the paths of values that did not fit the
/// descriptor.
fn apply_values(
    node: &mut Node,
    values: &Map<String, serde_json::Value>,
) -> (Vec<(String, AttrAddr)>, Vec<String>) {
    let mut links = Vec::new();
    let mut lost = Vec::new();
    for (name, json) in values {
        apply_one(node, name.clone(), json, &mut links, &mut lost);
    }
    (links, lost)
}

fn apply_one(
    node: &mut Node,
    path: String,
    json: &serde_json::Value,
    links: &mut Vec<(String, AttrAddr)>,
    lost: &mut Vec<String>,
) {
    if let serde_json::Value::String(s) = json {
        if let Ok(src) = AttrAddr::from_link_expr(s) {
            links.push((path, src));
            return;
        }
    }
    let is_group = node
        .attr(&path)
        .map(|a| a.members().is_some())
        .unwrap_or(false);
    if is_group {
        match json {
            serde_json::Value::Object(members) => {
                for (member, value) in members {
                    apply_one(node, format!("{path}.{member}"), value, links, lost);
                }
            }
            _ => lost.push(path),
        }
        return;
    }
    let Ok(value) = serde_json::from_value::<Value>(json.clone()) else {
        lost.push(path);
        return;
    };
    let applied = node
        .attr_mut(&path)
        .and_then(|attr| attr.set_value(value));
    if applied.is_err() {
        lost.push(path);
    }
}

/// Upgrade a compatibility placeholder to its (re-)registered type.
///
/// Values and links that still fit the descriptor are re-applied;
/// the rest are reported back as lost.
pub fn upgrade_node(
    graph: &mut Graph,
    registry: &Registry,
    name: &str,
) -> Result<Vec<String>, Error> {
    let (node_type, raw_values) = {
        let node = graph.node(name)?;
        let compat = node.compat().ok_or_else(|| {
            Error::UpgradeFailed(name.to_owned(), "not a compatibility placeholder".to_owned())
        })?;
        (compat.node_type.clone(), compat.raw_values.clone())
    };
    let desc = registry.get(&node_type).map_err(|_| {
        Error::UpgradeFailed(
            name.to_owned(),
            format!("node type \"{node_type}\" is not registered"),
        )
    })?;

    let mut node = Node::new(name, Arc::clone(desc));
    let (links, mut lost) = apply_values(&mut node, &raw_values);
    graph.replace_node(name, node)?;
    for (attr, src) in links {
        let dst = AttrAddr::new(name, &attr);
        if let Err(e) = graph.add_edge(src, dst.clone()) {
            warn!("could not restore edge into {dst}: {e}");
            lost.push(attr);
        }
    }
    Ok(lost)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescFile {
    name: String,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    inputs: Vec<AttributeDesc>,
    #[serde(default)]
    outputs: Vec<AttributeDesc>,
    #[serde(default)]
    internals: Vec<AttributeDesc>,
    #[serde(default)]
    size: Option<SizeStrategy>,
    #[serde(default)]
    parallelization: Option<Parallelization>,
}

impl From<DescFile> for NodeDesc {
    fn from(file: DescFile) -> Self {
        let runtime = match file.command {
            Some(template) => NodeRuntime::CommandLine { template },
            None => NodeRuntime::Input,
        };
        let mut desc = NodeDesc::new(&file.name, runtime);
        desc.inputs = file.inputs;
        desc.outputs = file.outputs;
        desc.internals = file.internals;
        desc.size = file.size.unwrap_or_else(|| SizeStrategy::fixed(1));
        desc.parallelization = file.parallelization;
        desc
    }
}

/// Load every `*.json` node-type descriptor in a directory, in file
/// name order.
pub fn load_node_descs(dir: &Path) -> Result<Vec<NodeDesc>, Error> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut descs = Vec::with_capacity(paths.len());
    for path in paths {
        let text = fs::read_to_string(&path)?;
        let file: DescFile = serde_json::from_str(&text)
            .map_err(|e| Error::InvalidDescFile(format!("{}: {e}", path.display())))?;
        descs.push(NodeDesc::from(file));
    }
    Ok(descs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValueKind;

    fn registry() -> Registry {
        let mut reg = Registry::new();
        reg.register(
            NodeDesc::new("Source", NodeRuntime::Input)
                .with_input(AttributeDesc::new("path", ValueKind::File).with_uid())
                .with_output(
                    AttributeDesc::new("output", ValueKind::File)
                        .with_default(Value::Str("{cache}/{nodeType}/{uid}/out.txt".into())),
                ),
        );
        reg.register(
            NodeDesc::new("Blur", NodeRuntime::CommandLine {
                template: "blur --in {input}".into(),
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
            ),
        );
        reg
    }

    fn sample_graph(reg: &Registry) -> Graph {
        let mut g = Graph::new("/cache");
        g.add_node("Source_1", Arc::clone(reg.get("Source").unwrap())).unwrap();
        g.add_node("Blur_1", Arc::clone(reg.get("Blur").unwrap())).unwrap();
        g.set_value("Source_1", "path", Value::Str("/data/in.png".into())).unwrap();
        g.set_value("Blur_1", "radius", Value::Int(5)).unwrap();
        g.add_edge(
            AttrAddr::new("Source_1", "output"),
            AttrAddr::new("Blur_1", "input"),
        )
        .unwrap();
        g.update().unwrap();
        g
    }

    #[test]
    fn test_save_load_round_trip() {
        let reg = registry();
        let g = sample_graph(&reg);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");

        save_graph(&g, &path).unwrap();
        let loaded = load_graph(&path, &reg).unwrap();

        assert_eq!(loaded.node_count(), 2);
        assert_eq!(
            loaded
                .resolved_value(&AttrAddr::new("Blur_1", "radius"))
                .unwrap(),
            Value::Int(5)
        );
        assert!(loaded.node("Blur_1").unwrap().attr("input").unwrap().is_link());
        // uids must survive a round trip unchanged
        assert_eq!(loaded.node("Blur_1").unwrap().uid(), g.node("Blur_1").unwrap().uid());
    }

    #[test]
    fn test_unknown_type_becomes_compat_and_upgrades() {
        let reg = registry();
        let g = sample_graph(&reg);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        save_graph(&g, &path).unwrap();

        let mut partial = Registry::new();
        partial.register(
            NodeDesc::new("Source", NodeRuntime::Input)
                .with_input(AttributeDesc::new("path", ValueKind::File).with_uid())
                .with_output(
                    AttributeDesc::new("output", ValueKind::File)
                        .with_default(Value::Str("{cache}/{nodeType}/{uid}/out.txt".into())),
                ),
        );
        let mut loaded = load_graph(&path, &partial).unwrap();
        assert!(loaded.node("Blur_1").unwrap().is_compat());
        assert!(matches!(
            loaded.set_value("Blur_1", "radius", Value::Int(1)).unwrap_err(),
            Error::CompatNode(_)
        ));

        // values survive placeholder status through a re-save
        let path2 = dir.path().join("resaved.json");
        save_graph(&loaded, &path2).unwrap();
        let reloaded = load_graph(&path2, &reg).unwrap();
        assert!(!reloaded.node("Blur_1").unwrap().is_compat());
        assert_eq!(
            reloaded
                .resolved_value(&AttrAddr::new("Blur_1", "radius"))
                .unwrap(),
            Value::Int(5)
        );

        // and the placeholder can be upgraded in place once the type is back
        partial.register(
            NodeDesc::new("Blur", NodeRuntime::CommandLine {
                template: "blur --in {input}".into(),
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
            ),
        );
        let lost = upgrade_node(&mut loaded, &partial, "Blur_1").unwrap();
        assert!(lost.is_empty());
        loaded.update().unwrap();
        assert!(!loaded.node("Blur_1").unwrap().is_compat());
        assert!(loaded.node("Blur_1").unwrap().attr("input").unwrap().is_link());
    }

    #[test]
    fn test_load_node_descs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("blur.json"),
            r#"{
                "name": "Blur",
                "command": "blur --in {input} --out {output}",
                "inputs": [
                    { "name": "input", "kind": "file", "uid": [0] },
                    { "name": "radius", "kind": "int", "value": 2, "uid": [0] }
                ],
                "outputs": [
                    { "name": "output", "kind": "file", "value": "{cache}/{nodeType}/{uid}/out.png" }
                ],
                "parallelization": { "blockSize": 10 }
            }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let descs = load_node_descs(dir.path()).unwrap();
        assert_eq!(descs.len(), 1);
        let blur = &descs[0];
        assert_eq!(blur.name, "Blur");
        assert!(matches!(blur.runtime, NodeRuntime::CommandLine { .. }));
        assert_eq!(blur.inputs.len(), 2);
        assert_eq!(blur.parallelization, Some(Parallelization { block_size: 10 }));
    }

    #[test]
    fn test_bad_desc_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        assert!(matches!(
            load_node_descs(dir.path()).unwrap_err(),
            Error::InvalidDescFile(_)
        ));
    }
}
