use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{ChunkRange, Node, Value, ValueKind};

/// Everything a per-chunk callable or hook gets to see: the identity of
/// the chunk and the folder it is allowed to write into.
#[derive(Debug, Clone)]
pub struct ChunkContext {
    pub node_name: String,
    pub node_type: String,
    pub uid: String,
    pub range: ChunkRange,
    /// Absolute cache folder of the owning node; the chunk's working directory.
    pub folder: PathBuf,
}

/// Hook run on a chunk boundary (pre/post chunk), or as the in-process
/// runtime of a callable node.
pub type ChunkHook = Arc<dyn Fn(&ChunkContext) -> anyhow::Result<()> + Send + Sync>;

/// Hook run on a node boundary during graph update (pre/post update).
/// A failing update hook is logged and contained; it never poisons other nodes.
pub type NodeHook = Arc<dyn Fn(&mut Node) -> anyhow::Result<()> + Send + Sync>;

/// Predicate deciding whether an attribute is currently enabled.
/// Disabled attributes contribute to neither the uid nor the command line.
pub type EnabledFn = Arc<dyn Fn(&Node) -> bool + Send + Sync>;

/// How a node's chunks actually get processed.
#[derive(Clone)]
pub enum NodeRuntime {
    /// A source node: one chunk that trivially succeeds.
    Input,
    /// Format the template with attribute and range variables,
    /// then run it as a subprocess.
    CommandLine { template: String },
    /// Run this closure once per chunk, in process.
    Callable(ChunkHook),
}

impl std::fmt::Debug for NodeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRuntime::Input => write!(f, "Input"),
            NodeRuntime::CommandLine { template } => {
                f.debug_struct("CommandLine").field("template", template).finish()
            }
            NodeRuntime::Callable(_) => write!(f, "Callable(..)"),
        }
    }
}

/// Splits a node's size into fixed-size blocks for parallel execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parallelization {
    pub block_size: usize,
}

/// Base aggregate for a node's size (task count).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SizeBase {
    /// A constant task count.
    Static(usize),
    /// Sum over the named input attributes: a linked input contributes the
    /// source node's size, a list its length, an int param its value, else 1.
    Dynamic(Vec<String>),
}

/// Post-processing applied to the base aggregate.
/// The operand names an int attribute on the node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SizePost {
    #[default]
    None,
    DivideBy(String),
    Subtract(String),
}

/// Pluggable size strategy, evaluated by `Graph::update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeStrategy {
    pub base: SizeBase,
    #[serde(default)]
    pub post: SizePost,
}

impl SizeStrategy {
    pub fn fixed(size: usize) -> Self {
        Self {
            base: SizeBase::Static(size),
            post: SizePost::None,
        }
    }

    pub fn from_input(input: &str) -> Self {
        Self {
            base: SizeBase::Dynamic(vec![input.to_owned()]),
            post: SizePost::None,
        }
    }
}

/// Immutable description of one attribute of a node type.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDesc {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub kind: ValueKind,
    /// Default value; when absent, a kind-specific zero value is used.
    #[serde(default)]
    pub value: Option<Value>,
    /// Uid groups this attribute participates in (usually `[0]` or empty).
    #[serde(default)]
    pub uid: Vec<usize>,
    /// When false, changes to this attribute never invalidate the uid,
    /// regardless of the `uid` groups (comment-style fields).
    #[serde(default = "default_true")]
    pub invalidate: bool,
    /// A value that, when matched, drops this attribute's uid contribution
    /// even though it normally participates (e.g. an empty string).
    #[serde(default)]
    pub uid_ignore_value: Option<Value>,
    /// Child descriptors when `kind` is `Group`.
    #[serde(default)]
    pub members: Vec<AttributeDesc>,
    /// Enabled predicate; `None` means always enabled.
    #[serde(skip)]
    pub enabled_if: Option<EnabledFn>,
}

fn default_true() -> bool {
    true
}

impl std::fmt::Debug for AttributeDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeDesc")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("uid", &self.uid)
            .field("invalidate", &self.invalidate)
            .finish()
    }
}

impl AttributeDesc {
    /// Minimal descriptor with a kind-specific zero default.
    pub fn new(name: &str, kind: ValueKind) -> Self {
        Self {
            name: name.to_owned(),
            label: String::new(),
            kind,
            value: None,
            uid: Vec::new(),
            invalidate: true,
            uid_ignore_value: None,
            members: Vec::new(),
            enabled_if: None,
        }
    }

    /// Builder-style: participate in uid group 0.
    pub fn with_uid(mut self) -> Self {
        self.uid = vec![0];
        self
    }

    /// Builder-style: participate in the given uid groups.
    pub fn with_uid_groups(mut self, groups: &[usize]) -> Self {
        self.uid = groups.to_vec();
        self
    }

    /// Builder-style: set the default value.
    pub fn with_default(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Default value for fresh attribute instances.
    pub fn default_value(&self) -> Value {
        if let Some(v) = &self.value {
            return v.clone();
        }
        match &self.kind {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Int => Value::Int(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Str | ValueKind::File => Value::Str(String::new()),
            ValueKind::Choice { options } => {
                Value::Str(options.first().cloned().unwrap_or_default())
            }
            ValueKind::List { .. } => Value::List(Vec::new()),
            ValueKind::Group => Value::List(Vec::new()),
        }
    }

    /// Whether this attribute participates in the given uid group.
    pub fn in_uid_group(&self, group: usize) -> bool {
        self.invalidate && self.uid.contains(&group)
    }
}

/// Declarative description of a node type: its attributes, sizing,
/// parallelization, runtime strategy and lifecycle hooks.
/// The engine never subclasses; it reads these records from a `Registry`.
#[derive(Clone)]
pub struct NodeDesc {
    pub name: String,
    pub inputs: Vec<AttributeDesc>,
    pub outputs: Vec<AttributeDesc>,
    /// Internal parameters (comments, labels); usually excluded from the uid.
    pub internals: Vec<AttributeDesc>,
    pub size: SizeStrategy,
    pub parallelization: Option<Parallelization>,
    pub runtime: NodeRuntime,
    pub pre_update: Option<NodeHook>,
    pub post_update: Option<NodeHook>,
    pub pre_chunk: Option<ChunkHook>,
    pub post_chunk: Option<ChunkHook>,
}

impl std::fmt::Debug for NodeDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDesc")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("size", &self.size)
            .field("parallelization", &self.parallelization)
            .field("runtime", &self.runtime)
            .finish()
    }
}

impl NodeDesc {
    /// A bare descriptor with a static size of 1 and no attributes.
    pub fn new(name: &str, runtime: NodeRuntime) -> Self {
        Self {
            name: name.to_owned(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            internals: Vec::new(),
            size: SizeStrategy::fixed(1),
            parallelization: None,
            runtime,
            pre_update: None,
            post_update: None,
            pre_chunk: None,
            post_chunk: None,
        }
    }

    pub fn with_input(mut self, attr: AttributeDesc) -> Self {
        self.inputs.push(attr);
        self
    }

    pub fn with_output(mut self, attr: AttributeDesc) -> Self {
        self.outputs.push(attr);
        self
    }

    pub fn with_internal(mut self, attr: AttributeDesc) -> Self {
        self.internals.push(attr);
        self
    }

    pub fn with_size(mut self, size: SizeStrategy) -> Self {
        self.size = size;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.parallelization = Some(Parallelization { block_size });
        self
    }

    /// All attribute descriptors, in declaration order:
    /// inputs, then internals, then outputs.
    pub fn all_attrs(&self) -> impl Iterator<Item = (&AttributeDesc, bool)> {
        self.inputs
            .iter()
            .map(|a| (a, false))
            .chain(self.internals.iter().map(|a| (a, false)))
            .chain(self.outputs.iter().map(|a| (a, true)))
    }
}
