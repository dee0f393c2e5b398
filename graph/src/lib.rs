mod value;
pub use value::{Value, ValueKind};

mod desc;
pub use desc::{
    AttributeDesc, ChunkContext, ChunkHook, EnabledFn, NodeDesc, NodeHook, NodeRuntime,
    Parallelization, SizeBase, SizePost, SizeStrategy,
};

mod registry;
pub use registry::Registry;

mod attribute;
pub use attribute::{AttrAddr, Attribute, Store};

mod uid;
pub use uid::{Uid, UidDigest, UID_GROUP_DEFAULT};

mod node;
pub use node::{CompatInfo, Node, NodeId};

mod graph;
pub use graph::Graph;

mod chunk;
pub use chunk::{chunk_ranges, ChunkRange};

mod status;
pub use status::{NodeStatus, Status, StatusRecord};

mod template;
pub use template::{parse_template, render, CmdVars, Template, Token};

mod io;
pub use io::{load_graph, load_node_descs, save_graph, upgrade_node};

mod error;
pub use error::Error;
