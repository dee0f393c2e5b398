/// Structural errors raised at graph-edit time.
/// Any operation that returns one of these leaves the graph unmodified.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Node type \"{0}\" is not registered")]
    UnknownNodeType(String),
    #[error("Node \"{0}\" does not exist in this graph")]
    NodeNotFound(String),
    #[error("Node name \"{0}\" is already taken")]
    DuplicateNode(String),
    #[error("Node \"{0}\" has no attribute \"{1}\"")]
    AttrNotFound(String, String),
    #[error("Value for \"{attr}\" does not conform to {expected}: {got}")]
    ValueType {
        attr: String,
        expected: String,
        got: String,
    },
    #[error("Choice value \"{0}\" is not one of the allowed values for \"{1}\"")]
    InvalidChoice(String, String),
    #[error("Connecting {src} -> {dst} would create a cycle")]
    Cycle { src: String, dst: String },
    #[error("Destination attribute \"{0}\" is already connected")]
    DuplicateEdge(String),
    #[error("Attribute \"{0}\" is not connected")]
    NotConnected(String),
    #[error("Cannot write to output attribute \"{0}\"; outputs are computed")]
    WriteToOutput(String),
    #[error("Cannot modify connected attribute \"{0}\"; remove the edge first")]
    WriteToLinked(String),
    #[error("Link cycle detected while resolving \"{0}\"")]
    LinkCycle(String),
    #[error("Attribute \"{0}\" is not a list")]
    NotAList(String),
    #[error("List index {0} is out of bounds (len {1})")]
    ListIndex(usize, usize),
    #[error("Node \"{0}\" is a compatibility placeholder and cannot be executed or edited")]
    CompatNode(String),
    #[error("Node \"{0}\" cannot be upgraded: {1}")]
    UpgradeFailed(String, String),
    #[error("Invalid link expression \"{0}\" (expected \"{{NodeName.attrName}}\")")]
    InvalidLinkExpr(String),
    #[error("Invalid command template: {0}")]
    InvalidTemplate(String),
    #[error("Unknown template variable \"{0}\"")]
    UnknownTemplateVar(String),
    #[error("Invalid graph file: {0}")]
    InvalidGraphFile(String),
    #[error("Invalid node type descriptor file: {0}")]
    InvalidDescFile(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
