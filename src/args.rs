use clap::Parser;

const CMD_NAME: &str = "gantry";
const DEFAULT_GRAPH: &str = "pipeline.json";
const DEFAULT_CACHE: &str = "cache";

/// Stores our command-line args format.
#[derive(Parser)]
#[command(name = CMD_NAME, version, about = None, long_about = None)]
pub struct Args {
    /// Graph definition file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_GRAPH)]
    #[arg(env = "GANTRY_GRAPH")]
    pub graph: String,

    /// Directory of node type descriptor files
    #[arg(short, long, value_name = "DIR")]
    #[arg(env = "GANTRY_TYPES")]
    pub types: Option<String>,

    /// Cache directory
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_CACHE)]
    #[arg(env = "GANTRY_CACHE")]
    pub cache: String,

    /// Name of a target node (defaults to all leaf nodes)
    #[arg(long = "node", value_name = "NODE")]
    pub nodes: Vec<String>,

    /// Number of chunks to run in parallel
    #[arg(short, long, value_name = "N", default_value_t = 1)]
    #[arg(env = "GANTRY_JOBS")]
    pub jobs: usize,

    /// Delete cached results of target nodes
    #[arg(short = 'x', long)]
    pub invalidate: bool,

    /// Recompute target nodes even when cached
    #[arg(short, long)]
    pub force: bool,

    /// Bypass user confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Print additional debugging info (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Dry run; print info but don't modify anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}
