use std::path::PathBuf;

use crate::args::Args;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Graph file \"{0}\" does not exist")]
    GraphFileMissing(String),
    #[error("--jobs must be at least 1")]
    ZeroJobs,
}

/// Settings are like Args, except all the logic has
/// been applied so e.g. defaults are added in.
#[derive(Debug)]
pub struct Settings {
    pub graph: PathBuf,
    pub types: Option<PathBuf>,
    pub cache: PathBuf,
    pub nodes: Vec<String>,
    pub jobs: usize,
    pub force: bool,
    pub yes: bool,
    pub verbose: u8,
    pub dry_run: bool,

    pub invalidate: bool,
    pub run: bool,
}

impl TryFrom<Args> for Settings {
    type Error = anyhow::Error;
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.jobs == 0 {
            return Err(Error::ZeroJobs.into());
        }

        let mut graph = PathBuf::from(&args.graph);
        if graph.exists() {
            graph = graph.canonicalize()?;
        } else {
            return Err(Error::GraphFileMissing(args.graph).into());
        }

        // for now, -x invalidates instead of running.
        let invalidate = args.invalidate;
        let run = !args.invalidate;

        Ok(Self {
            graph,
            types: args.types.map(PathBuf::from),
            cache: PathBuf::from(&args.cache),
            nodes: args.nodes,
            jobs: args.jobs,
            force: args.force,
            yes: args.yes,
            verbose: args.verbose,
            dry_run: args.dry_run,

            invalidate,
            run,
        })
    }
}
