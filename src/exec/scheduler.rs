use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use colored::Colorize;
use log::debug;

use graph::{
    parse_template, render, ChunkContext, ChunkRange, CmdVars, Graph, Node, NodeId, NodeRuntime,
    NodeStatus, Status, StatusRecord,
};
use util::{HashMap, HashSet};

use crate::fs::{Fs, StatusStore};
use crate::ui::Ui;

use super::pool::{ChunkJob, ResolvedRuntime, WorkerPool};
use super::StopHandle;

/// Summary of one scheduler run.
#[derive(Debug)]
pub struct RunSummary {
    /// Final aggregated status per processed node, in execution order.
    pub nodes: Vec<(String, NodeStatus)>,
    /// True iff every target node ended in Success.
    pub success: bool,
}

/// A node whose chunks are currently on the worker pool.
struct InFlightNode {
    name: String,
    statuses: Vec<Status>,
    remaining: usize,
}

/// Outcome of trying to start a node.
enum Started {
    /// Nothing was submitted; the node resolved immediately.
    Done(NodeStatus),
    /// Chunks were submitted; results will arrive on the pool.
    InFlight(InFlightNode),
}

/// Drives a graph to completion: plans the upstream closure of the
/// targets in topological order, skips nodes whose results are already
/// cached under their current uid, and runs the rest chunk by chunk on
/// a worker pool.
///
/// A node waits for all of its own chunks before its descendants
/// start, but independent ready nodes submit their chunks together,
/// so the pool stays busy across branches. When a node fails, its
/// descendants are skipped but independent branches keep running.
pub struct Scheduler<'a> {
    graph: &'a mut Graph,
    fs: &'a Fs,
    ui: &'a Ui,
    store: StatusStore,
    jobs: usize,
    force: bool,
    stop: StopHandle,
}

impl<'a> Scheduler<'a> {
    pub fn new(graph: &'a mut Graph, fs: &'a Fs, ui: &'a Ui, jobs: usize, force: bool) -> Self {
        Self {
            graph,
            fs,
            ui,
            store: StatusStore::new(),
            jobs,
            force,
            stop: StopHandle::default(),
        }
    }

    /// Handle that cancels this run when triggered from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run the named target nodes (or all leaves when none are named)
    /// and everything upstream of them.
    pub fn run(&mut self, targets: &[String]) -> Result<RunSummary> {
        self.graph.update()?;

        let mut target_ids = Vec::with_capacity(targets.len());
        for name in targets {
            target_ids.push(self.graph.id_of(name)?);
        }
        if target_ids.is_empty() {
            target_ids = self.graph.leaves();
        }

        let order = self.graph.upstream_order(&target_ids);
        for &id in &order {
            let node = self.graph.node_by_id(id);
            if node.is_compat() {
                return Err(graph::Error::CompatNode(node.name().to_owned()).into());
            }
        }
        debug!("execution order: {} node(s)", order.len());

        let targets: HashSet<NodeId> = target_ids.iter().copied().collect();
        let pool = WorkerPool::new(
            self.jobs,
            self.fs.clone(),
            self.store.clone(),
            self.stop.clone(),
        );

        let mut done: HashMap<NodeId, NodeStatus> = HashMap::default();
        let mut in_flight: HashMap<NodeId, InFlightNode> = HashMap::default();

        while done.len() < order.len() {
            // start every node whose ancestors have all resolved
            for &id in &order {
                if done.contains_key(&id) || in_flight.contains_key(&id) {
                    continue;
                }
                if self.stop.is_stopped() {
                    done.insert(id, NodeStatus::None);
                    continue;
                }
                let ancestors = self.graph.ancestors_of(id);
                if ancestors
                    .iter()
                    .any(|a| done.get(a).is_some_and(|s| *s != NodeStatus::Success))
                {
                    let name = self.graph.node_by_id(id).name();
                    eprintln!("{} {name} (upstream did not complete)\n", "SKIP".yellow());
                    done.insert(id, NodeStatus::None);
                    continue;
                }
                if !ancestors.iter().all(|a| done.contains_key(a)) {
                    continue;
                }
                match self.start_node(id, targets.contains(&id), &pool)? {
                    Started::Done(status) => {
                        done.insert(id, status);
                    }
                    Started::InFlight(node) => {
                        in_flight.insert(id, node);
                    }
                }
            }
            if done.len() == order.len() {
                break;
            }
            // every unresolved node now either has chunks on the pool
            // or waits on one that does
            debug_assert!(!in_flight.is_empty(), "scheduler stalled");
            if in_flight.is_empty() {
                break;
            }

            let result = pool.recv();
            let id = self.graph.id_of(&result.node_name)?;
            let entry = in_flight.get_mut(&id).expect("result for unknown node");
            entry.statuses[result.chunk_index] = result.status;
            entry.remaining -= 1;
            if self.ui.verbose {
                eprintln!(
                    "chunk {}/{} of {}: {}",
                    result.chunk_index + 1,
                    entry.statuses.len(),
                    entry.name,
                    self.ui.status_label(result.status)
                );
            }
            if entry.remaining == 0 {
                let entry = in_flight.remove(&id).expect("entry was just updated");
                let status = NodeStatus::aggregate(&entry.statuses);
                eprintln!("{} {}\n", self.ui.node_status_label(status), entry.name);
                done.insert(id, status);
            }
        }
        pool.shutdown();

        let success = target_ids
            .iter()
            .all(|t| done.get(t) == Some(&NodeStatus::Success));
        let nodes = order
            .iter()
            .map(|&id| {
                let name = self.graph.node_by_id(id).name().to_owned();
                (name, done.get(&id).copied().unwrap_or(NodeStatus::None))
            })
            .collect();
        Ok(RunSummary { nodes, success })
    }

    /// Skip a cached node, or submit its outstanding chunks to the
    /// pool without waiting for them.
    fn start_node(&self, id: NodeId, is_target: bool, pool: &WorkerPool) -> Result<Started> {
        let node = self.graph.node_by_id(id);
        let name = node.name().to_owned();
        let node_type = node.node_type().to_owned();
        let uid = node
            .uid()
            .ok_or_else(|| anyhow!("node {name} has no uid; graph was not updated"))?
            .to_string();
        let chunks = node.chunks();
        let nb_chunks = chunks.len();

        let mut buf = PathBuf::with_capacity(256);
        let node_dir = self.fs.node_dir(&node_type, &uid, &mut buf).to_path_buf();

        let force = self.force && is_target;
        let disk = self.store.node_statuses(self.fs, &node_dir, nb_chunks, &uid);
        if !force && disk.iter().all(Status::is_success) && !disk.is_empty() {
            eprintln!("{} {name} (cached)\n", "SKIP".green());
            return Ok(Started::Done(NodeStatus::Success));
        }

        eprintln!("{} {name} ({nb_chunks} chunk(s))\nin {node_dir:?}\n", "RUN".green());
        self.fs.create_dir(self.fs.status_dir(&node_dir, &mut buf))?;
        self.fs.create_dir(self.fs.log_dir(&node_dir, &mut buf))?;

        // completed chunks at the same uid are kept; only the rest run
        let to_run: Vec<usize> = (0..nb_chunks)
            .filter(|&i| force || !disk[i].is_success())
            .collect();
        if self.ui.verbose && to_run.len() < nb_chunks {
            eprintln!("Resuming {name}: {} of {nb_chunks} chunk(s) left.", to_run.len());
        }
        if to_run.is_empty() {
            let status = NodeStatus::aggregate(&disk);
            eprintln!("{} {name}\n", self.ui.node_status_label(status));
            return Ok(Started::Done(status));
        }

        // mark everything Submitted up front so an interrupted run is
        // diagnosable from disk alone
        for &i in &to_run {
            let mut record = StatusRecord::new(&name, &node_type, &uid, i, nb_chunks);
            record.status = Status::Submitted;
            let path = self.fs.status_file(&node_dir, i, &mut buf).to_path_buf();
            self.store.write(self.fs, &path, &mut record)?;
        }

        let remaining = to_run.len();
        for &i in &to_run {
            pool.submit(self.make_job(node, &node_dir, &uid, chunks[i], i, nb_chunks)?);
        }

        Ok(Started::InFlight(InFlightNode {
            name,
            statuses: disk,
            remaining,
        }))
    }

    fn make_job(
        &self,
        node: &Node,
        node_dir: &Path,
        uid: &str,
        range: ChunkRange,
        chunk_index: usize,
        nb_chunks: usize,
    ) -> Result<ChunkJob> {
        let ctx = ChunkContext {
            node_name: node.name().to_owned(),
            node_type: node.node_type().to_owned(),
            uid: uid.to_owned(),
            range,
            folder: node_dir.to_path_buf(),
        };
        let desc = node.desc();
        let runtime = match &desc.runtime {
            NodeRuntime::Input => ResolvedRuntime::Noop,
            NodeRuntime::Callable(hook) => ResolvedRuntime::Callable(Arc::clone(hook)),
            NodeRuntime::CommandLine { template } => {
                ResolvedRuntime::Command(self.render_command(node, template, node_dir, uid, range)?)
            }
        };
        Ok(ChunkJob {
            ctx,
            chunk_index,
            nb_chunks,
            runtime,
            pre_chunk: desc.pre_chunk.clone(),
            post_chunk: desc.post_chunk.clone(),
        })
    }

    /// Render a node's command template for one chunk. Disabled
    /// attributes are left out, so their placeholders must be guarded
    /// by the template author.
    fn render_command(
        &self,
        node: &Node,
        template: &str,
        node_dir: &Path,
        uid: &str,
        range: ChunkRange,
    ) -> Result<String> {
        let template = parse_template(template)?;
        let mut vars = CmdVars::default();
        vars.insert("cache".to_owned(), self.graph.cache_root().display().to_string());
        vars.insert("nodeType".to_owned(), node.node_type().to_owned());
        vars.insert("name".to_owned(), node.name().to_owned());
        vars.insert("uid".to_owned(), uid.to_owned());
        vars.insert("folder".to_owned(), node_dir.display().to_string());
        vars.insert("rangeStart".to_owned(), range.start().to_string());
        vars.insert("rangeEnd".to_owned(), range.end().to_string());
        vars.insert("rangeBlockSize".to_owned(), range.effective_block_size().to_string());
        vars.insert("rangeFullSize".to_owned(), range.full_size.to_string());
        vars.insert("rangeIteration".to_owned(), range.iteration.to_string());

        let resolve = |addr: &graph::AttrAddr| self.graph.resolved_value(addr);
        for attr in node.attrs() {
            if !node.attr_enabled(attr) {
                continue;
            }
            self.insert_attr_vars(node, attr, attr.name().to_owned(), &resolve, &mut vars)?;
        }
        Ok(render(&template, &vars)?)
    }

    /// Insert an attribute's value under its name, and group members
    /// under dotted paths (`pose.rotation`) so templates can reach
    /// inside groups.
    fn insert_attr_vars(
        &self,
        node: &Node,
        attr: &graph::Attribute,
        path: String,
        resolve: &dyn Fn(&graph::AttrAddr) -> Result<graph::Value, graph::Error>,
        vars: &mut CmdVars,
    ) -> Result<()> {
        let value = node.effective_value(attr, resolve)?;
        vars.insert(path.clone(), value.to_cmd_str(true));
        if let Some(members) = attr.members() {
            for member in members {
                if !node.attr_enabled(member) {
                    continue;
                }
                self.insert_attr_vars(node, member, format!("{path}.{}", member.name()), resolve, vars)?;
            }
        }
        Ok(())
    }
}
