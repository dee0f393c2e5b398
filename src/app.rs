use anyhow::{Context, Result};
use colored::Colorize;

use graph::{load_graph, load_node_descs, Graph, NodeStatus, Registry};

use crate::exec::{self, Scheduler};
use crate::fs::Fs;
use crate::invalidate::Invalidator;
use crate::settings::Settings;
use crate::ui::Ui;

/// This struct actually runs the command-line app.
pub struct App {
    /// Interpreted command line settings
    settings: Settings,
    /// Filesystem interface
    fs: Fs,
    /// User interface
    ui: Ui,
}

impl App {
    /// Create a new `App`.
    pub fn new(settings: Settings) -> Self {
        let fs = Fs::new(&settings.cache, settings.dry_run);
        let ui = Ui::new(&settings);
        Self { settings, fs, ui }
    }

    /// Run the app, using settings to determine what to do.
    pub fn run(mut self) -> Result<()> {
        if self.settings.verbose > 0 {
            eprintln!("Using cache directory {:?}", self.settings.cache);
        }
        self.fs.ensure_cache_dir_exists(self.settings.verbose > 0)?;

        let registry = self.load_registry()?;
        let mut graph = self.load_graph(&registry)?;

        if self.settings.invalidate {
            let invalidator = Invalidator::new(&self.settings, &self.ui, &self.fs);
            invalidator.invalidate(&graph)?;
        }

        if self.settings.run {
            self.run_graph(&mut graph)?;
        }

        Ok(())
    }

    fn load_registry(&self) -> Result<Registry> {
        let mut registry = Registry::new();
        if let Some(types_dir) = &self.settings.types {
            self.ui.verbose_progress_debug("Loading node types from", types_dir);
            let descs = load_node_descs(types_dir)
                .with_context(|| format!("while loading node types from {types_dir:?}"))?;
            for desc in descs {
                registry.register(desc);
            }
            self.ui.done();
            if self.settings.verbose > 0 {
                eprintln!("Registered {} node type(s).", registry.len());
            }
        }
        Ok(registry)
    }

    fn load_graph(&mut self, registry: &Registry) -> Result<Graph> {
        self.ui.verbose_progress_debug("Loading graph", &self.settings.graph);
        self.ui.start_timer();
        let mut graph = load_graph(&self.settings.graph, registry)
            .with_context(|| format!("while loading graph file {:?}", self.settings.graph))?;

        // the cache dir from the command line wins over the one stored
        // in the graph file:
        graph.set_cache_root(self.fs.prefix());
        graph.update()?;

        self.ui.done();
        self.ui.print_elapsed("Loading graph")?;
        if self.settings.verbose > 0 {
            eprintln!("Loaded graph with {} node(s).", graph.node_count());
        }
        Ok(graph)
    }

    fn run_graph(&mut self, graph: &mut Graph) -> Result<()> {
        if self.settings.nodes.is_empty() {
            eprintln!("No target specified; running all leaf nodes.");
        } else {
            eprintln!("Targets: {}.", self.settings.nodes.join(", "));
        }
        if self.settings.dry_run {
            eprintln!("Dry run; not executing.");
            return Ok(());
        }
        if !self.ui.confirm("Proceed?")? {
            return Ok(());
        }

        eprintln!("\n{}.\n", "Starting graph execution".magenta());
        let mut scheduler = Scheduler::new(
            graph,
            &self.fs,
            &self.ui,
            self.settings.jobs,
            self.settings.force,
        );
        let summary = scheduler.run(&self.settings.nodes).context("while running graph")?;

        eprintln!("{}", "Summary:".magenta());
        for (name, status) in &summary.nodes {
            eprintln!(" - {name}: {}", self.ui.node_status_label(*status));
        }
        if summary.success {
            eprintln!("\n{}\n", "Completed graph.".green());
            Ok(())
        } else {
            let failed = summary
                .nodes
                .iter()
                .filter(|(_, s)| *s != NodeStatus::Success)
                .count();
            Err(exec::Error::PipelineFailed(failed).into())
        }
    }
}
