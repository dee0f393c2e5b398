use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;

use graph::Graph;

use crate::fs::Fs;
use crate::settings::Settings;
use crate::ui::Ui;

/// Logic for deleting cached node results from previous executions.
pub struct Invalidator<'a> {
    fs: &'a Fs,
    ui: &'a Ui,
    settings: &'a Settings,
}

impl<'a> Invalidator<'a> {
    /// Create a new `Invalidator`.
    pub fn new(settings: &'a Settings, ui: &'a Ui, fs: &'a Fs) -> Self {
        Self { settings, ui, fs }
    }
}

impl Invalidator<'_> {
    /// Delete the cache folders of the target nodes at their current uids.
    /// The next run will recompute them from scratch.
    pub fn invalidate(&self, graph: &Graph) -> Result<()> {
        if self.settings.nodes.is_empty() {
            eprintln!("No nodes specified; quitting.");
            return Ok(());
        }

        let mut pathbuf = PathBuf::with_capacity(256);
        for name in &self.settings.nodes {
            let node = graph.node(name)?;
            let Some(uid) = node.uid() else {
                eprintln!("Node {} has no uid yet; nothing to invalidate.", name.cyan());
                continue;
            };
            eprintln!(
                "{} of node {}.",
                "Invalidating cached results".magenta(),
                name.cyan()
            );
            let dir = self.fs.node_dir(node.node_type(), uid.as_str(), &mut pathbuf);
            self.delete_dir_if_exists(dir)?;
        }
        Ok(())
    }

    fn delete_dir_if_exists(&self, path: &Path) -> Result<()> {
        eprintln!("{} {path:?}.", "Deleting".red());
        if self.settings.dry_run || !self.ui.confirm("Proceed?")? {
            return Ok(());
        } else if self.fs.is_dir(path)? {
            self.fs.delete_dir(path)?;
        } else {
            eprintln!("{path:?} does not exist; not deleting.");
        }
        Ok(())
    }
}
