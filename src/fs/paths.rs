use std::path::{Path, PathBuf};

use super::Fs;

/// Utility fns for making common types of paths.
/// These fns are based on their callsite use pattern,
/// so sometimes a prefix will be included
/// and sometimes it's assumed that we'll add it here.
impl Fs {
    /// $CACHE/node_type/uid
    pub fn node_dir<'a>(&self, node_type: &str, uid: &str, buf: &'a mut PathBuf) -> &'a Path {
        self.parts3(&self.cache_prefix, node_type, uid, buf)
    }

    /// $CACHE/node_type
    pub fn node_type_dir<'a>(&self, node_type: &str, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(&self.cache_prefix, node_type, buf)
    }

    /// $CACHE/node_type/uid/status
    pub fn status_dir<'a>(&self, node_dir: &Path, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(node_dir, "status", buf)
    }

    /// $CACHE/node_type/uid/log
    pub fn log_dir<'a>(&self, node_dir: &Path, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(node_dir, "log", buf)
    }

    /// $CACHE/node_type/uid/status/<chunk>.status
    pub fn status_file<'a>(&self, node_dir: &Path, chunk: usize, buf: &'a mut PathBuf) -> &'a Path {
        self.parts3(node_dir, "status", format!("{chunk}.status"), buf)
    }

    /// $CACHE/node_type/uid/log/<chunk>.log
    pub fn log_file<'a>(&self, node_dir: &Path, chunk: usize, buf: &'a mut PathBuf) -> &'a Path {
        self.parts3(node_dir, "log", format!("{chunk}.log"), buf)
    }

    fn parts2<'a, T, U>(&self, p1: T, p2: U, buf: &'a mut PathBuf) -> &'a Path
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        buf.clear();
        buf.push(p1);
        buf.push(p2);
        &*buf
    }

    fn parts3<'a, T, U, V>(&self, p1: T, p2: U, p3: V, buf: &'a mut PathBuf) -> &'a Path
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
        V: AsRef<Path>,
    {
        buf.clear();
        buf.push(p1);
        buf.push(p2);
        buf.push(p3);
        &*buf
    }
}
