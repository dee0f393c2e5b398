use std::path::{Path, PathBuf};
use std::{fs, io};

use anyhow::{Context, Result};

use util::PathEncodingError;

/// Defines fns for creating common paths in the cache directory
mod paths;

/// Reading and writing per-chunk status files
mod status_store;
pub use status_store::StatusStore;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Specified cache directory \"{0}\" is not a directory")]
    NotDirectory(String),
    #[error("Can't perform IO operation: \"{0}\" is not whitelisted")]
    NotWhitelisted(String),
}

/// All file operations in the crate should go through this struct.
///
/// All destructive operations check that the path in question is a child of
/// the single whitelisted prefix (the cache dir), otherwise they will not be
/// performed. Note that node command lines can break this rule; it is up to
/// the user to make sure the tools they wrap write only where expected.
#[derive(Debug, Clone)]
pub struct Fs {
    /// The directory we are allowed to modify
    cache_prefix: PathBuf,
    /// if true, prevents all destructive operations
    dry_run: bool,
}

impl Fs {
    /// Create a new `Fs` with the given cache directory.
    pub fn new(cache_prefix: &Path, dry_run: bool) -> Self {
        Self {
            cache_prefix: cache_prefix.to_path_buf(),
            dry_run,
        }
    }

    /// Set the `dry_run` variable to true or false.
    /// If true, no destructive operations will be performed.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// The whitelisted cache directory.
    pub fn prefix(&self) -> &Path {
        &self.cache_prefix
    }

    /// Check whether cache dir exists, and create it if not.
    pub fn ensure_cache_dir_exists(&mut self, verbose: bool) -> Result<()> {
        if !self.cache_prefix.exists() {
            if self.dry_run {
                eprintln!("Dry run. Not creating cache directory {:?}", self.cache_prefix);
                return Ok(());
            }
            eprintln!(
                "Cache directory {:?} doesn't exist. Creating.",
                self.cache_prefix
            );
            fs::create_dir_all(&self.cache_prefix).context("creating cache directory")?;
        } else if !self.cache_prefix.is_dir() {
            return Err(Error::NotDirectory(
                self.cache_prefix.to_str().ok_or(PathEncodingError)?.to_string(),
            )
            .into());
        } else if verbose {
            eprintln!(
                "Cache directory {:?} already exists. Not creating.",
                self.cache_prefix
            );
        }

        self.cache_prefix = self.cache_prefix.canonicalize()?;
        Ok(())
    }

    /// Check if path exists on disk.
    pub fn exists<T: AsRef<Path>>(&self, path: T) -> bool {
        let path = path.as_ref();
        path.exists() || path.is_symlink()
    }

    /// Check if path exists and is a directory.
    pub fn is_dir<T: AsRef<Path>>(&self, path: T) -> Result<bool> {
        let path = path.as_ref();
        if path.is_dir() || (path.is_symlink() && path.canonicalize()?.is_dir()) {
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Create a directory (uses `std::fs::create_dir_all`, so an entire tree of dirs can be created).
    pub fn create_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::create_dir_all(path).context("creating dir")?;
        Ok(())
    }

    /// Create a file, and return a writable `File` handle.
    pub fn create_file<T: AsRef<Path>>(&self, path: T) -> Result<fs::File> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        let f = fs::File::create(path).context("creating file")?;
        Ok(f)
    }

    /// Write entire str to a file.
    pub fn write_file<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::write(path, text).context("writing file")?;
        Ok(())
    }

    /// Write entire str to a file atomically, via a tmp file and rename.
    /// Readers never observe a partially written file.
    pub fn write_file_atomic<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        let mut tmp = path.to_path_buf();
        tmp.as_mut_os_string().push(".tmp");
        fs::write(&tmp, text).context("writing tmp file")?;
        fs::rename(&tmp, path).context("renaming tmp file")?;
        Ok(())
    }

    /// Delete a file.
    pub fn delete_file<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::remove_file(path).context("deleting file")?;
        Ok(())
    }

    /// Recursively delete a directory.
    pub fn delete_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::remove_dir_all(path).context("deleting dir")?;
        Ok(())
    }

    /// Read entire file into a String.
    pub fn read_to_string<T: AsRef<Path>>(&self, path: T) -> Result<String, io::Error> {
        fs::read_to_string(path)
    }

    /// List entries in a directory
    pub fn read_dir<T: AsRef<Path>>(&self, path: T) -> Result<fs::ReadDir, io::Error> {
        fs::read_dir(path)
    }

    fn is_whitelisted<T: AsRef<Path>>(&self, path: T) -> bool {
        path.as_ref().starts_with(&self.cache_prefix)
    }

    fn check_whitelist(&self, path: &Path) -> Result<()> {
        if self.dry_run || !self.is_whitelisted(path) {
            Err(Error::NotWhitelisted(path.to_str().ok_or(PathEncodingError)?.to_owned()).into())
        } else {
            Ok(())
        }
    }
}
