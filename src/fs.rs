use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{Error, Result};

/// The storage operations the coordinator needs besides reading and
/// writing shard files themselves.
pub trait ShardFs {
    /// All shard files under `root`, recursively, in ascending path order.
    /// A `root` that is itself a file is a single shard.
    fn list_shards(&self, root: &Path) -> Result<Vec<PathBuf>>;

    /// Whether anything exists at `path`. A stat failure other than
    /// "not found" is an error, not `false`.
    fn exists(&self, path: &Path) -> Result<bool>;

    /// Remove a file, or a directory (with its contents when `recursive`).
    fn delete(&self, path: &Path, recursive: bool) -> Result<()>;
}

/// `ShardFs` over the local disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

/// Names starting with `_` or `.` are bookkeeping (`_SUCCESS`, `.crc`,
/// in-progress temp files), never shards.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}

impl LocalFs {
    /// `visited` holds the canonical form of every directory entered so far;
    /// a symlink back into one of them is skipped instead of walked again.
    fn walk(
        &self,
        dir: &Path,
        visited: &mut HashSet<PathBuf>,
        out: &mut Vec<PathBuf>,
    ) -> Result<()> {
        if !visited.insert(fs::canonicalize(dir)?) {
            trace!(path = %dir.display(), "directory already walked");
            return Ok(());
        }

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if is_hidden(&name.to_string_lossy()) {
                trace!(path = %entry.path().display(), "skipping hidden entry");
                continue;
            }

            let path = entry.path();
            // Follow symlinks so linked shard directories are merged too.
            let meta = fs::metadata(&path)?;
            if meta.is_dir() {
                self.walk(&path, visited, out)?;
            } else if meta.is_file() {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl ShardFs for LocalFs {
    fn list_shards(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let meta = fs::metadata(root).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound(root.to_path_buf()),
            _ => Error::Io(e),
        })?;
        if meta.is_file() {
            return Ok(vec![root.to_path_buf()]);
        }

        let mut shards = Vec::new();
        self.walk(root, &mut HashSet::new(), &mut shards)?;
        shards.sort();
        Ok(shards)
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        match fs::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn delete(&self, path: &Path, recursive: bool) -> Result<()> {
        let meta = fs::symlink_metadata(path)?;
        if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(path)?;
            } else {
                fs::remove_dir(path)?;
            }
        } else {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
