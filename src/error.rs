use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Unified error type for the merge engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Input root or shard file missing.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Shard bytes failed to decode, or keys were out of order.
    #[error("corrupt shard {}: {reason}", .path.display())]
    CorruptShard { path: PathBuf, reason: String },

    /// IO error from disk operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A pre-existing output could not be inspected or removed.
    #[error("cannot remove stale output {}: {source}", .path.display())]
    StaleOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The writer refused to clobber a file at its final path.
    #[error("output already exists: {}", .0.display())]
    OutputExists(PathBuf),
}

impl Error {
    /// Corruption detected without file context (raw codec use).
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Error::CorruptShard {
            path: PathBuf::new(),
            reason: reason.into(),
        }
    }

    /// Attach a shard path to a context-free corruption error.
    pub(crate) fn in_shard(self, shard: &Path) -> Self {
        match self {
            Error::CorruptShard { path, reason } if path.as_os_str().is_empty() => {
                Error::CorruptShard {
                    path: shard.to_path_buf(),
                    reason,
                }
            }
            other => other,
        }
    }

    /// True for storage-layer failures, including stale output cleanup.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_) | Error::StaleOutput { .. })
    }

    /// Process status for the `merge` binary: 2 when the output location
    /// could not be stat'ed or deleted, 1 for any other merge failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::StaleOutput { .. } => 2,
            _ => 1,
        }
    }
}

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_shard_fills_missing_path_only() {
        let err = Error::corrupt("bad crc").in_shard(Path::new("a/b.shard"));
        match err {
            Error::CorruptShard { path, reason } => {
                assert_eq!(path, PathBuf::from("a/b.shard"));
                assert_eq!(reason, "bad crc");
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = Error::CorruptShard {
            path: PathBuf::from("first"),
            reason: "x".into(),
        }
        .in_shard(Path::new("second"));
        assert!(matches!(err, Error::CorruptShard { path, .. } if path == PathBuf::from("first")));
    }

    #[test]
    fn exit_codes() {
        let stale = Error::StaleOutput {
            path: PathBuf::from("out"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(stale.exit_code(), 2);
        assert!(stale.is_io());
        assert_eq!(Error::corrupt("x").exit_code(), 1);
        assert_eq!(Error::NotFound(PathBuf::from("in")).exit_code(), 1);
        assert!(!Error::NotFound(PathBuf::from("in")).is_io());
    }
}
