//! Error type shared by every decoder in the crate.

use std::path::PathBuf;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BclError>;

/// Everything that can go wrong while reading base calls
#[derive(thiserror::Error, Debug)]
pub enum BclError {
    /// An expected file or directory is missing
    #[error("{what} not found: {}", display_paths(.paths))]
    NotFound { what: String, paths: Vec<PathBuf> },

    /// A header field is outside its documented domain, or declared sizes
    /// disagree with what is actually on disk
    #[error("format error in {}: {msg}", .path.display())]
    Format { path: PathBuf, msg: String },

    /// A recognized variant of a format that is not implemented
    #[error("unsupported format in {}: {msg}", .path.display())]
    UnsupportedFormat { path: PathBuf, msg: String },

    /// A requested cluster index is outside `[0, cluster_count)`
    #[error("requested cluster {index} is out of range for tile {tile} (cluster count {cluster_count})")]
    OutOfRange {
        index: i128,
        tile: u32,
        cluster_count: usize,
    },

    /// A requested cycle window does not fit inside the tile's cycles
    #[error("cycle range {start}..{end} is invalid for tile {tile} ({cycle_count} cycles)")]
    CycleRange {
        start: usize,
        end: usize,
        tile: u32,
        cycle_count: usize,
    },

    /// Any other I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BclError {
    pub(crate) fn not_found(what: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        BclError::NotFound {
            what: what.into(),
            paths,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        BclError::Format {
            path: path.into(),
            msg: msg.into(),
        }
    }

    pub(crate) fn unsupported(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        BclError::UnsupportedFormat {
            path: path.into(),
            msg: msg.into(),
        }
    }

    /// Attach a path to a bare I/O error. Truncated files surface as
    /// `UnexpectedEof`, which is a format problem rather than an I/O one.
    pub(crate) fn from_io(path: impl Into<PathBuf>, e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                BclError::format(path, "file is truncated (failed to fill whole buffer)")
            }
            std::io::ErrorKind::NotFound => BclError::not_found("file", vec![path.into()]),
            _ => BclError::Io(e),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
