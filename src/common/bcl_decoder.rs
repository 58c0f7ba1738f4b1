//! Read base calls for selected clusters out of a gzipped per-cycle `.bcl.gz` file.

use std::{
    fs::File,
    io::{self, prelude::*, BufReader},
    path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::MultiGzDecoder;
use log::debug;

use crate::assembler::validate_clusters;
use crate::base_call::{decode_bcl_byte, Base};
use crate::error::{BclError, Result};

/// Above this many clusters it is faster to decompress the whole file than
/// to skip forward to each one
pub const TARGETED_SEEK_LIMIT: usize = 10;

/// Size of the BCL header: a single `u32` cluster count
const BCL_HEADER_LEN: u64 = 4;

/// How to get at the requested bytes. Both give identical results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStrategy {
    /// skip forward through the stream to each requested cluster
    Targeted,
    /// decompress the whole payload and index into it
    Bulk,
}

impl AccessStrategy {
    pub fn for_request(n_clusters: usize) -> Self {
        if n_clusters <= TARGETED_SEEK_LIMIT {
            AccessStrategy::Targeted
        } else {
            AccessStrategy::Bulk
        }
    }
}

/// Decode the calls for `clusters` from one cycle of one tile.
///
/// Format of a `.bcl.gz` file, once decompressed:
///  1. `u32` number of clusters, which must equal `cluster_count`
///  2. `[u8; num_clusters]`, zero is a no-call, else bits 0-1 are the base
///
/// `clusters` may be in any order and repeat; the result has one call per
/// entry, in the same order. Every index is checked against `cluster_count`
/// before the file is opened.
pub fn decode_bcl(
    bcl_path: &Path,
    tile: u32,
    cluster_count: usize,
    clusters: &[usize],
    strategy: AccessStrategy,
) -> Result<Vec<Option<Base>>> {
    let sorted = validate_clusters(clusters.iter().copied(), tile, cluster_count)?;

    let file = File::open(bcl_path).map_err(|e| BclError::from_io(bcl_path, e))?;
    let mut gz = MultiGzDecoder::new(BufReader::new(file));

    let num_clusters = gz
        .read_u32::<LittleEndian>()
        .map_err(|e| BclError::from_io(bcl_path, e))? as usize;

    if num_clusters != cluster_count {
        return Err(BclError::format(
            bcl_path,
            format!(
                "header declares {} clusters but the tile has {}",
                num_clusters, cluster_count
            ),
        ));
    }

    debug!(
        "reading {} clusters from {} ({:?})",
        sorted.len(),
        bcl_path.display(),
        strategy
    );

    let calls = match strategy {
        AccessStrategy::Targeted => read_targeted(bcl_path, gz, &sorted)?,
        AccessStrategy::Bulk => read_bulk(bcl_path, gz, cluster_count, &sorted)?,
    };

    Ok(in_request_order(clusters, &sorted, calls))
}

/// Spread calls decoded for `sorted` back over the order of `requested`
fn in_request_order(
    requested: &[usize],
    sorted: &[usize],
    calls: Vec<Option<Base>>,
) -> Vec<Option<Base>> {
    if requested == sorted {
        return calls;
    }

    requested
        .iter()
        .map(|i| sorted.binary_search(i).map_or(None, |k| calls[k]))
        .collect()
}

/// Gzip streams can only seek forward by decompressing, so walk the sorted,
/// distinct clusters and discard everything in between.
fn read_targeted(
    bcl_path: &Path,
    mut gz: impl Read,
    clusters: &[usize],
) -> Result<Vec<Option<Base>>> {
    let mut pos = 0u64;

    clusters
        .iter()
        .map(|&i| {
            let skip = i as u64 - pos;
            let skipped = io::copy(&mut (&mut gz).take(skip), &mut io::sink())
                .map_err(|e| BclError::from_io(bcl_path, e))?;

            if skipped != skip {
                return Err(truncated(bcl_path, i));
            }

            let b = gz.read_u8().map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => truncated(bcl_path, i),
                _ => BclError::Io(e),
            })?;
            pos = i as u64 + 1;

            Ok(decode_bcl_byte(b))
        })
        .collect()
}

fn read_bulk(
    bcl_path: &Path,
    mut gz: impl Read,
    cluster_count: usize,
    clusters: &[usize],
) -> Result<Vec<Option<Base>>> {
    let mut calls = Vec::with_capacity(cluster_count);
    gz.read_to_end(&mut calls)
        .map_err(|e| BclError::from_io(bcl_path, e))?;

    if calls.len() != cluster_count {
        return Err(BclError::format(
            bcl_path,
            format!(
                "expected {} bytes of calls after the {}-byte header, found {}",
                cluster_count,
                BCL_HEADER_LEN,
                calls.len()
            ),
        ));
    }

    Ok(clusters.iter().map(|&i| decode_bcl_byte(calls[i])).collect())
}

fn truncated(bcl_path: &Path, cluster: usize) -> BclError {
    BclError::format(
        bcl_path,
        format!(
            "file ends before cluster {} (byte {})",
            cluster,
            BCL_HEADER_LEN + cluster as u64
        ),
    )
}
