//! Read `*.filter` files into per-cluster pass flags, and the compacted offsets
//! needed to find a cluster in files that dropped non-passing clusters.

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;

use std::{
    cell::OnceCell,
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use crate::error::{BclError, Result};

/// Where a cluster lives in a file that excludes non-passing clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionOffset {
    /// Number of passing clusters strictly before this one
    Present(usize),
    /// The cluster failed the filter and is not stored
    Excluded,
}

#[derive(Debug)]
struct OffsetTable {
    offsets: Vec<ExclusionOffset>,
    passing: usize,
}

/// The filter for one tile. The header is read when the index is opened; the
/// body and the offset table are each loaded once, on first use.
#[derive(Debug)]
pub struct FilterIndex {
    filter_path: PathBuf,
    cluster_count: usize,
    flags: OnceCell<Vec<bool>>,
    offsets: OnceCell<OffsetTable>,
}

impl FilterIndex {
    /// Open a `.filter` file and check its header
    ///
    /// Format of a `.filter` file:
    ///  1. `u32` reserved, always 0
    ///  2. `u32` format version, always 3
    ///  3. `u32` representing the number of clusters
    ///  4. `[u8; num_clusters]`, bit 0 of each is the pass flag
    pub fn from_path(filter_path: &Path) -> Result<Self> {
        let rdr = File::open(filter_path).map_err(|e| BclError::from_io(filter_path, e))?;
        let cluster_count = read_header(filter_path, BufReader::new(rdr))?;

        debug!(
            "{} declares {} clusters",
            filter_path.display(),
            cluster_count
        );

        Ok(FilterIndex {
            filter_path: filter_path.to_path_buf(),
            cluster_count,
            flags: OnceCell::new(),
            offsets: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.filter_path
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// Whether cluster `i` passed the filter
    pub fn is_pass(&self, i: usize) -> Result<bool> {
        self.check_range(i)?;
        Ok(self.flags()?[i])
    }

    /// Position of cluster `i` within a file that excludes non-passing clusters
    pub fn exclusion_offset(&self, i: usize) -> Result<ExclusionOffset> {
        self.check_range(i)?;
        Ok(self.offset_table()?.offsets[i])
    }

    /// Total number of passing clusters in the tile
    pub fn passing_count(&self) -> Result<usize> {
        Ok(self.offset_table()?.passing)
    }

    fn check_range(&self, i: usize) -> Result<()> {
        if i < self.cluster_count {
            Ok(())
        } else {
            Err(BclError::OutOfRange {
                index: i as i128,
                tile: tile_from_path(&self.filter_path),
                cluster_count: self.cluster_count,
            })
        }
    }

    fn flags(&self) -> Result<&[bool]> {
        if let Some(flags) = self.flags.get() {
            return Ok(flags);
        }
        let flags = self.read_flags()?;
        Ok(self.flags.get_or_init(|| flags))
    }

    fn offset_table(&self) -> Result<&OffsetTable> {
        if let Some(table) = self.offsets.get() {
            return Ok(table);
        }

        let mut passing = 0;
        let offsets: Vec<_> = self
            .flags()?
            .iter()
            .map(|&pass| {
                if pass {
                    passing += 1;
                    ExclusionOffset::Present(passing - 1)
                } else {
                    ExclusionOffset::Excluded
                }
            })
            .collect();

        debug!(
            "built exclusion offsets for {}: {} of {} clusters pass",
            self.filter_path.display(),
            passing,
            self.cluster_count
        );

        Ok(self.offsets.get_or_init(|| OffsetTable { offsets, passing }))
    }

    /// Re-read the file, check the header is unchanged and that the body is
    /// exactly one byte per cluster
    fn read_flags(&self) -> Result<Vec<bool>> {
        let path = &self.filter_path;
        let mut rdr =
            BufReader::new(File::open(path).map_err(|e| BclError::from_io(path, e))?);

        let num_clusters = read_header(path, &mut rdr)?;
        if num_clusters != self.cluster_count {
            return Err(BclError::format(
                path,
                format!(
                    "cluster count changed from {} to {} since the file was opened",
                    self.cluster_count, num_clusters
                ),
            ));
        }

        let mut body = Vec::with_capacity(num_clusters);
        rdr.read_to_end(&mut body)
            .map_err(|e| BclError::from_io(path, e))?;

        if body.len() != num_clusters {
            return Err(BclError::format(
                path,
                format!(
                    "header declares {} clusters but the body holds {}",
                    num_clusters,
                    body.len()
                ),
            ));
        }

        Ok(body.iter().map(|&b| b & 0b1 == 1).collect())
    }
}

fn read_header(path: &Path, mut rdr: impl Read) -> Result<usize> {
    let mut header = [0u32; 3];
    rdr.read_u32_into::<LittleEndian>(&mut header)
        .map_err(|e| BclError::from_io(path, e))?;

    match header {
        [0, 3, num_clusters] => Ok(num_clusters as usize),
        [reserved, version, _] => Err(BclError::format(
            path,
            format!(
                "expected reserved word 0 and version 3, found {} and {}",
                reserved, version
            ),
        )),
    }
}

/// Best-effort tile number from a `<prefix>_<tile>.filter` name, for error messages
fn tile_from_path(path: &Path) -> u32 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.rsplit('_').next())
        .and_then(|t| t.parse().ok())
        .unwrap_or(0)
}
