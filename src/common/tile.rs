//! One tile of one lane: finds its files and fetches sequences for batches of clusters.

use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    ops::{Bound, RangeBounds},
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::assembler::{validate_clusters, ClusterIndex, ClusterResult, SequenceAssembler};
use crate::base_call::Base;
use crate::bcl_decoder::{decode_bcl, AccessStrategy};
use crate::cbcl_decoder::decode_block;
use crate::cbcl_header_decoder::CBCLHeader;
use crate::error::{BclError, Result};
use crate::filter_decoder::FilterIndex;

/// Where the calls for one cycle of a tile are stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleSource {
    /// a per-tile `.bcl.gz` file
    Legacy(PathBuf),
    /// a CBCL file shared by every tile on the surface
    Consolidated(PathBuf),
    /// neither file exists
    Missing { legacy: PathBuf, consolidated: PathBuf },
}

/// An open tile. Owns its filter, whose offset table is built on first use
/// and kept for the life of the session.
#[derive(Debug)]
pub struct TileSession {
    lane_dir: PathBuf,
    lane: u32,
    tile: u32,
    num_cycles: usize,
    bcl_filename: String,
    cbcl_filename: String,
    filter: FilterIndex,
}

impl TileSession {
    /// Open `tile` in a lane directory (`.../BaseCalls/L001`).
    ///
    /// The `<prefix>_<tile>.filter` file identifies the tile; its prefix also names the
    /// per-cycle `.bcl.gz` files. CBCL files are named after the lane directory and
    /// the surface, which is the first digit of the tile number.
    pub fn open(lane_dir: &Path, tile: u32) -> Result<Self> {
        let mut listing: Vec<String> = fs::read_dir(lane_dir)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    BclError::not_found("lane directory", vec![lane_dir.to_path_buf()])
                }
                _ => BclError::Io(e),
            })?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        listing.sort();

        let filter_suffix = format!("_{}.filter", tile);
        let filter_name = listing
            .iter()
            .find(|name| name.len() > filter_suffix.len() && name.ends_with(&filter_suffix))
            .ok_or_else(|| {
                BclError::not_found(
                    format!("filter file for tile {}", tile),
                    vec![lane_dir.join(format!("*{}", filter_suffix))],
                )
            })?;

        let prefix = &filter_name[..filter_name.len() - ".filter".len()];
        let bcl_filename = format!("{}.bcl.gz", prefix);

        let lane_name = lane_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let surface = tile.to_string().chars().next().unwrap_or('0');
        let cbcl_filename = format!("{}_{}.cbcl", lane_name, surface);

        let num_cycles = listing.iter().filter(|name| is_cycle_dir(name)).count();

        let filter = FilterIndex::from_path(&lane_dir.join(filter_name))?;

        info!(
            "opened tile {} in {}: {} cycles, {} clusters",
            tile,
            lane_dir.display(),
            num_cycles,
            filter.cluster_count()
        );

        Ok(TileSession {
            lane_dir: lane_dir.to_path_buf(),
            lane: lane_name.trim_start_matches('L').parse().unwrap_or(0),
            tile,
            num_cycles,
            bcl_filename,
            cbcl_filename,
            filter,
        })
    }

    pub fn lane(&self) -> u32 {
        self.lane
    }

    pub fn tile(&self) -> u32 {
        self.tile
    }

    pub fn cycle_count(&self) -> usize {
        self.num_cycles
    }

    pub fn cluster_count(&self) -> usize {
        self.filter.cluster_count()
    }

    pub fn filter(&self) -> &FilterIndex {
        &self.filter
    }

    /// Probe which file holds `cycle` (counting from 0). Only a missing file
    /// moves on to the next candidate; any other error is returned.
    pub fn cycle_source(&self, cycle: usize) -> Result<CycleSource> {
        let cycle_dir = self.lane_dir.join(format!("C{}.1", cycle + 1));
        let legacy = cycle_dir.join(&self.bcl_filename);
        let consolidated = cycle_dir.join(&self.cbcl_filename);

        if exists(&legacy)? {
            Ok(CycleSource::Legacy(legacy))
        } else if exists(&consolidated)? {
            Ok(CycleSource::Consolidated(consolidated))
        } else {
            Ok(CycleSource::Missing {
                legacy,
                consolidated,
            })
        }
    }

    /// Fetch the sequences for a batch of clusters over a range of cycles
    /// (counting from 0, e.g. `20..40`, or `..` for every cycle).
    ///
    /// All indices and the cycle range are checked before any file is read.
    /// Call this once per tile with every cluster of interest: each cycle's
    /// file is opened and decompressed once per call, however many clusters
    /// are requested.
    pub fn get_sequences<I, R>(
        &self,
        indices: I,
        cycles: R,
    ) -> Result<HashMap<usize, ClusterResult>>
    where
        I: IntoIterator,
        I::Item: ClusterIndex,
        R: RangeBounds<usize>,
    {
        let clusters = validate_clusters(indices, self.tile, self.cluster_count())?;
        let (start, end) = self.cycle_bounds(&cycles)?;

        let strategy = AccessStrategy::for_request(clusters.len());
        let mut assembler = SequenceAssembler::new(clusters, end - start);

        if !assembler.clusters().is_empty() {
            for cycle in start..end {
                let calls = self.read_cycle(cycle, assembler.clusters(), strategy)?;
                assembler.add_cycle(cycle - start, &calls);
            }
        }

        assembler.finish(&self.filter)
    }

    fn read_cycle(
        &self,
        cycle: usize,
        clusters: &[usize],
        strategy: AccessStrategy,
    ) -> Result<Vec<Option<Base>>> {
        match self.cycle_source(cycle)? {
            CycleSource::Legacy(path) => {
                debug!("tile {} cycle {}: {}", self.tile, cycle + 1, path.display());
                decode_bcl(&path, self.tile, self.cluster_count(), clusters, strategy)
            }
            CycleSource::Consolidated(path) => {
                debug!("tile {} cycle {}: {}", self.tile, cycle + 1, path.display());
                let header = CBCLHeader::from_path(&path)?;
                let block = header.locate(self.tile)?;
                decode_block(&header, &block, clusters, &self.filter)
            }
            CycleSource::Missing {
                legacy,
                consolidated,
            } => Err(BclError::not_found(
                format!("base calls for tile {} cycle {}", self.tile, cycle + 1),
                vec![legacy, consolidated],
            )),
        }
    }

    fn cycle_bounds(&self, cycles: &impl RangeBounds<usize>) -> Result<(usize, usize)> {
        let start = match cycles.start_bound() {
            Bound::Included(&s) => Some(s),
            Bound::Excluded(&s) => s.checked_add(1),
            Bound::Unbounded => Some(0),
        };
        let end = match cycles.end_bound() {
            Bound::Included(&e) => e.checked_add(1),
            Bound::Excluded(&e) => Some(e),
            Bound::Unbounded => Some(self.num_cycles),
        };

        match (start, end) {
            (Some(start), Some(end)) if start <= end && end <= self.num_cycles => {
                Ok((start, end))
            }
            _ => Err(BclError::CycleRange {
                start: start.unwrap_or(usize::MAX),
                end: end.unwrap_or(usize::MAX),
                tile: self.tile,
                cycle_count: self.num_cycles,
            }),
        }
    }
}

/// `C<number>.1`, the per-cycle directory name
fn is_cycle_dir(name: &str) -> bool {
    name.strip_prefix('C')
        .and_then(|rest| rest.strip_suffix(".1"))
        .map_or(false, |n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn exists(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
