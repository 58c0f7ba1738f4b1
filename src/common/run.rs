//! Represents a sequencing run on disk, as the entry point for opening tiles

use std::{
    fmt,
    fs,
    io::ErrorKind,
    ops::RangeBounds,
    path::PathBuf,
    str::FromStr,
};

use log::info;

use crate::assembler::{ClusterIndex, ClusterResult};
use crate::error::{BclError, Result};
use crate::tile::TileSession;

/// A lane number, written on disk as `L001` etc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lane(pub u32);

impl Lane {
    pub fn dir_name(self) -> String {
        format!("L{:03}", self.0)
    }
}

impl From<u32> for Lane {
    fn from(n: u32) -> Self {
        Lane(n)
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid lane '{0}', expected a number or a directory name like L001")]
pub struct ParseLaneError(String);

impl FromStr for Lane {
    type Err = ParseLaneError;

    /// Accepts either a lane number (`1`) or a lane directory name (`L001`)
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let digits = s.strip_prefix('L').unwrap_or(s);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseLaneError(s.to_string()));
        }
        digits
            .parse()
            .map(Lane)
            .map_err(|_| ParseLaneError(s.to_string()))
    }
}

/// A run folder, the one containing `Data/` and `RunInfo.xml`
#[derive(Debug)]
pub struct Run {
    /// the root path of the sequencing run
    pub run_path: PathBuf,
    basecalls_dir: PathBuf,
    /// lane directory names present, sorted
    lanes: Vec<String>,
}

impl Run {
    /// Open the run at `run_path`, checking the base-calls directory exists and
    /// recording which lanes it holds
    pub fn open(run_path: impl Into<PathBuf>) -> Result<Run> {
        let run_path = run_path.into();
        let basecalls_dir = run_path.join("Data/Intensities/BaseCalls");

        let mut lanes = Vec::new();
        let listing = fs::read_dir(&basecalls_dir).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                BclError::not_found("base calls directory", vec![basecalls_dir.clone()])
            }
            _ => BclError::Io(e),
        })?;

        for entry in listing {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if is_lane_dir(&name) {
                lanes.push(name);
            }
        }
        lanes.sort();

        info!("opened run {} with lanes {:?}", run_path.display(), lanes);

        Ok(Run {
            run_path,
            basecalls_dir,
            lanes,
        })
    }

    /// Lane directory names, e.g. `["L001", "L002"]`
    pub fn lanes(&self) -> &[String] {
        &self.lanes
    }

    pub fn lane_dir(&self, lane: Lane) -> PathBuf {
        self.basecalls_dir.join(lane.dir_name())
    }

    /// Open a tile for reading. Call `get_sequences` on the result to fetch data.
    pub fn tile(&self, lane: impl Into<Lane>, tile: u32) -> Result<TileSession> {
        let lane = lane.into();
        let lane_name = lane.dir_name();

        if !self.lanes.contains(&lane_name) {
            return Err(BclError::not_found(
                format!("lane {}", lane),
                vec![self.lane_dir(lane)],
            ));
        }

        TileSession::open(&self.lane_dir(lane), tile)
    }

    /// Fetch a single cluster. This opens the tile and reads every cycle file
    /// for one sequence, so prefer `tile(..)?.get_sequences(..)` with all the
    /// clusters of interest at once.
    pub fn get_seq<T, R>(
        &self,
        lane: impl Into<Lane>,
        tile: u32,
        index: T,
        cycles: R,
    ) -> Result<ClusterResult>
    where
        T: ClusterIndex,
        R: RangeBounds<usize>,
    {
        let session = self.tile(lane, tile)?;
        let mut results = session.get_sequences(Some(index), cycles)?;

        // validated, so exactly this index is present
        let key = index.to_signed() as usize;
        results.remove(&key).ok_or_else(|| {
            BclError::not_found(
                format!("cluster {} in tile {}", key, tile),
                vec![self.lane_dir(session.lane().into())],
            )
        })
    }
}

/// `L` followed by exactly three digits
fn is_lane_dir(name: &str) -> bool {
    name.len() == 4
        && name.starts_with('L')
        && name[1..].bytes().all(|b| b.is_ascii_digit())
}
