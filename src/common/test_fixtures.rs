//! Writers for small synthetic runs, so the decoders can be tested without
//! shipping instrument data.

use std::{
    collections::BTreeMap,
    fs::{create_dir_all, File},
    io::prelude::*,
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::{write::GzEncoder, Compression};
use tempfile::TempDir;

/// Base-calls directory of a run rooted at `root`
pub fn basecalls_dir(root: &Path) -> PathBuf {
    root.join("Data/Intensities/BaseCalls")
}

pub fn write_filter(path: &Path, pass: &[bool]) {
    let body: Vec<u8> = pass.iter().map(|&p| if p { 1 } else { 0 }).collect();
    write_raw_filter(path, 0, 3, pass.len() as u32, &body);
}

pub fn write_raw_filter(path: &Path, reserved: u32, version: u32, n: u32, body: &[u8]) {
    let mut f = File::create(path).unwrap();
    f.write_u32::<LittleEndian>(reserved).unwrap();
    f.write_u32::<LittleEndian>(version).unwrap();
    f.write_u32::<LittleEndian>(n).unwrap();
    f.write_all(body).unwrap();
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut gz = GzEncoder::new(Vec::new(), Compression::fast());
    gz.write_all(data).unwrap();
    gz.finish().unwrap()
}

/// Write a gzipped BCL file: a `u32` cluster count then one byte per cluster
pub fn write_bcl_gz(path: &Path, declared_clusters: u32, calls: &[u8]) {
    let mut raw = Vec::with_capacity(calls.len() + 4);
    raw.write_u32::<LittleEndian>(declared_clusters).unwrap();
    raw.extend_from_slice(calls);
    File::create(path).unwrap().write_all(&gzip(&raw)).unwrap();
}

/// Convert a BCL byte into the 4-bit CBCL representation (quality clamped to 2 bits)
pub fn to_nibble(b: u8) -> u8 {
    if b == 0 {
        0
    } else {
        ((b >> 2).min(3) << 2) | (b & 0b11)
    }
}

/// Pack BCL bytes two per byte, first cluster in the low nibble
pub fn pack(calls: &[u8]) -> Vec<u8> {
    calls
        .chunks(2)
        .map(|c| {
            let lo = to_nibble(c[0]);
            let hi = c.get(1).map_or(0, |&b| to_nibble(b));
            (hi << 4) | lo
        })
        .collect()
}

/// One tile block inside a CBCL file
pub struct CbclBlock {
    pub tile: u32,
    pub cluster_count: u32,
    pub packed: Vec<u8>,
}

/// A CBCL file with every header field overridable, for testing validation
pub struct CbclFile {
    pub version: u16,
    pub header_size: Option<u32>,
    pub bits_per_basecall: u8,
    pub bits_per_qscore: u8,
    pub bins: Vec<(u32, u32)>,
    pub excluded_flag: u8,
    pub blocks: Vec<CbclBlock>,
    pub trailing: Vec<u8>,
}

impl CbclFile {
    pub fn new(blocks: Vec<CbclBlock>, excluded: bool) -> Self {
        CbclFile {
            version: 1,
            header_size: None,
            bits_per_basecall: 2,
            bits_per_qscore: 2,
            bins: vec![(0, 0), (1, 12), (2, 24), (3, 37)],
            excluded_flag: excluded as u8,
            blocks,
            trailing: Vec::new(),
        }
    }

    pub fn write(&self, path: &Path) {
        let compressed: Vec<Vec<u8>> = self.blocks.iter().map(|b| gzip(&b.packed)).collect();

        let measured = 12 + 8 * self.bins.len() + 4 + 16 * self.blocks.len() + 1;

        let mut out = Vec::new();
        out.write_u16::<LittleEndian>(self.version).unwrap();
        out.write_u32::<LittleEndian>(self.header_size.unwrap_or(measured as u32))
            .unwrap();
        out.write_u8(self.bits_per_basecall).unwrap();
        out.write_u8(self.bits_per_qscore).unwrap();
        out.write_u32::<LittleEndian>(self.bins.len() as u32).unwrap();
        for &(from, to) in &self.bins {
            out.write_u32::<LittleEndian>(from).unwrap();
            out.write_u32::<LittleEndian>(to).unwrap();
        }
        out.write_u32::<LittleEndian>(self.blocks.len() as u32).unwrap();
        for (block, gz) in self.blocks.iter().zip(&compressed) {
            out.write_u32::<LittleEndian>(block.tile).unwrap();
            out.write_u32::<LittleEndian>(block.cluster_count).unwrap();
            out.write_u32::<LittleEndian>(block.packed.len() as u32).unwrap();
            out.write_u32::<LittleEndian>(gz.len() as u32).unwrap();
        }
        out.write_u8(self.excluded_flag).unwrap();
        for gz in &compressed {
            out.extend_from_slice(gz);
        }
        out.extend_from_slice(&self.trailing);

        File::create(path).unwrap().write_all(&out).unwrap();
    }
}

/// Deterministic pseudo-random BCL bytes, `[cycle][cluster]`, roughly 1 in 16 a no-call
pub fn synthetic_calls(n_clusters: usize, n_cycles: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..n_cycles)
        .map(|_| {
            (0..n_clusters)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    if state % 16 == 0 {
                        0
                    } else {
                        ((((state >> 8) % 63) as u8 + 1) << 2) | (state >> 4) as u8 & 0b11
                    }
                })
                .collect()
        })
        .collect()
}

/// Pseudo-random pass flags, roughly 1 in 4 failing
pub fn synthetic_pass(n_clusters: usize, seed: u64) -> Vec<bool> {
    synthetic_calls(n_clusters, 1, seed ^ 0x5eed)[0]
        .iter()
        .map(|&b| b % 4 != 0)
        .collect()
}

/// What the decoder should produce for one cluster over a set of cycles
pub fn expected_sequence(calls: &[Vec<u8>], cluster: usize, cycles: std::ops::Range<usize>) -> String {
    cycles
        .map(|c| match calls[c][cluster] {
            0 => 'N',
            b => ['A', 'C', 'G', 'T'][(b & 0b11) as usize],
        })
        .collect()
}

/// How one cycle of a tile is stored on disk
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Layout {
    Legacy,
    Consolidated { excluded: bool },
    Missing,
}

/// Ground truth for one tile of a synthetic run
#[derive(Clone)]
pub struct TileFixture {
    pub lane: u32,
    pub tile: u32,
    pub pass: Vec<bool>,
    pub calls: Vec<Vec<u8>>,
    pub layouts: Vec<Layout>,
}

impl TileFixture {
    pub fn new(lane: u32, tile: u32, n_clusters: usize, layouts: Vec<Layout>) -> Self {
        let seed = (lane as u64) << 32 | tile as u64;
        TileFixture {
            lane,
            tile,
            pass: synthetic_pass(n_clusters, seed),
            calls: synthetic_calls(n_clusters, layouts.len(), seed),
            layouts,
        }
    }

    pub fn cluster_count(&self) -> usize {
        self.pass.len()
    }

    fn surface(&self) -> char {
        self.tile.to_string().chars().next().unwrap()
    }

    fn block(&self, cycle: usize, excluded: bool) -> CbclBlock {
        let calls: Vec<u8> = if excluded {
            self.calls[cycle]
                .iter()
                .zip(&self.pass)
                .filter_map(|(&b, &p)| if p { Some(b) } else { None })
                .collect()
        } else {
            self.calls[cycle].clone()
        };
        CbclBlock {
            tile: self.tile,
            cluster_count: calls.len() as u32,
            packed: pack(&calls),
        }
    }
}

/// Write a complete run directory for `tiles`. All tiles sharing a lane, surface
/// and cycle with a consolidated layout go into the same CBCL file, in order.
pub fn write_run(tiles: &[TileFixture]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let basecalls = basecalls_dir(dir.path());

    let mut cbcls: BTreeMap<PathBuf, (bool, Vec<CbclBlock>)> = BTreeMap::new();

    for fixture in tiles {
        let lane_dir = basecalls.join(format!("L{:03}", fixture.lane));
        create_dir_all(&lane_dir).unwrap();

        let prefix = format!("s_{}_{}", fixture.lane, fixture.tile);
        write_filter(&lane_dir.join(format!("{}.filter", prefix)), &fixture.pass);

        for (cycle, layout) in fixture.layouts.iter().enumerate() {
            let cycle_dir = lane_dir.join(format!("C{}.1", cycle + 1));
            create_dir_all(&cycle_dir).unwrap();

            match *layout {
                Layout::Legacy => write_bcl_gz(
                    &cycle_dir.join(format!("{}.bcl.gz", prefix)),
                    fixture.cluster_count() as u32,
                    &fixture.calls[cycle],
                ),
                Layout::Consolidated { excluded } => {
                    let path =
                        cycle_dir.join(format!("L{:03}_{}.cbcl", fixture.lane, fixture.surface()));
                    cbcls
                        .entry(path)
                        .or_insert_with(|| (excluded, Vec::new()))
                        .1
                        .push(fixture.block(cycle, excluded));
                }
                Layout::Missing => (),
            }
        }
    }

    for (path, (excluded, blocks)) in cbcls {
        CbclFile::new(blocks, excluded).write(&path);
    }

    dir
}
