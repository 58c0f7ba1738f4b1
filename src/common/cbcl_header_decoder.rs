//! Read the header from CBCL file and decode into a struct of useful information about
//! the file, to allow efficient tile extraction later.

use byteorder::{LittleEndian, ReadBytesExt};
use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use crate::error::{BclError, Result};

/// Fixed-size fields at the start of the header: version, header size,
/// bits per basecall, bits per qscore and number of bins
const FIXED_FIELDS_LEN: u64 = 12;

/// One per-tile record from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRecord {
    pub tile: u32,
    pub cluster_count: u32,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
}

/// A tile record resolved to a position in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBlock {
    pub tile: u32,
    pub cluster_count: usize,
    pub uncompressed_size: usize,
    pub compressed_size: usize,
    /// byte offset of the compressed block from the start of the file
    pub offset: u64,
}

#[derive(Debug, PartialEq)]
/// Represents the header information from a CBCL file
pub struct CBCLHeader {
    pub cbcl_path: PathBuf,
    pub version: u16,
    pub header_size: u32,
    pub bits_per_basecall: u8,
    pub bits_per_qscore: u8,
    /// quality bin mapping as (from, to) pairs; not needed for base calls
    pub bins: Vec<(u32, u32)>,
    pub tiles: Vec<TileRecord>,
    pub non_pf_clusters_excluded: bool,
}

impl CBCLHeader {
    /// Reads the beginning of a CBCL file and stores the header information
    ///
    /// Structure of a CBCL header:
    ///  1. `u16` for file version, must be 1
    ///  2. `u32` for header size, in bytes
    ///  3. `u8` for number of bits per basecall, must be 2
    ///  4. `u8` for number of bits per quality score, only 2 is supported
    ///  5. `u32` for the number of quality score bins
    ///  6. `number_of_bins` pairs of `u32` (from, to) quality score mappings
    ///  7. `u32` for number of tiles in the file
    ///  8. `num_tile_records` arrays of 4 `u32` values:
    ///     1. Tile number
    ///     2. Number of clusters in the tile
    ///     3. Uncompressed block size
    ///     4. Compressed block size
    ///  9. `u8` flag for whether non-passing clusters were removed from the blocks
    ///
    /// After the header, the gzipped tile blocks follow back to back, so the
    /// header size plus all compressed sizes must equal the file size.
    pub fn from_path(cbcl_path: &Path) -> Result<Self> {
        let file = File::open(cbcl_path).map_err(|e| BclError::from_io(cbcl_path, e))?;
        let file_len = file.metadata()?.len();
        let mut rdr = BufReader::new(file);

        Self::from_reader(cbcl_path, &mut rdr, file_len)
    }

    fn from_reader(cbcl_path: &Path, rdr: &mut impl Read, file_len: u64) -> Result<Self> {
        let io_err = |e: std::io::Error| BclError::from_io(cbcl_path, e);

        let version = rdr.read_u16::<LittleEndian>().map_err(io_err)?;
        let header_size = rdr.read_u32::<LittleEndian>().map_err(io_err)?;
        let bits_per_basecall = rdr.read_u8().map_err(io_err)?;
        let bits_per_qscore = rdr.read_u8().map_err(io_err)?;
        let number_of_bins = rdr.read_u32::<LittleEndian>().map_err(io_err)?;

        if version != 1 {
            return Err(BclError::format(
                cbcl_path,
                format!("version is {}, expected 1", version),
            ));
        }
        if bits_per_basecall != 2 {
            return Err(BclError::format(
                cbcl_path,
                format!("{} bits per basecall, expected 2", bits_per_basecall),
            ));
        }
        if bits_per_qscore != 2 {
            return Err(BclError::unsupported(
                cbcl_path,
                format!(
                    "{} bits per quality score, only 2 is supported",
                    bits_per_qscore
                ),
            ));
        }

        let mut measured = FIXED_FIELDS_LEN;

        measured += 8 * number_of_bins as u64;
        check_fits(cbcl_path, measured, file_len, "quality bin table")?;
        let mut bin_buffer = vec![0u32; 2 * number_of_bins as usize];
        rdr.read_u32_into::<LittleEndian>(&mut bin_buffer)
            .map_err(io_err)?;
        let bins = bin_buffer.chunks_exact(2).map(|b| (b[0], b[1])).collect();

        let num_tile_records = rdr.read_u32::<LittleEndian>().map_err(io_err)?;
        measured += 4 + 16 * num_tile_records as u64 + 1;
        check_fits(cbcl_path, measured, file_len, "tile records")?;

        let mut tile_buffer = vec![0u32; 4 * num_tile_records as usize];
        rdr.read_u32_into::<LittleEndian>(&mut tile_buffer)
            .map_err(io_err)?;

        let tiles: Vec<TileRecord> = tile_buffer
            .chunks_exact(4)
            .map(|tc| TileRecord {
                tile: tc[0],
                cluster_count: tc[1],
                uncompressed_size: tc[2],
                compressed_size: tc[3],
            })
            .collect();

        let non_pf_clusters_excluded = match rdr.read_u8().map_err(io_err)? {
            0 => false,
            1 => true,
            flag => {
                return Err(BclError::format(
                    cbcl_path,
                    format!("excluded-clusters flag is {}, expected 0 or 1", flag),
                ))
            }
        };

        if measured != header_size as u64 {
            return Err(BclError::format(
                cbcl_path,
                format!(
                    "header claims to be {} bytes but it's actually {}",
                    header_size, measured
                ),
            ));
        }

        let expected_len = tiles
            .iter()
            .map(|t| t.compressed_size as u64)
            .sum::<u64>()
            + header_size as u64;
        if expected_len != file_len {
            return Err(BclError::format(
                cbcl_path,
                format!(
                    "file should be {} bytes but it's actually {}",
                    expected_len, file_len
                ),
            ));
        }

        let mut seen = HashSet::with_capacity(tiles.len());
        if let Some(dup) = tiles.iter().find(|t| !seen.insert(t.tile)) {
            return Err(BclError::format(
                cbcl_path,
                format!("tile {} appears more than once", dup.tile),
            ));
        }

        Ok(CBCLHeader {
            cbcl_path: cbcl_path.to_path_buf(),
            version,
            header_size,
            bits_per_basecall,
            bits_per_qscore,
            bins,
            tiles,
            non_pf_clusters_excluded,
        })
    }

    /// All tile records with their file offsets, in file order
    pub fn blocks(&self) -> impl Iterator<Item = TileBlock> + '_ {
        self.tiles.iter().scan(self.header_size as u64, |pos, t| {
            let offset = *pos;
            *pos += t.compressed_size as u64;
            Some(TileBlock {
                tile: t.tile,
                cluster_count: t.cluster_count as usize,
                uncompressed_size: t.uncompressed_size as usize,
                compressed_size: t.compressed_size as usize,
                offset,
            })
        })
    }

    /// Find the block for `tile`, its offset being the header size plus the
    /// compressed sizes of every tile before it. Tile numbers are unique, as
    /// checked when the header was read.
    pub fn locate(&self, tile: u32) -> Result<TileBlock> {
        self.blocks().find(|b| b.tile == tile).ok_or_else(|| {
            BclError::not_found(format!("tile {}", tile), vec![self.cbcl_path.clone()])
        })
    }
}

fn check_fits(cbcl_path: &Path, needed: u64, file_len: u64, what: &str) -> Result<()> {
    if needed > file_len {
        Err(BclError::format(
            cbcl_path,
            format!(
                "{} would end at byte {} but the file is only {} bytes",
                what, needed, file_len
            ),
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{CbclBlock, CbclFile};

    fn three_tiles() -> CbclFile {
        CbclFile::new(
            vec![
                CbclBlock {
                    tile: 1101,
                    cluster_count: 6,
                    packed: vec![0x12, 0x34, 0x56],
                },
                CbclBlock {
                    tile: 1102,
                    cluster_count: 3,
                    packed: vec![0x78, 0x09],
                },
                CbclBlock {
                    tile: 1103,
                    cluster_count: 2,
                    packed: vec![0xff],
                },
            ],
            false,
        )
    }

    #[test]
    fn decode() {
        let dir = tempfile::tempdir().unwrap();
        let cbcl_path = dir.path().join("L001_1.cbcl");
        three_tiles().write(&cbcl_path);

        let header = CBCLHeader::from_path(&cbcl_path).unwrap();
        assert_eq!(header.version, 1);
        assert_eq!(header.header_size, 12 + 32 + 4 + 48 + 1);
        assert_eq!(header.bits_per_basecall, 2);
        assert_eq!(header.bits_per_qscore, 2);
        assert_eq!(header.bins, vec![(0, 0), (1, 12), (2, 24), (3, 37)]);
        assert_eq!(
            header.tiles.iter().map(|t| t.tile).collect::<Vec<_>>(),
            vec![1101, 1102, 1103]
        );
        assert_eq!(
            header
                .tiles
                .iter()
                .map(|t| (t.cluster_count, t.uncompressed_size))
                .collect::<Vec<_>>(),
            vec![(6, 3), (3, 2), (2, 1)]
        );
        assert!(!header.non_pf_clusters_excluded);
    }

    #[test]
    fn locate() {
        let dir = tempfile::tempdir().unwrap();
        let cbcl_path = dir.path().join("L001_1.cbcl");
        three_tiles().write(&cbcl_path);
        let header = CBCLHeader::from_path(&cbcl_path).unwrap();

        let first = header.locate(1101).unwrap();
        assert_eq!(first.offset, header.header_size as u64);

        let third = header.locate(1103).unwrap();
        assert_eq!(third.tile, 1103);
        let expected_offset = header.header_size as u64
            + header.tiles[0].compressed_size as u64
            + header.tiles[1].compressed_size as u64;
        assert_eq!(third.offset, expected_offset);
        assert_eq!(third.cluster_count, 2);
        assert_eq!(third.uncompressed_size, 1);

        let file_len = std::fs::metadata(&cbcl_path).unwrap().len();
        assert_eq!(third.offset + third.compressed_size as u64, file_len);

        assert!(matches!(
            header.locate(2101),
            Err(BclError::NotFound { .. })
        ));
    }

    #[test]
    fn excluded_flag() {
        let dir = tempfile::tempdir().unwrap();
        let cbcl_path = dir.path().join("L001_1.cbcl");
        let mut cbcl = three_tiles();
        cbcl.excluded_flag = 1;
        cbcl.write(&cbcl_path);
        assert!(CBCLHeader::from_path(&cbcl_path).unwrap().non_pf_clusters_excluded);

        cbcl.excluded_flag = 2;
        cbcl.write(&cbcl_path);
        assert!(matches!(
            CBCLHeader::from_path(&cbcl_path),
            Err(BclError::Format { .. })
        ));
    }

    #[test]
    fn bad_fields() {
        let dir = tempfile::tempdir().unwrap();
        let cbcl_path = dir.path().join("L001_1.cbcl");

        let mut cbcl = three_tiles();
        cbcl.version = 2;
        cbcl.write(&cbcl_path);
        assert!(matches!(
            CBCLHeader::from_path(&cbcl_path),
            Err(BclError::Format { .. })
        ));

        let mut cbcl = three_tiles();
        cbcl.bits_per_basecall = 3;
        cbcl.write(&cbcl_path);
        assert!(matches!(
            CBCLHeader::from_path(&cbcl_path),
            Err(BclError::Format { .. })
        ));

        let mut cbcl = three_tiles();
        cbcl.bits_per_qscore = 6;
        cbcl.write(&cbcl_path);
        assert!(matches!(
            CBCLHeader::from_path(&cbcl_path),
            Err(BclError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn header_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let cbcl_path = dir.path().join("L001_1.cbcl");
        let mut cbcl = three_tiles();
        cbcl.header_size = Some(5681);
        cbcl.write(&cbcl_path);

        match CBCLHeader::from_path(&cbcl_path) {
            Err(BclError::Format { msg, .. }) => {
                assert!(msg.contains("header claims to be 5681 bytes"), "{}", msg)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn file_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let cbcl_path = dir.path().join("L001_1.cbcl");
        let mut cbcl = three_tiles();
        cbcl.trailing = vec![0, 0, 0];
        cbcl.write(&cbcl_path);

        match CBCLHeader::from_path(&cbcl_path) {
            Err(BclError::Format { msg, .. }) => assert!(msg.contains("file should be"), "{}", msg),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn duplicate_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let cbcl_path = dir.path().join("L001_1.cbcl");
        let mut cbcl = three_tiles();
        cbcl.blocks[2].tile = 1101;
        cbcl.write(&cbcl_path);

        assert!(matches!(
            CBCLHeader::from_path(&cbcl_path),
            Err(BclError::Format { .. })
        ));
    }

    #[test]
    fn no_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CBCLHeader::from_path(&dir.path().join("no_file.cbcl")),
            Err(BclError::NotFound { .. })
        ));
    }

    #[test]
    fn bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let cbcl_path = dir.path().join("bad_data_8.bin");
        std::fs::write(&cbcl_path, [1u8, 0, 97, 0, 0, 0, 2, 2]).unwrap();
        assert!(matches!(
            CBCLHeader::from_path(&cbcl_path),
            Err(BclError::Format { .. })
        ));
    }

    #[test]
    fn huge_bin_count() {
        let dir = tempfile::tempdir().unwrap();
        let cbcl_path = dir.path().join("L001_1.cbcl");
        let mut bytes = vec![1u8, 0, 97, 0, 0, 0, 2, 2];
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&cbcl_path, bytes).unwrap();

        assert!(matches!(
            CBCLHeader::from_path(&cbcl_path),
            Err(BclError::Format { .. })
        ));
    }
}
