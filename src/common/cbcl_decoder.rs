//! Extract and decompress one tile's block from a CBCL file, and pull out the
//! calls for selected clusters.

use std::{
    fs::File,
    io::{prelude::*, BufReader, SeekFrom},
};

use flate2::read::MultiGzDecoder;
use log::debug;

use crate::assembler::validate_clusters;
use crate::base_call::{decode_packed, Base};
use crate::cbcl_header_decoder::{CBCLHeader, TileBlock};
use crate::error::{BclError, Result};
use crate::filter_decoder::{ExclusionOffset, FilterIndex};

/// Decompress the block for one tile and return exactly `uncompressed_size` bytes.
///
/// Blocks are gzip streams stored back to back, so the reader is limited to
/// this block's compressed bytes and stops once the declared size is read.
pub fn extract_tile(header: &CBCLHeader, block: &TileBlock) -> Result<Vec<u8>> {
    let path = &header.cbcl_path;

    // open file and seek to start position
    let mut cbcl = File::open(path).map_err(|e| BclError::from_io(path, e))?;
    cbcl.seek(SeekFrom::Start(block.offset))?;

    let limited = BufReader::new(cbcl).take(block.compressed_size as u64);
    let mut gz = MultiGzDecoder::new(limited);

    let mut read_buffer = vec![0u8; block.uncompressed_size];
    gz.read_exact(&mut read_buffer).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => BclError::format(
            path,
            format!(
                "tile {} block decompresses to fewer than the declared {} bytes",
                block.tile, block.uncompressed_size
            ),
        ),
        _ => BclError::format(
            path,
            format!("tile {} block could not be decompressed: {}", block.tile, e),
        ),
    })?;

    Ok(read_buffer)
}

/// Decode the calls for `clusters` (tile indices, in any order) from one block.
/// The result has one call per entry, in the same order.
///
/// When the file excludes non-passing clusters, each index is mapped through
/// the filter; an excluded cluster is a no-call. Otherwise the position in the
/// block is the cluster index itself.
pub fn decode_block(
    header: &CBCLHeader,
    block: &TileBlock,
    clusters: &[usize],
    filter: &FilterIndex,
) -> Result<Vec<Option<Base>>> {
    let path = &header.cbcl_path;
    let excluded = header.non_pf_clusters_excluded;

    validate_clusters(clusters.iter().copied(), block.tile, filter.cluster_count())?;

    let expected_clusters = if excluded {
        filter.passing_count()?
    } else {
        filter.cluster_count()
    };
    if block.cluster_count != expected_clusters {
        return Err(BclError::format(
            path,
            format!(
                "tile {} block holds {} clusters but the filter implies {}{}",
                block.tile,
                block.cluster_count,
                expected_clusters,
                if excluded { " passing clusters" } else { "" }
            ),
        ));
    }
    if (block.cluster_count + 1) / 2 > block.uncompressed_size {
        return Err(BclError::format(
            path,
            format!(
                "tile {} block is {} bytes, too small for {} clusters",
                block.tile, block.uncompressed_size, block.cluster_count
            ),
        ));
    }

    let data = extract_tile(header, block)?;

    debug!(
        "decoding {} clusters from tile {} of {} (excluded: {})",
        clusters.len(),
        block.tile,
        path.display(),
        excluded
    );

    clusters
        .iter()
        .map(|&i| {
            let position = if excluded {
                match filter.exclusion_offset(i)? {
                    ExclusionOffset::Present(n) => n,
                    ExclusionOffset::Excluded => return Ok(None),
                }
            } else {
                i
            };

            // in range: position < block.cluster_count, which fits the block
            Ok(decode_packed(data[position / 2], position))
        })
        .collect()
}
