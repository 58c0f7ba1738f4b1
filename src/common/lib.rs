//! Random access to individual base calls in an Illumina run folder, reading
//! the per-cycle `.bcl.gz` files or the consolidated `.cbcl` files directly
//! instead of going through FASTQ.
//!
//! ```no_run
//! use common::Run;
//!
//! let run = Run::open("/path/to/190414_A00111_0296_AHJCWWDSXX")?;
//! let tile = run.tile(1u32, 1101)?;
//!
//! // one call per tile, with every cluster of interest
//! let seqs = tile.get_sequences(vec![70657usize, 70658, 70659], 20..40)?;
//! let accepted = seqs.values().filter(|r| r.accept).count();
//! # Ok::<(), common::BclError>(())
//! ```

mod assembler;
mod base_call;
mod error;

pub mod bcl_decoder;
pub mod cbcl_decoder;
pub mod cbcl_header_decoder;
pub mod filter_decoder;
pub mod logging;
pub mod run;
pub mod tile;

#[cfg(test)]
mod test_fixtures;

pub use assembler::{ClusterIndex, ClusterResult};
pub use base_call::{call_to_byte, decode_bcl_byte, decode_packed, Base};
pub use error::{BclError, Result};
pub use run::{Lane, ParseLaneError, Run};
pub use tile::{CycleSource, TileSession};
