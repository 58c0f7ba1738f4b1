//! Collect per-cycle calls into one sequence per cluster, and check requested
//! cluster indices before any file is touched.

use std::collections::HashMap;

use crate::base_call::{call_to_byte, Base};
use crate::error::{BclError, Result};
use crate::filter_decoder::FilterIndex;

/// Sequence and filter flag for one requested cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterResult {
    /// one character per requested cycle, `N` for a no-call
    pub sequence: String,
    /// whether the cluster passed the instrument's filter
    pub accept: bool,
}

/// Integer types accepted as cluster indices. Signed types are allowed so
/// that a negative request is reported rather than wrapped, and every value
/// widens to `i128` so an error names exactly the index that was asked for.
pub trait ClusterIndex: Copy {
    fn to_signed(self) -> i128;
}

macro_rules! impl_cluster_index {
    ($($t:ty),*) => {
        $(impl ClusterIndex for $t {
            #[inline]
            fn to_signed(self) -> i128 {
                self as i128
            }
        })*
    };
}

impl_cluster_index!(usize, u64, u32, u16, i64, i32);

/// Check every index lies in `[0, cluster_count)` and return them sorted and
/// deduplicated. The first offending index, in request order, is reported.
pub fn validate_clusters<I>(indices: I, tile: u32, cluster_count: usize) -> Result<Vec<usize>>
where
    I: IntoIterator,
    I::Item: ClusterIndex,
{
    let mut clusters = indices
        .into_iter()
        .map(|i| {
            let index = i.to_signed();
            if index < 0 || index >= cluster_count as i128 {
                Err(BclError::OutOfRange {
                    index,
                    tile,
                    cluster_count,
                })
            } else {
                Ok(index as usize)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    clusters.sort_unstable();
    clusters.dedup();

    Ok(clusters)
}

/// Builds the sequences for a fixed set of clusters, one cycle at a time
#[derive(Debug)]
pub struct SequenceAssembler {
    clusters: Vec<usize>,
    n_cycles: usize,
    /// `n_cycles` bytes per cluster, in cluster order
    bases: Vec<u8>,
}

impl SequenceAssembler {
    /// `clusters` must be sorted and distinct, as returned by `validate_clusters`
    pub fn new(clusters: Vec<usize>, n_cycles: usize) -> Self {
        let bases = vec![b'N'; clusters.len() * n_cycles];
        SequenceAssembler {
            clusters,
            n_cycles,
            bases,
        }
    }

    pub fn clusters(&self) -> &[usize] {
        &self.clusters
    }

    /// Record the calls for one cycle; `calls` is in the same order as `clusters()`
    pub fn add_cycle(&mut self, cycle_offset: usize, calls: &[Option<Base>]) {
        assert!(cycle_offset < self.n_cycles);
        assert_eq!(calls.len(), self.clusters.len());

        for (seq, &call) in self.bases.chunks_exact_mut(self.n_cycles).zip(calls) {
            seq[cycle_offset] = call_to_byte(call);
        }
    }

    /// Pair each sequence with its pass flag
    pub fn finish(self, filter: &FilterIndex) -> Result<HashMap<usize, ClusterResult>> {
        let mut results = HashMap::with_capacity(self.clusters.len());

        if self.n_cycles == 0 {
            for &i in &self.clusters {
                results.insert(
                    i,
                    ClusterResult {
                        sequence: String::new(),
                        accept: filter.is_pass(i)?,
                    },
                );
            }
            return Ok(results);
        }

        for (&i, seq) in self
            .clusters
            .iter()
            .zip(self.bases.chunks_exact(self.n_cycles))
        {
            results.insert(
                i,
                ClusterResult {
                    sequence: seq.iter().map(|&b| b as char).collect(),
                    accept: filter.is_pass(i)?,
                },
            );
        }

        Ok(results)
    }
}
