use serde::{Deserialize, Serialize};

use crate::Parallelization;

/// The task range covered by one chunk of a node.
///
/// `block_size == 0` means the node is not parallelized and this single
/// chunk covers the whole size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRange {
    pub iteration: usize,
    pub block_size: usize,
    pub full_size: usize,
}

impl ChunkRange {
    /// First task index covered by this chunk.
    pub fn start(&self) -> usize {
        self.iteration * self.block_size
    }

    /// Number of tasks actually covered; the final block may be ragged.
    pub fn effective_block_size(&self) -> usize {
        if self.block_size == 0 {
            return self.full_size;
        }
        let remaining = self.full_size.saturating_sub(self.start());
        self.block_size.min(remaining)
    }

    /// One past the last task index covered.
    pub fn end(&self) -> usize {
        self.start() + self.effective_block_size()
    }
}

/// Decompose a node of the given size into chunk ranges.
///
/// Unparallelized nodes always get exactly one chunk. A parallelized node
/// gets `ceil(size / block_size)` chunks, except that a node of size 0
/// still gets one (trivial) chunk so the state machine stays uniform.
pub fn chunk_ranges(size: usize, parallelization: Option<Parallelization>) -> Vec<ChunkRange> {
    let block_size = match parallelization {
        Some(p) if p.block_size > 0 => p.block_size,
        _ => {
            return vec![ChunkRange {
                iteration: 0,
                block_size: 0,
                full_size: size,
            }]
        }
    };
    let nb_chunks = if size == 0 {
        1
    } else {
        size.div_ceil(block_size)
    };
    (0..nb_chunks)
        .map(|iteration| ChunkRange {
            iteration,
            block_size,
            full_size: size,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn par(block_size: usize) -> Option<Parallelization> {
        Some(Parallelization { block_size })
    }

    #[test]
    fn test_unparallelized_single_chunk() {
        let ranges = chunk_ranges(10, None);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start(), 0);
        assert_eq!(ranges[0].end(), 10);
    }

    #[test]
    fn test_zero_size_single_chunk() {
        assert_eq!(chunk_ranges(0, None).len(), 1);
        assert_eq!(chunk_ranges(0, par(4)).len(), 1);
        assert_eq!(chunk_ranges(0, par(4))[0].effective_block_size(), 0);
    }

    #[test]
    fn test_ragged_final_block() {
        let ranges = chunk_ranges(10, par(4));
        assert_eq!(ranges.len(), 3);
        assert_eq!(
            ranges.iter().map(ChunkRange::start).collect::<Vec<_>>(),
            vec![0, 4, 8]
        );
        assert_eq!(
            ranges.iter().map(ChunkRange::end).collect::<Vec<_>>(),
            vec![4, 8, 10]
        );
        assert_eq!(ranges[2].effective_block_size(), 2);
    }

    #[test]
    fn test_disjoint_full_coverage() {
        for (size, block) in [(1, 1), (7, 3), (12, 4), (5, 10)] {
            let ranges = chunk_ranges(size, par(block));
            assert_eq!(ranges.len(), size.div_ceil(block));
            let mut covered = vec![false; size];
            for r in &ranges {
                for i in r.start()..r.end() {
                    assert!(!covered[i], "task {i} covered twice");
                    covered[i] = true;
                }
            }
            assert!(covered.iter().all(|c| *c));
        }
    }
}
