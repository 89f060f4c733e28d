//! Closed syncmers of aligned and unaligned sequences.
//!
//! A k-mer is a (closed) syncmer when the smallest of its s-mers sits at its
//! first or last offset. Only k-mers made of A, C, G and T are considered.
//! In aligned sequences gap columns are skipped, so a k-mer is k bases that
//! may span gaps, and it is located by the columns of its first and last
//! base.
//!
//! The tree-wide index ([`index`]) stores the syncmers of the root and, per
//! node, what changes relative to the parent. Placement ([`place`]) scores
//! every node against the syncmers of a read set.

use std::ops::Range;

use serde::{Deserialize, Serialize};

pub mod index;
pub mod place;

use crate::mutation::bit_encoding::{is_acgt, GAP};

/// Default k-mer length
pub const DEFAULT_K: usize = 15;
/// Default s-mer length
pub const DEFAULT_S: usize = 8;

/// k-mer and s-mer lengths
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncmerParams {
    /// k-mer length
    pub k: usize,
    /// s-mer length, smaller than `k`
    pub s: usize,
}

impl Default for SyncmerParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            s: DEFAULT_S,
        }
    }
}

/// A syncmer and the columns it covers
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Syncmer {
    /// Column of the first base
    pub pos: usize,
    /// One past the column of the last base
    pub end: usize,
    /// Bases, upper case
    pub seq: Vec<u8>,
}

/// Whether the smallest s-mer of `kmer` is its first or last one
pub fn is_syncmer(kmer: &[u8], s: usize) -> bool {
    if s == 0 || s > kmer.len() {
        return false;
    }
    let n_smers = kmer.len() - s + 1;
    let mut min_idx = 0;
    for idx in 1..n_smers {
        if kmer[idx..idx + s] < kmer[min_idx..min_idx + s] {
            min_idx = idx;
        }
    }
    min_idx == 0 || min_idx == n_smers - 1
}

/// Syncmers lying entirely inside `window` (columns), in column order
pub fn syncmers_in(seq: &[u8], window: Range<usize>, params: &SyncmerParams) -> Vec<Syncmer> {
    let window = window.start.min(seq.len())..window.end.min(seq.len());
    syncmers_at(&seq[window.clone()], window.start, params)
}

/// Syncmers of `columns`, a stretch of an aligned sequence starting at
/// column `offset`
pub fn syncmers_at(columns: &[u8], offset: usize, params: &SyncmerParams) -> Vec<Syncmer> {
    let columns: Vec<(usize, u8)> = columns
        .iter()
        .enumerate()
        .filter(|(_, base)| **base != GAP)
        .map(|(idx, base)| (offset + idx, base.to_ascii_uppercase()))
        .collect();
    if params.k == 0 || columns.len() < params.k {
        return Vec::new();
    }
    let mut found = Vec::new();
    let mut kmer = Vec::with_capacity(params.k);
    for start in 0..=(columns.len() - params.k) {
        let bases = &columns[start..start + params.k];
        if !bases.iter().all(|(_, b)| is_acgt(*b)) {
            continue;
        }
        kmer.clear();
        kmer.extend(bases.iter().map(|(_, b)| *b));
        if is_syncmer(&kmer, params.s) {
            found.push(Syncmer {
                pos: bases[0].0,
                end: bases[params.k - 1].0 + 1,
                seq: kmer.clone(),
            });
        }
    }
    found
}

/// All syncmers of a sequence, in column order
pub fn syncmers(seq: &[u8], params: &SyncmerParams) -> Vec<Syncmer> {
    syncmers_in(seq, 0..seq.len(), params)
}
