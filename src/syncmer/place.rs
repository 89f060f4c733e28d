//! Placing a read set on the tree by syncmer Jaccard similarity.
//!
//! Read syncmers (both strands) form the query set. Starting from the
//! baseline, each node's delta adjusts how often every syncmer sequence
//! occurs in the node. A sequence whose count drops to zero leaves the
//! intersection if the reads have it and the union otherwise; one whose
//! count rises from zero joins the intersection or the union.
//! The best node's gapless sequence then serves as the reference for
//! seeding each read.

use std::fmt;

use hashbrown::{HashMap, HashSet};
use needletail::parse_fastx_file;

use crate::error::{MatError, Result};
use crate::mutation::bit_encoding::revcomp;
use crate::replay::sequence_of;
use crate::syncmer::index::{SyncmerDelta, SyncmerIndex};
use crate::syncmer::{syncmers, Syncmer, SyncmerParams};
use crate::tree::{NodeIdx, Tree};

/// A named read
pub type Read = (String, Vec<u8>);

/// Reads all records of a FASTA/FASTQ file (optionally gzipped)
pub fn read_fastx(filename: &str) -> Result<Vec<Read>> {
    let mut reader = parse_fastx_file(filename)?;
    let mut reads = Vec::new();
    while let Some(record) = reader.next() {
        let record = record?;
        reads.push((
            String::from_utf8_lossy(record.id()).to_string(),
            record.seq().to_vec(),
        ));
    }
    log::info!("Read {} sequences from {filename}", reads.len());
    Ok(reads)
}

/// Syncmer sequences of the reads and their reverse complements
pub fn query_syncmers(reads: &[Read], params: &SyncmerParams) -> HashSet<Vec<u8>> {
    let mut query = HashSet::new();
    for (_, seq) in reads {
        query.extend(syncmers(seq, params).into_iter().map(|s| s.seq));
        query.extend(syncmers(&revcomp(seq), params).into_iter().map(|s| s.seq));
    }
    query
}

/// Score of every node and the best one
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    /// Node with the highest score, first in pre-order on ties
    pub best_node: String,
    /// Its Jaccard similarity
    pub best_score: f64,
    /// Every node's score, in pre-order
    pub scores: Vec<(String, f64)>,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "best_node\t{}", self.best_node)?;
        writeln!(f, "best_score\t{:.6}", self.best_score)?;
        for (name, score) in &self.scores {
            writeln!(f, "{name}\t{score:.6}")?;
        }
        Ok(())
    }
}

// Distinct syncmer sequences of the current node, with the intersection
// and union sizes against the query. A sequence repeated at several loci
// joins or leaves the sets once.
struct RunningSet<'a> {
    query: &'a HashSet<Vec<u8>>,
    multiplicity: HashMap<Vec<u8>, usize>,
    intersection: usize,
    union: usize,
}

impl<'a> RunningSet<'a> {
    fn new(query: &'a HashSet<Vec<u8>>) -> Self {
        Self {
            query,
            multiplicity: HashMap::new(),
            intersection: 0,
            union: query.len(),
        }
    }

    fn insert(&mut self, seq: &[u8]) {
        let count = self.multiplicity.entry_ref(seq).or_insert(0);
        *count += 1;
        if *count == 1 {
            if self.query.contains(seq) {
                self.intersection += 1;
            } else {
                self.union += 1;
            }
        }
    }

    fn remove(&mut self, seq: &[u8]) {
        let Some(count) = self.multiplicity.get_mut(seq) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.multiplicity.remove(seq);
            if self.query.contains(seq) {
                self.intersection -= 1;
            } else {
                self.union -= 1;
            }
        }
    }

    fn jaccard(&self) -> f64 {
        if self.union == 0 {
            0.0
        } else {
            self.intersection as f64 / self.union as f64
        }
    }
}

enum Step {
    Enter(NodeIdx),
    Leave(NodeIdx),
}

fn deleted_syncmers<'p>(
    parent: &'p [Syncmer],
    delta: &SyncmerDelta,
    identifier: &str,
) -> Result<Vec<&'p Syncmer>> {
    delta
        .deleted
        .iter()
        .map(|d| {
            parent.get(*d).ok_or_else(|| {
                MatError::inconsistent(format!(
                    "index deletes syncmer {d} of {identifier}'s parent, which has {}",
                    parent.len()
                ))
            })
        })
        .collect()
}

/// Scores every node of `tree` against the reads.
///
/// The score is the Jaccard similarity of the distinct syncmer sequences of
/// the node and of the reads.
pub fn place(index: &SyncmerIndex, tree: &Tree, reads: &[Read]) -> Result<Placement> {
    let query = query_syncmers(reads, &index.params);
    let mut running = RunningSet::new(&query);
    for syncmer in &index.baseline {
        running.insert(&syncmer.seq);
    }
    log::info!(
        "{} query syncmers, {} shared with the baseline",
        query.len(),
        running.intersection
    );

    let mut scores = Vec::with_capacity(tree.len());
    // Syncmer lists of the internal nodes on the current path
    let mut lists: Vec<Vec<Syncmer>> = vec![index.baseline.clone()];
    let mut stack = vec![Step::Enter(tree.root())];
    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(idx) => {
                let node = tree.node(idx);
                let delta = index.delta(&node.identifier)?;
                let parent = lists.last().map(Vec::as_slice).unwrap_or_default();
                for deleted in deleted_syncmers(parent, delta, &node.identifier)? {
                    running.remove(&deleted.seq);
                }
                for inserted in &delta.inserted {
                    running.insert(&inserted.seq);
                }
                scores.push((node.identifier.clone(), running.jaccard()));

                stack.push(Step::Leave(idx));
                if !node.is_leaf() {
                    let current = delta.apply(parent);
                    lists.push(current);
                    for child in node.children.iter().rev() {
                        stack.push(Step::Enter(*child));
                    }
                }
            }
            Step::Leave(idx) => {
                let node = tree.node(idx);
                let delta = index.delta(&node.identifier)?;
                if !node.is_leaf() {
                    lists.pop();
                }
                let parent = lists.last().map(Vec::as_slice).unwrap_or_default();
                for inserted in &delta.inserted {
                    running.remove(&inserted.seq);
                }
                for deleted in deleted_syncmers(parent, delta, &node.identifier)? {
                    running.insert(&deleted.seq);
                }
            }
        }
    }

    let mut best = 0;
    for (i, (_, score)) in scores.iter().enumerate() {
        if *score > scores[best].1 {
            best = i;
        }
    }
    let (best_node, best_score) = scores.get(best).cloned().ok_or(MatError::EmptyTree)?;
    log::info!("Best placement {best_node} with score {best_score:.4}");
    Ok(Placement {
        best_node,
        best_score,
        scores,
    })
}

/// A read seeded and extended against a reference sequence
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadAlignment {
    /// Read name
    pub read: String,
    /// Read aligned as its reverse complement
    pub reversed: bool,
    /// Reference offset of the read's first base (may be negative)
    pub ref_start: i64,
    /// Seeds on the chosen diagonal
    pub seeds: usize,
    /// Matching bases along the diagonal
    pub matches: usize,
    /// Mismatching bases along the diagonal
    pub mismatches: usize,
}

impl fmt::Display for ReadAlignment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.read,
            if self.reversed { '-' } else { '+' },
            self.ref_start,
            self.seeds,
            self.matches,
            self.mismatches
        )
    }
}

/// Shared syncmers between a read (either strand) and the reference, as
/// `(read offset, reference offset, reversed)`
pub fn seed_matches(
    read: &[u8],
    ref_positions: &HashMap<Vec<u8>, Vec<usize>>,
    params: &SyncmerParams,
) -> Vec<(usize, usize, bool)> {
    let mut seeds = Vec::new();
    for (reversed, oriented) in [(false, read.to_vec()), (true, revcomp(read))] {
        for syncmer in syncmers(&oriented, params) {
            if let Some(hits) = ref_positions.get(&syncmer.seq) {
                seeds.extend(hits.iter().map(|r| (syncmer.pos, *r, reversed)));
            }
        }
    }
    seeds
}

/// Seeds each read against `reference` and extends along the diagonal with
/// the most seeds. Reads without seeds are left out.
pub fn align_reads(reference: &[u8], reads: &[Read], params: &SyncmerParams) -> Vec<ReadAlignment> {
    let mut ref_positions: HashMap<Vec<u8>, Vec<usize>> = HashMap::new();
    for syncmer in syncmers(reference, params) {
        ref_positions.entry(syncmer.seq).or_default().push(syncmer.pos);
    }

    let mut alignments = Vec::with_capacity(reads.len());
    for (name, read) in reads {
        let seeds = seed_matches(read, &ref_positions, params);
        let mut diagonals: Vec<((bool, i64), usize)> = Vec::new();
        for (read_pos, ref_pos, reversed) in &seeds {
            let key = (*reversed, *ref_pos as i64 - *read_pos as i64);
            match diagonals.iter_mut().find(|(k, _)| *k == key) {
                Some((_, count)) => *count += 1,
                None => diagonals.push((key, 1)),
            }
        }
        let Some(((reversed, offset), n_seeds)) =
            diagonals
                .iter()
                .copied()
                .fold(None, |best: Option<((bool, i64), usize)>, d| match best {
                    Some(b) if b.1 >= d.1 => Some(b),
                    _ => Some(d),
                })
        else {
            log::debug!("No seeds for read {name}");
            continue;
        };

        let oriented = if reversed { revcomp(read) } else { read.clone() };
        let (mut matches, mut mismatches) = (0, 0);
        for (i, base) in oriented.iter().enumerate() {
            let ref_pos = offset + i as i64;
            if ref_pos < 0 || ref_pos as usize >= reference.len() {
                continue;
            }
            if reference[ref_pos as usize].eq_ignore_ascii_case(base) {
                matches += 1;
            } else {
                mismatches += 1;
            }
        }
        alignments.push(ReadAlignment {
            read: name.clone(),
            reversed,
            ref_start: offset,
            seeds: n_seeds,
            matches,
            mismatches,
        });
    }
    alignments
}

/// Places the reads, then aligns them to the best node's sequence
pub fn place_and_align(
    index: &SyncmerIndex,
    tree: &Tree,
    reads: &[Read],
) -> Result<(Placement, Vec<ReadAlignment>)> {
    let placement = place(index, tree, reads)?;
    let reference = sequence_of(tree, &placement.best_node, false)?;
    let alignments = align_reads(&reference, reads, &index.params);
    log::info!("Seeded {}/{} reads", alignments.len(), reads.len());
    Ok((placement, alignments))
}
