//! Replacing `N` bases with bases found elsewhere in the tree.
//!
//! Substitutions to `N` are simply dropped: the site keeps the parent's
//! base. Insertions of `N` have no parent base to fall back on, so the
//! node is instead moved next to a nearby node (the donor) that inserted
//! real bases at the same run. The node's new mutations are the composed
//! edits from the donor's sequence to its own, with the `N` substitutions
//! that composition produces dropped in turn.
//!
//! Moves preserve the sequence of every node apart from the `N`s. Nodes
//! carrying block mutations are never moved, and searches never cross an
//! edge with block mutations.

use std::collections::BTreeMap;
use std::fmt;

use hashbrown::HashMap;

use crate::coordinates::Coordinate;
use crate::error::{MatError, Result};
use crate::mutation::bit_encoding::{nuc_to_code, GAP, GAP_CODE, N_CODE};
use crate::mutation::consolidate::{expand, from_sites, SiteEdit};
use crate::mutation::{EditKind, NucMut};
use crate::replay::buffer::{SequenceBuffer, UndoLog};
use crate::subtree::consolidate_node;
use crate::tree::{Node, NodeIdx, Tree};

/// Default search radius, in branch length
pub const DEFAULT_DISTANCE: f32 = 1.0;

/// What counts as an improvement when comparing moves
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MoveComparison {
    /// Change in nucleotide sites edited
    #[default]
    NucleotideOnly,
    /// Change in nucleotide sites plus change in block mutations
    NucleotideAndBlock,
}

/// Which of two equally good moves wins
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// The first one found (children before parents, in stored order)
    #[default]
    FirstEncountered,
    /// The one closer in branch length
    Nearest,
}

/// Imputation settings
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImputeConfig {
    /// Branch length a donor search may cover
    pub allowed_distance: f32,
    /// Scoring of candidate moves
    pub comparison: MoveComparison,
    /// Choice between equal scores
    pub tie_break: TieBreak,
}

impl Default for ImputeConfig {
    fn default() -> Self {
        Self {
            allowed_distance: DEFAULT_DISTANCE,
            comparison: MoveComparison::default(),
            tie_break: TieBreak::default(),
        }
    }
}

/// Outcome of [`Tree::impute_ns`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImputeStats {
    /// `N` bases written by substitutions
    pub substitutions_flagged: usize,
    /// Of those, bases reverted to the parent's
    pub substitutions_imputed: usize,
    /// Nodes whose insertions carry `N`s
    pub insertion_nodes: usize,
    /// Nodes moved next to a donor
    pub nodes_moved: usize,
    /// Nodes left alone because they carry block mutations
    pub skipped_block_mutations: usize,
}

impl fmt::Display for ImputeStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "substitutions_imputed\t{}/{}",
            self.substitutions_imputed, self.substitutions_flagged
        )?;
        writeln!(
            f,
            "insertion_nodes_moved\t{}/{}",
            self.nodes_moved, self.insertion_nodes
        )?;
        write!(
            f,
            "skipped_block_mutations\t{}",
            self.skipped_block_mutations
        )
    }
}

// A run of inserted sites on one edge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct IndelPosition {
    start: Coordinate,
    length: usize,
}

#[derive(Clone, Copy, Debug)]
struct Insertion {
    position: IndelPosition,
    n_count: usize,
}

struct Candidate {
    donor: NodeIdx,
    mutations: Vec<NucMut>,
    improvement: i64,
    distance: f32,
}

struct Move {
    node: NodeIdx,
    donor: NodeIdx,
    mutations: Vec<NucMut>,
}

fn is_n_substitution(edit: &SiteEdit) -> bool {
    edit.0 == EditKind::Substitution && edit.1 == N_CODE
}

// Consolidated `muts` without substitutions to N, and how many N sites went
fn drop_n_substitutions(muts: &[NucMut]) -> (Vec<NucMut>, usize) {
    let mut sites = expand(muts);
    let before = sites.len();
    sites.retain(|_, edit| !is_n_substitution(edit));
    let dropped = before - sites.len();
    (from_sites(&sites), dropped)
}

// Runs of consecutive inserted sites and their N counts
fn insertions(muts: &[NucMut]) -> Vec<Insertion> {
    let mut runs: Vec<Insertion> = Vec::new();
    let mut last: Option<Coordinate> = None;
    for (coord, (kind, code)) in expand(muts) {
        if kind != EditKind::Insertion {
            last = None;
            continue;
        }
        let is_n = usize::from(code == N_CODE);
        match (last, runs.last_mut()) {
            (Some(prev), Some(run)) if prev.is_followed_by(&coord) => {
                run.position.length += 1;
                run.n_count += is_n;
            }
            _ => runs.push(Insertion {
                position: IndelPosition {
                    start: coord,
                    length: 1,
                },
                n_count: is_n,
            }),
        }
        last = Some(coord);
    }
    runs
}

// Edits taking a node's sequence back to its parent's, given the parent's
// code at each site the node edits
fn inverse(node: &Node, parent_codes: &BTreeMap<Coordinate, u8>) -> Vec<NucMut> {
    let mut sites = BTreeMap::new();
    for (coord, (kind, _)) in expand(&node.nuc_mutation) {
        let original = parent_codes.get(&coord).copied().unwrap_or(GAP_CODE);
        let undo = match kind {
            EditKind::Insertion => Some((EditKind::Deletion, GAP_CODE)),
            EditKind::Substitution | EditKind::Deletion if original != GAP_CODE => {
                let kind = if kind == EditKind::Substitution {
                    EditKind::Substitution
                } else {
                    EditKind::Insertion
                };
                Some((kind, original))
            }
            _ => None,
        };
        if let Some(edit) = undo {
            sites.insert(coord, edit);
        }
    }
    from_sites(&sites)
}

enum Visit {
    Enter(NodeIdx),
    Exit(UndoLog),
}

impl Tree {
    // Code of the parent's sequence at every site each node edits. Only the
    // first edit of a site is recorded.
    pub(crate) fn parent_codes(&self) -> Result<Vec<BTreeMap<Coordinate, u8>>> {
        let mut codes = vec![BTreeMap::new(); self.capacity()];
        let mut buffer = SequenceBuffer::new(self.catalog())?;
        let mut stack = vec![Visit::Enter(self.root())];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(idx) => {
                    let node = self.node(idx);
                    let recorded = &mut codes[idx];
                    for m in &node.nuc_mutation {
                        for (coord, _) in m.sites() {
                            recorded.entry(coord).or_insert_with(|| {
                                nuc_to_code(buffer.get(&coord).unwrap_or(GAP))
                            });
                        }
                    }
                    let log = buffer.apply(node)?;
                    stack.push(Visit::Exit(log));
                    stack.extend(node.children.iter().rev().map(|c| Visit::Enter(*c)));
                }
                Visit::Exit(log) => buffer.undo(log),
            }
        }
        Ok(codes)
    }

    /// Replaces `N` bases with real ones where the tree allows.
    ///
    /// Every node is consolidated first. Then:
    /// 1. substitutions to `N` are removed, site by site;
    /// 2. each node inserting `N`s looks for a donor within
    ///    `config.allowed_distance` that inserted one of the same runs with
    ///    fewer `N`s, and is moved under a new zero-length node beside it if that
    ///    strictly reduces the sites it edits.
    ///
    /// Parents left with one child and the new nodes are merged afterwards.
    pub fn impute_ns(&mut self, config: &ImputeConfig) -> Result<ImputeStats> {
        let mut stats = ImputeStats::default();
        self.consolidate_all()?;

        log::info!("Removing N substitutions");
        for idx in self.preorder(self.root()) {
            let node = self.node_mut(idx);
            let (muts, dropped) = drop_n_substitutions(&node.nuc_mutation);
            if dropped > 0 {
                node.nuc_mutation = muts;
                stats.substitutions_flagged += dropped;
                stats.substitutions_imputed += dropped;
            }
        }
        log::info!(
            "Imputed {}/{} N substitutions",
            stats.substitutions_imputed,
            stats.substitutions_flagged
        );

        log::info!("Searching donors for N insertions");
        let parent_codes = self.parent_codes()?;
        let inserted: HashMap<NodeIdx, Vec<Insertion>> = self
            .preorder(self.root())
            .into_iter()
            .map(|idx| (idx, insertions(&self.node(idx).nuc_mutation)))
            .filter(|(_, runs)| !runs.is_empty())
            .collect();

        let mut moves = Vec::new();
        for idx in self.preorder(self.root()) {
            let Some(runs) = inserted.get(&idx) else {
                continue;
            };
            let wanted: Vec<IndelPosition> = runs
                .iter()
                .filter(|run| run.n_count > 0)
                .map(|run| run.position)
                .collect();
            if wanted.is_empty() {
                continue;
            }
            stats.insertion_nodes += 1;
            let node = self.node(idx);
            if !node.block_mutation.is_empty() {
                log::warn!(
                    "Not moving {}: it carries block mutations",
                    node.identifier
                );
                stats.skipped_block_mutations += 1;
                continue;
            }
            let Some(parent) = node.parent else {
                continue;
            };
            if let Some(best) =
                self.find_donor(idx, parent, &wanted, &inserted, &parent_codes, config)
            {
                log::debug!(
                    "Moving {} beside {} (improvement {})",
                    node.identifier,
                    self.node(best.donor).identifier,
                    best.improvement
                );
                moves.push(Move {
                    node: idx,
                    donor: best.donor,
                    mutations: best.mutations,
                });
            }
        }

        let mut touched = Vec::with_capacity(moves.len() * 2);
        for m in moves {
            if self.is_ancestor(m.node, m.donor) {
                log::debug!(
                    "Skipping move of {}: donor is now below it",
                    self.node(m.node).identifier
                );
                continue;
            }
            let (old_parent, dummy) = self.move_beside(m.node, m.donor, m.mutations)?;
            touched.push(old_parent);
            touched.push(dummy);
            stats.nodes_moved += 1;
        }
        log::info!(
            "Moved {}/{} nodes with N insertions",
            stats.nodes_moved,
            stats.insertion_nodes
        );

        for idx in touched {
            while self.get_node(idx).is_some_and(|n| n.children.len() == 1) {
                let child = self.node(idx).children[0];
                self.merge_nodes(idx, child)?;
                consolidate_node(self.node_mut(idx))?;
            }
        }
        self.fix_levels();
        Ok(stats)
    }

    // Depth-first search from `start` (the node's parent), children before
    // the parent, for the donor giving the best move
    fn find_donor(
        &self,
        node: NodeIdx,
        start: NodeIdx,
        wanted: &[IndelPosition],
        inserted: &HashMap<NodeIdx, Vec<Insertion>>,
        parent_codes: &[BTreeMap<Coordinate, u8>],
        config: &ImputeConfig,
    ) -> Option<Candidate> {
        let own = &self.node(node).nuc_mutation;
        let old_sites = expand(own).len() as i64;
        let old_blocks = self.node(node).block_mutation.len() as i64;

        let mut best: Option<Candidate> = None;
        // (current, came from, edits current -> start, distance covered)
        let mut stack: Vec<(NodeIdx, NodeIdx, Vec<NucMut>, f32)> =
            vec![(start, node, Vec::new(), 0.0)];
        while let Some((cur, from, path, distance)) = stack.pop() {
            let is_donor = inserted.get(&cur).is_some_and(|runs| {
                wanted.iter().any(|w| {
                    runs.iter()
                        .any(|r| r.position == *w && r.n_count < r.position.length)
                })
            });
            if is_donor {
                let mut composed = path.clone();
                composed.extend(own.iter().cloned());
                let (mutations, _) = drop_n_substitutions(&composed);
                let mut improvement = old_sites - expand(&mutations).len() as i64;
                if config.comparison == MoveComparison::NucleotideAndBlock {
                    // Neither the node nor any edge crossed has block mutations
                    improvement += old_blocks;
                }
                let better = improvement > 0
                    && match &best {
                        None => true,
                        Some(b) if improvement > b.improvement => true,
                        Some(b) if improvement == b.improvement => {
                            config.tie_break == TieBreak::Nearest && distance < b.distance
                        }
                        Some(_) => false,
                    };
                if better {
                    best = Some(Candidate {
                        donor: cur,
                        mutations,
                        improvement,
                        distance,
                    });
                }
            }

            let current = self.node(cur);
            if let Some(parent) = current.parent {
                let step = distance + current.branch_length;
                if parent != from
                    && current.block_mutation.is_empty()
                    && step <= config.allowed_distance
                {
                    let mut up = current.nuc_mutation.clone();
                    up.extend(path.iter().cloned());
                    stack.push((parent, cur, up, step));
                }
            }
            for child in current.children.iter().rev() {
                let c = self.node(*child);
                let step = distance + c.branch_length;
                if *child == from
                    || *child == node
                    || !c.block_mutation.is_empty()
                    || step > config.allowed_distance
                {
                    continue;
                }
                let mut down = inverse(c, &parent_codes[*child]);
                down.extend(path.iter().cloned());
                stack.push((*child, cur, down, step));
            }
        }
        best
    }

    // Splices a zero-length node above `donor` holding the donor's edge, and
    // hangs both the donor and `node` from it. Returns the node's former
    // parent and the new node.
    fn move_beside(
        &mut self,
        node: NodeIdx,
        donor: NodeIdx,
        mutations: Vec<NucMut>,
    ) -> Result<(NodeIdx, NodeIdx)> {
        let old_parent = self
            .node(node)
            .parent
            .ok_or_else(|| MatError::inconsistent("moving the root"))?;
        self.node_mut(old_parent).children.retain(|c| *c != node);

        let id = self.new_internal_id();
        let donor_node = self.node_mut(donor);
        let dummy = Node {
            identifier: id,
            branch_length: donor_node.branch_length,
            level: 0,
            parent: donor_node.parent,
            children: vec![donor, node],
            nuc_mutation: std::mem::take(&mut donor_node.nuc_mutation),
            block_mutation: std::mem::take(&mut donor_node.block_mutation),
            annotations: Vec::new(),
        };
        donor_node.branch_length = 0.0;
        let grandparent = dummy.parent;
        let dummy_idx = self.add_node(dummy)?;

        match grandparent {
            Some(gp) => {
                for child in self.node_mut(gp).children.iter_mut() {
                    if *child == donor {
                        *child = dummy_idx;
                    }
                }
            }
            None => self.set_root(dummy_idx),
        }
        self.node_mut(donor).parent = Some(dummy_idx);
        let moved = self.node_mut(node);
        moved.parent = Some(dummy_idx);
        moved.nuc_mutation = mutations;
        Ok((old_parent, dummy_idx))
    }
}
