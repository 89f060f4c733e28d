//! Subtree extraction and tree compression.
//!
//! Extraction keeps the requested nodes and all their ancestors, then
//! compresses: every chain of single-child nodes is merged into one node,
//! and every node's nucleotide mutations are consolidated.

use std::sync::atomic::{AtomicUsize, Ordering};

use indicatif::ParallelProgressIterator;
use rayon::prelude::*;

use crate::error::{MatError, Result};
use crate::mutation::consolidate::{consolidate, similar};
use crate::tree::{Node, NodeIdx, Tree};

/// What a call to [`Tree::compress`] changed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompressStats {
    /// Nodes merged into their parent
    pub merged: usize,
    /// Mutation records before consolidation
    pub mutations_before: usize,
    /// Mutation records after consolidation
    pub mutations_after: usize,
}

impl Tree {
    /// New tree holding `identifiers` and their ancestors, compressed.
    ///
    /// # Errors
    /// [`MatError::MissingNodes`] listing every identifier not in the tree;
    /// nothing is built in that case.
    pub fn extract_subtree(&self, identifiers: &[String]) -> Result<Tree> {
        let mut missing = Vec::new();
        let mut targets = Vec::with_capacity(identifiers.len());
        for id in identifiers {
            match self.get(id) {
                Some(idx) => targets.push(idx),
                None => missing.push(id.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(MatError::MissingNodes(missing));
        }
        if targets.is_empty() {
            return Err(MatError::EmptyTree);
        }

        log::info!("Marking ancestors of {} nodes", targets.len());
        let ticks: Vec<AtomicUsize> = (0..self.capacity()).map(|_| AtomicUsize::new(0)).collect();
        targets.par_iter().for_each(|target| {
            let mut cur = Some(*target);
            while let Some(idx) = cur {
                ticks[idx].fetch_add(1, Ordering::Relaxed);
                cur = self.node(idx).parent;
            }
        });

        log::info!("Copying marked nodes");
        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<(NodeIdx, Option<NodeIdx>)> = vec![(self.root(), None)];
        while let Some((old_idx, new_parent)) = stack.pop() {
            let old = self.node(old_idx);
            let new_idx = nodes.len();
            nodes.push(Node {
                identifier: old.identifier.clone(),
                branch_length: old.branch_length,
                level: 0,
                parent: new_parent,
                children: Vec::new(),
                nuc_mutation: old.nuc_mutation.clone(),
                block_mutation: old.block_mutation.clone(),
                annotations: old.annotations.clone(),
            });
            if let Some(p) = new_parent {
                nodes[p].children.push(new_idx);
            }
            stack.extend(
                old.children
                    .iter()
                    .rev()
                    .filter(|c| ticks[**c].load(Ordering::Relaxed) > 0)
                    .map(|c| (*c, Some(new_idx))),
            );
        }

        let mut subtree = Tree::from_nodes(nodes, 0, self.catalog().clone())?;
        let stats = subtree.compress()?;
        log::info!(
            "Subtree has {} nodes after merging {}",
            subtree.len(),
            stats.merged
        );
        Ok(subtree)
    }

    /// Merges single-child chains and consolidates every mutation list.
    ///
    /// The root is included: a root with one child absorbs it.
    ///
    /// # Errors
    /// [`MatError::Inconsistent`] if a consolidated list would edit sites
    /// differently from the list it replaces.
    pub fn compress(&mut self) -> Result<CompressStats> {
        let mut stats = CompressStats::default();
        let mut stack = vec![self.root()];
        while let Some(idx) = stack.pop() {
            while self.node(idx).children.len() == 1 {
                let child = self.node(idx).children[0];
                self.merge_nodes(idx, child)?;
                stats.merged += 1;
            }
            stack.extend(self.node(idx).children.iter().rev());
        }
        log::info!("Merged {} single-child nodes", stats.merged);

        stats.mutations_before = self.live_nodes().map(|n| n.nuc_mutation.len()).sum();
        self.consolidate_all()?;
        stats.mutations_after = self.live_nodes().map(|n| n.nuc_mutation.len()).sum();
        self.fix_levels();
        Ok(stats)
    }

    fn live_nodes(&self) -> impl Iterator<Item = &Node> {
        (0..self.capacity()).filter_map(|idx| self.get_node(idx))
    }

    /// Consolidates the nucleotide mutations of every node, in parallel
    pub fn consolidate_all(&mut self) -> Result<()> {
        let total = self.len() as u64;
        self.nodes_mut()
            .par_iter_mut()
            .filter_map(|slot| slot.as_mut())
            .progress_count(total)
            .try_for_each(consolidate_node)
    }
}

/// Replaces a node's nucleotide mutations with their consolidated form
pub fn consolidate_node(node: &mut Node) -> Result<()> {
    let consolidated = consolidate(&node.nuc_mutation);
    if !similar(&node.nuc_mutation, &consolidated) {
        log::error!("Consolidation changed the edits of {}", node.identifier);
        return Err(MatError::inconsistent(format!(
            "consolidated mutations of {} edit different sites",
            node.identifier
        )));
    }
    node.nuc_mutation = consolidated;
    Ok(())
}
