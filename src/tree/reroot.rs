//! Moving the root of a tree onto one of its nodes.
//!
//! Every edge on the path from the old root to the new one changes
//! direction. The reversed edge carries the edits that take the old child's
//! sequence back to the old parent's, worked out by replaying the path
//! through one buffer. The new root carries its whole sequence as edits
//! from the empty buffer: an insertion for each block it has, and the sites
//! the path changed.

use std::collections::{BTreeMap, BTreeSet};

use crate::coordinates::Coordinate;
use crate::error::Result;
use crate::mutation::bit_encoding::{nuc_to_code, GAP, GAP_CODE};
use crate::mutation::consolidate::{from_sites, SiteEdit};
use crate::mutation::{BlockEffect, BlockMut, EditKind, NucMut};
use crate::replay::buffer::{Presence, SequenceBuffer};
use crate::tree::{Node, Tree};

// Edit writing `to` over `from` at a site
fn site_edit(from: u8, to: u8) -> Option<SiteEdit> {
    if from == to {
        None
    } else if to == GAP {
        Some((EditKind::Deletion, GAP_CODE))
    } else if from == GAP {
        Some((EditKind::Insertion, nuc_to_code(to)))
    } else {
        Some((EditKind::Substitution, nuc_to_code(to)))
    }
}

// Block effect taking a block from one state to another. The orientation of
// an absent block is never seen, so it is not restored.
fn block_edit(from: Presence, to: Presence) -> Option<BlockEffect> {
    match (from.exists, to.exists) {
        (false, false) => None,
        (true, false) => Some(BlockEffect::Delete),
        (false, true) => Some(BlockEffect::Insert {
            inverted: to.inverted,
        }),
        (true, true) if from.inverted != to.inverted => Some(BlockEffect::Invert),
        (true, true) => None,
    }
}

// Applies `node` to `buffer`, which holds its parent's sequence, and
// returns the edits leading back to the parent
fn reverse_edge(node: &Node, buffer: &mut SequenceBuffer) -> Result<(Vec<BlockMut>, Vec<NucMut>)> {
    let mut blocks: BTreeMap<(i32, i32), Presence> = BTreeMap::new();
    for m in &node.block_mutation {
        let key = (m.primary_block_id, m.secondary_block_id);
        if let Some(presence) = buffer.presence(key.0, key.1) {
            blocks.entry(key).or_insert(presence);
        }
    }
    let mut cells: BTreeMap<Coordinate, u8> = BTreeMap::new();
    for m in &node.nuc_mutation {
        for idx in 0..m.len() {
            let coord = m.coordinate(idx);
            if let Some(old) = buffer.get(&coord) {
                cells.entry(coord).or_insert(old);
            }
        }
    }

    buffer.apply(node)?;

    let block_mutation = blocks
        .into_iter()
        .filter_map(|((p, s), old)| {
            let now = buffer.presence(p, s).unwrap_or_default();
            block_edit(now, old).map(|effect| BlockMut::from_effect(p, s, effect))
        })
        .collect();
    let sites: BTreeMap<Coordinate, SiteEdit> = cells
        .into_iter()
        .filter_map(|(coord, old)| {
            let now = buffer.get(&coord)?;
            site_edit(now, old).map(|edit| (coord, edit))
        })
        .collect();
    Ok((block_mutation, from_sites(&sites)))
}

impl Tree {
    /// Makes the named node the root, keeping every node's sequence.
    ///
    /// Edges on the old root path point the other way and keep their branch
    /// lengths; the new root gets a branch length of zero. The old root
    /// stays in the tree even if it is left with a single child.
    ///
    /// # Errors
    /// - [`crate::error::MatError::MissingNode`] for an unknown identifier.
    /// - [`crate::error::MatError::OutOfRange`] if a mutation on the path is
    ///   outside the block catalog. The tree is unchanged in both cases.
    pub fn reroot(&mut self, identifier: &str) -> Result<()> {
        let target = self.find(identifier)?;
        if target == self.root() {
            log::info!("{identifier} is already the root");
            return Ok(());
        }
        let path = self.path_from_root(target);
        log::info!("Rerooting on {identifier}, {} edges reversed", path.len() - 1);

        let empty = SequenceBuffer::new(self.catalog())?;
        let mut buffer = empty.clone();
        let mut touched: BTreeSet<Coordinate> = BTreeSet::new();
        let mut reversed = Vec::with_capacity(path.len() - 1);
        for (step, idx) in path.iter().enumerate() {
            let node = self.node(*idx);
            for m in &node.nuc_mutation {
                touched.extend((0..m.len()).map(|i| m.coordinate(i)));
            }
            if step == 0 {
                buffer.apply(node)?;
            } else {
                reversed.push(reverse_edge(node, &mut buffer)?);
            }
        }

        let root_blocks: Vec<BlockMut> = self
            .catalog()
            .blocks
            .iter()
            .filter_map(|b| {
                let (p, s) = (b.primary_block_id, b.secondary_block_id);
                let now = buffer.presence(p, s)?;
                block_edit(Presence::default(), now)
                    .map(|effect| BlockMut::from_effect(p, s, effect))
            })
            .collect();
        let root_sites: BTreeMap<Coordinate, SiteEdit> = touched
            .into_iter()
            .filter_map(|coord| {
                let edit = site_edit(empty.get(&coord)?, buffer.get(&coord)?)?;
                Some((coord, edit))
            })
            .collect();

        let lengths: Vec<f32> = path.iter().map(|idx| self.node(*idx).branch_length).collect();
        for (step, (block_mutation, nuc_mutation)) in reversed.into_iter().enumerate() {
            let (upper, lower) = (path[step], path[step + 1]);
            let node = self.node_mut(upper);
            node.parent = Some(lower);
            node.branch_length = lengths[step + 1];
            node.block_mutation = block_mutation;
            node.nuc_mutation = nuc_mutation;
            node.children.retain(|c| *c != lower);
            self.node_mut(lower).children.push(upper);
        }

        let node = self.node_mut(target);
        node.branch_length = 0.0;
        node.block_mutation = root_blocks;
        node.nuc_mutation = from_sites(&root_sites);
        self.set_root(target);
        self.fix_levels();
        Ok(())
    }
}
