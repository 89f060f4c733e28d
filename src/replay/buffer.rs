//! The mutable sequence a traversal replays mutations into.
//!
//! One cell per alignment site plus an end marker per block, and a
//! presence/orientation flag per block and copy. Blocks start absent; root
//! block insertions switch them on.

use std::ops::{Deref, DerefMut, Range};

use crate::coordinates::{cell, cell_mut, BlockCatalog, BlockLayout, Coordinate, Slot};
use crate::error::{MatError, Result};
use crate::mutation::bit_encoding::{complement, END_MARKER, GAP};
use crate::mutation::{BlockEffect, BlockMut, NucMut};
use crate::tree::Node;

/// Presence and orientation of a block
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Presence {
    /// Block is part of the sequence
    pub exists: bool,
    /// Block is reverse complemented
    pub inverted: bool,
}

#[derive(Clone, Debug)]
struct BlockState {
    main: Presence,
    copies: Vec<Presence>,
}

#[derive(Clone, Copy, Debug)]
struct NucEdit {
    position: Coordinate,
    old: u8,
}

#[derive(Clone, Copy, Debug)]
struct BlockEdit {
    primary_block_id: i32,
    secondary_block_id: i32,
    old: Presence,
}

/// Everything needed to reverse one [`SequenceBuffer::apply`]
#[derive(Debug, Default)]
pub struct UndoLog {
    blocks: Vec<BlockEdit>,
    nucs: Vec<NucEdit>,
}

impl UndoLog {
    /// Number of block and site edits recorded
    pub fn len(&self) -> usize {
        self.blocks.len() + self.nucs.len()
    }

    /// Whether nothing was changed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Aligned columns of one block or copy
#[derive(Clone, Debug)]
struct BlockSpan {
    columns: Range<usize>,
    primary: usize,
    copy: Option<usize>,
}

/// Sequence of the current node during a traversal
#[derive(Clone, Debug)]
pub struct SequenceBuffer {
    layout: Vec<BlockLayout<u8>>,
    state: Vec<BlockState>,
    spans: Vec<BlockSpan>,
}

impl SequenceBuffer {
    /// Consensus bases in every cell, empty gap slots, every block absent
    pub fn new(catalog: &BlockCatalog) -> Result<Self> {
        let layout = catalog.layout(|nuc| nuc, GAP, END_MARKER)?;
        let state = layout
            .iter()
            .map(|b| BlockState {
                main: Presence::default(),
                copies: vec![Presence::default(); b.copies.len()],
            })
            .collect();
        let mut spans = Vec::new();
        let mut ctr = 0;
        for (primary, block) in layout.iter().enumerate() {
            for (copy, slots) in block.copies.iter().enumerate() {
                let n = n_columns(slots);
                spans.push(BlockSpan {
                    columns: ctr..ctr + n,
                    primary,
                    copy: Some(copy),
                });
                ctr += n;
            }
            let n = n_columns(&block.main);
            spans.push(BlockSpan {
                columns: ctr..ctr + n,
                primary,
                copy: None,
            });
            ctr += n;
        }
        Ok(Self {
            layout,
            state,
            spans,
        })
    }

    /// Character at a site
    pub fn get(&self, coord: &Coordinate) -> Option<u8> {
        cell(&self.layout, coord).copied()
    }

    /// Presence of a block or copy
    pub fn presence(&self, primary_block_id: i32, secondary_block_id: i32) -> Option<Presence> {
        let block = self.state.get(usize::try_from(primary_block_id).ok()?)?;
        if secondary_block_id == -1 {
            Some(block.main)
        } else {
            block
                .copies
                .get(usize::try_from(secondary_block_id).ok()?)
                .copied()
        }
    }

    fn presence_mut(&mut self, primary_block_id: i32, secondary_block_id: i32) -> Option<&mut Presence> {
        let block = self.state.get_mut(usize::try_from(primary_block_id).ok()?)?;
        if secondary_block_id == -1 {
            Some(&mut block.main)
        } else {
            block
                .copies
                .get_mut(usize::try_from(secondary_block_id).ok()?)
        }
    }

    /// Whether a block or copy is currently present
    pub fn block_exists(&self, primary_block_id: i32, secondary_block_id: i32) -> bool {
        self.presence(primary_block_id, secondary_block_id)
            .is_some_and(|p| p.exists)
    }

    /// Applies a node's block then nucleotide mutations.
    ///
    /// # Errors
    /// [`MatError::OutOfRange`] naming the node and the mutation if a
    /// mutation points outside the catalog. The buffer is left as it was.
    pub fn apply(&mut self, node: &Node) -> Result<UndoLog> {
        let mut log = UndoLog::default();
        for block_mut in &node.block_mutation {
            if let Err(e) = self.apply_block(node, block_mut, &mut log) {
                self.undo(log);
                return Err(e);
            }
        }
        for nuc_mut in &node.nuc_mutation {
            if let Err(e) = self.apply_nuc(node, nuc_mut, &mut log) {
                self.undo(log);
                return Err(e);
            }
        }
        Ok(log)
    }

    fn apply_block(&mut self, node: &Node, m: &BlockMut, log: &mut UndoLog) -> Result<()> {
        let presence = self
            .presence_mut(m.primary_block_id, m.secondary_block_id)
            .ok_or_else(|| MatError::OutOfRange {
                node: node.identifier.clone(),
                mutation: format!("{m:?}"),
            })?;
        log.blocks.push(BlockEdit {
            primary_block_id: m.primary_block_id,
            secondary_block_id: m.secondary_block_id,
            old: *presence,
        });
        *presence = match m.effect() {
            BlockEffect::Insert { inverted } => Presence {
                exists: true,
                inverted,
            },
            BlockEffect::Delete => Presence::default(),
            BlockEffect::Invert => Presence {
                exists: presence.exists,
                inverted: !presence.inverted,
            },
        };
        Ok(())
    }

    fn apply_nuc(&mut self, node: &Node, m: &NucMut, log: &mut UndoLog) -> Result<()> {
        for idx in 0..m.len() {
            let position = m.coordinate(idx);
            let site = cell_mut(&mut self.layout, &position).ok_or_else(|| MatError::OutOfRange {
                node: node.identifier.clone(),
                mutation: m.to_string(),
            })?;
            log.nucs.push(NucEdit {
                position,
                old: *site,
            });
            *site = m.nuc(idx);
        }
        Ok(())
    }

    /// Reverses an [`UndoLog`]: site edits last to first, then block edits
    /// last to first
    pub fn undo(&mut self, log: UndoLog) {
        for edit in log.nucs.into_iter().rev() {
            if let Some(site) = cell_mut(&mut self.layout, &edit.position) {
                *site = edit.old;
            }
        }
        for edit in log.blocks.into_iter().rev() {
            if let Some(presence) = self.presence_mut(edit.primary_block_id, edit.secondary_block_id) {
                *presence = edit.old;
            }
        }
    }

    /// Applies a node's mutations until the returned guard is dropped
    pub fn enter(&mut self, node: &Node) -> Result<ReplayGuard<'_>> {
        let log = self.apply(node)?;
        Ok(ReplayGuard {
            buffer: self,
            log: Some(log),
        })
    }

    /// Number of columns of the aligned sequence
    pub fn aligned_len(&self) -> usize {
        self.spans.last().map_or(0, |span| span.columns.end)
    }

    fn span_state(&self, span: &BlockSpan) -> (&[Slot<u8>], Presence) {
        let block = &self.layout[span.primary];
        let state = &self.state[span.primary];
        match span.copy {
            Some(copy) => (&block.copies[copy], state.copies[copy]),
            None => (&block.main, state.main),
        }
    }

    fn span_columns(&self, span: &BlockSpan) -> Vec<u8> {
        let (slots, presence) = self.span_state(span);
        let mut columns = Vec::with_capacity(span.columns.len());
        push_block(&mut columns, slots, presence, true);
        columns
    }

    /// Columns `range` of the aligned sequence, building only the blocks
    /// that overlap it
    pub fn aligned_range(&self, range: Range<usize>) -> Vec<u8> {
        let range = range.start.min(range.end)..range.end.min(self.aligned_len());
        let first = self.spans.partition_point(|span| span.columns.end <= range.start);
        let mut seq = Vec::with_capacity(range.len());
        for span in &self.spans[first..] {
            if span.columns.start >= range.end {
                break;
            }
            let columns = self.span_columns(span);
            let lo = range.start.max(span.columns.start) - span.columns.start;
            let hi = range.end.min(span.columns.end) - span.columns.start;
            seq.extend_from_slice(&columns[lo..hi]);
        }
        seq
    }

    /// Extends `range` to take in `k` bases (non-gap columns) on each side,
    /// stopping at the ends of the alignment. Absent blocks are skipped
    /// whole.
    pub fn widen(&self, range: Range<usize>, k: usize) -> Range<usize> {
        let len = self.aligned_len();
        let mut start = range.start.min(len);
        let mut bases = 0;
        let before = self.spans.partition_point(|span| span.columns.start < start);
        for span in self.spans[..before].iter().rev() {
            if bases == k {
                break;
            }
            if !self.span_state(span).1.exists {
                start = span.columns.start;
                continue;
            }
            let columns = self.span_columns(span);
            while start > span.columns.start && bases < k {
                start -= 1;
                if columns[start - span.columns.start] != GAP {
                    bases += 1;
                }
            }
        }

        let mut end = range.end.min(len).max(start);
        bases = 0;
        let after = self.spans.partition_point(|span| span.columns.end <= end);
        for span in &self.spans[after..] {
            if bases == k {
                break;
            }
            if !self.span_state(span).1.exists {
                end = span.columns.end;
                continue;
            }
            let columns = self.span_columns(span);
            while end < span.columns.end && bases < k {
                if columns[end - span.columns.start] != GAP {
                    bases += 1;
                }
                end += 1;
            }
        }
        start..end
    }

    /// Current sequence.
    ///
    /// Aligned output has one column per site, `-` for empty sites and for
    /// every site of an absent block. Otherwise only bases are written.
    pub fn sequence(&self, aligned: bool) -> Vec<u8> {
        let mut seq = Vec::with_capacity(self.aligned_len());
        for (block, state) in self.layout.iter().zip(&self.state) {
            for (copy, presence) in block.copies.iter().zip(&state.copies) {
                push_block(&mut seq, copy, *presence, aligned);
            }
            push_block(&mut seq, &block.main, state.main, aligned);
        }
        seq
    }
}

fn n_columns(slots: &[Slot<u8>]) -> usize {
    slots.iter().map(|s| s.gaps.len()).sum::<usize>() + slots.len().saturating_sub(1)
}

fn push_block(seq: &mut Vec<u8>, slots: &[Slot<u8>], presence: Presence, aligned: bool) {
    if !presence.exists {
        if aligned {
            seq.extend(std::iter::repeat(GAP).take(n_columns(slots)));
        }
        return;
    }
    let n_slots = slots.len();
    let mut columns = Vec::with_capacity(n_columns(slots));
    for (idx, slot) in slots.iter().enumerate() {
        columns.extend_from_slice(&slot.gaps);
        if idx + 1 < n_slots {
            columns.push(slot.main);
        }
    }
    if presence.inverted {
        columns.reverse();
        columns.iter_mut().for_each(|c| *c = complement(*c));
    }
    seq.extend(columns.into_iter().filter(|c| aligned || *c != GAP));
}

/// Scoped application of one node's mutations.
///
/// Derefs to the buffer; dropping it undoes the node's mutations, on error
/// paths too.
pub struct ReplayGuard<'a> {
    buffer: &'a mut SequenceBuffer,
    log: Option<UndoLog>,
}

impl Deref for ReplayGuard<'_> {
    type Target = SequenceBuffer;

    fn deref(&self) -> &Self::Target {
        self.buffer
    }
}

impl DerefMut for ReplayGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        if let Some(log) = self.log.take() {
            self.buffer.undo(log);
        }
    }
}
