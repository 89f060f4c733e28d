//! Block catalog, alignment coordinates and their global ordinals.
//!
//! Every site of the pangenome alignment is addressed by a [`Coordinate`]:
//! the primary block, an optional secondary copy of that block, the position
//! of a consensus base inside the block, and an optional slot in the gap list
//! that precedes that base. `-1` stands for "none" in the last three fields.
//!
//! The same nested layout (blocks → copies → slots → gap slots) is used by
//! the replay buffer and by [`GlobalCoords`], so it is built once here by
//! [`BlockCatalog::layout`] and filled with whatever cell type a caller needs.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::error::{MatError, Result};
use crate::mutation::bit_encoding::{pack_consensus, unpack_consensus};

/// A single site in the alignment of all blocks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    /// Primary block id
    pub primary_block_id: i32,
    /// Secondary copy of the primary block, `-1` for the simple block
    pub secondary_block_id: i32,
    /// Consensus position in the block
    pub nuc_position: i32,
    /// Slot in the gap list before `nuc_position`, `-1` for the base itself
    pub nuc_gap_position: i32,
}

impl Coordinate {
    /// A new coordinate
    pub fn new(
        primary_block_id: i32,
        secondary_block_id: i32,
        nuc_position: i32,
        nuc_gap_position: i32,
    ) -> Self {
        Self {
            primary_block_id,
            secondary_block_id,
            nuc_position,
            nuc_gap_position,
        }
    }

    /// Whether this addresses a gap slot rather than a consensus base
    pub fn is_gap(&self) -> bool {
        self.nuc_gap_position != -1
    }

    /// The coordinate `offset` sites further along a run.
    ///
    /// Runs in a gap list advance the gap slot, runs on consensus bases
    /// advance the position.
    pub fn offset(&self, offset: i32) -> Self {
        let mut next = *self;
        if self.is_gap() {
            next.nuc_gap_position += offset;
        } else {
            next.nuc_position += offset;
        }
        next
    }

    /// Whether `other` is the site directly after `self` in a run
    pub fn is_followed_by(&self, other: &Self) -> bool {
        if self.primary_block_id != other.primary_block_id
            || self.secondary_block_id != other.secondary_block_id
        {
            return false;
        }
        if self.is_gap() {
            other.nuc_position == self.nuc_position
                && other.nuc_gap_position == self.nuc_gap_position + 1
        } else {
            !other.is_gap() && other.nuc_position == self.nuc_position + 1
        }
    }

    // -1 sorts after real ids: copies come before the simple block, and gap
    // slots come before the base they precede.
    fn sort_key(&self) -> (i32, i64, i32, i64) {
        let last = |v: i32| if v == -1 { i64::MAX } else { v as i64 };
        (
            self.primary_block_id,
            last(self.secondary_block_id),
            self.nuc_position,
            last(self.nuc_gap_position),
        )
    }
}

impl Ord for Coordinate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Coordinate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.primary_block_id,
            self.secondary_block_id,
            self.nuc_position,
            self.nuc_gap_position
        )
    }
}

/// A block of the pangenome with its packed consensus sequence
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Primary block id
    pub primary_block_id: i32,
    /// Secondary copy id, `-1` for the simple block
    pub secondary_block_id: i32,
    /// Consensus, eight 4-bit codes per word
    pub consensus_seq: Vec<u32>,
    /// Chromosome the block belongs to
    pub chromosome_name: String,
}

impl Block {
    /// Packs `seq` as the consensus of a new block
    pub fn new(
        primary_block_id: i32,
        secondary_block_id: i32,
        seq: &[u8],
        chromosome_name: &str,
    ) -> Self {
        Self {
            primary_block_id,
            secondary_block_id,
            consensus_seq: pack_consensus(seq),
            chromosome_name: chromosome_name.to_string(),
        }
    }

    /// Decoded consensus bases
    pub fn consensus(&self) -> Vec<u8> {
        unpack_consensus(&self.consensus_seq)
    }
}

/// Gap slots declared before consensus positions of one block
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapList {
    /// Primary block id
    pub primary_block_id: i32,
    /// Secondary copy id, `-1` for the simple block
    pub secondary_block_id: i32,
    /// Positions that have a gap list
    pub nuc_position: Vec<i32>,
    /// Number of slots at each of those positions
    pub nuc_gap_length: Vec<i32>,
}

/// Number of secondary copies of each primary block
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockGapList {
    /// Primary block ids
    pub block_position: Vec<i32>,
    /// Copies for each of those blocks
    pub block_gap_length: Vec<i32>,
}

/// Everything needed to lay out the alignment: blocks and both gap lists
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCatalog {
    /// All blocks
    pub blocks: Vec<Block>,
    /// Nucleotide gap lists
    pub gaps: Vec<GapList>,
    /// Block gap list
    pub block_gaps: BlockGapList,
}

/// A consensus position with the gap slots before it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot<T> {
    /// Cell for the consensus base (or block end marker)
    pub main: T,
    /// Cells for the gap slots, in order
    pub gaps: Vec<T>,
}

/// Slots of one primary block and of its secondary copies.
///
/// The last slot of each list is the end marker: it holds the trailing gap
/// list but no base of its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockLayout<T> {
    /// Simple block slots
    pub main: Vec<Slot<T>>,
    /// Slots of each secondary copy
    pub copies: Vec<Vec<Slot<T>>>,
}

impl<T> BlockLayout<T> {
    /// Slots of the simple block (`-1`) or of a secondary copy
    pub fn slots(&self, secondary_block_id: i32) -> Option<&Vec<Slot<T>>> {
        if secondary_block_id == -1 {
            Some(&self.main)
        } else {
            usize::try_from(secondary_block_id)
                .ok()
                .and_then(|s| self.copies.get(s))
        }
    }

    /// Mutable version of [`BlockLayout::slots`]
    pub fn slots_mut(&mut self, secondary_block_id: i32) -> Option<&mut Vec<Slot<T>>> {
        if secondary_block_id == -1 {
            Some(&mut self.main)
        } else {
            usize::try_from(secondary_block_id)
                .ok()
                .and_then(|s| self.copies.get_mut(s))
        }
    }
}

/// Cell at `coord`, or [`None`] if the catalog has no such site.
///
/// The base cell of a block end marker is not a site.
pub fn cell<'a, T>(layout: &'a [BlockLayout<T>], coord: &Coordinate) -> Option<&'a T> {
    let block = layout.get(usize::try_from(coord.primary_block_id).ok()?)?;
    let slots = block.slots(coord.secondary_block_id)?;
    let pos = usize::try_from(coord.nuc_position).ok()?;
    let slot = slots.get(pos)?;
    if coord.is_gap() {
        slot.gaps.get(usize::try_from(coord.nuc_gap_position).ok()?)
    } else if pos + 1 == slots.len() {
        None
    } else {
        Some(&slot.main)
    }
}

/// Mutable version of [`cell`]
pub fn cell_mut<'a, T>(layout: &'a mut [BlockLayout<T>], coord: &Coordinate) -> Option<&'a mut T> {
    let block = layout.get_mut(usize::try_from(coord.primary_block_id).ok()?)?;
    let slots = block.slots_mut(coord.secondary_block_id)?;
    let pos = usize::try_from(coord.nuc_position).ok()?;
    let n_slots = slots.len();
    let slot = slots.get_mut(pos)?;
    if coord.is_gap() {
        slot.gaps.get_mut(usize::try_from(coord.nuc_gap_position).ok()?)
    } else if pos + 1 == n_slots {
        None
    } else {
        Some(&mut slot.main)
    }
}

impl BlockCatalog {
    /// Number of primary blocks (ids are dense from zero)
    pub fn n_primary(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| b.primary_block_id as usize + 1)
            .max()
            .unwrap_or(0)
    }

    /// Builds the nested slot layout of the catalog.
    ///
    /// `base` fills consensus cells, `gap` fills gap slots and `end` fills
    /// the end marker of each block and copy.
    ///
    /// # Errors
    /// [`MatError::MalformedCatalog`] if a block, gap list or block gap list
    /// refers to a block, copy or position that does not exist.
    pub fn layout<T, F>(&self, base: F, gap: T, end: T) -> Result<Vec<BlockLayout<T>>>
    where
        T: Clone,
        F: Fn(u8) -> T,
    {
        if let Some(b) = self.blocks.iter().find(|b| b.primary_block_id < 0) {
            return Err(MatError::catalog(format!(
                "negative primary block id {}",
                b.primary_block_id
            )));
        }
        let end_slot = Slot {
            main: end,
            gaps: Vec::new(),
        };
        let mut layout: Vec<BlockLayout<T>> = (0..self.n_primary())
            .map(|_| BlockLayout {
                main: vec![end_slot.clone()],
                copies: Vec::new(),
            })
            .collect();

        if self.block_gaps.block_position.len() != self.block_gaps.block_gap_length.len() {
            return Err(MatError::catalog("block gap list columns differ in length"));
        }
        for (&block, &n_copies) in self
            .block_gaps
            .block_position
            .iter()
            .zip(&self.block_gaps.block_gap_length)
        {
            let entry = usize::try_from(block)
                .ok()
                .and_then(|b| layout.get_mut(b))
                .ok_or_else(|| {
                    MatError::catalog(format!("block gap list refers to missing block {block}"))
                })?;
            entry.copies = vec![vec![end_slot.clone()]; n_copies.max(0) as usize];
        }

        let mut seen = HashSet::with_capacity(self.blocks.len());
        for block in &self.blocks {
            if !seen.insert((block.primary_block_id, block.secondary_block_id)) {
                return Err(MatError::catalog(format!(
                    "block {}:{} is listed twice",
                    block.primary_block_id, block.secondary_block_id
                )));
            }
            let mut slots: Vec<Slot<T>> = block
                .consensus()
                .into_iter()
                .map(|nuc| Slot {
                    main: base(nuc),
                    gaps: Vec::new(),
                })
                .collect();
            slots.push(end_slot.clone());
            let target = layout[block.primary_block_id as usize]
                .slots_mut(block.secondary_block_id)
                .ok_or_else(|| {
                    MatError::catalog(format!(
                        "block {}:{} has no entry in the block gap list",
                        block.primary_block_id, block.secondary_block_id
                    ))
                })?;
            *target = slots;
        }

        for gap_list in &self.gaps {
            if gap_list.nuc_position.len() != gap_list.nuc_gap_length.len() {
                return Err(MatError::catalog(format!(
                    "gap list of block {}:{} has columns of different length",
                    gap_list.primary_block_id, gap_list.secondary_block_id
                )));
            }
            let slots = usize::try_from(gap_list.primary_block_id)
                .ok()
                .and_then(|p| layout.get_mut(p))
                .and_then(|b| b.slots_mut(gap_list.secondary_block_id))
                .ok_or_else(|| {
                    MatError::catalog(format!(
                        "gap list refers to missing block {}:{}",
                        gap_list.primary_block_id, gap_list.secondary_block_id
                    ))
                })?;
            for (&pos, &len) in gap_list.nuc_position.iter().zip(&gap_list.nuc_gap_length) {
                let slot = usize::try_from(pos)
                    .ok()
                    .and_then(|p| slots.get_mut(p))
                    .ok_or_else(|| {
                        MatError::catalog(format!(
                            "gap list of block {}:{} refers to missing position {pos}",
                            gap_list.primary_block_id, gap_list.secondary_block_id
                        ))
                    })?;
                slot.gaps = vec![gap.clone(); len.max(0) as usize];
            }
        }
        Ok(layout)
    }
}

/// Dense ordinal of every site, equal to its column in the aligned sequence.
///
/// Built once per catalog; lookups are constant time.
#[derive(Clone, Debug)]
pub struct GlobalCoords {
    layout: Vec<BlockLayout<usize>>,
    spans: Vec<(Range<usize>, Vec<Range<usize>>)>,
    len: usize,
}

impl GlobalCoords {
    /// Assigns ordinals to all sites of `catalog`
    pub fn new(catalog: &BlockCatalog) -> Result<Self> {
        let mut layout = catalog.layout(|_| 0, 0, 0)?;
        let mut ctr = 0;
        let mut spans = Vec::with_capacity(layout.len());
        for block in layout.iter_mut() {
            let mut copy_spans = Vec::with_capacity(block.copies.len());
            for copy in block.copies.iter_mut() {
                let start = ctr;
                number_slots(copy, &mut ctr);
                copy_spans.push(start..ctr);
            }
            let start = ctr;
            number_slots(&mut block.main, &mut ctr);
            spans.push((start..ctr, copy_spans));
        }
        Ok(Self {
            layout,
            spans,
            len: ctr,
        })
    }

    /// Ordinal of a site.
    ///
    /// # Errors
    /// [`MatError::MalformedCatalog`] if the catalog has no such site.
    pub fn coordinate_of(&self, coord: &Coordinate) -> Result<usize> {
        cell(&self.layout, coord)
            .copied()
            .ok_or_else(|| MatError::catalog(format!("no site {coord} in the block catalog")))
    }

    /// Ordinals covered by a block or one of its copies
    pub fn block_span(&self, primary_block_id: i32, secondary_block_id: i32) -> Option<Range<usize>> {
        let (main, copies) = self.spans.get(usize::try_from(primary_block_id).ok()?)?;
        if secondary_block_id == -1 {
            Some(main.clone())
        } else {
            copies
                .get(usize::try_from(secondary_block_id).ok()?)
                .cloned()
        }
    }

    /// Total number of sites (the aligned sequence length)
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the catalog has no sites
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn number_slots(slots: &mut [Slot<usize>], ctr: &mut usize) {
    let n_slots = slots.len();
    for (idx, slot) in slots.iter_mut().enumerate() {
        for gap in slot.gaps.iter_mut() {
            *gap = *ctr;
            *ctr += 1;
        }
        slot.main = *ctr;
        if idx + 1 < n_slots {
            *ctr += 1;
        }
    }
}
