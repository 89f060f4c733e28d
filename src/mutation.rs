//! Nucleotide and block mutations carried on tree edges.
//!
//! A [`NucMut`] edits one site, or a run of up to six consecutive sites, of
//! the parent's sequence. Its kind is a [`NucMutType`]: substitution,
//! insertion or deletion, each either as a run or as a single-base ("SNP")
//! variant. On disk the kind and run length are packed in one `mut_info`
//! word and the bases in a `nucs` word (see [`bit_encoding`]); in memory they
//! are decoded once into the tagged enum.
//!
//! A [`BlockMut`] switches a whole block (or secondary copy) on or off, or
//! flips its orientation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod bit_encoding;
use crate::mutation::bit_encoding::{
    code_to_nuc, pack_nucs, unpack_nuc, GAP, GAP_CODE, MAX_RUN,
};

pub mod consolidate;

use crate::coordinates::Coordinate;

/// What a mutation does to a site, ignoring run/single encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EditKind {
    /// Base replaced by another base
    Substitution,
    /// Base written into an empty site
    Insertion,
    /// Base removed
    Deletion,
}

/// Kind of a nucleotide mutation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NucMutType {
    /// Substitution run
    Substitution,
    /// Insertion run
    Insertion,
    /// Deletion run
    Deletion,
    /// Single-base substitution
    SnpSubstitution,
    /// Single-base insertion
    SnpInsertion,
    /// Single-base deletion
    SnpDeletion,
}

impl NucMutType {
    /// Decodes the low three bits of a `mut_info` word
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits & 0x7 {
            0 => Some(Self::Substitution),
            1 => Some(Self::Insertion),
            2 => Some(Self::Deletion),
            3 => Some(Self::SnpSubstitution),
            4 => Some(Self::SnpInsertion),
            5 => Some(Self::SnpDeletion),
            _ => None,
        }
    }

    /// Low three bits of a `mut_info` word
    pub fn bits(self) -> u32 {
        match self {
            Self::Substitution => 0,
            Self::Insertion => 1,
            Self::Deletion => 2,
            Self::SnpSubstitution => 3,
            Self::SnpInsertion => 4,
            Self::SnpDeletion => 5,
        }
    }

    /// Single-base variant
    pub fn is_snp(self) -> bool {
        matches!(
            self,
            Self::SnpSubstitution | Self::SnpInsertion | Self::SnpDeletion
        )
    }

    /// Edit applied to each site
    pub fn edit(self) -> EditKind {
        match self {
            Self::Substitution | Self::SnpSubstitution => EditKind::Substitution,
            Self::Insertion | Self::SnpInsertion => EditKind::Insertion,
            Self::Deletion | Self::SnpDeletion => EditKind::Deletion,
        }
    }

    /// Run type for an edit
    pub fn run(edit: EditKind) -> Self {
        match edit {
            EditKind::Substitution => Self::Substitution,
            EditKind::Insertion => Self::Insertion,
            EditKind::Deletion => Self::Deletion,
        }
    }

    /// Single-base type for an edit
    pub fn snp(edit: EditKind) -> Self {
        match edit {
            EditKind::Substitution => Self::SnpSubstitution,
            EditKind::Insertion => Self::SnpInsertion,
            EditKind::Deletion => Self::SnpDeletion,
        }
    }

    /// Substitution, run or single
    pub fn is_substitution(self) -> bool {
        self.edit() == EditKind::Substitution
    }

    /// Insertion, run or single
    pub fn is_insertion(self) -> bool {
        self.edit() == EditKind::Insertion
    }

    /// Deletion, run or single
    pub fn is_deletion(self) -> bool {
        self.edit() == EditKind::Deletion
    }
}

/// Packed form of a [`NucMut`], as stored in tree files
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PackedNucMut {
    primary_block_id: i32,
    secondary_block_id: i32,
    nuc_position: i32,
    nuc_gap_position: i32,
    mut_info: u32,
    nucs: u32,
}

/// A nucleotide mutation: a run of up to six edits starting at `position`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "PackedNucMut", try_from = "PackedNucMut")]
pub struct NucMut {
    /// First site edited
    pub position: Coordinate,
    mut_type: NucMutType,
    length: u8,
    nucs: u32,
}

impl NucMut {
    /// A mutation writing `codes` from `position` onwards.
    ///
    /// Deletions carry [`GAP_CODE`] for every site. Single-base types take
    /// exactly one code.
    ///
    /// # Panics
    /// If `codes` is empty, longer than six, or longer than one for a
    /// single-base type.
    pub fn new(position: Coordinate, mut_type: NucMutType, codes: &[u8]) -> Self {
        assert!(
            !codes.is_empty() && codes.len() <= MAX_RUN,
            "mutation runs carry 1 to {MAX_RUN} bases"
        );
        assert!(
            !mut_type.is_snp() || codes.len() == 1,
            "single-base mutation with {} bases",
            codes.len()
        );
        Self {
            position,
            mut_type,
            length: codes.len() as u8,
            nucs: pack_nucs(codes),
        }
    }

    /// Single-base substitution
    pub fn substitution(position: Coordinate, code: u8) -> Self {
        Self::new(position, NucMutType::SnpSubstitution, &[code])
    }

    /// Single-base insertion
    pub fn insertion(position: Coordinate, code: u8) -> Self {
        Self::new(position, NucMutType::SnpInsertion, &[code])
    }

    /// Single-base deletion
    pub fn deletion(position: Coordinate) -> Self {
        Self::new(position, NucMutType::SnpDeletion, &[GAP_CODE])
    }

    /// Deletion run of `length` sites
    pub fn deletion_run(position: Coordinate, length: usize) -> Self {
        Self::new(position, NucMutType::Deletion, &vec![GAP_CODE; length])
    }

    /// Decodes the packed `mut_info`/`nucs` words.
    ///
    /// Single-base types always have length one, their base in the first
    /// code slot.
    pub fn from_packed(position: Coordinate, mut_info: u32, nucs: u32) -> Result<Self, String> {
        let mut_type = NucMutType::from_bits(mut_info)
            .ok_or_else(|| format!("unknown mutation type {}", mut_info & 0x7))?;
        let length = if mut_type.is_snp() {
            1
        } else {
            (mut_info >> 4) as usize
        };
        if length == 0 || length > MAX_RUN {
            return Err(format!("mutation run length {length} out of range"));
        }
        Ok(Self {
            position,
            mut_type,
            length: length as u8,
            nucs,
        })
    }

    /// Packed `mut_info` word: type in the low three bits, length from bit 4
    pub fn mut_info(&self) -> u32 {
        self.mut_type.bits() | ((self.length as u32) << 4)
    }

    /// Packed bases
    pub fn nucs(&self) -> u32 {
        self.nucs
    }

    /// Kind of mutation
    pub fn mut_type(&self) -> NucMutType {
        self.mut_type
    }

    /// Number of sites edited
    pub fn len(&self) -> usize {
        self.length as usize
    }

    /// Always false: runs have at least one site
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Code written at offset `idx` of the run
    pub fn nuc_code(&self, idx: usize) -> u8 {
        unpack_nuc(self.nucs, idx)
    }

    /// Character written at offset `idx` (`-` for deletions)
    pub fn nuc(&self, idx: usize) -> u8 {
        if self.mut_type.is_deletion() {
            GAP
        } else {
            code_to_nuc(self.nuc_code(idx))
        }
    }

    /// Site edited at offset `idx` of the run
    pub fn coordinate(&self, idx: usize) -> Coordinate {
        self.position.offset(idx as i32)
    }

    /// Site/code pairs of the run, in order
    pub fn sites(&self) -> impl Iterator<Item = (Coordinate, u8)> + '_ {
        (0..self.len()).map(move |idx| (self.coordinate(idx), self.nuc_code(idx)))
    }
}

impl From<NucMut> for PackedNucMut {
    fn from(m: NucMut) -> Self {
        Self {
            primary_block_id: m.position.primary_block_id,
            secondary_block_id: m.position.secondary_block_id,
            nuc_position: m.position.nuc_position,
            nuc_gap_position: m.position.nuc_gap_position,
            mut_info: m.mut_info(),
            nucs: m.nucs,
        }
    }
}

impl TryFrom<PackedNucMut> for NucMut {
    type Error = String;

    fn try_from(p: PackedNucMut) -> Result<Self, Self::Error> {
        Self::from_packed(
            Coordinate::new(
                p.primary_block_id,
                p.secondary_block_id,
                p.nuc_position,
                p.nuc_gap_position,
            ),
            p.mut_info,
            p.nucs,
        )
    }
}

impl fmt::Display for NucMut {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bases: String = (0..self.len()).map(|idx| self.nuc(idx) as char).collect();
        write!(f, "{:?}@{}[{}]", self.mut_type, self.position, bases)
    }
}

/// Kind of block mutation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockMutType {
    /// Block becomes present
    Insertion,
    /// Block becomes absent, or flips orientation if `inversion` is set
    Deletion,
}

/// Change to a block's presence or orientation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockMut {
    /// Primary block id
    pub primary_block_id: i32,
    /// Secondary copy, `-1` for the simple block
    pub secondary_block_id: i32,
    /// Insertion or deletion
    pub mut_type: BlockMutType,
    /// Orientation flag
    pub inversion: bool,
}

/// Decoded effect of a [`BlockMut`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockEffect {
    /// Present, in the given orientation
    Insert {
        /// Reverse complemented
        inverted: bool,
    },
    /// Absent
    Delete,
    /// Orientation flips, presence unchanged
    Invert,
}

impl BlockMut {
    /// Mutation with the given effect on a block
    pub fn from_effect(primary_block_id: i32, secondary_block_id: i32, effect: BlockEffect) -> Self {
        let (mut_type, inversion) = match effect {
            BlockEffect::Insert { inverted } => (BlockMutType::Insertion, inverted),
            BlockEffect::Delete => (BlockMutType::Deletion, false),
            BlockEffect::Invert => (BlockMutType::Deletion, true),
        };
        Self {
            primary_block_id,
            secondary_block_id,
            mut_type,
            inversion,
        }
    }

    /// Forward insertion of a block
    pub fn insertion(primary_block_id: i32, secondary_block_id: i32) -> Self {
        Self::from_effect(
            primary_block_id,
            secondary_block_id,
            BlockEffect::Insert { inverted: false },
        )
    }

    /// Deletion of a block
    pub fn deletion(primary_block_id: i32, secondary_block_id: i32) -> Self {
        Self::from_effect(primary_block_id, secondary_block_id, BlockEffect::Delete)
    }

    /// Orientation flip of a block
    pub fn inversion(primary_block_id: i32, secondary_block_id: i32) -> Self {
        Self::from_effect(primary_block_id, secondary_block_id, BlockEffect::Invert)
    }

    /// What the mutation does
    pub fn effect(&self) -> BlockEffect {
        match (self.mut_type, self.inversion) {
            (BlockMutType::Insertion, inverted) => BlockEffect::Insert { inverted },
            (BlockMutType::Deletion, false) => BlockEffect::Delete,
            (BlockMutType::Deletion, true) => BlockEffect::Invert,
        }
    }
}

// Net effect of `next` applied after `prev` on the same block. An insertion
// followed by a deletion, or two inversions, cancel out.
fn compose_block_effects(prev: Option<BlockEffect>, next: BlockEffect) -> Option<BlockEffect> {
    match (prev, next) {
        (None, e) => Some(e),
        (Some(BlockEffect::Insert { .. }), BlockEffect::Delete) => None,
        (Some(_), BlockEffect::Delete) => Some(BlockEffect::Delete),
        (Some(_), BlockEffect::Insert { inverted }) => Some(BlockEffect::Insert { inverted }),
        (Some(BlockEffect::Insert { inverted }), BlockEffect::Invert) => {
            Some(BlockEffect::Insert {
                inverted: !inverted,
            })
        }
        (Some(BlockEffect::Invert), BlockEffect::Invert) => None,
        (Some(BlockEffect::Delete), BlockEffect::Invert) => Some(BlockEffect::Delete),
    }
}

/// Block mutations of a parent edge followed by a child edge, as one list
/// sorted by block
pub fn combine_block_mutations(parent: &[BlockMut], child: &[BlockMut]) -> Vec<BlockMut> {
    let mut net: BTreeMap<(i32, i32), Option<BlockEffect>> = BTreeMap::new();
    for m in parent.iter().chain(child) {
        let entry = net
            .entry((m.primary_block_id, m.secondary_block_id))
            .or_insert(None);
        *entry = compose_block_effects(*entry, m.effect());
    }
    net.into_iter()
        .filter_map(|((p, s), effect)| effect.map(|e| BlockMut::from_effect(p, s, e)))
        .collect()
}
