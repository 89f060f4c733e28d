//! 4-bit nucleotide codes and the packed words built from them.
//!
//! Each base is a one-hot bit for A, C, G and T; ambiguity codes are the
//! union of the bases they stand for, so `N` is `0b1111`. Zero is reserved:
//! it ends a packed consensus and stands for a gap/deletion elsewhere.

/// Gap character used in aligned output and in the replay buffer
pub const GAP: u8 = b'-';
/// Cell value of a block end marker in the replay buffer
pub const END_MARKER: u8 = b'x';
/// Code for N
pub const N_CODE: u8 = 15;
/// Code for a gap (no base)
pub const GAP_CODE: u8 = 0;
/// Most bases a single run mutation can carry
pub const MAX_RUN: usize = 6;

// Indexed by code
const CODE_NUC: [u8; 16] = [
    GAP, b'A', b'C', b'M', b'G', b'R', b'S', b'V', b'T', b'W', b'Y', b'H', b'K', b'D', b'B', b'N',
];

// A        Adenine
// C        Cytosine
// G        Guanine
// T (or U) Thymine (or Uracil)
// R        A or G
// Y        C or T
// S        G or C
// W        A or T
// K        G or T
// M        A or C
// B        C or G or T
// D        A or G or T
// H        A or C or T
// V        A or C or G
// N        any base
/// Code of a nucleotide character, `N` for anything unrecognised
#[inline(always)]
pub fn nuc_to_code(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => 1,
        b'C' => 2,
        b'M' => 3,
        b'G' => 4,
        b'R' => 5,
        b'S' => 6,
        b'V' => 7,
        b'T' | b'U' => 8,
        b'W' => 9,
        b'Y' => 10,
        b'H' => 11,
        b'K' => 12,
        b'D' => 13,
        b'B' => 14,
        GAP => GAP_CODE,
        _ => N_CODE,
    }
}

/// Character of a code
#[inline(always)]
pub fn code_to_nuc(code: u8) -> u8 {
    CODE_NUC[(code & 0xF) as usize]
}

/// Complement of a code: A<->T and C<->G is a reversal of the four bits
#[inline(always)]
pub fn complement_code(code: u8) -> u8 {
    ((code & 1) << 3) | ((code & 2) << 1) | ((code & 4) >> 1) | ((code & 8) >> 3)
}

/// Complement of a character, gaps stay gaps
#[inline(always)]
pub fn complement(base: u8) -> u8 {
    if base == GAP {
        GAP
    } else {
        code_to_nuc(complement_code(nuc_to_code(base)))
    }
}

/// Reverse complement of a sequence
pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|b| complement(*b)).collect()
}

/// Whether a character is one of the four unambiguous bases
#[inline(always)]
pub fn is_acgt(base: u8) -> bool {
    matches!(base.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T')
}

/// Packs up to six codes into the `nucs` word of a mutation.
///
/// The first code takes bits 20-23, the sixth bits 0-3.
pub fn pack_nucs(codes: &[u8]) -> u32 {
    debug_assert!(codes.len() <= MAX_RUN);
    codes
        .iter()
        .enumerate()
        .fold(0, |word, (idx, code)| {
            word | ((*code as u32 & 0xF) << (4 * (MAX_RUN - 1 - idx)))
        })
}

/// Code at `idx` of a packed `nucs` word
#[inline(always)]
pub fn unpack_nuc(nucs: u32, idx: usize) -> u8 {
    ((nucs >> (4 * (MAX_RUN - 1 - idx))) & 0xF) as u8
}

/// Packs a consensus sequence, eight codes per word, first code highest.
///
/// A short final word is zero-padded, which also terminates it.
pub fn pack_consensus(seq: &[u8]) -> Vec<u32> {
    seq.chunks(8)
        .map(|chunk| {
            chunk.iter().enumerate().fold(0, |word, (idx, base)| {
                word | ((nuc_to_code(*base) as u32) << (4 * (7 - idx)))
            })
        })
        .collect()
}

/// Decodes a packed consensus up to the first zero code
pub fn unpack_consensus(words: &[u32]) -> Vec<u8> {
    let mut seq = Vec::with_capacity(words.len() * 8);
    'words: for word in words {
        for idx in 0..8 {
            let code = ((word >> (4 * (7 - idx))) & 0xF) as u8;
            if code == GAP_CODE {
                break 'words;
            }
            seq.push(code_to_nuc(code));
        }
    }
    seq
}
