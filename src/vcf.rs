//! Variants of every node against a reference node, as VCF.
//!
//! Aligned sequences make the comparison a column walk: consecutive columns
//! where the two sequences differ form one record, placed at the 1-based
//! position (in the reference's gapless sequence) of the first reference
//! base of the run. A run with no reference bases is placed at the
//! reference base that follows it. Empty REF or ALT is written as `.`.
//!
//! [`sequence_from_vcf`] applies the records of one sample back onto the
//! reference sequence, which recovers that sample's gapless sequence.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use crate::error::{MatError, Result};
use crate::mutation::bit_encoding::GAP;
use crate::replay::buffer::SequenceBuffer;
use crate::replay::{sequence_of, traverse, ReplayVisitor};
use crate::tree::{NodeIdx, Tree};

const VCF_VERSION: &str = "4.2";

/// One difference between two aligned sequences
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantRecord {
    /// 1-based position in the reference's gapless sequence
    pub position: usize,
    /// Reference bases, `.` if none
    pub reference: String,
    /// Alternate bases, `.` if none
    pub alternate: String,
}

fn allele(bases: &[u8]) -> String {
    if bases.is_empty() {
        ".".to_string()
    } else {
        String::from_utf8_lossy(bases).to_string()
    }
}

/// Differences between two aligned sequences of equal length
pub fn diff_sequences(reference: &[u8], alternate: &[u8]) -> Result<Vec<VariantRecord>> {
    if reference.len() != alternate.len() {
        return Err(MatError::inconsistent(format!(
            "aligned sequences differ in length ({} and {})",
            reference.len(),
            alternate.len()
        )));
    }
    let mut records = Vec::new();
    let mut ref_pos = 0;
    let mut run: Option<(usize, Vec<u8>, Vec<u8>)> = None;
    for (r, a) in reference.iter().zip(alternate) {
        if *r == GAP && *a == GAP {
            continue;
        }
        if r.eq_ignore_ascii_case(a) {
            if let Some((start, ref_bases, alt_bases)) = run.take() {
                records.push(VariantRecord {
                    position: start + 1,
                    reference: allele(&ref_bases),
                    alternate: allele(&alt_bases),
                });
            }
            ref_pos += 1;
            continue;
        }
        let (_, ref_bases, alt_bases) = run.get_or_insert_with(|| (ref_pos, Vec::new(), Vec::new()));
        if *r != GAP {
            ref_bases.push(*r);
            ref_pos += 1;
        }
        if *a != GAP {
            alt_bases.push(*a);
        }
    }
    if let Some((start, ref_bases, alt_bases)) = run {
        records.push(VariantRecord {
            position: start + 1,
            reference: allele(&ref_bases),
            alternate: allele(&alt_bases),
        });
    }
    Ok(records)
}

// position -> REF -> ALT -> samples, by visit order
type VariantTable = BTreeMap<usize, BTreeMap<String, BTreeMap<String, Vec<usize>>>>;

struct VariantCollector<'a> {
    ref_idx: NodeIdx,
    ref_seq: &'a [u8],
    samples: Vec<String>,
    variants: VariantTable,
}

impl ReplayVisitor for VariantCollector<'_> {
    fn visit(&mut self, tree: &Tree, idx: NodeIdx, buffer: &SequenceBuffer) -> Result<()> {
        if idx == self.ref_idx {
            return Ok(());
        }
        let sample_idx = self.samples.len();
        self.samples.push(tree.node(idx).identifier.clone());
        for record in diff_sequences(self.ref_seq, &buffer.sequence(true))? {
            self.variants
                .entry(record.position)
                .or_default()
                .entry(record.reference)
                .or_default()
                .entry(record.alternate)
                .or_default()
                .push(sample_idx);
        }
        Ok(())
    }
}

/// Writes variants of every other node against `reference` as VCF.
///
/// Samples are all nodes except the reference, sorted by name. Each line is
/// one position and REF allele; its ALT alleles are numbered in sorted
/// order and each sample gets the index of its allele (0 for reference).
///
/// Nodes are diffed one at a time during a single replay traversal, so
/// only the reference sequence and the variants are held in memory.
pub fn write_vcf<W: Write>(tree: &Tree, reference: &str, f: &mut W) -> Result<()> {
    let ref_idx = tree.find(reference)?;
    let ref_seq = sequence_of(tree, reference, true)?;

    log::info!("Comparing {} nodes against {reference}", tree.len() - 1);
    let mut collector = VariantCollector {
        ref_idx,
        ref_seq: &ref_seq,
        samples: Vec::with_capacity(tree.len()),
        variants: BTreeMap::new(),
    };
    traverse(tree, &mut collector)?;
    let VariantCollector {
        samples, variants, ..
    } = collector;

    // Output columns are the samples in name order
    let mut by_name: Vec<usize> = (0..samples.len()).collect();
    by_name.sort_by(|a, b| samples[*a].cmp(&samples[*b]));
    let mut column = vec![0; samples.len()];
    for (col, sample_idx) in by_name.iter().enumerate() {
        column[*sample_idx] = col;
    }

    writeln!(f, "##fileformat=VCFv{VCF_VERSION}")?;
    writeln!(f, "##source=panmat v{}", env!("CARGO_PKG_VERSION"))?;
    writeln!(f, "##reference={reference}")?;
    write!(f, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT")?;
    for sample_idx in &by_name {
        write!(f, "\t{}", samples[*sample_idx])?;
    }
    writeln!(f)?;

    let mut record_id = 0;
    for (position, by_ref) in &variants {
        for (ref_allele, by_alt) in by_ref {
            let mut genotypes = vec![0; samples.len()];
            let mut alts = Vec::with_capacity(by_alt.len());
            for (gt, (alt_allele, carriers)) in by_alt.iter().enumerate() {
                alts.push(alt_allele.as_str());
                for sample_idx in carriers {
                    genotypes[column[*sample_idx]] = gt + 1;
                }
            }
            write!(
                f,
                ".\t{position}\t{record_id}\t{ref_allele}\t{}\t.\t.\t.\tGT",
                alts.join(",")
            )?;
            for gt in genotypes {
                write!(f, "\t{gt}")?;
            }
            writeln!(f)?;
            record_id += 1;
        }
    }
    log::info!("Wrote {record_id} VCF records");
    Ok(())
}

/// Rebuilds the gapless sequence of `sample` from a VCF written by
/// [`write_vcf`] and the gapless sequence of its reference.
///
/// # Errors
/// [`MatError::MalformedVcf`] if the column header is missing, the sample
/// has no column, or a record does not fit the reference.
pub fn sequence_from_vcf<R: BufRead>(reader: R, sample: &str, reference: &[u8]) -> Result<Vec<u8>> {
    let mut sample_col = None;
    let mut edits: Vec<(usize, usize, Vec<u8>)> = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with("##") || line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if line.starts_with("#CHROM") {
            sample_col = Some(
                fields
                    .iter()
                    .skip(9)
                    .position(|name| *name == sample)
                    .map(|col| col + 9)
                    .ok_or_else(|| MatError::vcf(format!("no column for sample {sample}")))?,
            );
            continue;
        }
        let col = sample_col.ok_or_else(|| MatError::vcf("record before #CHROM header"))?;
        if fields.len() <= col {
            return Err(MatError::vcf(format!("record has {} columns", fields.len())));
        }
        let gt: usize = fields[col]
            .parse()
            .map_err(|_| MatError::vcf(format!("invalid genotype '{}'", fields[col])))?;
        if gt == 0 {
            continue;
        }
        let position: usize = fields[1]
            .parse()
            .map_err(|_| MatError::vcf(format!("invalid position '{}'", fields[1])))?;
        let ref_len = if fields[3] == "." { 0 } else { fields[3].len() };
        let alt = fields[4]
            .split(',')
            .nth(gt - 1)
            .ok_or_else(|| MatError::vcf(format!("genotype {gt} has no ALT allele")))?;
        let alt = if alt == "." {
            Vec::new()
        } else {
            alt.as_bytes().to_vec()
        };
        if position == 0 {
            return Err(MatError::vcf("position 0 in a 1-based file"));
        }
        edits.push((position - 1, ref_len, alt));
    }
    if sample_col.is_none() {
        return Err(MatError::vcf("missing #CHROM header"));
    }

    edits.sort_by_key(|(start, ref_len, _)| (*start, *ref_len));
    let mut seq = Vec::with_capacity(reference.len());
    let mut cursor = 0;
    for (start, ref_len, alt) in edits {
        if start < cursor || start + ref_len > reference.len() {
            return Err(MatError::vcf(format!(
                "record at position {} does not fit the reference",
                start + 1
            )));
        }
        seq.extend_from_slice(&reference[cursor..start]);
        seq.extend_from_slice(&alt);
        cursor = start + ref_len;
    }
    seq.extend_from_slice(&reference[cursor..]);
    Ok(seq)
}
