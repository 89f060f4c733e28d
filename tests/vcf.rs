use std::io::Cursor;

use panmat::error::MatError;
use panmat::mutation::{BlockMut, NucMut};
use panmat::replay::sequence_of;
use panmat::tree::{NodeRecord, Tree};
use panmat::vcf::{diff_sequences, sequence_from_vcf, write_vcf, VariantRecord};

pub mod common;
use crate::common::*;

#[cfg(test)]
use pretty_assertions::assert_eq;

fn record(position: usize, reference: &str, alternate: &str) -> VariantRecord {
    VariantRecord {
        position,
        reference: reference.to_string(),
        alternate: alternate.to_string(),
    }
}

#[test]
fn diff_aligned_pairs() {
    assert_eq!(
        diff_sequences(b"ACGT", b"A-GT").unwrap(),
        vec![record(2, "C", ".")]
    );
    assert_eq!(
        diff_sequences(b"AC--GT", b"ACTTGA").unwrap(),
        vec![record(3, ".", "TT"), record(4, "T", "A")]
    );
    // Adjacent differences are one record
    assert_eq!(
        diff_sequences(b"ACGTA", b"AGC-A").unwrap(),
        vec![record(2, "CGT", "GC")]
    );
    // Columns empty in both are skipped
    assert_eq!(
        diff_sequences(b"A-CG", b"A-Cg").unwrap(),
        Vec::<VariantRecord>::new()
    );
    assert!(matches!(
        diff_sequences(b"ACGT", b"ACG"),
        Err(MatError::Inconsistent { .. })
    ));
}

#[test]
fn toy_vcf() {
    let tree = toy_tree();
    let mut out = Vec::new();
    write_vcf(&tree, "root", &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines[0], "##fileformat=VCFv4.2");
    assert_eq!(lines[2], "##reference=root");
    assert_eq!(
        lines[3],
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\ta\tb\tc\tx"
    );
    assert_eq!(
        &lines[4..],
        &[
            ".\t2\t0\tC\tG\t.\t.\t.\tGT\t1\t1\t0\t1",
            ".\t5\t1\t.\tTT\t.\t.\t.\tGT\t1\t0\t0\t0",
            ".\t7\t2\tC\t.\t.\t.\t.\tGT\t0\t1\t0\t0",
            ".\t9\t3\tGGCCAATT\t.\t.\t.\t.\tGT\t0\t0\t1\t0",
        ]
    );
}

#[test]
fn columns_follow_names_not_tree_order() {
    // Pre-order is m, z, b, a
    let records = vec![
        NodeRecord {
            block_mutation: vec![BlockMut::insertion(0, -1), BlockMut::insertion(1, -1)],
            ..Default::default()
        },
        NodeRecord {
            nuc_mutation: vec![sub(site(0, 0), b'G')],
            ..Default::default()
        },
        NodeRecord {
            nuc_mutation: vec![NucMut::deletion(site(0, 6))],
            ..Default::default()
        },
        NodeRecord::default(),
        NodeRecord {
            nuc_mutation: vec![sub(site(0, 1), b'T')],
            ..Default::default()
        },
    ];
    let tree = Tree::new("((z:0.1,b:0.1)m:0.1,a:0.1)root;", records, toy_catalog()).unwrap();
    let mut out = Vec::new();
    write_vcf(&tree, "root", &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[3],
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\ta\tb\tm\tz"
    );
    assert_eq!(
        &lines[4..],
        &[
            ".\t1\t0\tA\tG\t.\t.\t.\tGT\t0\t1\t1\t1",
            ".\t2\t1\tC\tT\t.\t.\t.\tGT\t1\t0\t0\t0",
            ".\t7\t2\tC\t.\t.\t.\t.\tGT\t0\t0\t0\t1",
        ]
    );
}

#[test]
fn vcf_reconstructs_samples() {
    let tree = toy_tree();
    for reference in ["root", "a", "c"] {
        let mut out = Vec::new();
        write_vcf(&tree, reference, &mut out).unwrap();
        let ref_seq = sequence_of(&tree, reference, false).unwrap();
        for (id, expected) in TOY_SEQS {
            if id == reference {
                continue;
            }
            let rebuilt = sequence_from_vcf(Cursor::new(&out), id, &ref_seq).unwrap();
            assert_eq!(
                String::from_utf8(rebuilt).unwrap(),
                expected,
                "{id} against {reference}"
            );
        }
    }
}

#[test]
fn random_tree_samples_rebuild() {
    let (tree, _) = random_tree(3);
    let mut out = Vec::new();
    write_vcf(&tree, "root", &mut out).unwrap();
    let ref_seq = sequence_of(&tree, "root", false).unwrap();
    for leaf in ["l1", "l2", "l3", "l4", "l5", "l6", "i1", "i2"] {
        let rebuilt = sequence_from_vcf(Cursor::new(&out), leaf, &ref_seq).unwrap();
        assert_eq!(rebuilt, sequence_of(&tree, leaf, false).unwrap(), "{leaf}");
    }
}

#[test]
fn malformed_vcf() {
    let no_header = ".\t2\t0\tC\tG\t.\t.\t.\tGT\t1\n";
    assert!(matches!(
        sequence_from_vcf(Cursor::new(no_header), "a", b"ACGT"),
        Err(MatError::MalformedVcf { .. })
    ));
    let header = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\ta\n";
    assert!(matches!(
        sequence_from_vcf(Cursor::new(header), "b", b"ACGT"),
        Err(MatError::MalformedVcf { .. })
    ));
    let past_end = format!("{header}.\t9\t0\tC\tG\t.\t.\t.\tGT\t1\n");
    assert!(matches!(
        sequence_from_vcf(Cursor::new(past_end), "a", b"ACGT"),
        Err(MatError::MalformedVcf { .. })
    ));
    assert!(matches!(
        sequence_from_vcf(Cursor::new(""), "a", b"ACGT"),
        Err(MatError::MalformedVcf { .. })
    ));
}
