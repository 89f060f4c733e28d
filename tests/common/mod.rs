#![allow(dead_code)]
use std::{
    fs::File,
    io::{LineWriter, Write},
    path::PathBuf,
};

use assert_fs::{prelude::*, TempDir};
use predicates::prelude::*;

use panmat::coordinates::{Block, BlockCatalog, Coordinate, GapList};
use panmat::mutation::bit_encoding::nuc_to_code;
use panmat::mutation::{BlockMut, NucMut, NucMutType};
use panmat::tree::{NodeRecord, Tree};

pub struct TestSetup {
    wd: TempDir,
}

impl TestSetup {
    pub fn setup() -> Self {
        let wd = assert_fs::TempDir::new().unwrap();
        Self { wd }
    }

    pub fn get_wd(&self) -> String {
        self.wd.path().display().to_string()
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.wd.child(name).path().to_path_buf()
    }

    pub fn file_string(&self, name: &str) -> String {
        self.file_path(name)
            .to_str()
            .expect("Could not unpack file path")
            .to_owned()
    }

    pub fn file_exists(&self, name_out: &str) -> bool {
        let predicate_fn = predicate::path::is_file();
        predicate_fn.eval(self.wd.child(name_out).path())
    }

    pub fn save_tree(&self, tree: &Tree, name: &str) -> String {
        let path = self.file_string(name);
        tree.save(&path).expect("Could not save tree");
        path
    }

    pub fn write_lines(&self, name: &str, lines: &[&str]) -> String {
        let path = self.file_string(name);
        let mut f = LineWriter::new(File::create(&path).expect("Could not create file"));
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        path
    }

    pub fn write_fasta(&self, name: &str, records: &[(&str, &[u8])]) -> String {
        let path = self.file_string(name);
        let mut f = File::create(&path).expect("Could not create file");
        for (id, seq) in records {
            writeln!(f, ">{id}").unwrap();
            f.write_all(seq).unwrap();
            writeln!(f).unwrap();
        }
        path
    }
}

pub fn site(primary: i32, pos: i32) -> Coordinate {
    Coordinate::new(primary, -1, pos, -1)
}

pub fn gap_site(primary: i32, pos: i32, gap: i32) -> Coordinate {
    Coordinate::new(primary, -1, pos, gap)
}

pub fn code(base: u8) -> u8 {
    nuc_to_code(base)
}

pub fn sub(coord: Coordinate, base: u8) -> NucMut {
    NucMut::substitution(coord, code(base))
}

pub fn insertion_run(coord: Coordinate, bases: &[u8]) -> NucMut {
    let codes: Vec<u8> = bases.iter().map(|b| code(*b)).collect();
    let mut_type = if codes.len() == 1 {
        NucMutType::SnpInsertion
    } else {
        NucMutType::Insertion
    };
    NucMut::new(coord, mut_type, &codes)
}

// Block 0: ACGTTGCA with two gap slots before position 4
// Block 1: GGCCAATT
pub fn toy_catalog() -> BlockCatalog {
    BlockCatalog {
        blocks: vec![
            Block::new(0, -1, b"ACGTTGCA", "chr1"),
            Block::new(1, -1, b"GGCCAATT", "chr1"),
        ],
        gaps: vec![GapList {
            primary_block_id: 0,
            secondary_block_id: -1,
            nuc_position: vec![4],
            nuc_gap_length: vec![2],
        }],
        ..Default::default()
    }
}

pub const TOY_NEWICK: &str = "((a:0.1,b:0.1)x:0.2,c:0.3)root;";

// Pre-order: root, x, a, b, c
//   root  inserts both blocks
//   x     C>G at 0:1
//   a     inserts TT in the gap slots before 0:4
//   b     deletes 0:6
//   c     deletes block 1
pub fn toy_records() -> Vec<NodeRecord> {
    vec![
        NodeRecord {
            block_mutation: vec![BlockMut::insertion(0, -1), BlockMut::insertion(1, -1)],
            ..Default::default()
        },
        NodeRecord {
            nuc_mutation: vec![sub(site(0, 1), b'G')],
            ..Default::default()
        },
        NodeRecord {
            nuc_mutation: vec![insertion_run(gap_site(0, 4, 0), b"TT")],
            ..Default::default()
        },
        NodeRecord {
            nuc_mutation: vec![NucMut::deletion(site(0, 6))],
            ..Default::default()
        },
        NodeRecord {
            block_mutation: vec![BlockMut::deletion(1, -1)],
            ..Default::default()
        },
    ]
}

pub fn toy_tree() -> Tree {
    Tree::new(TOY_NEWICK, toy_records(), toy_catalog()).expect("toy tree is valid")
}

pub const TOY_SEQS: [(&str, &str); 5] = [
    ("root", "ACGTTGCAGGCCAATT"),
    ("x", "AGGTTGCAGGCCAATT"),
    ("a", "AGGTTTTGCAGGCCAATT"),
    ("b", "AGGTTGAGGCCAATT"),
    ("c", "ACGTTGCA"),
];

// Deterministic pseudo-random bases
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    pub fn base(&mut self) -> u8 {
        b"ACGT"[(self.next() % 4) as usize]
    }

    pub fn other_base(&mut self, not: u8) -> u8 {
        loop {
            let b = self.base();
            if b != not {
                return b;
            }
        }
    }
}

// One 400bp block, and a tree of two clades of three leaves. Every edge
// below the root substitutes a handful of sites no other edge touches.
pub fn random_tree(seed: u64) -> (Tree, Vec<u8>) {
    let mut rng = Lcg::new(seed);
    let consensus: Vec<u8> = (0..400).map(|_| rng.base()).collect();
    let catalog = BlockCatalog {
        blocks: vec![Block::new(0, -1, &consensus, "chr1")],
        ..Default::default()
    };
    let newick = "((l1:0.1,l2:0.1,l3:0.1)i1:0.1,(l4:0.1,l5:0.1,l6:0.1)i2:0.1)root;";
    let mut records = vec![NodeRecord {
        block_mutation: vec![BlockMut::insertion(0, -1)],
        ..Default::default()
    }];
    // 8 edges, 5 sites each, spaced so edges never share a site
    for edge in 0..8 {
        let mut muts = Vec::new();
        for i in 0..5 {
            let pos = (edge * 5 + i) * 9 + 7;
            let base = rng.other_base(consensus[pos]);
            muts.push(sub(site(0, pos as i32), base));
        }
        records.push(NodeRecord {
            nuc_mutation: muts,
            ..Default::default()
        });
    }
    let tree = Tree::new(newick, records, catalog).expect("random tree is valid");
    (tree, consensus)
}
