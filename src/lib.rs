//! Mutation-annotated pangenome trees (MATs).
//!
//! A MAT is a phylogeny in which no node stores its sequence. Each node
//! stores only the edits that turn its parent's sequence into its own:
//! nucleotide substitutions, insertions and deletions at alignment sites,
//! and block mutations that switch whole blocks of the pangenome on or off
//! or flip their orientation. Any node's sequence is recovered by replaying
//! the edits on its path from the root onto the block consensus sequences.
//!
//! Sequences are never materialised for the whole tree at once. A single
//! sequence buffer is walked through the tree, applying a node's edits on
//! the way down and undoing them on the way back up. FASTA and VCF output,
//! syncmer indexing and imputation are all built on that traversal.
//!
//! Command line usage follows. For API documentation and usage, see the [end of this section](#api-usage).
//!
//! # Usage
//!
//! Trees are stored in `.pmat` files: the Newick topology, per-node edits
//! and the block catalog, CBOR encoded and snappy compressed. Every
//! subcommand takes a `.pmat` file as its first argument.
//!
//! Output is to STDOUT unless `-o` is given, so you can use a redirect `>`
//! to save to a file or pipe `|` into another program. Subcommands that
//! modify the tree (`compress`, `reroot`, `impute`, `annotate`) overwrite
//! the input unless `-o` names a new file.
//!
//! ## Common options
//!
//! Version can be viewed by running `panmat -V`.
//!
//! Details and progress messages are written on STDERR. You can see more
//! logging information by adding the verbose flag `-v`.
//!
//! ## panmat summary
//!
//! Prints node and leaf counts, leaf depths and the number of mutations of
//! each type, one `name\tvalue` pair per line.
//!
//! ```bash
//! panmat summary tree.pmat
//! ```
//!
//! ## panmat newick
//!
//! Writes the topology with every node labelled. Internal nodes without a
//! name are called `node_<n>`.
//!
//! ## panmat fasta
//!
//! Writes leaf sequences, or all nodes' with `--all-nodes`. With
//! `--format aligned` every sequence is padded with gaps to the width of
//! the whole alignment, otherwise gaps are removed. With one thread the
//! whole tree is replayed through a single buffer; with more, each
//! sequence is rebuilt independently from the root.
//!
//! ```bash
//! panmat fasta tree.pmat --format aligned --threads 4 > tree.aln
//! ```
//!
//! ## panmat extract
//!
//! Writes the sequences of the named nodes:
//! ```bash
//! panmat extract tree.pmat sample_1 sample_3 -o two.fa
//! ```
//! Use `-f` to read the names from a file, one per line.
//!
//! `--start` and `--end` keep only those alignment columns (1-based,
//! inclusive) of each sequence; with the default raw format the gaps in
//! that window are then removed.
//!
//! ## panmat root-seq
//!
//! Writes the sequence of the root node: the consensus of the blocks it
//! switches on, with its own mutations applied.
//!
//! ## panmat vcf
//!
//! Compares the sequence of every node against a reference node and writes
//! the differences as VCF. Positions are 1-based in the reference's gapless
//! sequence. Empty alleles (pure insertions or deletions) are written as
//! `.`, and each sample column holds the index of the sample's allele.
//!
//! ```bash
//! panmat vcf tree.pmat --reference sample_1 > variants.vcf
//! ```
//!
//! ## panmat subtree
//!
//! Keeps the named nodes and their ancestors, merges chains of single-child
//! nodes, consolidates the mutations of each node and saves the result:
//! ```bash
//! panmat subtree tree.pmat -f clade.txt -o clade.pmat
//! ```
//!
//! ## panmat compress
//!
//! Merges chains of single-child nodes (including the root) and rewrites
//! each node's mutations in their shortest form.
//!
//! ## panmat reroot
//!
//! Makes the named node the root. Edges between the old and the new root
//! change direction, and their mutations are rewritten so that every node
//! keeps its sequence:
//! ```bash
//! panmat reroot tree.pmat sample_1 -o rerooted.pmat
//! ```
//!
//! ## panmat substitutions
//!
//! Lists the base substitutions on the edge above each node, one node per
//! line: the identifier, a tab, then entries like `C12T` (parent base,
//! 1-based alignment column, node base) separated by commas.
//!
//! ## panmat index
//!
//! Builds a syncmer index. The root's syncmers are stored once, and for
//! every other node only the syncmers it removes and adds. `-k` and `-s`
//! set the k-mer and s-mer lengths (defaults 15 and 8).
//!
//! ```bash
//! panmat index tree.pmat -o tree.idx
//! ```
//!
//! ## panmat place
//!
//! Scores every node by the Jaccard similarity of its syncmers to those of
//! a read set, reports the best node, and seeds each read against the best
//! node's sequence:
//! ```bash
//! panmat place tree.pmat tree.idx reads.fastq.gz --all-scores
//! ```
//!
//! ## panmat impute
//!
//! Removes substitutions to `N`, and moves nodes that insert `N`s next to
//! a nearby node that inserted real bases at the same place. `--distance`
//! limits how far (in branch length) donors are searched for;
//! `--comparison` and `--tie-break` choose how candidate moves are scored
//! and ranked.
//!
//! ## panmat annotate and panmat search
//!
//! `annotate` reads lines of `identifier,label[,label...]` and attaches the
//! labels to the nodes. `search` lists the nodes carrying a label.
//!
//! # API usage
//!
//! See the submodule documentation linked below.
//!
//! Building a small tree in memory and replaying it:
//! ```rust
//! use panmat::coordinates::{Block, BlockCatalog, Coordinate};
//! use panmat::mutation::bit_encoding::nuc_to_code;
//! use panmat::mutation::{BlockMut, NucMut};
//! use panmat::replay::sequence_of;
//! use panmat::tree::{NodeRecord, Tree};
//!
//! # fn main() -> Result<(), panmat::error::MatError> {
//! let catalog = BlockCatalog {
//!     blocks: vec![Block::new(0, -1, b"ACGT", "chr1")],
//!     ..Default::default()
//! };
//! // Records are listed in pre-order: root, a, b
//! let records = vec![
//!     NodeRecord {
//!         block_mutation: vec![BlockMut::insertion(0, -1)],
//!         ..Default::default()
//!     },
//!     NodeRecord {
//!         nuc_mutation: vec![NucMut::substitution(
//!             Coordinate::new(0, -1, 1, -1),
//!             nuc_to_code(b'G'),
//!         )],
//!         ..Default::default()
//!     },
//!     NodeRecord::default(),
//! ];
//! let tree = Tree::new("(a:0.1,b:0.2)root;", records, catalog)?;
//!
//! assert_eq!(sequence_of(&tree, "a", false)?, b"AGGT");
//! assert_eq!(sequence_of(&tree, "b", false)?, b"ACGT");
//! # Ok(())
//! # }
//! ```
//!
//! Trees are saved and loaded with [`tree::Tree::save`] and
//! [`tree::Tree::load`]; whole-tree output is in [`replay`] and [`vcf`].

#![warn(missing_docs)]
use std::ops::Range;
use std::time::Instant;

pub mod coordinates;
pub mod error;
pub mod mutation;

pub mod tree;
use crate::tree::Tree;

pub mod replay;
pub mod serialize;
pub mod subtree;
pub mod vcf;

pub mod impute;
use crate::impute::ImputeConfig;

pub mod syncmer;
use crate::syncmer::SyncmerParams;

pub mod modes;
use crate::modes::*;

pub mod cli;
use crate::cli::*;

pub mod io_utils;
use crate::io_utils::get_id_list;

use crate::error::{MatError, Result};

fn set_threads(threads: usize) {
    if threads > 1 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            log::warn!("Could not size thread pool: {e}");
        }
    }
}

// 1-based inclusive columns to a 0-based range
fn column_range(start: Option<usize>, end: Option<usize>) -> Result<Option<Range<usize>>> {
    if start.is_none() && end.is_none() {
        return Ok(None);
    }
    let start = start.unwrap_or(1);
    let end = end.unwrap_or(usize::MAX);
    if start == 0 || start > end {
        return Err(MatError::malformed(format!(
            "column range {start}-{end} is empty or not 1-based"
        )));
    }
    Ok(Some(start - 1..end))
}

fn run(command: &Commands) -> Result<()> {
    match command {
        Commands::Summary { tree, threads } => {
            set_threads(*threads);
            summary(&Tree::load(tree)?)
        }
        Commands::Newick { tree, output } => newick(&Tree::load(tree)?, output),
        Commands::Fasta {
            tree,
            output,
            format,
            all_nodes,
            threads,
        } => {
            set_threads(*threads);
            let aligned = *format == SeqFormat::Aligned;
            fasta(&Tree::load(tree)?, output, aligned, *all_nodes, *threads)
        }
        Commands::Extract {
            tree,
            names,
            file_list,
            output,
            format,
            start,
            end,
            threads,
        } => {
            set_threads(*threads);
            let names = get_id_list(file_list, names)?;
            let columns = column_range(*start, *end)?;
            extract(
                &Tree::load(tree)?,
                &names,
                output,
                *format == SeqFormat::Aligned,
                columns,
            )
        }
        Commands::RootSeq {
            tree,
            output,
            format,
        } => root_seq(&Tree::load(tree)?, output, *format == SeqFormat::Aligned),
        Commands::Vcf {
            tree,
            reference,
            output,
        } => vcf(&Tree::load(tree)?, reference, output),
        Commands::Subtree {
            tree,
            names,
            file_list,
            output,
            threads,
        } => {
            set_threads(*threads);
            let names = get_id_list(file_list, names)?;
            subtree(&Tree::load(tree)?, &names, output)
        }
        Commands::Compress {
            tree,
            output,
            threads,
        } => {
            set_threads(*threads);
            let mut mat = Tree::load(tree)?;
            compress(&mut mat, output.as_ref().unwrap_or(tree))
        }
        Commands::Reroot { tree, name, output } => {
            let mut mat = Tree::load(tree)?;
            reroot(&mut mat, name, output.as_ref().unwrap_or(tree))
        }
        Commands::Substitutions { tree, output } => substitutions(&Tree::load(tree)?, output),
        Commands::Index { tree, output, k, s } => {
            if s >= k {
                return Err(MatError::malformed(format!(
                    "s-mer ({s}) must be shorter than the k-mer ({k})"
                )));
            }
            let params = SyncmerParams { k: *k, s: *s };
            index(&Tree::load(tree)?, params, output)
        }
        Commands::Place {
            tree,
            index,
            reads,
            output,
            all_scores,
        } => place(&Tree::load(tree)?, index, reads, output, *all_scores),
        Commands::Impute {
            tree,
            output,
            distance,
            comparison,
            tie_break,
            threads,
        } => {
            set_threads(*threads);
            let config = ImputeConfig {
                allowed_distance: *distance,
                comparison: (*comparison).into(),
                tie_break: (*tie_break).into(),
            };
            let mut mat = Tree::load(tree)?;
            impute(&mut mat, &config, output.as_ref().unwrap_or(tree))
        }
        Commands::Annotate {
            tree,
            annotations,
            output,
        } => {
            let mut mat = Tree::load(tree)?;
            annotate(&mut mat, annotations, output.as_ref().unwrap_or(tree))
        }
        Commands::Search { tree, label } => search(&Tree::load(tree)?, label),
    }
}

#[doc(hidden)]
pub fn main() {
    let args = cli_args();
    if args.verbose {
        if let Err(e) = simple_logger::init_with_level(log::Level::Info) {
            eprintln!("Could not start logger: {e}");
        }
    }

    eprintln!("panmat: mutation-annotated pangenome trees");
    let start = Instant::now();
    if let Err(e) = run(&args.command) {
        log::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    let end = Instant::now();

    eprintln!("panmat done in {}s", end.duration_since(start).as_secs());
    log::info!("Complete");
}
