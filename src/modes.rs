//! Main control of the CLI subcommands.
//!
//! Each function loads what it needs, runs one library operation, and
//! writes the result to a file or stdout.

use std::fs::File;
use std::io::{BufReader, Write};
use std::ops::Range;

use needletail::parser::{write_fasta as write_fasta_record, LineEnding};

use crate::error::Result;
use crate::impute::ImputeConfig;
use crate::io_utils::{sample_name, set_ostream};
use crate::replay::{
    segments_parallel, sequence_of, sequences_parallel, write_fasta, write_fasta_parallel,
};
use crate::syncmer::index::SyncmerIndex;
use crate::syncmer::place::{place_and_align, read_fastx};
use crate::syncmer::SyncmerParams;
use crate::tree::Tree;
use crate::vcf::write_vcf;

/// Code for `panmat summary`
pub fn summary(tree: &Tree) -> Result<()> {
    let mut out_stream = set_ostream(&None)?;
    writeln!(out_stream, "{}", tree.summary())?;
    Ok(())
}

/// Code for `panmat newick`
pub fn newick(tree: &Tree, output: &Option<String>) -> Result<()> {
    let mut out_stream = set_ostream(output)?;
    writeln!(out_stream, "{}", tree.newick_string())?;
    Ok(())
}

/// Code for `panmat fasta`
///
/// One thread replays the whole tree through a single buffer; with more
/// threads each sequence is rebuilt independently.
pub fn fasta(
    tree: &Tree,
    output: &Option<String>,
    aligned: bool,
    all_nodes: bool,
    threads: usize,
) -> Result<()> {
    let mut out_stream = set_ostream(output)?;
    if threads > 1 {
        log::info!("Writing sequences with {threads} threads");
        write_fasta_parallel(tree, &mut out_stream, aligned, all_nodes)?;
    } else {
        log::info!("Writing sequences in one traversal");
        write_fasta(tree, &mut out_stream, aligned, all_nodes)?;
    }
    out_stream.flush()?;
    Ok(())
}

/// Code for `panmat extract`
///
/// With `columns`, only that window of the aligned sequences is written.
pub fn extract(
    tree: &Tree,
    names: &[String],
    output: &Option<String>,
    aligned: bool,
    columns: Option<Range<usize>>,
) -> Result<()> {
    let nodes = names
        .iter()
        .map(|name| tree.find(name))
        .collect::<Result<Vec<_>>>()?;
    log::info!("Extracting {} sequences", nodes.len());
    let records = match columns {
        Some(columns) => segments_parallel(tree, &nodes, columns, aligned)?,
        None => sequences_parallel(tree, &nodes, aligned)?,
    };
    let mut out_stream = set_ostream(output)?;
    for (name, seq) in records {
        write_fasta_record(name.as_bytes(), &seq, &mut out_stream, LineEnding::Unix)?;
    }
    out_stream.flush()?;
    Ok(())
}

/// Code for `panmat root-seq`
pub fn root_seq(tree: &Tree, output: &Option<String>, aligned: bool) -> Result<()> {
    let root = &tree.node(tree.root()).identifier;
    let seq = sequence_of(tree, root, aligned)?;
    let mut out_stream = set_ostream(output)?;
    write_fasta_record(root.as_bytes(), &seq, &mut out_stream, LineEnding::Unix)?;
    out_stream.flush()?;
    Ok(())
}

/// Code for `panmat vcf`
pub fn vcf(tree: &Tree, reference: &str, output: &Option<String>) -> Result<()> {
    let mut out_stream = set_ostream(output)?;
    write_vcf(tree, reference, &mut out_stream)?;
    out_stream.flush()?;
    Ok(())
}

/// Code for `panmat subtree`
pub fn subtree(tree: &Tree, names: &[String], output: &str) -> Result<()> {
    log::info!("Extracting subtree of {} nodes", names.len());
    let subtree = tree.extract_subtree(names)?;
    log::info!("Saving subtree with {} nodes", subtree.len());
    subtree.save(output)
}

/// Code for `panmat compress`
pub fn compress(tree: &mut Tree, output: &str) -> Result<()> {
    let stats = tree.compress()?;
    log::info!(
        "Merged {} nodes, mutation records {} -> {}",
        stats.merged,
        stats.mutations_before,
        stats.mutations_after
    );
    tree.save(output)
}

/// Code for `panmat reroot`
pub fn reroot(tree: &mut Tree, name: &str, output: &str) -> Result<()> {
    tree.reroot(name)?;
    tree.save(output)
}

/// Code for `panmat substitutions`
pub fn substitutions(tree: &Tree, output: &Option<String>) -> Result<()> {
    let listing = tree.substitutions()?;
    let mut out_stream = set_ostream(output)?;
    for node in listing {
        writeln!(out_stream, "{node}")?;
    }
    out_stream.flush()?;
    Ok(())
}

/// Code for `panmat index`
pub fn index(tree: &Tree, params: SyncmerParams, output: &str) -> Result<()> {
    let index = SyncmerIndex::build(tree, params)?;
    log::info!("Saving index of {} nodes", index.deltas.len());
    index.save(output)
}

/// Code for `panmat place`
pub fn place(
    tree: &Tree,
    index_file: &str,
    reads_file: &str,
    output: &Option<String>,
    all_scores: bool,
) -> Result<()> {
    log::info!("Loading index");
    let index = SyncmerIndex::load(index_file)?;
    let reads = read_fastx(reads_file)?;
    let (placement, alignments) = place_and_align(&index, tree, &reads)?;

    let mut out_stream = set_ostream(output)?;
    writeln!(out_stream, "#sample\t{}", sample_name(reads_file))?;
    if all_scores {
        write!(out_stream, "{placement}")?;
    } else {
        writeln!(out_stream, "best_node\t{}", placement.best_node)?;
        writeln!(out_stream, "best_score\t{:.6}", placement.best_score)?;
    }
    writeln!(out_stream, "#read\tstrand\tref_start\tseeds\tmatches\tmismatches")?;
    for alignment in alignments {
        writeln!(out_stream, "{alignment}")?;
    }
    out_stream.flush()?;
    Ok(())
}

/// Code for `panmat impute`
pub fn impute(tree: &mut Tree, config: &ImputeConfig, output: &str) -> Result<()> {
    let stats = tree.impute_ns(config)?;
    eprintln!("{stats}");
    tree.save(output)
}

/// Code for `panmat annotate`
pub fn annotate(tree: &mut Tree, annotations: &str, output: &str) -> Result<()> {
    let reader = BufReader::new(File::open(annotations)?);
    let n_labels = tree.annotate(reader)?;
    log::info!("Added {n_labels} labels");
    tree.save(output)
}

/// Code for `panmat search`
pub fn search(tree: &Tree, label: &str) -> Result<()> {
    let mut out_stream = set_ostream(&None)?;
    for id in tree.search_by_annotation(label) {
        writeln!(out_stream, "{id}")?;
    }
    out_stream.flush()?;
    Ok(())
}
