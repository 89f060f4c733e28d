//! Command line interface, built using [`crate::clap` with `Derive`](https://docs.rs/clap/latest/clap/_derive/_tutorial/index.html)
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};

use crate::impute::{MoveComparison, TieBreak};

extern crate num_cpus;

/// Default k-mer size for syncmers
pub const DEFAULT_KMER: usize = 15;
/// Default s-mer size for syncmers
pub const DEFAULT_SMER: usize = 8;
/// Default branch-length radius searched for imputation donors
pub const DEFAULT_IMPUTE_DISTANCE: f32 = 1.0;

fn valid_kmer(s: &str) -> Result<usize, String> {
    let k: usize = s
        .parse()
        .map_err(|_| format!("`{s}` isn't a valid k-mer"))?;
    if !(4..=63).contains(&k) {
        Err("K-mer must be between 4 and 63 (inclusive)".to_string())
    } else {
        Ok(k)
    }
}

fn valid_smer(s: &str) -> Result<usize, String> {
    let smer: usize = s
        .parse()
        .map_err(|_| format!("`{s}` isn't a valid s-mer"))?;
    if smer < 1 {
        Err("S-mer must be at least 1".to_string())
    } else {
        Ok(smer)
    }
}

fn valid_distance(s: &str) -> Result<f32, String> {
    let d: f32 = s
        .parse()
        .map_err(|_| format!("`{s}` isn't a valid distance"))?;
    if !d.is_finite() || d < 0.0 {
        Err("Distance must be a non-negative number".to_string())
    } else {
        Ok(d)
    }
}

/// Checks a thread count against the available cores
pub fn valid_cpus(s: &str) -> Result<usize, String> {
    let threads: usize = s
        .parse()
        .map_err(|_| format!("`{s}` isn't a valid number of cores"))?;
    let max_threads = num_cpus::get();
    if threads < 1 || threads > max_threads {
        Err(format!("Threads must be between 1 and {max_threads}"))
    } else {
        Ok(threads)
    }
}

/// Possible sequence output formats
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum SeqFormat {
    /// Gapless sequences
    Raw,
    /// Sequences padded with gaps to the full alignment width
    Aligned,
}

/// How candidate imputation moves are scored
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum ComparisonPolicy {
    /// Nucleotide sites only
    Nucleotide,
    /// Nucleotide sites and block mutations
    NucleotideAndBlock,
}

impl From<ComparisonPolicy> for MoveComparison {
    fn from(policy: ComparisonPolicy) -> Self {
        match policy {
            ComparisonPolicy::Nucleotide => Self::NucleotideOnly,
            ComparisonPolicy::NucleotideAndBlock => Self::NucleotideAndBlock,
        }
    }
}

/// How ties between imputation moves are broken
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum TieBreakPolicy {
    /// Keep the first donor found
    First,
    /// Prefer the donor closest in branch length
    Nearest,
}

impl From<TieBreakPolicy> for TieBreak {
    fn from(policy: TieBreakPolicy) -> Self {
        match policy {
            TieBreakPolicy::First => Self::FirstEncountered,
            TieBreakPolicy::Nearest => Self::Nearest,
        }
    }
}

/// Options that apply to all subcommands
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[doc(hidden)]
    #[command(subcommand)]
    pub command: Commands,

    /// Show progress messages
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Subcommands and their specific options
#[derive(Subcommand)]
pub enum Commands {
    /// Print node, depth and mutation counts
    Summary {
        /// Tree file (.pmat)
        tree: String,

        /// Number of CPU threads
        #[arg(long, value_parser = valid_cpus, default_value_t = 1)]
        threads: usize,
    },
    /// Write the topology as Newick
    Newick {
        /// Tree file (.pmat)
        tree: String,

        /// Output file (omit to output to stdout)
        #[arg(short)]
        output: Option<String>,
    },
    /// Write node sequences as FASTA
    Fasta {
        /// Tree file (.pmat)
        tree: String,

        /// Output file (omit to output to stdout)
        #[arg(short)]
        output: Option<String>,

        /// Gapless or aligned sequences
        #[arg(long, value_enum, default_value_t = SeqFormat::Raw)]
        format: SeqFormat,

        /// Also write internal nodes
        #[arg(long, default_value_t = false)]
        all_nodes: bool,

        /// Number of CPU threads; more than one replays leaves independently
        #[arg(long, value_parser = valid_cpus, default_value_t = 1)]
        threads: usize,
    },
    #[command(group(
        ArgGroup::new("input")
            .required(true)
            .args(["names", "file_list"]),
    ))]
    /// Write the sequences of some nodes as FASTA
    Extract {
        /// Tree file (.pmat)
        tree: String,

        /// Node identifiers
        #[arg(group = "input")]
        names: Option<Vec<String>>,

        /// File listing node identifiers, one per line
        #[arg(short, group = "input")]
        file_list: Option<String>,

        /// Output file (omit to output to stdout)
        #[arg(short)]
        output: Option<String>,

        /// Gapless or aligned sequences
        #[arg(long, value_enum, default_value_t = SeqFormat::Raw)]
        format: SeqFormat,

        /// First alignment column to write (1-based)
        #[arg(long)]
        start: Option<usize>,

        /// Last alignment column to write (inclusive)
        #[arg(long)]
        end: Option<usize>,

        /// Number of CPU threads
        #[arg(long, value_parser = valid_cpus, default_value_t = 1)]
        threads: usize,
    },
    /// Write the sequence of the root node
    RootSeq {
        /// Tree file (.pmat)
        tree: String,

        /// Output file (omit to output to stdout)
        #[arg(short)]
        output: Option<String>,

        /// Gapless or aligned sequence
        #[arg(long, value_enum, default_value_t = SeqFormat::Raw)]
        format: SeqFormat,
    },
    /// Write variants of every node against a reference node as VCF
    Vcf {
        /// Tree file (.pmat)
        tree: String,

        /// Identifier of the reference node
        #[arg(short, long)]
        reference: String,

        /// Output file (omit to output to stdout)
        #[arg(short)]
        output: Option<String>,
    },
    #[command(group(
        ArgGroup::new("input")
            .required(true)
            .args(["names", "file_list"]),
    ))]
    /// Keep some nodes and their ancestors, and compress the result
    Subtree {
        /// Tree file (.pmat)
        tree: String,

        /// Node identifiers
        #[arg(group = "input")]
        names: Option<Vec<String>>,

        /// File listing node identifiers, one per line
        #[arg(short, group = "input")]
        file_list: Option<String>,

        /// Output tree file
        #[arg(short)]
        output: String,

        /// Number of CPU threads
        #[arg(long, value_parser = valid_cpus, default_value_t = 1)]
        threads: usize,
    },
    /// Merge single-child chains and consolidate mutations
    Compress {
        /// Tree file (.pmat)
        tree: String,

        /// Output tree file (omit to overwrite the input)
        #[arg(short)]
        output: Option<String>,

        /// Number of CPU threads
        #[arg(long, value_parser = valid_cpus, default_value_t = 1)]
        threads: usize,
    },
    /// Move the root onto a node, keeping every sequence
    Reroot {
        /// Tree file (.pmat)
        tree: String,

        /// Identifier of the new root
        name: String,

        /// Output tree file (omit to overwrite the input)
        #[arg(short)]
        output: Option<String>,
    },
    /// List the substitutions on every edge
    Substitutions {
        /// Tree file (.pmat)
        tree: String,

        /// Output file (omit to output to stdout)
        #[arg(short)]
        output: Option<String>,
    },
    /// Build a syncmer index of every node
    Index {
        /// Tree file (.pmat)
        tree: String,

        /// Output index file
        #[arg(short)]
        output: String,

        /// K-mer size
        #[arg(short, value_parser = valid_kmer, default_value_t = DEFAULT_KMER)]
        k: usize,

        /// S-mer size, smaller than k
        #[arg(short, value_parser = valid_smer, default_value_t = DEFAULT_SMER)]
        s: usize,
    },
    /// Place reads on the tree, and seed them against the best node
    Place {
        /// Tree file (.pmat)
        tree: String,

        /// Syncmer index built with `index`
        index: String,

        /// Reads (FASTA or FASTQ, optionally gzipped)
        reads: String,

        /// Output file (omit to output to stdout)
        #[arg(short)]
        output: Option<String>,

        /// Also print every node's score
        #[arg(long, default_value_t = false)]
        all_scores: bool,
    },
    /// Replace N bases with bases found in nearby nodes
    Impute {
        /// Tree file (.pmat)
        tree: String,

        /// Output tree file (omit to overwrite the input)
        #[arg(short)]
        output: Option<String>,

        /// Branch length searched around each node
        #[arg(long, value_parser = valid_distance, default_value_t = DEFAULT_IMPUTE_DISTANCE)]
        distance: f32,

        /// How candidate moves are scored
        #[arg(long, value_enum, default_value_t = ComparisonPolicy::Nucleotide)]
        comparison: ComparisonPolicy,

        /// How ties between candidate moves are broken
        #[arg(long, value_enum, default_value_t = TieBreakPolicy::First)]
        tie_break: TieBreakPolicy,

        /// Number of CPU threads
        #[arg(long, value_parser = valid_cpus, default_value_t = 1)]
        threads: usize,
    },
    /// Attach labels to nodes
    Annotate {
        /// Tree file (.pmat)
        tree: String,

        /// Lines of `identifier,label[,label...]`
        annotations: String,

        /// Output tree file (omit to overwrite the input)
        #[arg(short)]
        output: Option<String>,
    },
    /// List nodes carrying a label
    Search {
        /// Tree file (.pmat)
        tree: String,

        /// Label to look for
        label: String,
    },
}

/// Function to parse command line args into [`Args`] struct
pub fn cli_args() -> Args {
    Args::parse()
}
