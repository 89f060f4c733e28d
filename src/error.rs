//! Error type shared by the library and the command line front end.
//!
//! Errors fall into four groups: malformed input (tree file, catalog, VCF),
//! lookups of node identifiers that do not exist, internal inconsistencies
//! (a mutation outside the catalog, a consolidation that changes the
//! sequence), and the I/O layer underneath all of these.

use thiserror::Error;

/// Main error type for tree operations
#[derive(Error, Debug)]
pub enum MatError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// FASTA/FASTQ reading or writing failed
    #[error("Sequence file error: {0}")]
    Fastx(#[from] needletail::errors::ParseError),

    /// Tree file could not be encoded or decoded
    #[error("Serialization error: {message}")]
    Serialization {
        /// What went wrong
        message: String,
    },

    /// Node table, topology string or annotation input that cannot be read
    #[error("Malformed input: {message}")]
    MalformedInput {
        /// What went wrong
        message: String,
    },

    /// Gap or block-gap entries that do not refer to a real block or position
    #[error("Malformed block catalog: {message}")]
    MalformedCatalog {
        /// What went wrong
        message: String,
    },

    /// A tree with no leaves
    #[error("Tree has no leaves")]
    EmptyTree,

    /// VCF input without the header or sample column that was asked for
    #[error("Malformed VCF: {message}")]
    MalformedVcf {
        /// What went wrong
        message: String,
    },

    /// Single identifier lookup that failed
    #[error("Node not found: {0}")]
    MissingNode(String),

    /// Bulk lookup where some identifiers were absent
    #[error("Nodes not found: {}", .0.join(", "))]
    MissingNodes(Vec<String>),

    /// A mutation pointing outside the block catalog
    #[error("Mutation {mutation} on node {node} is outside the block catalog")]
    OutOfRange {
        /// Node carrying the mutation
        node: String,
        /// The mutation, formatted
        mutation: String,
    },

    /// An internal check failed (e.g. consolidated mutations decode differently)
    #[error("Inconsistent state: {message}")]
    Inconsistent {
        /// What went wrong
        message: String,
    },
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, MatError>;

impl MatError {
    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a malformed input error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    /// Create a malformed catalog error
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::MalformedCatalog {
            message: message.into(),
        }
    }

    /// Create a malformed VCF error
    pub fn vcf(message: impl Into<String>) -> Self {
        Self::MalformedVcf {
            message: message.into(),
        }
    }

    /// Create an internal consistency error
    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::Inconsistent {
            message: message.into(),
        }
    }
}
