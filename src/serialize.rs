//! Tree files: topology, pre-order node records and block catalog.
//!
//! Encoded as CBOR with [`ciborium`] inside a [`snap`] frame. Loading a file
//! and saving it again gives the same topology, mutations, catalog and
//! annotations.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};

use serde::{Deserialize, Serialize};

use crate::coordinates::BlockCatalog;
use crate::error::{MatError, Result};
use crate::tree::{NodeRecord, Tree};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct TreeFile {
    version: u32,
    newick: String,
    nodes: Vec<NodeRecord>,
    catalog: BlockCatalog,
}

impl Tree {
    /// Writes the tree to any writer
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let contents = TreeFile {
            version: FORMAT_VERSION,
            newick: self.newick_string(),
            nodes: self.to_records(),
            catalog: self.catalog().clone(),
        };
        let mut compressed = snap::write::FrameEncoder::new(writer);
        ciborium::ser::into_writer(&contents, &mut compressed)
            .map_err(|e| MatError::serialization(e.to_string()))?;
        compressed.flush()?;
        Ok(())
    }

    /// Reads a tree written by [`Tree::to_writer`]
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let decompressed = snap::read::FrameDecoder::new(reader);
        let contents: TreeFile = ciborium::de::from_reader(decompressed)
            .map_err(|e| MatError::serialization(e.to_string()))?;
        if contents.version != FORMAT_VERSION {
            return Err(MatError::serialization(format!(
                "unsupported tree file version {}",
                contents.version
            )));
        }
        Self::new(&contents.newick, contents.nodes, contents.catalog)
    }

    /// Saves the tree to a file
    pub fn save(&self, filename: &str) -> Result<()> {
        log::info!("Saving tree to {filename}");
        self.to_writer(BufWriter::new(File::create(filename)?))
    }

    /// Loads a tree from a file
    pub fn load(filename: &str) -> Result<Self> {
        log::info!("Loading tree from {filename}");
        Self::from_reader(BufReader::new(File::open(filename)?))
    }
}
