//! Listing the base substitutions carried on each edge.
//!
//! Only sites that hold a base in both the parent and the node are listed;
//! insertions and deletions are left out. Columns and bases are those of
//! the block's forward strand, whatever its orientation in the node.

use std::fmt;

use crate::error::Result;
use crate::mutation::bit_encoding::{code_to_nuc, GAP_CODE};
use crate::mutation::consolidate::expand;
use crate::mutation::EditKind;
use crate::tree::Tree;

/// A base replaced on one edge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Substitution {
    /// Column in the aligned sequence, 0-based
    pub column: usize,
    /// Parent's base
    pub reference: u8,
    /// Node's base
    pub alternative: u8,
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.reference as char,
            self.column + 1,
            self.alternative as char
        )
    }
}

/// Substitutions on the edge above one node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSubstitutions {
    /// Node identifier
    pub identifier: String,
    /// In column order
    pub substitutions: Vec<Substitution>,
}

impl fmt::Display for NodeSubstitutions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}\t", self.identifier)?;
        for (i, s) in self.substitutions.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{s}")?;
        }
        Ok(())
    }
}

impl Tree {
    /// Substitutions on every edge, nodes in pre-order.
    ///
    /// Positions are written 1-based, e.g. `C12T`.
    ///
    /// # Errors
    /// [`crate::error::MatError::OutOfRange`] if a mutation is outside the
    /// block catalog.
    pub fn substitutions(&self) -> Result<Vec<NodeSubstitutions>> {
        let parent_codes = self.parent_codes()?;
        let mut listing = Vec::with_capacity(self.len());
        for idx in self.preorder(self.root()) {
            let node = self.node(idx);
            let mut substitutions = Vec::new();
            for (coord, (kind, code)) in expand(&node.nuc_mutation) {
                let parent = parent_codes[idx].get(&coord).copied().unwrap_or(GAP_CODE);
                if kind != EditKind::Substitution || parent == GAP_CODE || parent == code {
                    continue;
                }
                substitutions.push(Substitution {
                    column: self.global_coords().coordinate_of(&coord)?,
                    reference: code_to_nuc(parent),
                    alternative: code_to_nuc(code),
                });
            }
            substitutions.sort_by_key(|s| s.column);
            listing.push(NodeSubstitutions {
                identifier: node.identifier.clone(),
                substitutions,
            });
        }
        log::info!(
            "Listed {} substitutions",
            listing.iter().map(|n| n.substitutions.len()).sum::<usize>()
        );
        Ok(listing)
    }
}
