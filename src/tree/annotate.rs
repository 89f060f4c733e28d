//! Free-text node annotations.
//!
//! Input lines look like `node_id, label one, label two`. Blank lines and
//! lines starting with `#` are ignored.

use std::io::BufRead;

use crate::error::{MatError, Result};
use crate::tree::Tree;

impl Tree {
    /// Adds annotations read from `reader`, returning how many were added.
    ///
    /// # Errors
    /// [`MatError::MissingNode`] for an unknown node id,
    /// [`MatError::MalformedInput`] for a line without labels.
    pub fn annotate<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let mut added = 0;
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split(',').map(str::trim);
            let node_id = fields.next().unwrap_or_default();
            let labels: Vec<String> = fields
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
            if labels.is_empty() {
                return Err(MatError::malformed(format!(
                    "annotation line {} has no labels",
                    line_no + 1
                )));
            }
            let idx = self.find(node_id)?;
            let node = self.node_mut(idx);
            for label in labels {
                if !node.annotations.contains(&label) {
                    node.annotations.push(label);
                    added += 1;
                }
            }
        }
        log::info!("Added {added} annotations");
        Ok(added)
    }

    /// Identifiers of nodes carrying `label`, in pre-order
    pub fn search_by_annotation(&self, label: &str) -> Vec<String> {
        self.preorder(self.root())
            .into_iter()
            .map(|idx| self.node(idx))
            .filter(|node| node.annotations.iter().any(|a| a == label))
            .map(|node| node.identifier.clone())
            .collect()
    }
}
