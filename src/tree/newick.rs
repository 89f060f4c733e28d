//! Minimal Newick reader for tree topologies.
//!
//! Reads labels and branch lengths only; comments and support values are
//! not handled. Labels may be single-quoted, with `''` standing for a quote
//! inside the label.

use crate::error::{MatError, Result};

/// A node as read from a Newick string
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedNode {
    /// Label, if one was given
    pub name: Option<String>,
    /// Branch length, if one was given
    pub branch_length: Option<f32>,
    /// Index of the parent in the parsed list
    pub parent: Option<usize>,
}

/// Parses a Newick string into nodes listed in pre-order
pub fn parse(newick: &str) -> Result<Vec<ParsedNode>> {
    let bytes = newick.trim().as_bytes();
    let mut nodes: Vec<ParsedNode> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut expect_node = true;
    let mut pos = 0;
    let mut terminated = false;

    while pos < bytes.len() {
        match bytes[pos] {
            b'(' => {
                if !expect_node {
                    return Err(MatError::malformed(format!(
                        "unexpected '(' at offset {pos} of topology"
                    )));
                }
                nodes.push(ParsedNode {
                    name: None,
                    branch_length: None,
                    parent: open.last().copied(),
                });
                open.push(nodes.len() - 1);
                pos += 1;
            }
            b',' | b')' => {
                if open.is_empty() {
                    return Err(MatError::malformed(format!(
                        "unbalanced '{}' at offset {pos} of topology",
                        bytes[pos] as char
                    )));
                }
                if expect_node {
                    // Unlabelled leaf, e.g. "(,A)"
                    nodes.push(ParsedNode {
                        name: None,
                        branch_length: None,
                        parent: open.last().copied(),
                    });
                }
                if bytes[pos] == b',' {
                    expect_node = true;
                    pos += 1;
                } else {
                    let idx = open.pop().unwrap_or_default();
                    pos = read_label(bytes, pos + 1, &mut nodes[idx])?;
                    expect_node = false;
                }
            }
            b';' => {
                terminated = true;
                break;
            }
            c if c.is_ascii_whitespace() => pos += 1,
            _ => {
                if !expect_node {
                    return Err(MatError::malformed(format!(
                        "unexpected label at offset {pos} of topology"
                    )));
                }
                nodes.push(ParsedNode {
                    name: None,
                    branch_length: None,
                    parent: open.last().copied(),
                });
                let idx = nodes.len() - 1;
                pos = read_label(bytes, pos, &mut nodes[idx])?;
                expect_node = false;
            }
        }
    }

    if !terminated {
        return Err(MatError::malformed("topology is not terminated by ';'"));
    }
    if !open.is_empty() {
        return Err(MatError::malformed("unbalanced '(' in topology"));
    }
    if nodes.is_empty() {
        return Err(MatError::EmptyTree);
    }
    Ok(nodes)
}

// Reads "label:length" from `pos`, returns the offset after it
fn read_label(bytes: &[u8], mut pos: usize, node: &mut ParsedNode) -> Result<usize> {
    let is_stop = |c: u8| matches!(c, b',' | b'(' | b')' | b';' | b':');
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    let label = if pos < bytes.len() && bytes[pos] == b'\'' {
        let (label, end) = read_quoted(bytes, pos)?;
        pos = end;
        label
    } else {
        let start = pos;
        while pos < bytes.len() && !is_stop(bytes[pos]) {
            pos += 1;
        }
        String::from_utf8_lossy(&bytes[start..pos]).trim().to_string()
    };
    if !label.is_empty() {
        node.name = Some(label);
    }
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b':' {
        pos += 1;
        let start = pos;
        while pos < bytes.len() && !is_stop(bytes[pos]) {
            pos += 1;
        }
        let text = String::from_utf8_lossy(&bytes[start..pos]).trim().to_string();
        let length = text
            .parse::<f32>()
            .map_err(|_| MatError::malformed(format!("invalid branch length '{text}'")))?;
        node.branch_length = Some(length);
    }
    Ok(pos)
}

// Label between single quotes starting at `pos`, and the offset after the
// closing quote
fn read_quoted(bytes: &[u8], mut pos: usize) -> Result<(String, usize)> {
    let open = pos;
    let mut label = Vec::new();
    pos += 1;
    loop {
        match bytes.get(pos) {
            None => {
                return Err(MatError::malformed(format!(
                    "quoted label at offset {open} of topology is not closed"
                )))
            }
            Some(b'\'') if bytes.get(pos + 1) == Some(&b'\'') => {
                label.push(b'\'');
                pos += 2;
            }
            Some(b'\'') => return Ok((String::from_utf8_lossy(&label).into_owned(), pos + 1)),
            Some(c) => {
                label.push(*c);
                pos += 1;
            }
        }
    }
}

/// Label as written in Newick: single-quoted when it holds whitespace or
/// characters with a meaning in the format
pub fn quote_label(label: &str) -> String {
    let needs_quotes = label
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, ':' | ',' | '(' | ')' | ';' | '\'' | '[' | ']'));
    if needs_quotes {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_string()
    }
}
