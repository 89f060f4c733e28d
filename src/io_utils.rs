//! Common helper functions for reading input lists and setting output
//!
//! The functions are used by a few different subcommands to turn command
//! line input into node lists and output streams.

use std::fs::File;
use std::io::{stdout, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use regex::Regex;

use crate::error::{MatError, Result};

/// Sample name of a read file: the base path with known fastx extensions
/// removed. If this cannot be parsed the full filename is used.
pub fn sample_name(file: &str) -> String {
    // matches the file name (no extension) in a full path
    let re_path = Regex::new(r"^.+/(.+?)\.(?i:fa|fasta|fq|fastq)(?:\.gz)?$")
        .expect("static regex is valid");
    // matches the file name (no extension) with no path
    let re_name =
        Regex::new(r"^(.+?)\.(?i:fa|fasta|fq|fastq)(?:\.gz)?$").expect("static regex is valid");
    match re_path.captures(file).or_else(|| re_name.captures(file)) {
        Some(capture) => capture[1].to_string(),
        None => file.to_string(),
    }
}

/// Set a buffered stream to write to.
///
/// Either a file (if [`Some`]) or stdout otherwise (if [`None`]).
pub fn set_ostream(oprefix: &Option<String>) -> Result<BufWriter<Box<dyn Write>>> {
    let out_writer = match oprefix {
        Some(prefix) => {
            let path = Path::new(prefix);
            Box::new(File::create(path)?) as Box<dyn Write>
        }
        None => Box::new(stdout()) as Box<dyn Write>,
    };
    Ok(BufWriter::new(out_writer))
}

/// Reads identifiers, one per line. Blank lines and `#` comments are
/// skipped, and only the first whitespace-separated field is used.
pub fn read_id_list(file_list: &str) -> Result<Vec<String>> {
    let f = BufReader::new(File::open(file_list)?);
    let mut ids = Vec::new();
    for line in f.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(id) = line.split_whitespace().next() {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

/// Node identifiers from command line input: either listed directly or in
/// `file_list`.
pub fn get_id_list(file_list: &Option<String>, names: &Option<Vec<String>>) -> Result<Vec<String>> {
    match (file_list, names) {
        (Some(file), _) => read_id_list(file),
        (None, Some(names)) => Ok(names.clone()),
        (None, None) => Err(MatError::malformed("no node identifiers given")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_names_drop_paths_and_extensions() {
        assert_eq!(sample_name("reads/sample_1.fastq.gz"), "sample_1");
        assert_eq!(sample_name("sample_2.FA"), "sample_2");
        assert_eq!(sample_name("/data/run.1.fq"), "run.1");
        assert_eq!(sample_name("reads.txt"), "reads.txt");
    }
}
