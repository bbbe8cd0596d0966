//! In-memory membership index over the data file.
//!
//! Built once at startup in indexed mode and immutable afterwards. Records
//! are split on `\n`, one trailing `\r` is stripped, empty records are
//! discarded, and duplicates collapse silently. Non-UTF-8 records are kept
//! as raw bytes and remain matchable.

use crate::protocol::trim_cr;
use rustc_hash::FxHashSet;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
    time::SystemTime,
};

/// Set of distinct non-empty lines, plus the file snapshot it was built from.
#[derive(Debug)]
pub struct LineIndex {
    lines: FxHashSet<Box<[u8]>>,
    modified: Option<SystemTime>,
    size: u64,
}

impl LineIndex {
    /// Reads the whole file and builds the membership set.
    ///
    /// The file is read in binary mode through a buffer of `buffer_size`
    /// bytes. A final record without a trailing `\n` is indexed like any
    /// other.
    pub fn build(path: &Path, buffer_size: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        let mut reader = BufReader::with_capacity(buffer_size.max(4096), file);

        let mut lines = FxHashSet::default();
        let mut record = Vec::new();

        loop {
            record.clear();
            if reader.read_until(b'\n', &mut record)? == 0 {
                break;
            }

            if record.last() == Some(&b'\n') {
                record.pop();
            }

            let line = trim_cr(&record);
            if !line.is_empty() && !lines.contains(line) {
                lines.insert(Box::from(line));
            }
        }

        Ok(Self {
            lines,
            modified: metadata.modified().ok(),
            size: metadata.len(),
        })
    }

    /// Byte-exact membership test. O(|query|) hashing, O(1) expected lookup.
    #[inline]
    pub fn contains(&self, query: &[u8]) -> bool {
        self.lines.contains(query)
    }

    /// Number of distinct non-empty lines.
    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Modification time of the file at build, when the platform reports one.
    pub fn source_modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Size in bytes of the file at build.
    pub fn source_size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn index_of(contents: &[u8]) -> LineIndex {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        LineIndex::build(file.path(), 4096).unwrap()
    }

    #[test]
    fn exact_lines_only() {
        let index = index_of(b"7;0;6;28;0;23;5;0;\n1;0;6;16;0;19;3;0;\nhello world\n");

        assert_eq!(index.len(), 3);
        assert!(index.contains(b"7;0;6;28;0;23;5;0;"));
        assert!(index.contains(b"hello world"));

        // Prefixes and extensions of an indexed line are not members.
        assert!(!index.contains(b"hello worl"));
        assert!(!index.contains(b"hello world "));
        assert!(!index.contains(b""));
    }

    #[test]
    fn crlf_records_match_lf_queries() {
        let index = index_of(b"alpha\r\nbeta\r\n");

        assert!(index.contains(b"alpha"));
        assert!(index.contains(b"beta"));
        assert!(!index.contains(b"alpha\r"));
    }

    #[test]
    fn empty_records_discarded_and_duplicates_collapse() {
        let index = index_of(b"one\n\n\r\none\ntwo\n");

        assert_eq!(index.len(), 2);
        assert!(!index.contains(b""));
    }

    #[test]
    fn final_record_without_newline() {
        let index = index_of(b"first\nlast");

        assert!(index.contains(b"first"));
        assert!(index.contains(b"last"));
    }

    #[test]
    fn non_utf8_records_are_matchable() {
        let index = index_of(b"\xff\xfe\x01\ntext\n");

        assert!(index.contains(b"\xff\xfe\x01"));
        assert!(index.contains(b"text"));
    }

    #[test]
    fn snapshot_recorded() {
        let index = index_of(b"one\ntwo\n");

        assert_eq!(index.source_size(), 8);
        assert!(index.source_modified().is_some());
    }

    #[test]
    fn missing_file_fails() {
        assert!(LineIndex::build(Path::new("/nonexistent/data.txt"), 4096).is_err());
    }
}
