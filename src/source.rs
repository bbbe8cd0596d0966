//! Where query answers come from: the prebuilt index or a fresh file scan.
//!
//! The variant is chosen once at startup from `reread_on_query` and never
//! changes. Indexed answers are served from memory and are cacheable; reread
//! answers open the data file fresh on every query so that external edits to
//! the file are observed immediately. Reread mode never holds the file open
//! between queries.

use crate::{config::Config, errors::StartupError, index::LineIndex, protocol::trim_cr};
use memchr::memchr;
use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Debug)]
pub enum DataSource {
    /// Membership set built once at startup.
    Indexed(LineIndex),

    /// Every query streams the file from the beginning.
    Reread { path: PathBuf, buffer_size: usize },
}

impl DataSource {
    /// Builds the source selected by `config.reread_on_query`.
    ///
    /// Both modes verify the data file is readable; a missing or unreadable
    /// file refuses startup.
    pub fn open(config: &Config) -> Result<Self, StartupError> {
        let path = config.data_path.clone();
        let data_file = |source| StartupError::DataFile {
            path: path.clone(),
            source,
        };

        if config.reread_on_query {
            File::open(&config.data_path).map_err(data_file)?;

            Ok(Self::Reread {
                path: config.data_path.clone(),
                buffer_size: config.buffer_size,
            })
        } else {
            let index = LineIndex::build(&config.data_path, config.buffer_size).map_err(data_file)?;

            Ok(Self::Indexed(index))
        }
    }

    /// Byte-exact full-line membership test.
    ///
    /// Indexed lookups cannot fail; reread lookups surface file errors to
    /// the caller, which reports `ERROR` and closes the connection.
    #[inline]
    pub fn contains(&self, query: &[u8]) -> io::Result<bool> {
        match self {
            Self::Indexed(index) => Ok(index.contains(query)),
            Self::Reread { path, buffer_size } => scan_file(path, *buffer_size, query),
        }
    }

}

/// Streams the file and returns true on the first line equal to `needle`.
///
/// Lines are framed on `\n` with one trailing `\r` stripped, exactly as the
/// index build does. Partial lines straddling a chunk boundary are carried
/// over; a final unterminated record still counts.
pub(crate) fn scan_file(path: &Path, buffer_size: usize, needle: &[u8]) -> io::Result<bool> {
    // Empty records never exist in the data file.
    if needle.is_empty() {
        return Ok(false);
    }

    let mut file = File::open(path)?;
    let mut buf = vec![0u8; buffer_size.max(4096)];
    let mut carry: Vec<u8> = Vec::new();

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }

        let mut chunk = &buf[..n];
        while let Some(pos) = memchr(b'\n', chunk) {
            let found = if carry.is_empty() {
                trim_cr(&chunk[..pos]) == needle
            } else {
                carry.extend_from_slice(&chunk[..pos]);
                let matched = trim_cr(&carry) == needle;
                carry.clear();
                matched
            };

            if found {
                return Ok(true);
            }

            chunk = &chunk[pos + 1..];
        }

        carry.extend_from_slice(chunk);
    }

    Ok(!carry.is_empty() && trim_cr(&carry) == needle)
}
