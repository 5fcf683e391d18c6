//! Record source
//!
//! Reads the input line by line and numbers records from 0. Every rank reads
//! the whole input in the same order, so every rank computes the same index
//! for the same record; partitioning relies on that.
//!
//! # Modules
//!
//! - `extract`: pull the text field out of a raw record
//! - `tokenizer`: split text into normalized tokens

pub mod extract;
pub mod tokenizer;

pub use extract::{extract_text, RecordParseError};
pub use tokenizer::{tokenize, Tokens};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Layout of one input line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RecordFormat {
    /// The whole line is the text
    Plain,
    /// Tweet export: six CSV fields, then a JSON blob holding the text
    TwitterCsv,
}

impl Default for RecordFormat {
    fn default() -> Self {
        Self::Plain
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::TwitterCsv => write!(f, "twitter-csv"),
        }
    }
}

/// One raw record and its global index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub index: u64,
    pub raw: Vec<u8>,
}

/// Sequential line reader yielding numbered records
///
/// Lines are returned as raw bytes with the terminator stripped; decoding is
/// left to extraction so that a bad line fails alone.
pub struct LineSource<R> {
    reader: R,
    next_index: u64,
}

impl<R: BufRead> LineSource<R> {
    /// Wrap `reader`, optionally discarding a header line first
    pub fn new(mut reader: R, skip_header: bool) -> io::Result<Self> {
        if skip_header {
            let mut header = Vec::new();
            reader.read_until(b'\n', &mut header)?;
        }

        Ok(Self {
            reader,
            next_index: 0,
        })
    }
}

impl LineSource<BufReader<File>> {
    /// Open the file at `path`
    pub fn open(path: &Path, skip_header: bool) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open input: {}", path.display()))?;

        Self::new(BufReader::new(file), skip_header)
            .with_context(|| format!("Failed to read header of: {}", path.display()))
    }
}

impl<R: BufRead> Iterator for LineSource<R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut raw = Vec::new();
        match self.reader.read_until(b'\n', &mut raw) {
            Ok(0) => None,
            Ok(_) => {
                if raw.last() == Some(&b'\n') {
                    raw.pop();
                    if raw.last() == Some(&b'\r') {
                        raw.pop();
                    }
                }

                let index = self.next_index;
                self.next_index += 1;
                Some(Ok(Record { index, raw }))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
