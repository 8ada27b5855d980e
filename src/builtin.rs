//! Built-in predicates and work functions
//!
//! Used by the `fleet-walker` binary and handy as defaults for library
//! callers. Every function follows the callback contracts of the launcher:
//! predicates return `anyhow::Result<bool>`, work functions return
//! `anyhow::Result<Option<T>>` where `None` means "no result".

use anyhow::Context;
use regex::Regex;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};

/// Default predicate: accept anything that is not a symbolic link
pub fn not_symlink(path: &str) -> anyhow::Result<bool> {
    let meta = fs::symlink_metadata(path).with_context(|| format!("cannot stat '{}'", path))?;
    Ok(!meta.file_type().is_symlink())
}

/// Include/exclude regex filter
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    /// A path must match at least one of these (when any are given)
    pub include: Vec<Regex>,

    /// A path matching any of these is rejected
    pub exclude: Vec<Regex>,

    /// Reject symbolic links
    pub skip_symlinks: bool,
}

impl PathFilter {
    /// Check a path against the filter
    pub fn matches(&self, path: &str) -> anyhow::Result<bool> {
        if self.exclude.iter().any(|re| re.is_match(path)) {
            return Ok(false);
        }
        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(path)) {
            return Ok(false);
        }
        if self.skip_symlinks {
            return not_symlink(path);
        }
        Ok(true)
    }

    /// Turn the filter into a launcher predicate
    pub fn into_predicate(self) -> impl Fn(&str) -> anyhow::Result<bool> + Send + Sync + 'static {
        move |path: &str| self.matches(path)
    }
}

/// Work functions available from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WorkKind {
    /// File size in bytes
    Size,
    /// Number of newline-terminated lines
    Lines,
}

impl WorkKind {
    /// Run the work function on a path
    pub fn run(self, path: &str) -> anyhow::Result<Option<u64>> {
        match self {
            WorkKind::Size => file_size(path),
            WorkKind::Lines => line_count(path),
        }
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            WorkKind::Size => "size",
            WorkKind::Lines => "lines",
        }
    }
}

/// Size of a file in bytes
pub fn file_size(path: &str) -> anyhow::Result<Option<u64>> {
    let meta = fs::metadata(path).with_context(|| format!("cannot stat '{}'", path))?;
    Ok(Some(meta.len()))
}

/// Count `\n` bytes in a file
pub fn line_count(path: &str) -> anyhow::Result<Option<u64>> {
    let file = File::open(path).with_context(|| format!("cannot open '{}'", path))?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut lines = 0u64;

    loop {
        let buf = reader
            .fill_buf()
            .with_context(|| format!("cannot read '{}'", path))?;
        if buf.is_empty() {
            break;
        }
        lines += buf.iter().filter(|&&b| b == b'\n').count() as u64;
        let len = buf.len();
        reader.consume(len);
    }

    Ok(Some(lines))
}
