//! Output formatters for SML list entries.
//!
//! This module provides a trait for rendering measurement entries and the
//! `#`-separated text format consumed by downstream line processors.

pub mod text;

use crate::sml::ListEntry;
use thiserror::Error;

/// Per-entry problems. They are reported and the entry is skipped; sibling
/// entries are still rendered.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntryError {
    #[error("Error in data stream. Entry value is missing. Skipping this.")]
    MissingValue,
    #[error("Error in data stream. Object name has {0} bytes instead of 6. Skipping this.")]
    ObjectName(usize),
}

/// One rendered output line.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryLine {
    pub text: String,
    /// Readings are flushed right away so piped consumers see them without delay.
    pub flush: bool,
}

/// Trait for turning measurement entries into output lines.
pub trait EntryFormatter: Send + Sync {
    /// Render one entry.
    ///
    /// Returns `Ok(None)` for value types this format does not show.
    fn format_entry(&self, entry: &ListEntry) -> Result<Option<EntryLine>, EntryError>;

    /// Render the trailing line of a measurement list.
    fn format_sensor_time(&self, counter: u32) -> String;
}
