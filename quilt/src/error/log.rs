//! This module defines [ErrorLog] and its [Record]s.

use std::fmt::{self, Display};

use super::kind::ViewGenErrorKind;

/// One structured mapping-validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    kind: ViewGenErrorKind,
    message: String,
    affected_cells: Vec<usize>,
}

impl Record {
    /// Create a record; affected cells are sorted and deduplicated so
    /// diagnostics come out in original input order.
    pub fn new(
        kind: ViewGenErrorKind,
        message: impl Into<String>,
        affected_cells: impl IntoIterator<Item = usize>,
    ) -> Self {
        let mut affected_cells: Vec<usize> = affected_cells.into_iter().collect();
        affected_cells.sort_unstable();
        affected_cells.dedup();
        Self {
            kind,
            message: message.into(),
            affected_cells,
        }
    }

    /// The violation class.
    pub fn kind(&self) -> ViewGenErrorKind {
        self.kind
    }

    /// The user-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Ids of the mapping cells involved.
    pub fn affected_cells(&self) -> &[usize] {
        &self.affected_cells
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {}: {}", self.kind.code(), self.message)?;
        if !self.affected_cells.is_empty() {
            write!(f, " (cells ")?;
            for (index, cell) in self.affected_cells.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{cell}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Append-only collection of validation diagnostics.
///
/// Validation scans all cells before failing, so the user sees every problem
/// of a compilation at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLog {
    records: Vec<Record>,
}

impl ErrorLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn add_entry(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Number of records collected so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The collected records, in insertion order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl Display for ErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.records {
            writeln!(f, "{record}")?;
        }
        Ok(())
    }
}
