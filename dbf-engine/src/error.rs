//! Error taxonomy for table operations
//!
//! Every fallible engine call returns a [`DbfError`]. Callers that only need
//! to branch on the category can use [`DbfError::kind`], which flattens the
//! payload-carrying variants into a `Copy` [`ErrorKind`].

use std::fmt;
use std::io;

use thiserror::Error;

/// Flat classification of engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Underlying read/write/seek/flush failure
    Io,
    /// Truncated or inconsistent table header
    MalformedHeader,
    /// Truncated or invalid field descriptor
    MalformedFieldDescriptor,
    /// Index or range beyond the current record count
    OutOfRange,
    /// Stored text could not be converted to the slot type
    FieldParse,
    /// A stored column has no slot in the record schema
    UnresolvedColumn,
    /// The file changed while an append was being prepared
    ConcurrentModification,
    /// A write step of an append failed and rollback ran
    AppendFailed,
}

impl ErrorKind {
    /// Whether the caller may simply retry the same call
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ConcurrentModification)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Io => "I/O error",
            ErrorKind::MalformedHeader => "Malformed header",
            ErrorKind::MalformedFieldDescriptor => "Malformed field descriptor",
            ErrorKind::OutOfRange => "Out of range",
            ErrorKind::FieldParse => "Field parse error",
            ErrorKind::UnresolvedColumn => "Unresolved column",
            ErrorKind::ConcurrentModification => "Concurrent modification",
            ErrorKind::AppendFailed => "Append failed",
        })
    }
}

/// The on-disk mutation an append was performing when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendStep {
    /// Writing the record buffer over the old sentinel
    Record,
    /// Writing the incremented record count
    RecordCount,
    /// Writing the last-update date
    LastUpdate,
    /// Flushing to durable storage
    Sync,
}

impl fmt::Display for AppendStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AppendStep::Record => "record write",
            AppendStep::RecordCount => "record count update",
            AppendStep::LastUpdate => "last update date",
            AppendStep::Sync => "sync",
        })
    }
}

/// One undo action of the append rollback sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackStep {
    /// Truncate to the pre-append size and rewrite the sentinel
    Record,
    /// Rewrite the pre-append record count
    RecordCount,
    /// Rewrite the pre-append last-update date
    LastUpdate,
    /// Flush the restored state
    Sync,
}

impl fmt::Display for RollbackStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RollbackStep::Record => "record",
            RollbackStep::RecordCount => "record count",
            RollbackStep::LastUpdate => "last update date",
            RollbackStep::Sync => "sync",
        })
    }
}

/// A rollback step that itself failed
#[derive(Debug)]
pub struct RollbackFailure {
    pub step: RollbackStep,
    pub source: io::Error,
}

/// Outcome of the rollback sequence that follows a failed append step
///
/// Every step is attempted; the report lists the ones that failed. An empty
/// report means the file was restored to its pre-append state.
#[derive(Debug, Default)]
pub struct RollbackReport {
    pub failures: Vec<RollbackFailure>,
}

impl RollbackReport {
    /// True when every rollback step succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record(&mut self, step: RollbackStep, result: io::Result<()>) {
        if let Err(source) = result {
            self.failures.push(RollbackFailure { step, source });
        }
    }
}

impl fmt::Display for RollbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return f.write_str("rolled back");
        }
        f.write_str("rollback incomplete")?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{} ({})", sep, failure.step, failure.source)?;
        }
        Ok(())
    }
}

/// Main error type for the DBF engine
#[derive(Error, Debug)]
pub enum DbfError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Malformed field descriptor {field}: {reason}")]
    MalformedFieldDescriptor { field: String, reason: String },

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Cannot parse {raw_text:?} in column {column}")]
    FieldParse { column: String, raw_text: String },

    #[error("Column {0} has no slot in the record schema")]
    UnresolvedColumn(String),

    #[error("Table file was modified by another writer during append")]
    ConcurrentModification,

    #[error("Append failed at {step}: {source} ({rollback})")]
    AppendFailed {
        step: AppendStep,
        #[source]
        source: io::Error,
        rollback: RollbackReport,
    },
}

impl DbfError {
    /// Get the flat classification for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbfError::Io(_) => ErrorKind::Io,
            DbfError::MalformedHeader(_) => ErrorKind::MalformedHeader,
            DbfError::MalformedFieldDescriptor { .. } => ErrorKind::MalformedFieldDescriptor,
            DbfError::OutOfRange(_) => ErrorKind::OutOfRange,
            DbfError::FieldParse { .. } => ErrorKind::FieldParse,
            DbfError::UnresolvedColumn(_) => ErrorKind::UnresolvedColumn,
            DbfError::ConcurrentModification => ErrorKind::ConcurrentModification,
            DbfError::AppendFailed { .. } => ErrorKind::AppendFailed,
        }
    }
}

/// Result type for table operations
pub type DbfResult<T> = Result<T, DbfError>;
