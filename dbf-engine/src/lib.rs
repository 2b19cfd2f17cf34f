//! DBF Engine - concurrent fixed-length DBF table store
//!
//! This crate reads and appends records in classic DBF table files. Many
//! readers may fetch records in parallel while a single writer appends,
//! guarded against outside writers by a whole-file fingerprint check.

pub mod error;
pub mod storage;
pub mod schema;
pub mod file_manager;
pub mod operations;

pub use error::{AppendStep, DbfError, DbfResult, ErrorKind, RollbackReport, RollbackStep};
pub use file_manager::{DiskFile, Fingerprint, TableFile};
pub use operations::Table;
pub use schema::{DynamicRecord, FieldValue, RecordSchema, SlotKind};
pub use storage::{Charset, FieldDescriptor, FieldType, TableHeader, TextCodec};
