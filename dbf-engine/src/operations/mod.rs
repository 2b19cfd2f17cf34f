//! Table operations
//!
//! The store handle plus its read and write paths:
//! - `table`: open, create, reload and single-record reads
//! - `batch_read`: parallel range reads
//! - `append`: optimistic-concurrency append with rollback

pub mod table;
pub mod batch_read;
pub mod append;

pub use table::Table;
