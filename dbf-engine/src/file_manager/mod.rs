//! File manager for table files
//!
//! Owns positional I/O and content fingerprints.

pub mod table_file;

pub use table_file::{DiskFile, Fingerprint, TableFile};
