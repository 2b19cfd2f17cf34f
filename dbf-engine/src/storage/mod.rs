//! Storage layer for the DBF table format
//!
//! This module handles the low-level binary format of table files:
//! - The fixed 32-byte table header
//! - The field descriptor table
//! - Fixed-width record encoding
//! - Text transcoding

pub mod header;
pub mod field;
pub mod record;
pub mod charset;

pub use header::{LastUpdate, TableFlags, TableHeader};
pub use field::{FieldDescriptor, FieldType};
pub use record::{decode_record, encode_record};
pub use charset::{Charset, TextCodec};
