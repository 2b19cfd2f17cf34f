//! Table header - the fixed 32-byte block at the start of every DBF file
//!
//! Layout (little-endian):
//! - Offset 0x00: version (u8)
//! - Offset 0x01: last update year/month/day (3 x u8, year - 1900)
//! - Offset 0x04: num_records (u32)
//! - Offset 0x08: header_length (u16) - bytes before the first record
//! - Offset 0x0A: record_length (u16) - includes the deletion flag byte
//! - Offset 0x0C..0x20: reserved area, preserved verbatim
//!
//! The field descriptor table follows immediately, closed by a single
//! terminator byte.

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{Datelike, NaiveDate};
use std::io::{Cursor, Read};

use super::field::FieldDescriptor;
use crate::error::{DbfError, DbfResult};

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 32;

/// Absolute offset of the last-update date bytes
pub const LAST_UPDATE_OFFSET: u64 = 1;

/// Absolute offset of the record count
pub const NUM_RECORDS_OFFSET: u64 = 4;

/// Byte closing the field descriptor table
pub const TERMINATOR: u8 = 0x0D;

/// Byte marking the logical end of data after the last record
pub const EOF_MARKER: u8 = 0x1A;

/// Version byte written for newly created tables (dBase III, no memo)
pub const DEFAULT_VERSION: u8 = 0x03;

bitflags::bitflags! {
    /// Table flags stored at offset 0x1C
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TableFlags: u8 {
        /// A structural index file accompanies the table
        const STRUCTURAL_INDEX = 0x01;
        /// The table has a memo file
        const MEMO = 0x02;
        /// The table belongs to a database container
        const DATABASE = 0x04;
    }
}

/// Last update date as stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LastUpdate {
    /// Calendar year minus 1900
    pub year: u8,
    pub month: u8,
    pub day: u8,
}

impl LastUpdate {
    /// Build from a calendar date; years outside 1900..=2155 saturate
    pub fn from_date(date: NaiveDate) -> Self {
        let year = (date.year() - 1900).clamp(0, u8::MAX as i32) as u8;
        LastUpdate {
            year,
            month: date.month() as u8,
            day: date.day() as u8,
        }
    }

    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        LastUpdate {
            year: bytes[0],
            month: bytes[1],
            day: bytes[2],
        }
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        [self.year, self.month, self.day]
    }

    /// Interpret as a calendar date, if the stored bytes form one
    pub fn to_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(1900 + self.year as i32, self.month as u32, self.day as u32)
    }
}

/// Parsed table header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHeader {
    /// Version / file type byte
    pub version: u8,
    /// Date of the last append
    pub last_update: LastUpdate,
    /// Number of records in the table
    pub num_records: u32,
    /// Bytes from file start to the first record
    pub header_length: u16,
    /// Bytes per record, deletion flag included
    pub record_length: u16,
    /// Bytes 0x0C..0x20, kept as read
    pub reserved: [u8; 20],
}

impl TableHeader {
    /// Parse the fixed header from the first 32 bytes of a table file
    pub fn from_bytes(data: &[u8]) -> DbfResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(DbfError::MalformedHeader(format!(
                "need {} header bytes, found {}",
                HEADER_SIZE,
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        let version = cursor.read_u8()?;
        let mut date = [0u8; 3];
        cursor.read_exact(&mut date)?;
        let last_update = LastUpdate::from_bytes(date);
        let num_records = cursor.read_u32::<LittleEndian>()?;
        let header_length = cursor.read_u16::<LittleEndian>()?;
        let record_length = cursor.read_u16::<LittleEndian>()?;

        let mut reserved = [0u8; 20];
        reserved.copy_from_slice(&data[12..HEADER_SIZE]);

        Ok(TableHeader {
            version,
            last_update,
            num_records,
            header_length,
            record_length,
            reserved,
        })
    }

    /// Serialize to the 32-byte on-disk form
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.version;
        buf[1..4].copy_from_slice(&self.last_update.to_bytes());
        buf[4..8].copy_from_slice(&self.num_records.to_le_bytes());
        buf[8..10].copy_from_slice(&self.header_length.to_le_bytes());
        buf[10..12].copy_from_slice(&self.record_length.to_le_bytes());
        buf[12..HEADER_SIZE].copy_from_slice(&self.reserved);
        buf
    }

    /// Create a header for an empty table with the given fields
    pub fn new(fields: &[FieldDescriptor], date: NaiveDate) -> DbfResult<Self> {
        let header_length = HEADER_SIZE + fields.len() * FieldDescriptor::SIZE + 1;
        let record_length: usize = 1 + fields.iter().map(|f| f.length as usize).sum::<usize>();

        let header_length = u16::try_from(header_length).map_err(|_| {
            DbfError::MalformedHeader(format!("{} fields do not fit in a header", fields.len()))
        })?;
        let record_length = u16::try_from(record_length).map_err(|_| {
            DbfError::MalformedHeader(format!("record length {} exceeds 65535", record_length))
        })?;

        Ok(TableHeader {
            version: DEFAULT_VERSION,
            last_update: LastUpdate::from_date(date),
            num_records: 0,
            header_length,
            record_length,
            reserved: [0u8; 20],
        })
    }

    /// Number of field descriptors implied by the header length
    pub fn field_count(&self) -> usize {
        (self.header_length as usize).saturating_sub(HEADER_SIZE + 1) / FieldDescriptor::SIZE
    }

    /// Absolute offset of record `index` (its deletion flag byte)
    pub fn record_offset(&self, index: u32) -> u64 {
        self.header_length as u64 + self.record_length as u64 * index as u64
    }

    /// Offset just past the last record, where the sentinel lives
    pub fn data_end(&self) -> u64 {
        self.record_offset(self.num_records)
    }

    /// Check the geometry invariants against the parsed fields and file size
    pub fn validate(&self, fields: &[FieldDescriptor], file_size: u64) -> DbfResult<()> {
        if (self.header_length as usize) < HEADER_SIZE + 1 {
            return Err(DbfError::MalformedHeader(format!(
                "header length {} is shorter than {}",
                self.header_length,
                HEADER_SIZE + 1
            )));
        }

        let widths: usize = fields.iter().map(|f| f.length as usize).sum();
        if self.record_length as usize != 1 + widths {
            return Err(DbfError::MalformedHeader(format!(
                "record length {} does not match field widths {} + 1",
                self.record_length, widths
            )));
        }

        let required = self.data_end() + 1;
        if file_size < required {
            return Err(DbfError::MalformedHeader(format!(
                "file is {} bytes, {} records need at least {}",
                file_size, self.num_records, required
            )));
        }

        Ok(())
    }

    /// Set when a transaction was left incomplete (offset 0x0E)
    pub fn incomplete_transaction(&self) -> bool {
        self.reserved[2] != 0
    }

    /// Set when the table is encrypted (offset 0x0F)
    pub fn encrypted(&self) -> bool {
        self.reserved[3] != 0
    }

    /// Table flags (offset 0x1C)
    pub fn table_flags(&self) -> TableFlags {
        TableFlags::from_bits_truncate(self.reserved[16])
    }

    /// Language driver / code page id (offset 0x1D)
    pub fn language_driver(&self) -> u8 {
        self.reserved[17]
    }
}
