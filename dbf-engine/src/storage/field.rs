//! Field descriptors - one 32-byte entry per column after the table header
//!
//! Descriptor layout:
//! - Bytes 0-10: name (NUL-padded)
//! - Byte 11: type code
//! - Bytes 12-15: reserved (field displacement in some dialects)
//! - Byte 16: field length
//! - Byte 17: decimal count
//! - Bytes 18-19: reserved
//! - Byte 20: work area id
//! - Bytes 21-30: reserved
//! - Byte 31: field flags
//!
//! Descriptor order is the on-disk column order; a field's offset inside a
//! record is the sum of the lengths before it.

use crate::error::{DbfError, DbfResult};

/// Column types by their on-disk type code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// 'C' - character text
    Character,
    /// 'N' - numeric text, optionally with decimals
    Numeric,
    /// 'F' - floating point text
    Float,
    /// 'D' - date as YYYYMMDD text
    Date,
    /// 'L' - logical (T/F/Y/N/?)
    Logical,
    /// 'M' - memo block reference
    Memo,
    /// Any other type code, kept as read
    Other(u8),
}

impl FieldType {
    pub fn from_raw(code: u8) -> Self {
        match code {
            b'C' => FieldType::Character,
            b'N' => FieldType::Numeric,
            b'F' => FieldType::Float,
            b'D' => FieldType::Date,
            b'L' => FieldType::Logical,
            b'M' => FieldType::Memo,
            other => FieldType::Other(other),
        }
    }

    pub fn as_raw(&self) -> u8 {
        match self {
            FieldType::Character => b'C',
            FieldType::Numeric => b'N',
            FieldType::Float => b'F',
            FieldType::Date => b'D',
            FieldType::Logical => b'L',
            FieldType::Memo => b'M',
            FieldType::Other(code) => *code,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_raw() as char)
    }
}

/// One column definition from the descriptor table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Raw name bytes, NUL-padded
    pub name: [u8; 11],
    pub field_type: FieldType,
    /// Reserved bytes 12-15
    pub displacement: [u8; 4],
    /// Width of the column in bytes
    pub length: u8,
    /// Decimal places, meaningful for numeric types
    pub decimal_count: u8,
    pub work_area_id: u8,
    pub flags: u8,
    /// Reserved bytes 18-19 and 21-30
    reserved: [u8; 12],
}

impl FieldDescriptor {
    /// Size of a descriptor on disk
    pub const SIZE: usize = 32;

    /// Longest name that still leaves a NUL terminator
    pub const MAX_NAME_LEN: usize = 10;

    /// Parse descriptor number `index` from its 32 bytes
    pub fn from_bytes(index: usize, data: &[u8]) -> DbfResult<Self> {
        if data.len() < Self::SIZE {
            return Err(DbfError::MalformedFieldDescriptor {
                field: format!("#{}", index),
                reason: format!("need {} bytes, found {}", Self::SIZE, data.len()),
            });
        }

        let mut name = [0u8; 11];
        name.copy_from_slice(&data[0..11]);
        let mut displacement = [0u8; 4];
        displacement.copy_from_slice(&data[12..16]);
        let mut reserved = [0u8; 12];
        reserved[0..2].copy_from_slice(&data[18..20]);
        reserved[2..12].copy_from_slice(&data[21..31]);

        let descriptor = FieldDescriptor {
            name,
            field_type: FieldType::from_raw(data[11]),
            displacement,
            length: data[16],
            decimal_count: data[17],
            work_area_id: data[20],
            flags: data[31],
            reserved,
        };

        if descriptor.length == 0 {
            return Err(DbfError::MalformedFieldDescriptor {
                field: format!("#{}", index),
                reason: "zero field length".to_string(),
            });
        }

        Ok(descriptor)
    }

    /// Serialize to the 32-byte on-disk form
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..11].copy_from_slice(&self.name);
        buf[11] = self.field_type.as_raw();
        buf[12..16].copy_from_slice(&self.displacement);
        buf[16] = self.length;
        buf[17] = self.decimal_count;
        buf[18..20].copy_from_slice(&self.reserved[0..2]);
        buf[20] = self.work_area_id;
        buf[21..31].copy_from_slice(&self.reserved[2..12]);
        buf[31] = self.flags;
        buf
    }

    /// Create a descriptor for a new table
    pub fn new(name: &str, field_type: FieldType, length: u8, decimal_count: u8) -> DbfResult<Self> {
        let invalid = |reason: String| DbfError::MalformedFieldDescriptor {
            field: name.to_string(),
            reason,
        };

        if name.is_empty() || name.len() > Self::MAX_NAME_LEN {
            return Err(invalid(format!(
                "name must be 1-{} bytes",
                Self::MAX_NAME_LEN
            )));
        }
        if !name.is_ascii() || name.bytes().any(|b| b == 0) {
            return Err(invalid("name must be plain ASCII".to_string()));
        }
        if length == 0 {
            return Err(invalid("zero field length".to_string()));
        }
        if decimal_count >= length && decimal_count > 0 {
            return Err(invalid(format!(
                "{} decimals do not fit in width {}",
                decimal_count, length
            )));
        }

        let mut raw = [0u8; 11];
        raw[..name.len()].copy_from_slice(name.as_bytes());

        Ok(FieldDescriptor {
            name: raw,
            field_type,
            displacement: [0; 4],
            length,
            decimal_count,
            work_area_id: 0,
            flags: 0,
            reserved: [0; 12],
        })
    }

    /// Name bytes up to the first NUL
    pub fn raw_name(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        &self.name[..end]
    }
}
