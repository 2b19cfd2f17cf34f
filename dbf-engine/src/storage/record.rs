//! Fixed-width record encoding and decoding
//!
//! A stored record is one deletion-flag byte followed by every column's text,
//! left-packed and space-padded to the column width. Numbers are stored as
//! decimal text.

use bytes::{BufMut, Bytes, BytesMut};

use super::charset::TextCodec;
use super::header::EOF_MARKER;
use crate::error::{DbfError, DbfResult};
use crate::schema::{FieldValue, RecordSchema, SchemaBinding, SlotKind};

/// Deletion flag of a live record
pub const ACTIVE: u8 = b' ';

/// Deletion flag of a deleted record
pub const DELETED: u8 = b'*';

/// Padding byte for column text
pub const PAD: u8 = b' ';

/// Decimal places used for float slots whose column declares none
pub const DEFAULT_DECIMALS: usize = 2;

/// Strip leading and trailing ASCII whitespace
fn trim_blank(raw: &[u8]) -> &[u8] {
    let start = raw.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &raw[start..end]
}

fn parse_number(column: &str, kind: SlotKind, raw: &[u8]) -> DbfResult<FieldValue> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| FieldValue::parse(kind, text))
        .ok_or_else(|| DbfError::FieldParse {
            column: column.to_string(),
            raw_text: String::from_utf8_lossy(raw).into_owned(),
        })
}

/// Decode one record's field bytes (deletion flag already skipped)
///
/// Columns without a slot are skipped. Blank columns leave the slot at its
/// `Default` value.
pub fn decode_record<R: Default>(
    data: &[u8],
    binding: &SchemaBinding,
    schema: &RecordSchema<R>,
    codec: &dyn TextCodec,
) -> DbfResult<R> {
    let mut record = R::default();

    for column in binding.columns() {
        let Some(slot_index) = column.slot else {
            continue;
        };
        let slot = &schema.slots()[slot_index];

        let raw = data
            .get(column.offset..column.offset + column.length)
            .ok_or_else(|| {
                DbfError::MalformedHeader(format!(
                    "record of {} bytes is too short for column {}",
                    data.len(),
                    column.name
                ))
            })?;
        let raw = trim_blank(raw);
        if raw.is_empty() {
            continue;
        }

        let value = match slot.kind() {
            SlotKind::Text => FieldValue::Text(codec.decode(raw)),
            kind => parse_number(&column.name, kind, raw)?,
        };
        slot.set(&mut record, value);
    }

    Ok(record)
}

/// Encode a record as `record_length + 1` bytes: flag, columns, EOF marker
///
/// Every stored column must have a slot, since the whole row is written.
pub fn encode_record<R>(
    record: &R,
    binding: &SchemaBinding,
    schema: &RecordSchema<R>,
    codec: &dyn TextCodec,
    record_length: u16,
) -> DbfResult<Bytes> {
    let mut buf = BytesMut::with_capacity(record_length as usize + 1);
    buf.put_u8(ACTIVE);

    for column in binding.columns() {
        let slot_index = column
            .slot
            .ok_or_else(|| DbfError::UnresolvedColumn(column.name.clone()))?;

        let text = match schema.slots()[slot_index].get(record) {
            FieldValue::Text(s) => codec.encode(&s),
            FieldValue::Int(n) => n.to_string().into_bytes(),
            FieldValue::UInt(n) => n.to_string().into_bytes(),
            FieldValue::Float(n) => {
                let places = match column.decimal_count {
                    0 => DEFAULT_DECIMALS,
                    d => d as usize,
                };
                format!("{:.*}", places, n).into_bytes()
            }
        };

        // Truncate to the column width, pad the rest
        let used = text.len().min(column.length);
        buf.put_slice(&text[..used]);
        buf.put_bytes(PAD, column.length - used);
    }

    buf.put_u8(EOF_MARKER);
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::charset::Charset;
    use crate::storage::field::{FieldDescriptor, FieldType};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Order {
        name: String,
        qty: i64,
        price: f64,
        lot: u64,
    }

    fn order_schema() -> RecordSchema<Order> {
        RecordSchema::new()
            .text("NAME", |o: &Order| o.name.as_str(), |o, v| o.name = v)
            .int("QTY", |o: &Order| o.qty, |o, v| o.qty = v)
            .float("PRICE", |o: &Order| o.price, |o, v| o.price = v)
            .uint("LOT", |o: &Order| o.lot, |o, v| o.lot = v)
    }

    /// Build field bytes from (text, width) pairs
    fn row(parts: &[(&str, usize)]) -> Vec<u8> {
        let mut data = Vec::new();
        for (text, width) in parts {
            data.extend_from_slice(format!("{:<width$}", text, width = *width).as_bytes());
        }
        data
    }

    fn binding(schema: &RecordSchema<Order>) -> (SchemaBinding, u16) {
        let fields = vec![
            FieldDescriptor::new("NAME", FieldType::Character, 6, 0).unwrap(),
            FieldDescriptor::new("QTY", FieldType::Numeric, 4, 0).unwrap(),
            FieldDescriptor::new("PRICE", FieldType::Numeric, 8, 3).unwrap(),
            FieldDescriptor::new("LOT", FieldType::Numeric, 5, 0).unwrap(),
        ];
        let columns: Vec<String> = ["NAME", "QTY", "PRICE", "LOT"].iter().map(|s| s.to_string()).collect();
        (SchemaBinding::bind(schema, &columns, &fields), 1 + 6 + 4 + 8 + 5)
    }

    #[test]
    fn test_encode_layout() {
        let schema = order_schema();
        let (binding, record_length) = binding(&schema);
        let order = Order {
            name: "AB".into(),
            qty: 7,
            price: 2.5,
            lot: 42,
        };

        let buf = encode_record(&order, &binding, &schema, &Charset::utf8(), record_length).unwrap();
        assert_eq!(buf.len(), record_length as usize + 1);
        assert_eq!(&buf[..], b" AB    7   2.500   42   \x1A");
    }

    #[test]
    fn test_encode_truncates_and_defaults_decimals() {
        let schema = RecordSchema::new().float("P", |o: &Order| o.price, |o, v| o.price = v);
        let fields = vec![FieldDescriptor::new("P", FieldType::Float, 4, 0).unwrap()];
        let binding = SchemaBinding::bind(&schema, &["P".to_string()], &fields);
        let order = Order {
            price: 123.456,
            ..Default::default()
        };

        let buf = encode_record(&order, &binding, &schema, &Charset::utf8(), 5).unwrap();
        // "123.46" cut to the 4-byte column
        assert_eq!(&buf[..], b" 123.\x1A");
    }

    #[test]
    fn test_decode_roundtrip() {
        let schema = order_schema();
        let (binding, record_length) = binding(&schema);
        let order = Order {
            name: "Zoë".into(),
            qty: -12,
            price: 19.125,
            lot: 99999,
        };

        let buf = encode_record(&order, &binding, &schema, &Charset::utf8(), record_length).unwrap();
        let decoded: Order =
            decode_record(&buf[1..record_length as usize], &binding, &schema, &Charset::utf8()).unwrap();
        assert_eq!(decoded, order);
    }

    #[test]
    fn test_blank_fields_stay_default() {
        let schema = order_schema();
        let (binding, _) = binding(&schema);
        let data = row(&[("XY", 6), ("", 4), ("  ", 8), ("", 5)]);

        let decoded: Order = decode_record(&data, &binding, &schema, &Charset::utf8()).unwrap();
        assert_eq!(decoded.name, "XY");
        assert_eq!(decoded.qty, 0);
        assert_eq!(decoded.price, 0.0);
        assert_eq!(decoded.lot, 0);
    }

    #[test]
    fn test_parse_error_names_column() {
        let schema = order_schema();
        let (binding, _) = binding(&schema);
        let data = row(&[("XY", 6), ("1x2", 4), ("", 8), ("", 5)]);

        let err = decode_record::<Order>(&data, &binding, &schema, &Charset::utf8()).unwrap_err();
        match err {
            DbfError::FieldParse { column, raw_text } => {
                assert_eq!(column, "QTY");
                assert_eq!(raw_text, "1x2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unbound_columns() {
        let schema = RecordSchema::new().text("NAME", |o: &Order| o.name.as_str(), |o, v| o.name = v);
        let (binding, record_length) = binding(&order_schema());
        // rebind with the narrower schema
        let binding = SchemaBinding::bind(
            &schema,
            &binding.columns().iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
            &[
                FieldDescriptor::new("NAME", FieldType::Character, 6, 0).unwrap(),
                FieldDescriptor::new("QTY", FieldType::Numeric, 4, 0).unwrap(),
                FieldDescriptor::new("PRICE", FieldType::Numeric, 8, 3).unwrap(),
                FieldDescriptor::new("LOT", FieldType::Numeric, 5, 0).unwrap(),
            ],
        );

        // decode skips columns the schema lacks, even unparsable ones
        let data = row(&[("AB", 6), ("zz", 4), ("garbage", 8), ("  q", 5)]);
        let decoded: Order = decode_record(&data, &binding, &schema, &Charset::utf8()).unwrap();
        assert_eq!(decoded.name, "AB");

        // encode needs every column
        let err = encode_record(&decoded, &binding, &schema, &Charset::utf8(), record_length).unwrap_err();
        assert!(matches!(err, DbfError::UnresolvedColumn(ref c) if c == "QTY"));
    }

    #[test]
    fn test_trim_blank() {
        assert_eq!(trim_blank(b"  ab c \t"), b"ab c");
        assert_eq!(trim_blank(b"    "), b"");
        assert_eq!(trim_blank(b""), b"");
    }
}
