//! Command implementations
//!
//! Every command works on tables through the dynamic schema, so any table
//! can be inspected or extended without a compiled record type.

use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, warn};

use dbf_engine::{
    Charset, DynamicRecord, FieldDescriptor, FieldType, FieldValue, RecordSchema, Table,
};

/// Parse a `NAME:TYPE:LEN[:DEC]` column definition
pub fn parse_field_spec(spec: &str) -> Result<FieldDescriptor> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() < 3 || parts.len() > 4 {
        bail!("field {:?} is not NAME:TYPE:LEN[:DEC]", spec);
    }

    let type_code = match parts[1].as_bytes() {
        [code] => code.to_ascii_uppercase(),
        _ => bail!("field type {:?} must be a single letter", parts[1]),
    };
    let length: u8 = parts[2]
        .parse()
        .with_context(|| format!("field length {:?}", parts[2]))?;
    let decimals: u8 = match parts.get(3) {
        Some(d) => d.parse().with_context(|| format!("decimal count {:?}", d))?,
        None => 0,
    };

    Ok(FieldDescriptor::new(
        parts[0],
        FieldType::from_raw(type_code),
        length,
        decimals,
    )?)
}

/// Parse `COLUMN=VALUE` pairs into a record for the table's schema
pub fn parse_assignments(
    schema: &RecordSchema<DynamicRecord>,
    assignments: &[String],
) -> Result<DynamicRecord> {
    let mut record = DynamicRecord::new();
    for assignment in assignments {
        let (column, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("expected COLUMN=VALUE, got {:?}", assignment))?;
        let index = schema
            .find(column)
            .ok_or_else(|| anyhow!("table has no column {:?}", column))?;
        let slot = &schema.slots()[index];
        let value = FieldValue::parse(slot.kind(), value)
            .ok_or_else(|| anyhow!("{:?} is not a valid value for column {}", value, slot.column()))?;
        record.set(slot.column(), value);
    }
    Ok(record)
}

/// Print the header and column layout
pub fn info(path: &Path, charset: Charset, out: &mut dyn Write) -> Result<()> {
    let table = Table::open_dynamic(path, charset)?;
    let header = table.header();

    writeln!(out, "Table: {}", path.display())?;
    writeln!(out, "  Version: 0x{:02X}", header.version)?;
    match header.last_update.to_date() {
        Some(date) => writeln!(out, "  Last update: {}", date)?,
        None => writeln!(out, "  Last update: invalid {:?}", header.last_update.to_bytes())?,
    }
    writeln!(out, "  Records: {}", header.num_records)?;
    writeln!(out, "  Header length: {}", header.header_length)?;
    writeln!(out, "  Record length: {}", header.record_length)?;
    writeln!(out, "  Flags: {:?}", header.table_flags())?;
    if header.incomplete_transaction() {
        writeln!(out, "  Incomplete transaction flag set")?;
    }
    if header.encrypted() {
        writeln!(out, "  Encrypted")?;
    }
    writeln!(out, "  Language driver: 0x{:02X}", header.language_driver())?;

    writeln!(out, "Columns:")?;
    for (name, field) in table.columns().iter().zip(table.fields()) {
        writeln!(
            out,
            "  {:<10} {} {:>3} {:>2}",
            name, field.field_type, field.length, field.decimal_count
        )?;
    }
    Ok(())
}

/// Print records `start..end`, one per line, columns separated by `|`
pub fn dump(
    path: &Path,
    charset: Charset,
    start: Option<u32>,
    end: Option<u32>,
    workers: usize,
    out: &mut dyn Write,
) -> Result<()> {
    let table = Table::open_dynamic(path, charset)?;
    let start = start.unwrap_or(0);
    let end = end.unwrap_or_else(|| table.record_count());
    let columns = table.columns();

    let records = table.get_range(start, end, workers)?;
    writeln!(out, "#|{}", columns.join("|"))?;
    for (offset, record) in records.iter().enumerate() {
        let values: Vec<String> = columns
            .iter()
            .map(|c| record.get(c).map(|v| v.to_string()).unwrap_or_default())
            .collect();
        writeln!(out, "{}|{}", start as usize + offset, values.join("|"))?;
    }
    Ok(())
}

/// Create an empty table from column definitions
pub fn create(path: &Path, charset: Charset, specs: &[String]) -> Result<()> {
    let fields = specs
        .iter()
        .map(|s| parse_field_spec(s))
        .collect::<Result<Vec<_>>>()?;
    let names: Vec<String> = fields
        .iter()
        .map(|f| String::from_utf8_lossy(f.raw_name()).into_owned())
        .collect();

    let schema = RecordSchema::<DynamicRecord>::from_layout(&names, &fields);
    Table::create(path, &fields, charset, schema)?.close()?;
    Ok(())
}

/// Append one record, retrying on concurrent modification
pub fn append(path: &Path, charset: Charset, assignments: &[String], retries: u32) -> Result<()> {
    let table = Table::open_dynamic(path, charset)?;
    let record = parse_assignments(table.schema(), assignments)?;

    let mut attempt = 0;
    loop {
        match table.append(&record) {
            Ok(()) => break,
            Err(e) if e.kind().is_retryable() && attempt < retries => {
                attempt += 1;
                warn!("{}; retrying ({}/{})", e, attempt, retries);
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("Table now holds {} records", table.record_count());
    table.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn specs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_field_spec() {
        let field = parse_field_spec("price:n:9:2").unwrap();
        assert_eq!(field.raw_name(), b"price");
        assert_eq!(field.field_type, FieldType::Numeric);
        assert_eq!((field.length, field.decimal_count), (9, 2));

        assert!(parse_field_spec("NAME:C").is_err());
        assert!(parse_field_spec("NAME:CC:10").is_err());
        assert!(parse_field_spec("NAME:C:0").is_err());
        assert!(parse_field_spec("NAME:C:300").is_err());
        assert!(parse_field_spec("WAYTOOLONGNAME:C:5").is_err());
    }

    #[test]
    fn test_create_append_dump() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.dbf");

        create(&path, Charset::utf8(), &specs(&["NAME:C:8", "AGE:N:3", "SCORE:N:6:1"])).unwrap();
        append(&path, Charset::utf8(), &specs(&["name=Ann", "AGE=41", "score=9.5"]), 0).unwrap();
        append(&path, Charset::utf8(), &specs(&["NAME=Bo"]), 0).unwrap();

        let mut out = Vec::new();
        dump(&path, Charset::utf8(), None, None, 2, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        // Unset numeric columns are written as zero
        assert_eq!(text, "#|NAME|AGE|SCORE\n0|Ann|41|9.5\n1|Bo|0|0\n");

        let mut out = Vec::new();
        dump(&path, Charset::utf8(), Some(1), Some(2), 1, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "#|NAME|AGE|SCORE\n1|Bo|0|0\n");
    }

    #[test]
    fn test_gbk_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.dbf");
        let gbk: Charset = "gbk".parse().unwrap();

        create(&path, gbk, &specs(&["MEMO:C:8", "QTY:N:4"])).unwrap();
        append(&path, gbk, &specs(&["MEMO=委托", "QTY=3"]), 0).unwrap();

        let mut out = Vec::new();
        dump(&path, gbk, None, None, 1, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "#|MEMO|QTY\n0|委托|3\n");

        // Two bytes per character on disk
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[97..106], b" \xCE\xAF\xCD\xD0    ");
    }

    #[test]
    fn test_append_rejects_bad_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dbf");
        create(&path, Charset::utf8(), &specs(&["NAME:C:8", "AGE:N:3"])).unwrap();

        assert!(append(&path, Charset::utf8(), &specs(&["HEIGHT=3"]), 0).is_err());
        assert!(append(&path, Charset::utf8(), &specs(&["AGE=old"]), 0).is_err());
        assert!(append(&path, Charset::utf8(), &specs(&["AGE"]), 0).is_err());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 32 + 64 + 2);
    }

    #[test]
    fn test_info() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dbf");
        create(&path, Charset::utf8(), &specs(&["CODE:C:4"])).unwrap();

        let mut out = Vec::new();
        info(&path, Charset::utf8(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Records: 0"));
        assert!(text.contains("Header length: 65"));
        assert!(text.contains("Record length: 5"));
        assert!(text.contains("CODE"));
    }
}
