//! Debug tool to inspect a table file's raw layout

use std::path::Path;
use dbf_engine::file_manager::{DiskFile, TableFile};
use dbf_engine::storage::header::{TableHeader, HEADER_SIZE};
use dbf_engine::storage::record::{ACTIVE, DELETED};
use dbf_engine::storage::FieldDescriptor;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        println!("Usage: debug_table <dbf_file> [record]");
        return Ok(());
    }

    let file = DiskFile::open(Path::new(&args[1]))?;
    println!("=== Inspecting {} ===\n", file.path().display());

    let size = file.size()?;

    let mut raw = [0u8; HEADER_SIZE];
    file.read_exact_at(&mut raw, 0)?;
    let header = TableHeader::from_bytes(&raw)?;

    println!("Header:");
    println!("  Version: 0x{:02X}", header.version);
    println!("  Last update: {:?}", header.last_update.to_date());
    println!("  Num records: {}", header.num_records);
    println!("  Header length: {}", header.header_length);
    println!("  Record length: {}", header.record_length);
    println!("  Flags: {:?}", header.table_flags());
    println!("  Language driver: 0x{:02X}", header.language_driver());
    println!("  File size: {} (data ends at {})", size, header.data_end());

    println!("\nFields:");
    for i in 0..header.field_count() {
        let mut raw = [0u8; FieldDescriptor::SIZE];
        file.read_exact_at(&mut raw, (HEADER_SIZE + i * FieldDescriptor::SIZE) as u64)?;
        let field = FieldDescriptor::from_bytes(i, &raw)?;
        println!(
            "  {:2}: {:<10} {} len={} dec={}",
            i,
            String::from_utf8_lossy(field.raw_name()),
            field.field_type,
            field.length,
            field.decimal_count
        );
    }

    if let Some(index) = args.get(2).and_then(|s| s.parse::<u32>().ok()) {
        let mut record = vec![0u8; header.record_length as usize];
        file.read_exact_at(&mut record, header.record_offset(index))?;
        println!("\nRecord {} at 0x{:08X}:", index, header.record_offset(index));
        match record.first() {
            Some(&ACTIVE) => println!("  Flag: active"),
            Some(&DELETED) => println!("  Flag: deleted"),
            Some(&flag) => println!("  Flag: unknown 0x{:02X}", flag),
            None => println!("  Empty record (record length is 0)"),
        }
        println!("  Bytes: {:02x?}", record.get(1..).unwrap_or_default());
    }

    let mut last = [0u8; 1];
    file.read_exact_at(&mut last, size.saturating_sub(1))?;
    println!("\nLast byte: 0x{:02X}", last[0]);

    Ok(())
}
