//! Whole-table scenarios against real files

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use dbf_engine::{
    AppendStep, Charset, DbfError, DiskFile, DynamicRecord, FieldDescriptor, FieldType, FieldValue, Fingerprint,
    RecordSchema, Table, TableFile, TableHeader,
};
use tempfile::tempdir;

#[derive(Debug, Default, Clone, PartialEq)]
struct Stock {
    name: String,
    qty: i64,
}

fn stock_schema() -> RecordSchema<Stock> {
    RecordSchema::new()
        .text("NAME", |s: &Stock| s.name.as_str(), |s, v| s.name = v)
        .int("QTY", |s: &Stock| s.qty, |s, v| s.qty = v)
}

fn stock_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("NAME", FieldType::Character, 10, 0).unwrap(),
        FieldDescriptor::new("QTY", FieldType::Numeric, 10, 0).unwrap(),
    ]
}

fn stock(name: &str, qty: i64) -> Stock {
    Stock {
        name: name.to_string(),
        qty,
    }
}

/// A disk file that lets a test act between fingerprints or fail writes
struct Interfering {
    inner: DiskFile,
    path: PathBuf,
    hashes: AtomicUsize,
    /// Fingerprint call that sees the file modified externally
    tamper_on: usize,
    /// Write offset that fails once
    fail_write_at: Option<u64>,
}

impl Interfering {
    fn open(path: &Path) -> Self {
        Interfering {
            inner: DiskFile::open(path).unwrap(),
            path: path.to_path_buf(),
            hashes: AtomicUsize::new(0),
            tamper_on: usize::MAX,
            fail_write_at: None,
        }
    }
}

impl TableFile for Interfering {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.inner.read_exact_at(buf, offset)
    }

    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        if self.fail_write_at == Some(offset) {
            self.fail_write_at = None;
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.inner.write_all_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        self.inner.size()
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.inner.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.inner.sync()
    }

    fn fingerprint(&self) -> io::Result<Fingerprint> {
        let n = self.hashes.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.tamper_on {
            // Another process bumps a reserved header byte
            let mut bytes = std::fs::read(&self.path)?;
            bytes[20] = bytes[20].wrapping_add(1);
            std::fs::write(&self.path, bytes)?;
        }
        self.inner.fingerprint()
    }

    fn reopen(&mut self) -> io::Result<()> {
        self.inner.reopen()
    }
}

#[test]
fn test_append_then_concurrent_modification() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stock.dbf");
    Table::create(&path, &stock_fields(), Charset::utf8(), stock_schema())
        .unwrap()
        .close()
        .unwrap();

    let mut file = Interfering::open(&path);
    // Calls 1 and 2 belong to the first append; 4 is the second append's re-check
    file.tamper_on = 4;
    let table = Table::open_with(Box::new(file), Charset::utf8(), stock_schema()).unwrap();

    let header = table.header();
    assert_eq!(header.header_length, 97);
    assert_eq!(header.record_length, 21);
    assert_eq!(header.num_records, 0);

    table.append(&stock("AB", 7)).unwrap();
    assert_eq!(table.record_count(), 1);
    assert_eq!(table.get(0).unwrap(), stock("AB", 7));

    let before = std::fs::read(&path).unwrap();
    let err = table.append(&stock("CD", 9)).unwrap_err();
    assert!(matches!(err, DbfError::ConcurrentModification));
    assert_eq!(table.record_count(), 1);

    // Only the outside change is on disk
    let after = std::fs::read(&path).unwrap();
    assert_eq!(after.len(), before.len());
    let diffs: Vec<usize> = (0..after.len()).filter(|&i| after[i] != before[i]).collect();
    assert_eq!(diffs, vec![20]);
    assert_eq!(table.header().reserved[8], after[20]);
}

#[test]
fn test_two_handles_keep_each_others_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stock.dbf");
    Table::create(&path, &stock_fields(), Charset::utf8(), stock_schema())
        .unwrap()
        .close()
        .unwrap();

    let first = Table::open(&path, Charset::utf8(), stock_schema()).unwrap();
    let second = Table::open(&path, Charset::utf8(), stock_schema()).unwrap();

    second.append(&stock("fromB", 2)).unwrap();
    let written = std::fs::read(&path).unwrap();

    // The first handle still believes the table is empty
    let err = first.append(&stock("fromA", 1)).unwrap_err();
    assert!(matches!(err, DbfError::ConcurrentModification));
    assert!(err.kind().is_retryable());
    assert_eq!(std::fs::read(&path).unwrap(), written);
    assert_eq!(first.record_count(), 1);

    first.append(&stock("fromA", 1)).unwrap();
    second.reload().unwrap();
    let expected = vec![stock("fromB", 2), stock("fromA", 1)];
    assert_eq!(first.get_range(0, 2, 1).unwrap(), expected);
    assert_eq!(second.get_range(0, 2, 2).unwrap(), expected);

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 97 + 2 * 21 + 1);
    assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
}

#[test]
fn test_readers_never_see_torn_records() {
    const APPENDS: i64 = 200;

    let dir = tempdir().unwrap();
    let path = dir.path().join("stock.dbf");
    let table = Table::create(&path, &stock_fields(), Charset::utf8(), stock_schema()).unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..APPENDS {
                table.append(&stock(&format!("item{}", i), i)).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        for workers in 1..=4 {
            let table = &table;
            let done = &done;
            s.spawn(move || {
                loop {
                    let finished = done.load(Ordering::SeqCst);
                    let count = table.record_count();
                    let rows = table.get_range(0, count, workers).unwrap();
                    assert_eq!(rows.len(), count as usize);
                    for (i, row) in rows.iter().enumerate() {
                        assert_eq!(*row, stock(&format!("item{}", i), i as i64));
                    }
                    if finished {
                        break;
                    }
                }
            });
        }
    });

    assert_eq!(table.record_count(), APPENDS as u32);
    assert_eq!(table.get(199).unwrap(), stock("item199", 199));
}

#[test]
fn test_batch_read_is_worker_independent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stock.dbf");
    let table = Table::create(&path, &stock_fields(), Charset::utf8(), stock_schema()).unwrap();
    for i in 0..100 {
        table.append(&stock(&format!("item{}", i), i * i - 50)).unwrap();
    }

    let sequential = table.get_range(0, 100, 1).unwrap();
    assert_eq!(sequential[10], stock("item10", 50));
    for workers in [2, 8] {
        assert_eq!(table.get_range(0, 100, workers).unwrap(), sequential);
    }
}

#[test]
fn test_record_offsets() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stock.dbf");
    let table = Table::create(&path, &stock_fields(), Charset::utf8(), stock_schema()).unwrap();
    let names = ["alpha", "beta", "gamma", "delta"];
    for (i, name) in names.iter().enumerate() {
        table.append(&stock(name, i as i64)).unwrap();
    }

    let bytes = std::fs::read(&path).unwrap();
    let header = TableHeader::from_bytes(&bytes).unwrap();
    assert_eq!(header.num_records, 4);
    assert_eq!(bytes.len() as u64, header.data_end() + 1);
    assert_eq!(bytes[bytes.len() - 1], 0x1A);

    for (i, name) in names.iter().enumerate() {
        let start = (header.header_length + header.record_length * i as u16) as usize;
        let end = start + header.record_length as usize;
        let expected = format!(" {:<10}{:<10}", name, i);
        assert_eq!(&bytes[start..end], expected.as_bytes());
    }
}

#[test]
fn test_rollback_restores_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stock.dbf");
    let table = Table::create(&path, &stock_fields(), Charset::utf8(), stock_schema()).unwrap();
    table.append(&stock("keep", 1)).unwrap();
    table.close().unwrap();
    let pristine = std::fs::read(&path).unwrap();

    for (offset, step) in [(4u64, AppendStep::RecordCount), (1, AppendStep::LastUpdate)] {
        let mut file = Interfering::open(&path);
        file.fail_write_at = Some(offset);
        let table = Table::open_with(Box::new(file), Charset::utf8(), stock_schema()).unwrap();

        let err = table.append(&stock("lost", 2)).unwrap_err();
        match &err {
            DbfError::AppendFailed {
                step: failed,
                rollback,
                ..
            } => {
                assert_eq!(*failed, step);
                assert!(rollback.is_clean(), "{rollback}");
            }
            other => panic!("unexpected error: {other}"),
        }

        let restored = std::fs::read(&path).unwrap();
        assert_eq!(restored.len(), pristine.len());
        assert_eq!(&restored[1..8], &pristine[1..8]);
        assert_eq!(restored, pristine);
        assert_eq!(table.record_count(), 1);
    }
}

#[test]
fn test_dynamic_records_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("prices.dbf");
    let fields = vec![
        FieldDescriptor::new("SKU", FieldType::Character, 6, 0).unwrap(),
        FieldDescriptor::new("PRICE", FieldType::Numeric, 9, 2).unwrap(),
    ];
    let columns = ["SKU".to_string(), "PRICE".to_string()];
    let schema = RecordSchema::<DynamicRecord>::from_layout(&columns, &fields);
    Table::create(&path, &fields, Charset::latin1(), schema)
        .unwrap()
        .close()
        .unwrap();

    let table = Table::open_dynamic(&path, Charset::latin1()).unwrap();
    let mut record = DynamicRecord::new();
    record.set("sku", FieldValue::Text("café".into()));
    record.set("price", FieldValue::Float(12.5));
    table.append(&record).unwrap();

    let back = table.get(0).unwrap();
    assert_eq!(back.get("SKU"), Some(&FieldValue::Text("café".into())));
    assert_eq!(back.get("PRICE"), Some(&FieldValue::Float(12.5)));

    // Latin-1 keeps "é" to a single byte
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[98..104], b"caf\xE9  ");
}
