//! Store handle - owns the open table file and its parsed layout
//!
//! All table state lives in one [`TableState`] behind a reader/writer lock:
//! reads share it, appends and reloads take it exclusively.

use chrono::Local;
use parking_lot::RwLock;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{DbfError, DbfResult};
use crate::file_manager::{DiskFile, TableFile};
use crate::schema::{DynamicRecord, RecordSchema, SchemaBinding};
use crate::storage::charset::TextCodec;
use crate::storage::field::FieldDescriptor;
use crate::storage::header::{TableHeader, HEADER_SIZE};
use crate::storage::record::decode_record;

/// Header, descriptors and column names as read from a file
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    pub(crate) header: TableHeader,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) columns: Vec<String>,
}

impl Layout {
    /// Parse and validate the header and descriptor table
    pub(crate) fn read(file: &dyn TableFile, codec: &dyn TextCodec) -> DbfResult<Self> {
        let size = file.size()?;
        if size < HEADER_SIZE as u64 {
            return Err(DbfError::MalformedHeader(format!(
                "file is {} bytes, header needs {}",
                size, HEADER_SIZE
            )));
        }

        let mut raw = [0u8; HEADER_SIZE];
        file.read_exact_at(&mut raw, 0)?;
        let header = TableHeader::from_bytes(&raw)?;

        let count = header.field_count();
        let wanted = count * FieldDescriptor::SIZE;
        let available = (size - HEADER_SIZE as u64).min(wanted as u64) as usize;
        let mut table = vec![0u8; available];
        file.read_exact_at(&mut table, HEADER_SIZE as u64)?;

        let fields = (0..count)
            .map(|i| {
                let start = i * FieldDescriptor::SIZE;
                let end = (start + FieldDescriptor::SIZE).min(available);
                FieldDescriptor::from_bytes(i, table.get(start..end).unwrap_or(&[]))
            })
            .collect::<DbfResult<Vec<_>>>()?;

        let mut columns: Vec<String> = Vec::with_capacity(count);
        for field in &fields {
            let name = codec.decode(field.raw_name()).trim().to_string();
            if columns.iter().any(|c| c.eq_ignore_ascii_case(&name)) {
                return Err(DbfError::MalformedFieldDescriptor {
                    field: name,
                    reason: "duplicate column name".to_string(),
                });
            }
            columns.push(name);
        }

        header.validate(&fields, size)?;

        debug!(
            "Table layout: version=0x{:02X} header_length={} record_length={} fields={} records={}",
            header.version, header.header_length, header.record_length, count, header.num_records
        );

        Ok(Layout {
            header,
            fields,
            columns,
        })
    }
}

/// Everything guarded by the table lock
pub(crate) struct TableState {
    pub(crate) file: Box<dyn TableFile>,
    pub(crate) header: TableHeader,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) columns: Vec<String>,
    pub(crate) binding: SchemaBinding,
}

impl TableState {
    fn new<R>(file: Box<dyn TableFile>, layout: Layout, schema: &RecordSchema<R>) -> Self {
        let binding = SchemaBinding::bind(schema, &layout.columns, &layout.fields);
        TableState {
            file,
            header: layout.header,
            fields: layout.fields,
            columns: layout.columns,
            binding,
        }
    }

    /// Read and decode one record; the caller has checked the index
    pub(crate) fn read_record<R: Default>(
        &self,
        index: u32,
        schema: &RecordSchema<R>,
        codec: &dyn TextCodec,
    ) -> DbfResult<R> {
        let mut data = vec![0u8; self.header.record_length as usize - 1];
        self.file
            .read_exact_at(&mut data, self.header.record_offset(index) + 1)?;
        decode_record(&data, &self.binding, schema, codec)
    }

    /// Reopen the file and replace the cached layout
    ///
    /// Fails with `MalformedHeader` if the record geometry changed. The cached
    /// layout is left as it was on any failure.
    pub(crate) fn reload<R>(&mut self, schema: &RecordSchema<R>, codec: &dyn TextCodec) -> DbfResult<()> {
        self.file.reopen()?;
        let layout = Layout::read(self.file.as_ref(), codec)?;

        if layout.header.header_length != self.header.header_length
            || layout.header.record_length != self.header.record_length
        {
            return Err(DbfError::MalformedHeader(format!(
                "table geometry changed from {}/{} to {}/{} (header/record length)",
                self.header.header_length,
                self.header.record_length,
                layout.header.header_length,
                layout.header.record_length
            )));
        }

        info!(
            "Reloaded table header: {} -> {} records",
            self.header.num_records, layout.header.num_records
        );

        self.binding = SchemaBinding::bind(schema, &layout.columns, &layout.fields);
        self.header = layout.header;
        self.fields = layout.fields;
        self.columns = layout.columns;
        Ok(())
    }
}

/// An open table of records of type `R`
pub struct Table<R> {
    pub(crate) state: RwLock<TableState>,
    pub(crate) schema: RecordSchema<R>,
    pub(crate) codec: Box<dyn TextCodec>,
}

impl<R> fmt::Debug for Table<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Table")
            .field("header", &state.header)
            .field("columns", &state.columns)
            .finish_non_exhaustive()
    }
}

impl<R> Table<R> {
    /// Open an existing table file
    pub fn open<C>(path: impl AsRef<Path>, codec: C, schema: RecordSchema<R>) -> DbfResult<Self>
    where
        C: TextCodec + 'static,
    {
        let path = path.as_ref();
        let table = Self::open_with(Box::new(DiskFile::open(path)?), codec, schema)?;
        info!(
            "Opened table {} ({} records)",
            path.display(),
            table.record_count()
        );
        Ok(table)
    }

    /// Open a table over any [`TableFile`]
    pub fn open_with<C>(file: Box<dyn TableFile>, codec: C, schema: RecordSchema<R>) -> DbfResult<Self>
    where
        C: TextCodec + 'static,
    {
        let layout = Layout::read(file.as_ref(), &codec)?;
        Ok(Self::from_parts(file, layout, Box::new(codec), schema))
    }

    /// Create a new, empty table file and open it
    pub fn create<C>(
        path: impl AsRef<Path>,
        fields: &[FieldDescriptor],
        codec: C,
        schema: RecordSchema<R>,
    ) -> DbfResult<Self>
    where
        C: TextCodec + 'static,
    {
        let path = path.as_ref();
        let header = TableHeader::new(fields, Local::now().date_naive())?;
        let file = DiskFile::create(path, &header, fields)?;
        info!("Created table {} with {} fields", path.display(), fields.len());
        Self::open_with(Box::new(file), codec, schema)
    }

    fn from_parts(
        file: Box<dyn TableFile>,
        layout: Layout,
        codec: Box<dyn TextCodec>,
        schema: RecordSchema<R>,
    ) -> Self {
        let state = TableState::new(file, layout, &schema);
        for column in state.binding.unbound_columns() {
            debug!("Column {} has no slot in the record schema", column);
        }
        Table {
            state: RwLock::new(state),
            schema,
            codec,
        }
    }

    /// Flush and close the file
    pub fn close(self) -> DbfResult<()> {
        let mut state = self.state.into_inner();
        state.file.sync()?;
        Ok(())
    }

    pub fn record_count(&self) -> u32 {
        self.state.read().header.num_records
    }

    /// Snapshot of the cached header
    pub fn header(&self) -> TableHeader {
        self.state.read().header.clone()
    }

    /// Column names in on-disk order
    pub fn columns(&self) -> Vec<String> {
        self.state.read().columns.clone()
    }

    pub fn fields(&self) -> Vec<FieldDescriptor> {
        self.state.read().fields.clone()
    }

    pub fn schema(&self) -> &RecordSchema<R> {
        &self.schema
    }

    /// Reopen the file and re-parse its header, discarding cached state
    pub fn reload(&self) -> DbfResult<()> {
        let mut state = self.state.write();
        state.reload(&self.schema, self.codec.as_ref())
    }
}

impl<R: Default> Table<R> {
    /// Fetch one record by index
    pub fn get(&self, index: u32) -> DbfResult<R> {
        let state = self.state.read();
        if index >= state.header.num_records {
            return Err(DbfError::OutOfRange(format!(
                "record {} of {}",
                index, state.header.num_records
            )));
        }
        state.read_record(index, &self.schema, self.codec.as_ref())
    }
}

impl Table<DynamicRecord> {
    /// Open a table with a schema derived from its own descriptors
    pub fn open_dynamic<C>(path: impl AsRef<Path>, codec: C) -> DbfResult<Self>
    where
        C: TextCodec + 'static,
    {
        let path = path.as_ref();
        let file: Box<dyn TableFile> = Box::new(DiskFile::open(path)?);
        let layout = Layout::read(file.as_ref(), &codec)?;
        let schema = RecordSchema::<DynamicRecord>::from_layout(&layout.columns, &layout.fields);
        info!(
            "Opened table {} ({} records, {} columns)",
            path.display(),
            layout.header.num_records,
            layout.columns.len()
        );
        Ok(Self::from_parts(file, layout, Box::new(codec), schema))
    }
}
