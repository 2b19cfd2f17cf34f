//! Record schema and its binding to a table's columns
//!
//! A [`RecordSchema`] is the caller's description of a record type: an
//! ordered list of (column name, typed accessor) pairs. When a table is
//! opened the schema is matched against the stored columns once, producing a
//! [`SchemaBinding`] that the record codec walks for every read and append.

use std::fmt;

use crate::storage::field::{FieldDescriptor, FieldType};

/// A single typed column value moving between a record and the codec
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl FieldValue {
    pub fn kind(&self) -> SlotKind {
        match self {
            FieldValue::Text(_) => SlotKind::Text,
            FieldValue::Int(_) => SlotKind::Int,
            FieldValue::UInt(_) => SlotKind::UInt,
            FieldValue::Float(_) => SlotKind::Float,
        }
    }

    /// Parse user-supplied text as a value of the given kind
    pub fn parse(kind: SlotKind, text: &str) -> Option<FieldValue> {
        match kind {
            SlotKind::Text => Some(FieldValue::Text(text.to_string())),
            SlotKind::Int => text.trim().parse().ok().map(FieldValue::Int),
            SlotKind::UInt => text.trim().parse().ok().map(FieldValue::UInt),
            SlotKind::Float => text.trim().parse().ok().map(FieldValue::Float),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Int(n) => write!(f, "{}", n),
            FieldValue::UInt(n) => write!(f, "{}", n),
            FieldValue::Float(n) => write!(f, "{}", n),
        }
    }
}

/// Semantic type of a record slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Text,
    Int,
    UInt,
    Float,
}

impl SlotKind {
    /// Natural slot kind for a stored column
    pub fn for_field(field: &FieldDescriptor) -> Self {
        match field.field_type {
            FieldType::Numeric if field.decimal_count == 0 => SlotKind::Int,
            FieldType::Numeric | FieldType::Float => SlotKind::Float,
            _ => SlotKind::Text,
        }
    }

    /// Value a fresh record holds in a slot of this kind
    pub fn zero(&self) -> FieldValue {
        match self {
            SlotKind::Text => FieldValue::Text(String::new()),
            SlotKind::Int => FieldValue::Int(0),
            SlotKind::UInt => FieldValue::UInt(0),
            SlotKind::Float => FieldValue::Float(0.0),
        }
    }
}

type Getter<R> = Box<dyn Fn(&R) -> FieldValue + Send + Sync>;
type Setter<R> = Box<dyn Fn(&mut R, FieldValue) + Send + Sync>;

/// A named, typed accessor into a record
pub struct Slot<R> {
    column: String,
    kind: SlotKind,
    get: Getter<R>,
    set: Setter<R>,
}

impl<R> Slot<R> {
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    /// Read the slot's current value from a record
    pub fn get(&self, record: &R) -> FieldValue {
        (self.get)(record)
    }

    /// Store a value into the slot
    pub fn set(&self, record: &mut R, value: FieldValue) {
        (self.set)(record, value)
    }
}

impl<R> fmt::Debug for Slot<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("column", &self.column)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Ordered description of a record type's columns
///
/// ```ignore
/// let schema = RecordSchema::new()
///     .text("NAME", |o: &Order| o.name.as_str(), |o, v| o.name = v)
///     .int("QTY", |o: &Order| o.qty, |o, v| o.qty = v);
/// ```
///
/// Column names match stored names ignoring ASCII case.
pub struct RecordSchema<R> {
    slots: Vec<Slot<R>>,
}

impl<R: 'static> RecordSchema<R> {
    pub fn new() -> Self {
        RecordSchema { slots: Vec::new() }
    }

    /// Add a slot with raw accessors; values handed to `set` are always of `kind`
    pub fn slot<G, S>(mut self, column: &str, kind: SlotKind, get: G, set: S) -> Self
    where
        G: Fn(&R) -> FieldValue + Send + Sync + 'static,
        S: Fn(&mut R, FieldValue) + Send + Sync + 'static,
    {
        self.slots.push(Slot {
            column: column.to_string(),
            kind,
            get: Box::new(get),
            set: Box::new(set),
        });
        self
    }

    /// Add a text slot
    pub fn text<G, S>(self, column: &str, get: G, set: S) -> Self
    where
        G: Fn(&R) -> &str + Send + Sync + 'static,
        S: Fn(&mut R, String) + Send + Sync + 'static,
    {
        self.slot(
            column,
            SlotKind::Text,
            move |r| FieldValue::Text(get(r).to_string()),
            move |r, v| {
                if let FieldValue::Text(s) = v {
                    set(r, s)
                }
            },
        )
    }

    /// Add a signed integer slot
    pub fn int<G, S>(self, column: &str, get: G, set: S) -> Self
    where
        G: Fn(&R) -> i64 + Send + Sync + 'static,
        S: Fn(&mut R, i64) + Send + Sync + 'static,
    {
        self.slot(
            column,
            SlotKind::Int,
            move |r| FieldValue::Int(get(r)),
            move |r, v| {
                if let FieldValue::Int(n) = v {
                    set(r, n)
                }
            },
        )
    }

    /// Add an unsigned integer slot
    pub fn uint<G, S>(self, column: &str, get: G, set: S) -> Self
    where
        G: Fn(&R) -> u64 + Send + Sync + 'static,
        S: Fn(&mut R, u64) + Send + Sync + 'static,
    {
        self.slot(
            column,
            SlotKind::UInt,
            move |r| FieldValue::UInt(get(r)),
            move |r, v| {
                if let FieldValue::UInt(n) = v {
                    set(r, n)
                }
            },
        )
    }

    /// Add a floating point slot
    pub fn float<G, S>(self, column: &str, get: G, set: S) -> Self
    where
        G: Fn(&R) -> f64 + Send + Sync + 'static,
        S: Fn(&mut R, f64) + Send + Sync + 'static,
    {
        self.slot(
            column,
            SlotKind::Float,
            move |r| FieldValue::Float(get(r)),
            move |r, v| {
                if let FieldValue::Float(n) = v {
                    set(r, n)
                }
            },
        )
    }
}

impl<R> RecordSchema<R> {
    pub fn slots(&self) -> &[Slot<R>] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Position of the slot for a column name
    pub fn find(&self, column: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.column.eq_ignore_ascii_case(column))
    }
}

impl<R: 'static> Default for RecordSchema<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for RecordSchema<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.slots.iter()).finish()
    }
}

/// A stored column resolved against the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundColumn {
    /// Decoded, trimmed column name
    pub name: String,
    /// Byte offset within the record, after the deletion flag
    pub offset: usize,
    pub length: usize,
    pub decimal_count: u8,
    /// Index into the schema's slots, if the schema has this column
    pub slot: Option<usize>,
}

/// Column-to-slot mapping built once per open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaBinding {
    columns: Vec<BoundColumn>,
}

impl SchemaBinding {
    /// Resolve stored columns (in on-disk order) against a schema
    pub fn bind<R>(schema: &RecordSchema<R>, columns: &[String], fields: &[FieldDescriptor]) -> Self {
        let mut offset = 0;
        let columns = columns
            .iter()
            .zip(fields)
            .map(|(name, field)| {
                let bound = BoundColumn {
                    name: name.clone(),
                    offset,
                    length: field.length as usize,
                    decimal_count: field.decimal_count,
                    slot: schema.find(name),
                };
                offset += field.length as usize;
                bound
            })
            .collect();

        SchemaBinding { columns }
    }

    pub fn columns(&self) -> &[BoundColumn] {
        &self.columns
    }

    /// Stored columns the schema does not cover
    pub fn unbound_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.slot.is_none())
            .map(|c| c.name.as_str())
    }
}

/// A record whose shape is taken from the table itself
///
/// Values are kept in column order. Columns never set read back as the zero
/// value of their kind when appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicRecord {
    values: Vec<(String, FieldValue)>,
}

impl DynamicRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn set(&mut self, column: &str, value: FieldValue) {
        match self
            .values
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
        {
            Some(entry) => entry.1 = value,
            None => self.values.push((column.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl RecordSchema<DynamicRecord> {
    /// Build a schema covering every stored column, typed by its descriptor
    pub fn from_layout(columns: &[String], fields: &[FieldDescriptor]) -> Self {
        columns
            .iter()
            .zip(fields)
            .fold(RecordSchema::<DynamicRecord>::new(), |schema, (name, field)| {
                let kind = SlotKind::for_field(field);
                let get_name = name.clone();
                let set_name = name.clone();
                schema.slot(
                    name,
                    kind,
                    move |r: &DynamicRecord| r.get(&get_name).cloned().unwrap_or_else(|| kind.zero()),
                    move |r: &mut DynamicRecord, v| r.set(&set_name, v),
                )
            })
    }
}
