//! Capture of structured lifecycle events into column tables.
//!
//! A `tracing` subscriber turns every event into a row of the table named
//! after the event's target (`lifecycle`, `registry`, `sync`, ...). Columns
//! appear as fields are first seen; rows missing a field are padded.
//!
//! # Usage
//!
//! ```ignore
//! // In library code:
//! tracing::info!(target: "lifecycle", tick, identifier = "zones:a", action = "create");
//!
//! // In a test:
//! let recorder = instrument::record(|| {
//!     // ... drive the server ...
//! });
//! assert_eq!(recorder.table("lifecycle").unwrap().count_eq("action", "create"), 1);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Level, Metadata, Subscriber};

/// Column holding the event level of each row.
pub const LEVEL_COLUMN: &str = "level";

/// A column of typed values.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedColumn {
    U64(Vec<u64>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl TypedColumn {
    pub fn len(&self) -> usize {
        match self {
            TypedColumn::U64(v) => v.len(),
            TypedColumn::I64(v) => v.len(),
            TypedColumn::F64(v) => v.len(),
            TypedColumn::Bool(v) => v.len(),
            TypedColumn::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pad_to(&mut self, rows: usize) {
        let padding = rows.saturating_sub(self.len());
        if padding == 0 {
            return;
        }
        match self {
            TypedColumn::U64(v) => v.extend(std::iter::repeat_n(0, padding)),
            TypedColumn::I64(v) => v.extend(std::iter::repeat_n(0, padding)),
            TypedColumn::F64(v) => v.extend(std::iter::repeat_n(0.0, padding)),
            TypedColumn::Bool(v) => v.extend(std::iter::repeat_n(false, padding)),
            TypedColumn::Str(v) => v.extend(std::iter::repeat_n(String::new(), padding)),
        }
    }
}

/// A table with dynamically-typed columns.
#[derive(Debug, Clone, Default)]
pub struct DynamicTable {
    pub columns: HashMap<String, TypedColumn>,
    pub row_count: usize,
}

impl DynamicTable {
    /// Pad all columns to the current row count with default values.
    fn pad_columns_to_row_count(&mut self) {
        for col in self.columns.values_mut() {
            col.pad_to(self.row_count);
        }
    }

    pub fn str_column(&self, name: &str) -> Option<&[String]> {
        match self.columns.get(name)? {
            TypedColumn::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn u64_column(&self, name: &str) -> Option<&[u64]> {
        match self.columns.get(name)? {
            TypedColumn::U64(v) => Some(v),
            _ => None,
        }
    }

    /// Rows whose string column `name` equals `value`.
    pub fn count_eq(&self, name: &str, value: &str) -> usize {
        self.str_column(name)
            .map(|col| col.iter().filter(|v| v.as_str() == value).count())
            .unwrap_or(0)
    }
}

/// Collection of tables, keyed by tracing target.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub tables: HashMap<String, DynamicTable>,
}

impl Recorder {
    pub fn table(&self, target: &str) -> Option<&DynamicTable> {
        self.tables.get(target)
    }

    /// Row count of `target`, zero when nothing was recorded.
    pub fn rows(&self, target: &str) -> usize {
        self.table(target).map(|t| t.row_count).unwrap_or(0)
    }
}

thread_local! {
    static RECORDER: RefCell<Recorder> = RefCell::default();
}

/// Visitor that extracts event fields into table columns.
struct ColumnVisitor<'a> {
    table: &'a mut DynamicTable,
    /// Current row count - used to pre-pad new columns
    row_count: usize,
}

impl ColumnVisitor<'_> {
    fn column(&mut self, field: &Field, empty: fn(usize) -> TypedColumn) -> &mut TypedColumn {
        let row_count = self.row_count;
        self.table
            .columns
            .entry(field.name().to_string())
            .or_insert_with(|| empty(row_count))
    }
}

impl Visit for ColumnVisitor<'_> {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if let TypedColumn::U64(v) = self.column(field, |n| TypedColumn::U64(vec![0; n])) {
            v.push(value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if let TypedColumn::I64(v) = self.column(field, |n| TypedColumn::I64(vec![0; n])) {
            v.push(value);
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let TypedColumn::F64(v) = self.column(field, |n| TypedColumn::F64(vec![0.0; n])) {
            v.push(value);
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if let TypedColumn::Bool(v) = self.column(field, |n| TypedColumn::Bool(vec![false; n])) {
            v.push(value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if let TypedColumn::Str(v) =
            self.column(field, |n| TypedColumn::Str(vec![String::new(); n]))
        {
            v.push(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // Display-formatted fields (`%value`) arrive here too
        self.record_str(field, &format!("{:?}", value));
    }
}

/// Tracing subscriber that collects events into per-target tables.
///
/// Records `INFO` and more severe events; spans are ignored.
pub struct EventTableSubscriber;

impl Subscriber for EventTableSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event() && *metadata.level() <= Level::INFO
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let target = event.metadata().target().to_string();
        let level = event.metadata().level().as_str();

        RECORDER.with(|r| {
            let mut recorder = r.borrow_mut();
            let table = recorder.tables.entry(target).or_default();

            table.pad_columns_to_row_count();
            let row_count = table.row_count;
            let levels = table
                .columns
                .entry(LEVEL_COLUMN.to_string())
                .or_insert_with(|| TypedColumn::Str(vec![String::new(); row_count]));
            if let TypedColumn::Str(v) = levels {
                v.push(level.to_string());
            }
            event.record(&mut ColumnVisitor { table, row_count });

            table.row_count += 1;
            table.pad_columns_to_row_count();
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Take all data recorded on this thread.
fn drain() -> Recorder {
    RECORDER.with(|r| std::mem::take(&mut *r.borrow_mut()))
}

/// Clear all recorded data without returning it.
fn clear() {
    RECORDER.with(|r| *r.borrow_mut() = Recorder::default());
}

/// Run `body` with the subscriber as the thread's default and return what it
/// recorded. Anything recorded earlier on this thread is discarded.
pub fn record(body: impl FnOnce()) -> Recorder {
    clear();
    tracing::subscriber::with_default(EventTableSubscriber, body);
    drain()
}

// === Polars Integration ===

use polars::prelude::*;

impl DynamicTable {
    /// Convert this table to a polars DataFrame.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut names: Vec<&String> = self.columns.keys().collect();
        names.sort();
        let columns = names
            .into_iter()
            .map(|name| match &self.columns[name] {
                TypedColumn::U64(v) => Column::new(name.into(), v),
                TypedColumn::I64(v) => Column::new(name.into(), v),
                TypedColumn::F64(v) => Column::new(name.into(), v),
                TypedColumn::Bool(v) => Column::new(name.into(), v),
                TypedColumn::Str(v) => Column::new(name.into(), v),
            })
            .collect();
        DataFrame::new(columns)
    }
}

impl Recorder {
    /// Convert all tables to polars DataFrames.
    pub fn to_dataframes(&self) -> HashMap<String, DataFrame> {
        self.tables
            .iter()
            .filter_map(|(name, table)| table.to_dataframe().ok().map(|df| (name.clone(), df)))
            .collect()
    }
}
