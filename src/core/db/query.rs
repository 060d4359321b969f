/// Query Result Module
///
/// Row and result-set types, plus the trampoline the engine calls once per
/// produced row while `sqlite3_exec` is still on the stack.
use crate::core::db::native::copy_c_str;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::slice;

/// Signature of the per-row callback handed to the engine.
pub type RowCallback =
    unsafe extern "C" fn(*mut c_void, c_int, *mut *mut c_char, *mut *mut c_char) -> c_int;

/// Returned to the engine to keep iterating.
const CONTINUE: c_int = 0;
/// Returned to the engine to abort the statement.
const ABORT: c_int = 1;

/// One result row: column names mapped to their text values, in the order the
/// engine reported the columns. A SQL NULL is stored as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, Option<String>)>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    pub fn with_capacity(columns: usize) -> Self {
        Row {
            cells: Vec::with_capacity(columns),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: Option<String>) {
        self.cells.push((column.into(), value));
    }

    /// Text value of `column`. `None` if the column is absent or NULL.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cell(column).and_then(|value| value.as_deref())
    }

    /// `true` if `column` exists and holds NULL.
    pub fn is_null(&self, column: &str) -> bool {
        matches!(self.cell(column), Some(None))
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cell(column).is_some()
    }

    fn cell(&self, column: &str) -> Option<&Option<String>> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = Option<&str>> {
        self.cells.iter().map(|(_, value)| value.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.cells
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Ordered rows produced by one `query` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct ResultSet {
    rows: Vec<Row>,
}

impl ResultSet {
    pub fn new() -> Self {
        ResultSet::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn iter(&self) -> slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// In-flight state shared with the engine during one exec call.
#[derive(Debug)]
pub struct RowCollector<'a> {
    target: &'a mut ResultSet,
    failure: Option<String>,
}

impl<'a> RowCollector<'a> {
    pub fn new(target: &'a mut ResultSet) -> Self {
        RowCollector {
            target,
            failure: None,
        }
    }

    /// Why row collection aborted the statement, if it did.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Decodes one row from the engine's parallel name/value arrays.
    ///
    /// # Safety
    ///
    /// `values` and `names` must each point at `count` string pointers valid
    /// for the duration of the call; name pointers are non-null.
    unsafe fn push_raw(&mut self, count: usize, values: *const *mut c_char, names: *const *mut c_char) {
        let mut row = Row::with_capacity(count);
        for i in 0..count {
            let value_ptr = *values.add(i);
            let name = copy_c_str(*names.add(i));
            let value = if value_ptr.is_null() {
                None
            } else {
                Some(copy_c_str(value_ptr))
            };
            row.push(name, value);
        }
        self.target.rows.push(row);
    }
}

/// Row trampoline passed to `sqlite3_exec`.
///
/// Panics never cross back into the engine: a panic while decoding is
/// recorded on the collector and the statement is aborted.
///
/// # Safety
///
/// `user_data` must be the `RowCollector` registered for the running exec
/// call, and the arrays must follow the engine's callback contract.
pub(crate) unsafe extern "C" fn collect_row(
    user_data: *mut c_void,
    count: c_int,
    values: *mut *mut c_char,
    names: *mut *mut c_char,
) -> c_int {
    if user_data.is_null() {
        return ABORT;
    }
    let collector = &mut *(user_data as *mut RowCollector<'_>);
    let count = usize::try_from(count).unwrap_or(0);
    if count > 0 && (values.is_null() || names.is_null()) {
        collector.failure = Some("engine delivered a row without column arrays".to_string());
        return ABORT;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        collector.push_raw(count, values, names);
    }));
    match outcome {
        Ok(()) => CONTINUE,
        Err(_) => {
            collector.failure = Some("row decoding failed".to_string());
            ABORT
        }
    }
}
