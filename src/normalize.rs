use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::backend::{ColumnMeta, SqlValue};
use crate::error::TaskError;

/// A fully drained result: one column layout shared by every row, rows in
/// cursor order. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    /// Build from parts. Every row must have exactly one value per column.
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<SqlValue>>) -> Result<Self, TaskError> {
        if let Some(pos) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(TaskError::Execution {
                message: format!(
                    "row {} has {} values but the result has {} columns",
                    pos,
                    rows[pos].len(),
                    columns.len()
                ),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as ordered `(column name, value)` records.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|values| Record {
            columns: &self.columns,
            values,
        })
    }
}

/// One row viewed as ordered `(column name, value)` pairs.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [ColumnMeta],
    values: &'a [SqlValue],
}

impl<'a> Record<'a> {
    pub fn fields(self) -> impl Iterator<Item = (&'a str, &'a SqlValue)> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .zip(self.values.iter())
    }

    pub fn get(self, column: &str) -> Option<&'a SqlValue> {
        self.fields().find(|(name, _)| *name == column).map(|(_, v)| v)
    }
}

/// The successful result of one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Rows(RowSet),
    AffectedRows(u64),
}

/// A row read from a driver cursor.
pub trait SourceRow {
    fn columns(&self) -> Vec<ColumnMeta>;

    /// Value at `idx`; SQL NULL must come back as [`SqlValue::Null`].
    fn value(&self, idx: usize) -> Result<SqlValue, TaskError>;
}

/// Drain a row stream into a [`RowSet`].
///
/// The first row fixes the column layout; a later row with a different
/// layout (a second result set of another shape) is an error. Cancellation
/// is checked before every row.
pub async fn drain<S, R>(rows: S, cancel: &CancellationToken) -> Result<RowSet, TaskError>
where
    S: Stream<Item = Result<R, TaskError>>,
    R: SourceRow,
{
    let mut rows = std::pin::pin!(rows);
    let mut columns: Option<Vec<ColumnMeta>> = None;
    let mut out = Vec::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(TaskError::Cancelled { stage: "while reading rows" });
            }
            next = rows.next() => next,
        };
        let Some(row) = next else { break };
        let row = row?;

        let layout = row.columns();
        let width = match &columns {
            Some(existing) => {
                if !same_layout(existing, &layout) {
                    return Err(TaskError::Execution {
                        message: "command returned result sets with differing column layouts"
                            .to_string(),
                    });
                }
                existing.len()
            }
            None => {
                let width = layout.len();
                columns = Some(layout);
                width
            }
        };

        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(row.value(idx)?);
        }
        out.push(values);
    }

    RowSet::new(columns.unwrap_or_default(), out)
}

/// Column names must match in order; type names may differ between rows of
/// a text-protocol result.
fn same_layout(a: &[ColumnMeta], b: &[ColumnMeta]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.name == y.name)
}
