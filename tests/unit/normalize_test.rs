use futures::stream;
use mysqltask::backend::{ColumnMeta, SqlValue};
use mysqltask::error::TaskError;
use mysqltask::normalize::{RowSet, SourceRow, drain};
use tokio_util::sync::CancellationToken;

/// A driver row stand-in: a layout plus values.
struct FakeRow {
    columns: Vec<ColumnMeta>,
    values: Vec<SqlValue>,
}

impl SourceRow for FakeRow {
    fn columns(&self) -> Vec<ColumnMeta> {
        self.columns.clone()
    }

    fn value(&self, idx: usize) -> Result<SqlValue, TaskError> {
        self.values.get(idx).cloned().ok_or_else(|| TaskError::Execution {
            message: format!("no value at {idx}"),
        })
    }
}

fn col(name: &str) -> ColumnMeta {
    ColumnMeta {
        name: name.to_string(),
        type_name: "VARCHAR".to_string(),
    }
}

fn row(names: &[&str], values: Vec<SqlValue>) -> Result<FakeRow, TaskError> {
    Ok(FakeRow {
        columns: names.iter().map(|n| col(n)).collect(),
        values,
    })
}

#[tokio::test]
async fn rows_keep_cursor_and_column_order() {
    let rows = vec![
        row(&["name", "value"], vec!["hodor".into(), SqlValue::Int(123)]),
        row(&["name", "value"], vec!["jon".into(), SqlValue::Int(321)]),
    ];

    let set = drain(stream::iter(rows), &CancellationToken::new()).await.unwrap();

    assert_eq!(set.len(), 2);
    let names: Vec<&str> = set.columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["name", "value"]);
    let first: Vec<(&str, &SqlValue)> = set.records().next().unwrap().fields().collect();
    assert_eq!(
        first,
        vec![("name", &SqlValue::from("hodor")), ("value", &SqlValue::Int(123))]
    );
    assert_eq!(set.records().nth(1).unwrap().get("value"), Some(&SqlValue::Int(321)));
}

#[tokio::test]
async fn nulls_are_explicit() {
    let rows = vec![row(&["a", "b"], vec![SqlValue::Null, "x".into()])];

    let set = drain(stream::iter(rows), &CancellationToken::new()).await.unwrap();

    let record = set.records().next().unwrap();
    assert_eq!(record.get("a"), Some(&SqlValue::Null));
    assert_eq!(record.fields().count(), 2);
}

#[tokio::test]
async fn empty_stream_is_empty_row_set() {
    let rows: Vec<Result<FakeRow, TaskError>> = vec![];

    let set = drain(stream::iter(rows), &CancellationToken::new()).await.unwrap();

    assert!(set.is_empty());
    assert!(set.columns().is_empty());
}

#[tokio::test]
async fn high_precision_decimal_passes_through() {
    let digits = "1.123456789123456789123456789123";
    let rows = vec![row(&["d"], vec![SqlValue::Decimal(digits.into())])];

    let set = drain(stream::iter(rows), &CancellationToken::new()).await.unwrap();

    assert_eq!(set.rows()[0][0], SqlValue::Decimal(digits.into()));
}

#[tokio::test]
async fn matching_result_sets_are_concatenated() {
    let rows = vec![
        row(&["id"], vec![SqlValue::Int(1)]),
        row(&["id"], vec![SqlValue::Int(2)]),
        row(&["id"], vec![SqlValue::Int(3)]),
    ];

    let set = drain(stream::iter(rows), &CancellationToken::new()).await.unwrap();

    assert_eq!(set.len(), 3);
}

#[tokio::test]
async fn differing_layouts_are_rejected() {
    let rows = vec![
        row(&["id"], vec![SqlValue::Int(1)]),
        row(&["name", "value"], vec!["x".into(), SqlValue::Int(2)]),
    ];

    let err = drain(stream::iter(rows), &CancellationToken::new()).await.unwrap_err();

    assert!(err.to_string().contains("differing column layouts"), "Got: {err}");
}

#[tokio::test]
async fn driver_error_mid_stream_is_returned() {
    let rows = vec![
        row(&["id"], vec![SqlValue::Int(1)]),
        Err(TaskError::Execution {
            message: "Lost row".to_string(),
        }),
    ];

    let err = drain(stream::iter(rows), &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.to_string(), "Query failed: Lost row");
}

#[tokio::test]
async fn cancelled_token_stops_draining() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let rows = vec![row(&["id"], vec![SqlValue::Int(1)])];

    let err = drain(stream::iter(rows), &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
}

#[test]
fn row_set_rejects_ragged_rows() {
    let err = RowSet::new(vec![col("a"), col("b")], vec![vec![SqlValue::Null]]).unwrap_err();
    assert!(err.to_string().contains("row 0 has 1 values"), "Got: {err}");
}
