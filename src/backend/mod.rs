pub mod connection_string;
pub mod mysql;

use std::future::Future;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::normalize::RowSet;
use crate::params::ProcedureName;

/// Metadata for a single result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub type_name: String,
}

/// A value exchanged with the driver, either as a bound parameter or as a
/// result cell. The set of variants is closed on purpose: anything the
/// driver cannot bind unambiguously is rejected before it gets here.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Exact numeric kept as its decimal text so no precision is lost.
    Decimal(String),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Convert a JSON scalar into a value. Arrays and objects have no
    /// unambiguous SQL counterpart and are rejected.
    ///
    /// A parsed JSON number wider than 64 bits is already an `f64`; callers
    /// holding the source text should keep it as [`SqlValue::Decimal`].
    pub fn from_json(value: &serde_json::Value) -> Result<Self, TaskError> {
        match value {
            serde_json::Value::Null => Ok(SqlValue::Null),
            serde_json::Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(SqlValue::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Ok(SqlValue::UInt(u))
                } else if let Some(f) = n.as_f64() {
                    Ok(SqlValue::Float(f))
                } else {
                    Err(TaskError::invalid_argument(format!("unsupported number: {n}")))
                }
            }
            serde_json::Value::String(s) => Ok(SqlValue::Text(s.clone())),
            serde_json::Value::Array(_) => Err(TaskError::invalid_argument(
                "unsupported parameter value type: array",
            )),
            serde_json::Value::Object(_) => Err(TaskError::invalid_argument(
                "unsupported parameter value type: object",
            )),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl From<i32> for SqlValue {
    fn from(i: i32) -> Self {
        SqlValue::Int(i64::from(i))
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Int(i)
    }
}

impl From<u64> for SqlValue {
    fn from(u: u64) -> Self {
        SqlValue::UInt(u)
    }
}

impl From<f64> for SqlValue {
    fn from(f: f64) -> Self {
        SqlValue::Float(f)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(b: Vec<u8>) -> Self {
        SqlValue::Bytes(b)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(d: NaiveDate) -> Self {
        SqlValue::Date(d)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(t: NaiveTime) -> Self {
        SqlValue::Time(t)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(dt: NaiveDateTime) -> Self {
        SqlValue::DateTime(dt)
    }
}

/// SQL text with positional `?` markers and the values for them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }
}

/// Isolation levels the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeIsolation {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl NativeIsolation {
    pub fn as_sql(self) -> &'static str {
        match self {
            NativeIsolation::ReadUncommitted => "READ UNCOMMITTED",
            NativeIsolation::ReadCommitted => "READ COMMITTED",
            NativeIsolation::RepeatableRead => "REPEATABLE READ",
            NativeIsolation::Serializable => "SERIALIZABLE",
        }
    }
}

/// Opens sessions from an opaque connection descriptor.
pub trait Connector: Sync {
    type Session: Session;

    fn connect(
        &self,
        descriptor: &str,
    ) -> impl Future<Output = Result<Self::Session, TaskError>> + Send;
}

/// One exclusively owned database connection.
///
/// Dropping a session without calling [`Session::close`] must still release
/// the server-side connection; an open transaction is then discarded by the
/// server.
pub trait Session: Send {
    /// Start a transaction. `None` keeps the server's configured level.
    fn begin(
        &mut self,
        isolation: Option<NativeIsolation>,
    ) -> impl Future<Output = Result<(), TaskError>> + Send;

    fn commit(&mut self) -> impl Future<Output = Result<(), TaskError>> + Send;

    fn rollback(&mut self) -> impl Future<Output = Result<(), TaskError>> + Send;

    /// Run a statement without a cursor and report the affected-row count.
    fn execute(
        &mut self,
        statement: &BoundStatement,
        timeout_secs: u64,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<u64, TaskError>> + Send;

    /// Run a statement and drain its rows, checking `cancel` per row.
    fn query(
        &mut self,
        statement: &BoundStatement,
        timeout_secs: u64,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<RowSet, TaskError>> + Send;

    /// Parameter names of a stored procedure in ordinal order, or `None` when
    /// the routine is not visible to this session.
    fn procedure_parameters(
        &mut self,
        procedure: &ProcedureName,
        timeout_secs: u64,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<Vec<String>>, TaskError>> + Send;

    /// False once the connection is known to be broken or abandoned mid-command.
    fn is_connected(&self) -> bool;

    fn close(self) -> impl Future<Output = ()> + Send;
}
