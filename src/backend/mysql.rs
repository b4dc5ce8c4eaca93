use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use secrecy::ExposeSecret;
use sqlx::mysql::types::MySqlTime;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::query::Query;
use sqlx::types::BigDecimal;
use sqlx::{Column, Connection, Executor, Row, TypeInfo, ValueRef};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::backend::connection_string::{self, DEFAULT_CONNECT_TIMEOUT, SslMode};
use crate::backend::{BoundStatement, ColumnMeta, Connector, NativeIsolation, Session, SqlValue};
use crate::error::TaskError;
use crate::normalize::{self, RowSet, SourceRow};
use crate::params::ProcedureName;

/// Opens a dedicated (unpooled) connection per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

impl Connector for MySqlConnector {
    type Session = MySqlSession;

    async fn connect(&self, descriptor: &str) -> Result<MySqlSession, TaskError> {
        let (options, connect_timeout) = connect_options(descriptor)?;

        let conn = tokio::time::timeout(connect_timeout, MySqlConnection::connect_with(&options))
            .await
            .map_err(|_| TaskError::Connection {
                message: format!(
                    "timed out after {}s while connecting to the server",
                    connect_timeout.as_secs()
                ),
            })?
            .map_err(|e| TaskError::Connection {
                message: driver_message(&e),
            })?;

        Ok(MySqlSession {
            conn,
            healthy: true,
        })
    }
}

/// Driver options from either a `mysql://` URL or a `key=value;` string.
fn connect_options(descriptor: &str) -> Result<(MySqlConnectOptions, Duration), TaskError> {
    if connection_string::is_url(descriptor) {
        let options = MySqlConnectOptions::from_str(descriptor.trim()).map_err(|e| {
            TaskError::Connection {
                message: format!("format of the connection string is invalid: {e}"),
            }
        })?;
        return Ok((options, DEFAULT_CONNECT_TIMEOUT));
    }

    let settings = connection_string::parse(descriptor)?;
    let mut options = MySqlConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .ssl_mode(match settings.ssl_mode {
            SslMode::Disabled => MySqlSslMode::Disabled,
            SslMode::Preferred => MySqlSslMode::Preferred,
            SslMode::Required => MySqlSslMode::Required,
            SslMode::VerifyCa => MySqlSslMode::VerifyCa,
            SslMode::VerifyIdentity => MySqlSslMode::VerifyIdentity,
        });
    if let Some(username) = &settings.username {
        options = options.username(username);
    }
    if let Some(password) = &settings.password {
        options = options.password(password.expose_secret());
    }
    if let Some(database) = &settings.database {
        options = options.database(database);
    }
    if let Some(charset) = &settings.charset {
        options = options.charset(charset);
    }
    Ok((options, settings.connect_timeout))
}

pub struct MySqlSession {
    conn: MySqlConnection,
    /// Cleared while a command is in flight and left cleared if it never
    /// completed (timeout, cancellation, lost socket).
    healthy: bool,
}

impl MySqlSession {
    async fn run_raw(&mut self, sql: &str) -> Result<(), TaskError> {
        let result = self.conn.execute(sqlx::raw_sql(sql)).await;
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = driver_error(err);
                if matches!(err, TaskError::Connection { .. }) {
                    self.healthy = false;
                }
                Err(err)
            }
        }
    }
}

impl Session for MySqlSession {
    async fn begin(&mut self, isolation: Option<NativeIsolation>) -> Result<(), TaskError> {
        // Applies to the next transaction only.
        if let Some(level) = isolation {
            let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql());
            self.run_raw(&sql).await?;
        }
        self.run_raw("START TRANSACTION").await
    }

    async fn commit(&mut self) -> Result<(), TaskError> {
        self.run_raw("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), TaskError> {
        if !self.healthy {
            return Err(TaskError::Connection {
                message: "connection is no longer usable".to_string(),
            });
        }
        self.run_raw("ROLLBACK").await
    }

    async fn execute(
        &mut self,
        statement: &BoundStatement,
        timeout_secs: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, TaskError> {
        let conn = &mut self.conn;
        let run = async move {
            let result = if statement.args.is_empty() {
                conn.execute(sqlx::raw_sql(&statement.sql)).await
            } else {
                bind_all(sqlx::query(&statement.sql), &statement.args)
                    .execute(&mut *conn)
                    .await
            };
            result.map(|r| r.rows_affected()).map_err(driver_error)
        };
        guarded(&mut self.healthy, timeout_secs, cancel, run).await
    }

    async fn query(
        &mut self,
        statement: &BoundStatement,
        timeout_secs: u64,
        cancel: &CancellationToken,
    ) -> Result<RowSet, TaskError> {
        let conn = &mut self.conn;
        let run = async move {
            if statement.args.is_empty() {
                let rows = conn
                    .fetch(sqlx::raw_sql(&statement.sql))
                    .map_err(driver_error);
                normalize::drain(rows, cancel).await
            } else {
                let rows = bind_all(sqlx::query(&statement.sql), &statement.args)
                    .fetch(&mut *conn)
                    .map_err(driver_error);
                normalize::drain(rows, cancel).await
            }
        };
        guarded(&mut self.healthy, timeout_secs, cancel, run).await
    }

    async fn procedure_parameters(
        &mut self,
        procedure: &ProcedureName,
        timeout_secs: u64,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<String>>, TaskError> {
        let lookup = BoundStatement {
            sql: PROCEDURE_PARAMETERS_SQL.to_string(),
            args: vec![
                procedure.schema.clone().map_or(SqlValue::Null, SqlValue::Text),
                SqlValue::Text(procedure.name.clone()),
            ],
        };
        let rows = self.query(&lookup, timeout_secs, cancel).await?;
        if rows.is_empty() {
            return Ok(None);
        }

        // A routine without parameters yields one row with a NULL name.
        let names = rows
            .rows()
            .iter()
            .filter_map(|row| match row.first() {
                Some(SqlValue::Text(name)) => Some(name.clone()),
                Some(SqlValue::Bytes(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .collect();
        Ok(Some(names))
    }

    fn is_connected(&self) -> bool {
        self.healthy
    }

    async fn close(self) {
        let result = if self.healthy {
            self.conn.close().await
        } else {
            // A command may still be in flight; do not wait for it.
            self.conn.close_hard().await
        };
        if let Err(err) = result {
            warn!(error = %err, "failed to close connection cleanly");
        }
    }
}

/// One row per IN/OUT/INOUT parameter in ordinal order, or a single NULL row
/// for a routine without parameters. No rows means no such procedure.
const PROCEDURE_PARAMETERS_SQL: &str = "\
SELECT CAST(p.PARAMETER_NAME AS CHAR) AS parameter_name \
FROM information_schema.ROUTINES r \
LEFT JOIN information_schema.PARAMETERS p \
  ON p.SPECIFIC_SCHEMA = r.ROUTINE_SCHEMA \
 AND p.SPECIFIC_NAME = r.ROUTINE_NAME \
 AND p.ROUTINE_TYPE = r.ROUTINE_TYPE \
 AND p.ORDINAL_POSITION > 0 \
WHERE r.ROUTINE_SCHEMA = COALESCE(?, DATABASE()) \
  AND r.ROUTINE_NAME = ? \
  AND r.ROUTINE_TYPE = 'PROCEDURE' \
ORDER BY p.ORDINAL_POSITION";

/// Run `command` under the statement timeout and the cancellation token.
/// The session stays healthy only if the command finished with a result or
/// a server-side error.
async fn guarded<T>(
    healthy: &mut bool,
    timeout_secs: u64,
    cancel: &CancellationToken,
    command: impl Future<Output = Result<T, TaskError>>,
) -> Result<T, TaskError> {
    *healthy = false;

    let bounded = async {
        if timeout_secs == 0 {
            command.await
        } else {
            tokio::time::timeout(Duration::from_secs(timeout_secs), command)
                .await
                .map_err(|_| TaskError::Timeout {
                    seconds: timeout_secs,
                })?
        }
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TaskError::Cancelled { stage: "while executing" }),
        result = bounded => result,
    };

    *healthy = matches!(&result, Ok(_) | Err(TaskError::Execution { .. }));
    result
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    args: &'q [SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    for arg in args {
        query = match arg {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::UInt(u) => query.bind(*u),
            SqlValue::Float(f) => query.bind(*f),
            // The server converts decimal text exactly.
            SqlValue::Decimal(s) | SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Date(d) => query.bind(*d),
            SqlValue::Time(t) => query.bind(*t),
            SqlValue::DateTime(dt) => query.bind(*dt),
            SqlValue::Bytes(b) => query.bind(b.as_slice()),
        };
    }
    query
}

/// Server errors keep the connection usable and map to
/// [`TaskError::Execution`] with the server's own message; transport
/// failures map to [`TaskError::Connection`].
fn driver_error(err: sqlx::Error) -> TaskError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut => TaskError::Connection {
            message: err.to_string(),
        },
        other => TaskError::Execution {
            message: driver_message(&other),
        },
    }
}

fn driver_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}

impl SourceRow for MySqlRow {
    fn columns(&self) -> Vec<ColumnMeta> {
        Row::columns(self)
            .iter()
            .map(|c| ColumnMeta {
                name: c.name().to_string(),
                type_name: c.type_info().name().to_string(),
            })
            .collect()
    }

    fn value(&self, idx: usize) -> Result<SqlValue, TaskError> {
        decode_cell(self, idx)
    }
}

fn get<'r, T>(row: &'r MySqlRow, idx: usize) -> Result<T, TaskError>
where
    T: sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get::<T, _>(idx).map_err(driver_error)
}

/// Decode one cell by its reported column type.
fn decode_cell(row: &MySqlRow, idx: usize) -> Result<SqlValue, TaskError> {
    let raw = row.try_get_raw(idx).map_err(driver_error)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = Row::columns(row)
        .get(idx)
        .map(|c| c.type_info().name())
        .unwrap_or_default();

    let value = match type_name {
        "BOOLEAN" => SqlValue::Bool(get(row, idx)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => SqlValue::Int(get(row, idx)?),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => SqlValue::UInt(get(row, idx)?),
        "FLOAT" => SqlValue::Float(f64::from(get::<f32>(row, idx)?)),
        "DOUBLE" => SqlValue::Float(get(row, idx)?),
        "DECIMAL" => SqlValue::Decimal(plain_decimal(&get::<BigDecimal>(row, idx)?)),
        // Zero dates and TIME values outside 00:00..24:00 have no chrono form
        // and are kept as the server's text.
        "DATE" => match row.try_get::<NaiveDate, _>(idx) {
            Ok(d) => SqlValue::Date(d),
            Err(_) => temporal_text(row, idx, "0000-00-00")?,
        },
        "TIME" => match row.try_get::<NaiveTime, _>(idx) {
            Ok(t) => SqlValue::Time(t),
            Err(_) => match row.try_get::<MySqlTime, _>(idx) {
                Ok(t) => SqlValue::Text(t.to_string()),
                Err(_) => fallback(row, idx)?,
            },
        },
        "DATETIME" | "TIMESTAMP" => match row.try_get::<NaiveDateTime, _>(idx) {
            Ok(dt) => SqlValue::DateTime(dt),
            Err(_) => temporal_text(row, idx, "0000-00-00 00:00:00")?,
        },
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "GEOMETRY" => {
            SqlValue::Bytes(get(row, idx)?)
        }
        "YEAR" | "BIT" => match row.try_get::<u64, _>(idx) {
            Ok(v) => SqlValue::UInt(v),
            Err(_) => fallback(row, idx)?,
        },
        _ => fallback(row, idx)?,
    };
    Ok(value)
}

/// A date the driver refused. The text protocol carries it as text; the
/// binary protocol encodes an all-zero value as a bare zero length byte.
fn temporal_text(row: &MySqlRow, idx: usize, zero: &str) -> Result<SqlValue, TaskError> {
    let bytes: Vec<u8> = row.try_get_unchecked(idx).map_err(driver_error)?;
    if bytes.iter().all(|b| *b == 0) {
        return Ok(SqlValue::Text(zero.to_string()));
    }
    Ok(match String::from_utf8(bytes) {
        Ok(text) => SqlValue::Text(text),
        Err(e) => SqlValue::Bytes(e.into_bytes()),
    })
}

/// Text if the driver can read it as a string, otherwise the raw bytes.
fn fallback(row: &MySqlRow, idx: usize) -> Result<SqlValue, TaskError> {
    if let Ok(text) = row.try_get::<String, _>(idx) {
        return Ok(SqlValue::Text(text));
    }
    let bytes: Vec<u8> = row.try_get_unchecked(idx).map_err(driver_error)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => SqlValue::Text(text),
        Err(e) => SqlValue::Bytes(e.into_bytes()),
    })
}

/// Decimal text without exponent notation, keeping every stored digit.
fn plain_decimal(value: &BigDecimal) -> String {
    let (digits, scale) = value.as_bigint_and_exponent();
    let text = digits.to_string();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(d) => ("-", d),
        None => ("", text.as_str()),
    };

    if scale <= 0 {
        let zeros = "0".repeat(scale.unsigned_abs() as usize);
        return format!("{sign}{digits}{zeros}");
    }

    let scale = scale as usize;
    if digits.len() > scale {
        let (int, frac) = digits.split_at(digits.len() - scale);
        format!("{sign}{int}.{frac}")
    } else {
        let zeros = "0".repeat(scale - digits.len());
        format!("{sign}0.{zeros}{digits}")
    }
}
