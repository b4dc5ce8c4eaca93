//! Live tests against a real MySQL server.
//!
//! Set `MYSQLTASK_TEST_CONNECTION_STRING` (keyword form or `mysql://` URL) to
//! run them; without it every test returns immediately.

use mysqltask::backend::SqlValue;
use mysqltask::error::TaskError;
use mysqltask::executor::{Outcome, execute_command};
use mysqltask::format::payload_to_json;
use mysqltask::normalize::Payload;
use mysqltask::request::{CommandRequest, ExecutionOptions, FailureMode, IsolationLevel};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn connection_string() -> Option<String> {
    std::env::var("MYSQLTASK_TEST_CONNECTION_STRING")
        .ok()
        .filter(|s| !s.is_empty())
}

fn options(isolation: IsolationLevel) -> ExecutionOptions {
    ExecutionOptions {
        isolation,
        ..ExecutionOptions::default()
    }
}

async fn run(dsn: &str, request: CommandRequest, options: &ExecutionOptions) -> Result<Payload, TaskError> {
    match execute_command(dsn, &request, options, &CancellationToken::new()).await? {
        Outcome::Success(payload) => Ok(payload),
        Outcome::Failure { message } => panic!("unexpected captured failure: {message}"),
    }
}

async fn sql(dsn: &str, text: &str) -> Payload {
    run(dsn, CommandRequest::text(text), &options(IsolationLevel::None))
        .await
        .unwrap()
}

/// Each test works on its own table so they can run in parallel.
async fn fresh_table(dsn: &str, table: &str) {
    sql(dsn, &format!("DROP TABLE IF EXISTS {table}")).await;
    sql(
        dsn,
        &format!("CREATE TABLE {table} (name VARCHAR(64) NOT NULL, value INT NOT NULL)"),
    )
    .await;
}

#[tokio::test]
async fn select_returns_inserted_rows() {
    let Some(dsn) = connection_string() else { return };
    fresh_table(&dsn, "mt_select").await;
    sql(&dsn, "INSERT INTO mt_select VALUES ('hodor', 123), ('jon', 321)").await;

    let payload = run(
        &dsn,
        CommandRequest::text("select name, value from mt_select order by value limit 2"),
        &options(IsolationLevel::Default),
    )
    .await
    .unwrap();

    assert_eq!(
        payload_to_json(&payload),
        json!([{"name": "hodor", "value": 123}, {"name": "jon", "value": 321}])
    );
    sql(&dsn, "DROP TABLE mt_select").await;
}

#[tokio::test]
async fn parameterized_insert_reports_affected_rows() {
    let Some(dsn) = connection_string() else { return };
    fresh_table(&dsn, "mt_insert").await;

    let request = CommandRequest::text("insert into mt_insert (name, value) values (@name, @value)")
        .with_parameter("name", "hodor")
        .with_parameter("value", 123);
    let payload = run(&dsn, request, &options(IsolationLevel::Serializable))
        .await
        .unwrap();

    assert_eq!(payload, Payload::AffectedRows(1));
    let rows = sql(&dsn, "select name from mt_insert").await;
    assert_eq!(payload_to_json(&rows), json!([{"name": "hodor"}]));
    sql(&dsn, "DROP TABLE mt_insert").await;
}

#[tokio::test]
async fn stored_procedure_runs_with_parameters() {
    let Some(dsn) = connection_string() else { return };
    fresh_table(&dsn, "mt_proc").await;
    sql(&dsn, "DROP PROCEDURE IF EXISTS MtInsertTestData").await;
    sql(
        &dsn,
        "CREATE PROCEDURE MtInsertTestData(IN Name VARCHAR(64), IN Value INT) \
         BEGIN INSERT INTO mt_proc (name, value) VALUES (Name, Value); END",
    )
    .await;

    // Declared in the opposite order to the routine's parameters.
    let request = CommandRequest::procedure("MtInsertTestData")
        .with_parameter("value", 321)
        .with_parameter("@name", "jon");
    let payload = run(&dsn, request, &options(IsolationLevel::Default))
        .await
        .unwrap();

    assert_eq!(payload, Payload::AffectedRows(1));
    let rows = sql(&dsn, "select name, value from mt_proc").await;
    assert_eq!(payload_to_json(&rows), json!([{"name": "jon", "value": 321}]));

    let unknown = CommandRequest::procedure("MtInsertTestData")
        .with_parameter("name", "arya")
        .with_parameter("value", 1)
        .with_parameter("colour", "grey");
    let err = run(&dsn, unknown, &options(IsolationLevel::Default))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::InvalidArgument { .. }), "Got: {err:?}");

    sql(&dsn, "DROP PROCEDURE MtInsertTestData").await;
    sql(&dsn, "DROP TABLE mt_proc").await;
}

#[tokio::test]
async fn failure_rolls_back_the_whole_command() {
    let Some(dsn) = connection_string() else { return };
    fresh_table(&dsn, "mt_rollback").await;

    let request = CommandRequest::text(
        "insert into mt_rollback values ('partial', 1); insert into mt_rollback_missing values (1)",
    );
    let err = run(&dsn, request, &options(IsolationLevel::Serializable))
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Execution { .. }), "Got: {err:?}");
    let rows = sql(&dsn, "select name from mt_rollback").await;
    assert_eq!(payload_to_json(&rows), json!([]));
    sql(&dsn, "DROP TABLE mt_rollback").await;
}

#[tokio::test]
async fn captured_failure_carries_server_message() {
    let Some(dsn) = connection_string() else { return };

    let opts = ExecutionOptions {
        failure_mode: FailureMode::Capture,
        ..ExecutionOptions::default()
    };
    let outcome = execute_command(
        &dsn,
        &CommandRequest::text("select * from mt_does_not_exist"),
        &opts,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let message = outcome.message().unwrap_or_default();
    assert!(message.starts_with("Query failed: "), "Got: {message}");
    assert!(message.contains("mt_does_not_exist"), "Got: {message}");
}

#[tokio::test]
async fn decimal_parameter_keeps_full_precision() {
    let Some(dsn) = connection_string() else { return };

    let digits = "1.123456789012345678901234567890";
    let request = CommandRequest::text("select cast(@amount as decimal(31, 30)) as amount")
        .with_parameter("amount", SqlValue::Decimal(digits.to_string()));
    let payload = run(&dsn, request, &options(IsolationLevel::None))
        .await
        .unwrap();

    assert_eq!(payload_to_json(&payload), json!([{"amount": digits}]));
}

#[tokio::test]
async fn temporal_and_null_cells_are_normalized() {
    let Some(dsn) = connection_string() else { return };

    let payload = sql(
        &dsn,
        "select cast('2024-02-29' as date) as d, cast('2024-02-29 13:05:09' as datetime) as dt, null as n",
    )
    .await;

    assert_eq!(
        payload_to_json(&payload),
        json!([{"d": "2024-02-29", "dt": "2024-02-29T13:05:09", "n": null}])
    );
}

#[tokio::test]
async fn time_values_outside_a_day_keep_server_text() {
    let Some(dsn) = connection_string() else { return };

    let payload = sql(
        &dsn,
        "select timediff('2024-01-03 00:00:00', '2024-01-01 00:00:00') as long_span, \
         cast('-01:30:00' as time) as negative, cast('13:05:09' as time) as plain",
    )
    .await;
    assert_eq!(
        payload_to_json(&payload),
        json!([{"long_span": "48:00:00", "negative": "-01:30:00", "plain": "13:05:09"}])
    );

    // Parameters force the binary protocol.
    let request = CommandRequest::text("select timediff(@a, @b) as t")
        .with_parameter("a", "2024-01-01 00:00:00")
        .with_parameter("b", "2024-01-03 00:00:00");
    let payload = run(&dsn, request, &options(IsolationLevel::None))
        .await
        .unwrap();
    assert_eq!(payload_to_json(&payload), json!([{"t": "-48:00:00"}]));
}

#[tokio::test]
async fn statement_timeout_is_reported() {
    let Some(dsn) = connection_string() else { return };

    let opts = ExecutionOptions {
        timeout_secs: 1,
        ..options(IsolationLevel::None)
    };
    let err = run(&dsn, CommandRequest::text("select sleep(5)"), &opts)
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Timeout { seconds: 1 }), "Got: {err:?}");
}

#[tokio::test]
async fn unreachable_server_is_a_connection_error() {
    if connection_string().is_none() {
        return;
    }

    let err = run(
        "server=127.0.0.1;port=1;uid=root;pwd=x;connect timeout=2",
        CommandRequest::text("select 1"),
        &ExecutionOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, TaskError::Connection { .. }), "Got: {err:?}");
}
