//! The command executor: the single entry point that validates a request,
//! owns the connection for the duration of one call, and composes the
//! binder, classifier, transaction coordinator and normalizer.
//!
//! One invocation moves through
//! `connecting -> bound -> executing -> draining|counting -> committed -> closed`.
//! Any failure rolls back an open transaction, and the connection is closed
//! on every path before the result is returned.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::mysql::MySqlConnector;
use crate::backend::{BoundStatement, Connector, Session};
use crate::classify::{self, ResultShape};
use crate::error::TaskError;
use crate::normalize::Payload;
use crate::params::{self, ParameterSet, ProcedureName};
use crate::request::{CommandKind, CommandRequest, ExecutionOptions, FailureMode};
use crate::transaction;

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Payload),
    /// Only produced with [`FailureMode::Capture`].
    Failure { message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure { message } => Some(message),
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Outcome::Success(payload) => Some(payload),
            Outcome::Failure { .. } => None,
        }
    }
}

pub struct CommandExecutor<C> {
    connector: C,
}

impl CommandExecutor<MySqlConnector> {
    pub fn mysql() -> Self {
        Self::new(MySqlConnector)
    }
}

impl<C: Connector> CommandExecutor<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Run one command.
    ///
    /// With [`FailureMode::Raise`] every failure is returned as `Err`. With
    /// [`FailureMode::Capture`] failures become [`Outcome::Failure`] carrying
    /// the error message, and `Err` is never returned.
    pub async fn execute(
        &self,
        descriptor: &str,
        request: &CommandRequest,
        options: &ExecutionOptions,
        cancel: &CancellationToken,
    ) -> Result<Outcome, TaskError> {
        match self.run(descriptor, request, options, cancel).await {
            Ok(payload) => Ok(Outcome::Success(payload)),
            Err(err) => match options.failure_mode {
                FailureMode::Raise => Err(err),
                FailureMode::Capture => {
                    debug!(error = %err, "captured failure");
                    Ok(Outcome::Failure {
                        message: err.to_string(),
                    })
                }
            },
        }
    }

    async fn run(
        &self,
        descriptor: &str,
        request: &CommandRequest,
        options: &ExecutionOptions,
        cancel: &CancellationToken,
    ) -> Result<Payload, TaskError> {
        if descriptor.trim().is_empty() {
            return Err(TaskError::invalid_argument("connection string must not be empty"));
        }
        if request.text.trim().is_empty() {
            return Err(TaskError::invalid_argument("command text must not be empty"));
        }

        let params = params::bind(&request.parameters)?;
        let statement = params::prepare(request, &params)?;
        let procedure = match request.kind {
            CommandKind::StoredProcedure => Some(ProcedureName::parse(&request.text)?),
            CommandKind::Text => None,
        };
        let shape = classify::classify(
            &request.text,
            request.kind,
            options.procedure_output,
            options.classifier,
        );

        check_cancelled(cancel, "before connecting")?;
        debug!("connecting");
        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(TaskError::Cancelled { stage: "while connecting" });
            }
            session = self.connector.connect(descriptor) => session?,
        };
        debug!(parameters = params.len(), ?shape, "connected and bound");

        let prepared = Prepared {
            statement,
            procedure: procedure.as_ref(),
            params: &params,
        };
        let result = run_on_session(&mut session, prepared, shape, options, cancel).await;

        session.close().await;
        debug!(success = result.is_ok(), "connection closed");
        result
    }
}

/// Execute with the MySQL driver.
pub async fn execute_command(
    descriptor: &str,
    request: &CommandRequest,
    options: &ExecutionOptions,
    cancel: &CancellationToken,
) -> Result<Outcome, TaskError> {
    CommandExecutor::mysql()
        .execute(descriptor, request, options, cancel)
        .await
}

/// The prepared statement plus what is needed to rebind a procedure call
/// once the routine's parameter list is known.
struct Prepared<'a> {
    statement: BoundStatement,
    procedure: Option<&'a ProcedureName>,
    params: &'a ParameterSet,
}

async fn run_on_session<S: Session>(
    session: &mut S,
    prepared: Prepared<'_>,
    shape: ResultShape,
    options: &ExecutionOptions,
    cancel: &CancellationToken,
) -> Result<Payload, TaskError> {
    check_cancelled(cancel, "after connecting")?;

    let statement = match prepared.procedure {
        Some(procedure) => {
            bind_procedure(
                session,
                procedure,
                prepared.params,
                prepared.statement,
                options.timeout_secs,
                cancel,
            )
            .await?
        }
        None => prepared.statement,
    };

    let scope = transaction::begin(session, transaction::plan(options.isolation)).await?;
    let result = run_statement(session, &statement, shape, options.timeout_secs, cancel).await;
    scope.finish(session, result, cancel).await
}

/// Place procedure arguments by the routine's parameter names. An unknown
/// routine keeps the declared order so the server reports it on `CALL`.
async fn bind_procedure<S: Session>(
    session: &mut S,
    procedure: &ProcedureName,
    params: &ParameterSet,
    declared: BoundStatement,
    timeout_secs: u64,
    cancel: &CancellationToken,
) -> Result<BoundStatement, TaskError> {
    match session
        .procedure_parameters(procedure, timeout_secs, cancel)
        .await?
    {
        Some(routine_params) => {
            debug!(procedure = %procedure, ?routine_params, "binding procedure arguments by name");
            params::procedure_call_by_name(procedure, &routine_params, params)
        }
        None => {
            debug!(procedure = %procedure, "procedure not found, keeping declared order");
            Ok(declared)
        }
    }
}

async fn run_statement<S: Session>(
    session: &mut S,
    statement: &BoundStatement,
    shape: ResultShape,
    timeout_secs: u64,
    cancel: &CancellationToken,
) -> Result<Payload, TaskError> {
    check_cancelled(cancel, "before executing")?;

    match shape {
        ResultShape::Rows => {
            debug!("executing, draining rows");
            let rows = session.query(statement, timeout_secs, cancel).await?;
            debug!(rows = rows.len(), "rows drained");
            Ok(Payload::Rows(rows))
        }
        ResultShape::AffectedRows => {
            debug!("executing, counting affected rows");
            let count = session.execute(statement, timeout_secs, cancel).await?;
            debug!(affected_rows = count, "statement executed");
            Ok(Payload::AffectedRows(count))
        }
    }
}

fn check_cancelled(cancel: &CancellationToken, stage: &'static str) -> Result<(), TaskError> {
    if cancel.is_cancelled() {
        Err(TaskError::Cancelled { stage })
    } else {
        Ok(())
    }
}
