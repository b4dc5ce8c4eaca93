use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{NativeIsolation, Session};
use crate::error::TaskError;
use crate::request::IsolationLevel;

/// Whether a command runs inside a transaction, and at which level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPlan {
    Direct,
    /// `None` keeps the server's configured isolation level.
    Transactional(Option<NativeIsolation>),
}

/// Map the requested isolation level to what is sent to the server.
pub fn plan(level: IsolationLevel) -> TransactionPlan {
    match level {
        IsolationLevel::None => TransactionPlan::Direct,
        IsolationLevel::Default => TransactionPlan::Transactional(None),
        IsolationLevel::ReadUncommitted => {
            TransactionPlan::Transactional(Some(NativeIsolation::ReadUncommitted))
        }
        IsolationLevel::ReadCommitted => {
            TransactionPlan::Transactional(Some(NativeIsolation::ReadCommitted))
        }
        IsolationLevel::RepeatableRead => {
            TransactionPlan::Transactional(Some(NativeIsolation::RepeatableRead))
        }
        IsolationLevel::Serializable => {
            TransactionPlan::Transactional(Some(NativeIsolation::Serializable))
        }
    }
}

/// An open (or deliberately absent) transaction on a session.
///
/// Obtained from [`begin`] and consumed by [`TransactionScope::finish`], which
/// commits on success and rolls back on failure. If the scope is dropped
/// without finishing, the session's connection must be dropped too; the
/// server then discards the transaction.
#[must_use = "a transaction scope must be finished to commit or roll back"]
#[derive(Debug)]
pub struct TransactionScope {
    open: bool,
}

/// Start a transaction according to `plan`.
pub async fn begin<S: Session>(
    session: &mut S,
    plan: TransactionPlan,
) -> Result<TransactionScope, TaskError> {
    match plan {
        TransactionPlan::Direct => {
            debug!("executing without a transaction");
            Ok(TransactionScope { open: false })
        }
        TransactionPlan::Transactional(isolation) => {
            session.begin(isolation).await?;
            debug!(
                isolation = isolation.map_or("server default", NativeIsolation::as_sql),
                "transaction started"
            );
            Ok(TransactionScope { open: true })
        }
    }
}

impl TransactionScope {
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Commit if `result` is a success and `cancel` has not fired; roll back
    /// otherwise.
    ///
    /// A rollback failure on a connection that is still usable becomes
    /// [`TaskError::Rollback`] wrapping the original error. When the
    /// connection is already gone the server has discarded the transaction,
    /// so the original error is returned.
    pub async fn finish<S: Session, T>(
        self,
        session: &mut S,
        result: Result<T, TaskError>,
        cancel: &CancellationToken,
    ) -> Result<T, TaskError> {
        if !self.open {
            return result;
        }

        let result = match result {
            Ok(_) if cancel.is_cancelled() => Err(TaskError::Cancelled {
                stage: "before commit",
            }),
            other => other,
        };

        match result {
            Ok(value) => match session.commit().await {
                Ok(()) => {
                    debug!("transaction committed");
                    Ok(value)
                }
                Err(err) => {
                    warn!(error = %err, "commit failed");
                    Err(err)
                }
            },
            Err(cause) => Err(rollback(session, cause).await),
        }
    }
}

async fn rollback<S: Session>(session: &mut S, cause: TaskError) -> TaskError {
    if !session.is_connected() {
        debug!("connection lost, server discards the open transaction");
        return cause;
    }

    match session.rollback().await {
        Ok(()) => {
            debug!("transaction rolled back");
            cause
        }
        Err(err) if session.is_connected() => {
            warn!(error = %err, cause = %cause, "rollback failed on a live connection");
            TaskError::Rollback {
                message: err.to_string(),
                cause: Box::new(cause),
            }
        }
        Err(err) => {
            warn!(error = %err, "rollback failed, connection lost");
            cause
        }
    }
}
