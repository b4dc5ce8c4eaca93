use std::str::FromStr;

use crate::backend::SqlValue;
use crate::error::TaskError;

/// Whether the command text is SQL or the name of a stored procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    #[default]
    Text,
    StoredProcedure,
}

/// A named parameter as declared by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: SqlValue,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One command to run: text, kind and its parameters in declaration order.
#[derive(Debug, Clone, Default)]
pub struct CommandRequest {
    pub text: String,
    pub kind: CommandKind,
    pub parameters: Vec<Parameter>,
}

impl CommandRequest {
    pub fn text(sql: impl Into<String>) -> Self {
        Self {
            text: sql.into(),
            kind: CommandKind::Text,
            parameters: Vec::new(),
        }
    }

    pub fn procedure(name: impl Into<String>) -> Self {
        Self {
            text: name.into(),
            kind: CommandKind::StoredProcedure,
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.parameters.push(Parameter::new(name, value));
        self
    }
}

/// Requested transaction isolation for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Run without a transaction.
    None,
    /// Open a transaction at the server's configured isolation level.
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// What to do with a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Return the error to the caller.
    #[default]
    Raise,
    /// Convert the error into [`crate::executor::Outcome::Failure`].
    Capture,
}

/// How a stored-procedure call is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcedureOutput {
    #[default]
    AffectedRows,
    Rows,
}

/// Which classifier decides between row-producing and count-producing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierKind {
    #[default]
    Prefix,
    Parsed,
}

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Per-call execution options. Never shared across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Bound on each statement's execution; 0 means no bound.
    pub timeout_secs: u64,
    pub isolation: IsolationLevel,
    pub failure_mode: FailureMode,
    pub procedure_output: ProcedureOutput,
    pub classifier: ClassifierKind,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            isolation: IsolationLevel::default(),
            failure_mode: FailureMode::default(),
            procedure_output: ProcedureOutput::default(),
            classifier: ClassifierKind::default(),
        }
    }
}

/// Lowercase and strip `-`, `_` and spaces so `read-committed`,
/// `ReadCommitted` and `read_committed` compare equal.
fn option_key(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn unknown_option(kind: &str, value: &str, expected: &str) -> TaskError {
    TaskError::Config {
        message: format!("unknown {kind}: '{value}' (expected one of: {expected})"),
    }
}

impl FromStr for IsolationLevel {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match option_key(s).as_str() {
            "none" | "unspecified" => Ok(IsolationLevel::None),
            "default" => Ok(IsolationLevel::Default),
            "readuncommitted" => Ok(IsolationLevel::ReadUncommitted),
            "readcommitted" => Ok(IsolationLevel::ReadCommitted),
            "repeatableread" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            _ => Err(unknown_option(
                "isolation level",
                s,
                "none, default, read-uncommitted, read-committed, repeatable-read, serializable",
            )),
        }
    }
}

impl FromStr for FailureMode {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match option_key(s).as_str() {
            "raise" | "throw" => Ok(FailureMode::Raise),
            "capture" => Ok(FailureMode::Capture),
            _ => Err(unknown_option("failure mode", s, "raise, capture")),
        }
    }
}

impl FromStr for ProcedureOutput {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match option_key(s).as_str() {
            "affectedrows" | "count" => Ok(ProcedureOutput::AffectedRows),
            "rows" => Ok(ProcedureOutput::Rows),
            _ => Err(unknown_option("procedure output", s, "affected-rows, rows")),
        }
    }
}

impl FromStr for ClassifierKind {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match option_key(s).as_str() {
            "prefix" => Ok(ClassifierKind::Prefix),
            "parsed" => Ok(ClassifierKind::Parsed),
            _ => Err(unknown_option("classifier", s, "prefix, parsed")),
        }
    }
}
