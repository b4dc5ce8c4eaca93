use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use crate::request::{ClassifierKind, CommandKind, ProcedureOutput};

/// How a command's result is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Query-and-materialize: drain a cursor into a row set.
    Rows,
    /// Execute-and-count: report the affected-row count.
    AffectedRows,
}

/// Decides the result shape of plain SQL text.
pub trait Classifier {
    fn shape_of(&self, sql: &str) -> ResultShape;
}

/// Leading verbs that make a statement count-producing.
pub const COUNT_VERBS: &[&str] = &[
    "update", "insert", "delete", "replace", "drop", "truncate", "create", "alter",
];

/// Looks only at the first word of the trimmed text.
///
/// Text starting with a comment, a `WITH` clause, or several statements
/// joined by `;` is classified by its first word alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixClassifier;

impl Classifier for PrefixClassifier {
    fn shape_of(&self, sql: &str) -> ResultShape {
        let first_word = sql
            .trim_start()
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();

        if COUNT_VERBS.contains(&first_word.as_str()) {
            ResultShape::AffectedRows
        } else {
            ResultShape::Rows
        }
    }
}

/// Parses the text with the MySQL dialect and inspects each statement.
/// Produces rows if any statement in the batch does. Falls back to
/// [`PrefixClassifier`] when the text does not parse.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParsedClassifier;

impl Classifier for ParsedClassifier {
    fn shape_of(&self, sql: &str) -> ResultShape {
        match Parser::parse_sql(&MySqlDialect {}, sql) {
            Ok(statements) if !statements.is_empty() => {
                if statements.iter().any(returns_rows) {
                    ResultShape::Rows
                } else {
                    ResultShape::AffectedRows
                }
            }
            _ => PrefixClassifier.shape_of(sql),
        }
    }
}

fn returns_rows(stmt: &Statement) -> bool {
    match stmt {
        Statement::Query(query) => query_body_returns_rows(&query.body),
        Statement::ExplainTable { .. } | Statement::Explain { .. } => true,
        Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowCreate { .. } => true,
        _ => false,
    }
}

fn query_body_returns_rows(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => query_body_returns_rows(&query.body),
        SetExpr::SetOperation { left, right, .. } => {
            query_body_returns_rows(left) || query_body_returns_rows(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        SetExpr::Insert(_) | SetExpr::Update(_) => false,
        _ => false,
    }
}

/// Shape for a whole request.
///
/// Stored procedures follow `procedure_output`; text goes through the
/// configured classifier.
pub fn classify(
    text: &str,
    kind: CommandKind,
    procedure_output: ProcedureOutput,
    classifier: ClassifierKind,
) -> ResultShape {
    match kind {
        CommandKind::StoredProcedure => match procedure_output {
            ProcedureOutput::AffectedRows => ResultShape::AffectedRows,
            ProcedureOutput::Rows => ResultShape::Rows,
        },
        CommandKind::Text => match classifier {
            ClassifierKind::Prefix => PrefixClassifier.shape_of(text),
            ClassifierKind::Parsed => ParsedClassifier.shape_of(text),
        },
    }
}
