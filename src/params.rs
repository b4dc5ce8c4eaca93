use std::collections::HashSet;

use crate::backend::{BoundStatement, SqlValue};
use crate::error::TaskError;
use crate::request::{CommandKind, CommandRequest, Parameter};

/// Caller parameters after validation, in declaration order, names verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: Vec<(String, SqlValue)>,
}

impl ParameterSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Look up a placeholder reference. `@Name` in the text matches a
    /// parameter declared either as `Name` or as `@Name`.
    fn lookup(&self, ident: &str, sigil: char) -> Option<&SqlValue> {
        self.entries
            .iter()
            .find(|(n, _)| {
                n == ident
                    || n.strip_prefix(sigil) == Some(ident)
            })
            .map(|(_, v)| v)
    }
}

/// Validate caller parameters into a [`ParameterSet`].
///
/// Names are kept exactly as given. Empty names and duplicates are rejected;
/// an empty list is valid.
pub fn bind(parameters: &[Parameter]) -> Result<ParameterSet, TaskError> {
    let mut seen = HashSet::with_capacity(parameters.len());
    let mut entries = Vec::with_capacity(parameters.len());

    for param in parameters {
        if param.name.trim().is_empty() {
            return Err(TaskError::invalid_argument("parameter name must not be empty"));
        }
        if !seen.insert(param.name.as_str()) {
            return Err(TaskError::invalid_argument(format!(
                "duplicate parameter name: '{}'",
                param.name
            )));
        }
        if let SqlValue::Decimal(text) = &param.value
            && !is_decimal_literal(text)
        {
            return Err(TaskError::invalid_argument(format!(
                "parameter '{}' is not a valid decimal: '{}'",
                param.name, text
            )));
        }
        entries.push((param.name.clone(), param.value.clone()));
    }

    Ok(ParameterSet { entries })
}

/// Build the driver statement for a request.
pub fn prepare(request: &CommandRequest, params: &ParameterSet) -> Result<BoundStatement, TaskError> {
    match request.kind {
        CommandKind::Text => Ok(expand_placeholders(&request.text, params)),
        CommandKind::StoredProcedure => procedure_call(&request.text, params),
    }
}

/// Rewrite `@name` / `?name` references to positional `?` markers.
///
/// String literals, quoted identifiers, comments, `@@system` variables and
/// `@vars` without a matching parameter pass through untouched.
pub fn expand_placeholders(sql: &str, params: &ParameterSet) -> BoundStatement {
    if params.is_empty() {
        return BoundStatement::new(sql);
    }

    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut args = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                let end = skip_quoted(&chars, i, c);
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-')
                && chars.get(i + 2).is_none_or(|c| c.is_whitespace()) =>
            {
                let end = skip_line(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '#' => {
                let end = skip_line(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = skip_block_comment(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '@' if chars.get(i + 1) == Some(&'@') => {
                // System variable: copy the sigils and the name verbatim.
                let end = ident_end(&chars, i + 2);
                out.extend(&chars[i..end]);
                i = end;
            }
            '@' | '?' => {
                let end = ident_end(&chars, i + 1);
                let ident: String = chars[i + 1..end].iter().collect();
                match (ident.is_empty(), params.lookup(&ident, c)) {
                    (false, Some(value)) => {
                        out.push('?');
                        args.push(value.clone());
                        i = end;
                    }
                    _ => {
                        out.push(c);
                        i += 1;
                    }
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    BoundStatement { sql: out, args }
}

/// A validated stored procedure name, optionally schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureName {
    pub schema: Option<String>,
    pub name: String,
}

impl ProcedureName {
    /// Parse `name`, `schema.name`, or either part in backticks.
    pub fn parse(text: &str) -> Result<Self, TaskError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TaskError::invalid_argument("stored procedure name must not be empty"));
        }

        let mut parts = Vec::with_capacity(2);
        for part in text.split('.') {
            let part = part.trim();
            let bare = part
                .strip_prefix('`')
                .and_then(|p| p.strip_suffix('`'))
                .unwrap_or(part);
            if bare.is_empty() || !bare.chars().all(is_ident_char) {
                return Err(TaskError::invalid_argument(format!(
                    "invalid stored procedure name: '{text}'"
                )));
            }
            parts.push(bare.to_string());
        }

        match parts.as_slice() {
            [name] => Ok(Self {
                schema: None,
                name: name.clone(),
            }),
            [schema, name] => Ok(Self {
                schema: Some(schema.clone()),
                name: name.clone(),
            }),
            _ => Err(TaskError::invalid_argument(format!(
                "invalid stored procedure name: '{text}'"
            ))),
        }
    }

    fn call(&self, args: Vec<SqlValue>) -> BoundStatement {
        let target = match &self.schema {
            Some(schema) => format!("`{schema}`.`{}`", self.name),
            None => format!("`{}`", self.name),
        };
        let placeholders = vec!["?"; args.len()].join(", ");
        BoundStatement {
            sql: format!("CALL {target}({placeholders})"),
            args,
        }
    }
}

impl std::fmt::Display for ProcedureName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// `CALL` text for a stored procedure, arguments in declaration order.
///
/// Used when the routine's own parameter list is unavailable; see
/// [`procedure_call_by_name`].
pub fn procedure_call(name: &str, params: &ParameterSet) -> Result<BoundStatement, TaskError> {
    let procedure = ProcedureName::parse(name)?;
    Ok(procedure.call(params.iter().map(|(_, v)| v.clone()).collect()))
}

/// `CALL` text with arguments placed by the routine's parameter names.
///
/// `routine_params` lists the routine's parameters in ordinal order. Names
/// match case-insensitively and a leading `@` or `?` on the caller's name is
/// ignored. Every routine parameter must be supplied exactly once, and a
/// caller parameter the routine does not declare is rejected.
pub fn procedure_call_by_name(
    procedure: &ProcedureName,
    routine_params: &[String],
    params: &ParameterSet,
) -> Result<BoundStatement, TaskError> {
    let mut used = vec![false; params.len()];
    let mut args = Vec::with_capacity(routine_params.len());

    for routine_param in routine_params {
        let mut matched = params
            .iter()
            .enumerate()
            .filter(|(_, (name, _))| bare_name(name).eq_ignore_ascii_case(routine_param));
        let Some((idx, (_, value))) = matched.next() else {
            return Err(TaskError::invalid_argument(format!(
                "parameter '{routine_param}' of stored procedure '{procedure}' was not supplied"
            )));
        };
        if matched.next().is_some() {
            return Err(TaskError::invalid_argument(format!(
                "parameter '{routine_param}' of stored procedure '{procedure}' is supplied more than once"
            )));
        }
        used[idx] = true;
        args.push(value.clone());
    }

    for ((name, _), used) in params.iter().zip(used) {
        if !used {
            return Err(TaskError::invalid_argument(format!(
                "stored procedure '{procedure}' has no parameter named '{name}'"
            )));
        }
    }

    Ok(procedure.call(args))
}

fn bare_name(name: &str) -> &str {
    name.strip_prefix(['@', '?']).unwrap_or(name)
}

/// Optional sign, digits with at most one decimal point, optional exponent.
pub fn is_decimal_literal(text: &str) -> bool {
    let s = text.trim();
    let s = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
        None => (s, None),
    };

    let mut digits = 0;
    let mut dots = 0;
    for c in mantissa.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return false,
        }
    }
    if digits == 0 || dots > 1 {
        return false;
    }

    match exponent {
        None => true,
        Some(exp) => {
            let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            !exp.is_empty() && exp.chars().all(|c| c.is_ascii_digit())
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn ident_end(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && is_ident_char(chars[end]) {
        end += 1;
    }
    end
}

/// Index just past the closing quote; doubled quotes and backslash escapes
/// stay inside the literal. Unterminated literals run to the end.
fn skip_quoted(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && quote != '`' {
            i += 2;
            continue;
        }
        if c == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn skip_line(chars: &[char], start: usize) -> usize {
    chars[start..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(chars.len(), |p| start + p)
}

fn skip_block_comment(chars: &[char], start: usize) -> usize {
    let mut i = start + 2;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}
