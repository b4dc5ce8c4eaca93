use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "mysqltask",
    about = "Run SQL commands and stored procedures against MySQL with normalized output"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short = 'c', long, global = true, env = "MYSQLTASK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit diagnostics to stderr
    #[arg(short = 'v', long, global = true, env = "MYSQLTASK_VERBOSE")]
    pub verbose: bool,

    /// Disable credential masking
    #[arg(long, global = true, env = "MYSQLTASK_SHOW_SECRETS")]
    pub show_secrets: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute SQL text
    Query(QueryArgs),

    /// Call a stored procedure
    Procedure(ProcedureArgs),
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// SQL command text
    pub sql: Option<String>,

    /// Read SQL from file
    #[arg(short = 'f', long = "file", conflicts_with = "sql")]
    pub sql_file: Option<PathBuf>,

    #[command(flatten)]
    pub exec: ExecArgs,
}

#[derive(Args, Debug)]
pub struct ProcedureArgs {
    /// Procedure name, optionally schema-qualified
    pub name: String,

    #[command(flatten)]
    pub exec: ExecArgs,
}

/// Options shared by `query` and `procedure`.
#[derive(Args, Debug, Default)]
pub struct ExecArgs {
    /// Connection string (`server=...;uid=...;pwd=...;database=...` or mysql:// URL)
    #[arg(long, env = "MYSQLTASK_CONNECTION_STRING", hide_env_values = true)]
    pub connection_string: Option<String>,

    /// Config file profile name
    #[arg(short = 'P', long, env = "MYSQLTASK_PROFILE")]
    pub profile: Option<String>,

    /// Parameter as NAME=VALUE; VALUE is read as a JSON scalar, otherwise text
    #[arg(short = 'p', long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// Command timeout in seconds, 0 disables (default: 30)
    #[arg(short = 't', long, env = "MYSQLTASK_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Isolation level: none, default, read-uncommitted, read-committed,
    /// repeatable-read, serializable
    #[arg(short = 'i', long, env = "MYSQLTASK_ISOLATION")]
    pub isolation: Option<String>,

    /// Report failures as {"success": false, ...} instead of an error
    #[arg(long)]
    pub capture_failures: bool,

    /// Stored procedure result: affected-rows or rows
    #[arg(long, env = "MYSQLTASK_PROCEDURE_OUTPUT")]
    pub procedure_output: Option<String>,

    /// Command classifier: prefix or parsed
    #[arg(long, env = "MYSQLTASK_CLASSIFIER")]
    pub classifier: Option<String>,

    /// Output format: json, toon or csv
    #[arg(long, env = "MYSQLTASK_FORMAT")]
    pub format: Option<String>,

    /// Write results to file instead of stdout
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}
