use crate::backend::SqlValue;
use crate::cli::ExecArgs;
use crate::error::TaskError;
use crate::format_detect::OutputFormat;
use crate::params;
use crate::request::{
    ClassifierKind, DEFAULT_TIMEOUT_SECS, ExecutionOptions, FailureMode, IsolationLevel, Parameter,
    ProcedureOutput,
};
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub connection_string: SecretString,
    pub options: ExecutionOptions,
    pub parameters: Vec<Parameter>,
    /// Explicit `--format` or config default; `None` means detect from `-o`.
    pub format: Option<OutputFormat>,
    pub verbose: bool,
    pub show_secrets: bool,
    pub output_file: Option<PathBuf>,
}

// --- TOML config file structs ---

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    defaults: TomlDefaults,
    #[serde(default)]
    profiles: HashMap<String, TomlProfile>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDefaults {
    timeout: Option<u64>,
    isolation: Option<String>,
    failure_mode: Option<String>,
    procedure_output: Option<String>,
    classifier: Option<String>,
    format: Option<String>,
    verbose: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
struct TomlProfile {
    connection_string: Option<String>,
    connection_string_env: Option<String>,
}

/// Where the config file lives and whether the user named it.
struct ResolvedConfigPath {
    path: PathBuf,
    /// true if user explicitly specified via --config or MYSQLTASK_CONFIG
    explicit: bool,
}

/// Resolve the config file path: --config flag > env var > platform default.
fn resolve_config_path(cli_config: Option<&PathBuf>) -> Option<ResolvedConfigPath> {
    if let Some(path) = cli_config {
        return Some(ResolvedConfigPath { path: path.clone(), explicit: true });
    }
    if let Ok(path) = std::env::var("MYSQLTASK_CONFIG") {
        return Some(ResolvedConfigPath { path: PathBuf::from(path), explicit: true });
    }
    ProjectDirs::from("", "", "mysqltask")
        .map(|dirs| ResolvedConfigPath {
            path: dirs.config_dir().join("config.toml"),
            explicit: false,
        })
}

/// Load and parse the TOML config file (if it exists).
fn load_toml_config(resolved: Option<&ResolvedConfigPath>) -> Result<TomlConfig, TaskError> {
    let resolved = match resolved {
        Some(r) => r,
        None => return Ok(TomlConfig::default()),
    };

    if !resolved.path.exists() {
        if resolved.explicit {
            return Err(TaskError::Config {
                message: format!("config file not found: {}", resolved.path.display()),
            });
        }
        // A missing platform default is not an error
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&resolved.path).map_err(|e| TaskError::Config {
        message: format!("cannot read config file {}: {}", resolved.path.display(), e),
    })?;

    toml::from_str(&content).map_err(|e| TaskError::Config {
        message: format!("invalid config file {}: {}", resolved.path.display(), e),
    })
}

/// Resolve a secret from direct value, env indirection, or env var.
fn resolve_secret(
    direct: Option<&str>,
    env_key: Option<&str>,
    fallback_env: &str,
) -> Option<SecretString> {
    // Direct value first
    if let Some(val) = direct
        && !val.is_empty() {
            return Some(SecretString::from(val.to_string()));
        }
    // Env indirection (e.g., connection_string_env = "CRM_DB")
    if let Some(key) = env_key
        && let Ok(val) = std::env::var(key)
            && !val.is_empty() {
                return Some(SecretString::from(val));
            }
    // Fallback env var (e.g., MYSQLTASK_CONNECTION_STRING)
    if let Ok(val) = std::env::var(fallback_env)
        && !val.is_empty() {
            return Some(SecretString::from(val));
        }
    None
}

/// CLI/env value first, then the config default, then the built-in default.
fn resolve_option<T>(cli: Option<&str>, toml: Option<&str>) -> Result<T, TaskError>
where
    T: FromStr<Err = TaskError> + Default,
{
    match cli.or(toml) {
        Some(value) => value.parse(),
        None => Ok(T::default()),
    }
}

/// Parse a `NAME=VALUE` command-line parameter.
///
/// Numeric literals become integers when they fit 64 bits and exact decimal
/// text otherwise; anything else that parses as a JSON scalar takes its JSON
/// type, and the rest is text.
pub fn parse_param_value(raw: &str) -> Result<Parameter, TaskError> {
    let (name, value) = raw.split_once('=').ok_or_else(|| TaskError::Config {
        message: format!("invalid parameter '{raw}': expected NAME=VALUE"),
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(TaskError::Config {
            message: format!("invalid parameter '{raw}': name must not be empty"),
        });
    }

    let value = if params::is_decimal_literal(value) && !has_leading_zero(value) {
        let digits = value.trim();
        if let Ok(i) = digits.parse::<i64>() {
            SqlValue::Int(i)
        } else if let Ok(u) = digits.parse::<u64>() {
            SqlValue::UInt(u)
        } else {
            SqlValue::Decimal(digits.to_string())
        }
    } else {
        match serde_json::from_str::<serde_json::Value>(value) {
            Ok(json) if !json.is_array() && !json.is_object() => SqlValue::from_json(&json)?,
            _ => SqlValue::Text(value.to_string()),
        }
    };

    Ok(Parameter::new(name, value))
}

/// `007` is a code, not a number.
fn has_leading_zero(value: &str) -> bool {
    let digits = value.trim().trim_start_matches(['+', '-']);
    digits.len() > 1 && digits.starts_with('0') && digits.as_bytes()[1].is_ascii_digit()
}

/// Build AppConfig from query/procedure CLI args.
pub fn load_from_exec_args(
    args: &ExecArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<AppConfig, TaskError> {
    let resolved_path = resolve_config_path(config_path);
    let toml_config = load_toml_config(resolved_path.as_ref())?;

    // Load profile if specified
    let profile = args.profile.as_ref().map(|name| {
        toml_config.profiles.get(name).cloned().ok_or_else(|| TaskError::Config {
            message: format!("profile '{}' not found in config file", name),
        })
    }).transpose()?;

    let profile = profile.unwrap_or_default();

    // connection string: CLI/ENV > profile env indirection > profile value
    let connection_string = resolve_secret(
        args.connection_string.as_deref(),
        profile.connection_string_env.as_deref(),
        "MYSQLTASK_CONNECTION_STRING",
    )
    .or_else(|| {
        profile
            .connection_string
            .as_ref()
            .filter(|c| !c.is_empty())
            .map(|c| SecretString::from(c.clone()))
    })
    .ok_or_else(|| TaskError::Config {
        message: "no connection string specified, use --connection-string or configure a profile"
            .to_string(),
    })?;

    let defaults = &toml_config.defaults;

    // timeout: CLI/ENV > TOML > 30
    let timeout_secs = args
        .timeout
        .unwrap_or_else(|| defaults.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));

    let isolation: IsolationLevel =
        resolve_option(args.isolation.as_deref(), defaults.isolation.as_deref())?;

    // --capture-failures is a switch, so only the TOML default can say "raise"
    let failure_mode = if args.capture_failures {
        FailureMode::Capture
    } else {
        resolve_option(None, defaults.failure_mode.as_deref())?
    };

    let procedure_output: ProcedureOutput = resolve_option(
        args.procedure_output.as_deref(),
        defaults.procedure_output.as_deref(),
    )?;

    let classifier: ClassifierKind =
        resolve_option(args.classifier.as_deref(), defaults.classifier.as_deref())?;

    let format = args
        .format
        .as_deref()
        .or(defaults.format.as_deref())
        .map(OutputFormat::from_str)
        .transpose()?;

    let parameters = args
        .params
        .iter()
        .map(String::as_str)
        .map(parse_param_value)
        .collect::<Result<Vec<_>, _>>()?;

    // verbose: CLI/ENV OR TOML default
    let verbose = verbose || defaults.verbose.unwrap_or(false);

    Ok(AppConfig {
        connection_string,
        options: ExecutionOptions {
            timeout_secs,
            isolation,
            failure_mode,
            procedure_output,
            classifier,
        },
        parameters,
        format,
        verbose,
        show_secrets,
        output_file: args.output.clone(),
    })
}
