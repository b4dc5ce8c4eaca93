use std::time::Duration;

use secrecy::SecretString;

use crate::error::TaskError;

pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// TLS requirement requested by the connection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disabled,
    #[default]
    Preferred,
    Required,
    VerifyCa,
    VerifyIdentity,
}

/// Settings extracted from a `key=value;` connection string.
#[derive(Debug)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub database: Option<String>,
    pub ssl_mode: SslMode,
    pub charset: Option<String>,
    pub connect_timeout: Duration,
}

/// Whether the descriptor is a driver URL rather than a keyword string.
pub fn is_url(descriptor: &str) -> bool {
    let lower = descriptor.trim_start().to_ascii_lowercase();
    lower.starts_with("mysql://") || lower.starts_with("mariadb://")
}

/// Keywords that are valid but have no equivalent here.
const IGNORED_KEYWORDS: &[&str] = &[
    "pooling",
    "minpoolsize",
    "maxpoolsize",
    "minimumpoolsize",
    "maximumpoolsize",
    "connectionlifetime",
    "connectionreset",
    "allowuservariables",
    "allowzerodatetime",
    "convertzerodatetime",
    "defaultcommandtimeout",
    "treattinyasboolean",
    "allowpublickeyretrieval",
    "persistsecurityinfo",
    "usecompression",
    "compress",
    "keepalive",
];

fn format_error(detail: impl std::fmt::Display) -> TaskError {
    TaskError::Connection {
        message: format!("format of the connection string is invalid: {detail}"),
    }
}

/// Parse a `server=...;uid=...;pwd=...;database=...;` connection string.
///
/// Keywords are case-insensitive and ignore inner spaces, so `User Id` and
/// `userid` are the same keyword. Values may be wrapped in single or double
/// quotes. A segment without `=` or an unknown keyword is an error.
pub fn parse(descriptor: &str) -> Result<ConnectionSettings, TaskError> {
    let mut host = None;
    let mut port = DEFAULT_PORT;
    let mut username = None;
    let mut password = None;
    let mut database = None;
    let mut ssl_mode = SslMode::default();
    let mut charset = None;
    let mut connect_timeout = DEFAULT_CONNECT_TIMEOUT;

    for segment in descriptor.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let Some((key, value)) = segment.split_once('=') else {
            return Err(format_error(format!("expected keyword=value, got '{segment}'")));
        };
        let key: String = key
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        let value = unquote(value.trim());

        match key.as_str() {
            "server" | "host" | "datasource" | "address" | "addr" | "networkaddress" => {
                // Multiple hosts may be listed; the first one is used.
                let first = value.split(',').next().unwrap_or("").trim();
                host = Some(first.to_string());
            }
            "port" => {
                port = value
                    .parse()
                    .map_err(|_| format_error(format!("invalid port '{value}'")))?;
            }
            "uid" | "userid" | "user" | "username" => username = Some(value.to_string()),
            "pwd" | "password" => password = Some(SecretString::from(value.to_string())),
            "database" | "initialcatalog" => database = Some(value.to_string()),
            "sslmode" => ssl_mode = parse_ssl_mode(value)?,
            "charset" | "characterset" => charset = Some(value.to_string()),
            "connecttimeout" | "connectiontimeout" => {
                let secs: u64 = value
                    .parse()
                    .map_err(|_| format_error(format!("invalid connect timeout '{value}'")))?;
                connect_timeout = Duration::from_secs(secs);
            }
            k if IGNORED_KEYWORDS.contains(&k) => {}
            _ => return Err(format_error(format!("keyword not supported: '{key}'"))),
        }
    }

    let host = host
        .filter(|h| !h.is_empty())
        .ok_or_else(|| format_error("no server specified"))?;

    // `host:port` is accepted as a shorthand.
    let (host, port) = match host.rsplit_once(':') {
        Some((h, p)) if !h.contains(':') => match p.parse() {
            Ok(p) => (h.to_string(), p),
            Err(_) => return Err(format_error(format!("invalid port '{p}'"))),
        },
        _ => (host, port),
    };

    Ok(ConnectionSettings {
        host,
        port,
        username,
        password,
        database: database.filter(|d| !d.is_empty()),
        ssl_mode,
        charset,
        connect_timeout,
    })
}

fn parse_ssl_mode(value: &str) -> Result<SslMode, TaskError> {
    let key: String = value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    match key.as_str() {
        "none" | "disabled" | "false" => Ok(SslMode::Disabled),
        "preferred" | "prefer" => Ok(SslMode::Preferred),
        "required" | "require" | "true" => Ok(SslMode::Required),
        "verifyca" => Ok(SslMode::VerifyCa),
        "verifyfull" | "verifyidentity" => Ok(SslMode::VerifyIdentity),
        _ => Err(format_error(format!("invalid ssl mode '{value}'"))),
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
