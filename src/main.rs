use clap::Parser;
use mysqltask::cli::{Cli, Command, ExecArgs, QueryArgs};
use mysqltask::error::TaskError;
use mysqltask::executor::{self, Outcome};
use mysqltask::format_detect::{self, OutputFormat};
use mysqltask::request::{CommandRequest, FailureMode};
use mysqltask::verbose::{self, Timer};
use mysqltask::{config, format, format_csv, masking, normalize::Payload, output};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    // Load .env file (optional, ignore if missing)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Query(ref args) => match resolve_sql(args) {
            Ok(sql) => {
                run(
                    CommandRequest::text(sql),
                    &args.exec,
                    cli.verbose,
                    cli.show_secrets,
                    cli.config.as_ref(),
                )
                .await
            }
            Err(err) => Err(err),
        },
        Command::Procedure(ref args) => {
            run(
                CommandRequest::procedure(args.name.clone()),
                &args.exec,
                cli.verbose,
                cli.show_secrets,
                cli.config.as_ref(),
            )
            .await
        }
    };

    match result {
        Ok(true) => {}
        // A captured failure was already rendered.
        Ok(false) => process::exit(1),
        Err(err) => {
            output::print_error(&err);
            process::exit(1);
        }
    }
}

/// Execute one request and render its outcome. Returns whether it succeeded.
async fn run(
    mut request: CommandRequest,
    args: &ExecArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<bool, TaskError> {
    let app_config = config::load_from_exec_args(args, verbose, show_secrets, config_path)?;
    let verbose = app_config.verbose;
    verbose::init_tracing(verbose);

    // Detect output format before executing (fail-fast on bad extension)
    let target = match &app_config.output_file {
        Some(path) => {
            let (detected, path) = format_detect::detect_format(path)?;
            output::ensure_parent_exists(&path)?;
            Some((app_config.format.unwrap_or(detected), path))
        }
        None => None,
    };
    let output_format = target
        .as_ref()
        .map(|(f, _)| *f)
        .or(app_config.format)
        .unwrap_or_default();

    request.parameters = app_config.parameters.clone();
    let options = app_config.options;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    verbose::emit(
        verbose,
        &format!(
            "connecting with {}...",
            masking::mask_connection_string(&app_config.connection_string, app_config.show_secrets)
        ),
    );
    verbose::emit(
        verbose,
        &format!(
            "executing {:?} command ({} parameters, isolation {:?}, timeout {}s)...",
            request.kind,
            request.parameters.len(),
            options.isolation,
            options.timeout_secs
        ),
    );
    let timer = Timer::start();
    let outcome = executor::execute_command(
        app_config.connection_string.expose_secret(),
        &request,
        &options,
        &cancel,
    )
    .await?;
    verbose::emit(
        verbose,
        &format!(
            "command complete ({}ms, {})",
            timer.elapsed_ms(),
            describe(&outcome)
        ),
    );

    verbose::emit(
        verbose,
        &format!("formatting {} output...", output_format.label()),
    );
    let envelope = options.failure_mode == FailureMode::Capture;
    emit_outcome(&outcome, output_format, envelope, target.map(|(_, p)| p), verbose)?;

    Ok(outcome.is_success())
}

// --- Helpers ---

fn resolve_sql(args: &QueryArgs) -> Result<String, TaskError> {
    if let Some(ref sql) = args.sql {
        return Ok(sql.clone());
    }
    if let Some(ref path) = args.sql_file {
        let content = std::fs::read_to_string(path).map_err(|e| TaskError::Config {
            message: format!("cannot read SQL file {}: {}", path.display(), e),
        })?;
        return Ok(content);
    }
    Err(TaskError::Config {
        message: "no SQL provided, use positional argument or --file".to_string(),
    })
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Success(Payload::Rows(rows)) => format!("{} rows", rows.len()),
        Outcome::Success(Payload::AffectedRows(count)) => format!("{count} rows affected"),
        Outcome::Failure { message } => format!("failed: {message}"),
    }
}

fn emit_outcome(
    outcome: &Outcome,
    output_format: OutputFormat,
    envelope: bool,
    path: Option<PathBuf>,
    verbose: bool,
) -> Result<(), TaskError> {
    match (output_format, outcome.payload()) {
        (OutputFormat::Csv, Some(payload)) => match &path {
            Some(p) => format_csv::write_csv(payload, p)?,
            None => format_csv::write_csv_to_writer(payload, std::io::stdout().lock())?,
        },
        _ => {
            let rendered = render_text(outcome, output_format, envelope)?;
            match &path {
                Some(p) => output::write_file(&rendered, p)?,
                None => output::print_result(&rendered),
            }
        }
    }

    if let Some(p) = path {
        verbose::emit(verbose, &format!("wrote output to {}", p.display()));
        let (rows, affected) = match outcome.payload() {
            Some(Payload::Rows(rows)) => (Some(rows.len()), None),
            Some(Payload::AffectedRows(count)) => (None, Some(*count)),
            None => (None, None),
        };
        output::print_summary(&output::summary(&p, output_format.label(), rows, affected))?;
    }
    Ok(())
}

/// JSON or TOON text. Captured outcomes (and a CSV failure, which has no
/// rows to write) use the `{success, message, result}` envelope.
fn render_text(
    outcome: &Outcome,
    output_format: OutputFormat,
    envelope: bool,
) -> Result<String, TaskError> {
    match (output_format, outcome) {
        (OutputFormat::Toon, Outcome::Success(payload)) if !envelope => format::to_toon(payload),
        (OutputFormat::Toon, _) => format::outcome_to_toon(outcome),
        (_, Outcome::Success(payload)) if !envelope => {
            format::to_json(&format::payload_to_json(payload))
        }
        _ => format::to_json(&format::outcome_to_json(outcome)),
    }
}
