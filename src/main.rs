//! Purpose: `reportpager` CLI entry point.
//! Role: Binary crate root; parses args, initializes logging, runs commands, emits JSON on stdout.
//! Invariants: Successful commands print exactly one JSON document on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod host_config;
mod serve;

use reportpager::api::{Error, ErrorKind, HOST_PAGE_SIZE, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `reportpager --help` for usage."));
            }
        },
    };

    let default_filter = match cli.command {
        Command::Serve(_) => "info",
        _ => "warn",
    };
    init_tracing(cli.log_level.as_deref(), default_filter)?;

    command_dispatch::dispatch_command(cli.command, cli.host)
}

#[derive(Parser)]
#[command(
    name = "reportpager",
    version,
    about = "Re-paginate hosted datasets and saved searches into spreadsheet-sized pages",
    long_about = None,
    before_help = r#"Reports are paged by the host in 1000-row host pages. An output page is
`--pages-to-load` consecutive host pages; page 0 carries the header row.
"#,
    after_help = r#"EXAMPLES
  $ reportpager --host-url https://host.example.com metadata custdataset_sales --pages-to-load 5
  $ reportpager --host-url https://host.example.com page custdataset_sales --page-index 0 --pages-to-load 5
  $ reportpager --fixture reports.json page customsearch_customers
  $ reportpager plan --total-host-pages 10 --pages-to-load 3 --page-index 3
  $ reportpager --host-url https://host.example.com serve --bind 127.0.0.1:9710"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(flatten)]
    host: HostArgs,
    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        help = "Log filter for stderr (overrides RUST_LOG), e.g. debug or reportpager=trace"
    )]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Debug)]
struct HostArgs {
    #[arg(
        long,
        global = true,
        env = "REPORTPAGER_HOST_URL",
        value_name = "URL",
        help = "Base url of the report host API",
        help_heading = "Host"
    )]
    host_url: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        help = "Serve reports from a JSON fixture instead of a remote host",
        help_heading = "Host"
    )]
    fixture: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "REPORTPAGER_TOKEN",
        hide_env_values = true,
        help = "Bearer token for the report host (dev-only; prefer --host-token-file)",
        help_heading = "Host"
    )]
    host_token: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        help = "Read the report host bearer token from file",
        help_heading = "Host"
    )]
    host_token_file: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        default_value_t = HOST_PAGE_SIZE,
        help = "Rows per host page (5-1000)",
        help_heading = "Host"
    )]
    host_page_size: u32,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Fetch one output page of a report",
        after_help = r#"EXAMPLES
  $ reportpager page custdataset_sales --page-index 1 --pages-to-load 5"#
    )]
    Page {
        #[arg(help = "Dataset (custdataset...) or saved search (customsearch...) id")]
        report_id: String,
        #[arg(long, default_value_t = 0, help = "Output page index (0-based)")]
        page_index: u64,
        #[arg(long, default_value_t = 1, help = "Host pages per output page")]
        pages_to_load: u64,
    },
    #[command(about = "Report name, type, row count and output page range")]
    Metadata {
        #[arg(help = "Dataset (custdataset...) or saved search (customsearch...) id")]
        report_id: String,
        #[arg(long, default_value_t = 1, help = "Host pages per output page")]
        pages_to_load: u64,
        #[arg(long, value_name = "EMAIL", help = "Requesting employee email (audit log only)")]
        employee_email: Option<String>,
    },
    #[command(about = "Show which host pages make up an output page (no host calls)")]
    Plan {
        #[arg(long, help = "Host pages reported by the host")]
        total_host_pages: u64,
        #[arg(long, default_value_t = 1, help = "Host pages per output page")]
        pages_to_load: u64,
        #[arg(long, default_value_t = 0, help = "Output page index (0-based)")]
        page_index: u64,
    },
    #[command(about = "Serve pages and metadata over HTTP")]
    Serve(ServeArgs),
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version information as JSON")]
    Version,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(
        long,
        default_value = "127.0.0.1:9710",
        help = "Bind address",
        help_heading = "Connection"
    )]
    bind: String,
    #[arg(
        long,
        help = "Bearer token clients must send (dev-only; prefer --token-file)",
        help_heading = "Authentication"
    )]
    token: Option<String>,
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath, help = "Read client bearer token from file", help_heading = "Authentication")]
    token_file: Option<PathBuf>,
    #[arg(
        long,
        help = "Allow non-loopback binds (requires a token)",
        help_heading = "Safety"
    )]
    allow_non_loopback: bool,
}

fn init_tracing(filter: Option<&str>, default_filter: &str) -> Result<(), Error> {
    let env_filter = match filter {
        Some(filter) => EnvFilter::try_new(filter).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid --log-level filter")
                .with_hint("Use a level like debug, or a directive like reportpager=trace.")
                .with_source(err)
        })?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error:").trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn emit_json(value: &Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("code".to_string(), json!(err.kind().code()));
    inner.insert("message".to_string(), json!(err.display_message()));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(report_id) = err.report_id() {
        inner.insert("report_id".to_string(), json!(report_id));
    }
    if let Some(index) = err.host_page() {
        inner.insert("host_page".to_string(), json!(index));
    }
    if let Some(body) = err.remote_body() {
        inner.insert("remote".to_string(), body.clone());
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", err.display_message())];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(report_id) = err.report_id() {
        lines.push(format!("report: {report_id}"));
    }
    if let Some(index) = err.host_page() {
        lines.push(format!("host page: {index}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}
