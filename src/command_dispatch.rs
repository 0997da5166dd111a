//! Purpose: Hold top-level CLI command dispatch for `reportpager`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: `INVALID_REPORTID` prints its payload on stdout and exits with code 3.
//! Invariants: Other failures bubble up to `main` and are emitted on stderr.

use super::*;

use clap::CommandFactory;
use std::net::SocketAddr;
use std::sync::Arc;

use super::host_config::{HostSelection, open_host, resolve_token_value};
use reportpager::api::{PagePlan, ReportHost, ReportId, Repager, plan_output_page};

pub(super) fn dispatch_command(command: Command, host: HostArgs) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "reportpager", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_json(&json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Plan {
            total_host_pages,
            pages_to_load,
            page_index,
        } => {
            let plan = plan_output_page(total_host_pages, pages_to_load, page_index)?;
            emit_json(&plan_json(&plan));
            Ok(RunOutcome::ok())
        }
        Command::Page {
            report_id,
            page_index,
            pages_to_load,
        } => {
            if let Err(err) = ReportId::parse(report_id.as_str()) {
                return emit_result(Err(err));
            }
            let repager = open_repager(host)?;
            let result = repager.get_page(&report_id, page_index, pages_to_load);
            emit_result(result.and_then(|page| to_value(&page)))
        }
        Command::Metadata {
            report_id,
            pages_to_load,
            employee_email,
        } => {
            if let Err(err) = ReportId::parse(report_id.as_str()) {
                return emit_result(Err(err));
            }
            let repager = open_repager(host)?;
            let result = repager.get_metadata(&report_id, pages_to_load, employee_email.as_deref());
            emit_result(result.and_then(|metadata| to_value(&metadata)))
        }
        Command::Serve(args) => {
            let bind: SocketAddr = args.bind.parse().map_err(|_| {
                Error::new(ErrorKind::Usage)
                    .with_message("invalid bind address")
                    .with_hint("Use a host:port value like 127.0.0.1:9710.")
            })?;
            let token = resolve_token_value(args.token, args.token_file, "token")?;
            let config = serve::ServeConfig {
                bind,
                token,
                allow_non_loopback: args.allow_non_loopback,
                host_page_size: host.host_page_size,
            };
            let report_host = open_host(host_selection(host)?)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start async runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config, report_host))?;
            Ok(RunOutcome::ok())
        }
    }
}

fn host_selection(host: HostArgs) -> Result<HostSelection, Error> {
    let token = resolve_token_value(host.host_token, host.host_token_file, "host-token")?;
    Ok(HostSelection {
        host_url: host.host_url,
        fixture: host.fixture,
        token,
    })
}

fn open_repager(host: HostArgs) -> Result<Repager<Arc<dyn ReportHost>>, Error> {
    let host_page_size = host.host_page_size;
    let report_host = open_host(host_selection(host)?)?;
    Repager::new(report_host).with_host_page_size(host_page_size)
}

fn emit_result(result: Result<Value, Error>) -> Result<RunOutcome, Error> {
    match result {
        Ok(value) => {
            emit_json(&value);
            Ok(RunOutcome::ok())
        }
        Err(err) if err.kind() == ErrorKind::InvalidReportId => {
            emit_json(&err.payload());
            Ok(RunOutcome::with_code(to_exit_code(err.kind())))
        }
        Err(err) => Err(err),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode output json")
            .with_source(err)
    })
}

fn plan_json(plan: &PagePlan) -> Value {
    let fetch = plan.fetchable_host_pages();
    json!({
        "total_host_pages": plan.total_host_pages,
        "pages_to_load": plan.pages_to_load,
        "current_pageindex": plan.output_index,
        "total_pages": plan.total_output_pages,
        "pageindex_range": plan.page_index_range(),
        "in_range": plan.is_in_range(),
        "host_page_start": plan.host_page_start,
        "host_page_count": plan.host_page_count,
        "fetch_host_pages": { "start": fetch.start, "end": fetch.end },
    })
}
