//! Purpose: Provide the HTTP/JSON endpoint spreadsheet clients call for pages and metadata.
//! Exports: `ServeConfig`, `serve`, `router`.
//! Role: Axum server translating query parameters into `Repager` calls.
//! Invariants: Query parameter names match the spreadsheet client (`datasetid`, `pageindex`, ...).
//! Invariants: Error bodies are `{"error", "message"}` or the host's verbatim body.
//! Invariants: Loopback-only unless explicitly allowed; non-loopback binds require a token.
//! Notes: Host calls block, so each request runs on the blocking pool.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::trace::TraceLayer;

use reportpager::api::{Error, ErrorKind, ReportHost, ReportId, Repager};

type SharedRepager = Repager<Arc<dyn ReportHost>>;

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub token: Option<String>,
    pub allow_non_loopback: bool,
    pub host_page_size: u32,
}

struct AppState {
    repager: SharedRepager,
    token: Option<String>,
}

pub async fn serve(config: ServeConfig, host: Arc<dyn ReportHost>) -> Result<(), Error> {
    validate_config(&config)?;
    let repager = Repager::new(host).with_host_page_size(config.host_page_size)?;
    let host_page_size = repager.host_page_size();
    let app = router(repager, config.token.clone());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    tracing::info!(bind = %config.bind, host_page_size, "serving report pages");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

pub fn router(repager: SharedRepager, token: Option<String>) -> Router {
    let state = Arc::new(AppState { repager, token });
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v0/page", get(get_page))
        .route("/v0/metadata", get(get_metadata))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if is_loopback(config.bind.ip()) {
        return Ok(());
    }
    if !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }
    if config.token.is_none() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires a bearer token")
            .with_hint("Pass --token-file so spreadsheet clients must authenticate."));
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

fn authorize(headers: &HeaderMap, state: &AppState) -> Result<(), Error> {
    let Some(token) = state.token.as_ref() else {
        return Ok(());
    };
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Err(Error::new(ErrorKind::Permission).with_message("missing bearer token"));
    };
    let value = value.to_str().unwrap_or_default();
    if value != format!("Bearer {token}") {
        return Err(Error::new(ErrorKind::Permission).with_message("invalid bearer token"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    datasetid: Option<String>,
    pageindex: Option<String>,
    pagestoload: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataQuery {
    datasetid: Option<String>,
    pagestoload: Option<String>,
    employeeemail: Option<String>,
}

async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn get_page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Response {
    if let Err(err) = authorize(&headers, &state) {
        return error_response(err);
    }
    let params = required_report_id(query.datasetid).and_then(|report_id| {
        let page_index = parse_count("pageindex", query.pageindex.as_deref(), Some(0))?;
        let pages_to_load = parse_count("pagestoload", query.pagestoload.as_deref(), None)?;
        Ok((report_id, page_index, pages_to_load))
    });
    let (report_id, page_index, pages_to_load) = match params {
        Ok(params) => params,
        Err(err) => return error_response(err),
    };

    let result = tokio::task::spawn_blocking(move || {
        state
            .repager
            .get_page(&report_id, page_index, pages_to_load)
    })
    .await;
    match flatten_join(result) {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_metadata(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<MetadataQuery>,
) -> Response {
    if let Err(err) = authorize(&headers, &state) {
        return error_response(err);
    }
    let params = required_report_id(query.datasetid).and_then(|report_id| {
        let pages_to_load = parse_count("pagestoload", query.pagestoload.as_deref(), None)?;
        Ok((report_id, pages_to_load))
    });
    let (report_id, pages_to_load) = match params {
        Ok(params) => params,
        Err(err) => return error_response(err),
    };
    let employee_email = query.employeeemail.filter(|email| !email.is_empty());

    let result = tokio::task::spawn_blocking(move || {
        state
            .repager
            .get_metadata(&report_id, pages_to_load, employee_email.as_deref())
    })
    .await;
    match flatten_join(result) {
        Ok(metadata) => Json(metadata).into_response(),
        Err(err) => error_response(err),
    }
}

/// Present and of a recognized kind; checked before any other parameter.
fn required_report_id(value: Option<String>) -> Result<String, Error> {
    let report_id = value.filter(|id| !id.is_empty()).ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message("missing datasetid")
            .with_hint("Pass the dataset or saved search id as ?datasetid=...")
    })?;
    ReportId::parse(report_id.as_str())?;
    Ok(report_id)
}

fn parse_count(name: &str, value: Option<&str>, default: Option<u64>) -> Result<u64, Error> {
    match (value.map(str::trim).filter(|raw| !raw.is_empty()), default) {
        (Some(raw), _) => raw.parse::<u64>().map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("{name} must be a non-negative integer"))
                .with_source(err)
        }),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(Error::new(ErrorKind::Usage).with_message(format!("missing {name}"))),
    }
}

fn flatten_join<T>(result: Result<Result<T, Error>, tokio::task::JoinError>) -> Result<T, Error> {
    result.unwrap_or_else(|err| {
        Err(Error::new(ErrorKind::Internal)
            .with_message("request worker failed")
            .with_source(err))
    })
}

fn error_response(err: Error) -> Response {
    let status = match err.kind() {
        ErrorKind::Usage | ErrorKind::InvalidReportId => StatusCode::BAD_REQUEST,
        ErrorKind::Permission => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Host | ErrorKind::Io => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err.payload())).into_response()
}
