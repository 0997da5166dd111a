//! Purpose: End-to-end tests for the remote host client and the HTTP server.
//! Exports: None (integration test module).
//! Role: Validate paging over TCP against a fake host, and the `/v0` endpoints of `serve`.
//! Invariants: The fake host runs in-process on a loopback port.
//! Invariants: Bounded waits avoid test flakiness.
//! Invariants: Server processes are cleaned up on drop.

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use reportpager::api::{ErrorKind, RemoteHost, Repager};
use serde::Deserialize;
use serde_json::{Value, json};
use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread::sleep;
use std::time::{Duration, Instant};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

const HOST_TOKEN: &str = "host-secret";
const ITEM_ROWS: u64 = 12;

static SERVER_LOCK: Mutex<()> = Mutex::new(());
static FAKE_HOST: OnceLock<String> = OnceLock::new();

#[derive(Deserialize)]
struct PageSizeQuery {
    page_size: u64,
}

#[derive(Deserialize)]
struct EmployeeQuery {
    email: String,
}

fn host_error(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "error": code, "message": message }))).into_response()
}

fn check_auth(headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {HOST_TOKEN}");
    match headers.get("authorization").and_then(|value| value.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(host_error(
            StatusCode::UNAUTHORIZED,
            "INVALID_LOGIN",
            "missing or invalid credentials",
        )),
    }
}

fn check_report(id: &str) -> Result<(), Response> {
    if id == "custdataset_items" {
        Ok(())
    } else {
        Err(host_error(
            StatusCode::NOT_FOUND,
            "RCRD_DSNT_EXIST",
            "That record does not exist.",
        ))
    }
}

async fn report(headers: HeaderMap, Path(id): Path<String>) -> Response {
    if let Err(resp) = check_auth(&headers).and_then(|()| check_report(&id)) {
        return resp;
    }
    Json(json!({
        "report": {
            "name": "Items",
            "type": "item",
            "columns": [{ "label": "SKU" }, { "label": "Qty" }]
        }
    }))
    .into_response()
}

async fn paged(
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<PageSizeQuery>,
) -> Response {
    if let Err(resp) = check_auth(&headers).and_then(|()| check_report(&id)) {
        return resp;
    }
    let page_count = ITEM_ROWS.div_ceil(query.page_size);
    Json(json!({ "paged": { "page_count": page_count, "count": ITEM_ROWS } })).into_response()
}

async fn page(
    headers: HeaderMap,
    Path((id, index)): Path<(String, u64)>,
    Query(query): Query<PageSizeQuery>,
) -> Response {
    if let Err(resp) = check_auth(&headers).and_then(|()| check_report(&id)) {
        return resp;
    }
    let start = index * query.page_size;
    if start >= ITEM_ROWS {
        return host_error(StatusCode::NOT_FOUND, "INVALID_PAGE", "page out of range");
    }
    let end = (start + query.page_size).min(ITEM_ROWS);
    let rows: Vec<Value> = (start..end)
        .map(|i| json!({ "values": [format!("SKU-{i}"), i] }))
        .collect();
    Json(json!({ "page": { "index": index, "rows": rows } })).into_response()
}

async fn employees(headers: HeaderMap, Query(query): Query<EmployeeQuery>) -> Response {
    if let Err(resp) = check_auth(&headers) {
        return resp;
    }
    let employees = if query.email == "ops@example.com" {
        json!([{ "id": "42" }])
    } else {
        json!([])
    };
    Json(json!({ "employees": employees })).into_response()
}

fn fake_host_router() -> Router {
    Router::new()
        .route("/api/v1/reports/:id", get(report))
        .route("/api/v1/reports/:id/paged", get(paged))
        .route("/api/v1/reports/:id/pages/:index", get(page))
        .route("/api/v1/employees", get(employees))
}

/// Starts the fake host once per test binary and returns its `/api` base url.
fn fake_host_url() -> TestResult<String> {
    if let Some(url) = FAKE_HOST.get() {
        return Ok(url.clone());
    }
    let listener = TcpListener::bind("127.0.0.1:0")?;
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("fake host runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).expect("fake host listener");
            axum::serve(listener, fake_host_router())
                .await
                .expect("fake host serve");
        });
    });
    wait_for_url(&format!("http://{addr}/api/v1/employees?email=ready"))?;
    Ok(FAKE_HOST
        .get_or_init(|| format!("http://{addr}/api"))
        .clone())
}

fn remote_host() -> TestResult<RemoteHost> {
    Ok(RemoteHost::new(fake_host_url()?)?.with_token(HOST_TOKEN))
}

struct TestServer {
    child: Child,
    base_url: String,
    _server_guard: MutexGuard<'static, ()>,
}

impl TestServer {
    fn start(host_args: &[&str], serve_args: &[&str]) -> TestResult<Self> {
        let guard = SERVER_LOCK
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut last_err: Option<Box<dyn std::error::Error>> = None;
        for _attempt in 0..3 {
            let port = pick_port()?;
            let bind = format!("127.0.0.1:{port}");
            let base_url = format!("http://{bind}");

            let mut command = Command::new(env!("CARGO_BIN_EXE_reportpager"));
            command
                .env_remove("REPORTPAGER_HOST_URL")
                .env_remove("REPORTPAGER_TOKEN")
                .args(host_args)
                .arg("serve")
                .arg("--bind")
                .arg(&bind)
                .args(serve_args)
                .stdout(Stdio::null())
                .stderr(Stdio::piped());
            let mut child = command.spawn()?;

            match wait_for_server(&mut child, bind.parse()?) {
                Ok(()) => {
                    return Ok(Self {
                        child,
                        base_url,
                        _server_guard: guard,
                    });
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    last_err = Some(err);
                    sleep(Duration::from_millis(30));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "server failed to start".into()))
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{path_and_query}", self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn write_fixture(dir: &std::path::Path) -> TestResult<std::path::PathBuf> {
    let fixture = json!({
        "reports": [{
            "id": "customsearch_open_orders",
            "name": "Open Orders",
            "type": "salesorder",
            "columns": [
                { "key": "tranid", "label": "Order" },
                { "key": "entity", "label": "Customer" }
            ],
            "rows": [
                { "values": { "tranid": "SO-1", "entity": [{ "value": "3", "text": "Acme" }] } },
                { "values": { "tranid": "SO-2", "entity": [{ "value": "4", "text": "Globex" }] } }
            ]
        }],
        "employees": {}
    });
    let path = dir.join("fixture.json");
    std::fs::write(&path, serde_json::to_vec(&fixture)?)?;
    Ok(path)
}

fn status_and_body(result: Result<ureq::Response, ureq::Error>) -> TestResult<(u16, Value)> {
    match result {
        Ok(resp) => Ok((resp.status(), serde_json::from_str(&resp.into_string()?)?)),
        Err(ureq::Error::Status(code, resp)) => Ok((code, serde_json::from_str(&resp.into_string()?)?)),
        Err(err) => Err(err.into()),
    }
}

#[test]
fn remote_host_pages_through_repager() -> TestResult<()> {
    let repager = Repager::new(remote_host()?).with_host_page_size(5)?;

    let first = repager.get_page("custdataset_items", 0, 2)?;
    assert_eq!(first.total_rows, ITEM_ROWS);
    assert_eq!(first.total_pages, 2);
    assert_eq!(first.pageindex_range, "0-1");
    assert_eq!(first.data.len(), 11);
    assert_eq!(first.data[0], vec!["SKU", "Qty"]);
    assert_eq!(first.data[10], vec!["SKU-9", "9"]);

    let last = repager.get_page("custdataset_items", 1, 2)?;
    assert_eq!(last.current_pageindex, 1);
    assert_eq!(
        last.data,
        vec![vec!["SKU-10".to_string(), "10".to_string()], vec![
            "SKU-11".to_string(),
            "11".to_string()
        ]]
    );
    Ok(())
}

#[test]
fn remote_metadata_resolves_employee() -> TestResult<()> {
    let repager = Repager::new(remote_host()?).with_host_page_size(5)?;
    let metadata = repager.get_metadata("custdataset_items", 3, Some("ops@example.com"))?;
    assert_eq!(metadata.dataset_name, "Items");
    assert_eq!(metadata.total_pages, 1);
    assert_eq!(metadata.pageindex_range, "0-0");

    let unknown = repager.get_metadata("custdataset_items", 3, Some("nobody@example.com"))?;
    assert_eq!(unknown, metadata);
    Ok(())
}

#[test]
fn remote_not_found_keeps_host_body() -> TestResult<()> {
    let repager = Repager::new(remote_host()?);
    let err = repager
        .get_page("custdataset_missing", 0, 1)
        .expect_err("missing report");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.report_id(), Some("custdataset_missing"));
    assert_eq!(
        err.payload(),
        json!({ "error": "RCRD_DSNT_EXIST", "message": "That record does not exist." })
    );
    Ok(())
}

#[test]
fn remote_missing_token_is_permission_error() -> TestResult<()> {
    let repager = Repager::new(RemoteHost::new(fake_host_url()?)?);
    let err = repager
        .get_metadata("custdataset_items", 1, None)
        .expect_err("unauthorized");
    assert_eq!(err.kind(), ErrorKind::Permission);
    assert_eq!(err.payload()["error"], "INVALID_LOGIN");
    Ok(())
}

#[test]
fn serve_pages_fixture_reports() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let fixture = write_fixture(temp_dir.path())?;
    let fixture = fixture.to_string_lossy().into_owned();
    let server = TestServer::start(&["--fixture", &fixture], &[])?;

    let (status, page) = status_and_body(
        ureq::get(&server.url(
            "/v0/page?datasetid=customsearch_open_orders&pageindex=0&pagestoload=1",
        ))
        .call(),
    )?;
    assert_eq!(status, 200);
    assert_eq!(page["search_name"], "Open Orders");
    assert_eq!(page["type"], "salesorder");
    assert_eq!(
        page["data"],
        json!([["Order", "Customer"], ["SO-1", "Acme"], ["SO-2", "Globex"]])
    );

    let (status, metadata) = status_and_body(
        ureq::get(&server.url("/v0/metadata?datasetid=customsearch_open_orders&pagestoload=1"))
            .call(),
    )?;
    assert_eq!(status, 200);
    assert_eq!(metadata["dataset_name"], "Open Orders");
    assert_eq!(metadata["total_rows"], 2);
    assert_eq!(metadata["pageindex_range"], "0-0");
    Ok(())
}

#[test]
fn serve_reports_errors_with_status() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let fixture = write_fixture(temp_dir.path())?;
    let fixture = fixture.to_string_lossy().into_owned();
    let server = TestServer::start(&["--fixture", &fixture], &[])?;

    let invalid_id = json!({
        "error": "INVALID_REPORTID",
        "message": "The dataset/saved search id is invalid"
    });
    for path in [
        "/v0/page?datasetid=foo123&pagestoload=1",
        "/v0/page?datasetid=foo123",
        "/v0/page?datasetid=foo123&pageindex=x&pagestoload=abc",
        "/v0/metadata?datasetid=foo123",
        "/v0/metadata?datasetid=foo123&pagestoload=abc",
    ] {
        let (status, body) = status_and_body(ureq::get(&server.url(path)).call())?;
        assert_eq!(status, 400, "{path}");
        assert_eq!(body, invalid_id, "{path}");
    }

    let (status, body) = status_and_body(
        ureq::get(&server.url("/v0/page?datasetid=customsearch_open_orders")).call(),
    )?;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "INVALID_ARGUMENT");

    let (status, _) = status_and_body(
        ureq::get(&server.url("/v0/metadata?datasetid=customsearch_gone&pagestoload=1")).call(),
    )?;
    assert_eq!(status, 404);
    Ok(())
}

#[test]
fn serve_requires_bearer_token() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let fixture = write_fixture(temp_dir.path())?;
    let fixture = fixture.to_string_lossy().into_owned();
    let server = TestServer::start(&["--fixture", &fixture], &["--token", "client-secret"])?;
    let url = server.url("/v0/metadata?datasetid=customsearch_open_orders&pagestoload=1");

    let (status, _) = status_and_body(ureq::get(&url).call())?;
    assert_eq!(status, 401);

    let (status, _) = status_and_body(
        ureq::get(&url)
            .set("Authorization", "Bearer wrong")
            .call(),
    )?;
    assert_eq!(status, 401);

    let (status, body) = status_and_body(
        ureq::get(&url)
            .set("Authorization", "Bearer client-secret")
            .call(),
    )?;
    assert_eq!(status, 200);
    assert_eq!(body["total_pages"], 1);
    Ok(())
}

#[test]
fn serve_proxies_remote_host() -> TestResult<()> {
    let host_url = fake_host_url()?;
    let server = TestServer::start(
        &[
            "--host-url",
            &host_url,
            "--host-token",
            HOST_TOKEN,
            "--host-page-size",
            "5",
        ],
        &[],
    )?;

    let (status, page) = status_and_body(
        ureq::get(&server.url("/v0/page?datasetid=custdataset_items&pageindex=2&pagestoload=1"))
            .call(),
    )?;
    assert_eq!(status, 200);
    assert_eq!(page["dataset_name"], "Items");
    assert_eq!(page["total_pages"], 3);
    assert_eq!(page["data"], json!([["SKU-10", "10"], ["SKU-11", "11"]]));

    let (status, body) = status_and_body(
        ureq::get(&server.url("/v0/page?datasetid=custdataset_missing&pagestoload=1")).call(),
    )?;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "RCRD_DSNT_EXIST");
    Ok(())
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

// Any HTTP status means the listener is up.
fn wait_for_url(url: &str) -> TestResult<()> {
    let start = Instant::now();
    loop {
        match ureq::get(url).call() {
            Ok(_) | Err(ureq::Error::Status(..)) => return Ok(()),
            Err(_) if start.elapsed() > Duration::from_secs(8) => {
                return Err("fake host did not start in time".into());
            }
            Err(_) => sleep(Duration::from_millis(20)),
        }
    }
}

fn wait_for_server(child: &mut Child, addr: SocketAddr) -> TestResult<()> {
    let url = format!("http://{addr}/healthz");
    let start = Instant::now();
    loop {
        if let Ok(resp) = ureq::get(&url).call() {
            if resp.status() == 200 {
                return Ok(());
            }
        }
        if let Some(status) = child.try_wait()? {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let detail = stderr.trim();
            return Err(format!(
                "server exited before ready (status: {status}, stderr: {})",
                if detail.is_empty() { "<empty>" } else { detail }
            )
            .into());
        }
        if start.elapsed() > Duration::from_secs(8) {
            return Err("server did not start in time".into());
        }
        sleep(Duration::from_millis(20));
    }
}
