//! Purpose: HTTP/JSON client for a report host platform's paging endpoints.
//! Exports: `RemoteHost`.
//! Role: Production `ReportHost`; one blocking request per trait call.
//! Invariants: Endpoints live under `{base}/v1/...`; a base path prefix is preserved.
//! Invariants: Error bodies that parse as JSON are kept verbatim on the returned `Error`.
//! Invariants: No retries; connect/read timeouts are the only transport policy.
#![allow(clippy::result_large_err)]

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::host::ReportHost;
use crate::core::error::{Error, ErrorKind};
use crate::core::report::{Column, HostPage, PagedRun, ReportHandle, ReportId};

type ApiResult<T> = Result<T, Error>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct RemoteHost {
    inner: Arc<RemoteHostInner>,
}

struct RemoteHostInner {
    base_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct ReportEnvelope {
    report: RemoteReport,
}

#[derive(Deserialize)]
struct RemoteReport {
    name: String,
    #[serde(rename = "type", default)]
    report_type: String,
    #[serde(default)]
    columns: Vec<Column>,
}

#[derive(Deserialize)]
struct PagedEnvelope {
    paged: RemotePaged,
}

#[derive(Deserialize)]
struct RemotePaged {
    page_count: u64,
    count: u64,
}

#[derive(Deserialize)]
struct PageEnvelope {
    page: HostPage,
}

#[derive(Deserialize)]
struct EmployeesEnvelope {
    #[serde(default)]
    employees: Vec<RemoteEmployee>,
}

#[derive(Deserialize)]
struct RemoteEmployee {
    id: String,
}

impl RemoteHost {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        Ok(Self {
            inner: Arc::new(RemoteHostInner {
                base_url,
                token: None,
                agent,
            }),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.token = Some(token.into());
        } else {
            self.inner = Arc::new(RemoteHostInner {
                base_url: self.inner.base_url.clone(),
                token: Some(token.into()),
                agent: self.inner.agent.clone(),
            });
        }
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn report_url(&self, id: &ReportId, tail: &[&str]) -> ApiResult<Url> {
        let mut segments = vec!["v1", "reports", id.as_str()];
        segments.extend_from_slice(tail);
        let mut url = build_url(&self.inner.base_url, &segments)?;
        url.query_pairs_mut().append_pair("kind", id.kind().as_str());
        Ok(url)
    }

    fn get_json<R: DeserializeOwned>(&self, url: &Url) -> ApiResult<R> {
        let mut request = self
            .inner
            .agent
            .get(url.as_str())
            .set("Accept", "application/json");
        if let Some(token) = &self.inner.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        tracing::trace!(url = %url, "host request");
        match request.call() {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("host request failed")
                .with_source(err)),
        }
    }
}

impl ReportHost for RemoteHost {
    fn load_report(&self, id: &ReportId) -> ApiResult<ReportHandle> {
        let url = self.report_url(id, &[])?;
        let envelope: ReportEnvelope = self
            .get_json(&url)
            .map_err(|err| err.with_report_id(id.as_str()))?;
        Ok(ReportHandle {
            id: id.clone(),
            name: envelope.report.name,
            report_type: envelope.report.report_type,
            columns: envelope.report.columns,
        })
    }

    fn run_paged(&self, report: &ReportHandle, page_size: u32) -> ApiResult<PagedRun> {
        let mut url = self.report_url(&report.id, &["paged"])?;
        url.query_pairs_mut()
            .append_pair("page_size", &page_size.to_string());
        let envelope: PagedEnvelope = self
            .get_json(&url)
            .map_err(|err| err.with_report_id(report.id.as_str()))?;
        Ok(PagedRun {
            report_id: report.id.clone(),
            page_size,
            total_host_pages: envelope.paged.page_count,
            total_rows: envelope.paged.count,
        })
    }

    fn fetch_host_page(&self, run: &PagedRun, index: u64) -> ApiResult<HostPage> {
        let index_segment = index.to_string();
        let mut url = self.report_url(&run.report_id, &["pages", &index_segment])?;
        url.query_pairs_mut()
            .append_pair("page_size", &run.page_size.to_string());
        let envelope: PageEnvelope = self.get_json(&url).map_err(|err| {
            err.with_report_id(run.report_id.as_str())
                .with_host_page(index)
        })?;
        Ok(envelope.page)
    }

    fn resolve_employee_id(&self, email: &str) -> ApiResult<Option<String>> {
        let mut url = build_url(&self.inner.base_url, &["v1", "employees"])?;
        url.query_pairs_mut()
            .append_pair("email", email)
            .append_pair("isinactive", "F");
        let envelope: EmployeesEnvelope = self.get_json(&url)?;
        Ok(envelope
            .employees
            .into_iter()
            .next()
            .map(|employee| employee.id))
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid host base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("host base url must use http or https scheme"));
    }
    if url.cannot_be_a_base() {
        return Err(Error::new(ErrorKind::Usage).with_message("host base url cannot be a base"));
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("host base url cannot be a base")
        })?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read host response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Host)
            .with_message("invalid host response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let kind = error_kind_from_status(status);
    let Ok(value) = serde_json::from_str::<Value>(&body) else {
        return Error::new(kind).with_message(format!("host error status {status}"));
    };
    let message = remote_error_message(&value)
        .unwrap_or_else(|| format!("host error status {status}"));
    Error::new(kind)
        .with_message(message)
        .with_remote_body(value)
}

/// Picks a human message out of the common host error shapes.
fn remote_error_message(body: &Value) -> Option<String> {
    let candidates = [
        body.get("message"),
        body.get("error").and_then(|error| error.get("message")),
        body.get("details"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|value| value.as_str().map(str::to_string))
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 422 => ErrorKind::Usage,
        401 | 403 => ErrorKind::Permission,
        404 => ErrorKind::NotFound,
        _ => ErrorKind::Host,
    }
}
