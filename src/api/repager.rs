//! Purpose: Serve caller-sized output pages and report metadata on top of a `ReportHost`.
//! Exports: `Repager`, `OutputPage`, `Metadata`, `ReportName`.
//! Role: Validates the request, plans host pages, fetches them in order and flattens rows.
//! Invariants: Invalid report ids fail before any host call.
//! Invariants: A page is fully assembled or the call fails; no partial pages.
//! Invariants: The header row appears only on output page 0.
use serde::Serialize;

use super::host::ReportHost;
use crate::core::error::{Error, ErrorKind};
use crate::core::plan::{PagePlan, page_index_range, plan_output_page};
use crate::core::report::{
    HOST_PAGE_SIZE, MIN_HOST_PAGE_SIZE, PagedRun, ReportHandle, ReportId, ReportKind,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ReportName {
    #[serde(rename = "dataset_name")]
    Dataset(String),
    #[serde(rename = "search_name")]
    Search(String),
}

impl ReportName {
    fn for_report(report: &ReportHandle) -> Self {
        match report.kind() {
            ReportKind::Dataset => ReportName::Dataset(report.name.clone()),
            ReportKind::Search => ReportName::Search(report.name.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutputPage {
    #[serde(flatten)]
    pub name: ReportName,
    #[serde(rename = "type")]
    pub report_type: String,
    pub total_rows: u64,
    pub total_pages: u64,
    pub pageindex_range: String,
    pub current_pageindex: u64,
    pub data: Vec<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub dataset_name: String,
    #[serde(rename = "type")]
    pub report_type: String,
    pub total_rows: u64,
    pub total_pages: u64,
    pub pageindex_range: String,
}

pub struct Repager<H> {
    host: H,
    host_page_size: u32,
}

impl<H: ReportHost> Repager<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            host_page_size: HOST_PAGE_SIZE,
        }
    }

    pub fn with_host_page_size(mut self, host_page_size: u32) -> Result<Self, Error> {
        if !(MIN_HOST_PAGE_SIZE..=HOST_PAGE_SIZE).contains(&host_page_size) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "host page size must be between {MIN_HOST_PAGE_SIZE} and {HOST_PAGE_SIZE}"
                ))
                .with_hint("Omit --host-page-size to use the default of 1000."));
        }
        self.host_page_size = host_page_size;
        Ok(self)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_page_size(&self) -> u32 {
        self.host_page_size
    }

    pub fn get_page(
        &self,
        report_id: &str,
        output_index: u64,
        pages_to_load: u64,
    ) -> Result<OutputPage, Error> {
        tracing::debug!(report_id, output_index, pages_to_load, "get page");
        self.build_page(report_id, output_index, pages_to_load)
            .inspect_err(|err| log_failure("get_page", report_id, err))
    }

    pub fn get_metadata(
        &self,
        report_id: &str,
        pages_to_load: u64,
        employee_email: Option<&str>,
    ) -> Result<Metadata, Error> {
        tracing::debug!(report_id, pages_to_load, employee_email, "get metadata");
        self.build_metadata(report_id, pages_to_load, employee_email)
            .inspect_err(|err| log_failure("get_metadata", report_id, err))
    }

    fn build_page(
        &self,
        report_id: &str,
        output_index: u64,
        pages_to_load: u64,
    ) -> Result<OutputPage, Error> {
        let id = ReportId::parse(report_id)?;
        ensure_pages_to_load(pages_to_load)?;
        tracing::debug!(kind = %id.kind(), "executing report");

        let report = self.host.load_report(&id)?;
        let (run, plan) = self.plan(&report, pages_to_load, output_index)?;
        tracing::debug!(pages_to_run = plan.host_page_count, "pages to run");

        let mut data = Vec::new();
        if output_index == 0 {
            data.push(report.header_row());
        }
        for index in plan.fetchable_host_pages() {
            tracing::debug!(host_page = index, "fetching host page");
            let page = self
                .host
                .fetch_host_page(&run, index)
                .map_err(|err| err.with_host_page(index))?;
            data.extend(page.rows.iter().map(|row| row.normalize(&report.columns)));
        }

        Ok(OutputPage {
            name: ReportName::for_report(&report),
            report_type: report.report_type,
            total_rows: run.total_rows,
            total_pages: plan.total_output_pages,
            pageindex_range: plan.page_index_range(),
            current_pageindex: output_index,
            data,
        })
    }

    fn build_metadata(
        &self,
        report_id: &str,
        pages_to_load: u64,
        employee_email: Option<&str>,
    ) -> Result<Metadata, Error> {
        let id = ReportId::parse(report_id)?;
        ensure_pages_to_load(pages_to_load)?;
        if let Some(email) = employee_email {
            self.audit_employee(email);
        }
        tracing::debug!(kind = %id.kind(), "executing report");

        let report = self.host.load_report(&id)?;
        let (run, plan) = self.plan(&report, pages_to_load, 0)?;

        Ok(Metadata {
            dataset_name: report.name,
            report_type: report.report_type,
            total_rows: run.total_rows,
            total_pages: plan.total_output_pages,
            pageindex_range: page_index_range(plan.total_output_pages),
        })
    }

    fn plan(
        &self,
        report: &ReportHandle,
        pages_to_load: u64,
        output_index: u64,
    ) -> Result<(PagedRun, PagePlan), Error> {
        let run = self.host.run_paged(report, self.host_page_size)?;
        let plan = plan_output_page(run.total_host_pages, pages_to_load, output_index)?;
        tracing::debug!(
            pages_to_load,
            total_host_pages = run.total_host_pages,
            computed_pages = plan.total_output_pages,
            total_rows = run.total_rows,
            "planned output page"
        );
        Ok((run, plan))
    }

    fn audit_employee(&self, email: &str) {
        match self.host.resolve_employee_id(email) {
            Ok(Some(employee_id)) => tracing::debug!(email, %employee_id, "resolved employee"),
            Ok(None) => tracing::debug!(email, "no active employee for email"),
            Err(err) => tracing::warn!(email, error = %err, "employee lookup failed"),
        }
    }
}

fn ensure_pages_to_load(pages_to_load: u64) -> Result<(), Error> {
    if pages_to_load == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("pagestoload must be at least 1")
            .with_hint("Pass the number of 1000-row host pages per output page, e.g. 5."));
    }
    Ok(())
}

fn log_failure(operation: &str, report_id: &str, err: &Error) {
    match err.kind() {
        ErrorKind::InvalidReportId | ErrorKind::Usage => {
            tracing::warn!(operation, report_id, error = %err, "request rejected");
        }
        _ => tracing::error!(operation, report_id, error = %err, "request failed"),
    }
}
