//! Purpose: Define the collaborator seam between the re-paginator and a report host platform.
//! Exports: `ReportHost`.
//! Role: Trait implemented by `RemoteHost` (HTTP) and `MemoryHost` (fixtures/tests).
//! Invariants: Calls are blocking and return a result-or-error; no retries at this layer.
//! Invariants: `fetch_host_page` is only asked for indices below `PagedRun::total_host_pages`.
use std::sync::Arc;

use crate::core::error::Error;
use crate::core::report::{HostPage, PagedRun, ReportHandle, ReportId};

pub trait ReportHost: Send + Sync {
    /// Loads the report definition; `NotFound` when the host has no such id.
    fn load_report(&self, id: &ReportId) -> Result<ReportHandle, Error>;

    fn run_paged(&self, report: &ReportHandle, page_size: u32) -> Result<PagedRun, Error>;

    fn fetch_host_page(&self, run: &PagedRun, index: u64) -> Result<HostPage, Error>;

    /// Active employee id for an email, used for auditing only.
    fn resolve_employee_id(&self, email: &str) -> Result<Option<String>, Error>;
}

impl<H: ReportHost + ?Sized> ReportHost for Arc<H> {
    fn load_report(&self, id: &ReportId) -> Result<ReportHandle, Error> {
        (**self).load_report(id)
    }

    fn run_paged(&self, report: &ReportHandle, page_size: u32) -> Result<PagedRun, Error> {
        (**self).run_paged(report, page_size)
    }

    fn fetch_host_page(&self, run: &PagedRun, index: u64) -> Result<HostPage, Error> {
        (**self).fetch_host_page(run, index)
    }

    fn resolve_employee_id(&self, email: &str) -> Result<Option<String>, Error> {
        (**self).resolve_employee_id(email)
    }
}

impl<H: ReportHost + ?Sized> ReportHost for Box<H> {
    fn load_report(&self, id: &ReportId) -> Result<ReportHandle, Error> {
        (**self).load_report(id)
    }

    fn run_paged(&self, report: &ReportHandle, page_size: u32) -> Result<PagedRun, Error> {
        (**self).run_paged(report, page_size)
    }

    fn fetch_host_page(&self, run: &PagedRun, index: u64) -> Result<HostPage, Error> {
        (**self).fetch_host_page(run, index)
    }

    fn resolve_employee_id(&self, email: &str) -> Result<Option<String>, Error> {
        (**self).resolve_employee_id(email)
    }
}
