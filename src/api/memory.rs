//! Purpose: In-memory report host backed by fixture reports.
//! Exports: `MemoryHost`, `Fixture`, `FixtureReport`, `HostCalls`.
//! Role: Offline `ReportHost` for tests and `--fixture` runs; pages rows like the real host.
//! Invariants: Rows are split into host pages of exactly `page_size` rows (last page may be short).
//! Invariants: Call counters reflect every trait call, including failed ones.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::host::ReportHost;
use crate::core::error::{Error, ErrorKind};
use crate::core::report::{Column, HostPage, PagedRun, ReportHandle, ReportId};
use crate::core::row::Row;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub reports: Vec<FixtureReport>,
    /// Active employees keyed by email.
    #[serde(default)]
    pub employees: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FixtureReport {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub report_type: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HostCalls {
    pub load: usize,
    pub run: usize,
    pub fetch: usize,
    pub employee: usize,
}

impl HostCalls {
    pub fn total(&self) -> usize {
        self.load + self.run + self.fetch + self.employee
    }
}

#[derive(Debug, Default)]
struct Counters {
    load: AtomicUsize,
    run: AtomicUsize,
    fetch: AtomicUsize,
    employee: AtomicUsize,
}

#[derive(Debug, Default)]
pub struct MemoryHost {
    reports: BTreeMap<String, FixtureReport>,
    employees: BTreeMap<String, String>,
    failing_pages: BTreeSet<(String, u64)>,
    fail_employee_lookup: bool,
    counters: Counters,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let mut host = Self::new();
        for report in fixture.reports {
            host = host.with_report(report);
        }
        host.employees = fixture.employees;
        host
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("failed to read fixture file {}", path.display()))
                .with_source(err)
        })?;
        let fixture: Fixture = serde_json::from_str(&raw).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid fixture json in {}", path.display()))
                .with_hint("Expected {\"reports\": [...], \"employees\": {...}}.")
                .with_source(err)
        })?;
        Ok(Self::from_fixture(fixture))
    }

    pub fn with_report(mut self, report: FixtureReport) -> Self {
        self.reports.insert(report.id.clone(), report);
        self
    }

    pub fn with_employee(mut self, email: impl Into<String>, id: impl Into<String>) -> Self {
        self.employees.insert(email.into(), id.into());
        self
    }

    pub fn fail_fetch(mut self, report_id: impl Into<String>, index: u64) -> Self {
        self.failing_pages.insert((report_id.into(), index));
        self
    }

    pub fn fail_employee_lookup(mut self) -> Self {
        self.fail_employee_lookup = true;
        self
    }

    pub fn calls(&self) -> HostCalls {
        HostCalls {
            load: self.counters.load.load(Ordering::Relaxed),
            run: self.counters.run.load(Ordering::Relaxed),
            fetch: self.counters.fetch.load(Ordering::Relaxed),
            employee: self.counters.employee.load(Ordering::Relaxed),
        }
    }

    fn report(&self, id: &ReportId) -> Result<&FixtureReport, Error> {
        self.reports.get(id.as_str()).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!("{} not found", id.kind()))
                .with_report_id(id.as_str())
        })
    }
}

impl ReportHost for MemoryHost {
    fn load_report(&self, id: &ReportId) -> Result<ReportHandle, Error> {
        self.counters.load.fetch_add(1, Ordering::Relaxed);
        let report = self.report(id)?;
        Ok(ReportHandle {
            id: id.clone(),
            name: report.name.clone(),
            report_type: report.report_type.clone(),
            columns: report.columns.clone(),
        })
    }

    fn run_paged(&self, report: &ReportHandle, page_size: u32) -> Result<PagedRun, Error> {
        self.counters.run.fetch_add(1, Ordering::Relaxed);
        if page_size == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("page size must be positive"));
        }
        let rows = self.report(&report.id)?.rows.len() as u64;
        Ok(PagedRun {
            report_id: report.id.clone(),
            page_size,
            total_host_pages: rows.div_ceil(u64::from(page_size)),
            total_rows: rows,
        })
    }

    fn fetch_host_page(&self, run: &PagedRun, index: u64) -> Result<HostPage, Error> {
        self.counters.fetch.fetch_add(1, Ordering::Relaxed);
        let key = (run.report_id.as_str().to_string(), index);
        if self.failing_pages.contains(&key) {
            return Err(Error::new(ErrorKind::Host)
                .with_message("injected fetch failure")
                .with_report_id(run.report_id.as_str()));
        }
        if index >= run.total_host_pages {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("host page index out of range")
                .with_report_id(run.report_id.as_str()));
        }
        let rows = &self.report(&run.report_id)?.rows;
        let size = run.page_size as usize;
        let start = usize::try_from(index)
            .ok()
            .and_then(|index| index.checked_mul(size))
            .filter(|start| *start < rows.len())
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message("host page index out of range")
                    .with_report_id(run.report_id.as_str())
            })?;
        let end = start.saturating_add(size).min(rows.len());
        Ok(HostPage {
            index,
            rows: rows[start..end].to_vec(),
        })
    }

    fn resolve_employee_id(&self, email: &str) -> Result<Option<String>, Error> {
        self.counters.employee.fetch_add(1, Ordering::Relaxed);
        if self.fail_employee_lookup {
            return Err(Error::new(ErrorKind::Host).with_message("employee search failed"));
        }
        Ok(self.employees.get(email).cloned())
    }
}
