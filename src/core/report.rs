//! Purpose: Describe hosted reports: ids, kinds, columns and paged runs.
//! Exports: `ReportKind`, `ReportId`, `Column`, `ReportHandle`, `PagedRun`, `HostPage`.
//! Role: Request-scoped value types passed between the re-paginator and host collaborators.
//! Invariants: A `ReportId` always carries a recognized kind; parsing is the only constructor.
//! Invariants: Column order is the report's declared order and drives header and search rows.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::Error;
use crate::core::row::Row;

pub const HOST_PAGE_SIZE: u32 = 1000;
pub const MIN_HOST_PAGE_SIZE: u32 = 5;

const SEARCH_MARKER: &str = "customsearch";
const DATASET_MARKER: &str = "custdataset";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Dataset,
    Search,
}

impl ReportKind {
    /// Saved-search ids are matched first, the same way the host scripts dispatch.
    pub fn detect(report_id: &str) -> Option<Self> {
        if report_id.contains(SEARCH_MARKER) {
            Some(ReportKind::Search)
        } else if report_id.contains(DATASET_MARKER) {
            Some(ReportKind::Dataset)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReportKind::Dataset => "dataset",
            ReportKind::Search => "search",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ReportId {
    id: String,
    kind: ReportKind,
}

impl ReportId {
    pub fn parse(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        match ReportKind::detect(&id) {
            Some(kind) => Ok(Self { id, kind }),
            None => Err(Error::invalid_report_id(id)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ReportKind {
        self.kind
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Result key for search columns; datasets address cells by position.
    #[serde(default)]
    pub key: String,
    pub label: String,
}

impl Column {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReportHandle {
    pub id: ReportId,
    /// Dataset name or saved-search title.
    pub name: String,
    /// Host-side type: dataset type or search record type.
    pub report_type: String,
    pub columns: Vec<Column>,
}

impl ReportHandle {
    pub fn kind(&self) -> ReportKind {
        self.id.kind()
    }

    pub fn header_row(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| column.label.clone())
            .collect()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PagedRun {
    pub report_id: ReportId,
    pub page_size: u32,
    pub total_host_pages: u64,
    pub total_rows: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostPage {
    pub index: u64,
    #[serde(default)]
    pub rows: Vec<Row>,
}
