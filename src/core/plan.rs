//! Purpose: Plan which host pages make up a requested output page, without performing any I/O.
//! Exports: `plan_output_page`, `PagePlan`, `page_index_range`.
//! Role: Pure arithmetic layer used by `api::Repager` and the `plan` CLI command.
//! Invariants: Valid output indices partition `[0, total_host_pages)` with no gaps or overlaps.
//! Invariants: Out-of-range indices are sized like the last page and start beyond the data.
use std::ops::Range;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PagePlan {
    pub total_host_pages: u64,
    pub pages_to_load: u64,
    pub output_index: u64,
    pub total_output_pages: u64,
    pub host_page_start: u64,
    pub host_page_count: u64,
}

pub fn plan_output_page(
    total_host_pages: u64,
    pages_to_load: u64,
    output_index: u64,
) -> Result<PagePlan, Error> {
    if pages_to_load == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("pages to load must be at least 1")
            .with_hint("Pass a positive pagestoload value like 5."));
    }

    let remainder = total_host_pages % pages_to_load;
    let total_output_pages = total_host_pages / pages_to_load + u64::from(remainder > 0);

    // `index < total - 1` compared as signed: with zero output pages nothing is "before last".
    let before_last = output_index.saturating_add(1) < total_output_pages;
    let host_page_count = if before_last || remainder == 0 {
        pages_to_load
    } else {
        remainder
    };

    let host_page_start = output_index.checked_mul(pages_to_load).ok_or_else(|| {
        Error::new(ErrorKind::Usage).with_message("page index is out of addressable range")
    })?;

    Ok(PagePlan {
        total_host_pages,
        pages_to_load,
        output_index,
        total_output_pages,
        host_page_start,
        host_page_count,
    })
}

impl PagePlan {
    pub fn is_in_range(&self) -> bool {
        self.output_index < self.total_output_pages
    }

    /// Host page indices this plan asks for, including any beyond the data.
    pub fn planned_host_pages(&self) -> Range<u64> {
        let end = self.host_page_start.saturating_add(self.host_page_count);
        self.host_page_start..end
    }

    /// Host page indices that exist on the host; empty for out-of-range plans.
    pub fn fetchable_host_pages(&self) -> Range<u64> {
        let planned = self.planned_host_pages();
        let end = planned.end.min(self.total_host_pages);
        let start = planned.start.min(end);
        start..end
    }

    pub fn page_index_range(&self) -> String {
        page_index_range(self.total_output_pages)
    }
}

/// `0-<last>`, with `last` signed so an empty report renders as `0--1`.
pub fn page_index_range(total_output_pages: u64) -> String {
    let last = i128::from(total_output_pages) - 1;
    format!("0-{last}")
}
