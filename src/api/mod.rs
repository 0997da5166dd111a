//! Purpose: Define the public Rust API for re-paginating hosted reports.
//! Exports: `Repager`, the `ReportHost` seam, host implementations, and core value types.
//! Role: Stable surface used by the CLI, the HTTP server and integration tests.
//! Invariants: Host I/O only happens through `ReportHost` implementations.
//! Invariants: Planning and row normalization stay in `core` and remain side-effect free.

mod host;
mod memory;
mod remote;
mod repager;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind, ErrorPayload};
pub use crate::core::plan::{PagePlan, page_index_range, plan_output_page};
pub use crate::core::report::{
    Column, HOST_PAGE_SIZE, HostPage, PagedRun, ReportHandle, ReportId, ReportKind,
};
pub use crate::core::row::{DatasetRow, LinkedRef, Row, Scalar, SearchRow, SearchValue};
pub use host::ReportHost;
pub use memory::{Fixture, FixtureReport, HostCalls, MemoryHost};
pub use remote::RemoteHost;
pub use repager::{Metadata, OutputPage, ReportName, Repager};
