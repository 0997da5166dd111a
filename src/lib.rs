//! Purpose: Library crate backing the `reportpager` CLI, server and tests.
//! Exports: `core` (planning, report and row types, errors), `api` (host trait, hosts, `Repager`).
//! Role: Re-paginates hosted datasets and saved searches into caller-sized output pages.
//! Invariants: Core modules are pure; all host I/O goes through `api::ReportHost`.
//! Invariants: Every call is request-scoped; nothing is cached between calls.
pub mod api;
pub mod core;
