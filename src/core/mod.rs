// Core modules implementing page planning, report/row modeling, and errors.
pub mod error;
pub mod plan;
pub mod report;
pub mod row;
