//! Workload sync — links new schedule records into per-client workload
//! summaries in a Notion workspace.

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod workspace;
