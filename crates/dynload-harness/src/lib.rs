//! Inspection tooling for `dynload`.
//!
//! This crate provides:
//! - Symbol listings with demangle/loadable filters, as JSON reports
//! - Name and offset lookups with the resolution path taken
//! - Structured JSONL logs of every operation, with a line validator

#![deny(unsafe_code)]

pub mod error;
pub mod inspect;
pub mod structured_log;

pub use error::{HarnessError, Result};
pub use inspect::{LibrarySpec, OffsetReport, ResolveReport, SymbolReport};
