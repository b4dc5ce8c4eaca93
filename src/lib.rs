//! Execute SQL text and stored procedures against MySQL-compatible servers and
//! return the result as a normalized, order-preserving row set or an
//! affected-row count.
//!
//! [`executor::CommandExecutor`] is the entry point. Everything else is either
//! a building block it composes (binder, classifier, transaction coordinator,
//! normalizer) or harness plumbing for the `mysqltask` binary.

pub mod backend;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod format;
pub mod format_csv;
pub mod format_detect;
pub mod masking;
pub mod normalize;
pub mod output;
pub mod params;
pub mod request;
pub mod transaction;
pub mod verbose;
