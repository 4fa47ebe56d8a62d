//! Core library for the fenestra-tools command line application.
//!
//! The library merges duplicate line items of ERP documents. The pure engine
//! lives in [`fenestra::tools::consolidate`], the per-document-kind call
//! sites in [`fenestra::tools::config`], and the host side (lifecycle hooks
//! and the per-instance re-entrancy guard) in [`fenestra::tools::hooks`] and
//! [`fenestra::tools::guard`]. IO adapters for JSON documents and bulk-import
//! workbooks live under [`fenestra::tools::io`], with file-level
//! orchestration in [`fenestra::tools::sync`].

pub mod fenestra;

pub use fenestra::tools::{
    Result, ToolError, config, consolidate, error, guard, hooks, io, model, sync,
};
