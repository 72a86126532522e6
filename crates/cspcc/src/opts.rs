//! Compiler options consumed by the core pipeline.
//!
//! Option parsing itself lives in the CLI; the core only sees this struct.

use ahash::AHashSet;

use crate::backend::cccsp::Subtarget;

/// Options threaded through the compiler context.
///
/// Defaults are the production configuration; tests override individual
/// fields.
#[derive(Debug, Clone)]
pub struct CompOpts {
    /// Compops to trace by name (e.g. `"namemap"`).
    pub trace_compops: AHashSet<String>,
    /// Langops to trace by name (e.g. `"gettype"`).
    pub trace_langops: AHashSet<String>,
    /// Treat unexpected end-of-file as a warning rather than an error.
    pub lenient_eof: bool,
    /// Allow unbound events when compiling MCSP input.
    pub mcsp_unbound_events: bool,
    /// Code-generation subtarget.
    pub subtarget: Subtarget,
    /// Stop the pipeline after the named pass (pass name as in the driver).
    pub stop_after: Option<String>,
    /// Path to the function-calls listing for the SFI loader.
    pub sfi_calls_file: Option<String>,
    /// Path to the gcc stack-usage report for the SFI loader.
    pub sfi_usage_file: Option<String>,
    /// Dump the tree (text form) after the front-end and after each pass.
    pub dump_tree: bool,
    /// Compute a digest of the emitted bytes (for library generation).
    pub codegen_digest: bool,
}

impl Default for CompOpts {
    fn default() -> Self {
        Self {
            trace_compops: AHashSet::new(),
            trace_langops: AHashSet::new(),
            lenient_eof: false,
            mcsp_unbound_events: false,
            subtarget: Subtarget::Default,
            stop_after: None,
            sfi_calls_file: None,
            sfi_usage_file: None,
            dump_tree: false,
            codegen_digest: false,
        }
    }
}
