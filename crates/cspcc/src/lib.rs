#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is checked at the conversion sites")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are intentional")]
#![expect(clippy::cast_possible_wrap, reason = "wrapping casts mirror the 32-bit word model")]
#![expect(clippy::missing_panics_doc, reason = "internal invariant panics are documented on the hot paths only")]
#![expect(clippy::must_use_candidate, reason = "query methods are used for effects in pass code too")]

pub mod backend;
pub mod chook;
pub mod compiler;
pub mod constants;
pub mod driver;
pub mod guppy;
pub mod lexer;
pub mod names;
pub mod nodetype;
pub mod ops;
pub mod opts;
pub mod origin;
pub mod passes;
pub mod report;
pub mod tracer;
pub mod tree;

pub use crate::{
    backend::{
        cccsp::{ApiCall, Subtarget},
        codegen::CodeGen,
        sfi::{SfiEntry, SfiError, SfiTable},
    },
    compiler::{Compiler, CopyControl},
    constants::{ConstData, ConstType},
    driver::{compile_file, compile_source, compile_tree, frontend_for},
    lexer::{Token, TokenBuffer, TokenKind, TokenSource},
    names::{NameId, NameTable, NamespaceId},
    nodetype::{TagFlags, TagId, TypeId},
    ops::{CompOp, LangOp, LangReq},
    opts::CompOpts,
    origin::{LexFileId, Origin},
    passes::{CodegenOutput, PassState},
    report::{CompileError, Diagnostic, Reporter, Severity},
    tracer::{CompilerTracer, NoopTracer, RecordingTracer, StderrTracer, TraceEvent},
    tree::{Hook, NodeId},
};
