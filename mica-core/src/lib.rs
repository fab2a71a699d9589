//! Core compiler pipeline for the mica language.
//!
//! mica is a small statically typed systems language lowered through a
//! typed, block-structured IR that follows LLVM assembly conventions. The
//! pipeline is strictly forward:
//!
//!   source .mica
//!     -> lexer      (tokens + diagnostics side channel)
//!     -> parser     (function definitions)
//!     -> codegen    (IR module, target- and ABI-aware, verified)
//!     -> exec       (run mode: locate and call `main`)
//!
//! Higher-level tools (the CLI driver, test harnesses) should depend on
//! this crate rather than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------

pub mod error;

// ---------------------------------------------------------------------
// Front-end: scanning and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Targets and ABI
// ---------------------------------------------------------------------

pub mod target;
pub mod cabi;

// ---------------------------------------------------------------------
// Back-end: IR, code generation, execution
// ---------------------------------------------------------------------

pub mod ir;
pub mod codegen;
pub mod exec;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{Artifact, compile, run};
pub use error::CoreError;
pub use target::Target;
