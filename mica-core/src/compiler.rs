//! Pipeline orchestration: source text in, compiled artifact out.
//!
//! Data flows strictly forward (bytes -> tokens -> AST -> IR); the first
//! error at any stage halts the pipeline. The artifact owns the verified IR
//! module plus the scanner's non-fatal diagnostics so the driver can decide
//! where they go.

use std::io::Write;

use crate::cabi::CAbi;
use crate::codegen;
use crate::error::CoreError;
use crate::exec::Engine;
use crate::ir::Module;
use crate::lexer;
use crate::parser::Parser;
use crate::target::Target;

/// Result of compiling one translation unit.
#[derive(Debug)]
pub struct Artifact {
    pub module: Module,
    pub target: Target,
    /// Scanner side channel: unexpected-character reports that did not
    /// abort the compile.
    pub diagnostics: Vec<String>,
}

impl Artifact {
    /// The module rendered as LLVM-style textual IR.
    pub fn ir_text(&self) -> String {
        self.module.to_string()
    }
}

/// Compiles `source` for `target` into a verified module.
pub fn compile(source: &str, target: Target) -> Result<Artifact, CoreError> {
    let scanned = lexer::scan(source)?;
    let functions = Parser::new(scanned.tokens).parse()?;
    let cabi = CAbi::new(target);
    let module = codegen::generate(&functions, &cabi, "mica")?;

    Ok(Artifact {
        module,
        target,
        diagnostics: scanned.diagnostics,
    })
}

/// Executes the artifact's `main`, writing program output to `out`. Returns
/// the exit value, or `None` when `main` is void.
pub fn run<W: Write>(artifact: &Artifact, out: W) -> Result<Option<i64>, CoreError> {
    Engine::new(&artifact.module, out).run_main()
}
