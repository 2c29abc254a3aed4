//! Crate root: wires together the compilation pipeline.
//!
//! Each stage runs to completion before the next one starts:
//! - `tokenizer` performs lexical analysis and reports skipped characters.
//! - `parser` owns all syntactic knowledge and returns the program AST.
//! - `sema` checks scoping and types without touching the AST.
//! - `codegen` lowers the AST into the instructions defined in `vm`.
//! - `error` centralises the failure type shared by the other modules.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod parser;
pub mod scope;
pub mod sema;
pub mod tokenizer;
pub mod ty;
pub mod vm;

pub use codegen::{CodegenOptions, IndexedRead};
pub use error::{CompileError, CompileResult};
pub use tokenizer::LexDiagnostic;

use ast::Program;
use vm::Instr;

/// A successfully generated program and the lexical problems skipped on the
/// way there.
#[derive(Debug, Clone)]
pub struct Compilation {
  pub instructions: Vec<Instr>,
  pub diagnostics: Vec<LexDiagnostic>,
}

impl Compilation {
  /// The listing as written to disk.
  pub fn listing(&self) -> String {
    vm::render(&self.instructions)
  }
}

/// Lex `source`, hand every lexical diagnostic to `report`, then parse.
///
/// Diagnostics are delivered before the parser runs, so they reach the caller
/// even when the skipped input makes the parse fail.
pub fn parse_reporting(
  source: &str,
  mut report: impl FnMut(&LexDiagnostic),
) -> CompileResult<Program> {
  let lexed = tokenizer::tokenize(source);
  lexed.diagnostics.iter().for_each(&mut report);
  parser::parse(lexed.tokens, source)
}

/// Run every stage up to and including semantic analysis.
pub fn check_reporting(
  source: &str,
  report: impl FnMut(&LexDiagnostic),
) -> CompileResult<Program> {
  let program = parse_reporting(source, report)?;
  sema::verify(&program)?;
  Ok(program)
}

pub fn compile_reporting(
  source: &str,
  options: &CodegenOptions,
  report: impl FnMut(&LexDiagnostic),
) -> CompileResult<Vec<Instr>> {
  let program = check_reporting(source, report)?;
  codegen::generate(&program, options)
}

/// Lex and parse, keeping the lexical diagnostics.
pub fn parse_source(source: &str) -> CompileResult<(Program, Vec<LexDiagnostic>)> {
  let mut diagnostics = Vec::new();
  let program = parse_reporting(source, |d| diagnostics.push(d.clone()))?;
  Ok((program, diagnostics))
}

pub fn check(source: &str) -> CompileResult<Vec<LexDiagnostic>> {
  let mut diagnostics = Vec::new();
  check_reporting(source, |d| diagnostics.push(d.clone()))?;
  Ok(diagnostics)
}

/// Compile with the default code generation options.
pub fn compile(source: &str) -> CompileResult<Compilation> {
  compile_with(source, &CodegenOptions::default())
}

pub fn compile_with(source: &str, options: &CodegenOptions) -> CompileResult<Compilation> {
  let mut diagnostics = Vec::new();
  let instructions = compile_reporting(source, options, |d| diagnostics.push(d.clone()))?;
  Ok(Compilation {
    instructions,
    diagnostics,
  })
}

/// Compile a source string straight into the instruction listing.
pub fn generate_listing(source: &str) -> CompileResult<String> {
  Ok(compile(source)?.listing())
}
