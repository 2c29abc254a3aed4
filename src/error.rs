//! Shared error type used across the compilation pipeline.
//!
//! Every variant here aborts the run at the stage that raised it. Lexical
//! problems are not errors: the tokenizer reports them as diagnostics and keeps
//! going, leaving the parser to fail if the skipped input mattered.

use std::path::PathBuf;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CompileError {
  #[snafu(display("syntax error at line {line}: {message}"))]
  Syntax { line: usize, message: String },

  #[snafu(display("syntax error: unexpected end of input ({message})"))]
  UnexpectedEof { message: String },

  #[snafu(display("semantic error at line {line}: {message}"))]
  Semantic { line: usize, message: String },

  #[snafu(display("code generation error: {message}"))]
  Codegen { message: String },

  #[snafu(display("failed to access '{}': {source}", path.display()))]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
}

impl CompileError {
  /// Syntax error anchored at a source line.
  pub fn syntax(line: usize, message: impl Into<String>) -> Self {
    Self::Syntax {
      line,
      message: message.into(),
    }
  }

  pub fn unexpected_eof(message: impl Into<String>) -> Self {
    Self::UnexpectedEof {
      message: message.into(),
    }
  }

  /// Scoping or typing violation found by the analyzer.
  pub fn semantic(line: usize, message: impl Into<String>) -> Self {
    Self::Semantic {
      line,
      message: message.into(),
    }
  }

  /// Failure discovered independently while emitting instructions.
  pub fn codegen(message: impl Into<String>) -> Self {
    Self::Codegen {
      message: message.into(),
    }
  }

  /// Source line the error points at, when the stage knows it.
  pub fn line(&self) -> Option<usize> {
    match self {
      Self::Syntax { line, .. } | Self::Semantic { line, .. } => Some(*line),
      Self::UnexpectedEof { .. } | Self::Codegen { .. } | Self::Io { .. } => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_includes_stage_and_line() {
    let err = CompileError::semantic(7, "undeclared identifier 'x'");
    assert_eq!(
      err.to_string(),
      "semantic error at line 7: undeclared identifier 'x'"
    );
    assert_eq!(err.line(), Some(7));
  }

  #[test]
  fn codegen_errors_have_no_line() {
    let err = CompileError::codegen("undeclared callable 'f'");
    assert_eq!(err.line(), None);
    assert!(err.to_string().starts_with("code generation error"));
  }
}
