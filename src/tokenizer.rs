//! Lexical analysis: turns the raw source into a vector of tokens.
//!
//! The tokenizer knows nothing about the grammar beyond reserved words,
//! literals and punctuators. Two-character punctuators are matched before
//! single-character ones so `:=`, `<=` and `..` never split. Bad characters do
//! not stop the scan: each one becomes a [`LexDiagnostic`] and exactly that
//! character is skipped.

use std::fmt;

use log::debug;

/// Reserved words. Matching is case-insensitive; identifiers are not.
pub const KEYWORDS: &[&str] = &[
  "program",
  "var",
  "const",
  "begin",
  "end",
  "integer",
  "real",
  "boolean",
  "string",
  "array",
  "of",
  "true",
  "false",
  "procedure",
  "function",
  "if",
  "then",
  "else",
  "while",
  "do",
  "for",
  "to",
  "downto",
  "writeln",
  "readln",
  "not",
  "and",
  "or",
  "div",
  "mod",
];

const PUNCTUATORS_2: [&str; 5] = [":=", "<>", "<=", ">=", ".."];

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Keyword,
  Ident,
  Int,
  Real,
  Str,
  Punctuator,
  Eof,
}

/// Literal payload carried by numeric and string tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
  Int(i64),
  Real(f64),
  /// String contents between the quotes, escapes kept verbatim.
  Str(String),
}

/// Thin wrapper for lexical information needed by later stages.
#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  pub value: Option<TokenValue>,
  pub loc: usize,
  pub len: usize,
  pub line: usize,
}

impl Token {
  /// Convenience constructor to keep the `tokenize` loop readable.
  pub fn new(
    kind: TokenKind,
    loc: usize,
    len: usize,
    line: usize,
    value: Option<TokenValue>,
  ) -> Self {
    Self {
      kind,
      value,
      loc,
      len,
      line,
    }
  }
}

/// A recoverable lexical problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexDiagnostic {
  pub line: usize,
  pub message: String,
}

impl fmt::Display for LexDiagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "lexical error at line {}: {}", self.line, self.message)
  }
}

/// Output of the scanner: the token stream plus everything it skipped.
#[derive(Debug, Clone)]
pub struct Lexed {
  pub tokens: Vec<Token>,
  pub diagnostics: Vec<LexDiagnostic>,
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> Lexed {
  let mut tokens = Vec::new();
  let mut diagnostics = Vec::new();
  let bytes = input.as_bytes();
  let mut line = 1;
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    if c == b'\n' {
      line += 1;
      i += 1;
      continue;
    }

    if c.is_ascii_whitespace() {
      i += 1;
      continue;
    }

    if c == b'{'
      && let Some(close) = input[i + 1..].find('}')
    {
      let end = i + 1 + close;
      line += input[i..end].matches('\n').count();
      i = end + 1;
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      // A dot only belongs to the number when a digit follows, so `1..5`
      // still lexes as a range.
      let is_real = i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit();
      if is_real {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
          i += 1;
        }
      }

      let text = &input[start..i];
      let token = if is_real {
        text
          .parse::<f64>()
          .ok()
          .filter(|v| v.is_finite())
          .map(|v| Token::new(TokenKind::Real, start, i - start, line, Some(TokenValue::Real(v))))
      } else {
        text
          .parse::<i64>()
          .ok()
          .map(|v| Token::new(TokenKind::Int, start, i - start, line, Some(TokenValue::Int(v))))
      };
      match token {
        Some(token) => tokens.push(token),
        None => report(
          &mut diagnostics,
          line,
          format!("numeric literal '{text}' is out of range"),
        ),
      }
      continue;
    }

    if c.is_ascii_alphabetic() || c == b'_' {
      let start = i;
      while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
      }
      let lowered = input[start..i].to_ascii_lowercase();
      let kind = if KEYWORDS.contains(&lowered.as_str()) {
        TokenKind::Keyword
      } else {
        TokenKind::Ident
      };
      tokens.push(Token::new(kind, start, i - start, line, None));
      continue;
    }

    if c == b'\''
      && let Some(close) = string_end(bytes, i)
    {
      let contents = input[i + 1..close].to_string();
      tokens.push(Token::new(
        TokenKind::Str,
        i,
        close + 1 - i,
        line,
        Some(TokenValue::Str(contents)),
      ));
      i = close + 1;
      continue;
    }

    if let Some(op) = PUNCTUATORS_2
      .into_iter()
      .find(|op| input[i..].starts_with(op))
    {
      tokens.push(Token::new(TokenKind::Punctuator, i, op.len(), line, None));
      i += op.len();
      continue;
    }

    if matches!(
      c,
      b'+' | b'-' | b'*' | b'/' | b'=' | b'<' | b'>' | b'(' | b')' | b'[' | b']' | b';' | b':' | b',' | b'.'
    ) {
      tokens.push(Token::new(TokenKind::Punctuator, i, 1, line, None));
      i += 1;
      continue;
    }

    let Some(invalid_char) = input[i..].chars().next() else {
      break;
    };
    report(
      &mut diagnostics,
      line,
      format!("illegal character {invalid_char:?}"),
    );
    i += invalid_char.len_utf8();
  }

  tokens.push(Token::new(TokenKind::Eof, input.len(), 0, line, None));
  debug!(
    "lexed {} tokens with {} diagnostics",
    tokens.len(),
    diagnostics.len()
  );
  Lexed {
    tokens,
    diagnostics,
  }
}

fn report(diagnostics: &mut Vec<LexDiagnostic>, line: usize, message: String) {
  debug!("line {line}: {message}");
  diagnostics.push(LexDiagnostic { line, message });
}

/// Index of the quote closing the string opened at `open`. Strings cannot span
/// lines; a backslash escapes the following character.
fn string_end(bytes: &[u8], open: usize) -> Option<usize> {
  let mut j = open + 1;
  while j < bytes.len() {
    match bytes[j] {
      b'\n' => return None,
      b'\'' => return Some(j),
      b'\\' if j + 1 < bytes.len() && bytes[j + 1] != b'\n' => j += 2,
      _ => j += 1,
    }
  }
  None
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc + token.len;
  &source[token.loc..end]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>, source: &str) -> String {
  match token {
    Some(t) => match t.kind {
      TokenKind::Eof => "end of input".to_string(),
      _ => token_text(t, source).to_string(),
    },
    None => "end of input".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(lexed: &Lexed) -> Vec<TokenKind> {
    lexed.tokens.iter().map(|t| t.kind).collect()
  }

  #[test]
  fn keywords_are_case_insensitive() {
    let src = "BEGIN Begin begin Foo foo";
    let lexed = tokenize(src);
    assert_eq!(
      kinds(&lexed),
      vec![
        TokenKind::Keyword,
        TokenKind::Keyword,
        TokenKind::Keyword,
        TokenKind::Ident,
        TokenKind::Ident,
        TokenKind::Eof
      ]
    );
    assert_eq!(token_text(&lexed.tokens[3], src), "Foo");
  }

  #[test]
  fn decimal_point_selects_real() {
    let lexed = tokenize("3 2.5");
    assert_eq!(lexed.tokens[0].value, Some(TokenValue::Int(3)));
    assert_eq!(lexed.tokens[1].value, Some(TokenValue::Real(2.5)));
  }

  #[test]
  fn range_operator_is_not_a_real() {
    let src = "[1..10]";
    let lexed = tokenize(src);
    let texts: Vec<&str> = lexed.tokens.iter().map(|t| token_text(t, src)).collect();
    assert_eq!(texts, vec!["[", "1", "..", "10", "]", ""]);
  }

  #[test]
  fn overflowing_real_is_reported_not_infinite() {
    let src = format!("{}.0", "9".repeat(400));
    let lexed = tokenize(&src);
    assert_eq!(kinds(&lexed), vec![TokenKind::Eof]);
    assert_eq!(lexed.diagnostics.len(), 1);
    assert!(lexed.diagnostics[0].to_string().contains("out of range"));
  }

  #[test]
  fn string_keeps_escapes() {
    let lexed = tokenize(r"'it\'s'");
    assert_eq!(lexed.tokens[0].kind, TokenKind::Str);
    assert_eq!(
      lexed.tokens[0].value,
      Some(TokenValue::Str(r"it\'s".to_string()))
    );
  }

  #[test]
  fn comments_are_stripped_and_lines_counted() {
    let lexed = tokenize("{ a\ncomment }\nx");
    assert_eq!(kinds(&lexed), vec![TokenKind::Ident, TokenKind::Eof]);
    assert_eq!(lexed.tokens[0].line, 3);
  }

  #[test]
  fn illegal_character_is_skipped() {
    let src = "x := 1 @ 2;\ny";
    let lexed = tokenize(src);
    assert_eq!(lexed.diagnostics.len(), 1);
    assert_eq!(lexed.diagnostics[0].line, 1);
    assert!(lexed.diagnostics[0].message.contains('@'));
    let texts: Vec<&str> = lexed.tokens.iter().map(|t| token_text(t, src)).collect();
    assert_eq!(texts, vec!["x", ":=", "1", "2", ";", "y", ""]);
  }

  #[test]
  fn unterminated_string_skips_only_the_quote() {
    let lexed = tokenize("'abc\nx");
    assert_eq!(lexed.diagnostics.len(), 1);
    assert_eq!(
      kinds(&lexed),
      vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Eof]
    );
  }

  #[test]
  fn two_character_operators_win() {
    let src = ":= <> <= >= < > = :";
    let lexed = tokenize(src);
    let texts: Vec<&str> = lexed.tokens.iter().map(|t| token_text(t, src)).collect();
    assert_eq!(texts, vec![":=", "<>", "<=", ">=", "<", ">", "=", ":", ""]);
  }
}
