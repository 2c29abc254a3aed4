//! Recursive-descent parser producing the program AST.
//!
//! One helper per grammar rule, with a precedence-climbing layer for
//! expressions (`or` < `and` < relational < additive < multiplicative <
//! unary). The dangling `else` needs no special handling: `parse_stmt` always
//! hands an `else` to the innermost open `if`. Any syntax error aborts the parse;
//! no partial tree is ever returned.

use log::debug;

use crate::ast::{
  BinaryOp, Block, Callable, Decl, Direction, Expr, LValue, Literal, Param, Program, Stmt, Type,
};
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind, TokenValue, describe_token, token_text};

/// Parse a whole program from the token stream.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens, source);

  if stream.is_eof() {
    return Err(CompileError::unexpected_eof("program is empty"));
  }

  let program = parse_program(&mut stream)?;

  if !stream.is_eof() {
    return Err(stream.error("end of input after the final '.'"));
  }

  debug!(
    "parsed program '{}' with {} top-level declarations",
    program.name,
    program.block.decls.len()
  );
  Ok(program)
}

fn parse_program(stream: &mut TokenStream) -> CompileResult<Program> {
  stream.skip_keyword("program")?;
  let (name, _) = stream.get_ident()?;
  stream.skip(";")?;
  let block = parse_block(stream, true)?;
  stream.skip(".")?;
  Ok(Program { name, block })
}

fn parse_block(stream: &mut TokenStream, top_level: bool) -> CompileResult<Block> {
  let mut decls = Vec::new();

  loop {
    if stream.equal_keyword("var") {
      parse_var_section(stream, &mut decls)?;
    } else if stream.equal_keyword("const") {
      parse_const_section(stream, &mut decls)?;
    } else if stream.at_keyword("function") || stream.at_keyword("procedure") {
      if !top_level {
        return Err(CompileError::syntax(
          stream.line(),
          "nested subprograms are not supported",
        ));
      }
      decls.push(Decl::Subprogram(parse_callable(stream)?));
    } else {
      break;
    }
  }

  let body = parse_compound(stream)?;
  Ok(Block { decls, body })
}

fn parse_var_section(stream: &mut TokenStream, decls: &mut Vec<Decl>) -> CompileResult<()> {
  loop {
    let line = stream.line();
    let names = parse_ident_list(stream)?;
    stream.skip(":")?;

    if stream.equal_keyword("array") {
      stream.skip("[")?;
      let start = parse_signed_int(stream)?;
      stream.skip("..")?;
      let end = parse_signed_int(stream)?;
      stream.skip("]")?;
      stream.skip_keyword("of")?;
      let elem = parse_scalar_type(stream)?;

      let len = end
        .checked_sub(start)
        .and_then(|span| span.checked_add(1))
        .filter(|len| *len > 0)
        .ok_or_else(|| {
          CompileError::syntax(line, format!("invalid array bounds [{start}..{end}]"))
        })?;
      decls.push(Decl::Array {
        names,
        elem,
        start,
        len,
        line,
      });
    } else {
      let ty = parse_scalar_type(stream)?;
      decls.push(Decl::Var { names, ty, line });
    }

    stream.skip(";")?;
    if !stream.at_ident() {
      return Ok(());
    }
  }
}

fn parse_const_section(stream: &mut TokenStream, decls: &mut Vec<Decl>) -> CompileResult<()> {
  loop {
    let (name, line) = stream.get_ident()?;
    stream.skip("=")?;
    let value = parse_literal(stream)?;
    stream.skip(";")?;
    decls.push(Decl::Const { name, value, line });

    if !stream.at_ident() {
      return Ok(());
    }
  }
}

fn parse_callable(stream: &mut TokenStream) -> CompileResult<Callable> {
  let is_function = stream.equal_keyword("function");
  if !is_function {
    stream.skip_keyword("procedure")?;
  }

  let (name, line) = stream.get_ident()?;
  let mut params = Vec::new();
  if stream.equal("(") && !stream.equal(")") {
    loop {
      let names = parse_ident_list(stream)?;
      stream.skip(":")?;
      let ty = parse_scalar_type(stream)?;
      params.extend(names.into_iter().map(|name| Param {
        name,
        ty: ty.clone(),
      }));
      if !stream.equal(";") {
        break;
      }
    }
    stream.skip(")")?;
  }

  let ret = if is_function {
    stream.skip(":")?;
    Some(parse_scalar_type(stream)?)
  } else {
    None
  };
  stream.skip(";")?;

  let block = parse_block(stream, false)?;
  stream.skip(";")?;

  Ok(Callable {
    name,
    params,
    ret,
    block,
    line,
  })
}

fn parse_ident_list(stream: &mut TokenStream) -> CompileResult<Vec<String>> {
  let mut names = vec![stream.get_ident()?.0];
  while stream.equal(",") {
    names.push(stream.get_ident()?.0);
  }
  Ok(names)
}

fn parse_scalar_type(stream: &mut TokenStream) -> CompileResult<Type> {
  let ty = if stream.equal_keyword("integer") {
    Type::Integer
  } else if stream.equal_keyword("real") {
    Type::Real
  } else if stream.equal_keyword("boolean") {
    Type::Boolean
  } else if stream.equal_keyword("string") {
    Type::String
  } else {
    return Err(stream.error("a type name"));
  };
  Ok(ty)
}

fn parse_signed_int(stream: &mut TokenStream) -> CompileResult<i64> {
  let negative = stream.equal("-");
  let (value, _) = stream.get_number()?;
  Ok(if negative { -value } else { value })
}

fn parse_literal(stream: &mut TokenStream) -> CompileResult<Literal> {
  if stream.equal("-") {
    return match stream.peek_value() {
      Some(TokenValue::Int(v)) => {
        stream.advance();
        Ok(Literal::Int(-v))
      }
      Some(TokenValue::Real(v)) => {
        stream.advance();
        Ok(Literal::Real(-v))
      }
      _ => Err(stream.error("a numeric literal after '-'")),
    };
  }

  if stream.equal_keyword("true") {
    return Ok(Literal::Bool(true));
  }
  if stream.equal_keyword("false") {
    return Ok(Literal::Bool(false));
  }

  let literal = match stream.peek_value() {
    Some(TokenValue::Int(v)) => Literal::Int(v),
    Some(TokenValue::Real(v)) => Literal::Real(v),
    Some(TokenValue::Str(s)) => Literal::Str(s),
    None => return Err(stream.error("a literal value")),
  };
  stream.advance();
  Ok(literal)
}

/// `begin stmt { ; stmt } end`
fn parse_compound(stream: &mut TokenStream) -> CompileResult<Vec<Stmt>> {
  stream.skip_keyword("begin")?;
  let mut stmts = Vec::new();
  loop {
    let stmt = parse_stmt(stream)?;
    if stmt != Stmt::Empty {
      stmts.push(stmt);
    }
    if !stream.equal(";") {
      break;
    }
  }
  stream.skip_keyword("end")?;
  Ok(stmts)
}

fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let line = stream.line();

  if stream.at_keyword("begin") {
    return Ok(Stmt::Compound(parse_compound(stream)?));
  }

  if stream.equal_keyword("if") {
    let cond = parse_expr(stream)?;
    stream.skip_keyword("then")?;
    let then_branch = Box::new(parse_stmt(stream)?);
    let else_branch = if stream.equal_keyword("else") {
      Some(Box::new(parse_stmt(stream)?))
    } else {
      None
    };
    return Ok(Stmt::If {
      cond,
      then_branch,
      else_branch,
      line,
    });
  }

  if stream.equal_keyword("while") {
    let cond = parse_expr(stream)?;
    stream.skip_keyword("do")?;
    let body = Box::new(parse_stmt(stream)?);
    return Ok(Stmt::While { cond, body, line });
  }

  if stream.equal_keyword("for") {
    let (var, _) = stream.get_ident()?;
    stream.skip(":=")?;
    let start = parse_expr(stream)?;
    let direction = if stream.equal_keyword("to") {
      Direction::To
    } else if stream.equal_keyword("downto") {
      Direction::Downto
    } else {
      return Err(stream.error("'to' or 'downto'"));
    };
    let end = parse_expr(stream)?;
    stream.skip_keyword("do")?;
    let body = Box::new(parse_stmt(stream)?);
    return Ok(Stmt::For {
      var,
      start,
      end,
      direction,
      body,
      line,
    });
  }

  if stream.equal_keyword("writeln") {
    let args = parse_optional_args(stream)?;
    return Ok(Stmt::Writeln { args, line });
  }

  if stream.equal_keyword("readln") {
    let mut targets = Vec::new();
    if stream.equal("(") && !stream.equal(")") {
      loop {
        targets.push(parse_lvalue(stream)?);
        if !stream.equal(",") {
          break;
        }
      }
      stream.skip(")")?;
    }
    return Ok(Stmt::Readln { targets, line });
  }

  if stream.at_ident() {
    let (name, _) = stream.get_ident()?;

    if stream.equal(":=") {
      let value = parse_expr(stream)?;
      return Ok(Stmt::Assign {
        target: name,
        value,
        line,
      });
    }

    if stream.equal("[") {
      let index = parse_expr(stream)?;
      stream.skip("]")?;
      stream.skip(":=")?;
      let value = parse_expr(stream)?;
      return Ok(Stmt::AssignIndex {
        target: name,
        index,
        value,
        line,
      });
    }

    let args = parse_optional_args(stream)?;
    if name.eq_ignore_ascii_case("write") {
      return Ok(Stmt::Write { args, line });
    }
    return Ok(Stmt::Call { name, args, line });
  }

  if stream.at(";") || stream.at_keyword("end") || stream.at_keyword("else") {
    return Ok(Stmt::Empty);
  }

  Err(stream.error("a statement"))
}

fn parse_lvalue(stream: &mut TokenStream) -> CompileResult<LValue> {
  let (name, _) = stream.get_ident()?;
  if stream.equal("[") {
    let index = parse_expr(stream)?;
    stream.skip("]")?;
    return Ok(LValue::Index { name, index });
  }
  Ok(LValue::Var(name))
}

/// `( expr { , expr } )`, `()` or nothing at all.
fn parse_optional_args(stream: &mut TokenStream) -> CompileResult<Vec<Expr>> {
  if !stream.equal("(") || stream.equal(")") {
    return Ok(Vec::new());
  }
  let args = parse_expr_list(stream)?;
  stream.skip(")")?;
  Ok(args)
}

fn parse_expr_list(stream: &mut TokenStream) -> CompileResult<Vec<Expr>> {
  let mut exprs = vec![parse_expr(stream)?];
  while stream.equal(",") {
    exprs.push(parse_expr(stream)?);
  }
  Ok(exprs)
}

fn parse_expr(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_or(stream)
}

fn parse_or(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_and(stream)?;
  while stream.equal_keyword("or") {
    let rhs = parse_and(stream)?;
    node = Expr::binary(BinaryOp::Or, node, rhs);
  }
  Ok(node)
}

fn parse_and(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_relational(stream)?;
  while stream.equal_keyword("and") {
    let rhs = parse_relational(stream)?;
    node = Expr::binary(BinaryOp::And, node, rhs);
  }
  Ok(node)
}

fn parse_relational(stream: &mut TokenStream) -> CompileResult<Expr> {
  let node = parse_add(stream)?;

  let op = match stream.punctuator() {
    Some("=") => BinaryOp::Eq,
    Some("<>") => BinaryOp::Ne,
    Some("<") => BinaryOp::Lt,
    Some("<=") => BinaryOp::Le,
    Some(">") => BinaryOp::Gt,
    Some(">=") => BinaryOp::Ge,
    _ => return Ok(node),
  };

  stream.advance();
  let rhs = parse_add(stream)?;
  Ok(Expr::binary(op, node, rhs))
}

fn parse_add(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_mul(stream)?;

  loop {
    let op = match stream.punctuator() {
      Some("+") => BinaryOp::Add,
      Some("-") => BinaryOp::Sub,
      _ => break,
    };
    stream.advance();
    let rhs = parse_mul(stream)?;
    node = Expr::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_mul(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_unary(stream)?;

  loop {
    let op = match stream.punctuator() {
      Some("*") => BinaryOp::Mul,
      Some("/") => BinaryOp::Div,
      _ if stream.at_keyword("div") => BinaryOp::IntDiv,
      _ if stream.at_keyword("mod") => BinaryOp::Mod,
      _ => break,
    };
    stream.advance();
    let rhs = parse_unary(stream)?;
    node = Expr::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_unary(stream: &mut TokenStream) -> CompileResult<Expr> {
  if stream.equal_keyword("not") {
    let operand = parse_unary(stream)?;
    return Ok(Expr::not(operand));
  }

  if stream.equal("+") {
    return parse_unary(stream);
  }

  if stream.equal("-") {
    // Negative literals fold so `a[-1]` still counts as a literal index.
    match stream.peek_value() {
      Some(TokenValue::Int(v)) => {
        stream.advance();
        return Ok(Expr::Int(-v));
      }
      Some(TokenValue::Real(v)) => {
        stream.advance();
        return Ok(Expr::Real(-v));
      }
      _ => {
        let operand = parse_unary(stream)?;
        return Ok(Expr::binary(BinaryOp::Sub, Expr::Int(0), operand));
      }
    }
  }

  parse_primary(stream)
}

fn parse_primary(stream: &mut TokenStream) -> CompileResult<Expr> {
  if stream.equal("(") {
    let node = parse_expr(stream)?;
    stream.skip(")")?;
    return Ok(node);
  }

  if stream.equal_keyword("true") {
    return Ok(Expr::Bool(true));
  }
  if stream.equal_keyword("false") {
    return Ok(Expr::Bool(false));
  }

  if stream.at_ident() {
    let (name, _) = stream.get_ident()?;
    if stream.equal("[") {
      let index = parse_expr(stream)?;
      stream.skip("]")?;
      return Ok(Expr::index(name, index));
    }
    if stream.at("(") {
      let args = parse_optional_args(stream)?;
      return Ok(Expr::Call { name, args });
    }
    return Ok(Expr::Ident(name));
  }

  let node = match stream.peek_value() {
    Some(TokenValue::Int(v)) => Expr::Int(v),
    Some(TokenValue::Real(v)) => Expr::Real(v),
    Some(TokenValue::Str(s)) => Expr::Str(s),
    None => return Err(stream.error("an expression")),
  };
  stream.advance();
  Ok(node)
}

/// Lightweight cursor over the token vector.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser will advance `pos` as it consumes input.
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn advance(&mut self) {
    self.pos += 1;
  }

  /// Line of the current token, falling back to the last one seen.
  fn line(&self) -> usize {
    self
      .peek()
      .or_else(|| self.tokens.last())
      .map_or(1, |token| token.line)
  }

  fn peek_value(&self) -> Option<TokenValue> {
    self.peek().and_then(|token| token.value.clone())
  }

  /// Text of the current token when it is a punctuator.
  fn punctuator(&self) -> Option<&'a str> {
    self
      .peek()
      .filter(|token| token.kind == TokenKind::Punctuator)
      .map(|token| token_text(token, self.source))
  }

  fn at(&self, op: &str) -> bool {
    self.punctuator() == Some(op)
  }

  /// Consume the current token if it matches the provided punctuator.
  fn equal(&mut self, op: &str) -> bool {
    if self.at(op) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, op: &str) -> CompileResult<()> {
    if self.equal(op) {
      Ok(())
    } else {
      Err(self.error(&format!("\"{op}\"")))
    }
  }

  fn at_keyword(&self, keyword: &str) -> bool {
    self.peek().is_some_and(|token| {
      token.kind == TokenKind::Keyword && token_text(token, self.source).eq_ignore_ascii_case(keyword)
    })
  }

  fn equal_keyword(&mut self, keyword: &str) -> bool {
    if self.at_keyword(keyword) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip_keyword(&mut self, keyword: &str) -> CompileResult<()> {
    if self.equal_keyword(keyword) {
      Ok(())
    } else {
      Err(self.error(&format!("'{keyword}'")))
    }
  }

  fn at_ident(&self) -> bool {
    matches!(self.peek().map(|token| token.kind), Some(TokenKind::Ident))
  }

  /// Parse the current token as an integer literal returning its value and line.
  fn get_number(&mut self) -> CompileResult<(i64, usize)> {
    if let Some(token) = self.peek()
      && let Some(TokenValue::Int(value)) = token.value
    {
      let line = token.line;
      self.pos += 1;
      return Ok((value, line));
    }
    Err(self.error("an integer literal"))
  }

  /// Parse the current token as an identifier.
  fn get_ident(&mut self) -> CompileResult<(String, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Ident
    {
      let ident = token_text(token, self.source).to_string();
      let line = token.line;
      self.pos += 1;
      return Ok((ident, line));
    }
    Err(self.error("an identifier"))
  }

  fn is_eof(&self) -> bool {
    matches!(self.peek().map(|token| token.kind), Some(TokenKind::Eof) | None)
  }

  /// Error describing what was expected against the current token.
  fn error(&self, expected: &str) -> CompileError {
    if self.is_eof() {
      return CompileError::unexpected_eof(format!("expected {expected}"));
    }
    let got = describe_token(self.peek(), self.source);
    CompileError::syntax(
      self.line(),
      format!("expected {expected}, but got \"{got}\""),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tokenizer::tokenize;

  fn parse_src(src: &str) -> CompileResult<Program> {
    parse(tokenize(src).tokens, src)
  }

  fn body(src: &str) -> Vec<Stmt> {
    parse_src(src).expect("program should parse").block.body
  }

  #[test]
  fn minimal_program() {
    let program = parse_src("program p; begin end.").expect("should parse");
    assert_eq!(program.name, "p");
    assert!(program.block.decls.is_empty());
    assert!(program.block.body.is_empty());
  }

  #[test]
  fn array_length_is_computed_from_bounds() {
    let program = parse_src("program p; var a, b: array[2..6] of real; begin end.").unwrap();
    assert_eq!(
      program.block.decls,
      vec![Decl::Array {
        names: vec!["a".into(), "b".into()],
        elem: Type::Real,
        start: 2,
        len: 5,
        line: 1,
      }]
    );
  }

  #[test]
  fn reversed_array_bounds_are_rejected() {
    let err = parse_src("program p; var a: array[5..1] of integer; begin end.").unwrap_err();
    assert!(matches!(err, CompileError::Syntax { .. }));
  }

  #[test]
  fn constants_take_literal_values() {
    let program =
      parse_src("program p; const PI = 3.5; N = -2; S = 'hi'; B = true; begin end.").unwrap();
    let values: Vec<&Literal> = program
      .block
      .decls
      .iter()
      .filter_map(|d| match d {
        Decl::Const { value, .. } => Some(value),
        _ => None,
      })
      .collect();
    assert_eq!(
      values,
      vec![
        &Literal::Real(3.5),
        &Literal::Int(-2),
        &Literal::Str("hi".into()),
        &Literal::Bool(true)
      ]
    );
  }

  #[test]
  fn callable_signatures() {
    let src = "program p;
      function f(a, b: integer; c: real): boolean; begin f := true end;
      procedure q; begin end;
      begin end.";
    let program = parse_src(src).unwrap();
    let Decl::Subprogram(f) = &program.block.decls[0] else {
      panic!("expected function");
    };
    assert_eq!(f.params.len(), 3);
    assert_eq!(f.params[2].ty, Type::Real);
    assert_eq!(f.ret, Some(Type::Boolean));
    let Decl::Subprogram(q) = &program.block.decls[1] else {
      panic!("expected procedure");
    };
    assert!(q.params.is_empty());
    assert_eq!(q.ret, None);
    assert_eq!(q.line, 3);
  }

  #[test]
  fn nested_subprograms_are_rejected() {
    let src = "program p;
      procedure outer; procedure inner; begin end; begin end;
      begin end.";
    let err = parse_src(src).unwrap_err();
    assert!(err.to_string().contains("nested subprograms"));
  }

  #[test]
  fn else_binds_to_nearest_if() {
    let stmts = body("program p; begin if a then if b then x := 1 else x := 2 end.");
    let Stmt::If {
      else_branch: outer_else,
      then_branch,
      ..
    } = &stmts[0]
    else {
      panic!("expected if");
    };
    assert!(outer_else.is_none());
    assert!(matches!(
      then_branch.as_ref(),
      Stmt::If {
        else_branch: Some(_),
        ..
      }
    ));
  }

  #[test]
  fn precedence_layers() {
    let stmts = body("program p; begin x := 1 + 2 * 3 = 7 and b end.");
    let Stmt::Assign { value, .. } = &stmts[0] else {
      panic!("expected assignment");
    };
    let expected = Expr::binary(
      BinaryOp::And,
      Expr::binary(
        BinaryOp::Eq,
        Expr::binary(
          BinaryOp::Add,
          Expr::Int(1),
          Expr::binary(BinaryOp::Mul, Expr::Int(2), Expr::Int(3)),
        ),
        Expr::Int(7),
      ),
      Expr::Ident("b".into()),
    );
    assert_eq!(value, &expected);
  }

  #[test]
  fn negative_literal_folds() {
    let stmts = body("program p; begin x := a[-1] - -y end.");
    let Stmt::Assign { value, .. } = &stmts[0] else {
      panic!("expected assignment");
    };
    let expected = Expr::binary(
      BinaryOp::Sub,
      Expr::index("a", Expr::Int(-1)),
      Expr::binary(BinaryOp::Sub, Expr::Int(0), Expr::Ident("y".into())),
    );
    assert_eq!(value, &expected);
  }

  #[test]
  fn statement_forms() {
    let stmts = body(
      "program p; begin
         a[i] := 1;
         writeln('x', 2);
         write(3);
         readln(n, a[2]);
         for i := 10 downto 1 do q(i);
         while i < 3 do i := i + 1;
         q;
         ;
       end.",
    );
    assert_eq!(stmts.len(), 7);
    assert!(matches!(stmts[0], Stmt::AssignIndex { .. }));
    assert!(matches!(&stmts[1], Stmt::Writeln { args, .. } if args.len() == 2));
    assert!(matches!(&stmts[2], Stmt::Write { args, .. } if args.len() == 1));
    assert!(matches!(&stmts[3], Stmt::Readln { targets, .. } if targets.len() == 2));
    assert!(matches!(
      &stmts[4],
      Stmt::For {
        direction: Direction::Downto,
        ..
      }
    ));
    assert!(matches!(stmts[5], Stmt::While { .. }));
    assert!(matches!(&stmts[6], Stmt::Call { name, args, .. } if name == "q" && args.is_empty()));
  }

  #[test]
  fn syntax_error_reports_token_and_line() {
    let err = parse_src("program p;\nbegin\n  x := ;\nend.").unwrap_err();
    assert_eq!(
      err.to_string(),
      "syntax error at line 3: expected an expression, but got \";\""
    );
  }

  #[test]
  fn truncated_input_is_unexpected_eof() {
    let err = parse_src("program p; begin x := 1").unwrap_err();
    assert!(matches!(err, CompileError::UnexpectedEof { .. }));
  }

  #[test]
  fn keywords_parse_in_any_case() {
    let program = parse_src("PROGRAM p; VAR x: INTEGER; BEGIN x := 1 END.").unwrap();
    assert_eq!(program.block.decls.len(), 1);
    assert_eq!(program.block.body.len(), 1);
  }
}
