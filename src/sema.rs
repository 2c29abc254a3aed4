//! Static semantic analysis: scoping and type checking.
//!
//! The analyzer is fail-fast. The first violation it finds becomes the error
//! of the whole run; it never transforms the AST and keeps no state beyond
//! its scope stack. Checking happens in two passes: the global scope first
//! receives every global, constant and callable signature, then each callable
//! body is checked in a child scope before the program body itself.

use log::{debug, trace};

use crate::ast::{BinaryOp, Callable, Decl, Expr, LValue, Program, Stmt, Type};
use crate::error::{CompileError, CompileResult};
use crate::scope::{ScopeStack, Signature, Symbol, SymbolKind, builtin_signature};

/// Check a parsed program, returning the first violation found.
pub fn verify(program: &Program) -> CompileResult<()> {
  let mut analyzer = Analyzer {
    scopes: ScopeStack::new(),
  };
  analyzer.program(program)
}

struct Analyzer {
  scopes: ScopeStack,
}

impl Analyzer {
  fn program(&mut self, program: &Program) -> CompileResult<()> {
    let block = &program.block;
    for decl in &block.decls {
      self.declare(decl)?;
    }

    for decl in &block.decls {
      if let Decl::Subprogram(callable) = decl {
        self.scopes.enter();
        let checked = self.callable(callable);
        self.scopes.exit();
        checked?;
      }
    }

    for stmt in &block.body {
      self.stmt(stmt)?;
    }

    debug!("program '{}' passed semantic analysis", program.name);
    Ok(())
  }

  fn declare(&mut self, decl: &Decl) -> CompileResult<()> {
    match decl {
      Decl::Var { names, ty, line } => {
        for name in names {
          self.declare_symbol(name, Symbol::new(ty.clone(), SymbolKind::Variable), *line)?;
        }
      }
      Decl::Array {
        names,
        elem,
        start,
        len,
        line,
      } => {
        let ty = Type::array_of(elem.clone(), *start, *len);
        for name in names {
          self.declare_symbol(name, Symbol::new(ty.clone(), SymbolKind::Variable), *line)?;
        }
      }
      Decl::Const { name, value, line } => {
        self.declare_symbol(name, Symbol::new(value.ty(), SymbolKind::Constant), *line)?;
      }
      Decl::Subprogram(callable) => {
        if !self.scopes.at_global() {
          return Err(CompileError::semantic(
            callable.line,
            format!("subprogram '{}' must be declared at program level", callable.name),
          ));
        }
        let signature = Signature {
          ret: callable.ret.clone(),
          params: callable.params.clone(),
        };
        if !self.scopes.declare_callable(&callable.name, signature) {
          return Err(CompileError::semantic(
            callable.line,
            format!("function or procedure '{}' is already declared", callable.name),
          ));
        }
      }
    }
    Ok(())
  }

  fn declare_symbol(&mut self, name: &str, symbol: Symbol, line: usize) -> CompileResult<()> {
    trace!("declare '{name}' as {:?} {}", symbol.kind, symbol.ty);
    if self.scopes.declare(name, symbol) {
      Ok(())
    } else {
      Err(CompileError::semantic(
        line,
        format!("'{name}' is already declared in this scope"),
      ))
    }
  }

  /// Body of a callable; the caller owns entering and leaving its scope.
  fn callable(&mut self, callable: &Callable) -> CompileResult<()> {
    for param in &callable.params {
      self.declare_symbol(
        &param.name,
        Symbol::new(param.ty.clone(), SymbolKind::Parameter),
        callable.line,
      )?;
    }

    if let Some(ret) = &callable.ret {
      self.declare_symbol(
        &callable.name,
        Symbol::new(ret.clone(), SymbolKind::FunctionResult),
        callable.line,
      )?;
    }

    for decl in &callable.block.decls {
      self.declare(decl)?;
    }

    for stmt in &callable.block.body {
      self.stmt(stmt)?;
    }
    Ok(())
  }

  fn stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    match stmt {
      Stmt::Assign {
        target,
        value,
        line,
      } => {
        let symbol = self.assignable(target, *line)?;
        let value_ty = self.expr(value, *line)?;
        if value_ty != symbol.ty {
          return Err(CompileError::semantic(
            *line,
            format!(
              "type mismatch in assignment to '{target}': expected {}, got {value_ty}",
              symbol.ty
            ),
          ));
        }
      }
      Stmt::AssignIndex {
        target,
        index,
        value,
        line,
      } => {
        let elem = self.array_element(target, index, *line)?;
        let value_ty = self.expr(value, *line)?;
        if value_ty != elem {
          return Err(CompileError::semantic(
            *line,
            format!("elements of '{target}' are {elem}, not {value_ty}"),
          ));
        }
      }
      Stmt::Writeln { args, line } | Stmt::Write { args, line } => {
        for arg in args {
          let ty = self.expr(arg, *line)?;
          if ty.is_array() {
            return Err(CompileError::semantic(
              *line,
              format!("cannot print a value of type {ty}"),
            ));
          }
        }
      }
      Stmt::Readln { targets, line } => {
        for target in targets {
          match target {
            LValue::Var(name) => {
              self.assignable(name, *line)?;
            }
            LValue::Index { name, index } => {
              self.array_element(name, index, *line)?;
            }
          }
        }
      }
      Stmt::If {
        cond,
        then_branch,
        else_branch,
        line,
      } => {
        self.expect_type(cond, &Type::Boolean, *line, "if condition")?;
        self.stmt(then_branch)?;
        if let Some(else_branch) = else_branch {
          self.stmt(else_branch)?;
        }
      }
      Stmt::While { cond, body, line } => {
        self.expect_type(cond, &Type::Boolean, *line, "while condition")?;
        self.stmt(body)?;
      }
      Stmt::For {
        var,
        start,
        end,
        body,
        line,
        ..
      } => {
        let symbol = self.assignable(var, *line)?;
        if symbol.ty != Type::Integer {
          return Err(CompileError::semantic(
            *line,
            format!("for control variable '{var}' must be integer, got {}", symbol.ty),
          ));
        }
        self.expect_type(start, &Type::Integer, *line, "for start bound")?;
        self.expect_type(end, &Type::Integer, *line, "for end bound")?;
        self.stmt(body)?;
      }
      Stmt::Call { name, args, line } => {
        if self.scopes.lookup_callable(name).is_none() && builtin_signature(name).is_some() {
          return Err(CompileError::semantic(
            *line,
            format!("builtin '{name}' cannot be used as a statement"),
          ));
        }
        self.call(name, args, *line)?;
      }
      Stmt::Compound(stmts) => {
        for stmt in stmts {
          self.stmt(stmt)?;
        }
      }
      Stmt::Empty => {}
    }
    Ok(())
  }

  fn lookup(&self, name: &str, line: usize) -> CompileResult<Symbol> {
    self
      .scopes
      .lookup(name)
      .cloned()
      .ok_or_else(|| CompileError::semantic(line, format!("undeclared identifier '{name}'")))
  }

  /// A scalar that may appear on the left of `:=` or in `readln`.
  fn assignable(&self, name: &str, line: usize) -> CompileResult<Symbol> {
    let symbol = self.lookup(name, line)?;
    if symbol.kind == SymbolKind::Constant {
      return Err(CompileError::semantic(
        line,
        format!("cannot assign to constant '{name}'"),
      ));
    }
    if symbol.ty.is_array() {
      return Err(CompileError::semantic(
        line,
        format!("cannot assign to array '{name}' as a whole"),
      ));
    }
    Ok(symbol)
  }

  /// Element type of `name[index]` used as a store target.
  fn array_element(&mut self, name: &str, index: &Expr, line: usize) -> CompileResult<Type> {
    let symbol = self.lookup(name, line)?;
    let Some(elem) = symbol.ty.elem() else {
      return Err(CompileError::semantic(
        line,
        format!("'{name}' is not an array"),
      ));
    };
    self.expect_type(index, &Type::Integer, line, "array index")?;
    check_literal_bounds(name, &symbol.ty, index, line)?;
    Ok(elem.clone())
  }

  fn expect_type(&mut self, expr: &Expr, want: &Type, line: usize, what: &str) -> CompileResult<()> {
    let got = self.expr(expr, line)?;
    if &got != want {
      return Err(CompileError::semantic(
        line,
        format!("{what} must be {want}, got {got}"),
      ));
    }
    Ok(())
  }

  fn expr(&mut self, expr: &Expr, line: usize) -> CompileResult<Type> {
    match expr {
      Expr::Int(_) => Ok(Type::Integer),
      Expr::Real(_) => Ok(Type::Real),
      Expr::Bool(_) => Ok(Type::Boolean),
      Expr::Str(_) => Ok(Type::String),
      Expr::Ident(name) => Ok(self.lookup(name, line)?.ty),
      Expr::Index { name, index } => {
        let symbol = self.lookup(name, line)?;
        match &symbol.ty {
          Type::Array { elem, .. } => {
            self.expect_type(index, &Type::Integer, line, "array index")?;
            check_literal_bounds(name, &symbol.ty, index, line)?;
            Ok(elem.as_ref().clone())
          }
          Type::String => {
            self.expect_type(index, &Type::Integer, line, "string index")?;
            Ok(Type::String)
          }
          other => Err(CompileError::semantic(
            line,
            format!("'{name}' of type {other} cannot be indexed"),
          )),
        }
      }
      Expr::Not(operand) => {
        self.expect_type(operand, &Type::Boolean, line, "operand of 'not'")?;
        Ok(Type::Boolean)
      }
      Expr::Binary { op, lhs, rhs } => {
        let lhs_ty = self.expr(lhs, line)?;
        let rhs_ty = self.expr(rhs, line)?;
        binary_type(*op, &lhs_ty, &rhs_ty, line)
      }
      Expr::Call { name, args } => {
        let signature = self.call(name, args, line)?;
        signature.ret.ok_or_else(|| {
          CompileError::semantic(
            line,
            format!("procedure '{name}' does not return a value"),
          )
        })
      }
    }
  }

  fn call(&mut self, name: &str, args: &[Expr], line: usize) -> CompileResult<Signature> {
    let signature = self
      .scopes
      .lookup_callable(name)
      .cloned()
      .or_else(|| builtin_signature(name))
      .ok_or_else(|| {
        CompileError::semantic(
          line,
          format!("undeclared function or procedure '{name}'"),
        )
      })?;

    if args.len() != signature.params.len() {
      return Err(CompileError::semantic(
        line,
        format!(
          "'{name}' expects {} arguments, got {}",
          signature.params.len(),
          args.len()
        ),
      ));
    }

    for (position, (arg, param)) in args.iter().zip(&signature.params).enumerate() {
      let ty = self.expr(arg, line)?;
      if ty != param.ty {
        return Err(CompileError::semantic(
          line,
          format!(
            "argument {} of '{name}' must be {}, got {ty}",
            position + 1,
            param.ty
          ),
        ));
      }
    }
    Ok(signature)
  }
}

fn binary_type(op: BinaryOp, lhs: &Type, rhs: &Type, line: usize) -> CompileResult<Type> {
  let symbol = op.symbol();
  if op.is_relational() {
    if lhs != rhs || lhs.is_array() {
      return Err(CompileError::semantic(
        line,
        format!("cannot compare {lhs} with {rhs} using '{symbol}'"),
      ));
    }
    return Ok(Type::Boolean);
  }

  match op {
    BinaryOp::Add if *lhs == Type::String && *rhs == Type::String => Ok(Type::String),
    BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => match (lhs, rhs) {
      (Type::Integer, Type::Integer) => Ok(Type::Integer),
      (l, r) if l.is_numeric() && r.is_numeric() => Ok(Type::Real),
      _ => Err(CompileError::semantic(
        line,
        format!("operator '{symbol}' requires integer or real operands, got {lhs} and {rhs}"),
      )),
    },
    BinaryOp::IntDiv | BinaryOp::Mod => match (lhs, rhs) {
      (Type::Integer, Type::Integer) => Ok(Type::Integer),
      _ => Err(CompileError::semantic(
        line,
        format!("operator '{symbol}' requires integer operands, got {lhs} and {rhs}"),
      )),
    },
    _ => match (lhs, rhs) {
      (Type::Boolean, Type::Boolean) => Ok(Type::Boolean),
      _ => Err(CompileError::semantic(
        line,
        format!("operator '{symbol}' requires boolean operands, got {lhs} and {rhs}"),
      )),
    },
  }
}

/// Literal indices are checked against the declared range; anything else is
/// left to the VM.
fn check_literal_bounds(name: &str, ty: &Type, index: &Expr, line: usize) -> CompileResult<()> {
  if let Expr::Int(value) = index
    && let Some((low, high)) = ty.bounds()
    && !(low..=high).contains(value)
  {
    return Err(CompileError::semantic(
      line,
      format!("index {value} is outside the bounds [{low}..{high}] of '{name}'"),
    ));
  }
  Ok(())
}
