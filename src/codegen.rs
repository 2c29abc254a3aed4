//! Code generation: lower the checked AST into stack-machine instructions.
//!
//! The generator is a second, independent walk over the AST. It keeps its own
//! view of every name (slot plus declared type), re-infers expression types to
//! pick integer or real opcodes, and fails on anything it cannot resolve
//! instead of trusting the analyzer.
//!
//! Memory is one flat run of global slots handed out in declaration order and
//! never reclaimed. Globals come first, then one frame per callable holding its
//! parameters followed by its locals. Frames are laid out once, so a recursive
//! call stores its arguments over the caller's own parameters; the machine has
//! no activation records to do better.

use std::collections::HashMap;

use log::{debug, trace};

use crate::ast::{BinaryOp, Block, Callable, Decl, Direction, Expr, LValue, Literal, Program, Stmt, Type};
use crate::error::{CompileError, CompileResult};
use crate::vm::{Instr, Label};

/// How `readln` lowers an indexed destination such as `readln(a[i])`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexedRead {
  /// Read, convert to the element type, store into the element.
  #[default]
  Corrected,
  /// Historical lowering: reads and stores (always via `ATOI`) only when the
  /// array's start bound is non-zero, otherwise leaves handle and offset on
  /// the stack.
  AsRead,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodegenOptions {
  pub indexed_read: IndexedRead,
}

/// Emit the instruction listing for a whole program.
pub fn generate(program: &Program, options: &CodegenOptions) -> CompileResult<Vec<Instr>> {
  let mut generator = Generator::new(*options);
  generator.program(program)?;
  debug!(
    "generated {} instructions using {} slots",
    generator.code.len(),
    generator.next_slot
  );
  Ok(generator.code)
}

/// Storage of one visible name. For arrays `slot` holds the block handle.
#[derive(Debug, Clone)]
struct Binding {
  slot: usize,
  ty: Type,
}

/// Layout of one callable, fixed before any code refers to it.
#[derive(Debug)]
struct Frame<'a> {
  callable: &'a Callable,
  /// First parameter slot; locals follow the parameters.
  base: usize,
  /// Global slot the function writes its result to.
  result: Option<usize>,
}

struct Generator<'a> {
  options: CodegenOptions,
  code: Vec<Instr>,
  next_slot: usize,
  next_label: u32,
  bindings: HashMap<String, Binding>,
  frames: HashMap<String, Frame<'a>>,
  order: Vec<&'a str>,
}

impl<'a> Generator<'a> {
  fn new(options: CodegenOptions) -> Self {
    Self {
      options,
      code: Vec::new(),
      next_slot: 0,
      next_label: 0,
      bindings: HashMap::new(),
      frames: HashMap::new(),
      order: Vec::new(),
    }
  }

  fn program(&mut self, program: &'a Program) -> CompileResult<()> {
    self.emit(Instr::Start);

    for decl in &program.block.decls {
      match decl {
        Decl::Subprogram(callable) => self.register_callable(callable)?,
        other => {
          let mut cursor = self.next_slot;
          self.storage(other, &mut cursor)?;
          self.next_slot = cursor;
        }
      }
    }

    self.layout_frames();

    for stmt in &program.block.body {
      self.stmt(stmt)?;
    }
    self.emit(Instr::Stop);

    for name in self.order.clone() {
      self.body(name)?;
    }
    Ok(())
  }

  fn emit(&mut self, instr: Instr) {
    self.code.push(instr);
  }

  fn new_label(&mut self) -> Label {
    let label = Label::Local(self.next_label);
    self.next_label += 1;
    label
  }

  fn bind(&mut self, name: &str, slot: usize, ty: Type) {
    trace!("slot {slot}: '{name}' ({ty})");
    self.bindings.insert(name.to_string(), Binding { slot, ty });
  }

  /// Functions get their result slot at the point of declaration.
  fn register_callable(&mut self, callable: &'a Callable) -> CompileResult<()> {
    if self.frames.contains_key(&callable.name) {
      return Err(CompileError::codegen(format!(
        "'{}' is defined more than once",
        callable.name
      )));
    }
    let result = callable.ret.as_ref().map(|_| {
      let slot = self.next_slot;
      self.next_slot += 1;
      trace!("slot {slot}: result of '{}'", callable.name);
      slot
    });
    self.frames.insert(
      callable.name.clone(),
      Frame {
        callable,
        base: 0,
        result,
      },
    );
    self.order.push(&callable.name);
    Ok(())
  }

  /// Give every callable its own run of slots past the globals.
  fn layout_frames(&mut self) {
    for name in &self.order {
      let Some(frame) = self.frames.get_mut(*name) else {
        continue;
      };
      let size = frame.callable.params.len()
        + frame
          .callable
          .block
          .decls
          .iter()
          .map(Decl::slot_count)
          .sum::<usize>();
      frame.base = self.next_slot;
      self.next_slot += size;
      trace!("frame of '{name}': slots {}..{}", frame.base, self.next_slot);
    }
  }

  /// Bind the names of a data declaration starting at `cursor`, emitting the
  /// allocation of arrays and the initial store of constants.
  fn storage(&mut self, decl: &Decl, cursor: &mut usize) -> CompileResult<()> {
    match decl {
      Decl::Var { names, ty, .. } => {
        for name in names {
          self.bind(name, *cursor, ty.clone());
          *cursor += 1;
        }
      }
      Decl::Array {
        names,
        elem,
        start,
        len,
        ..
      } => {
        for name in names {
          self.emit(Instr::PushI(*len));
          self.emit(Instr::AllocN);
          self.emit(Instr::StoreG(*cursor));
          self.bind(name, *cursor, Type::array_of(elem.clone(), *start, *len));
          *cursor += 1;
        }
      }
      Decl::Const { name, value, .. } => {
        self.literal(value);
        self.emit(Instr::StoreG(*cursor));
        self.bind(name, *cursor, value.ty());
        *cursor += 1;
      }
      Decl::Subprogram(callable) => {
        return Err(CompileError::codegen(format!(
          "nested subprogram '{}' cannot be generated",
          callable.name
        )));
      }
    }
    Ok(())
  }

  fn literal(&mut self, value: &Literal) {
    let instr = match value {
      Literal::Int(v) => Instr::PushI(*v),
      Literal::Real(v) => Instr::PushF(*v),
      Literal::Bool(v) => Instr::PushI(i64::from(*v)),
      Literal::Str(s) => Instr::PushS(s.clone()),
    };
    self.emit(instr);
  }

  fn body(&mut self, name: &str) -> CompileResult<()> {
    let Some(frame) = self.frames.get(name) else {
      return Err(CompileError::codegen(format!("no frame for '{name}'")));
    };
    let (callable, base, result) = (frame.callable, frame.base, frame.result);

    self.emit(Instr::Label(Label::Entry(callable.name.clone())));
    let saved = self.bindings.clone();

    for (i, param) in callable.params.iter().enumerate() {
      self.bind(&param.name, base + i, param.ty.clone());
    }
    if let (Some(slot), Some(ret)) = (result, &callable.ret) {
      self.bind(&callable.name, slot, ret.clone());
    }

    let generated = self.block(&callable.block, base + callable.params.len());
    self.bindings = saved;
    generated?;

    self.emit(Instr::Return);
    Ok(())
  }

  fn block(&mut self, block: &Block, mut cursor: usize) -> CompileResult<()> {
    for decl in &block.decls {
      self.storage(decl, &mut cursor)?;
    }
    for stmt in &block.body {
      self.stmt(stmt)?;
    }
    Ok(())
  }

  fn lookup(&self, name: &str) -> CompileResult<Binding> {
    self
      .bindings
      .get(name)
      .cloned()
      .ok_or_else(|| CompileError::codegen(format!("undeclared identifier '{name}'")))
  }

  /// Handle slot, start bound and element type of an array binding.
  fn array(&self, name: &str) -> CompileResult<(usize, i64, Type)> {
    let binding = self.lookup(name)?;
    match binding.ty {
      Type::Array { elem, start, .. } => Ok((binding.slot, start, *elem)),
      other => Err(CompileError::codegen(format!(
        "'{name}' of type {other} is not an array"
      ))),
    }
  }

  /// Push handle and zero-based offset of `name[index]`.
  fn element_address(&mut self, slot: usize, start: i64, index: &Expr) -> CompileResult<()> {
    self.emit(Instr::PushG(slot));
    self.expr(index)?;
    if start != 0 {
      self.emit(Instr::PushI(start));
      self.emit(Instr::Sub);
    }
    Ok(())
  }

  fn stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    match stmt {
      Stmt::Assign { target, value, .. } => {
        let binding = self.lookup(target)?;
        self.expr(value)?;
        self.emit(Instr::StoreG(binding.slot));
      }
      Stmt::AssignIndex {
        target,
        index,
        value,
        ..
      } => {
        let (slot, start, _) = self.array(target)?;
        self.element_address(slot, start, index)?;
        self.expr(value)?;
        self.emit(Instr::StoreN);
      }
      Stmt::Writeln { args, .. } => {
        for arg in args {
          let ty = self.type_of(arg)?;
          self.expr(arg)?;
          match ty {
            Type::Integer | Type::Boolean => {
              self.emit(Instr::StrI);
              self.emit(Instr::WriteS);
            }
            Type::Real => self.emit(Instr::WriteF),
            Type::String => self.emit(Instr::WriteS),
            Type::Array { .. } => return Err(unprintable(&ty)),
          }
        }
        self.emit(Instr::WriteLn);
      }
      Stmt::Write { args, .. } => {
        for arg in args {
          let ty = self.type_of(arg)?;
          self.expr(arg)?;
          match ty {
            Type::Integer | Type::Boolean => self.emit(Instr::WriteI),
            Type::Real => self.emit(Instr::WriteF),
            Type::String => self.emit(Instr::WriteS),
            Type::Array { .. } => return Err(unprintable(&ty)),
          }
        }
      }
      Stmt::Readln { targets, .. } => {
        for target in targets {
          self.read_into(target)?;
        }
      }
      Stmt::If {
        cond,
        then_branch,
        else_branch,
        ..
      } => {
        self.expr(cond)?;
        let else_label = self.new_label();
        let end_label = self.new_label();
        self.emit(Instr::Jz(else_label.clone()));
        self.stmt(then_branch)?;
        self.emit(Instr::Jump(end_label.clone()));
        self.emit(Instr::Label(else_label));
        if let Some(else_branch) = else_branch {
          self.stmt(else_branch)?;
        }
        self.emit(Instr::Label(end_label));
      }
      Stmt::While { cond, body, .. } => {
        let head = self.new_label();
        let end = self.new_label();
        self.emit(Instr::Label(head.clone()));
        self.expr(cond)?;
        self.emit(Instr::Jz(end.clone()));
        self.stmt(body)?;
        self.emit(Instr::Jump(head));
        self.emit(Instr::Label(end));
      }
      Stmt::For {
        var,
        start,
        end,
        direction,
        body,
        ..
      } => {
        let slot = self.lookup(var)?.slot;
        let head = self.new_label();
        let exit = self.new_label();
        let (test, step) = match direction {
          Direction::To => (Instr::InfEq, Instr::Add),
          Direction::Downto => (Instr::SupEq, Instr::Sub),
        };

        self.expr(start)?;
        self.emit(Instr::StoreG(slot));
        self.emit(Instr::Label(head.clone()));
        self.emit(Instr::PushG(slot));
        self.expr(end)?;
        self.emit(test);
        self.emit(Instr::Jz(exit.clone()));
        self.stmt(body)?;
        self.emit(Instr::PushG(slot));
        self.emit(Instr::PushI(1));
        self.emit(step);
        self.emit(Instr::StoreG(slot));
        self.emit(Instr::Jump(head));
        self.emit(Instr::Label(exit));
      }
      Stmt::Call { name, args, .. } => {
        if !self.frames.contains_key(name) && is_length(name) {
          return Err(CompileError::codegen(format!(
            "builtin '{name}' cannot be called as a statement"
          )));
        }
        self.call(name, args)?;
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

  fn read_into(&mut self, target: &LValue) -> CompileResult<()> {
    match target {
      LValue::Var(name) => {
        let binding = self.lookup(name)?;
        if binding.ty.is_array() {
          return Err(CompileError::codegen(format!(
            "cannot read into array '{name}' as a whole"
          )));
        }
        self.emit(Instr::Read);
        self.convert_input(&binding.ty);
        self.emit(Instr::StoreG(binding.slot));
      }
      LValue::Index { name, index } => {
        let (slot, start, elem) = self.array(name)?;
        self.element_address(slot, start, index)?;
        match self.options.indexed_read {
          IndexedRead::Corrected => {
            self.emit(Instr::Read);
            self.convert_input(&elem);
            self.emit(Instr::StoreN);
          }
          IndexedRead::AsRead => {
            if start != 0 {
              self.emit(Instr::Read);
              self.emit(Instr::Atoi);
              self.emit(Instr::StoreN);
            }
          }
        }
      }
    }
    Ok(())
  }

  fn convert_input(&mut self, ty: &Type) {
    match ty {
      Type::Integer | Type::Boolean => self.emit(Instr::Atoi),
      Type::Real => self.emit(Instr::Atof),
      Type::String | Type::Array { .. } => {}
    }
  }

  /// Store the arguments into the callee's frame and transfer control.
  /// Returns the result slot for functions.
  fn call(&mut self, name: &str, args: &[Expr]) -> CompileResult<Option<usize>> {
    let Some(frame) = self.frames.get(name) else {
      return Err(CompileError::codegen(format!(
        "undeclared function or procedure '{name}'"
      )));
    };
    let (base, result, arity) = (frame.base, frame.result, frame.callable.params.len());
    if args.len() != arity {
      return Err(CompileError::codegen(format!(
        "'{name}' expects {arity} arguments, got {}",
        args.len()
      )));
    }

    for (i, arg) in args.iter().enumerate() {
      self.expr(arg)?;
      self.emit(Instr::StoreG(base + i));
    }
    self.emit(Instr::PushA(Label::Entry(name.to_string())));
    self.emit(Instr::Call);
    Ok(result)
  }

  fn expr(&mut self, expr: &Expr) -> CompileResult<()> {
    match expr {
      Expr::Int(v) => self.emit(Instr::PushI(*v)),
      Expr::Real(v) => self.emit(Instr::PushF(*v)),
      Expr::Bool(v) => self.emit(Instr::PushI(i64::from(*v))),
      Expr::Str(s) => self.emit(Instr::PushS(s.clone())),
      Expr::Ident(name) => {
        let slot = self.lookup(name)?.slot;
        self.emit(Instr::PushG(slot));
      }
      Expr::Index { name, index } => {
        let binding = self.lookup(name)?;
        match binding.ty {
          Type::Array { start, .. } => {
            self.element_address(binding.slot, start, index)?;
            self.emit(Instr::LoadN);
          }
          // Characters are one-based regardless of any array bounds.
          Type::String => {
            self.emit(Instr::PushG(binding.slot));
            self.expr(index)?;
            self.emit(Instr::PushI(1));
            self.emit(Instr::Sub);
            self.emit(Instr::CharAt);
          }
          other => {
            return Err(CompileError::codegen(format!(
              "'{name}' of type {other} cannot be indexed"
            )));
          }
        }
      }
      Expr::Not(operand) => {
        self.expr(operand)?;
        self.emit(Instr::Not);
      }
      Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs)?,
      Expr::Call { name, args } => {
        if !self.frames.contains_key(name) && is_length(name) {
          let [arg] = args.as_slice() else {
            return Err(CompileError::codegen(format!(
              "'{name}' expects 1 argument, got {}",
              args.len()
            )));
          };
          self.expr(arg)?;
          self.emit(Instr::StrLen);
          return Ok(());
        }
        match self.call(name, args)? {
          Some(slot) => self.emit(Instr::PushG(slot)),
          None => {
            return Err(CompileError::codegen(format!(
              "procedure '{name}' used as a value"
            )));
          }
        }
      }
    }
    Ok(())
  }

  fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> CompileResult<()> {
    let (int_op, real_op) = match op {
      BinaryOp::Add => (Instr::Add, Instr::FAdd),
      BinaryOp::Sub => (Instr::Sub, Instr::FSub),
      BinaryOp::Mul => (Instr::Mul, Instr::FMul),
      BinaryOp::Div => {
        let lhs_ty = self.type_of(lhs)?;
        let rhs_ty = self.type_of(rhs)?;
        self.numeric_operand(lhs, &lhs_ty, true)?;
        self.numeric_operand(rhs, &rhs_ty, true)?;
        self.emit(Instr::FDiv);
        return Ok(());
      }
      BinaryOp::IntDiv | BinaryOp::Mod | BinaryOp::And | BinaryOp::Or => {
        self.expr(lhs)?;
        self.expr(rhs)?;
        self.emit(match op {
          BinaryOp::IntDiv => Instr::Div,
          BinaryOp::Mod => Instr::Mod,
          BinaryOp::And => Instr::And,
          _ => Instr::Or,
        });
        return Ok(());
      }
      BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
        self.comparison_operand(lhs, rhs)?;
        self.comparison_operand(rhs, lhs)?;
        match op {
          BinaryOp::Eq => self.emit(Instr::Equal),
          BinaryOp::Ne => {
            self.emit(Instr::Equal);
            self.emit(Instr::Not);
          }
          BinaryOp::Lt => self.emit(Instr::Inf),
          BinaryOp::Le => self.emit(Instr::InfEq),
          BinaryOp::Gt => self.emit(Instr::Sup),
          _ => self.emit(Instr::SupEq),
        }
        return Ok(());
      }
    };

    let lhs_ty = self.type_of(lhs)?;
    let rhs_ty = self.type_of(rhs)?;
    if op == BinaryOp::Add && lhs_ty == Type::String && rhs_ty == Type::String {
      self.expr(lhs)?;
      self.expr(rhs)?;
      self.emit(Instr::Concat);
      return Ok(());
    }

    let real = lhs_ty == Type::Real || rhs_ty == Type::Real;
    self.numeric_operand(lhs, &lhs_ty, real)?;
    self.numeric_operand(rhs, &rhs_ty, real)?;
    self.emit(if real { real_op } else { int_op });
    Ok(())
  }

  /// Integer operand of a real operation gets `ITOF` right after its code.
  fn numeric_operand(&mut self, expr: &Expr, ty: &Type, real: bool) -> CompileResult<()> {
    self.expr(expr)?;
    if real && *ty == Type::Integer {
      self.emit(Instr::Itof);
    }
    Ok(())
  }

  /// `CHARAT` yields a character code, so a one-character literal on the
  /// other side of the comparison is pushed as its code too.
  fn comparison_operand(&mut self, expr: &Expr, other: &Expr) -> CompileResult<()> {
    if let Expr::Str(s) = expr
      && self.is_char_read(other)
    {
      let mut chars = s.chars();
      if let (Some(c), None) = (chars.next(), chars.next()) {
        self.emit(Instr::PushI(i64::from(u32::from(c))));
        return Ok(());
      }
    }
    self.expr(expr)
  }

  fn is_char_read(&self, expr: &Expr) -> bool {
    match expr {
      Expr::Index { name, .. } => self
        .bindings
        .get(name)
        .is_some_and(|binding| binding.ty == Type::String),
      _ => false,
    }
  }

  /// Type as seen by the generator. Unlike the analyzer, `/` is always real
  /// and a character read is the integer code `CHARAT` leaves behind.
  fn type_of(&self, expr: &Expr) -> CompileResult<Type> {
    match expr {
      Expr::Int(_) => Ok(Type::Integer),
      Expr::Real(_) => Ok(Type::Real),
      Expr::Bool(_) | Expr::Not(_) => Ok(Type::Boolean),
      Expr::Str(_) => Ok(Type::String),
      Expr::Ident(name) => Ok(self.lookup(name)?.ty),
      Expr::Index { name, .. } => match self.lookup(name)?.ty {
        Type::Array { elem, .. } => Ok(*elem),
        Type::String => Ok(Type::Integer),
        other => Err(CompileError::codegen(format!(
          "'{name}' of type {other} cannot be indexed"
        ))),
      },
      Expr::Binary { op, lhs, rhs } => match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
          let lhs_ty = self.type_of(lhs)?;
          let rhs_ty = self.type_of(rhs)?;
          Ok(match (lhs_ty, rhs_ty) {
            (Type::String, Type::String) if *op == BinaryOp::Add => Type::String,
            (Type::Real, _) | (_, Type::Real) => Type::Real,
            _ => Type::Integer,
          })
        }
        BinaryOp::Div => Ok(Type::Real),
        BinaryOp::IntDiv | BinaryOp::Mod => Ok(Type::Integer),
        _ => Ok(Type::Boolean),
      },
      Expr::Call { name, .. } => match self.frames.get(name) {
        Some(frame) => frame.callable.ret.clone().ok_or_else(|| {
          CompileError::codegen(format!("procedure '{name}' used as a value"))
        }),
        None if is_length(name) => Ok(Type::Integer),
        None => Err(CompileError::codegen(format!(
          "undeclared function or procedure '{name}'"
        ))),
      },
    }
  }
}

fn is_length(name: &str) -> bool {
  name.eq_ignore_ascii_case("length")
}

fn unprintable(ty: &Type) -> CompileError {
  CompileError::codegen(format!("cannot print a value of type {ty}"))
}
