//! Abstract syntax tree shared by the analyzer and the code generator.
//!
//! Every node kind is a variant of a closed enum, so both later stages match
//! exhaustively over the same set. Statements and declarations carry the line
//! they started on; expressions borrow the line of the enclosing statement.

pub use crate::ty::Type;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
  pub name: String,
  pub block: Block,
}

/// Declarations followed by the statements of one `begin ... end`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
  pub decls: Vec<Decl>,
  pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
  /// `a, b: integer;`
  Var {
    names: Vec<String>,
    ty: Type,
    line: usize,
  },
  /// `a, b: array[lo..hi] of integer;`
  Array {
    names: Vec<String>,
    elem: Type,
    start: i64,
    len: i64,
    line: usize,
  },
  /// `name = literal;`
  Const {
    name: String,
    value: Literal,
    line: usize,
  },
  Subprogram(Callable),
}

impl Decl {
  /// Number of storage slots the declaration reserves.
  pub fn slot_count(&self) -> usize {
    match self {
      Decl::Var { names, .. } | Decl::Array { names, .. } => names.len(),
      Decl::Const { .. } => 1,
      Decl::Subprogram(_) => 0,
    }
  }
}

/// A function or procedure definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Callable {
  pub name: String,
  pub params: Vec<Param>,
  /// Present exactly for functions; procedures have none.
  pub ret: Option<Type>,
  pub block: Block,
  pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
  pub name: String,
  pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
  Int(i64),
  Real(f64),
  Bool(bool),
  Str(String),
}

impl Literal {
  /// Constants take their type from the literal's own kind.
  pub fn ty(&self) -> Type {
    match self {
      Literal::Int(_) => Type::Integer,
      Literal::Real(_) => Type::Real,
      Literal::Bool(_) => Type::Boolean,
      Literal::Str(_) => Type::String,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  To,
  Downto,
}

/// Destination of a `readln`.
#[derive(Debug, Clone, PartialEq)]
pub enum LValue {
  Var(String),
  Index { name: String, index: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
  Assign {
    target: String,
    value: Expr,
    line: usize,
  },
  AssignIndex {
    target: String,
    index: Expr,
    value: Expr,
    line: usize,
  },
  Writeln {
    args: Vec<Expr>,
    line: usize,
  },
  /// `write(...)`: like `writeln` without the trailing newline.
  Write {
    args: Vec<Expr>,
    line: usize,
  },
  Readln {
    targets: Vec<LValue>,
    line: usize,
  },
  If {
    cond: Expr,
    then_branch: Box<Stmt>,
    else_branch: Option<Box<Stmt>>,
    line: usize,
  },
  While {
    cond: Expr,
    body: Box<Stmt>,
    line: usize,
  },
  For {
    var: String,
    start: Expr,
    end: Expr,
    direction: Direction,
    body: Box<Stmt>,
    line: usize,
  },
  Call {
    name: String,
    args: Vec<Expr>,
    line: usize,
  },
  Compound(Vec<Stmt>),
  Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  /// `/`, always real division.
  Div,
  /// `div`, integer division.
  IntDiv,
  Mod,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  And,
  Or,
}

impl BinaryOp {
  pub fn is_relational(self) -> bool {
    matches!(
      self,
      BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
    )
  }

  pub fn symbol(self) -> &'static str {
    match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::IntDiv => "div",
      BinaryOp::Mod => "mod",
      BinaryOp::Eq => "=",
      BinaryOp::Ne => "<>",
      BinaryOp::Lt => "<",
      BinaryOp::Le => "<=",
      BinaryOp::Gt => ">",
      BinaryOp::Ge => ">=",
      BinaryOp::And => "and",
      BinaryOp::Or => "or",
    }
  }
}

/// Expression tree produced by the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Int(i64),
  Real(f64),
  Bool(bool),
  Str(String),
  Ident(String),
  /// `name[index]`: array element or string character, decided by type.
  Index {
    name: String,
    index: Box<Expr>,
  },
  Not(Box<Expr>),
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Call {
    name: String,
    args: Vec<Expr>,
  },
}

impl Expr {
  pub fn index(name: impl Into<String>, index: Expr) -> Self {
    Self::Index {
      name: name.into(),
      index: Box::new(index),
    }
  }

  pub fn not(operand: Expr) -> Self {
    Self::Not(Box::new(operand))
  }

  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }
}
