//! Instruction set of the target stack machine and its textual listing.
//!
//! The machine has one flat memory of global slots addressed by number, an
//! operand stack and heap blocks reached through handles. Programs are emitted
//! as a vector of [`Instr`] and only turned into text by [`render`].

use std::fmt;

/// Jump target. Local labels come from a per-compilation counter; callable
/// entries are named after the callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
  Local(u32),
  Entry(String),
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Label::Local(n) => write!(f, "L{n}"),
      Label::Entry(name) => write!(f, "FN{name}"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
  PushI(i64),
  PushF(f64),
  PushS(String),
  /// Load global slot.
  PushG(usize),
  /// Store top of stack into global slot.
  StoreG(usize),
  /// Push a code address.
  PushA(Label),
  /// Pop a size, push a handle to a fresh block.
  AllocN,
  /// Pop handle and offset, push the element.
  LoadN,
  /// Pop handle, offset and value, store the value.
  StoreN,
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  FAdd,
  FSub,
  FMul,
  FDiv,
  Itof,
  Equal,
  Inf,
  InfEq,
  Sup,
  SupEq,
  Not,
  And,
  Or,
  Jump(Label),
  Jz(Label),
  Call,
  Return,
  Read,
  Atoi,
  Atof,
  WriteI,
  WriteF,
  WriteS,
  WriteLn,
  StrI,
  StrLen,
  Concat,
  CharAt,
  Start,
  Stop,
  /// Definition site of a label, rendered `NAME:`.
  Label(Label),
}

impl fmt::Display for Instr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Instr::PushI(v) => write!(f, "PUSHI {v}"),
      Instr::PushF(v) => write!(f, "PUSHF {}", real_literal(*v)),
      Instr::PushS(s) => write!(f, "PUSHS \"{}\"", s.replace('"', "\\\"")),
      Instr::PushG(slot) => write!(f, "PUSHG {slot}"),
      Instr::StoreG(slot) => write!(f, "STOREG {slot}"),
      Instr::PushA(label) => write!(f, "PUSHA {label}"),
      Instr::Jump(label) => write!(f, "JUMP {label}"),
      Instr::Jz(label) => write!(f, "JZ {label}"),
      Instr::Label(label) => write!(f, "{label}:"),
      other => f.write_str(other.mnemonic()),
    }
  }
}

impl Instr {
  /// Opcode name; operands are added by `Display`.
  pub fn mnemonic(&self) -> &'static str {
    match self {
      Instr::PushI(_) => "PUSHI",
      Instr::PushF(_) => "PUSHF",
      Instr::PushS(_) => "PUSHS",
      Instr::PushG(_) => "PUSHG",
      Instr::StoreG(_) => "STOREG",
      Instr::PushA(_) => "PUSHA",
      Instr::AllocN => "ALLOCN",
      Instr::LoadN => "LOADN",
      Instr::StoreN => "STOREN",
      Instr::Add => "ADD",
      Instr::Sub => "SUB",
      Instr::Mul => "MUL",
      Instr::Div => "DIV",
      Instr::Mod => "MOD",
      Instr::FAdd => "FADD",
      Instr::FSub => "FSUB",
      Instr::FMul => "FMUL",
      Instr::FDiv => "FDIV",
      Instr::Itof => "ITOF",
      Instr::Equal => "EQUAL",
      Instr::Inf => "INF",
      Instr::InfEq => "INFEQ",
      Instr::Sup => "SUP",
      Instr::SupEq => "SUPEQ",
      Instr::Not => "NOT",
      Instr::And => "AND",
      Instr::Or => "OR",
      Instr::Jump(_) => "JUMP",
      Instr::Jz(_) => "JZ",
      Instr::Call => "CALL",
      Instr::Return => "RETURN",
      Instr::Read => "READ",
      Instr::Atoi => "ATOI",
      Instr::Atof => "ATOF",
      Instr::WriteI => "WRITEI",
      Instr::WriteF => "WRITEF",
      Instr::WriteS => "WRITES",
      Instr::WriteLn => "WRITELN",
      Instr::StrI => "STRI",
      Instr::StrLen => "STRLEN",
      Instr::Concat => "CONCAT",
      Instr::CharAt => "CHARAT",
      Instr::Start => "START",
      Instr::Stop => "STOP",
      Instr::Label(_) => "LABEL",
    }
  }
}

/// Shortest round-trip form, with a `.` even for integral values.
fn real_literal(value: f64) -> String {
  let text = value.to_string();
  if value.is_finite() && !text.contains('.') {
    format!("{text}.0")
  } else {
    text
  }
}

/// One instruction per line, newline-terminated.
pub fn render(code: &[Instr]) -> String {
  let mut out = String::new();
  for instr in code {
    out.push_str(&instr.to_string());
    out.push('\n');
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn operands_and_labels() {
    let code = vec![
      Instr::Start,
      Instr::PushI(-3),
      Instr::PushF(2.0),
      Instr::PushF(0.25),
      Instr::PushG(4),
      Instr::Label(Label::Local(0)),
      Instr::Jz(Label::Local(1)),
      Instr::PushA(Label::Entry("fact".to_string())),
      Instr::Label(Label::Entry("fact".to_string())),
      Instr::Stop,
    ];
    assert_eq!(
      render(&code),
      "START\nPUSHI -3\nPUSHF 2.0\nPUSHF 0.25\nPUSHG 4\nL0:\nJZ L1\nPUSHA FNfact\nFNfact:\nSTOP\n"
    );
  }

  #[test]
  fn strings_escape_double_quotes() {
    let instr = Instr::PushS("say \"hi\"".to_string());
    assert_eq!(instr.to_string(), r#"PUSHS "say \"hi\"""#);
  }

  #[test]
  fn empty_listing_is_empty() {
    assert_eq!(render(&[]), "");
  }
}
