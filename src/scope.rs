//! Nested declaration regions used by the analyzer.
//!
//! Scopes form a stack: the bottom entry is the global scope and has no
//! parent, every callable body pushes one child on top of it. Lookups walk
//! from the innermost scope outwards. Variables and callables live in separate
//! namespaces, so a function `f` and a variable `f` never collide.

use std::collections::HashMap;

use crate::ast::{Param, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
  Variable,
  Constant,
  Parameter,
  /// A function's own name inside its body, assigned to set the result.
  FunctionResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
  pub ty: Type,
  pub kind: SymbolKind,
}

impl Symbol {
  pub fn new(ty: Type, kind: SymbolKind) -> Self {
    Self { ty, kind }
  }
}

/// Return type (absent for procedures) and ordered formal parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
  pub ret: Option<Type>,
  pub params: Vec<Param>,
}

/// Callables every program can use without declaring them.
pub fn builtin_signature(name: &str) -> Option<Signature> {
  if name.eq_ignore_ascii_case("length") {
    return Some(Signature {
      ret: Some(Type::Integer),
      params: vec![Param {
        name: "s".to_string(),
        ty: Type::String,
      }],
    });
  }
  None
}

#[derive(Debug, Default)]
pub struct Scope {
  symbols: HashMap<String, Symbol>,
  callables: HashMap<String, Signature>,
}

#[derive(Debug)]
pub struct ScopeStack {
  scopes: Vec<Scope>,
}

impl ScopeStack {
  pub fn new() -> Self {
    Self {
      scopes: vec![Scope::default()],
    }
  }

  pub fn at_global(&self) -> bool {
    self.scopes.len() == 1
  }

  pub fn enter(&mut self) {
    self.scopes.push(Scope::default());
  }

  pub fn exit(&mut self) {
    debug_assert!(self.scopes.len() > 1, "attempting to exit the global scope");
    if self.scopes.len() > 1 {
      self.scopes.pop();
    }
  }

  fn current(&mut self) -> &mut Scope {
    let last = self.scopes.len() - 1;
    &mut self.scopes[last]
  }

  /// Declare a name in the innermost scope. Returns `false` if that scope
  /// already holds it; outer declarations are shadowed silently.
  pub fn declare(&mut self, name: &str, symbol: Symbol) -> bool {
    let scope = self.current();
    if scope.symbols.contains_key(name) {
      return false;
    }
    scope.symbols.insert(name.to_string(), symbol);
    true
  }

  pub fn declare_callable(&mut self, name: &str, signature: Signature) -> bool {
    let scope = self.current();
    if scope.callables.contains_key(name) {
      return false;
    }
    scope.callables.insert(name.to_string(), signature);
    true
  }

  pub fn lookup(&self, name: &str) -> Option<&Symbol> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.symbols.get(name))
  }

  /// Only user declarations; see [`builtin_signature`] for the fallback.
  pub fn lookup_callable(&self, name: &str) -> Option<&Signature> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.callables.get(name))
  }
}

impl Default for ScopeStack {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lookup_walks_outwards_and_inner_shadows() {
    let mut scopes = ScopeStack::new();
    assert!(scopes.declare("x", Symbol::new(Type::Integer, SymbolKind::Variable)));
    scopes.enter();
    assert_eq!(scopes.lookup("x").map(|s| &s.ty), Some(&Type::Integer));
    assert!(scopes.declare("x", Symbol::new(Type::Real, SymbolKind::Parameter)));
    assert_eq!(scopes.lookup("x").map(|s| &s.ty), Some(&Type::Real));
    scopes.exit();
    assert_eq!(scopes.lookup("x").map(|s| &s.ty), Some(&Type::Integer));
  }

  #[test]
  fn duplicate_in_same_scope_is_refused() {
    let mut scopes = ScopeStack::new();
    assert!(scopes.declare("x", Symbol::new(Type::Integer, SymbolKind::Variable)));
    assert!(!scopes.declare("x", Symbol::new(Type::Real, SymbolKind::Variable)));
  }

  #[test]
  fn callables_have_their_own_namespace() {
    let mut scopes = ScopeStack::new();
    assert!(scopes.declare("f", Symbol::new(Type::Integer, SymbolKind::Variable)));
    assert!(scopes.declare_callable(
      "f",
      Signature {
        ret: None,
        params: vec![]
      }
    ));
    assert!(scopes.lookup_callable("f").is_some());
    assert!(scopes.lookup_callable("g").is_none());
  }

  #[test]
  fn length_builtin_ignores_case() {
    let sig = builtin_signature("Length").expect("length is builtin");
    assert_eq!(sig.ret, Some(Type::Integer));
    assert_eq!(sig.params.len(), 1);
    assert!(builtin_signature("size").is_none());
  }
}
