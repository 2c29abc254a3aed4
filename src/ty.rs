use std::fmt;

/// Declared type of a variable, constant, parameter or function result.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
  Integer,
  Real,
  Boolean,
  String,
  /// Arrays keep their declared bounds so literal indices can be checked
  /// statically. The element type is always scalar.
  Array {
    elem: Box<Type>,
    start: i64,
    len: i64,
  },
}

impl Type {
  pub fn array_of(elem: Type, start: i64, len: i64) -> Self {
    Self::Array {
      elem: Box::new(elem),
      start,
      len,
    }
  }

  pub fn is_numeric(&self) -> bool {
    matches!(self, Type::Integer | Type::Real)
  }

  pub fn is_array(&self) -> bool {
    matches!(self, Type::Array { .. })
  }

  pub fn elem(&self) -> Option<&Type> {
    match self {
      Type::Array { elem, .. } => Some(elem),
      _ => None,
    }
  }

  /// Inclusive index range of an array type.
  pub fn bounds(&self) -> Option<(i64, i64)> {
    match self {
      Type::Array { start, len, .. } => Some((*start, start + len - 1)),
      _ => None,
    }
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Type::Integer => f.write_str("integer"),
      Type::Real => f.write_str("real"),
      Type::Boolean => f.write_str("boolean"),
      Type::String => f.write_str("string"),
      Type::Array { elem, start, len } => {
        write!(f, "array[{start}..{}] of {elem}", start + len - 1)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn array_bounds_are_inclusive() {
    let ty = Type::array_of(Type::Integer, 1, 5);
    assert_eq!(ty.bounds(), Some((1, 5)));
    assert_eq!(ty.to_string(), "array[1..5] of integer");
    assert_eq!(Type::Real.bounds(), None);
  }
}
