use std::fmt;
use std::io::{ErrorKind, Read};

use crate::error::{Error, Result};

/// A value decoded from (or embedded into) a generated program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i32),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Tuple(_) => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Int(_) => None,
            Value::Tuple(items) => Some(items),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Reads exactly `N` bytes. A stream that is already at EOF yields `None`;
/// one that ends inside the `N` bytes is an `IncompleteValue` error.
pub fn read_fixed<const N: usize, R: Read + ?Sized>(reader: &mut R) -> Result<Option<[u8; N]>> {
    let mut buf = [0u8; N];
    let mut filled = 0;
    while filled < N {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(Error::Io(err)),
        }
    }
    match filled {
        0 => Ok(None),
        n if n == N => Ok(Some(buf)),
        got => Err(Error::IncompleteValue { expected: N, got }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_fixed_distinguishes_eof_from_truncation() {
        let mut empty: &[u8] = &[];
        assert_eq!(read_fixed::<4, _>(&mut empty).unwrap(), None);

        let mut short: &[u8] = &[1, 2];
        match read_fixed::<4, _>(&mut short) {
            Err(Error::IncompleteValue { expected: 4, got: 2 }) => {}
            other => panic!("unexpected: {other:?}"),
        }

        let mut full: &[u8] = &[1, 2, 3, 4, 5];
        assert_eq!(read_fixed::<4, _>(&mut full).unwrap(), Some([1, 2, 3, 4]));
        assert_eq!(full, &[5]);
    }

    #[test]
    fn tuples_display_like_tuples() {
        let v = Value::Tuple(vec![Value::Int(1), Value::Tuple(vec![Value::Int(-2)])]);
        assert_eq!(v.to_string(), "(1, (-2,))");
        assert_eq!(Value::Tuple(Vec::new()).to_string(), "()");
    }
}
