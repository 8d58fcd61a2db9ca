use core::fmt;

use crate::wire::{Error, Result};
use crate::wire::cursor::{fits_int, fits_uint};
use super::Int;

/// The value of a single field of a packet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// An unsigned integer, also used for bit fields and computed fields.
    Uint(u64),
    /// A signed integer.
    Int(i64),
    /// A byte string, for fixed and variable length byte fields.
    Bytes(Vec<u8>),
}

/// The default value of a field, usable in constant tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// An unsigned integer.
    Uint(u64),
    /// A signed integer.
    Int(i64),
    /// A byte string.
    ///
    /// An empty slice stands for all zeroes when used for a fixed width field.
    Bytes(&'static [u8]),
    /// No bytes, the default of variable length fields.
    Empty,
}

impl Value {
    /// The value as an unsigned integer, if it is one.
    ///
    /// Non-negative signed values are converted.
    pub fn as_uint(&self) -> Option<u64> {
        match *self {
            Value::Uint(value) => Some(value),
            Value::Int(value) if value >= 0 => Some(value as u64),
            _ => None,
        }
    }

    /// The value as a signed integer, if it is one that fits.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int(value) => Some(value),
            Value::Uint(value) if value <= i64::MAX as u64 => Some(value as i64),
            _ => None,
        }
    }

    /// The value as a byte string, if it is one.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl Int {
    /// Convert a value into the canonical representation for this integer field.
    ///
    /// Returns `Err(Error::InvalidFieldValue)` if it is no integer or does not fit.
    pub fn normalize(&self, value: Value) -> Result<Value> {
        let width = usize::from(self.width);
        if self.signed {
            match value.as_int() {
                Some(value) if fits_int(value, width) => Ok(Value::Int(value)),
                _ => Err(Error::InvalidFieldValue),
            }
        } else {
            match value.as_uint() {
                Some(value) if fits_uint(value, width) => Ok(Value::Uint(value)),
                _ => Err(Error::InvalidFieldValue),
            }
        }
    }
}

impl Preset {
    /// The value this preset stands for in a field of the given fixed width.
    ///
    /// Without a width, the bytes are taken as they are.
    pub fn value(&self, width: Option<usize>) -> Value {
        match *self {
            Preset::Uint(value) => Value::Uint(value),
            Preset::Int(value) => Value::Int(value),
            Preset::Bytes(bytes) => match width {
                Some(width) if bytes.is_empty() => Value::Bytes(vec![0; width]),
                _ => Value::Bytes(bytes.to_vec()),
            },
            Preset::Empty => match width {
                Some(width) => Value::Bytes(vec![0; width]),
                None => Value::Bytes(Vec::new()),
            },
        }
    }
}

macro_rules! value_from_int {
    ($variant:ident, $cast:ty: $($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(<$cast>::from(value))
                }
            }
        )*
    };
}

value_from_int!(Uint, u64: u8, u16, u32, u64);
value_from_int!(Int, i64: i8, i16, i32, i64);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Uint(value.into())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&'_ [u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Value {
    fn from(value: [u8; N]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl<const N: usize> From<&'_ [u8; N]> for Value {
    fn from(value: &[u8; N]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Uint(value) => write!(f, "{}", value),
            Value::Int(value) => write!(f, "{}", value),
            Value::Bytes(bytes) => {
                f.write_str("0x")?;
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::Endian;

    const U16: Int = Int { width: 2, signed: false, order: Endian::Big };
    const I8: Int = Int { width: 1, signed: true, order: Endian::Big };

    #[test]
    fn normalize_unsigned() {
        assert_eq!(U16.normalize(0xffffu16.into()), Ok(Value::Uint(0xffff)));
        assert_eq!(U16.normalize(7i32.into()), Ok(Value::Uint(7)));
        assert_eq!(U16.normalize(0x10000u32.into()), Err(Error::InvalidFieldValue));
        assert_eq!(U16.normalize((-1i8).into()), Err(Error::InvalidFieldValue));
        assert_eq!(U16.normalize(vec![0, 1].into()), Err(Error::InvalidFieldValue));
    }

    #[test]
    fn normalize_signed() {
        assert_eq!(I8.normalize((-128i16).into()), Ok(Value::Int(-128)));
        assert_eq!(I8.normalize(127u8.into()), Ok(Value::Int(127)));
        assert_eq!(I8.normalize(128u8.into()), Err(Error::InvalidFieldValue));
        assert_eq!(I8.normalize(Value::Uint(u64::MAX)), Err(Error::InvalidFieldValue));
    }

    #[test]
    fn presets() {
        assert_eq!(Preset::Bytes(&[]).value(Some(3)), Value::Bytes(vec![0; 3]));
        assert_eq!(Preset::Bytes(&[1, 2]).value(Some(2)), Value::Bytes(vec![1, 2]));
        assert_eq!(Preset::Empty.value(None), Value::Bytes(vec![]));
        assert_eq!(Preset::Uint(4).value(Some(1)), Value::Uint(4));
    }

    #[test]
    fn display() {
        assert_eq!(Value::Uint(2048).to_string(), "2048");
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::from([0xaa, 0x0b]).to_string(), "0xaa0b");
    }
}
