use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signedness {
    Signed,
    Unsigned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scalar {
    Int { signedness: Signedness, width: usize },
    Float,
    Double,
}

/// A fixed-width scalar wire codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PrimitiveType {
    pub name: &'static str,
    pub scalar: Scalar,
    pub endianness: Endianness,
}

const fn int(
    name: &'static str,
    signedness: Signedness,
    width: usize,
    endianness: Endianness,
) -> PrimitiveType {
    PrimitiveType {
        name,
        scalar: Scalar::Int { signedness, width },
        endianness,
    }
}

use Endianness::{Big, Little};
use Signedness::{Signed, Unsigned};

pub const UBYTE: PrimitiveType = int("ubyte", Unsigned, 1, Little);
pub const SBYTE: PrimitiveType = int("sbyte", Signed, 1, Little);
pub const LE_UHWORD: PrimitiveType = int("le_uhword", Unsigned, 2, Little);
pub const LE_SHWORD: PrimitiveType = int("le_shword", Signed, 2, Little);
pub const BE_UHWORD: PrimitiveType = int("be_uhword", Unsigned, 2, Big);
pub const BE_SHWORD: PrimitiveType = int("be_shword", Signed, 2, Big);
pub const LE_UWORD: PrimitiveType = int("le_uword", Unsigned, 4, Little);
pub const LE_SWORD: PrimitiveType = int("le_sword", Signed, 4, Little);
pub const BE_UWORD: PrimitiveType = int("be_uword", Unsigned, 4, Big);
pub const BE_SWORD: PrimitiveType = int("be_sword", Signed, 4, Big);
pub const LE_UDWORD: PrimitiveType = int("le_udword", Unsigned, 8, Little);
pub const LE_SDWORD: PrimitiveType = int("le_sdword", Signed, 8, Little);
pub const BE_UDWORD: PrimitiveType = int("be_udword", Unsigned, 8, Big);
pub const BE_SDWORD: PrimitiveType = int("be_sdword", Signed, 8, Big);

pub const LE_FLOAT: PrimitiveType = PrimitiveType {
    name: "le_float",
    scalar: Scalar::Float,
    endianness: Little,
};
pub const BE_FLOAT: PrimitiveType = PrimitiveType {
    name: "be_float",
    scalar: Scalar::Float,
    endianness: Big,
};
pub const LE_DOUBLE: PrimitiveType = PrimitiveType {
    name: "le_double",
    scalar: Scalar::Double,
    endianness: Little,
};
pub const BE_DOUBLE: PrimitiveType = PrimitiveType {
    name: "be_double",
    scalar: Scalar::Double,
    endianness: Big,
};

pub const BUILTINS: [PrimitiveType; 18] = [
    UBYTE, SBYTE, LE_UHWORD, LE_SHWORD, BE_UHWORD, BE_SHWORD, LE_UWORD, LE_SWORD, BE_UWORD,
    BE_SWORD, LE_UDWORD, LE_SDWORD, BE_UDWORD, BE_SDWORD, LE_FLOAT, BE_FLOAT, LE_DOUBLE,
    BE_DOUBLE,
];

#[rustfmt::skip]
pub const C_ALIASES: [(&str, &str); 13] = [
    ("sbyte",     "int8_t"),
    ("ubyte",     "uint8_t"),
    ("ubyte",     "uchar"),
    ("le_shword", "int16_t"),
    ("le_shword", "short"),
    ("le_uhword", "uint16_t"),
    ("le_sword",  "int32_t"),
    ("le_sword",  "int"),
    ("le_uword",  "uint32_t"),
    ("le_sdword", "int64_t"),
    ("le_udword", "uint64_t"),
    ("le_float",  "float"),
    ("le_double", "double"),
];

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i128),
    Float(f64),
    Array(Vec<Value>),
}

impl Value {
    pub fn as_int(&self) -> Result<i128> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Float(x) if x.fract() == 0.0 && x.is_finite() => Ok(*x as i128),
            _ => Err(Error::NotAnInteger),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(x) => Ok(*x),
            Value::Array(_) => Err(Error::codec("expected a number, found an array")),
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(x: $t) -> Self {
                    Value::Int(x as i128)
                }
            }
        )*
    };
}

value_from_int!(i8, u8, i16, u16, i32, u32, i64, u64, i128, usize);

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x as f64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl PrimitiveType {
    pub fn width(&self) -> usize {
        match self.scalar {
            Scalar::Int { width, .. } => width,
            Scalar::Float => 4,
            Scalar::Double => 8,
        }
    }

    /// Inclusive range of integers representable by an integer primitive.
    pub fn int_range(&self) -> Option<(i128, i128)> {
        let Scalar::Int { signedness, width } = self.scalar else {
            return None;
        };
        let bits = 8 * width as u32;
        Some(match signedness {
            Signed => (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1),
            Unsigned => (0, (1i128 << bits) - 1),
        })
    }

    /// Encodes `value` into exactly `width()` bytes. Values outside the
    /// representable range are rejected, never truncated.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let mut bytes = match self.scalar {
            Scalar::Int { width, .. } => {
                let x = match value {
                    Value::Int(i) => *i,
                    Value::Float(x) if x.fract() == 0.0 && x.is_finite() => *x as i128,
                    other => {
                        return Err(Error::codec(format!(
                            "{} cannot hold {}",
                            self.name, other
                        )))
                    }
                };

                let (min, max) = self.int_range().unwrap_or((0, 0));
                if x < min || x > max {
                    return Err(Error::codec(format!(
                        "{} is out of range for {} ({}..={})",
                        x, self.name, min, max
                    )));
                }

                (x as u128).to_le_bytes()[..width].to_vec()
            }
            Scalar::Float => (value.as_f64()? as f32).to_le_bytes().to_vec(),
            Scalar::Double => value.as_f64()?.to_le_bytes().to_vec(),
        };

        if self.endianness == Big {
            bytes.reverse();
        }

        Ok(bytes)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        if bytes.len() != self.width() {
            return Err(Error::codec(format!(
                "{} expects {} bytes, got {}",
                self.name,
                self.width(),
                bytes.len()
            )));
        }

        let mut le = bytes.to_vec();
        if self.endianness == Big {
            le.reverse();
        }

        Ok(match self.scalar {
            Scalar::Int { signedness, width } => {
                let mut raw = [0u8; 16];
                raw[..width].copy_from_slice(&le);
                let unsigned = u128::from_le_bytes(raw) as i128;
                let bits = 8 * width as u32;

                if signedness == Signed && (unsigned >> (bits - 1)) & 1 == 1 {
                    Value::Int(unsigned - (1i128 << bits))
                } else {
                    Value::Int(unsigned)
                }
            }
            Scalar::Float => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&le);
                Value::Float(f32::from_le_bytes(raw) as f64)
            }
            Scalar::Double => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&le);
                Value::Float(f64::from_le_bytes(raw))
            }
        })
    }
}

/// Maps declarator names to primitive types.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, PrimitiveType>,
}

impl TypeRegistry {
    pub fn new() -> TypeRegistry {
        TypeRegistry {
            types: HashMap::new(),
        }
    }

    /// The builtin wire types and their C aliases.
    pub fn with_builtins() -> TypeRegistry {
        let mut registry = TypeRegistry::new();

        for ty in BUILTINS {
            registry.add(ty.name, ty);
        }

        for (existing, alias) in C_ALIASES {
            let ty = registry.types[existing];
            registry.add(alias, ty);
        }

        registry
    }

    pub fn add(&mut self, name: &str, ty: PrimitiveType) {
        self.types.insert(name.to_string(), ty);
    }

    pub fn typedef(&mut self, existing: &str, alias: &str) -> Result<()> {
        let ty = self
            .get(existing)
            .ok_or_else(|| Error::UnknownType(existing.to_string()))?;
        self.add(alias, ty);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<PrimitiveType> {
        self.types.get(name).copied()
    }
}
