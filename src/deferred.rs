use crate::error::{Error, Result};
use crate::primitive::Value;
use std::cell::Cell;
use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::rc::Rc;

/// The closure behind a pending value, flagged while it runs so that a value
/// depending on itself fails instead of recursing.
pub struct Thunk {
    f: Box<dyn Fn() -> Result<Value>>,
    forcing: Cell<bool>,
}

impl Thunk {
    fn force(&self) -> Result<Value> {
        if self.forcing.replace(true) {
            return Err(Error::UnresolvedDependency);
        }

        let result = (self.f)();
        self.forcing.set(false);
        result
    }
}

/// A value that is either known now or computed each time it is asked for.
#[derive(Clone)]
pub enum Deferred {
    Concrete(Value),
    Pending(Rc<Thunk>),
}

impl Deferred {
    pub fn concrete(value: impl Into<Value>) -> Deferred {
        Deferred::Concrete(value.into())
    }

    pub fn lazy(f: impl Fn() -> Result<Value> + 'static) -> Deferred {
        Deferred::Pending(Rc::new(Thunk {
            f: Box::new(f),
            forcing: Cell::new(false),
        }))
    }

    pub fn lazy_int(f: impl Fn() -> Result<i128> + 'static) -> Deferred {
        Deferred::lazy(move || f().map(Value::Int))
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, Deferred::Concrete(_))
    }

    /// Evaluates the value. Pending values are recomputed on every call.
    pub fn force(&self) -> Result<Value> {
        match self {
            Deferred::Concrete(value) => Ok(value.clone()),
            Deferred::Pending(thunk) => thunk.force(),
        }
    }

    pub fn force_int(&self) -> Result<i128> {
        self.force()?.as_int()
    }

    pub fn map(&self, f: impl Fn(i128) -> i128 + 'static) -> Deferred {
        let source = self.clone();
        Deferred::lazy_int(move || Ok(f(source.force_int()?)))
    }

    /// Bits `low..high` of the value, shifted down to bit 0.
    pub fn slice(&self, low: u32, high: u32) -> Deferred {
        if high <= low {
            return self.clone();
        }

        let width = high - low;
        let shift = low.min(127);
        let mask = match width {
            0..=126 => (1i128 << width) - 1,
            127 => i128::MAX,
            _ => return self.map(move |x| x >> shift),
        };
        self.map(move |x| (x >> shift) & mask)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deferred::Concrete(value) => write!(f, "Concrete({})", value),
            Deferred::Pending(_) => write!(f, "Pending"),
        }
    }
}

impl From<Value> for Deferred {
    fn from(value: Value) -> Self {
        Deferred::Concrete(value)
    }
}

macro_rules! deferred_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Deferred {
                fn from(x: $t) -> Self {
                    Deferred::Concrete(Value::from(x))
                }
            }
        )*
    };
}

deferred_from!(i8, u8, i16, u16, i32, u32, i64, u64, i128, usize, f32, f64, Vec<u8>);

macro_rules! deferred_arith {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<i128> for Deferred {
            type Output = Deferred;

            fn $method(self, rhs: i128) -> Deferred {
                self.map(move |x| x $op rhs)
            }
        }

        impl $trait<Deferred> for Deferred {
            type Output = Deferred;

            fn $method(self, rhs: Deferred) -> Deferred {
                Deferred::lazy_int(move || Ok(self.force_int()? $op rhs.force_int()?))
            }
        }
    };
}

deferred_arith!(Add, add, +);
deferred_arith!(Sub, sub, -);
deferred_arith!(Mul, mul, *);
