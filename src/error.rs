use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// A value does not fit the primitive (or instruction operand) it is
    /// encoded into, or bytes do not match the primitive width.
    Codec(String),

    /// A record of the wrong type was inserted into a sequence.
    TypeMismatch { expected: String, found: String },

    /// The layout cannot tell how many bytes a part occupies.
    UnsizablePart(String),

    /// One or more fields failed while writing a record in collecting mode.
    AggregateWrite {
        record: String,
        first: String,
        failures: Vec<(String, Error)>,
    },

    UnsetField(String),
    UnknownField(String),
    UnknownType(String),
    DuplicateField(String),
    UnknownLabel(String),
    UnknownPart(String),
    DuplicatePart(String),

    /// A dynamic array count could not be resolved without an instance.
    UnresolvedCount(String),

    /// A deferred value was forced again while it was still being forced.
    UnresolvedDependency,

    /// A deferred value outlived the record, section or layout it reads.
    Detached(String),

    /// Two data section entries claim the same bytes.
    Overlap(String),

    /// A part wrote a different number of bytes than it reported.
    SizeMismatch {
        part: String,
        expected: usize,
        written: usize,
    },

    NotAnInteger,

    Io(io::Error),
}

impl Error {
    pub fn codec(msg: impl Into<String>) -> Error {
        Error::Codec(msg.into())
    }

    /// Names of the failing fields of an aggregate write error, in field order.
    pub fn failed_fields(&self) -> Vec<&str> {
        match self {
            Error::AggregateWrite { failures, .. } => {
                failures.iter().map(|(name, _)| name.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Codec(msg) => write!(f, "codec error: {}", msg),
            Error::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {}, found {}", expected, found)
            }
            Error::UnsizablePart(name) => write!(f, "unsizable part `{}`", name),
            Error::AggregateWrite {
                record,
                first,
                failures,
            } => {
                write!(
                    f,
                    "writing {} failed at field `{}` ({} failure(s))",
                    record,
                    first,
                    failures.len()
                )?;
                for (name, e) in failures {
                    write!(f, "\n  {}: {}", name, e)?;
                }
                Ok(())
            }
            Error::UnsetField(name) => write!(f, "field `{}` has no value", name),
            Error::UnknownField(name) => write!(f, "unknown field `{}`", name),
            Error::UnknownType(name) => write!(f, "unknown type `{}`", name),
            Error::DuplicateField(name) => write!(f, "field `{}` declared twice", name),
            Error::UnknownLabel(name) => write!(f, "unknown label `{}`", name),
            Error::UnknownPart(name) => write!(f, "unknown part `{}`", name),
            Error::DuplicatePart(name) => write!(f, "part `{}` declared twice", name),
            Error::UnresolvedCount(name) => {
                write!(f, "count of field `{}` depends on an instance", name)
            }
            Error::UnresolvedDependency => {
                write!(f, "deferred value depends on itself")
            }
            Error::Detached(owner) => write!(f, "deferred value outlived its {}", owner),
            Error::Overlap(name) => write!(f, "entry `{}` overlaps its predecessor", name),
            Error::SizeMismatch {
                part,
                expected,
                written,
            } => write!(
                f,
                "part `{}` wrote {} bytes but reported a size of {}",
                part, written, expected
            ),
            Error::NotAnInteger => write!(f, "value is not an integer"),
            Error::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
