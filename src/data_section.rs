use crate::deferred::Deferred;
use crate::error::{Error, Result};
use crate::primitive::{PrimitiveType, Value, LE_DOUBLE, LE_FLOAT, LE_UWORD};
use std::cell::RefCell;
use std::io::Write;
use std::rc::{Rc, Weak};

/// A constant stored in a data section, together with how it is packed.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Ascii(String),
    Utf8(String),
    Scalar(Value, PrimitiveType),
    Scalars(Vec<Value>, PrimitiveType),
    Raw(Vec<u8>),
}

impl Constant {
    pub fn packed(&self) -> Result<Vec<u8>> {
        match self {
            Constant::Ascii(s) => {
                if !s.is_ascii() {
                    return Err(Error::codec(format!("{:?} is not ascii", s)));
                }
                Ok(s.as_bytes().to_vec())
            }
            Constant::Utf8(s) => Ok(s.as_bytes().to_vec()),
            Constant::Scalar(value, ty) => ty.encode(value),
            Constant::Scalars(values, ty) => {
                let mut bytes = Vec::with_capacity(values.len() * ty.width());
                for value in values {
                    bytes.extend(ty.encode(value)?);
                }
                Ok(bytes)
            }
            Constant::Raw(bytes) => Ok(bytes.clone()),
        }
    }

    pub fn packed_size(&self) -> Result<usize> {
        Ok(match self {
            Constant::Ascii(s) | Constant::Utf8(s) => s.len(),
            Constant::Scalar(_, ty) => ty.width(),
            Constant::Scalars(values, ty) => values.len() * ty.width(),
            Constant::Raw(bytes) => bytes.len(),
        })
    }
}

impl From<&str> for Constant {
    fn from(s: &str) -> Self {
        Constant::Ascii(s.to_string())
    }
}

impl From<String> for Constant {
    fn from(s: String) -> Self {
        Constant::Ascii(s)
    }
}

macro_rules! word_constant {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Constant {
                fn from(x: $t) -> Self {
                    Constant::Scalar(Value::from(x), LE_UWORD)
                }
            }
        )*
    };
}

word_constant!(u8, u16, u32, i32, u64, i64, usize);

impl From<f32> for Constant {
    fn from(x: f32) -> Self {
        Constant::Scalar(Value::from(x), LE_FLOAT)
    }
}

impl From<f64> for Constant {
    fn from(x: f64) -> Self {
        Constant::Scalar(Value::from(x), LE_DOUBLE)
    }
}

#[derive(Debug)]
struct Entry {
    label: String,
    constant: Constant,
    alignment: usize,
}

fn align_up(address: i128, alignment: usize) -> i128 {
    if alignment <= 1 {
        return address;
    }
    let alignment = alignment as i128;
    (address + alignment - 1).div_euclid(alignment) * alignment
}

/// Labelled constants laid out one after another from a base address, each
/// entry padded to its own alignment and then to the section's.
pub struct DataSection {
    base: RefCell<Deferred>,
    default_alignment: usize,
    entries: RefCell<Vec<Entry>>,
}

impl DataSection {
    pub fn new(default_alignment: usize, base: impl Into<Deferred>) -> DataSection {
        DataSection {
            base: RefCell::new(base.into()),
            default_alignment: default_alignment.max(1),
            entries: RefCell::new(Vec::new()),
        }
    }

    pub fn set_base(&self, base: impl Into<Deferred>) {
        *self.base.borrow_mut() = base.into();
    }

    pub fn base(&self) -> Deferred {
        self.base.borrow().clone()
    }

    pub fn default_alignment(&self) -> usize {
        self.default_alignment
    }

    pub fn insert(&self, label: &str, constant: impl Into<Constant>) {
        self.put(label, constant.into(), self.default_alignment);
    }

    pub fn insert_aligned(
        &self,
        label: &str,
        constant: impl Into<Constant>,
        alignment: usize,
    ) -> Result<()> {
        if alignment == 0 {
            return Err(Error::codec(format!("alignment of `{}` must not be 0", label)));
        }
        self.put(label, constant.into(), alignment);
        Ok(())
    }

    fn put(&self, label: &str, constant: Constant, alignment: usize) {
        let mut entries = self.entries.borrow_mut();
        let entry = Entry {
            label: label.to_string(),
            constant,
            alignment,
        };

        match entries.iter().position(|e| e.label == label) {
            Some(i) => entries[i] = entry,
            None => entries.push(entry),
        }
    }

    pub fn remove(&self, label: &str) -> Result<Constant> {
        let mut entries = self.entries.borrow_mut();
        let i = entries
            .iter()
            .position(|e| e.label == label)
            .ok_or_else(|| Error::UnknownLabel(label.to_string()))?;
        Ok(entries.remove(i).constant)
    }

    pub fn get(&self, label: &str) -> Option<Constant> {
        self.entries
            .borrow()
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.constant.clone())
    }

    fn position(&self, label: &str) -> Result<usize> {
        self.entries
            .borrow()
            .iter()
            .position(|e| e.label == label)
            .ok_or_else(|| Error::UnknownLabel(label.to_string()))
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries.borrow().iter().map(|e| e.label.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn packed_size(&self, label: &str) -> Result<usize> {
        let i = self.position(label)?;
        self.entries.borrow()[i].constant.packed_size()
    }

    /// Address of the entry at `position`: the base plus every earlier entry,
    /// each rounded up to its own alignment and then the section's.
    pub fn address_at(&self, position: usize) -> Result<i128> {
        let mut address = self.base().force_int()?;
        let entries = self.entries.borrow();

        for entry in entries.iter().take(position) {
            address += entry.constant.packed_size()? as i128;
            address = align_up(address, entry.alignment);
            address = align_up(address, self.default_alignment);
        }

        Ok(address)
    }

    /// The address of `label`, resolved when forced. The entry is looked up by
    /// label at that point, so later insertions and removals are seen.
    pub fn address_of(self: &Rc<Self>, label: &str) -> Result<Deferred> {
        self.position(label)?;
        let section: Weak<DataSection> = Rc::downgrade(self);
        let label = label.to_string();

        Ok(Deferred::lazy_int(move || {
            let section = section
                .upgrade()
                .ok_or_else(|| Error::Detached("data section".to_string()))?;
            let position = section.position(&label)?;
            section.address_at(position)
        }))
    }

    pub fn size(&self) -> Result<usize> {
        let end = self.address_at(self.len())?;
        let base = self.base().force_int()?;
        Ok((end - base) as usize)
    }

    pub fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        let base = self.base().force_int()?;
        let mut buffer = vec![0u8; self.size()?];
        let mut end = 0;

        for (i, entry) in self.entries.borrow().iter().enumerate() {
            let offset = (self.address_at(i)? - base) as usize;
            if offset < end {
                return Err(Error::Overlap(entry.label.clone()));
            }

            let bytes = entry.constant.packed()?;
            buffer[offset..offset + bytes.len()].copy_from_slice(&bytes);
            end = offset + bytes.len();
        }

        out.write_all(&buffer)?;
        Ok(())
    }
}
