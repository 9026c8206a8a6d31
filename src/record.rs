use crate::deferred::Deferred;
use crate::error::{Error, Result};
use crate::primitive::{PrimitiveType, TypeRegistry, Value};
use std::cell::RefCell;
use std::fmt;
use std::io::{self, Read, Write};
use std::rc::Rc;

pub type CountFn = Rc<dyn Fn(&RecordInstance) -> Result<usize>>;

#[derive(Clone)]
pub enum Repeat {
    Scalar,
    Fixed(usize),
    /// Resolved against the instance being read or sized; may look at fields
    /// declared earlier.
    Dynamic(CountFn),
}

#[derive(Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: PrimitiveType,
    pub repeat: Repeat,
}

impl FieldDescriptor {
    /// Number of elements, `None` for scalar fields.
    pub fn count(&self, instance: Option<&RecordInstance>) -> Result<Option<usize>> {
        match &self.repeat {
            Repeat::Scalar => Ok(None),
            Repeat::Fixed(n) => Ok(Some(*n)),
            Repeat::Dynamic(f) => {
                let instance = instance.ok_or_else(|| Error::UnresolvedCount(self.name.clone()))?;
                f(instance).map(Some)
            }
        }
    }

    pub fn size(&self, instance: Option<&RecordInstance>) -> Result<usize> {
        Ok(self.ty.width() * self.count(instance)?.unwrap_or(1))
    }

    fn read(&self, input: &mut dyn Read, count: Option<usize>) -> Result<Value> {
        let width = self.ty.width();
        let mut bytes = vec![0u8; width * count.unwrap_or(1)];
        input.read_exact(&mut bytes)?;

        match count {
            None => self.ty.decode(&bytes),
            Some(_) => bytes
                .chunks(width)
                .map(|chunk| self.ty.decode(chunk))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
        }
    }

    fn encode(&self, value: &Value, count: Option<usize>) -> Result<Vec<u8>> {
        let Some(count) = count else {
            return self.ty.encode(value);
        };

        let items = value.as_array().ok_or_else(|| {
            Error::codec(format!("field `{}` expects {} elements", self.name, count))
        })?;

        if items.len() != count {
            return Err(Error::codec(format!(
                "field `{}` expects {} elements, got {}",
                self.name,
                count,
                items.len()
            )));
        }

        let mut bytes = Vec::with_capacity(count * self.ty.width());
        for item in items {
            bytes.extend(self.ty.encode(item)?);
        }
        Ok(bytes)
    }
}

/// A named integer declared on a record type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumConstant {
    pub name: String,
    pub value: i128,
}

impl PartialEq<i128> for EnumConstant {
    fn eq(&self, other: &i128) -> bool {
        self.value == *other
    }
}

impl fmt::Display for EnumConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl From<&EnumConstant> for Deferred {
    fn from(c: &EnumConstant) -> Self {
        Deferred::concrete(c.value)
    }
}

pub enum EnumItem<'a> {
    Name(&'a str),
    /// Restarts numbering at the given value for the names that follow.
    Reset(i128),
}

pub struct RecordType {
    name: String,
    parent: Option<Rc<RecordType>>,
    fields: Vec<FieldDescriptor>,
    types: TypeRegistry,
    constants: Vec<EnumConstant>,
}

impl RecordType {
    pub fn builder(name: &str) -> RecordTypeBuilder {
        RecordTypeBuilder {
            name: name.to_string(),
            parent: None,
            fields: Vec::new(),
            types: TypeRegistry::with_builtins(),
            constants: Vec::new(),
            error: None,
        }
    }

    /// Starts a subtype: the parent's fields come first, in order, followed by
    /// the fields declared on the builder. Aliases and constants carry over.
    pub fn derive(name: &str, parent: &Rc<RecordType>) -> RecordTypeBuilder {
        RecordTypeBuilder {
            name: name.to_string(),
            parent: Some(parent.clone()),
            fields: parent.fields.clone(),
            types: parent.types.clone(),
            constants: parent.constants.clone(),
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn constant(&self, name: &str) -> Option<&EnumConstant> {
        self.constants.iter().find(|c| c.name == name)
    }

    /// Total size of the record. Fails if a field has a dynamic count; use
    /// `size_of` to resolve those against an instance.
    pub fn size(&self) -> Result<usize> {
        self.fields.iter().map(|f| f.size(None)).sum()
    }

    pub fn size_of(&self, instance: &RecordInstance) -> Result<usize> {
        self.fields.iter().map(|f| f.size(Some(instance))).sum()
    }

    pub fn field_offset(&self, name: &str) -> Result<usize> {
        let index = self
            .field_index(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        self.fields[..index].iter().map(|f| f.size(None)).sum()
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        f.debug_struct("RecordType")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("fields", &names)
            .finish()
    }
}

pub struct RecordTypeBuilder {
    name: String,
    parent: Option<Rc<RecordType>>,
    fields: Vec<FieldDescriptor>,
    types: TypeRegistry,
    constants: Vec<EnumConstant>,
    error: Option<Error>,
}

impl RecordTypeBuilder {
    fn fail(&mut self, e: Error) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    pub fn typedef(mut self, existing: &str, alias: &str) -> Self {
        if let Err(e) = self.types.typedef(existing, alias) {
            self.fail(e);
        }
        self
    }

    pub fn declare(mut self, name: &str, type_name: &str, repeat: Repeat) -> Self {
        let Some(ty) = self.types.get(type_name) else {
            self.fail(Error::UnknownType(type_name.to_string()));
            return self;
        };

        if self.fields.iter().any(|f| f.name == name) {
            self.fail(Error::DuplicateField(name.to_string()));
            return self;
        }

        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            ty,
            repeat,
        });
        self
    }

    pub fn field(self, name: &str, type_name: &str) -> Self {
        self.declare(name, type_name, Repeat::Scalar)
    }

    pub fn array(self, name: &str, type_name: &str, count: usize) -> Self {
        self.declare(name, type_name, Repeat::Fixed(count))
    }

    pub fn dynamic_array(
        self,
        name: &str,
        type_name: &str,
        count: impl Fn(&RecordInstance) -> Result<usize> + 'static,
    ) -> Self {
        self.declare(name, type_name, Repeat::Dynamic(Rc::new(count)))
    }

    fn push_constant(&mut self, name: &str, value: i128) {
        self.constants.retain(|c| c.name != name);
        self.constants.push(EnumConstant {
            name: name.to_string(),
            value,
        });
    }

    pub fn constant(mut self, name: &str, value: i128) -> Self {
        self.push_constant(name, value);
        self
    }

    pub fn enumeration(mut self, items: &[EnumItem]) -> Self {
        let mut next = 0;
        for item in items {
            match item {
                EnumItem::Name(name) => {
                    self.push_constant(name, next);
                    next += 1;
                }
                EnumItem::Reset(value) => next = *value,
            }
        }
        self
    }

    pub fn build(self) -> Result<Rc<RecordType>> {
        if let Some(e) = self.error {
            return Err(e);
        }

        Ok(Rc::new(RecordType {
            name: self.name,
            parent: self.parent,
            fields: self.fields,
            types: self.types,
            constants: self.constants,
        }))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Visit every field and report all failures together. Once a field has
    /// failed nothing more reaches the output.
    #[default]
    Collect,
    /// Stop at the first failing field.
    FailFast,
}

/// Field values for one record type.
#[derive(Clone)]
pub struct RecordInstance {
    ty: Rc<RecordType>,
    values: RefCell<Vec<Option<Deferred>>>,
}

impl RecordInstance {
    pub fn new(ty: &Rc<RecordType>) -> RecordInstance {
        RecordInstance {
            ty: ty.clone(),
            values: RefCell::new(vec![None; ty.fields.len()]),
        }
    }

    pub fn from_reader(ty: &Rc<RecordType>, input: &mut dyn Read) -> Result<RecordInstance> {
        let record = RecordInstance::new(ty);
        record.read_from(input)?;
        Ok(record)
    }

    pub fn record_type(&self) -> &Rc<RecordType> {
        &self.ty
    }

    fn index(&self, name: &str) -> Result<usize> {
        self.ty
            .field_index(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }

    pub fn set(&self, name: &str, value: impl Into<Deferred>) -> Result<()> {
        let index = self.index(name)?;
        self.values.borrow_mut()[index] = Some(value.into());
        Ok(())
    }

    pub fn set_all<I, K, V>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Deferred>,
    {
        for (name, value) in pairs {
            self.set(name.as_ref(), value)?;
        }
        Ok(())
    }

    pub fn is_set(&self, name: &str) -> bool {
        match self.index(name) {
            Ok(index) => self.values.borrow()[index].is_some(),
            Err(_) => false,
        }
    }

    /// The stored value of a field, without forcing it.
    pub fn deferred(&self, name: &str) -> Result<Deferred> {
        let index = self.index(name)?;
        self.deferred_at(index)
    }

    fn deferred_at(&self, index: usize) -> Result<Deferred> {
        // Cloned out so no borrow is held while a pending value runs.
        let value = self.values.borrow()[index].clone();
        value.ok_or_else(|| Error::UnsetField(self.ty.fields[index].name.clone()))
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        self.deferred(name)?.force()
    }

    pub fn get_int(&self, name: &str) -> Result<i128> {
        self.deferred(name)?.force_int()
    }

    /// A pending value that reads `name` from this record whenever forced.
    pub fn field(self: &Rc<Self>, name: &str) -> Result<Deferred> {
        self.index(name)?;
        let record = Rc::downgrade(self);
        let name = name.to_string();
        Ok(Deferred::lazy(move || {
            let record = record
                .upgrade()
                .ok_or_else(|| Error::Detached(format!("record (field `{}`)", name)))?;
            record.get(&name)
        }))
    }

    pub fn size(&self) -> Result<usize> {
        self.ty.size_of(self)
    }

    /// Overwrites every field, in declaration order, from `input`.
    pub fn read_from(&self, input: &mut dyn Read) -> Result<()> {
        for (index, field) in self.ty.fields.iter().enumerate() {
            let count = field.count(Some(self))?;
            let value = field.read(input, count)?;
            self.values.borrow_mut()[index] = Some(Deferred::Concrete(value));
        }
        Ok(())
    }

    fn field_bytes(&self, index: usize) -> Result<Vec<u8>> {
        let field = &self.ty.fields[index];
        let value = self.deferred_at(index)?.force()?;
        let count = field.count(Some(self))?;
        field.encode(&value, count)
    }

    pub fn write_to(&self, out: &mut dyn Write, mode: WriteMode) -> Result<()> {
        let mut sink = io::sink();
        let mut failures: Vec<(String, Error)> = Vec::new();

        for (index, field) in self.ty.fields.iter().enumerate() {
            let target: &mut dyn Write = if failures.is_empty() {
                &mut *out
            } else {
                &mut sink
            };

            let result = self
                .field_bytes(index)
                .and_then(|bytes| target.write_all(&bytes).map_err(Error::from));

            if let Err(e) = result {
                if mode == WriteMode::FailFast {
                    return Err(e);
                }
                failures.push((field.name.clone(), e));
            }
        }

        if failures.is_empty() {
            return Ok(());
        }

        Err(Error::AggregateWrite {
            record: self.ty.name.clone(),
            first: failures[0].0.clone(),
            failures,
        })
    }

    pub fn to_bytes(&self, mode: WriteMode) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes, mode)?;
        Ok(bytes)
    }
}

impl fmt::Debug for RecordInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(&self.ty.name);
        for (field, value) in self.ty.fields.iter().zip(self.values.borrow().iter()) {
            s.field(&field.name, value);
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Cursor;

    fn abcd() -> Rc<RecordType> {
        RecordType::builder("AS")
            .field("a", "uint32_t")
            .field("b", "uint32_t")
            .field("c", "uint16_t")
            .field("d", "uint16_t")
            .build()
            .unwrap()
    }

    #[test]
    fn size_is_the_sum_of_field_sizes() {
        let ty = RecordType::builder("Small")
            .field("a", "uint32_t")
            .field("b", "uint16_t")
            .field("c", "uint16_t")
            .build()
            .unwrap();

        assert_eq!(ty.size().unwrap(), 8);
        assert_eq!(ty.field_offset("c").unwrap(), 6);
        assert_eq!(RecordInstance::new(&ty).size().unwrap(), 8);
    }

    #[test]
    fn deferred_fields_read_their_siblings() {
        let h = Rc::new(RecordInstance::new(&abcd()));
        h.set("a", 2).unwrap();
        h.set("b", h.field("a").unwrap() + 60).unwrap();

        let weak = Rc::downgrade(&h);
        h.set(
            "c",
            Deferred::lazy_int(move || Ok(weak.upgrade().unwrap().get_int("b")? / 2)),
        )
        .unwrap();
        h.set("d", h.field("b").unwrap() * 4).unwrap();

        assert_eq!(h.get_int("a").unwrap(), 2);
        assert_eq!(h.get_int("b").unwrap(), 62);
        assert_eq!(h.get_int("c").unwrap(), 31);
        assert_eq!(h.get_int("d").unwrap(), 248);

        h.set("a", 10).unwrap();
        assert_eq!(h.get_int("d").unwrap(), 280);

        let bytes = h.to_bytes(WriteMode::Collect).unwrap();
        assert_eq!(bytes, vec![10, 0, 0, 0, 70, 0, 0, 0, 35, 0, 24, 1]);
    }

    #[test]
    fn read_then_write_reproduces_bytes() {
        let ty = RecordType::builder("Header")
            .array("ident", "uchar", 4)
            .field("kind", "int16_t")
            .field("ratio", "float")
            .field("addr", "be_udword")
            .build()
            .unwrap();

        let original: Vec<u8> = vec![
            0x7f, b'E', b'L', b'F', 0xfe, 0xff, 0x00, 0x00, 0xc0, 0x3f, 0, 0, 0, 0, 0, 1, 0, 0x42,
        ];
        let record = RecordInstance::from_reader(&ty, &mut Cursor::new(&original)).unwrap();

        assert_eq!(record.get_int("kind").unwrap(), -2);
        assert_eq!(record.get("ratio").unwrap(), Value::Float(1.5));
        assert_eq!(record.get_int("addr").unwrap(), 0x0001_0042);
        assert_eq!(record.to_bytes(WriteMode::FailFast).unwrap(), original);
    }

    #[test]
    fn reading_replaces_deferred_fields() {
        let record = RecordInstance::new(&abcd());
        record.set("a", Deferred::lazy_int(|| Ok(99))).unwrap();
        assert!(!record.deferred("a").unwrap().is_concrete());

        let bytes = vec![1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 4, 0];
        record.read_from(&mut Cursor::new(bytes)).unwrap();

        let a = record.deferred("a").unwrap();
        assert!(a.is_concrete());
        assert_eq!(a.force_int().unwrap(), 1);
        assert_eq!(record.get_int("d").unwrap(), 4);
    }

    #[test]
    fn dynamic_counts_use_fields_read_earlier() {
        let ty = RecordType::builder("Blob")
            .field("len", "uint8_t")
            .dynamic_array("data", "uint8_t", |r| Ok(r.get_int("len")? as usize))
            .field("tail", "uint8_t")
            .build()
            .unwrap();

        assert!(matches!(ty.size(), Err(Error::UnresolvedCount(_))));

        let record = RecordInstance::from_reader(&ty, &mut Cursor::new(vec![3, 7, 8, 9, 0xaa]))
            .unwrap();
        assert_eq!(record.get("data").unwrap(), Value::from(vec![7u8, 8, 9]));
        assert_eq!(record.get_int("tail").unwrap(), 0xaa);
        assert_eq!(record.size().unwrap(), 5);
    }

    #[test]
    fn subtypes_append_their_fields() {
        let base = RecordType::builder("Rel")
            .typedef("uint32_t", "Elf_Word")
            .field("r_offset", "Elf_Word")
            .field("r_info", "Elf_Word")
            .build()
            .unwrap();
        let derived = RecordType::derive("Rela", &base)
            .field("r_addend", "int32_t")
            .build()
            .unwrap();

        let names: Vec<&str> = derived.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["r_offset", "r_info", "r_addend"]);
        assert_eq!(base.fields().len(), 2);
        assert_eq!(derived.size().unwrap(), 12);
        assert_eq!(
            format!("{:?}", derived),
            r#"RecordType { name: "Rela", parent: Some("Rel"), fields: ["r_offset", "r_info", "r_addend"] }"#
        );
    }

    #[test]
    fn enumerations_count_like_c() {
        let ty = RecordType::builder("E")
            .enumeration(&[
                EnumItem::Name("A"),
                EnumItem::Name("B"),
                EnumItem::Reset(10),
                EnumItem::Name("C"),
                EnumItem::Name("D"),
            ])
            .build()
            .unwrap();

        assert_eq!(*ty.constant("A").unwrap(), 0);
        assert_eq!(*ty.constant("B").unwrap(), 1);
        assert_eq!(*ty.constant("C").unwrap(), 10);
        assert_eq!(*ty.constant("D").unwrap(), 11);
        assert!(ty.constant("E").is_none());
    }

    #[test]
    fn declaration_errors_surface_on_build() {
        let unknown = RecordType::builder("X").field("a", "uint24_t").build();
        assert!(matches!(unknown, Err(Error::UnknownType(_))));

        let duplicate = RecordType::builder("X")
            .field("a", "uint8_t")
            .field("a", "uint8_t")
            .build();
        assert!(matches!(duplicate, Err(Error::DuplicateField(_))));

        let record = RecordInstance::new(&abcd());
        assert!(matches!(record.set("zz", 1), Err(Error::UnknownField(_))));
        assert!(matches!(record.get("a"), Err(Error::UnsetField(_))));
    }

    #[test]
    fn collecting_writes_report_every_failure() {
        let ty = RecordType::builder("Three")
            .field("a", "uint8_t")
            .field("b", "uint8_t")
            .field("c", "uint8_t")
            .build()
            .unwrap();

        let record = RecordInstance::new(&ty);
        record.set_all([("a", 1), ("b", 300), ("c", 3)]).unwrap();

        let mut out = Vec::new();
        let err = record.write_to(&mut out, WriteMode::Collect).unwrap_err();

        assert_eq!(err.failed_fields(), ["b"]);
        assert!(matches!(&err, Error::AggregateWrite { first, .. } if first == "b"));
        // Only the bytes before the failure reach the output.
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn fail_fast_stops_at_the_first_failure() {
        let ty = abcd();
        let visited = Rc::new(Cell::new(0));

        let record = RecordInstance::new(&ty);
        record.set("a", 1).unwrap();
        // `b` is left unset.
        for name in ["c", "d"] {
            let v = visited.clone();
            record
                .set(
                    name,
                    Deferred::lazy_int(move || {
                        v.set(v.get() + 1);
                        Ok(0)
                    }),
                )
                .unwrap();
        }

        let err = record.to_bytes(WriteMode::FailFast).unwrap_err();
        assert!(matches!(err, Error::UnsetField(ref name) if name == "b"));
        assert_eq!(visited.get(), 0);

        let err = record.to_bytes(WriteMode::Collect).unwrap_err();
        assert_eq!(err.failed_fields(), ["b"]);
        assert_eq!(visited.get(), 2);
    }
}
