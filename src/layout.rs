use crate::data_section::DataSection;
use crate::deferred::Deferred;
use crate::error::{Error, Result};
use crate::record::{RecordInstance, WriteMode};
use crate::sequence::RecordSequence;
use serde::Serialize;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::{Rc, Weak};

pub trait Sizable {
    fn size(&self) -> Result<usize>;
}

pub trait Writable {
    fn write_to(&self, out: &mut dyn Write) -> Result<()>;

    /// The size capability of this part, if it has one.
    fn as_sizable(&self) -> Option<&dyn Sizable> {
        None
    }
}

/// Placeholder for a declared part that has not been filled yet.
pub struct Empty;

impl Sizable for Empty {
    fn size(&self) -> Result<usize> {
        Ok(0)
    }
}

impl Writable for Empty {
    fn write_to(&self, _out: &mut dyn Write) -> Result<()> {
        Ok(())
    }

    fn as_sizable(&self) -> Option<&dyn Sizable> {
        Some(self)
    }
}

impl Sizable for RefCell<Vec<u8>> {
    fn size(&self) -> Result<usize> {
        Ok(self.borrow().len())
    }
}

impl Writable for RefCell<Vec<u8>> {
    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        out.write_all(&self.borrow())?;
        Ok(())
    }

    fn as_sizable(&self) -> Option<&dyn Sizable> {
        Some(self)
    }
}

impl Sizable for RecordInstance {
    fn size(&self) -> Result<usize> {
        RecordInstance::size(self)
    }
}

impl Writable for RecordInstance {
    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        RecordInstance::write_to(self, out, WriteMode::Collect)
    }

    fn as_sizable(&self) -> Option<&dyn Sizable> {
        Some(self)
    }
}

impl Sizable for RefCell<RecordSequence> {
    fn size(&self) -> Result<usize> {
        self.borrow().size()
    }
}

impl Writable for RefCell<RecordSequence> {
    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        self.borrow().write_to(out, WriteMode::Collect)
    }

    fn as_sizable(&self) -> Option<&dyn Sizable> {
        Some(self)
    }
}

impl Sizable for DataSection {
    fn size(&self) -> Result<usize> {
        DataSection::size(self)
    }
}

impl Writable for DataSection {
    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        DataSection::write_to(self, out)
    }

    fn as_sizable(&self) -> Option<&dyn Sizable> {
        Some(self)
    }
}

struct CountingWriter<'a> {
    inner: &'a mut dyn Write,
    written: usize,
}

impl Write for CountingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Clone)]
struct Slot {
    name: String,
    part: Rc<dyn Writable>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PartInfo {
    pub name: String,
    pub offset: u64,
    pub size: Option<u64>,
}

/// An ordered list of named parts laid out back to back from `base`. The
/// names and their order are fixed when the layout is created; the content of
/// each slot may be replaced until the layout is written.
pub struct Layout {
    base: i128,
    slots: RefCell<Vec<Slot>>,
}

impl Layout {
    pub fn new(base: i128, names: &[&str]) -> Result<Rc<Layout>> {
        let mut slots: Vec<Slot> = Vec::with_capacity(names.len());

        for name in names {
            if slots.iter().any(|s| s.name == *name) {
                return Err(Error::DuplicatePart(name.to_string()));
            }
            slots.push(Slot {
                name: name.to_string(),
                part: Rc::new(Empty),
            });
        }

        Ok(Rc::new(Layout {
            base,
            slots: RefCell::new(slots),
        }))
    }

    pub fn base(&self) -> i128 {
        self.base
    }

    pub fn names(&self) -> Vec<String> {
        self.slots.borrow().iter().map(|s| s.name.clone()).collect()
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.slots
            .borrow()
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| Error::UnknownPart(name.to_string()))
    }

    pub fn set_part(&self, name: &str, part: Rc<dyn Writable>) -> Result<()> {
        let i = self.position(name)?;
        self.slots.borrow_mut()[i].part = part;
        Ok(())
    }

    pub fn part(&self, name: &str) -> Result<Rc<dyn Writable>> {
        let i = self.position(name)?;
        Ok(self.slots.borrow()[i].part.clone())
    }

    fn size_at(&self, i: usize) -> Result<usize> {
        // The slot is cloned out so sizing may consult the layout again.
        let slot = self.slots.borrow()[i].clone();
        match slot.part.as_sizable() {
            Some(part) => part.size(),
            None => Err(Error::UnsizablePart(slot.name)),
        }
    }

    pub fn size_of(&self, name: &str) -> Result<usize> {
        self.size_at(self.position(name)?)
    }

    /// `base` plus the sizes of every part strictly before `name`. Never looks
    /// at `name` itself or anything after it.
    pub fn offset_at(&self, name: &str) -> Result<i128> {
        let i = self.position(name)?;
        let mut offset = self.base;
        for j in 0..i {
            offset += self.size_at(j)? as i128;
        }
        Ok(offset)
    }

    pub fn total_size(&self) -> Result<usize> {
        let count = self.slots.borrow().len();
        (0..count).map(|i| self.size_at(i)).sum()
    }

    fn lazy(
        self: &Rc<Self>,
        name: &str,
        f: impl Fn(&Layout, &str) -> Result<i128> + 'static,
    ) -> Result<Deferred> {
        self.position(name)?;
        let layout: Weak<Layout> = Rc::downgrade(self);
        let name = name.to_string();

        Ok(Deferred::lazy_int(move || {
            let layout = layout
                .upgrade()
                .ok_or_else(|| Error::Detached("layout".to_string()))?;
            f(&*layout, name.as_str())
        }))
    }

    pub fn offset_of(self: &Rc<Self>, name: &str) -> Result<Deferred> {
        self.lazy(name, |layout, name| layout.offset_at(name))
    }

    pub fn deferred_size(self: &Rc<Self>, name: &str) -> Result<Deferred> {
        self.lazy(name, |layout, name| Ok(layout.size_of(name)? as i128))
    }

    /// Offset of the first byte after `name`.
    pub fn end_of(self: &Rc<Self>, name: &str) -> Result<Deferred> {
        self.lazy(name, |layout, name| {
            Ok(layout.offset_at(name)? + layout.size_of(name)? as i128)
        })
    }

    /// Writes every part in order. Sizable parts must write exactly the number
    /// of bytes they report.
    pub fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        let slots = self.slots.borrow().clone();

        for (i, slot) in slots.iter().enumerate() {
            let expected = match slot.part.as_sizable() {
                Some(_) => Some(self.size_at(i)?),
                None => None,
            };

            let mut counter = CountingWriter {
                inner: &mut *out,
                written: 0,
            };
            slot.part.write_to(&mut counter)?;

            if let Some(expected) = expected {
                if counter.written != expected {
                    return Err(Error::SizeMismatch {
                        part: slot.name.clone(),
                        expected,
                        written: counter.written,
                    });
                }
            }
        }

        Ok(())
    }

    pub fn describe(&self) -> Result<Vec<PartInfo>> {
        let count = self.slots.borrow().len();
        let mut offset = self.base;
        let mut rows = Vec::with_capacity(count);

        for i in 0..count {
            let name = self.slots.borrow()[i].name.clone();
            let size = match self.size_at(i) {
                Ok(size) => Some(size),
                Err(Error::UnsizablePart(_)) => None,
                Err(e) => return Err(e),
            };

            rows.push(PartInfo {
                name,
                offset: offset as u64,
                size: size.map(|s| s as u64),
            });

            // Nothing after an unsizable part has a known offset.
            let Some(size) = size else { break };
            offset += size as i128;
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(b: &[u8]) -> Rc<RefCell<Vec<u8>>> {
        Rc::new(RefCell::new(b.to_vec()))
    }

    struct Opaque;

    impl Writable for Opaque {
        fn write_to(&self, out: &mut dyn Write) -> Result<()> {
            out.write_all(b"??")?;
            Ok(())
        }
    }

    struct Liar;

    impl Sizable for Liar {
        fn size(&self) -> Result<usize> {
            Ok(4)
        }
    }

    impl Writable for Liar {
        fn write_to(&self, out: &mut dyn Write) -> Result<()> {
            out.write_all(b"abc")?;
            Ok(())
        }

        fn as_sizable(&self) -> Option<&dyn Sizable> {
            Some(self)
        }
    }

    #[test]
    fn offsets_fold_over_preceding_parts() {
        let layout = Layout::new(0x40, &["a", "b", "c"]).unwrap();
        layout.set_part("a", bytes(b"12345")).unwrap();
        layout.set_part("b", bytes(b"xy")).unwrap();
        layout.set_part("c", bytes(b"z")).unwrap();

        assert_eq!(layout.offset_at("a").unwrap(), 0x40);
        for (prev, next) in [("a", "b"), ("b", "c")] {
            assert_eq!(
                layout.offset_at(next).unwrap(),
                layout.offset_at(prev).unwrap() + layout.size_of(prev).unwrap() as i128
            );
        }
        assert_eq!(layout.total_size().unwrap(), 8);

        let mut out = Vec::new();
        layout.write_to(&mut out).unwrap();
        assert_eq!(out, b"12345xyz".to_vec());
    }

    #[test]
    fn pending_offsets_see_later_content() {
        let layout = Layout::new(0, &["head", "body", "tail"]).unwrap();
        let tail = layout.offset_of("tail").unwrap();
        let body_end = layout.end_of("body").unwrap();

        assert_eq!(tail.force_int().unwrap(), 0);

        layout.set_part("head", bytes(&[0; 52])).unwrap();
        layout.set_part("body", bytes(&[0; 12])).unwrap();
        assert_eq!(tail.force_int().unwrap(), 64);
        assert_eq!(body_end.force_int().unwrap(), 64);
    }

    #[test]
    fn parts_without_a_size_cannot_be_skipped() {
        let layout = Layout::new(0, &["opaque", "after"]).unwrap();
        layout.set_part("opaque", Rc::new(Opaque)).unwrap();

        assert_eq!(layout.offset_at("opaque").unwrap(), 0);
        assert!(matches!(layout.offset_at("after"), Err(Error::UnsizablePart(n)) if n == "opaque"));

        let rows = layout.describe().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].size, None);

        let mut out = Vec::new();
        layout.write_to(&mut out).unwrap();
        assert_eq!(out, b"??".to_vec());
    }

    #[test]
    fn declared_sizes_are_checked_on_write() {
        let layout = Layout::new(0, &["liar"]).unwrap();
        layout.set_part("liar", Rc::new(Liar)).unwrap();

        let err = layout.write_to(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { expected: 4, written: 3, .. }));
    }

    #[test]
    fn part_names_are_fixed() {
        assert!(matches!(
            Layout::new(0, &["a", "a"]),
            Err(Error::DuplicatePart(_))
        ));

        let layout = Layout::new(0, &["a"]).unwrap();
        assert!(matches!(
            layout.set_part("b", bytes(b"")),
            Err(Error::UnknownPart(_))
        ));
        assert!(layout.offset_of("b").is_err());
    }
}
