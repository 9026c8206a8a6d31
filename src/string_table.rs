use crate::deferred::Deferred;
use crate::error::{Error, Result};
use crate::layout::{Sizable, Writable};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::{Rc, Weak};

/// A table of NUL-terminated strings, addressed by byte offset. Adding the
/// same string twice yields the same offset.
#[derive(Debug, Default)]
pub struct StringTable {
    offsets: HashMap<Box<str>, u32>,
    bytes: Vec<u8>,
}

impl StringTable {
    pub fn new() -> StringTable {
        StringTable {
            offsets: HashMap::new(),
            bytes: Vec::new(),
        }
    }

    /// Wraps the raw bytes of a string table read from a file.
    pub fn from_bytes(bytes: Vec<u8>) -> StringTable {
        let mut offsets = HashMap::new();
        let mut start = 0;

        for chunk in bytes.split_inclusive(|&b| b == 0) {
            if let Ok(name) = std::str::from_utf8(chunk.strip_suffix(&[0]).unwrap_or(chunk)) {
                offsets.entry(name.into()).or_insert(start as u32);
            }
            start += chunk.len();
        }

        StringTable { offsets, bytes }
    }

    pub fn add(&mut self, name: &str) -> u32 {
        if let Some(offset) = self.offsets.get(name) {
            return *offset;
        }

        let offset = self.bytes.len() as u32;

        self.bytes.extend_from_slice(name.as_bytes());
        self.bytes.push(0);

        self.offsets.insert(name.into(), offset);

        offset
    }

    pub fn find(&self, name: &str) -> Option<u32> {
        self.offsets.get(name).copied()
    }

    /// The string starting at `offset`, up to the next NUL or the end of the
    /// table. Out of range offsets give `None`.
    pub fn get(&self, offset: usize) -> Option<String> {
        let tail = self.bytes.get(offset..)?;
        let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
        Some(String::from_utf8_lossy(&tail[..end]).into_owned())
    }

    /// The table bytes, zero padded to a multiple of four.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.bytes.clone();
        bytes.resize(self.padded_len(), 0);
        bytes
    }

    pub fn padded_len(&self) -> usize {
        (self.bytes.len() + 3) & !3
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Offset of `name` in the shared table, looked up when forced.
pub fn deferred_offset(table: &Rc<RefCell<StringTable>>, name: &str) -> Deferred {
    let table: Weak<RefCell<StringTable>> = Rc::downgrade(table);
    let name = name.to_string();

    Deferred::lazy_int(move || {
        let table = table
            .upgrade()
            .ok_or_else(|| Error::Detached("string table".to_string()))?;
        let offset = table.borrow().find(&name);
        offset
            .map(i128::from)
            .ok_or_else(|| Error::UnknownLabel(name.clone()))
    })
}

impl Sizable for RefCell<StringTable> {
    fn size(&self) -> Result<usize> {
        Ok(self.borrow().padded_len())
    }
}

impl Writable for RefCell<StringTable> {
    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        out.write_all(&self.borrow().to_bytes())?;
        Ok(())
    }

    fn as_sizable(&self) -> Option<&dyn Sizable> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_string_table_usage() {
        let mut table = StringTable::new();

        let null = table.add("");
        let data = table.add(".data");
        let text = table.add(".text");
        let again = table.add(".data");

        assert_eq!(null, 0);
        assert_eq!(data, 1);
        assert_eq!(text, 7);
        assert_eq!(data, again);

        assert_eq!(table.get(7).unwrap(), ".text");
        assert_eq!(table.get(3).unwrap(), "ata");
        assert_eq!(table.get(100), None);
        assert_eq!(table.find(".text"), Some(7));
        assert_eq!(table.find(".bss"), None);
    }

    #[test]
    fn bytes_are_padded_to_four() {
        let mut table = StringTable::new();
        table.add("");
        table.add(".shstrtab");

        assert_eq!(table.padded_len(), 12);
        assert_eq!(table.to_bytes(), b"\0.shstrtab\0\0".to_vec());
    }

    #[test]
    fn deferred_offsets_see_later_additions() {
        let table = Rc::new(RefCell::new(StringTable::new()));
        let offset = deferred_offset(&table, ".text");

        assert!(matches!(offset.force_int(), Err(Error::UnknownLabel(_))));

        table.borrow_mut().add("");
        table.borrow_mut().add(".text");
        assert_eq!(offset.force_int().unwrap(), 1);
    }

    #[test]
    fn loaded_tables_can_be_searched() {
        let mut table = StringTable::from_bytes(b"\0.text\0.data\0.text\0".to_vec());

        assert_eq!(table.find(""), Some(0));
        assert_eq!(table.find(".text"), Some(1));
        assert_eq!(table.find(".data"), Some(7));
        assert_eq!(table.find(".bss"), None);

        assert_eq!(table.add(".data"), 7);
        assert_eq!(table.add(".bss"), 19);
        assert_eq!(table.get(19).as_deref(), Some(".bss"));
    }

    #[test]
    fn unterminated_tail_is_read_to_the_end() {
        let table = StringTable::from_bytes(b"\0abc".to_vec());
        assert_eq!(table.get(1).unwrap(), "abc");
        assert_eq!(table.get(4).unwrap(), "");
    }
}
