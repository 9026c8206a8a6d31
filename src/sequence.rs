use crate::error::{Error, Result};
use crate::record::{RecordInstance, RecordType, WriteMode};
use std::io::{Read, Write};
use std::rc::Rc;

/// Labelled records of a single record type, kept in insertion order.
#[derive(Debug)]
pub struct RecordSequence {
    ty: Rc<RecordType>,
    entries: Vec<(String, Rc<RecordInstance>)>,
}

impl RecordSequence {
    pub fn new(ty: &Rc<RecordType>) -> RecordSequence {
        RecordSequence {
            ty: ty.clone(),
            entries: Vec::new(),
        }
    }

    /// Reads `count` consecutive records, labelled by their index.
    pub fn read_from(ty: &Rc<RecordType>, input: &mut dyn Read, count: usize) -> Result<Self> {
        let mut sequence = RecordSequence::new(ty);
        for i in 0..count {
            let record = RecordInstance::from_reader(ty, input)?;
            sequence.insert(&i.to_string(), Rc::new(record))?;
        }
        Ok(sequence)
    }

    pub fn record_type(&self) -> &Rc<RecordType> {
        &self.ty
    }

    /// Appends `record`, or replaces the record already stored under `label`.
    /// Records of another type are rejected and the sequence is left as is.
    pub fn insert(&mut self, label: &str, record: Rc<RecordInstance>) -> Result<()> {
        if !Rc::ptr_eq(record.record_type(), &self.ty) {
            return Err(Error::TypeMismatch {
                expected: self.ty.name().to_string(),
                found: record.record_type().name().to_string(),
            });
        }

        match self.index_of(label) {
            Some(i) => self.entries[i].1 = record,
            None => self.entries.push((label.to_string(), record)),
        }
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Rc<RecordInstance>> {
        self.index_of(label).map(|i| &self.entries[i].1)
    }

    pub fn get_index(&self, index: usize) -> Option<&Rc<RecordInstance>> {
        self.entries.get(index).map(|(_, record)| record)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.entries.iter().position(|(l, _)| l == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rc<RecordInstance>)> {
        self.entries
            .iter()
            .map(|(label, record)| (label.as_str(), record))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size(&self) -> Result<usize> {
        Ok(self.ty.size()? * self.entries.len())
    }

    pub fn write_to(&self, out: &mut dyn Write, mode: WriteMode) -> Result<()> {
        for (_, record) in &self.entries {
            record.write_to(out, mode)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_type(name: &str) -> Rc<RecordType> {
        RecordType::builder(name)
            .field("x", "uint16_t")
            .field("y", "uint16_t")
            .build()
            .unwrap()
    }

    fn pair(ty: &Rc<RecordType>, x: u16, y: u16) -> Rc<RecordInstance> {
        let record = RecordInstance::new(ty);
        record.set_all([("x", x), ("y", y)]).unwrap();
        Rc::new(record)
    }

    #[test]
    fn members_are_written_in_insertion_order() {
        let ty = pair_type("Pair");
        let mut sequence = RecordSequence::new(&ty);
        sequence.insert("second", pair(&ty, 3, 4)).unwrap();
        sequence.insert("first", pair(&ty, 1, 2)).unwrap();

        assert_eq!(sequence.size().unwrap(), 8);
        assert_eq!(sequence.index_of("first"), Some(1));

        let mut out = Vec::new();
        sequence.write_to(&mut out, WriteMode::Collect).unwrap();
        assert_eq!(out, vec![3, 0, 4, 0, 1, 0, 2, 0]);
    }

    #[test]
    fn reinserting_a_label_replaces_in_place() {
        let ty = pair_type("Pair");
        let mut sequence = RecordSequence::new(&ty);
        sequence.insert("a", pair(&ty, 1, 1)).unwrap();
        sequence.insert("b", pair(&ty, 2, 2)).unwrap();
        sequence.insert("a", pair(&ty, 9, 9)).unwrap();

        assert_eq!(sequence.labels().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(sequence.get("a").unwrap().get_int("x").unwrap(), 9);
    }

    #[test]
    fn mismatched_records_are_rejected() {
        let ty = pair_type("Pair");
        let lookalike = pair_type("Other");
        let mut sequence = RecordSequence::new(&ty);
        sequence.insert("a", pair(&ty, 1, 1)).unwrap();

        let err = sequence.insert("b", pair(&lookalike, 2, 2)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(sequence.len(), 1);
        assert!(sequence.get("b").is_none());
    }
}
