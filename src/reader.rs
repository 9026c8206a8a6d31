use crate::elf::*;
use crate::error::Result;
use crate::record::{RecordInstance, RecordType};
use crate::sequence::RecordSequence;
use crate::string_table::StringTable;
use nohash_hasher::IntMap;
use serde::Serialize;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::rc::Rc;

#[derive(Debug)]
pub enum SectionData {
    Bytes(Vec<u8>),
    Symbols(RecordSequence),
    Rel(RecordSequence),
    Rela(RecordSequence),
    /// The section claims bytes beyond the end of the input.
    Invalid,
}

impl SectionData {
    pub fn is_valid(&self) -> bool {
        !matches!(self, SectionData::Invalid)
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            SectionData::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn records(&self) -> Option<&RecordSequence> {
        match self {
            SectionData::Symbols(s) | SectionData::Rel(s) | SectionData::Rela(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Section {
    pub index: usize,
    pub name: String,
    pub header: Rc<RecordInstance>,
    pub data: SectionData,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct SegmentSummary {
    pub p_type: u32,
    pub offset: u32,
    pub vaddr: u32,
    pub filesz: u32,
    pub flags: u32,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct SymbolSummary {
    pub name: String,
    pub value: u32,
    pub size: u32,
    pub bind: String,
    pub kind: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct SectionSummary {
    pub name: String,
    pub sh_type: u32,
    pub offset: u32,
    pub size: u32,
    pub valid: bool,
    pub symbols: Vec<SymbolSummary>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub e_type: u16,
    pub e_machine: u16,
    pub e_entry: u32,
    pub segments: Vec<SegmentSummary>,
    pub sections: Vec<SectionSummary>,
}

/// An ELF32 image read eagerly: the header, both header tables and the
/// contents of every named section.
pub struct ElfReader {
    types: ElfTypes,
    header: Rc<RecordInstance>,
    program_headers: RecordSequence,
    section_headers: RecordSequence,
    names: IntMap<usize, String>,
    sections: Vec<Section>,
}

fn read_table<R: Read + Seek>(
    input: &mut R,
    ty: &Rc<RecordType>,
    offset: i128,
    count: i128,
    length: u64,
) -> Result<RecordSequence> {
    let offset = offset as u64;
    let width = ty.size()? as u64;
    let count = (count as u64).min(length.saturating_sub(offset) / width);
    if count == 0 {
        return Ok(RecordSequence::new(ty));
    }
    input.seek(SeekFrom::Start(offset))?;
    RecordSequence::read_from(ty, input, count as usize)
}

fn read_extent<R: Read + Seek>(input: &mut R, offset: u64, size: u64, length: u64) -> SectionData {
    if offset.saturating_add(size) > length {
        return SectionData::Invalid;
    }

    let mut bytes = vec![0u8; size as usize];
    let result = input
        .seek(SeekFrom::Start(offset))
        .and_then(|_| input.read_exact(&mut bytes));

    match result {
        Ok(()) => SectionData::Bytes(bytes),
        Err(_) => SectionData::Invalid,
    }
}

fn as_records(bytes: Vec<u8>, ty: &Rc<RecordType>) -> Option<RecordSequence> {
    let width = ty.size().ok()?;
    let count = bytes.len() / width;
    RecordSequence::read_from(ty, &mut Cursor::new(bytes), count).ok()
}

impl ElfReader {
    pub fn parse<R: Read + Seek>(input: &mut R) -> Result<ElfReader> {
        let types = ElfTypes::new()?;
        let length = input.seek(SeekFrom::End(0))?;

        input.seek(SeekFrom::Start(0))?;
        let header = Rc::new(RecordInstance::from_reader(&types.header, input)?);

        let program_headers = read_table(
            input,
            &types.program_header,
            header.get_int("e_phoff")?,
            header.get_int("e_phnum")?,
            length,
        )?;
        let section_headers = read_table(
            input,
            &types.section_header,
            header.get_int("e_shoff")?,
            header.get_int("e_shnum")?,
            length,
        )?;

        let mut reader = ElfReader {
            types,
            header,
            program_headers,
            section_headers,
            names: IntMap::default(),
            sections: Vec::new(),
        };

        let Some(strtab) = reader.string_table(input, length)? else {
            return Ok(reader);
        };

        let mut names = IntMap::default();
        let mut sections = Vec::new();

        for (index, (_, sh)) in reader.section_headers.iter().enumerate() {
            if sh.get_int("sh_type")? == SHT_NULL as i128 {
                continue;
            }

            let name = strtab
                .get(sh.get_int("sh_name")? as usize)
                .unwrap_or_default();

            let offset = sh.get_int("sh_offset")? as u64;
            let size = sh.get_int("sh_size")? as u64;
            let data = match read_extent(input, offset, size, length) {
                SectionData::Bytes(bytes) => reader.reinterpret(sh, bytes)?,
                data => data,
            };

            names.insert(index, name.clone());
            sections.push(Section {
                index,
                name,
                header: sh.clone(),
                data,
            });
        }

        reader.names = names;
        reader.sections = sections;
        Ok(reader)
    }

    /// The section name table, when `e_shstrndx` names a string table whose
    /// bytes are all present.
    fn string_table<R: Read + Seek>(&self, input: &mut R, length: u64) -> Result<Option<StringTable>> {
        let index = self.header.get_int("e_shstrndx")? as usize;
        let Some(sh) = self.section_headers.get_index(index) else {
            return Ok(None);
        };
        if sh.get_int("sh_type")? != SHT_STRTAB as i128 {
            return Ok(None);
        }

        let offset = sh.get_int("sh_offset")? as u64;
        let size = sh.get_int("sh_size")? as u64;
        Ok(match read_extent(input, offset, size, length) {
            SectionData::Bytes(bytes) => Some(StringTable::from_bytes(bytes)),
            _ => None,
        })
    }

    fn reinterpret(&self, sh: &RecordInstance, bytes: Vec<u8>) -> Result<SectionData> {
        let sh_type = sh.get_int("sh_type")? as u32;
        let (ty, wrap): (_, fn(RecordSequence) -> SectionData) = match sh_type {
            SHT_SYMTAB => (&self.types.symbol, SectionData::Symbols),
            SHT_REL => (&self.types.rel, SectionData::Rel),
            SHT_RELA => (&self.types.rela, SectionData::Rela),
            _ => return Ok(SectionData::Bytes(bytes)),
        };

        Ok(as_records(bytes, ty).map(wrap).unwrap_or(SectionData::Invalid))
    }

    pub fn header(&self) -> &Rc<RecordInstance> {
        &self.header
    }

    pub fn program_headers(&self) -> &RecordSequence {
        &self.program_headers
    }

    pub fn section_headers(&self) -> &RecordSequence {
        &self.section_headers
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(&index).map(|n| n.as_str())
    }

    fn symbol_name(&self, symtab: &Section, symbol: &RecordInstance) -> Result<String> {
        let link = symtab.header.get_int("sh_link")? as usize;
        let Some(strtab) = self.sections.iter().find(|s| s.index == link) else {
            return Ok(String::new());
        };
        let Some(bytes) = strtab.data.bytes() else {
            return Ok(String::new());
        };

        let offset = symbol.get_int("st_name")? as usize;
        Ok(StringTable::from_bytes(bytes.to_vec())
            .get(offset)
            .unwrap_or_default())
    }

    pub fn summary(&self) -> Result<Summary> {
        let mut segments = Vec::with_capacity(self.program_headers.len());
        for (_, ph) in self.program_headers.iter() {
            segments.push(SegmentSummary {
                p_type: ph.get_int("p_type")? as u32,
                offset: ph.get_int("p_offset")? as u32,
                vaddr: ph.get_int("p_vaddr")? as u32,
                filesz: ph.get_int("p_filesz")? as u32,
                flags: ph.get_int("p_flags")? as u32,
            });
        }

        let mut sections = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            let mut symbols = Vec::new();
            if let SectionData::Symbols(table) = &section.data {
                for (_, symbol) in table.iter() {
                    symbols.push(SymbolSummary {
                        name: self.symbol_name(section, symbol)?,
                        value: symbol.get_int("st_value")? as u32,
                        size: symbol.get_int("st_size")? as u32,
                        bind: describe(st_bind(symbol)?, bind_name),
                        kind: describe(st_type(symbol)?, symbol_type_name),
                    });
                }
            }

            sections.push(SectionSummary {
                name: section.name.clone(),
                sh_type: section.header.get_int("sh_type")? as u32,
                offset: section.header.get_int("sh_offset")? as u32,
                size: section.header.get_int("sh_size")? as u32,
                valid: section.data.is_valid(),
                symbols,
            });
        }

        Ok(Summary {
            e_type: self.header.get_int("e_type")? as u16,
            e_machine: self.header.get_int("e_machine")? as u16,
            e_entry: self.header.get_int("e_entry")? as u32,
            segments,
            sections,
        })
    }
}

fn describe(value: i128, name: fn(i128) -> Option<&'static str>) -> String {
    match name(value) {
        Some(name) => name.to_string(),
        None => value.to_string(),
    }
}

/// Reads only the 64-byte header of an ELF64 image.
pub fn read_elf64_header(input: &mut dyn Read) -> Result<RecordInstance> {
    let types = ElfTypes::new()?;
    RecordInstance::from_reader(&types.header64, input)
}
