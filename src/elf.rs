//! Record types for the ELF structures this crate reads and writes.

use crate::error::Result;
use crate::record::{EnumItem, RecordInstance, RecordType};
use std::rc::Rc;

pub const EI_NIDENT: usize = 16;

pub const ELFCLASS32: u8 = 1;
pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;
pub const EV_CURRENT: u8 = 1;

pub const ET_EXEC: u16 = 2;
pub const EM_ARM: u16 = 40;

/// EABI version 5, hard-float calling convention, executable entry point set.
pub const EF_ARM_DEFAULT: u32 = 0x0500_0202;

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_RELA: u32 = 4;
pub const SHT_REL: u32 = 9;

pub const SHF_WRITE: u32 = 1;
pub const SHF_ALLOC: u32 = 2;
pub const SHF_EXECINSTR: u32 = 4;

#[rustfmt::skip]
const SECTION_TYPES: [(&str, i128); 35] = [
    ("SHT_NULL",           0),
    ("SHT_PROGBITS",       1),
    ("SHT_SYMTAB",         2),
    ("SHT_STRTAB",         3),
    ("SHT_RELA",           4),
    ("SHT_HASH",           5),
    ("SHT_DYNAMIC",        6),
    ("SHT_NOTE",           7),
    ("SHT_NOBITS",         8),
    ("SHT_REL",            9),
    ("SHT_SHLIB",          10),
    ("SHT_DYNSYM",         11),
    ("SHT_INIT_ARRAY",     14),
    ("SHT_FINI_ARRAY",     15),
    ("SHT_PREINIT_ARRAY",  16),
    ("SHT_GROUP",          17),
    ("SHT_SYMTAB_SHNDX",   18),
    ("SHT_NUM",            19),
    ("SHT_LOOS",           0x6000_0000),
    ("SHT_GNU_ATTRIBUTES", 0x6fff_fff5),
    ("SHT_GNU_HASH",       0x6fff_fff6),
    ("SHT_GNU_LIBLIST",    0x6fff_fff7),
    ("SHT_CHECKSUM",       0x6fff_fff8),
    ("SHT_LOSUNW",         0x6fff_fffa),
    ("SHT_SUNW_move",      0x6fff_fffa),
    ("SHT_SUNW_COMDAT",    0x6fff_fffb),
    ("SHT_SUNW_syminfo",   0x6fff_fffc),
    ("SHT_GNU_verdef",     0x6fff_fffd),
    ("SHT_GNU_verneed",    0x6fff_fffe),
    ("SHT_GNU_versym",     0x6fff_ffff),
    ("SHT_HISUNW",         0x6fff_ffff),
    ("SHT_HIOS",           0x6fff_ffff),
    ("SHT_LOPROC",         0x7000_0000),
    ("SHT_HIPROC",         0x7fff_ffff),
    ("SHT_LOUSER",         0x8000_0000),
];

#[rustfmt::skip]
const SECTION_FLAGS: [(&str, i128); 4] = [
    ("SHF_WRITE",     1),
    ("SHF_ALLOC",     2),
    ("SHF_EXECINSTR", 4),
    ("SHF_MASKPROC",  0xf000_0000),
];

const SYMBOL_BINDS: [(i128, &str); 5] = [
    (0, "STB_LOCAL"),
    (1, "STB_GLOBAL"),
    (2, "STB_WEAK"),
    (13, "STB_LOPROC"),
    (15, "STB_HIPROC"),
];

const SYMBOL_TYPES: [(i128, &str); 7] = [
    (0, "STT_NOTYPE"),
    (1, "STT_OBJECT"),
    (2, "STT_FUNC"),
    (3, "STT_SECTION"),
    (4, "STT_FILE"),
    (13, "STT_LOPROC"),
    (15, "STT_HIPROC"),
];

/// The ELF record types, built once and shared.
pub struct ElfTypes {
    pub elf32: Rc<RecordType>,
    pub header: Rc<RecordType>,
    pub program_header: Rc<RecordType>,
    pub section_header: Rc<RecordType>,
    pub symbol: Rc<RecordType>,
    pub rel: Rc<RecordType>,
    pub rela: Rc<RecordType>,
    pub header64: Rc<RecordType>,
}

impl ElfTypes {
    pub fn new() -> Result<ElfTypes> {
        let elf32 = RecordType::builder("Elf32")
            .typedef("uint16_t", "Elf_Half")
            .typedef("uint32_t", "Elf_Word")
            .typedef("int32_t", "Elf_Sword")
            .typedef("uint32_t", "Elf_Addr")
            .typedef("uint32_t", "Elf_Off")
            .build()?;

        let header = RecordType::derive("Elf32_Ehdr", &elf32)
            .array("e_ident", "uchar", EI_NIDENT)
            .field("e_type", "Elf_Half")
            .field("e_machine", "Elf_Half")
            .field("e_version", "Elf_Word")
            .field("e_entry", "Elf_Addr")
            .field("e_phoff", "Elf_Off")
            .field("e_shoff", "Elf_Off")
            .field("e_flags", "Elf_Word")
            .field("e_ehsize", "Elf_Half")
            .field("e_phentsize", "Elf_Half")
            .field("e_phnum", "Elf_Half")
            .field("e_shentsize", "Elf_Half")
            .field("e_shnum", "Elf_Half")
            .field("e_shstrndx", "Elf_Half")
            .build()?;

        let program_header = RecordType::derive("Elf32_Phdr", &elf32)
            .enumeration(&[
                EnumItem::Name("PT_NULL"),
                EnumItem::Name("PT_LOAD"),
                EnumItem::Name("PT_DYNAMIC"),
                EnumItem::Name("PT_INTERP"),
                EnumItem::Name("PT_NOTE"),
                EnumItem::Name("PT_SHLIB"),
                EnumItem::Name("PT_PHDR"),
                EnumItem::Name("PT_TLS"),
                EnumItem::Reset(0x6474_e550),
                EnumItem::Name("PT_GNU_EH_FRAME"),
                EnumItem::Name("PT_GNU_STACK"),
                EnumItem::Name("PT_GNU_RELRO"),
            ])
            .field("p_type", "Elf_Word")
            .field("p_offset", "Elf_Off")
            .field("p_vaddr", "Elf_Addr")
            .field("p_paddr", "Elf_Addr")
            .field("p_filesz", "Elf_Word")
            .field("p_memsz", "Elf_Word")
            .field("p_flags", "Elf_Word")
            .field("p_align", "Elf_Word")
            .build()?;

        let mut section_header = RecordType::derive("Elf32_Shdr", &elf32);
        for (name, value) in SECTION_TYPES.iter().chain(SECTION_FLAGS.iter()) {
            section_header = section_header.constant(name, *value);
        }
        let section_header = section_header
            .field("sh_name", "Elf_Word")
            .field("sh_type", "Elf_Word")
            .field("sh_flags", "Elf_Word")
            .field("sh_addr", "Elf_Addr")
            .field("sh_offset", "Elf_Off")
            .field("sh_size", "Elf_Word")
            .field("sh_link", "Elf_Word")
            .field("sh_info", "Elf_Word")
            .field("sh_addralign", "Elf_Word")
            .field("sh_entsize", "Elf_Word")
            .build()?;

        let symbol = RecordType::derive("Elf32_Sym", &elf32)
            .field("st_name", "Elf_Word")
            .field("st_value", "Elf_Addr")
            .field("st_size", "Elf_Word")
            .field("st_info", "uchar")
            .field("st_other", "uchar")
            .field("st_shndx", "Elf_Half")
            .build()?;

        let rel = RecordType::derive("Elf32_Rel", &elf32)
            .field("r_offset", "Elf_Addr")
            .field("r_info", "Elf_Word")
            .build()?;

        let rela = RecordType::derive("Elf32_Rela", &rel)
            .field("r_addend", "Elf_Sword")
            .build()?;

        let header64 = RecordType::builder("Elf64_Ehdr")
            .typedef("uint16_t", "Elf64_Half")
            .typedef("uint32_t", "Elf64_Word")
            .typedef("uint64_t", "Elf64_Addr")
            .typedef("uint64_t", "Elf64_Off")
            .array("e_ident", "uchar", EI_NIDENT)
            .field("e_type", "Elf64_Half")
            .field("e_machine", "Elf64_Half")
            .field("e_version", "Elf64_Word")
            .field("e_entry", "Elf64_Addr")
            .field("e_phoff", "Elf64_Off")
            .field("e_shoff", "Elf64_Off")
            .field("e_flags", "Elf64_Word")
            .field("e_ehsize", "Elf64_Half")
            .field("e_phentsize", "Elf64_Half")
            .field("e_phnum", "Elf64_Half")
            .field("e_shentsize", "Elf64_Half")
            .field("e_shnum", "Elf64_Half")
            .field("e_shstrndx", "Elf64_Half")
            .build()?;

        Ok(ElfTypes {
            elf32,
            header,
            program_header,
            section_header,
            symbol,
            rel,
            rela,
            header64,
        })
    }
}

/// The identification bytes of a little-endian ELF file of the given class.
pub fn ident(class: u8) -> Vec<u8> {
    let mut ident = vec![0u8; EI_NIDENT];
    ident[..4].copy_from_slice(b"\x7fELF");
    ident[4] = class;
    ident[5] = ELFDATA2LSB;
    ident[6] = EV_CURRENT;
    ident
}

pub fn st_bind(symbol: &RecordInstance) -> Result<i128> {
    Ok(symbol.get_int("st_info")? >> 4)
}

pub fn st_type(symbol: &RecordInstance) -> Result<i128> {
    Ok(symbol.get_int("st_info")? & 0xf)
}

pub fn bind_name(bind: i128) -> Option<&'static str> {
    SYMBOL_BINDS
        .iter()
        .find(|(value, _)| *value == bind)
        .map(|(_, name)| *name)
}

pub fn symbol_type_name(ty: i128) -> Option<&'static str> {
    SYMBOL_TYPES
        .iter()
        .find(|(value, _)| *value == ty)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_match_the_elf_abi() {
        let types = ElfTypes::new().unwrap();
        assert_eq!(types.header.size().unwrap(), 52);
        assert_eq!(types.program_header.size().unwrap(), 32);
        assert_eq!(types.section_header.size().unwrap(), 40);
        assert_eq!(types.symbol.size().unwrap(), 16);
        assert_eq!(types.rel.size().unwrap(), 8);
        assert_eq!(types.rela.size().unwrap(), 12);
        assert_eq!(types.header64.size().unwrap(), 64);
    }

    #[test]
    fn constants_are_declared_on_the_types() {
        let types = ElfTypes::new().unwrap();
        assert_eq!(*types.program_header.constant("PT_LOAD").unwrap(), 1);
        assert_eq!(*types.program_header.constant("PT_TLS").unwrap(), 7);
        assert_eq!(*types.program_header.constant("PT_GNU_STACK").unwrap(), 0x6474_e551);
        assert_eq!(
            *types.section_header.constant("SHT_STRTAB").unwrap(),
            SHT_STRTAB as i128
        );
        assert_eq!(*types.section_header.constant("SHF_MASKPROC").unwrap(), 0xf000_0000);
    }

    #[test]
    fn symbol_info_splits_into_bind_and_type() {
        let types = ElfTypes::new().unwrap();
        let symbol = RecordInstance::new(&types.symbol);
        symbol.set("st_info", 0x12).unwrap();

        assert_eq!(st_bind(&symbol).unwrap(), 1);
        assert_eq!(st_type(&symbol).unwrap(), 2);
        assert_eq!(bind_name(1), Some("STB_GLOBAL"));
        assert_eq!(symbol_type_name(2), Some("STT_FUNC"));
        assert_eq!(symbol_type_name(9), None);
    }
}
